use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::CommandCategory;

/// Cooldown and rate-limit settings for one command category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryLimit {
    /// Minimum delay between repeated invocations of the same command.
    pub cooldown_ms: u64,
    /// Maximum invocations per window; `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    /// Fixed-window length for `max_uses`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,
}

impl CategoryLimit {
    fn new(cooldown_ms: u64, max_uses: u32, window_ms: u64) -> Self {
        Self {
            cooldown_ms,
            max_uses: Some(max_uses),
            window_ms: Some(window_ms),
        }
    }
}

/// Per-category limit tables, loadable from JSON.
/// The defaults match the shipped tables; a hosting bot can run with no file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    pub categories: HashMap<CommandCategory, CategoryLimit>,
}

impl LimitsConfig {
    /// Load from a JSON file
    pub fn load_from_file(path: &str) -> crate::error::Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| crate::error::PermissionError::ConfigLoad {
                path: path.to_string(),
                source: e,
            })?;

        serde_json::from_str(&content).map_err(|e| crate::error::PermissionError::ConfigParse {
            path: path.to_string(),
            source: e,
        })
    }

    /// Default cooldown for a category; categories without an entry have none.
    pub fn cooldown_ms(&self, category: CommandCategory) -> u64 {
        self.categories
            .get(&category)
            .map_or(0, |limit| limit.cooldown_ms)
    }

    /// Rate-limit window for a category, if it has one.
    pub fn rate_limit(&self, category: CommandCategory) -> Option<(u32, u64)> {
        let limit = self.categories.get(&category)?;
        Some((limit.max_uses?, limit.window_ms?))
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let mut categories = HashMap::new();
        categories.insert(CommandCategory::Admin, CategoryLimit::new(5_000, 10, 60_000));
        categories.insert(CommandCategory::Economy, CategoryLimit::new(3_000, 20, 60_000));
        categories.insert(CommandCategory::Shop, CategoryLimit::new(2_000, 15, 60_000));
        categories.insert(
            CommandCategory::Giveaway,
            CategoryLimit::new(10_000, 5, 300_000),
        );
        categories.insert(
            CommandCategory::Moderator,
            CategoryLimit::new(1_000, 30, 60_000),
        );
        categories.insert(
            CommandCategory::CustomRole,
            CategoryLimit::new(30_000, 3, 3_600_000),
        );
        // General commands have a short cooldown but no rate-limit window.
        categories.insert(
            CommandCategory::General,
            CategoryLimit {
                cooldown_ms: 1_000,
                max_uses: None,
                window_ms: None,
            },
        );
        Self { categories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables() {
        let config = LimitsConfig::default();
        assert_eq!(config.cooldown_ms(CommandCategory::Admin), 5_000);
        assert_eq!(config.cooldown_ms(CommandCategory::General), 1_000);
        assert_eq!(config.rate_limit(CommandCategory::Economy), Some((20, 60_000)));
        assert_eq!(
            config.rate_limit(CommandCategory::CustomRole),
            Some((3, 3_600_000))
        );
        assert_eq!(config.rate_limit(CommandCategory::General), None);
    }

    #[test]
    fn test_parse_limits() {
        let json = r#"{
            "categories": {
                "economy": {"cooldown_ms": 3000, "max_uses": 20, "window_ms": 60000},
                "general": {"cooldown_ms": 1000}
            }
        }"#;

        let config: LimitsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.cooldown_ms(CommandCategory::Economy), 3_000);
        assert_eq!(config.rate_limit(CommandCategory::General), None);
        // Missing categories are simply unlimited.
        assert_eq!(config.cooldown_ms(CommandCategory::Shop), 0);
        assert_eq!(config.rate_limit(CommandCategory::Shop), None);
    }
}
