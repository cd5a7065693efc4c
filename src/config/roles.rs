use serde::{Deserialize, Serialize};
use serenity::all::{RoleId, UserId};
use std::collections::HashMap;

use crate::models::{MemberView, PermissionName};

/// Static permission-to-role bindings plus the bot owner list.
/// Loaded from JSON by the hosting bot; an empty config is valid (everything
/// then flows through grants, groups and context rules).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticRolesConfig {
    /// User ids exempt from rate limiting and implicitly allowed everything.
    #[serde(default)]
    pub owners: Vec<UserId>,

    /// Role ids that statically carry each permission name.
    #[serde(default)]
    pub role_grants: HashMap<PermissionName, Vec<RoleId>>,
}

impl StaticRolesConfig {
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

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owners.contains(&user_id)
    }

    /// Whether the member statically holds `permission` through a bound role.
    pub fn member_has(&self, member: &MemberView, permission: PermissionName) -> bool {
        self.role_grants
            .get(&permission)
            .map_or(false, |roles| member.has_any_role(roles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::{GuildId, Permissions};

    #[test]
    fn test_parse_roles_config() {
        let json = r#"{
            "owners": ["42"],
            "role_grants": {
                "staff": ["100", "101"],
                "economy": ["200"]
            }
        }"#;

        let config: StaticRolesConfig = serde_json::from_str(json).unwrap();
        assert!(config.is_owner(UserId::new(42)));
        assert!(!config.is_owner(UserId::new(43)));

        let member = MemberView::new(
            UserId::new(1),
            GuildId::new(1),
            vec![RoleId::new(101)],
            Permissions::empty(),
        );
        assert!(config.member_has(&member, PermissionName::Staff));
        assert!(!config.member_has(&member, PermissionName::Economy));
    }

    #[test]
    fn test_empty_config_denies() {
        let config = StaticRolesConfig::default();
        let member = MemberView::new(
            UserId::new(1),
            GuildId::new(1),
            vec![RoleId::new(101)],
            Permissions::empty(),
        );
        assert!(!config.member_has(&member, PermissionName::Admin));
        assert!(!config.is_owner(UserId::new(1)));
    }
}
