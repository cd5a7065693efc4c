//! Time-limited permission grants, keyed per (user, guild).

use serenity::all::{GuildId, UserId};
use std::collections::HashSet;
use tracing::info;

use crate::clock::SharedClock;
use crate::duration::format_duration;
use crate::error::{PermissionError, Result};
use crate::models::PermissionName;
use crate::state::expiring::{Expires, ExpiringMap};

/// Hard ceiling on any grant: 7 days, measured from the moment of the grant
/// or extension (a rolling cap, not an absolute one from first grant).
pub const MAX_GRANT_MS: u64 = 7 * 24 * 60 * 60 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantAction {
    Granted,
    Extended,
    Revoked,
}

impl GrantAction {
    fn as_str(&self) -> &'static str {
        match self {
            GrantAction::Granted => "granted",
            GrantAction::Extended => "extended",
            GrantAction::Revoked => "revoked",
        }
    }
}

/// One entry in a grant's audit history.
#[derive(Debug, Clone)]
pub struct GrantRecord {
    pub action: GrantAction,
    pub permissions: Vec<PermissionName>,
    pub actor: UserId,
    pub at: u64,
    pub reason: String,
}

/// The active temporary permissions of one user in one guild.
#[derive(Debug, Clone)]
pub struct TemporaryGrant {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub permissions: HashSet<PermissionName>,
    pub expires_at: u64,
    pub granted_by: UserId,
    pub granted_at: u64,
    pub reason: String,
    pub history: Vec<GrantRecord>,
}

impl TemporaryGrant {
    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Permissions in a stable order, for replies and logs.
    pub fn sorted_permissions(&self) -> Vec<PermissionName> {
        let mut perms: Vec<_> = self.permissions.iter().copied().collect();
        perms.sort_by_key(|p| p.as_str());
        perms
    }
}

impl Expires for TemporaryGrant {
    fn expires_at(&self) -> Option<u64> {
        Some(self.expires_at)
    }
}

/// Returned from a successful grant so the command layer can confirm
/// the merged set and the (possibly extended) expiry.
#[derive(Debug, Clone)]
pub struct GrantOutcome {
    pub permissions: Vec<PermissionName>,
    pub expires_at: u64,
}

/// In-memory store of temporary grants. Expired entries are deleted lazily on
/// read and swept every few minutes by the service timer.
pub struct TemporaryGrantStore {
    grants: ExpiringMap<(UserId, GuildId), TemporaryGrant>,
    clock: SharedClock,
}

impl TemporaryGrantStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            grants: ExpiringMap::new(),
            clock,
        }
    }

    /// Grant `permissions` to a user for `duration_ms`.
    ///
    /// Merges into any existing grant for the same (user, guild): the
    /// permission set is unioned and the stored expiry becomes
    /// `max(existing, now + duration)` — granting more never shortens what is
    /// already there.
    pub fn grant(
        &mut self,
        user_id: UserId,
        guild_id: GuildId,
        permissions: &[PermissionName],
        duration_ms: u64,
        granted_by: UserId,
        reason: &str,
    ) -> Result<GrantOutcome> {
        if permissions.is_empty() {
            return Err(PermissionError::Internal {
                message: "at least one permission is required".to_string(),
            });
        }
        if duration_ms == 0 || duration_ms > MAX_GRANT_MS {
            return Err(PermissionError::InvalidDuration {
                input: format_duration(duration_ms),
                message: format!(
                    "duration must be between 1ms and {}",
                    format_duration(MAX_GRANT_MS)
                ),
            });
        }
        for permission in permissions {
            if !permission.is_grantable() {
                return Err(PermissionError::NotGrantable {
                    name: permission.to_string(),
                });
            }
        }

        let now = self.clock.now_ms();
        let new_expiry = now + duration_ms;
        let record = GrantRecord {
            action: GrantAction::Granted,
            permissions: permissions.to_vec(),
            actor: granted_by,
            at: now,
            reason: reason.to_string(),
        };

        let key = (user_id, guild_id);
        let outcome = match self.grants.get_mut(&key, now) {
            Some(existing) => {
                existing.permissions.extend(permissions.iter().copied());
                existing.expires_at = existing.expires_at.max(new_expiry);
                existing.history.push(record);
                GrantOutcome {
                    permissions: existing.sorted_permissions(),
                    expires_at: existing.expires_at,
                }
            }
            None => {
                let grant = TemporaryGrant {
                    user_id,
                    guild_id,
                    permissions: permissions.iter().copied().collect(),
                    expires_at: new_expiry,
                    granted_by,
                    granted_at: now,
                    reason: reason.to_string(),
                    history: vec![record],
                };
                let outcome = GrantOutcome {
                    permissions: grant.sorted_permissions(),
                    expires_at: grant.expires_at,
                };
                self.grants.insert(key, grant);
                outcome
            }
        };

        info!(
            target: "warden::audit",
            category = "TEMP_PERMISSIONS",
            "granted {:?} to user {} in guild {} for {} (by {}: {})",
            permissions, user_id, guild_id, format_duration(duration_ms), granted_by, reason
        );
        Ok(outcome)
    }

    /// Revoke some or all of a user's temporary permissions.
    ///
    /// With `permissions = None` the whole grant is cleared. With a filter,
    /// only the listed names are removed; if none of them are present the
    /// call fails, and a grant left empty is deleted outright.
    pub fn revoke(
        &mut self,
        user_id: UserId,
        guild_id: GuildId,
        permissions: Option<&[PermissionName]>,
        revoked_by: UserId,
        reason: &str,
    ) -> Result<Vec<PermissionName>> {
        let now = self.clock.now_ms();
        let key = (user_id, guild_id);

        let grant = self
            .grants
            .get_mut(&key, now)
            .ok_or_else(|| PermissionError::GrantNotFound {
                user_id: user_id.to_string(),
            })?;

        let removed: Vec<PermissionName> = match permissions {
            None => grant.permissions.iter().copied().collect(),
            Some(filter) => filter
                .iter()
                .filter(|p| grant.permissions.contains(p))
                .copied()
                .collect(),
        };

        if removed.is_empty() {
            return Err(PermissionError::NotFound {
                what: format!("listed permissions in grant for user {}", user_id),
            });
        }

        for p in &removed {
            grant.permissions.remove(p);
        }

        if grant.permissions.is_empty() {
            self.grants.remove(&key);
        } else {
            grant.history.push(GrantRecord {
                action: GrantAction::Revoked,
                permissions: removed.clone(),
                actor: revoked_by,
                at: now,
                reason: reason.to_string(),
            });
        }

        info!(
            target: "warden::audit",
            category = "TEMP_PERMISSIONS",
            "revoked {:?} from user {} in guild {} (by {}: {})",
            removed, user_id, guild_id, revoked_by, reason
        );
        Ok(removed)
    }

    /// Push a grant's expiry further out. The 7-day cap applies to the total
    /// remaining time, measured from the moment of extension.
    pub fn extend(
        &mut self,
        user_id: UserId,
        guild_id: GuildId,
        additional_ms: u64,
        extended_by: UserId,
        reason: &str,
    ) -> Result<u64> {
        if additional_ms == 0 || additional_ms > MAX_GRANT_MS {
            return Err(PermissionError::InvalidDuration {
                input: format_duration(additional_ms),
                message: format!(
                    "extension must be between 1ms and {}",
                    format_duration(MAX_GRANT_MS)
                ),
            });
        }

        let now = self.clock.now_ms();
        let key = (user_id, guild_id);
        let grant = self
            .grants
            .get_mut(&key, now)
            .ok_or_else(|| PermissionError::GrantNotFound {
                user_id: user_id.to_string(),
            })?;

        let remaining = grant.remaining_ms(now);
        if remaining + additional_ms > MAX_GRANT_MS {
            return Err(PermissionError::InvalidDuration {
                input: format_duration(additional_ms),
                message: format!(
                    "total remaining time cannot exceed {}",
                    format_duration(MAX_GRANT_MS)
                ),
            });
        }

        grant.expires_at = now + remaining + additional_ms;
        grant.history.push(GrantRecord {
            action: GrantAction::Extended,
            permissions: Vec::new(),
            actor: extended_by,
            at: now,
            reason: reason.to_string(),
        });
        let new_expiry = grant.expires_at;

        info!(
            target: "warden::audit",
            category = "TEMP_PERMISSIONS",
            "{} grant for user {} in guild {} by {} (by {}: {})",
            GrantAction::Extended.as_str(), user_id, guild_id,
            format_duration(additional_ms), extended_by, reason
        );
        Ok(new_expiry)
    }

    /// Whether the user currently holds `permission` through a live grant.
    /// An expired grant is deleted as a side effect.
    pub fn has(&mut self, user_id: UserId, guild_id: GuildId, permission: PermissionName) -> bool {
        let now = self.clock.now_ms();
        self.grants
            .get(&(user_id, guild_id), now)
            .map_or(false, |g| g.permissions.contains(&permission))
    }

    pub fn get(&mut self, user_id: UserId, guild_id: GuildId) -> Option<&TemporaryGrant> {
        let now = self.clock.now_ms();
        self.grants.get(&(user_id, guild_id), now)
    }

    /// All live grants in a guild (sweeps expired entries first).
    pub fn active_for_guild(&mut self, guild_id: GuildId) -> Vec<&TemporaryGrant> {
        self.sweep();
        self.grants
            .values()
            .filter(|g| g.guild_id == guild_id)
            .collect()
    }

    /// Remove every expired grant, logging each. Returns the number removed.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now_ms();
        let removed = self.grants.sweep(now);
        for ((user_id, guild_id), grant) in &removed {
            info!(
                target: "warden::audit",
                category = "TEMP_PERMISSIONS",
                "expired grant {:?} for user {} in guild {}",
                grant.sorted_permissions(), user_id, guild_id
            );
        }
        removed.len()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Shared grant store type
pub type SharedGrantStore = std::sync::Arc<tokio::sync::RwLock<TemporaryGrantStore>>;

pub fn create_shared_grant_store(clock: SharedClock) -> SharedGrantStore {
    std::sync::Arc::new(tokio::sync::RwLock::new(TemporaryGrantStore::new(clock)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::clock::Clock;
    use std::sync::Arc;

    const HOUR: u64 = 60 * 60 * 1_000;
    const MINUTE: u64 = 60 * 1_000;

    fn user(n: u64) -> UserId {
        UserId::new(n)
    }

    fn guild(n: u64) -> GuildId {
        GuildId::new(n)
    }

    fn store(clock: &Arc<ManualClock>) -> TemporaryGrantStore {
        TemporaryGrantStore::new(clock.clone())
    }

    #[test]
    fn test_grant_then_expire_with_simulated_clock() {
        let clock = ManualClock::at(1_000);
        let mut store = store(&clock);

        store
            .grant(
                user(1),
                guild(1),
                &[PermissionName::Economy],
                HOUR,
                user(99),
                "event night",
            )
            .unwrap();

        clock.advance(30 * MINUTE);
        assert!(store.has(user(1), guild(1), PermissionName::Economy));

        clock.advance(31 * MINUTE);
        assert!(!store.has(user(1), guild(1), PermissionName::Economy));
        // Lazy expiry deleted the entry
        assert!(store.is_empty());
    }

    #[test]
    fn test_grant_merges_and_never_shortens_expiry() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        store
            .grant(user(1), guild(1), &[PermissionName::Economy], 2 * HOUR, user(9), "a")
            .unwrap();
        // Shorter second grant must not pull the expiry in
        let outcome = store
            .grant(user(1), guild(1), &[PermissionName::Shop], HOUR, user(9), "b")
            .unwrap();

        assert_eq!(outcome.expires_at, 2 * HOUR);
        assert_eq!(
            outcome.permissions,
            vec![PermissionName::Economy, PermissionName::Shop]
        );

        // Longer third grant extends it
        let outcome = store
            .grant(user(1), guild(1), &[PermissionName::Shop], 3 * HOUR, user(9), "c")
            .unwrap();
        assert_eq!(outcome.expires_at, 3 * HOUR);
        // Deduplicated
        assert_eq!(outcome.permissions.len(), 2);
    }

    #[test]
    fn test_grant_validation() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        assert!(store
            .grant(user(1), guild(1), &[PermissionName::Economy], 0, user(9), "r")
            .is_err());
        assert!(store
            .grant(
                user(1),
                guild(1),
                &[PermissionName::Economy],
                MAX_GRANT_MS + 1,
                user(9),
                "r"
            )
            .is_err());
        assert!(matches!(
            store.grant(
                user(1),
                guild(1),
                &[PermissionName::CustomRole],
                HOUR,
                user(9),
                "r"
            ),
            Err(PermissionError::NotGrantable { .. })
        ));
        assert!(store.grant(user(1), guild(1), &[], HOUR, user(9), "r").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_revoke_all_then_not_found() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        store
            .grant(
                user(1),
                guild(1),
                &[PermissionName::Economy, PermissionName::Shop],
                HOUR,
                user(9),
                "r",
            )
            .unwrap();

        let removed = store.revoke(user(1), guild(1), None, user(9), "done").unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.is_empty());

        assert!(matches!(
            store.revoke(user(1), guild(1), None, user(9), "again"),
            Err(PermissionError::GrantNotFound { .. })
        ));
    }

    #[test]
    fn test_revoke_filtered() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        store
            .grant(
                user(1),
                guild(1),
                &[PermissionName::Economy, PermissionName::Shop],
                HOUR,
                user(9),
                "r",
            )
            .unwrap();

        // None of the listed permissions present -> not found
        assert!(store
            .revoke(
                user(1),
                guild(1),
                Some(&[PermissionName::Giveaway]),
                user(9),
                "r"
            )
            .is_err());

        let removed = store
            .revoke(user(1), guild(1), Some(&[PermissionName::Shop]), user(9), "r")
            .unwrap();
        assert_eq!(removed, vec![PermissionName::Shop]);
        assert!(store.has(user(1), guild(1), PermissionName::Economy));
        assert!(!store.has(user(1), guild(1), PermissionName::Shop));

        // Removing the last permission deletes the key
        store
            .revoke(user(1), guild(1), Some(&[PermissionName::Economy]), user(9), "r")
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_extend_rolling_cap() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        store
            .grant(user(1), guild(1), &[PermissionName::Economy], 6 * 24 * HOUR, user(9), "r")
            .unwrap();

        // 6d remaining + 2d extension exceeds the cap
        assert!(store
            .extend(user(1), guild(1), 2 * 24 * HOUR, user(9), "more")
            .is_err());

        // After 5 days only 1 day remains, so 2 more days fit under the
        // rolling cap measured from now.
        clock.advance(5 * 24 * HOUR);
        let expiry = store
            .extend(user(1), guild(1), 2 * 24 * HOUR, user(9), "more")
            .unwrap();
        assert_eq!(expiry, clock.now_ms() + 3 * 24 * HOUR);

        assert!(matches!(
            store.extend(user(2), guild(1), HOUR, user(9), "r"),
            Err(PermissionError::GrantNotFound { .. })
        ));
    }

    #[test]
    fn test_extend_rejects_oversized_additions() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        store
            .grant(user(1), guild(1), &[PermissionName::Economy], 6 * 24 * HOUR, user(9), "r")
            .unwrap();

        // A parseable but absurd duration must fail cleanly, not overflow.
        let huge = crate::duration::parse_duration("213503982334d").unwrap();
        assert!(matches!(
            store.extend(user(1), guild(1), huge, user(9), "r"),
            Err(PermissionError::InvalidDuration { .. })
        ));
        assert!(matches!(
            store.extend(user(1), guild(1), MAX_GRANT_MS + 1, user(9), "r"),
            Err(PermissionError::InvalidDuration { .. })
        ));
        // State untouched
        assert_eq!(store.get(user(1), guild(1)).unwrap().expires_at, 6 * 24 * HOUR);
    }

    #[test]
    fn test_expiry_monotonic_over_grant_extend_sequence() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        let mut last_expiry = 0;
        store
            .grant(user(1), guild(1), &[PermissionName::Ticket], HOUR, user(9), "r")
            .unwrap();
        for _ in 0..5 {
            clock.advance(10 * MINUTE);
            let expiry = store.extend(user(1), guild(1), HOUR, user(9), "r").unwrap();
            assert!(expiry >= last_expiry);
            assert!(expiry <= clock.now_ms() + MAX_GRANT_MS);
            last_expiry = expiry;
        }
    }

    #[test]
    fn test_sweep_removes_expired() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        store
            .grant(user(1), guild(1), &[PermissionName::Economy], HOUR, user(9), "r")
            .unwrap();
        store
            .grant(user(2), guild(1), &[PermissionName::Shop], 3 * HOUR, user(9), "r")
            .unwrap();

        clock.advance(2 * HOUR);
        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.active_for_guild(guild(1)).len(), 1);
    }

    #[test]
    fn test_history_records_actions() {
        let clock = ManualClock::at(0);
        let mut store = store(&clock);

        store
            .grant(
                user(1),
                guild(1),
                &[PermissionName::Economy, PermissionName::Shop],
                HOUR,
                user(9),
                "initial",
            )
            .unwrap();
        store.extend(user(1), guild(1), HOUR, user(8), "longer").unwrap();
        store
            .revoke(user(1), guild(1), Some(&[PermissionName::Shop]), user(7), "misuse")
            .unwrap();

        let grant = store.get(user(1), guild(1)).unwrap();
        let actions: Vec<GrantAction> = grant.history.iter().map(|r| r.action).collect();
        assert_eq!(
            actions,
            vec![GrantAction::Granted, GrantAction::Extended, GrantAction::Revoked]
        );
        assert_eq!(grant.history[2].actor, user(7));
    }
}
