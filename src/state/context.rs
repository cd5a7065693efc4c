//! Per-context (channel/category/thread/voice/stage) permission overrides.
//!
//! Three layers live here: a per-context config of permission and restriction
//! rules, per-user overrides with optional expiry, and role bindings scoped to
//! a context. `has_context_permission` combines them with the global check in
//! a fixed precedence order; the first decisive layer wins.

use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, RoleId, UserId};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::clock::SharedClock;
use crate::error::{PermissionError, Result};
use crate::models::{MemberView, PermissionName};
use crate::state::expiring::{Expires, ExpiringMap};

/// What kind of Discord object a context id points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Channel,
    Category,
    Thread,
    Voice,
    Stage,
}

/// Optional time window on a composite rule. Hours are inclusive local hours
/// of day; days use 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRestrictions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<(u32, u32)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<Vec<u32>>,
}

/// A context rule. The untagged serde shape mirrors what admins write in
/// config: a bare boolean, a single role id, a list of role ids, or an object
/// whose present conditions must all hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Boolean(bool),
    SingleRole(RoleId),
    AnyOfRoles(Vec<RoleId>),
    Composite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        roles: Option<Vec<RoleId>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permissions: Option<Vec<PermissionName>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_restrictions: Option<TimeRestrictions>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default)]
    pub inherit_from_parent: bool,
}

/// Rule configuration for one context. One config per context id.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub context_id: ChannelId,
    pub context_type: ContextType,
    pub permissions: HashMap<PermissionName, Rule>,
    pub restrictions: HashMap<PermissionName, Rule>,
    pub settings: ContextSettings,
    pub set_by: UserId,
    pub set_at: u64,
    pub reason: String,
}

/// Per-user grant/restriction lists for one context, optionally expiring.
#[derive(Debug, Clone)]
pub struct UserContextOverride {
    pub user_id: UserId,
    pub context_id: ChannelId,
    pub permissions: Vec<PermissionName>,
    pub restrictions: Vec<PermissionName>,
    pub expires_at: Option<u64>,
    pub set_by: UserId,
    pub set_at: u64,
    pub reason: String,
}

impl Expires for UserContextOverride {
    fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }
}

/// Permissions a role carries inside one specific context.
#[derive(Debug, Clone)]
pub struct RoleContextPermission {
    pub role_id: RoleId,
    pub context_id: ChannelId,
    pub permissions: Vec<PermissionName>,
    pub set_by: UserId,
    pub set_at: u64,
    pub reason: String,
}

pub struct ContextOverrideStore {
    configs: HashMap<ChannelId, ContextConfig>,
    user_overrides: ExpiringMap<(UserId, ChannelId), UserContextOverride>,
    role_permissions: HashMap<(RoleId, ChannelId), RoleContextPermission>,
    clock: SharedClock,
}

impl ContextOverrideStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            configs: HashMap::new(),
            user_overrides: ExpiringMap::new(),
            role_permissions: HashMap::new(),
            clock,
        }
    }

    /// Set (or replace) the rule config for a context.
    #[allow(clippy::too_many_arguments)]
    pub fn set_context_config(
        &mut self,
        context_id: ChannelId,
        context_type: ContextType,
        permissions: HashMap<PermissionName, Rule>,
        restrictions: HashMap<PermissionName, Rule>,
        settings: ContextSettings,
        set_by: UserId,
        reason: &str,
    ) {
        self.configs.insert(
            context_id,
            ContextConfig {
                context_id,
                context_type,
                permissions,
                restrictions,
                settings,
                set_by,
                set_at: self.clock.now_ms(),
                reason: reason.to_string(),
            },
        );
        info!(
            target: "warden::audit",
            category = "CONTEXT_PERMISSIONS",
            "set config for context {} ({:?}) (by {}: {})",
            context_id, context_type, set_by, reason
        );
    }

    pub fn get_context_config(&self, context_id: ChannelId) -> Option<&ContextConfig> {
        self.configs.get(&context_id)
    }

    /// Remove a context's config. Cascades: user overrides and role bindings
    /// keyed to this context go with it.
    pub fn remove_context_config(&mut self, context_id: ChannelId, removed_by: UserId) -> Result<()> {
        if self.configs.remove(&context_id).is_none() {
            return Err(PermissionError::ContextNotFound {
                context_id: context_id.to_string(),
            });
        }
        self.user_overrides.retain(|(_, ctx), _| *ctx != context_id);
        self.role_permissions.retain(|(_, ctx), _| *ctx != context_id);

        info!(
            target: "warden::audit",
            category = "CONTEXT_PERMISSIONS",
            "removed config for context {} and its overrides (by {})",
            context_id, removed_by
        );
        Ok(())
    }

    /// Set a per-user override for a context, optionally expiring.
    #[allow(clippy::too_many_arguments)]
    pub fn set_user_override(
        &mut self,
        user_id: UserId,
        context_id: ChannelId,
        permissions: Vec<PermissionName>,
        restrictions: Vec<PermissionName>,
        expires_at: Option<u64>,
        set_by: UserId,
        reason: &str,
    ) -> Result<()> {
        let now = self.clock.now_ms();
        if let Some(at) = expires_at {
            if at <= now {
                return Err(PermissionError::InvalidDuration {
                    input: at.to_string(),
                    message: "override expiry is in the past".to_string(),
                });
            }
        }

        self.user_overrides.insert(
            (user_id, context_id),
            UserContextOverride {
                user_id,
                context_id,
                permissions,
                restrictions,
                expires_at,
                set_by,
                set_at: now,
                reason: reason.to_string(),
            },
        );
        info!(
            target: "warden::audit",
            category = "CONTEXT_PERMISSIONS",
            "set user override for {} in context {} (by {}: {})",
            user_id, context_id, set_by, reason
        );
        Ok(())
    }

    pub fn remove_user_override(&mut self, user_id: UserId, context_id: ChannelId) -> Result<()> {
        self.user_overrides
            .remove(&(user_id, context_id))
            .ok_or_else(|| PermissionError::NotFound {
                what: format!("override for user {} in context {}", user_id, context_id),
            })?;
        info!(
            target: "warden::audit",
            category = "CONTEXT_PERMISSIONS",
            "removed user override for {} in context {}",
            user_id, context_id
        );
        Ok(())
    }

    pub fn set_role_context_permissions(
        &mut self,
        role_id: RoleId,
        context_id: ChannelId,
        permissions: Vec<PermissionName>,
        set_by: UserId,
        reason: &str,
    ) {
        self.role_permissions.insert(
            (role_id, context_id),
            RoleContextPermission {
                role_id,
                context_id,
                permissions,
                set_by,
                set_at: self.clock.now_ms(),
                reason: reason.to_string(),
            },
        );
        info!(
            target: "warden::audit",
            category = "CONTEXT_PERMISSIONS",
            "set role {} permissions in context {} (by {}: {})",
            role_id, context_id, set_by, reason
        );
    }

    pub fn remove_role_context_permissions(
        &mut self,
        role_id: RoleId,
        context_id: ChannelId,
    ) -> Result<()> {
        self.role_permissions
            .remove(&(role_id, context_id))
            .ok_or_else(|| PermissionError::NotFound {
                what: format!("role {} permissions in context {}", role_id, context_id),
            })?;
        info!(
            target: "warden::audit",
            category = "CONTEXT_PERMISSIONS",
            "removed role {} permissions in context {}",
            role_id, context_id
        );
        Ok(())
    }

    /// The context-aware permission decision.
    ///
    /// `global` is the member's full globally-resolved permission set,
    /// computed by the resolver. Precedence, first decisive match wins:
    ///
    /// 1. globally granted -> allow (context rules only restrict users who
    ///    would otherwise be denied)
    /// 2. user override for this context: grant -> allow, restriction -> deny
    /// 3. any held role with a role-context binding listing the permission -> allow
    /// 4. context config `permissions` rule, if present, is authoritative
    /// 5. context config `restrictions` rule evaluating true -> deny
    /// 6. deny (global already said no in step 1)
    pub fn has_context_permission(
        &mut self,
        member: &MemberView,
        permission: PermissionName,
        context_id: ChannelId,
        global: &HashSet<PermissionName>,
    ) -> bool {
        if global.contains(&permission) {
            return true;
        }

        let now = self.clock.now_ms();
        if let Some(user_override) = self
            .user_overrides
            .get(&(member.user_id, context_id), now)
        {
            if user_override.permissions.contains(&permission) {
                return true;
            }
            if user_override.restrictions.contains(&permission) {
                return false;
            }
        }

        for role_id in &member.roles {
            if let Some(binding) = self.role_permissions.get(&(*role_id, context_id)) {
                if binding.permissions.contains(&permission) {
                    return true;
                }
            }
        }

        if let Some(config) = self.configs.get(&context_id) {
            if let Some(rule) = config.permissions.get(&permission) {
                return self.evaluate_rule(member, rule, global);
            }
            if let Some(rule) = config.restrictions.get(&permission) {
                if self.evaluate_rule(member, rule, global) {
                    return false;
                }
            }
        }

        false
    }

    /// Evaluate a rule against a member. Composite rules AND their present
    /// sub-conditions; absent ones are vacuously satisfied.
    pub fn evaluate_rule(
        &self,
        member: &MemberView,
        rule: &Rule,
        global: &HashSet<PermissionName>,
    ) -> bool {
        match rule {
            Rule::Boolean(value) => *value,
            Rule::SingleRole(role_id) => member.has_role(*role_id),
            Rule::AnyOfRoles(role_ids) => member.has_any_role(role_ids),
            Rule::Composite {
                roles,
                permissions,
                time_restrictions,
            } => {
                if let Some(roles) = roles {
                    if !member.has_any_role(roles) {
                        return false;
                    }
                }
                if let Some(permissions) = permissions {
                    if !permissions.iter().any(|p| global.contains(p)) {
                        return false;
                    }
                }
                if let Some(time) = time_restrictions {
                    if !self.time_allows(time) {
                        return false;
                    }
                }
                true
            }
        }
    }

    fn time_allows(&self, time: &TimeRestrictions) -> bool {
        if let Some((start, end)) = time.hours {
            let hour = self.clock.local_hour();
            if hour < start || hour > end {
                return false;
            }
        }
        if let Some(days) = &time.days {
            if !days.contains(&self.clock.local_weekday()) {
                return false;
            }
        }
        true
    }

    /// Remove expired user overrides, logging each. Returns the number removed.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now_ms();
        let removed = self.user_overrides.sweep(now);
        for ((user_id, context_id), _) in &removed {
            info!(
                target: "warden::audit",
                category = "CONTEXT_PERMISSIONS",
                "expired user override for {} in context {}",
                user_id, context_id
            );
        }
        removed.len()
    }

    pub fn config_count(&self) -> usize {
        self.configs.len()
    }

    pub fn override_count(&self) -> usize {
        self.user_overrides.len()
    }
}

/// Shared context store type
pub type SharedContextStore = std::sync::Arc<tokio::sync::RwLock<ContextOverrideStore>>;

pub fn create_shared_context_store(clock: SharedClock) -> SharedContextStore {
    std::sync::Arc::new(tokio::sync::RwLock::new(ContextOverrideStore::new(clock)))
}
