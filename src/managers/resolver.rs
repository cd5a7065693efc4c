//! The authorization facade used by command handlers.
//!
//! Composes the static role bindings, temporary grants, the group graph and
//! the context store into single decisions. Handlers mostly call
//! [`PermissionResolver::check_permission`] and reply with the denial string
//! as-is.

use serenity::all::{ChannelId, GuildId, UserId};
use std::collections::HashSet;

use crate::config::StaticRolesConfig;
use crate::duration::parse_duration;
use crate::error::Result;
use crate::models::{MemberView, PermissionName};
use crate::state::{
    GrantOutcome, SharedContextStore, SharedGrantStore, SharedGroupGraph,
};

/// One group's contribution to a member's permissions.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub name: String,
    pub permissions: Vec<PermissionName>,
}

/// A member's live temporary grant, summarized for display.
#[derive(Debug, Clone)]
pub struct TemporarySummary {
    pub permissions: Vec<PermissionName>,
    pub expires_at: u64,
}

/// Everything a member holds and where it comes from, for diagnostic display.
#[derive(Debug, Clone)]
pub struct PermissionSnapshot {
    pub is_administrator: bool,
    pub static_permissions: Vec<PermissionName>,
    pub temporary: Option<TemporarySummary>,
    pub groups: Vec<GroupSummary>,
    /// Union of all sources, sorted for stable display.
    pub effective: Vec<PermissionName>,
}

pub struct PermissionResolver {
    roles: StaticRolesConfig,
    grants: SharedGrantStore,
    groups: SharedGroupGraph,
    contexts: SharedContextStore,
}

impl PermissionResolver {
    pub fn new(
        roles: StaticRolesConfig,
        grants: SharedGrantStore,
        groups: SharedGroupGraph,
        contexts: SharedContextStore,
    ) -> Self {
        Self {
            roles,
            grants,
            groups,
            contexts,
        }
    }

    /// The global (context-free) decision. Checked in order: Administrator
    /// bit, static role bindings, temporary grants, group membership.
    pub async fn has_permission(&self, member: &MemberView, permission: PermissionName) -> bool {
        if member.is_administrator() {
            return true;
        }
        if self.roles.member_has(member, permission) {
            return true;
        }
        if self
            .grants
            .write()
            .await
            .has(member.user_id, member.guild_id, permission)
        {
            return true;
        }
        self.groups
            .read()
            .await
            .user_permissions(member)
            .contains(&permission)
    }

    /// The single most-used entry point: `None` means allowed, otherwise a
    /// ready-to-send denial message.
    pub async fn check_permission(
        &self,
        member: &MemberView,
        permission: PermissionName,
    ) -> Option<String> {
        if self.has_permission(member, permission).await {
            None
        } else {
            Some(format!(
                "You need the `{}` permission to use this command.",
                permission
            ))
        }
    }

    /// The member's full globally-resolved permission set.
    /// An administrator holds every name.
    pub async fn global_permission_set(&self, member: &MemberView) -> HashSet<PermissionName> {
        if member.is_administrator() {
            return PermissionName::ALL.iter().copied().collect();
        }

        let mut permissions: HashSet<PermissionName> = PermissionName::ALL
            .iter()
            .filter(|p| self.roles.member_has(member, **p))
            .copied()
            .collect();

        if let Some(grant) = self
            .grants
            .write()
            .await
            .get(member.user_id, member.guild_id)
        {
            permissions.extend(grant.permissions.iter().copied());
        }
        permissions.extend(self.groups.read().await.user_permissions(member));
        permissions
    }

    /// Context-aware decision: the global set feeds step 1 of the context
    /// store's precedence chain, so a global grant always wins.
    pub async fn has_context_permission(
        &self,
        member: &MemberView,
        permission: PermissionName,
        context_id: ChannelId,
    ) -> bool {
        let global = self.global_permission_set(member).await;
        self.contexts
            .write()
            .await
            .has_context_permission(member, permission, context_id, &global)
    }

    pub async fn check_context_permission(
        &self,
        member: &MemberView,
        permission: PermissionName,
        context_id: ChannelId,
    ) -> Option<String> {
        if self
            .has_context_permission(member, permission, context_id)
            .await
        {
            None
        } else {
            Some(format!(
                "You cannot use `{}` in <#{}>.",
                permission, context_id
            ))
        }
    }

    /// Whether the rate-limit gates should be skipped for this member.
    /// Bot owners and members passing the global admin check are exempt.
    pub async fn is_exempt(&self, member: &MemberView) -> bool {
        self.roles.is_owner(member.user_id)
            || self.has_permission(member, PermissionName::Admin).await
    }

    /// Aggregate snapshot of everything a member holds, for `/permissions`
    /// style diagnostic output.
    pub async fn complete_user_permissions(&self, member: &MemberView) -> PermissionSnapshot {
        let static_permissions: Vec<PermissionName> = PermissionName::ALL
            .iter()
            .filter(|p| self.roles.member_has(member, **p))
            .copied()
            .collect();

        let temporary = self
            .grants
            .write()
            .await
            .get(member.user_id, member.guild_id)
            .map(|grant| TemporarySummary {
                permissions: grant.sorted_permissions(),
                expires_at: grant.expires_at,
            });

        let groups = {
            let graph = self.groups.read().await;
            let mut names = graph.groups_of_user(member.user_id, member.guild_id);
            for role_id in &member.roles {
                names.extend(graph.groups_of_role(*role_id));
            }
            names.sort();
            names.dedup();
            names
                .into_iter()
                .map(|name| {
                    let mut permissions: Vec<PermissionName> =
                        graph.resolve(&name).into_iter().collect();
                    permissions.sort_by_key(|p| p.as_str());
                    GroupSummary { name, permissions }
                })
                .collect()
        };

        let mut effective: Vec<PermissionName> = self
            .global_permission_set(member)
            .await
            .into_iter()
            .collect();
        effective.sort_by_key(|p| p.as_str());

        PermissionSnapshot {
            is_administrator: member.is_administrator(),
            static_permissions,
            temporary,
            groups,
            effective,
        }
    }

    /// Grant temporary permissions with a human duration string ("2h", "30m").
    pub async fn grant_temporary(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        permissions: &[PermissionName],
        duration: &str,
        granted_by: UserId,
        reason: &str,
    ) -> Result<GrantOutcome> {
        let duration_ms = parse_duration(duration)?;
        self.grants.write().await.grant(
            user_id,
            guild_id,
            permissions,
            duration_ms,
            granted_by,
            reason,
        )
    }

    pub async fn revoke_temporary(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        permissions: Option<&[PermissionName]>,
        revoked_by: UserId,
        reason: &str,
    ) -> Result<Vec<PermissionName>> {
        self.grants
            .write()
            .await
            .revoke(user_id, guild_id, permissions, revoked_by, reason)
    }

    pub async fn extend_temporary(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        additional: &str,
        extended_by: UserId,
        reason: &str,
    ) -> Result<u64> {
        let additional_ms = parse_duration(additional)?;
        self.grants
            .write()
            .await
            .extend(user_id, guild_id, additional_ms, extended_by, reason)
    }
}
