// src/models.rs
use serde::{Deserialize, Serialize};
use serenity::all::{GuildId, Member, Permissions, RoleId, UserId};
use std::fmt;
use std::str::FromStr;

use crate::error::PermissionError;

/// Coarse capability names understood by the permission core.
///
/// This is a closed set: command handlers map every gated action onto one of
/// these names, and all stores validate against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionName {
    Admin,
    Staff,
    Moderator,
    Economy,
    Giveaway,
    Ticket,
    Shop,
    CustomRole,
}

impl PermissionName {
    pub const ALL: [PermissionName; 8] = [
        PermissionName::Admin,
        PermissionName::Staff,
        PermissionName::Moderator,
        PermissionName::Economy,
        PermissionName::Giveaway,
        PermissionName::Ticket,
        PermissionName::Shop,
        PermissionName::CustomRole,
    ];

    /// Names that may be handed out as temporary grants.
    /// `customRole` is assignable only through groups and context rules.
    pub const GRANTABLE: [PermissionName; 7] = [
        PermissionName::Admin,
        PermissionName::Staff,
        PermissionName::Moderator,
        PermissionName::Economy,
        PermissionName::Giveaway,
        PermissionName::Ticket,
        PermissionName::Shop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionName::Admin => "admin",
            PermissionName::Staff => "staff",
            PermissionName::Moderator => "moderator",
            PermissionName::Economy => "economy",
            PermissionName::Giveaway => "giveaway",
            PermissionName::Ticket => "ticket",
            PermissionName::Shop => "shop",
            PermissionName::CustomRole => "customRole",
        }
    }

    pub fn is_grantable(&self) -> bool {
        !matches!(self, PermissionName::CustomRole)
    }
}

impl fmt::Display for PermissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionName {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| PermissionError::UnknownPermission {
                name: s.to_string(),
            })
    }
}

/// Command categories used by the cooldown and rate-limit tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandCategory {
    Admin,
    Economy,
    Shop,
    Giveaway,
    Moderator,
    CustomRole,
    General,
}

impl CommandCategory {
    pub const ALL: [CommandCategory; 7] = [
        CommandCategory::Admin,
        CommandCategory::Economy,
        CommandCategory::Shop,
        CommandCategory::Giveaway,
        CommandCategory::Moderator,
        CommandCategory::CustomRole,
        CommandCategory::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandCategory::Admin => "admin",
            CommandCategory::Economy => "economy",
            CommandCategory::Shop => "shop",
            CommandCategory::Giveaway => "giveaway",
            CommandCategory::Moderator => "moderator",
            CommandCategory::CustomRole => "customRole",
            CommandCategory::General => "general",
        }
    }
}

impl fmt::Display for CommandCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of a guild member, taken at the boundary.
///
/// The permission core never calls back into Discord: the command layer builds
/// one of these from the `serenity::Member` it already has, and every decision
/// is a pure function of the snapshot plus store state.
#[derive(Debug, Clone)]
pub struct MemberView {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub roles: Vec<RoleId>,
    /// Guild-level permission bits as computed by Discord.
    pub guild_permissions: Permissions,
}

impl MemberView {
    pub fn new(
        user_id: UserId,
        guild_id: GuildId,
        roles: Vec<RoleId>,
        guild_permissions: Permissions,
    ) -> Self {
        Self {
            user_id,
            guild_id,
            roles,
            guild_permissions,
        }
    }

    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.contains(&role_id)
    }

    pub fn has_any_role(&self, role_ids: &[RoleId]) -> bool {
        role_ids.iter().any(|r| self.has_role(*r))
    }

    pub fn is_administrator(&self) -> bool {
        self.guild_permissions.contains(Permissions::ADMINISTRATOR)
    }
}

impl From<&Member> for MemberView {
    fn from(member: &Member) -> Self {
        Self {
            user_id: member.user.id,
            guild_id: member.guild_id,
            roles: member.roles.clone(),
            guild_permissions: member.permissions.unwrap_or(Permissions::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_name_round_trip() {
        for p in PermissionName::ALL {
            assert_eq!(p.as_str().parse::<PermissionName>().unwrap(), p);
        }
        assert_eq!(
            "customrole".parse::<PermissionName>().unwrap(),
            PermissionName::CustomRole
        );
    }

    #[test]
    fn test_unknown_permission_name_rejected() {
        assert!("root".parse::<PermissionName>().is_err());
        assert!("".parse::<PermissionName>().is_err());
    }

    #[test]
    fn test_custom_role_not_grantable() {
        assert!(!PermissionName::CustomRole.is_grantable());
        assert!(!PermissionName::GRANTABLE.contains(&PermissionName::CustomRole));
        assert_eq!(PermissionName::GRANTABLE.len(), 7);
    }

    #[test]
    fn test_member_view_roles() {
        let member = MemberView::new(
            UserId::new(1),
            GuildId::new(10),
            vec![RoleId::new(5), RoleId::new(6)],
            Permissions::empty(),
        );
        assert!(member.has_role(RoleId::new(5)));
        assert!(!member.has_role(RoleId::new(7)));
        assert!(member.has_any_role(&[RoleId::new(7), RoleId::new(6)]));
        assert!(!member.is_administrator());
    }
}
