//! Named permission groups with inheritance.
//!
//! Groups form a graph via `inherits` edges. Builtin groups are seeded
//! acyclic, and custom creation only accepts existing targets, but resolution
//! still guards with a visited set so a cycle smuggled in by a bad edit can
//! never hang the process.

use once_cell::sync::Lazy;
use serenity::all::{GuildId, RoleId, UserId};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::clock::SharedClock;
use crate::error::{PermissionError, Result};
use crate::models::{MemberView, PermissionName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Builtin,
    Custom,
}

#[derive(Debug, Clone)]
pub struct PermissionGroup {
    pub name: String,
    pub permissions: HashSet<PermissionName>,
    pub inherits: Vec<String>,
    pub description: String,
    pub kind: GroupKind,
    pub created_by: Option<UserId>,
    pub created_at: Option<u64>,
}

impl PermissionGroup {
    fn builtin(name: &str, permissions: &[PermissionName], inherits: &[&str], description: &str) -> Self {
        Self {
            name: name.to_string(),
            permissions: permissions.iter().copied().collect(),
            inherits: inherits.iter().map(|s| s.to_string()).collect(),
            description: description.to_string(),
            kind: GroupKind::Builtin,
            created_by: None,
            created_at: None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.kind == GroupKind::Builtin
    }
}

static BUILTIN_GROUPS: Lazy<Vec<PermissionGroup>> = Lazy::new(builtin_groups);

fn builtin_groups() -> Vec<PermissionGroup> {
    use PermissionName::*;
    vec![
        PermissionGroup::builtin(
            "server-manager",
            &PermissionName::GRANTABLE,
            &[],
            "Standalone bundle with every day-to-day management permission",
        ),
        PermissionGroup::builtin(
            "support-staff",
            &[Ticket, Staff],
            &[],
            "Ticket handling and member support",
        ),
        PermissionGroup::builtin(
            "content-manager",
            &[Giveaway, CustomRole],
            &[],
            "Giveaways and custom role management",
        ),
        PermissionGroup::builtin(
            "economy-team",
            &[Economy, Shop],
            &[],
            "Economy balancing and shop curation",
        ),
        PermissionGroup::builtin(
            "moderation-team",
            &[Moderator, Staff],
            &[],
            "Day-to-day moderation",
        ),
        PermissionGroup::builtin(
            "senior-staff",
            &[Moderator],
            &["content-manager", "support-staff"],
            "Senior staff: moderation plus everything content and support can do",
        ),
    ]
}

/// Permission groups plus their user/role assignments for one process.
pub struct PermissionGroupGraph {
    groups: HashMap<String, PermissionGroup>,
    user_groups: HashMap<(UserId, GuildId), Vec<String>>,
    role_groups: HashMap<RoleId, Vec<String>>,
    clock: SharedClock,
}

impl PermissionGroupGraph {
    pub fn new(clock: SharedClock) -> Self {
        let mut groups = HashMap::new();
        for group in BUILTIN_GROUPS.iter() {
            groups.insert(group.name.clone(), group.clone());
        }
        Self {
            groups,
            user_groups: HashMap::new(),
            role_groups: HashMap::new(),
            clock,
        }
    }

    /// Union of direct permissions across `name` and everything reachable
    /// through `inherits`. Iterative with an explicit stack and visited set:
    /// a revisited node contributes nothing further, so even a cyclic graph
    /// terminates in O(V+E). Unknown groups resolve to the empty set.
    pub fn resolve(&self, name: &str) -> HashSet<PermissionName> {
        let mut resolved = HashSet::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![name];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(group) = self.groups.get(current) {
                resolved.extend(group.permissions.iter().copied());
                stack.extend(group.inherits.iter().map(String::as_str));
            }
        }
        resolved
    }

    pub fn get(&self, name: &str) -> Option<&PermissionGroup> {
        self.groups.get(name)
    }

    /// All groups, builtins first, each bucket sorted by name.
    pub fn list(&self) -> Vec<&PermissionGroup> {
        let mut groups: Vec<&PermissionGroup> = self.groups.values().collect();
        groups.sort_by_key(|g| (g.kind == GroupKind::Custom, g.name.clone()));
        groups
    }

    /// Create a custom group. Every `inherits` target must already exist.
    pub fn create(
        &mut self,
        name: &str,
        permissions: &[PermissionName],
        inherits: &[String],
        description: &str,
        created_by: UserId,
    ) -> Result<()> {
        if self.groups.contains_key(name) {
            return Err(PermissionError::DuplicateGroup {
                name: name.to_string(),
            });
        }
        for target in inherits {
            if !self.groups.contains_key(target) {
                return Err(PermissionError::UnknownGroup {
                    name: target.clone(),
                });
            }
        }

        self.groups.insert(
            name.to_string(),
            PermissionGroup {
                name: name.to_string(),
                permissions: permissions.iter().copied().collect(),
                inherits: inherits.to_vec(),
                description: description.to_string(),
                kind: GroupKind::Custom,
                created_by: Some(created_by),
                created_at: Some(self.clock.now_ms()),
            },
        );

        info!(
            target: "warden::audit",
            category = "PERMISSION_INHERITANCE",
            "created group '{}' with {:?} inheriting {:?} (by {})",
            name, permissions, inherits, created_by
        );
        Ok(())
    }

    /// Delete a custom group. Fails while the group is assigned to any user
    /// or role, or referenced by another group's `inherits`.
    pub fn delete(&mut self, name: &str, deleted_by: UserId) -> Result<()> {
        let group = self
            .groups
            .get(name)
            .ok_or_else(|| PermissionError::UnknownGroup {
                name: name.to_string(),
            })?;
        if group.is_builtin() {
            return Err(PermissionError::BuiltinGroup {
                name: name.to_string(),
            });
        }
        if let Some(usage) = self.usage_of(name) {
            return Err(PermissionError::GroupInUse {
                name: name.to_string(),
                usage,
            });
        }

        self.groups.remove(name);
        info!(
            target: "warden::audit",
            category = "PERMISSION_INHERITANCE",
            "deleted group '{}' (by {})",
            name, deleted_by
        );
        Ok(())
    }

    fn usage_of(&self, name: &str) -> Option<String> {
        let users = self
            .user_groups
            .values()
            .filter(|groups| groups.iter().any(|g| g == name))
            .count();
        if users > 0 {
            return Some(format!("assigned to {} user(s)", users));
        }
        let roles = self
            .role_groups
            .values()
            .filter(|groups| groups.iter().any(|g| g == name))
            .count();
        if roles > 0 {
            return Some(format!("assigned to {} role(s)", roles));
        }
        if let Some(parent) = self
            .groups
            .values()
            .find(|g| g.inherits.iter().any(|i| i == name))
        {
            return Some(format!("inherited by group '{}'", parent.name));
        }
        None
    }

    pub fn assign_to_user(
        &mut self,
        user_id: UserId,
        guild_id: GuildId,
        name: &str,
    ) -> Result<HashSet<PermissionName>> {
        self.require_group(name)?;
        let assigned = self.user_groups.entry((user_id, guild_id)).or_default();
        if assigned.iter().any(|g| g == name) {
            return Err(PermissionError::AlreadyAssigned {
                group: name.to_string(),
                target: format!("user {}", user_id),
            });
        }
        assigned.push(name.to_string());

        info!(
            target: "warden::audit",
            category = "PERMISSION_INHERITANCE",
            "assigned group '{}' to user {} in guild {}",
            name, user_id, guild_id
        );
        Ok(self.resolve(name))
    }

    pub fn remove_from_user(
        &mut self,
        user_id: UserId,
        guild_id: GuildId,
        name: &str,
    ) -> Result<HashSet<PermissionName>> {
        self.require_group(name)?;
        let key = (user_id, guild_id);
        let assigned = self
            .user_groups
            .get_mut(&key)
            .filter(|groups| groups.iter().any(|g| g == name))
            .ok_or_else(|| PermissionError::NotAssigned {
                group: name.to_string(),
                target: format!("user {}", user_id),
            })?;
        assigned.retain(|g| g != name);
        if assigned.is_empty() {
            self.user_groups.remove(&key);
        }

        info!(
            target: "warden::audit",
            category = "PERMISSION_INHERITANCE",
            "removed group '{}' from user {} in guild {}",
            name, user_id, guild_id
        );
        Ok(self.resolve(name))
    }

    pub fn assign_to_role(&mut self, role_id: RoleId, name: &str) -> Result<HashSet<PermissionName>> {
        self.require_group(name)?;
        let assigned = self.role_groups.entry(role_id).or_default();
        if assigned.iter().any(|g| g == name) {
            return Err(PermissionError::AlreadyAssigned {
                group: name.to_string(),
                target: format!("role {}", role_id),
            });
        }
        assigned.push(name.to_string());

        info!(
            target: "warden::audit",
            category = "PERMISSION_INHERITANCE",
            "assigned group '{}' to role {}",
            name, role_id
        );
        Ok(self.resolve(name))
    }

    pub fn remove_from_role(&mut self, role_id: RoleId, name: &str) -> Result<HashSet<PermissionName>> {
        self.require_group(name)?;
        let assigned = self
            .role_groups
            .get_mut(&role_id)
            .filter(|groups| groups.iter().any(|g| g == name))
            .ok_or_else(|| PermissionError::NotAssigned {
                group: name.to_string(),
                target: format!("role {}", role_id),
            })?;
        assigned.retain(|g| g != name);
        if assigned.is_empty() {
            self.role_groups.remove(&role_id);
        }

        info!(
            target: "warden::audit",
            category = "PERMISSION_INHERITANCE",
            "removed group '{}' from role {}",
            name, role_id
        );
        Ok(self.resolve(name))
    }

    /// Every permission a member holds through groups: groups assigned to the
    /// user directly, plus groups assigned to any role the member holds.
    pub fn user_permissions(&self, member: &MemberView) -> HashSet<PermissionName> {
        let mut permissions = HashSet::new();
        if let Some(groups) = self.user_groups.get(&(member.user_id, member.guild_id)) {
            for group in groups {
                permissions.extend(self.resolve(group));
            }
        }
        for role_id in &member.roles {
            if let Some(groups) = self.role_groups.get(role_id) {
                for group in groups {
                    permissions.extend(self.resolve(group));
                }
            }
        }
        permissions
    }

    pub fn groups_of_user(&self, user_id: UserId, guild_id: GuildId) -> Vec<String> {
        self.user_groups
            .get(&(user_id, guild_id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn groups_of_role(&self, role_id: RoleId) -> Vec<String> {
        self.role_groups.get(&role_id).cloned().unwrap_or_default()
    }

    fn require_group(&self, name: &str) -> Result<()> {
        if self.groups.contains_key(name) {
            Ok(())
        } else {
            Err(PermissionError::UnknownGroup {
                name: name.to_string(),
            })
        }
    }
}

/// Shared group graph type
pub type SharedGroupGraph = std::sync::Arc<tokio::sync::RwLock<PermissionGroupGraph>>;

pub fn create_shared_group_graph(clock: SharedClock) -> SharedGroupGraph {
    std::sync::Arc::new(tokio::sync::RwLock::new(PermissionGroupGraph::new(clock)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use serenity::all::Permissions;

    fn graph() -> PermissionGroupGraph {
        PermissionGroupGraph::new(ManualClock::at(0))
    }

    fn member(user: u64, guild: u64, roles: &[u64]) -> MemberView {
        MemberView::new(
            UserId::new(user),
            GuildId::new(guild),
            roles.iter().map(|r| RoleId::new(*r)).collect(),
            Permissions::empty(),
        )
    }

    #[test]
    fn test_builtin_resolution_includes_inherited() {
        let graph = graph();

        let senior = graph.resolve("senior-staff");
        // Direct
        assert!(senior.contains(&PermissionName::Moderator));
        // Via content-manager
        assert!(senior.contains(&PermissionName::Giveaway));
        assert!(senior.contains(&PermissionName::CustomRole));
        // Via support-staff
        assert!(senior.contains(&PermissionName::Ticket));
        assert!(senior.contains(&PermissionName::Staff));
        assert!(!senior.contains(&PermissionName::Admin));

        assert_eq!(graph.resolve("server-manager").len(), 7);
        assert!(graph.resolve("no-such-group").is_empty());
    }

    #[test]
    fn test_resolution_is_superset_of_direct() {
        let graph = graph();
        for group in graph.list() {
            let resolved = graph.resolve(&group.name);
            assert!(group.permissions.is_subset(&resolved), "{}", group.name);
        }
    }

    #[test]
    fn test_cycle_does_not_hang_and_unions_both() {
        let mut graph = graph();
        graph
            .create("a", &[PermissionName::Shop], &[], "", UserId::new(1))
            .unwrap();
        graph
            .create(
                "b",
                &[PermissionName::Economy],
                &["a".to_string()],
                "",
                UserId::new(1),
            )
            .unwrap();
        // Force a cycle a -> b -> a
        graph.groups.get_mut("a").unwrap().inherits.push("b".to_string());

        let resolved = graph.resolve("a");
        assert!(resolved.contains(&PermissionName::Shop));
        assert!(resolved.contains(&PermissionName::Economy));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn test_create_validation() {
        let mut graph = graph();
        assert!(matches!(
            graph.create("support-staff", &[], &[], "", UserId::new(1)),
            Err(PermissionError::DuplicateGroup { .. })
        ));
        assert!(matches!(
            graph.create(
                "g1",
                &[PermissionName::Shop],
                &["missing".to_string()],
                "",
                UserId::new(1)
            ),
            Err(PermissionError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn test_delete_guards() {
        let mut graph = graph();

        assert!(matches!(
            graph.delete("server-manager", UserId::new(1)),
            Err(PermissionError::BuiltinGroup { .. })
        ));

        graph
            .create("g1", &[PermissionName::Shop], &[], "", UserId::new(1))
            .unwrap();

        // In use by a user
        graph
            .assign_to_user(UserId::new(5), GuildId::new(1), "g1")
            .unwrap();
        assert!(matches!(
            graph.delete("g1", UserId::new(1)),
            Err(PermissionError::GroupInUse { .. })
        ));
        graph
            .remove_from_user(UserId::new(5), GuildId::new(1), "g1")
            .unwrap();

        // In use by a role
        graph.assign_to_role(RoleId::new(7), "g1").unwrap();
        assert!(graph.delete("g1", UserId::new(1)).is_err());
        graph.remove_from_role(RoleId::new(7), "g1").unwrap();

        // Referenced by another group's inherits
        graph
            .create("g2", &[], &["g1".to_string()], "", UserId::new(1))
            .unwrap();
        assert!(graph.delete("g1", UserId::new(1)).is_err());
        graph.delete("g2", UserId::new(1)).unwrap();

        // Finally deletable, and state was never corrupted
        assert!(graph.get("g1").is_some());
        graph.delete("g1", UserId::new(1)).unwrap();
        assert!(graph.get("g1").is_none());
    }

    #[test]
    fn test_assignment_idempotency_guards() {
        let mut graph = graph();
        let (user, guild) = (UserId::new(5), GuildId::new(1));

        let resolved = graph.assign_to_user(user, guild, "economy-team").unwrap();
        assert!(resolved.contains(&PermissionName::Shop));
        assert!(matches!(
            graph.assign_to_user(user, guild, "economy-team"),
            Err(PermissionError::AlreadyAssigned { .. })
        ));

        graph.remove_from_user(user, guild, "economy-team").unwrap();
        assert!(matches!(
            graph.remove_from_user(user, guild, "economy-team"),
            Err(PermissionError::NotAssigned { .. })
        ));

        graph.assign_to_role(RoleId::new(3), "economy-team").unwrap();
        assert!(graph.assign_to_role(RoleId::new(3), "economy-team").is_err());
    }

    #[test]
    fn test_member_gets_shop_via_role_group() {
        let mut graph = graph();
        graph
            .create("g1", &[PermissionName::Shop], &[], "", UserId::new(1))
            .unwrap();
        graph.assign_to_role(RoleId::new(11), "g1").unwrap();

        let holder = member(5, 1, &[11]);
        assert!(graph.user_permissions(&holder).contains(&PermissionName::Shop));

        let outsider = member(6, 1, &[12]);
        assert!(graph.user_permissions(&outsider).is_empty());
    }

    #[test]
    fn test_user_permissions_union_direct_and_role() {
        let mut graph = graph();
        graph
            .assign_to_user(UserId::new(5), GuildId::new(1), "support-staff")
            .unwrap();
        graph.assign_to_role(RoleId::new(11), "economy-team").unwrap();

        let perms = graph.user_permissions(&member(5, 1, &[11]));
        assert!(perms.contains(&PermissionName::Ticket));
        assert!(perms.contains(&PermissionName::Economy));
        assert!(perms.contains(&PermissionName::Shop));
    }
}
