pub mod context;
pub mod expiring;
pub mod grants;
pub mod groups;
pub mod rate_limit;

pub use context::{
    create_shared_context_store, ContextConfig, ContextOverrideStore, ContextSettings, ContextType,
    RoleContextPermission, Rule, SharedContextStore, TimeRestrictions, UserContextOverride,
};
pub use expiring::{Expires, ExpiringMap};
pub use grants::{
    create_shared_grant_store, GrantAction, GrantOutcome, GrantRecord, SharedGrantStore,
    TemporaryGrant, TemporaryGrantStore,
};
pub use groups::{
    create_shared_group_graph, GroupKind, PermissionGroup, PermissionGroupGraph, SharedGroupGraph,
};
pub use rate_limit::{CooldownStatus, LimitDecision, LimitKind, RateLimitStatus, RateLimiter};
