pub mod resolver;
pub mod service;

pub use resolver::{GroupSummary, PermissionResolver, PermissionSnapshot, TemporarySummary};
pub use service::{PermissionService, SWEEP_INTERVAL};
