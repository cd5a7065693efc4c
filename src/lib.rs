//! Permission resolution and rate-limiting core for a Discord community bot.
//!
//! The hosting bot builds a [`PermissionService`], calls `init()` to start the
//! expiry sweeps, and asks the resolver questions from its command handlers:
//!
//! ```no_run
//! use warden::{LimitsConfig, PermissionName, PermissionService, StaticRolesConfig};
//! # async fn example(member: warden::MemberView) {
//! let mut service = PermissionService::new(LimitsConfig::default(), StaticRolesConfig::default());
//! service.init();
//!
//! if let Some(denial) = service.resolver.check_permission(&member, PermissionName::Economy).await {
//!     // reply with `denial`
//! }
//! # }
//! ```
//!
//! Everything is in-memory and process-lifetime only: temporary grants,
//! context overrides and rate-limit counters are administrative conveniences,
//! not a system of record.

pub mod audit;
pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod managers;
pub mod models;
pub mod state;

pub use audit::{create_audit_buffer, AuditBuffer, AuditCaptureLayer, AuditCategory, AuditEntry};
pub use clock::{system_clock, Clock, SharedClock, SystemClock};
pub use config::{LimitsConfig, StaticRolesConfig};
pub use duration::{format_duration, parse_duration};
pub use error::{PermissionError, Result};
pub use managers::{PermissionResolver, PermissionService, PermissionSnapshot};
pub use models::{CommandCategory, MemberView, PermissionName};
pub use state::{
    ContextOverrideStore, ContextType, LimitDecision, LimitKind, PermissionGroupGraph, RateLimiter,
    Rule, TemporaryGrantStore, TimeRestrictions,
};
