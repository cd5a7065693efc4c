pub mod limits;
pub mod roles;

pub use limits::{CategoryLimit, LimitsConfig};
pub use roles::StaticRolesConfig;
