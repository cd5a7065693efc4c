//! Construction and lifecycle for the permission subsystem.
//!
//! The hosting bot builds one [`PermissionService`], calls [`init`] after the
//! runtime is up, and hands the shared handles to its command layer. Tests
//! construct their own service (with a manual clock) instead of sharing
//! global state.
//!
//! [`init`]: PermissionService::init

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{system_clock, SharedClock};
use crate::config::{LimitsConfig, StaticRolesConfig};
use crate::managers::resolver::PermissionResolver;
use crate::state::{
    create_shared_context_store, create_shared_grant_store, create_shared_group_graph, RateLimiter,
    SharedContextStore, SharedGrantStore, SharedGroupGraph,
};

/// Cadence of the grant and override expiry sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct PermissionService {
    pub grants: SharedGrantStore,
    pub groups: SharedGroupGraph,
    pub contexts: SharedContextStore,
    pub limiter: Arc<RateLimiter>,
    pub resolver: Arc<PermissionResolver>,
    sweep_tasks: Vec<JoinHandle<()>>,
}

impl PermissionService {
    pub fn new(limits: LimitsConfig, roles: StaticRolesConfig) -> Self {
        Self::with_clock(limits, roles, system_clock())
    }

    pub fn with_clock(limits: LimitsConfig, roles: StaticRolesConfig, clock: SharedClock) -> Self {
        let grants = create_shared_grant_store(clock.clone());
        let groups = create_shared_group_graph(clock.clone());
        let contexts = create_shared_context_store(clock.clone());
        let limiter = Arc::new(RateLimiter::new(limits, clock.clone()));
        let resolver = Arc::new(PermissionResolver::new(
            roles,
            grants.clone(),
            groups.clone(),
            contexts.clone(),
        ));

        Self {
            grants,
            groups,
            contexts,
            limiter,
            resolver,
            sweep_tasks: Vec::new(),
        }
    }

    /// Start the background expiry sweeps. Calling twice is a no-op.
    pub fn init(&mut self) {
        if !self.sweep_tasks.is_empty() {
            return;
        }

        let grants = self.grants.clone();
        self.sweep_tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await; // first tick completes immediately
            loop {
                interval.tick().await;
                let removed = grants.write().await.sweep();
                if removed > 0 {
                    debug!("Grant sweep removed {} expired entries", removed);
                }
            }
        }));

        let contexts = self.contexts.clone();
        self.sweep_tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = contexts.write().await.sweep();
                if removed > 0 {
                    debug!("Override sweep removed {} expired entries", removed);
                }
            }
        }));

        info!(
            "Permission service started ({} sweep tasks, every {}s)",
            self.sweep_tasks.len(),
            SWEEP_INTERVAL.as_secs()
        );
    }

    /// Stop the background sweeps. Store state is left intact.
    pub fn shutdown(&mut self) {
        for task in self.sweep_tasks.drain(..) {
            task.abort();
        }
        info!("Permission service stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.sweep_tasks.is_empty()
    }
}

impl Drop for PermissionService {
    fn drop(&mut self) {
        for task in self.sweep_tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::models::PermissionName;
    use serenity::all::{GuildId, UserId};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_init_and_shutdown() {
        let mut service =
            PermissionService::new(LimitsConfig::default(), StaticRolesConfig::default());
        assert!(!service.is_running());

        service.init();
        assert!(service.is_running());
        let tasks_before = service.sweep_tasks.len();
        service.init(); // idempotent
        assert_eq!(service.sweep_tasks.len(), tasks_before);

        service.shutdown();
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_stores_share_one_clock() {
        let clock = ManualClock::at(0);
        let service = PermissionService::with_clock(
            LimitsConfig::default(),
            StaticRolesConfig::default(),
            clock.clone(),
        );

        tokio_test::assert_ok!(service.grants.write().await.grant(
            UserId::new(1),
            GuildId::new(1),
            &[PermissionName::Economy],
            60_000,
            UserId::new(9),
            "r",
        ));

        clock.advance(61_000);
        assert!(!service
            .grants
            .write()
            .await
            .has(UserId::new(1), GuildId::new(1), PermissionName::Economy));
        assert_eq!(service.grants.write().await.sweep(), 0); // already gone
    }
}
