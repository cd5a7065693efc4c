//! Cooldowns and fixed-window rate limits.
//!
//! Two independent gates: a per-user+command cooldown and a per-user+category
//! fixed window. Neither ever errors; both only report blocked/allowed with
//! retry facts. Stale entries are aged out probabilistically (~1% of calls)
//! instead of by a dedicated timer — a stale entry is harmless until reused.

use dashmap::DashMap;
use rand::Rng;
use serenity::all::UserId;

use crate::clock::SharedClock;
use crate::config::LimitsConfig;
use crate::models::CommandCategory;

/// Cooldown entries older than this are eligible for eviction.
const STALE_AFTER_MS: u64 = 60 * 60 * 1_000;

/// Probability that any given `check_limits` call runs an eviction pass.
const EVICT_PROBABILITY: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Cooldown,
    RateLimit,
}

#[derive(Debug, Clone, Copy)]
pub struct CooldownStatus {
    pub blocked: bool,
    pub retry_after_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    pub blocked: bool,
    /// Uses left in the current window; `None` when the category is unlimited.
    pub remaining: Option<u32>,
    pub reset_in_ms: Option<u64>,
}

/// Combined verdict from both gates.
#[derive(Debug, Clone, Copy)]
pub struct LimitDecision {
    pub blocked: bool,
    pub kind: Option<LimitKind>,
    pub retry_after_ms: Option<u64>,
}

impl LimitDecision {
    fn allowed() -> Self {
        Self {
            blocked: false,
            kind: None,
            retry_after_ms: None,
        }
    }
}

#[derive(Debug)]
struct WindowState {
    uses: u32,
    reset_time: u64,
}

/// Last invocation plus the cooldown applied to it, so eviction never drops
/// an entry whose cooldown (possibly a long override) is still running.
#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    last: u64,
    cooldown_ms: u64,
}

pub struct RateLimiter {
    limits: LimitsConfig,
    cooldowns: DashMap<(UserId, String), CooldownEntry>,
    windows: DashMap<(UserId, CommandCategory), WindowState>,
    command_overrides: DashMap<String, u64>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(limits: LimitsConfig, clock: SharedClock) -> Self {
        Self {
            limits,
            cooldowns: DashMap::new(),
            windows: DashMap::new(),
            command_overrides: DashMap::new(),
            clock,
        }
    }

    /// Cooldown gate for one command. A blocked call does not reset the
    /// timer; an allowed call records the invocation.
    ///
    /// Effective delay precedence: per-call override, then per-command
    /// runtime override, then the category default.
    pub fn check_cooldown(
        &self,
        user_id: UserId,
        command: &str,
        category: CommandCategory,
        custom_cooldown_ms: Option<u64>,
    ) -> CooldownStatus {
        let cooldown_ms = custom_cooldown_ms
            .or_else(|| self.command_overrides.get(command).map(|v| *v))
            .unwrap_or_else(|| self.limits.cooldown_ms(category));
        if cooldown_ms == 0 {
            return CooldownStatus {
                blocked: false,
                retry_after_ms: 0,
            };
        }

        let now = self.clock.now_ms();
        let key = (user_id, command.to_string());
        if let Some(entry) = self.cooldowns.get(&key) {
            let ready_at = entry.last + cooldown_ms;
            if now < ready_at {
                return CooldownStatus {
                    blocked: true,
                    retry_after_ms: ready_at - now,
                };
            }
        }
        self.cooldowns.insert(key, CooldownEntry { last: now, cooldown_ms });
        CooldownStatus {
            blocked: false,
            retry_after_ms: 0,
        }
    }

    /// Fixed-window gate for one category. The counter resets to 1 when the
    /// window has elapsed; a blocked call does not consume a use.
    pub fn check_rate_limit(&self, user_id: UserId, category: CommandCategory) -> RateLimitStatus {
        let Some((max_uses, window_ms)) = self.limits.rate_limit(category) else {
            return RateLimitStatus {
                blocked: false,
                remaining: None,
                reset_in_ms: None,
            };
        };

        let now = self.clock.now_ms();
        let key = (user_id, category);
        let mut state = self.windows.entry(key).or_insert_with(|| WindowState {
            uses: 0,
            reset_time: now + window_ms,
        });

        if now > state.reset_time {
            state.uses = 1;
            state.reset_time = now + window_ms;
        } else if state.uses >= max_uses {
            return RateLimitStatus {
                blocked: true,
                remaining: Some(0),
                reset_in_ms: Some(state.reset_time.saturating_sub(now)),
            };
        } else {
            state.uses += 1;
        }

        RateLimitStatus {
            blocked: false,
            remaining: Some(max_uses - state.uses),
            reset_in_ms: Some(state.reset_time.saturating_sub(now)),
        }
    }

    /// Both gates in order: cooldown first, then the category window. A call
    /// blocked by the cooldown does not consume a window use.
    pub fn check_limits(
        &self,
        user_id: UserId,
        command: &str,
        category: CommandCategory,
        custom_cooldown_ms: Option<u64>,
    ) -> LimitDecision {
        self.maybe_evict();

        let cooldown = self.check_cooldown(user_id, command, category, custom_cooldown_ms);
        if cooldown.blocked {
            return LimitDecision {
                blocked: true,
                kind: Some(LimitKind::Cooldown),
                retry_after_ms: Some(cooldown.retry_after_ms),
            };
        }

        let rate = self.check_rate_limit(user_id, category);
        if rate.blocked {
            return LimitDecision {
                blocked: true,
                kind: Some(LimitKind::RateLimit),
                retry_after_ms: rate.reset_in_ms,
            };
        }

        LimitDecision::allowed()
    }

    /// Set a runtime cooldown override for one command.
    pub fn set_command_cooldown(&self, command: &str, cooldown_ms: u64) {
        self.command_overrides.insert(command.to_string(), cooldown_ms);
        tracing::info!(
            target: "warden::audit",
            category = "RATE_LIMITER",
            "set cooldown override for command '{}' to {}ms",
            command, cooldown_ms
        );
    }

    /// Drop cooldown entries past staleness and windows past their reset.
    /// An entry's own cooldown extends the staleness floor when it is longer.
    pub fn evict_stale(&self) {
        let now = self.clock.now_ms();
        self.cooldowns.retain(|_, entry| {
            now.saturating_sub(entry.last) < STALE_AFTER_MS.max(entry.cooldown_ms)
        });
        self.windows.retain(|_, state| now <= state.reset_time);
    }

    fn maybe_evict(&self) {
        if rand::thread_rng().gen_bool(EVICT_PROBABILITY) {
            self.evict_stale();
        }
    }

    #[cfg(test)]
    fn tracked_entries(&self) -> (usize, usize) {
        (self.cooldowns.len(), self.windows.len())
    }
}
