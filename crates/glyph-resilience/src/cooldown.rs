//! Cooldown breaker for a metered provider
//!
//! When a metered provider reports quota or credit exhaustion, every call
//! site stops calling it until the cooldown lapses. There is no explicit
//! reset: the window simply expires.

use glyph_core::{Clock, CooldownConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownStatus {
    /// Calls allowed
    Open,
    /// Calls short-circuited until the window lapses
    Cooling,
}

/// Process-wide breaker state, mutated only by [`CooldownManager::trip`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownState {
    /// Unix millis; no cooldown when 0
    pub cooldown_until: u64,
    pub trip_count: u32,
}

/// Escalation knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub base: Duration,
    /// Trips beyond this many in a row add `penalty`
    pub escalate_after_trips: u32,
    pub penalty: Duration,
    /// Trips within this long after a window ends still count as repeated
    pub grace: Duration,
}

impl CooldownPolicy {
    pub fn from_config(config: &CooldownConfig) -> Self {
        Self {
            base: config.base(),
            escalate_after_trips: config.escalate_after_trips,
            penalty: config.penalty(),
            grace: config.grace(),
        }
    }
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::from_config(&CooldownConfig::default())
    }
}

/// Cooldown breaker guarding one metered provider
///
/// # Example
///
/// ```
/// use glyph_core::ManualClock;
/// use glyph_resilience::{CooldownManager, CooldownPolicy};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let clock = ManualClock::new(0);
/// let breaker = CooldownManager::new(CooldownPolicy::default(), Arc::new(clock.clone()));
///
/// breaker.trip(Duration::from_secs(60));
/// assert!(breaker.is_in_cooldown());
///
/// clock.advance(Duration::from_secs(61));
/// assert!(!breaker.is_in_cooldown());
/// ```
pub struct CooldownManager {
    state: Mutex<CooldownState>,
    policy: CooldownPolicy,
    clock: Arc<dyn Clock>,
}

impl CooldownManager {
    pub fn new(policy: CooldownPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CooldownState::default()),
            policy,
            clock,
        }
    }

    /// Cheap, side-effect-free guard read before every metered call
    pub fn is_in_cooldown(&self) -> bool {
        let until = self.state.lock().cooldown_until;
        until > 0 && self.clock.now_ms() <= until
    }

    pub fn status(&self) -> CooldownStatus {
        if self.is_in_cooldown() {
            CooldownStatus::Cooling
        } else {
            CooldownStatus::Open
        }
    }

    /// Enter (or extend) a cooldown of at least `base`
    ///
    /// Returns the length of the window that was set.
    pub fn trip(&self, base: Duration) -> Duration {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();

        let grace_ms = u64::try_from(self.policy.grace.as_millis()).unwrap_or(u64::MAX);
        let repeated = state.cooldown_until > 0
            && now <= state.cooldown_until.saturating_add(grace_ms);
        state.trip_count = if repeated {
            state.trip_count.saturating_add(1)
        } else {
            1
        };

        let mut window = base;
        if state.trip_count > self.policy.escalate_after_trips {
            window = window.saturating_add(self.policy.penalty);
        }
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        state.cooldown_until = now.saturating_add(window_ms);

        warn!(
            "Metered provider exhausted: cooling down for {}s (trip {})",
            window.as_secs(),
            state.trip_count
        );
        window
    }

    /// Trip using the configured base window
    pub fn trip_default(&self) -> Duration {
        self.trip(self.policy.base)
    }

    pub fn state(&self) -> CooldownState {
        *self.state.lock()
    }

    /// Milliseconds until calls are allowed again, 0 if open
    pub fn remaining_ms(&self) -> u64 {
        let until = self.state.lock().cooldown_until;
        let now = self.clock.now_ms();
        if until > 0 && now <= until {
            (until - now).max(1)
        } else {
            0
        }
    }

    /// Log-friendly guard: true when the call may proceed
    pub fn allow(&self, provider: &str) -> bool {
        if self.is_in_cooldown() {
            info!(
                "Skipping {}: cooldown active for another {}s",
                provider,
                self.remaining_ms() / 1000
            );
            false
        } else {
            true
        }
    }
}
