// Local-path circuit breaker.
//
// Pure state machine; callers pass the current instant so tests can walk
// it through cooldowns without a clock.
//
//   LocalPreferred --threshold failures--> LocalDegraded
//   LocalDegraded  --failed probe--------> LocalDegraded (cooldown x2)
//                                      \-> CloudOnly once the cooldown is capped
//   any            --successful probe----> LocalPreferred

use std::time::Duration;

use tokio::time::Instant;

use crate::model::CircuitState;

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    base_cooldown: Duration,
    max_cooldown: Duration,
    state: CircuitState,
    consecutive_failures: u32,
    cooldown: Duration,
    retry_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, base_cooldown: Duration, max_cooldown: Duration) -> Self {
        let base_cooldown = base_cooldown.min(max_cooldown);
        Self {
            threshold: threshold.max(1),
            base_cooldown,
            max_cooldown,
            state: CircuitState::LocalPreferred,
            consecutive_failures: 0,
            cooldown: base_cooldown,
            retry_at: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// When the next probe is due, if the circuit is open.
    pub fn retry_at(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Whether local should be attempted now. Outside `LocalPreferred` this
    /// is the probe gate.
    pub fn allow_local(&self, now: Instant) -> bool {
        match self.state {
            CircuitState::LocalPreferred => true,
            CircuitState::LocalDegraded | CircuitState::CloudOnly => {
                self.retry_at.is_none_or(|at| now >= at)
            }
        }
    }

    pub fn record_success(&mut self) {
        self.state = CircuitState::LocalPreferred;
        self.consecutive_failures = 0;
        self.cooldown = self.base_cooldown;
        self.retry_at = None;
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        match self.state {
            CircuitState::LocalPreferred => {
                if self.consecutive_failures >= self.threshold {
                    self.state = CircuitState::LocalDegraded;
                    self.cooldown = self.base_cooldown;
                    self.retry_at = Some(now + self.cooldown);
                }
            }
            CircuitState::LocalDegraded | CircuitState::CloudOnly => {
                self.cooldown = self.cooldown.saturating_mul(2).min(self.max_cooldown);
                self.retry_at = Some(now + self.cooldown);
                self.state = if self.cooldown >= self.max_cooldown {
                    CircuitState::CloudOnly
                } else {
                    CircuitState::LocalDegraded
                };
            }
        }
    }
}
