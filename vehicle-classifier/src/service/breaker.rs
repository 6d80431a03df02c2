use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive timeouts after which the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call is let through
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { failures: u32 },
    Open { until: Instant },
    HalfOpen { trial_running: bool },
}

/// Fails inference calls fast once the provider stopped answering in time.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    pub fn state(&self) -> BreakerState {
        match *self.lock() {
            State::Closed { .. } => BreakerState::Closed,
            State::Open { until } if Instant::now() >= until => BreakerState::HalfOpen,
            State::Open { .. } => BreakerState::Open,
            State::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }

    /// Asks permission for one call.
    ///
    /// Returns the time left before the next trial when the circuit is open.
    /// Only one trial call is allowed while half-open.
    pub fn acquire(&self) -> Result<(), Duration> {
        let mut state = self.lock();
        match *state {
            State::Closed { .. } => Ok(()),
            State::Open { until } => {
                let now = Instant::now();
                if now < until {
                    return Err(until - now);
                }
                log::info!("Circuit half-open, letting one inference call through");
                *state = State::HalfOpen {
                    trial_running: true,
                };
                Ok(())
            }
            State::HalfOpen {
                trial_running: true,
            } => Err(Duration::ZERO),
            State::HalfOpen {
                trial_running: false,
            } => {
                *state = State::HalfOpen {
                    trial_running: true,
                };
                Ok(())
            }
        }
    }

    /// The provider answered, whatever the answer was.
    pub fn record_success(&self) {
        let mut state = self.lock();
        if !matches!(*state, State::Closed { .. }) {
            log::info!("Circuit closed");
        }
        *state = State::Closed { failures: 0 };
    }

    /// The provider did not answer: it timed out or its worker was lost.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        let next = match *state {
            State::Closed { failures } if failures + 1 < self.config.failure_threshold => {
                State::Closed {
                    failures: failures + 1,
                }
            }
            State::Open { until } => State::Open { until },
            _ => {
                log::warn!(
                    "Circuit opened for {:?} after repeated inference failures",
                    self.config.cooldown
                );
                State::Open {
                    until: Instant::now() + self.config.cooldown,
                }
            }
        };
        *state = next;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // the state is always left consistent, a poisoned lock is still usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
