use std::time::Duration;

use crate::session::RefreshOutcome;

/// Shortest sleep between two cycles.
const MIN_DELAY: Duration = Duration::from_secs(1);

/// Poll interval policy.
///
/// The interval is `base × multiplier`. A successful refresh scales the
/// multiplier by `factor` (capped at `max_multiplier`); a quiet cycle resets
/// it. While a refresh is pending the loop wakes up as soon as the cooldown
/// allows another attempt, never later than the normal interval.
#[derive(Debug, Clone)]
pub struct IntervalPolicy {
    base: Duration,
    factor: f64,
    max_multiplier: f64,
    cooldown: Duration,
    multiplier: f64,
}

impl IntervalPolicy {
    pub fn new(base: Duration, factor: f64, max_multiplier: u32, cooldown: Duration) -> Self {
        Self {
            base,
            factor: factor.max(1.0),
            max_multiplier: f64::from(max_multiplier.max(1)),
            cooldown,
            multiplier: 1.0,
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    fn current(&self) -> Duration {
        self.base.mul_f64(self.multiplier)
    }

    /// Delay before the next cycle, given the cycle's refresh outcome.
    pub fn next_delay(&mut self, refresh: &RefreshOutcome) -> Duration {
        let delay = match refresh {
            RefreshOutcome::NotNeeded => {
                self.multiplier = 1.0;
                self.current()
            }
            RefreshOutcome::Refreshed => {
                self.multiplier = (self.multiplier * self.factor).min(self.max_multiplier);
                self.current()
            }
            RefreshOutcome::CoolingDown { remaining } => self.current().min(*remaining),
            RefreshOutcome::Failed { .. } => self.current().min(self.cooldown),
        };
        delay.max(MIN_DELAY)
    }
}
