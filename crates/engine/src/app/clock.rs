use std::time::{Duration, Instant};

/// Longest a clock thread sleeps before re-checking for shutdown.
pub(crate) const MAX_IDLE_SLEEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepPlan {
    pub(crate) steps: u32,
    /// Fraction of a step carried into the next poll.
    pub(crate) remaining: f64,
    /// Whole steps discarded because the catch-up cap was hit.
    pub(crate) dropped: f64,
}

/// Splits an accumulator measured in steps into steps to run now. Without a
/// cap every whole step runs; with one, the backlog beyond it is dropped.
pub(crate) fn plan_steps(mut accumulator: f64, max_steps: Option<u32>) -> StepPlan {
    let mut steps = 0u32;
    while accumulator >= 1.0 && max_steps.map_or(true, |max| steps < max) {
        accumulator -= 1.0;
        steps = steps.saturating_add(1);
    }

    if accumulator >= 1.0 {
        StepPlan {
            steps,
            remaining: 0.0,
            dropped: accumulator,
        }
    } else {
        StepPlan {
            steps,
            remaining: accumulator,
            dropped: 0.0,
        }
    }
}

/// Fixed-rate accumulator clock. Each poll adds the wall time since the last
/// poll, expressed in steps, and plans the whole steps that are due.
#[derive(Debug, Clone)]
pub(crate) struct FixedRateClock {
    rate_hz: f64,
    accumulator: f64,
    last_poll: Instant,
    max_catch_up: Option<u32>,
}

impl FixedRateClock {
    pub(crate) fn new(rate_hz: f64, max_catch_up: Option<u32>, now: Instant) -> Self {
        Self {
            rate_hz: normalize_rate(rate_hz),
            accumulator: 0.0,
            last_poll: now,
            max_catch_up,
        }
    }

    pub(crate) fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    /// Changes the rate from now on; time already accumulated keeps its
    /// fraction of a step.
    pub(crate) fn set_rate(&mut self, rate_hz: f64) {
        self.rate_hz = normalize_rate(rate_hz);
    }

    pub(crate) fn poll(&mut self, now: Instant) -> StepPlan {
        let elapsed = now.saturating_duration_since(self.last_poll);
        self.last_poll = now;
        self.accumulator += elapsed.as_secs_f64() * self.rate_hz;

        let plan = plan_steps(self.accumulator, self.max_catch_up);
        self.accumulator = plan.remaining;
        plan
    }

    /// Wall time until the next step is due, zero if one already is.
    pub(crate) fn until_next_step(&self, now: Instant) -> Duration {
        let missing_steps = (1.0 - self.accumulator).max(0.0);
        let missing = Duration::from_secs_f64(missing_steps / self.rate_hz);
        missing.saturating_sub(now.saturating_duration_since(self.last_poll))
    }
}

fn normalize_rate(rate_hz: f64) -> f64 {
    if rate_hz.is_finite() && rate_hz > 0.0 {
        rate_hz
    } else {
        1.0
    }
}

pub(crate) fn idle_sleep(until_next: Duration) -> Duration {
    until_next.min(MAX_IDLE_SLEEP)
}
