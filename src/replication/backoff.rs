use rand::Rng;
use tokio::time::Duration;

/// Exponential backoff with jitter, capped at `max`.
///
/// Each delay is drawn from `[base/2, base]`, and `base` doubles per failure up to `max`.
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    base: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration, max: Duration) -> Self {
        Backoff {
            initial,
            max,
            base: initial,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let base = self.base;
        self.base = (self.base * 2).min(self.max);

        let half = base / 2;
        rand::thread_rng().gen_range(half..=base)
    }

    pub(crate) fn reset(&mut self) {
        self.base = self.initial;
    }
}
