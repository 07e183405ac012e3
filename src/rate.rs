use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Open-loop pacing: consecutive publishes start at least one interval apart.
pub struct RateController {
    interval: Duration,
    next_send: Option<Instant>,
}

impl RateController {
    /// Target rate in messages per second; must be positive.
    pub fn new(msgs_per_second: f64) -> Self {
        Self {
            interval: Duration::from_nanos((1_000_000_000.0 / msgs_per_second) as u64),
            next_send: None,
        }
    }

    /// Wait until the next send slot. The first call returns immediately.
    pub async fn wait_for_next(&mut self) {
        if let Some(deadline) = self.next_send {
            sleep_until(deadline).await;
        }
        self.next_send = Some(Instant::now() + self.interval);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_from_rate() {
        assert_eq!(RateController::new(1000.0).interval(), Duration::from_millis(1));
        assert_eq!(RateController::new(4.0).interval(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_spaced_by_interval() {
        let mut rc = RateController::new(10.0);
        let start = Instant::now();
        rc.wait_for_next().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        rc.wait_for_next().await;
        rc.wait_for_next().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
