use std::fmt;

use futures::future::BoxFuture;
use tokio::time::Instant;

/// Source of time for deadlines: the current instant and a timer that fires
/// at a given instant. Both must read the same clock.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;

    /// Completes once `deadline` has passed on this clock.
    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()>;
}

/// Clock backed by tokio's timer, which honors paused time in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep_until(deadline))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps_until_deadline() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep_until(start + Duration::from_secs(2)).await;
        assert!(clock.now() - start >= Duration::from_secs(2));
    }
}
