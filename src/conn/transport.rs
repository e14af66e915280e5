use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::clock::Clock;

/// Decides how long a single transport call may block.
pub trait Deadlines: Send + Sync + fmt::Debug {
    /// Instant by which a call starting at `now` must finish, or `None` if
    /// the call is not bounded.
    fn expiry(&self, now: Instant, timeout: Duration) -> Option<Instant>;
}

/// Enforces every deadline with a tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimerDeadlines;

impl Deadlines for TimerDeadlines {
    fn expiry(&self, now: Instant, timeout: Duration) -> Option<Instant> {
        Some(now + timeout)
    }
}

/// Accepts deadlines and ignores them.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreDeadlines;

impl Deadlines for IgnoreDeadlines {
    fn expiry(&self, _now: Instant, _timeout: Duration) -> Option<Instant> {
        None
    }
}

/// A bidirectional byte stream a connection can run over.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    fn deadlines(&self) -> Arc<dyn Deadlines> {
        Arc::new(TimerDeadlines)
    }
}

impl Transport for TcpStream {}

impl Transport for DuplexStream {}

pub(crate) type BoxTransport = Box<dyn Transport>;

/// Wraps a stream that cannot honor deadlines (e.g. an in-process test pipe)
/// so that deadline arming becomes a no-op.
#[derive(Debug)]
pub struct NoDeadlines<T>(pub T);

impl<T> Transport for NoDeadlines<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn deadlines(&self) -> Arc<dyn Deadlines> {
        Arc::new(IgnoreDeadlines)
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for NoDeadlines<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for NoDeadlines<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

/// A bounded call ran past its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Expired;

/// Runs `fut` until `expiry` passes on `clock`, or to completion when
/// unbounded.
pub(crate) async fn bounded<F: Future>(
    clock: &dyn Clock,
    expiry: Option<Instant>,
    fut: F,
) -> Result<F::Output, Expired> {
    let Some(at) = expiry else {
        return Ok(fut.await);
    };
    tokio::select! {
        biased;

        output = fut => Ok(output),
        _ = clock.sleep_until(at) => Err(Expired),
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::clock::TokioClock;

    /// A clock whose timer has always already fired.
    #[derive(Debug)]
    struct ElapsedClock;

    impl Clock for ElapsedClock {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep_until(&self, _deadline: Instant) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    #[test]
    fn test_timer_deadline_is_relative_to_now() {
        let now = Instant::now();
        let expiry = TimerDeadlines.expiry(now, Duration::from_secs(3));
        assert_eq!(expiry, Some(now + Duration::from_secs(3)));
    }

    #[test]
    fn test_ignored_deadline_is_unbounded() {
        let now = Instant::now();
        assert_eq!(IgnoreDeadlines.expiry(now, Duration::from_secs(3)), None);
    }

    #[tokio::test]
    async fn test_wrapper_selects_noop_variant() {
        let (a, _b) = tokio::io::duplex(64);
        let wrapped = NoDeadlines(a);
        let now = Instant::now();
        assert_eq!(wrapped.deadlines().expiry(now, Duration::from_secs(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let expiry = Some(Instant::now() + Duration::from_millis(10));
        let result = bounded(&TokioClock, expiry, std::future::pending::<()>()).await;
        assert_eq!(result, Err(Expired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_follows_injected_clock() {
        let expiry = Some(Instant::now() + Duration::from_secs(3600));
        let result = bounded(&ElapsedClock, expiry, std::future::pending::<()>()).await;
        assert_eq!(result, Err(Expired));
    }

    #[tokio::test]
    async fn test_unbounded_runs_to_completion() {
        let result = bounded(&ElapsedClock, None, async { 7 }).await;
        assert_eq!(result, Ok(7));
    }
}
