//! Byte-rate throttling for streamed transfers.
//!
//! The limiter is window-based: it counts bytes inside a one-second
//! window and defers the chunk that overflows the configured ceiling
//! until the window's remainder has elapsed. Near a window edge a full
//! window's worth of bytes can still go out in a short burst before the
//! next wait; that burstiness is a known, accepted limitation of the
//! window approach (this is not a token bucket).

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use tokio::time::{Instant, Sleep};

/// Length of the accounting window.
pub const THROTTLE_WINDOW: Duration = Duration::from_secs(1);

/// Default byte ceiling per window: 8 000 KB/s.
pub const DEFAULT_BYTES_PER_SEC: u64 = 1024 * 8000;

/// Byte accounting for one throttled stream.
///
/// One instance per stream; nothing is shared across transfers.
#[derive(Debug)]
pub struct ThrottleState {
    bytes_per_sec: u64,
    window_start: Instant,
    bytes_in_window: u64,
}

impl ThrottleState {
    pub fn new(bytes_per_sec: u64, now: Instant) -> Self {
        Self {
            bytes_per_sec,
            window_start: now,
            bytes_in_window: 0,
        }
    }

    /// Accounts for a chunk of `len` bytes arriving at `now` and returns
    /// how long its forwarding must be deferred (zero = forward now).
    ///
    /// The window resets once a full second has elapsed. The delay is
    /// computed from the pre-reset elapsed time, so a chunk landing right
    /// after an expired window is forwarded immediately even when it
    /// alone exceeds the ceiling.
    pub fn admit(&mut self, len: usize, now: Instant) -> Duration {
        let elapsed = now.duration_since(self.window_start);
        if elapsed >= THROTTLE_WINDOW {
            self.bytes_in_window = 0;
            self.window_start = now;
        }

        self.bytes_in_window = self.bytes_in_window.saturating_add(len as u64);
        if self.bytes_in_window > self.bytes_per_sec {
            THROTTLE_WINDOW.saturating_sub(elapsed)
        } else {
            Duration::ZERO
        }
    }

    /// Bytes accounted against the current window.
    pub fn bytes_in_window(&self) -> u64 {
        self.bytes_in_window
    }
}

/// Identity stream adapter that bounds throughput to the configured rate.
///
/// Chunks are never reordered or dropped, only delayed; the timer wait is
/// wired into `poll_next`, so the delay genuinely pauses the upstream via
/// backpressure instead of buffering ahead.
pub struct ThrottledStream<S> {
    inner: S,
    state: ThrottleState,
    delayed: Option<(Pin<Box<Sleep>>, Bytes)>,
}

impl<S> ThrottledStream<S> {
    pub fn new(inner: S, bytes_per_sec: u64) -> Self {
        Self {
            inner,
            state: ThrottleState::new(bytes_per_sec, Instant::now()),
            delayed: None,
        }
    }
}

impl<S, E> Stream for ThrottledStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        // A deferred chunk goes out only once its wait has elapsed.
        if let Some((sleep, _)) = this.delayed.as_mut() {
            ready!(sleep.as_mut().poll(cx));
        }
        if let Some((_, chunk)) = this.delayed.take() {
            return Poll::Ready(Some(Ok(chunk)));
        }

        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                let delay = this.state.admit(chunk.len(), Instant::now());
                if delay.is_zero() {
                    return Poll::Ready(Some(Ok(chunk)));
                }
                let mut sleep = Box::pin(tokio::time::sleep(delay));
                match sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => Poll::Ready(Some(Ok(chunk))),
                    Poll::Pending => {
                        this.delayed = Some((sleep, chunk));
                        Poll::Pending
                    }
                }
            }
            other => Poll::Ready(other),
        }
    }
}
