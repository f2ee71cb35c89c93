//! Byte-rate limiting for async streams
//!
//! [`ThrottledReader`] caps the steady-state throughput of any
//! [`AsyncRead`] at a fixed number of bytes per second. Accounting uses a
//! one-second window: reads are served until the window's budget is used up,
//! after which the reader waits for the window to roll over. A read larger
//! than the remaining budget is clipped, so callers see a short read rather
//! than a stall in the middle of a call.
//!
//! A rate of `0` disables limiting and the reader forwards straight to the
//! inner stream.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

const WINDOW: Duration = Duration::from_secs(1);

/// Accounting for the current one-second window
struct Window {
    rate: u64,
    started: Instant,
    consumed: u64,
    /// Created on the first wait, so construction needs no runtime
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Window {
    fn new(rate: u64) -> Self {
        Self {
            rate,
            started: Instant::now(),
            consumed: 0,
            sleep: None,
        }
    }

    fn roll_if_elapsed(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.started) >= WINDOW {
            self.started = now;
            self.consumed = 0;
        }
    }

    fn remaining(&self) -> u64 {
        self.rate.saturating_sub(self.consumed)
    }
}

struct Cancel {
    token: CancellationToken,
    wait: Pin<Box<WaitForCancellationFutureOwned>>,
}

/// An [`AsyncRead`] adapter that limits throughput to `rate` bytes/second
pub struct ThrottledReader<R> {
    inner: R,
    window: Option<Window>,
    cancel: Option<Cancel>,
}

impl<R> ThrottledReader<R> {
    /// Wrap `inner`, limiting it to `bytes_per_sec` (0 = unlimited)
    pub fn new(inner: R, bytes_per_sec: u64) -> Self {
        let window = (bytes_per_sec > 0).then(|| Window::new(bytes_per_sec));
        Self {
            inner,
            window,
            cancel: None,
        }
    }

    /// Abort window waits when `token` is cancelled
    ///
    /// A cancelled wait fails the pending read with
    /// [`io::ErrorKind::Interrupted`]. An unlimited reader never waits, so
    /// the token is ignored.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        if self.window.is_some() {
            self.cancel = Some(Cancel {
                wait: Box::pin(token.clone().cancelled_owned()),
                token,
            });
        }
        self
    }

    /// Configured rate in bytes per second (0 = unlimited)
    pub fn rate(&self) -> u64 {
        self.window.as_ref().map_or(0, |w| w.rate)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn cancelled_error() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, "throttled read cancelled")
}

impl<R: AsyncRead + Unpin> AsyncRead for ThrottledReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        let Some(window) = this.window.as_mut() else {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        };

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        loop {
            window.roll_if_elapsed();
            if window.remaining() > 0 {
                break;
            }

            if let Some(cancel) = this.cancel.as_mut() {
                if cancel.token.is_cancelled() || cancel.wait.as_mut().poll(cx).is_ready() {
                    return Poll::Ready(Err(cancelled_error()));
                }
            }

            let deadline = window.started + WINDOW;
            let sleep = window
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
            sleep.as_mut().reset(deadline);
            ready!(sleep.as_mut().poll(cx));
        }

        let allowed = usize::try_from(window.remaining())
            .unwrap_or(usize::MAX)
            .min(buf.remaining());

        let n = {
            let slice = buf.initialize_unfilled_to(allowed);
            let mut limited = ReadBuf::new(slice);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut limited))?;
            limited.filled().len()
        };
        buf.advance(n);
        window.consumed += n as u64;

        Poll::Ready(Ok(()))
    }
}
