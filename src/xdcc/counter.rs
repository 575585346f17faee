//! Thread-safe byte counter, teed over a DCC download's inbound stream so
//! the speed meter can sample progress without touching the copy loop.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Updated by atomic add, read by atomic load — no lock, per the
/// concurrency model's shared-resource policy.
#[derive(Default)]
pub struct ByteCounter {
    total: AtomicU64,
}

impl ByteCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }
}

/// Wraps an `AsyncRead`, incrementing a [`ByteCounter`] by every byte that
/// passes through.
pub struct CountingReader<R> {
    inner: R,
    counter: Arc<ByteCounter>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, counter: Arc<ByteCounter>) -> Self {
        Self { inner, counter }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            let written = buf.filled().len() - before;
            if written > 0 {
                self.counter.add(written as u64);
            }
        }
        poll
    }
}
