//! Per-chunk progress observation for streamed transfers.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use bytewire_protocol::TransferProgress;

/// Callback invoked with a progress event for every chunk that passes
/// through the pipeline. Events arrive in chunk order.
pub type ProgressCallback = Box<dyn Fn(TransferProgress) + Send + Sync>;

/// Mutable state for one transfer: the byte counters and the callback.
///
/// Owned exclusively by the pipeline processing the transfer; created at
/// operation start and discarded when the operation settles.
pub struct TransferDescriptor {
    total_bytes: u64,
    bytes_transferred: u64,
    on_progress: ProgressCallback,
}

impl TransferDescriptor {
    /// Creates a descriptor for a transfer of `total_bytes` (0 = unknown).
    pub fn new(total_bytes: u64, on_progress: ProgressCallback) -> Self {
        Self {
            total_bytes,
            bytes_transferred: 0,
            on_progress,
        }
    }

    /// Accounts for a chunk of `len` bytes and notifies the callback.
    pub fn record_chunk(&mut self, len: usize) {
        self.bytes_transferred += len as u64;
        (self.on_progress)(TransferProgress {
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
        });
    }

    /// Bytes observed so far.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// Total expected bytes (0 = unknown).
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Identity stream adapter: forwards every chunk unchanged while feeding
/// the transfer descriptor.
///
/// Never alters chunk contents or ordering; the observation is the only
/// side effect.
pub struct ProgressStream<S> {
    inner: S,
    descriptor: TransferDescriptor,
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, descriptor: TransferDescriptor) -> Self {
        Self { inner, descriptor }
    }
}

impl<S, E> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.descriptor.record_chunk(chunk.len());
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}
