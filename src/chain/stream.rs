//! Finalized-block subscription stream.
//!
//! Producers push headers into a bounded channel; the daemon loop is the
//! single consumer and reads them with `StreamExt::next` inside
//! `tokio::select!`. Closing the consumer side is the unsubscribe signal: the
//! producer's next send fails and it stops.

use crate::chain::traits::BlockHeader;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Default number of buffered headers before producers wait.
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

/// Stream of finalized block headers.
pub struct BlockSubscription {
    inner: ReceiverStream<BlockHeader>,
}

impl BlockSubscription {
    /// Create a subscription and the sender feeding it.
    pub fn channel(capacity: usize) -> (Self, HeaderSender) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscription = Self {
            inner: ReceiverStream::new(receiver),
        };
        (subscription, HeaderSender { sender })
    }

    /// Stop receiving. Buffered headers are dropped and producers observe a
    /// closed channel on their next send.
    pub fn unsubscribe(mut self) {
        self.inner.close();
    }
}

impl Stream for BlockSubscription {
    type Item = BlockHeader;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// The subscriber went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("block subscription closed")]
pub struct SubscriptionClosed;

/// Producer side of a [`BlockSubscription`].
#[derive(Clone)]
pub struct HeaderSender {
    sender: mpsc::Sender<BlockHeader>,
}

impl HeaderSender {
    /// Send a header, waiting for buffer space.
    pub async fn send(&self, header: BlockHeader) -> Result<(), SubscriptionClosed> {
        self.sender.send(header).await.map_err(|_| SubscriptionClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
