//! # Bounded Channel
//!
//! Fixed-capacity FIFO shared by every producer and every worker.
//!
//! ## Fairness
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  cashier A ─┐                                     ┌─► worker 0          │
//! │  customer B ─┼─► [ permits: fair FIFO semaphore ] │                     │
//! │  cashier C ─┘          │                          ├─► worker 1          │
//! │                        ▼                          │                     │
//! │              ┌───┬───┬───┬───┬───┐                │                     │
//! │              │ A │ B │ C │   │   │ ──► [ receiver lock: fair FIFO ] ────┘│
//! │              └───┴───┴───┴───┴───┘                                      │
//! │                 capacity = 5                                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Producers waiting for space are admitted in the order they started
//! waiting, and items leave in the order they were stored. Caller type
//! plays no part in either.
//!
//! Every wait can be interrupted by a `CancellationToken` (or by dropping
//! the future). An interrupted put hands the item back; an interrupted
//! take claims nothing.

use std::future::Future;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{ChannelError, PutError};
use crate::item::WorkItem;

/// The channel between bill submitters and workers.
pub type BillChannel = BoundedChannel<WorkItem>;

/// Bounded multi-producer, multi-consumer FIFO.
#[derive(Debug)]
pub struct BoundedChannel<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    closed: CancellationToken,
    capacity: usize,
}

impl<T> BoundedChannel<T> {
    /// Creates a channel holding at most `capacity` items (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        BoundedChannel {
            tx,
            rx: Mutex::new(rx),
            closed: CancellationToken::new(),
            capacity,
        }
    }

    /// Stores `item`, waiting while the channel is full.
    pub async fn put(&self, item: T) -> Result<(), PutError<T>> {
        self.put_until(item, std::future::pending::<()>()).await
    }

    /// Like [`put`](Self::put), but gives up with `Interrupted` if `token`
    /// fires first. The item is not enqueued in that case.
    pub async fn put_cancellable(
        &self,
        item: T,
        token: &CancellationToken,
    ) -> Result<(), PutError<T>> {
        self.put_until(item, token.cancelled()).await
    }

    /// Stores `item` unless `interrupt` completes first.
    pub async fn put_until<F>(&self, item: T, interrupt: F) -> Result<(), PutError<T>>
    where
        F: Future<Output = ()>,
    {
        if self.closed.is_cancelled() {
            return Err(PutError::new(ChannelError::Closed, item));
        }

        tokio::select! {
            biased;

            _ = self.closed.cancelled() => Err(PutError::new(ChannelError::Closed, item)),

            _ = interrupt => Err(PutError::new(ChannelError::Interrupted, item)),

            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(item);
                    Ok(())
                }
                Err(_) => Err(PutError::new(ChannelError::Closed, item)),
            },
        }
    }

    /// Removes the oldest item, waiting while the channel is empty.
    pub async fn take(&self) -> Result<T, ChannelError> {
        self.take_until(std::future::pending::<()>()).await
    }

    /// Like [`take`](Self::take), but gives up with `Interrupted` if `token`
    /// fires first. No item is claimed in that case.
    pub async fn take_cancellable(&self, token: &CancellationToken) -> Result<T, ChannelError> {
        self.take_until(token.cancelled()).await
    }

    async fn take_until<F>(&self, interrupt: F) -> Result<T, ChannelError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;

            _ = interrupt => Err(ChannelError::Interrupted),

            _ = self.closed.cancelled() => self.try_take().ok_or(ChannelError::Closed),

            item = async { self.rx.lock().await.recv().await } => item.ok_or(ChannelError::Closed),
        }
    }

    /// Removes the oldest item if one is ready and no worker holds the
    /// receiving end right now.
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Closes the channel: further puts fail with `Closed` and blocked
    /// waiters wake up.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Closes the channel and returns every item still stored, oldest first.
    ///
    /// Waits for producers that already hold a slot to finish their put, so
    /// nothing can be stored after this returns.
    pub async fn close_and_drain(&self) -> Vec<T> {
        self.close();

        let mut rx = self.rx.lock().await;
        rx.close();

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Items currently stored. Advisory: may be stale as soon as it returns.
    pub fn size(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Free slots. Advisory.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
