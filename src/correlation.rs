//! Matching asynchronous replies to outstanding requests.
//!
//! A [`CorrelationTracker`] keeps one single-shot waiter per
//! `(transaction id, reply kind)`. Whatever loop drains a connection feeds
//! each inbound message to [`CorrelationTracker::dispatch`], which resolves
//! the matching waiter exactly once. Replies nobody waits for are dropped.
//!
//! Registering a second waiter for a pending key is rejected, and dropping a
//! [`Waiter`] without resolving it removes its registration.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{Stream, StreamExt};
use log::{debug, trace};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::DownstreamEvent;

/// Which reply to a request a waiter expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplyKind {
    /// The service accepted the request.
    Ack,
    /// The request completed.
    Result,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ack => "ack",
            Self::Result => "result",
        })
    }
}

/// Messages that answer an earlier request.
pub trait Correlated {
    /// Transaction the message answers.
    fn transaction_id(&self) -> u64;

    /// Kind of reply the message is.
    fn reply_kind(&self) -> ReplyKind;
}

impl Correlated for DownstreamEvent {
    fn transaction_id(&self) -> u64 { DownstreamEvent::transaction_id(self) }

    fn reply_kind(&self) -> ReplyKind {
        match self {
            DownstreamEvent::Ack(_) => ReplyKind::Ack,
            DownstreamEvent::Result(_) => ReplyKind::Result,
        }
    }
}

/// Errors raised while registering or awaiting a reply.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationError {
    /// A waiter for the same transaction and kind is still pending.
    #[error("a {kind} waiter for transaction {transaction_id} is already registered")]
    AlreadyRegistered {
        transaction_id: u64,
        kind: ReplyKind,
    },
    /// The tracker was cleared before the reply arrived.
    #[error("waiter abandoned before a reply arrived")]
    Abandoned,
    /// No reply arrived in time.
    #[error("timed out waiting for reply")]
    Timeout,
}

/// Outcome of [`CorrelationTracker::dispatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A waiter received the message.
    Resolved,
    /// Nobody was waiting; the message was dropped.
    Unmatched,
}

struct Slot<M> {
    generation: u64,
    tx: oneshot::Sender<M>,
}

struct Registry<M> {
    acks: DashMap<u64, Slot<M>>,
    results: DashMap<u64, Slot<M>>,
    next_generation: AtomicU64,
}

impl<M> Registry<M> {
    fn slots(&self, kind: ReplyKind) -> &DashMap<u64, Slot<M>> {
        match kind {
            ReplyKind::Ack => &self.acks,
            ReplyKind::Result => &self.results,
        }
    }
}

/// Routes replies to the tasks awaiting them.
pub struct CorrelationTracker<M> {
    registry: Arc<Registry<M>>,
}

impl<M> Clone for CorrelationTracker<M> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<M> Default for CorrelationTracker<M> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Registry {
                acks: DashMap::new(),
                results: DashMap::new(),
                next_generation: AtomicU64::new(0),
            }),
        }
    }
}

impl<M> fmt::Debug for CorrelationTracker<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationTracker")
            .field("acks", &self.registry.acks.len())
            .field("results", &self.registry.results.len())
            .finish()
    }
}

impl<M: Correlated> CorrelationTracker<M> {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register interest in the `kind` reply to `transaction_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::AlreadyRegistered`] if a waiter for the
    /// same key is still pending.
    pub fn register(
        &self,
        transaction_id: u64,
        kind: ReplyKind,
    ) -> Result<Waiter<M>, CorrelationError> {
        let generation = self.registry.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        match self.registry.slots(kind).entry(transaction_id) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().tx.is_closed() {
                    return Err(CorrelationError::AlreadyRegistered {
                        transaction_id,
                        kind,
                    });
                }
                occupied.insert(Slot { generation, tx });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot { generation, tx });
            }
        }
        trace!("registered {kind} waiter for transaction {transaction_id}");
        Ok(Waiter {
            registry: Arc::clone(&self.registry),
            transaction_id,
            kind,
            generation,
            rx,
        })
    }

    /// Hand `message` to the waiter registered for it, if any.
    pub fn dispatch(&self, message: M) -> Dispatch {
        let transaction_id = message.transaction_id();
        let kind = message.reply_kind();
        let Some((_, slot)) = self.registry.slots(kind).remove(&transaction_id) else {
            debug!("no {kind} waiter for transaction {transaction_id}; dropping reply");
            return Dispatch::Unmatched;
        };
        if slot.tx.send(message).is_err() {
            debug!("{kind} waiter for transaction {transaction_id} went away; dropping reply");
            return Dispatch::Unmatched;
        }
        Dispatch::Resolved
    }

    /// Dispatch every message of `stream` until it ends.
    ///
    /// Returns the number of waiters resolved.
    pub async fn pump<St>(&self, stream: St) -> usize
    where
        St: Stream<Item = M>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut resolved = 0;
        while let Some(message) = stream.next().await {
            if self.dispatch(message) == Dispatch::Resolved {
                resolved += 1;
            }
        }
        resolved
    }

    /// Number of waiters pending for `kind`.
    #[must_use]
    pub fn pending(&self, kind: ReplyKind) -> usize { self.registry.slots(kind).len() }

    /// Abandon every pending waiter.
    pub fn clear(&self) {
        self.registry.acks.clear();
        self.registry.results.clear();
    }
}

/// A pending registration. Await it with [`wait`](Self::wait) or
/// [`wait_timeout`](Self::wait_timeout); dropping it deregisters.
pub struct Waiter<M> {
    registry: Arc<Registry<M>>,
    transaction_id: u64,
    kind: ReplyKind,
    generation: u64,
    rx: oneshot::Receiver<M>,
}

impl<M> Waiter<M> {
    /// Transaction this waiter expects a reply for.
    #[must_use]
    pub fn transaction_id(&self) -> u64 { self.transaction_id }

    /// Kind of reply this waiter expects.
    #[must_use]
    pub fn kind(&self) -> ReplyKind { self.kind }

    /// Wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Abandoned`] if the tracker is cleared
    /// first.
    pub async fn wait(mut self) -> Result<M, CorrelationError> {
        (&mut self.rx).await.map_err(|_| CorrelationError::Abandoned)
    }

    /// Wait up to `timeout` for the reply, deregistering on expiry.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::Timeout`] if no reply arrives in time and
    /// [`CorrelationError::Abandoned`] if the tracker is cleared first.
    pub async fn wait_timeout(mut self, timeout: Duration) -> Result<M, CorrelationError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(CorrelationError::Abandoned),
            Err(_) => Err(CorrelationError::Timeout),
        }
    }
}

impl<M> Drop for Waiter<M> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.registry
            .slots(self.kind)
            .remove_if(&self.transaction_id, |_, slot| slot.generation == generation);
    }
}

impl<M> fmt::Debug for Waiter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Waiter")
            .field("transaction_id", &self.transaction_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
