//! # Listener Reconciliation
//!
//! Turns raw push notifications from a [`DocumentStore`] into typed values.
//!
//! ## Subscription Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Subscription Lifecycle                             │
//! │                                                                         │
//! │  listen_document(entity) / listen_collection::<T>(name)                │
//! │       │   (returns at once, store registration held inside)             │
//! │       ▼                                                                 │
//! │  ┌──────────┐  cancel() / handle.cancel() / drop   ┌────────────┐       │
//! │  │  Active  │ ───────────────────────────────────► │ Cancelled  │       │
//! │  └────┬─────┘   (first call wins, registration     └────────────┘       │
//! │       │          removed, stream ends)                                  │
//! │       │                                                                 │
//! │       │  raw event                                                      │
//! │       ▼                                                                 │
//! │  Document:                        Collection:                           │
//! │   error        ─► Err(e)           error        ─► Err(e)               │
//! │   no snapshot  ─► Err(NotFound)    no snapshot  ─► Err(Unknown)         │
//! │   absent doc   ─► Err(NotFound)    snapshots    ─► Ok(every decodable   │
//! │   present doc  ─► Ok(last known       entity, arrival order; malformed  │
//! │                  .reconciled(f))      ones skipped)                     │
//! │                                                                         │
//! │  Errors never end a subscription. Events come out in arrival order.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//! A [`Subscription`] is a `Stream`; pull it from any task. To run callbacks
//! instead, hand it to [`Subscription::deliver_on`] with a
//! [`DeliveryContext`]: one task that runs every posted callback, one at a
//! time, in posting order.

use futures_util::stream::{self, Stream, StreamExt};
use futures_util::task::AtomicWaker;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::ListenerSettings;
use crate::error::{SyncError, SyncResult};
use crate::ports::{CollectionEvent, DocumentEvent, DocumentStore, ListenerRegistration, RemoteFeed};
use tether_core::{DocumentSnapshot, Entity, Listenable};

// =============================================================================
// Subscription State
// =============================================================================

/// Lifecycle state of a subscription. There is no expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Cancelled,
}

struct SubscriptionCore {
    id: Uuid,
    cancelled: AtomicBool,
    registration: ListenerRegistration,
    waker: AtomicWaker,
}

impl SubscriptionCore {
    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.registration.remove();
        self.waker.wake();
        debug!(subscription_id = %self.id, "Subscription cancelled");
        true
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn state(&self) -> SubscriptionState {
        if self.is_cancelled() {
            SubscriptionState::Cancelled
        } else {
            SubscriptionState::Active
        }
    }
}

/// Cloneable cancel handle of a subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    core: Arc<SubscriptionCore>,
}

impl SubscriptionHandle {
    /// Cancels the subscription. Returns true if this call performed it.
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }

    pub fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.core.id)
            .field("state", &self.core.state())
            .finish()
    }
}

// =============================================================================
// Subscription
// =============================================================================

type EventStream<T> = Pin<Box<dyn Stream<Item = SyncResult<T>> + Send>>;

/// A live push registration yielding typed events.
///
/// Dropping the subscription cancels it.
pub struct Subscription<T> {
    core: Arc<SubscriptionCore>,
    events: EventStream<T>,
}

impl<T: Send + 'static> Subscription<T> {
    fn new<E: Send + 'static>(
        feed: RemoteFeed<E>,
        mut reconcile: impl FnMut(E) -> SyncResult<T> + Send + 'static,
    ) -> Self {
        let RemoteFeed {
            mut events,
            registration,
        } = feed;

        let core = Arc::new(SubscriptionCore {
            id: Uuid::new_v4(),
            cancelled: AtomicBool::new(false),
            registration,
            waker: AtomicWaker::new(),
        });

        let events = stream::poll_fn(move |cx| events.poll_recv(cx)).map(move |raw| reconcile(raw));

        Subscription {
            core,
            events: Box::pin(events),
        }
    }

    /// Waits for the next event. `None` once cancelled or when the store
    /// ends the feed.
    pub async fn next(&mut self) -> Option<SyncResult<T>> {
        StreamExt::next(self).await
    }

    /// Cancels the subscription. Returns true if this call performed it.
    pub fn cancel(&self) -> bool {
        self.core.cancel()
    }

    pub fn state(&self) -> SubscriptionState {
        self.core.state()
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// Returns a cloneable handle that can cancel this subscription.
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            core: self.core.clone(),
        }
    }

    /// Delivers every event to `callback` on `context`.
    ///
    /// Callbacks of all subscriptions sharing a context never overlap. Once
    /// cancellation is observed nothing more is posted, and a posted callback
    /// that has not started yet is skipped. A callback already running when
    /// `cancel` returns still completes.
    pub fn deliver_on<F>(mut self, context: &DeliveryContext, callback: F) -> SubscriptionHandle
    where
        F: FnMut(SyncResult<T>) + Send + 'static,
    {
        let handle = self.handle();
        let context = context.clone();
        let callback = Arc::new(Mutex::new(callback));

        tokio::spawn(async move {
            while let Some(event) = self.next().await {
                if self.core.is_cancelled() {
                    break;
                }
                let core = self.core.clone();
                let callback = callback.clone();
                let job: Job = Box::new(move || {
                    if core.is_cancelled() {
                        return;
                    }
                    let mut cb = callback.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    (*cb)(event);
                });
                if context.post(job).await.is_err() {
                    warn!(subscription_id = %self.core.id, "Delivery context closed, dropping subscription");
                    break;
                }
            }
            trace!(subscription_id = %self.core.id, "Delivery forwarder finished");
        });

        handle
    }
}

impl<T> Stream for Subscription<T> {
    type Item = SyncResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.core.waker.register(cx.waker());
        if self.core.is_cancelled() {
            return Poll::Ready(None);
        }
        self.events.as_mut().poll_next(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.core.cancel();
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.core.id)
            .field("state", &self.core.state())
            .finish()
    }
}

// =============================================================================
// Delivery Context
// =============================================================================

type Job = Box<dyn FnOnce() + Send>;

/// A single task that runs posted callbacks serially, in posting order.
///
/// Callbacks run on the context's task and must not block it. A callback
/// that panics is logged and the context moves on to the next one.
#[derive(Clone)]
pub struct DeliveryContext {
    name: Arc<str>,
    tx: mpsc::Sender<Job>,
}

impl DeliveryContext {
    /// Spawns the context task with a bounded job queue.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(name: &str, buffer: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(buffer.max(1));
        let name: Arc<str> = Arc::from(name);
        let task_name = name.clone();

        tokio::spawn(async move {
            debug!(context = %task_name, "Delivery context started");
            while let Some(job) = rx.recv().await {
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    warn!(context = %task_name, "Callback panicked");
                }
            }
            debug!(context = %task_name, "Delivery context stopped");
        });

        DeliveryContext { name, tx }
    }

    /// Spawns a context sized by the listener settings.
    pub fn from_settings(name: &str, settings: &ListenerSettings) -> Self {
        Self::spawn(name, settings.callback_buffer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a job, waiting for room if the queue is full.
    pub async fn post(&self, job: Box<dyn FnOnce() + Send>) -> SyncResult<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| SyncError::ChannelError(format!("delivery context '{}' stopped", self.name)))
    }

    /// Runs `f` on the context and returns its result.
    ///
    /// Everything posted before this call has finished when it returns.
    pub async fn run<F, R>(&self, f: F) -> SyncResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(Box::new(move || {
            let _ = done_tx.send(f());
        }))
        .await?;
        done_rx
            .await
            .map_err(|_| SyncError::ChannelError(format!("delivery context '{}' dropped a job", self.name)))
    }
}

impl std::fmt::Debug for DeliveryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryContext")
            .field("name", &self.name)
            .finish()
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Registers push subscriptions and reconciles their events into typed values.
#[derive(Clone)]
pub struct ListenerReconciler {
    store: Arc<dyn DocumentStore>,
}

impl ListenerReconciler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        ListenerReconciler { store }
    }

    /// Listens to the document behind `entity`.
    ///
    /// Each present snapshot is folded into the last value delivered
    /// (starting with `entity`) through [`Listenable::apply_changes`].
    pub fn listen_document<T>(&self, entity: T) -> Subscription<T>
    where
        T: Listenable + Clone + Send + 'static,
    {
        let collection = entity.collection().to_string();
        let id = entity.document_id().to_string();
        debug!(collection = %collection, id = %id, "Registering document listener");

        let feed = self.store.subscribe_document(&collection, &id);
        let mut last_known = entity;

        Subscription::new(feed, move |event: DocumentEvent| {
            let snapshot = event?.ok_or_else(|| SyncError::not_found(&collection, &id))?;
            let fields = snapshot
                .fields
                .as_ref()
                .ok_or_else(|| SyncError::not_found(&collection, &id))?;

            last_known.apply_changes(fields);
            Ok(last_known.clone())
        })
    }

    /// Listens to a whole collection.
    ///
    /// Every event carries the full list of decodable entities in arrival
    /// order; documents that fail to decode are left out.
    pub fn listen_collection<T>(&self, collection: &str) -> Subscription<Vec<T>>
    where
        T: Entity + Send + 'static,
    {
        debug!(collection = %collection, "Registering collection listener");

        let feed = self.store.subscribe_collection(collection);
        let collection = collection.to_string();

        Subscription::new(feed, move |event: CollectionEvent| {
            let snapshots = event?
                .ok_or_else(|| SyncError::Unknown(format!("snapshot missing for {collection}")))?;
            Ok(decode_lossy(&collection, &snapshots))
        })
    }
}

impl std::fmt::Debug for ListenerReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerReconciler").finish_non_exhaustive()
    }
}

/// Decodes every snapshot that decodes, keeping order.
pub(crate) fn decode_lossy<T: Entity>(collection: &str, snapshots: &[DocumentSnapshot]) -> Vec<T> {
    let mut entities = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        match T::from_snapshot(snapshot) {
            Some(entity) => entities.push(entity),
            None => warn!(
                collection = %collection,
                id = %snapshot.id,
                "Skipping document that failed to decode"
            ),
        }
    }
    entities
}

// =============================================================================
// Unit Tests
// =============================================================================
