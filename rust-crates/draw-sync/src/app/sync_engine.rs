use crate::{
    app::{
        connection::ConnectionState,
        document_store::{
            Delivery,
            DocumentStore,
            DocumentSubscription,
            StoreError,
        },
        snapshot_cache::{
            SnapshotCache,
            SyncView,
        },
    },
    state::AppState,
    transaction::{
        Intent,
        IntentError,
        Patch,
        Transaction,
    },
};
use std::{
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    time::Sleep,
};

pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// how long `subscribe` waits for a first snapshot before reporting a
    /// timeout
    pub watchdog_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: DEFAULT_WATCHDOG_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Seed,
    Patch,
    Replace,
}

/// What one call to [`SyncEngine::next_event`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Delivered,
    /// the document was absent and the seed write went out
    Seeding,
    TimedOut,
    Denied(String),
    WriteAcknowledged(WriteKind),
    /// another client initialised the document first
    SeedSkipped,
    WriteFailed { kind: WriteKind, error: StoreError },
    SubscriptionClosed,
}

#[derive(Debug)]
enum Write {
    Seed(AppState),
    Patch(Patch),
    Replace(AppState),
}

impl Write {
    fn kind(&self) -> WriteKind {
        match self {
            Write::Seed(_) => WriteKind::Seed,
            Write::Patch(_) => WriteKind::Patch,
            Write::Replace(_) => WriteKind::Replace,
        }
    }
}

#[derive(Debug)]
struct WriteAck {
    kind: WriteKind,
    result: Result<bool, StoreError>,
}

enum Step {
    Delivery(Delivery),
    WatchdogFired,
    Ack(WriteAck),
}

/// Keeps the local snapshot cache in step with the remote document and pushes
/// local intents out as patches.
///
/// Mutations are optimistic: the cache and every view change before the write
/// is sent, and a failed write is reported but never rolled back. The next
/// delivery from the store is authoritative.
pub struct SyncEngine<Store: DocumentStore> {
    store: Store,
    config: SyncConfig,
    cache: SnapshotCache,
    subscription: Option<Store::Subscription>,
    watchdog: Option<Pin<Box<Sleep>>>,
    initialization_checked: bool,
    writer: Option<mpsc::UnboundedSender<Write>>,
    acks: mpsc::UnboundedSender<WriteAck>,
    ack_receiver: mpsc::UnboundedReceiver<WriteAck>,
}

impl<Store: DocumentStore> SyncEngine<Store> {
    pub fn new(store: Store, config: SyncConfig) -> Self {
        let (acks, ack_receiver) = mpsc::unbounded_channel();
        Self {
            store,
            config,
            cache: SnapshotCache::new(),
            subscription: None,
            watchdog: None,
            initialization_checked: false,
            writer: None,
            acks,
            ack_receiver,
        }
    }

    pub fn views(&self) -> watch::Receiver<SyncView> {
        self.cache.subscribe()
    }

    pub fn view(&self) -> SyncView {
        self.cache.view()
    }

    pub fn connection(&self) -> ConnectionState {
        self.cache.connection()
    }

    pub fn current(&self) -> Option<Arc<AppState>> {
        self.cache.current()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn is_watchdog_armed(&self) -> bool {
        self.watchdog.is_some()
    }

    /// Opens push delivery of the root document and arms the watchdog.
    pub fn subscribe(&mut self) -> Result<(), StoreError> {
        if self.subscription.is_some() {
            return Ok(());
        }
        let subscription = match self.store.subscribe() {
            Ok(subscription) => subscription,
            Err(error) => {
                self.deny(&error);
                return Err(error);
            }
        };
        self.subscription = Some(subscription);
        self.watchdog = Some(Box::pin(tokio::time::sleep(
            self.config.watchdog_interval,
        )));
        self.cache.set_connection(ConnectionState::Connecting);
        tracing::info!(
            "subscribed to remote document, watchdog armed for {:?}",
            self.config.watchdog_interval
        );
        Ok(())
    }

    /// Stops delivery and disarms the watchdog. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        self.watchdog = None;
        if self.subscription.take().is_some() {
            self.cache.set_connection(ConnectionState::Idle);
            tracing::info!("unsubscribed from remote document");
        }
    }

    /// Waits for the next delivery, watchdog expiry or write acknowledgement
    /// and folds it into the cache. Cancel safe.
    pub async fn next_event(&mut self) -> SyncEvent {
        let step = tokio::select! {
            biased;
            delivery = next_delivery(&mut self.subscription) => Step::Delivery(delivery),
            _ = watchdog_fired(&mut self.watchdog) => Step::WatchdogFired,
            Some(ack) = self.ack_receiver.recv() => Step::Ack(ack),
        };
        self.handle(step)
    }

    /// Shallow patch of the named top-level fields, applied locally first.
    /// Writes reach the store in publish order.
    pub fn publish_patch(&mut self, patch: Patch) {
        if patch.is_empty() {
            return;
        }
        tracing::debug!("publishing patch of {:?}", patch.fields());
        self.cache.apply(&patch);
        self.queue_write(Write::Patch(patch));
    }

    /// Replaces the whole remote document, applied locally first.
    pub fn publish_full(&mut self, state: AppState) {
        tracing::debug!("publishing full document replacement");
        self.cache.replace(state.clone());
        self.queue_write(Write::Replace(state));
    }

    /// Turns a view intent into one transaction against the current snapshot
    /// and publishes it.
    pub fn dispatch(&mut self, intent: Intent) -> Result<(), IntentError> {
        let current = self.cache.current().ok_or(IntentError::NotLoaded)?;
        let name = intent.name();
        let transaction = intent.into_transaction(&current).inspect_err(|e| {
            tracing::warn!("rejected {name}: {e}");
        })?;
        match transaction {
            Transaction::Patch(patch) => self.publish_patch(patch),
            Transaction::Replace(state) => self.publish_full(state),
        }
        tracing::info!("applied {name}");
        Ok(())
    }

    fn handle(&mut self, step: Step) -> SyncEvent {
        match step {
            Step::Delivery(Ok(Some(state))) => {
                self.on_delivered();
                self.initialization_checked = true;
                tracing::trace!("snapshot delivered");
                self.cache.replace(state);
                SyncEvent::Delivered
            }
            Step::Delivery(Ok(None)) => {
                self.on_delivered();
                self.ensure_initialized()
            }
            Step::Delivery(Err(StoreError::Closed)) => {
                self.subscription = None;
                self.watchdog = None;
                self.deny(&StoreError::Closed);
                SyncEvent::SubscriptionClosed
            }
            Step::Delivery(Err(error)) => {
                self.deny(&error);
                SyncEvent::Denied(error.to_string())
            }
            Step::WatchdogFired => {
                self.watchdog = None;
                tracing::warn!(
                    "no snapshot within {:?}, reporting connection timeout",
                    self.config.watchdog_interval
                );
                self.cache.set_connection(ConnectionState::TimedOut);
                SyncEvent::TimedOut
            }
            Step::Ack(WriteAck { kind, result }) => match result {
                Ok(true) => {
                    tracing::trace!("{kind:?} write acknowledged");
                    SyncEvent::WriteAcknowledged(kind)
                }
                Ok(false) => {
                    tracing::info!(
                        "remote document was initialised by another client, keeping theirs"
                    );
                    SyncEvent::SeedSkipped
                }
                Err(error) => {
                    self.deny(&error);
                    SyncEvent::WriteFailed { kind, error }
                }
            },
        }
    }

    /// Seeds an absent document, but only if it is absent on the first
    /// delivery this process sees. The seed is shown locally straight away; if
    /// another client seeded first, its document arrives with the next delivery
    /// and replaces ours.
    fn ensure_initialized(&mut self) -> SyncEvent {
        if self.initialization_checked {
            tracing::warn!("remote document is empty, showing an empty state");
            self.cache.replace(AppState::default());
            return SyncEvent::Delivered;
        }
        self.initialization_checked = true;
        tracing::info!("remote document absent, seeding defaults");
        let seed = AppState::seed();
        self.cache.replace(seed.clone());
        self.queue_write(Write::Seed(seed));
        SyncEvent::Seeding
    }

    fn on_delivered(&mut self) {
        self.watchdog = None;
        let previous = self.cache.connection();
        if let Some(error) = previous.error() {
            tracing::info!("connection recovered after: {error}");
        }
        self.cache.set_connection(ConnectionState::Connected);
    }

    fn deny(&self, error: &StoreError) {
        tracing::warn!("document store error: {error}");
        self.cache.set_connection(ConnectionState::Denied {
            message: error.to_string(),
        });
    }

    /// Hands the write to the single writer task, starting it on first use.
    fn queue_write(&mut self, write: Write) {
        let writer = self
            .writer
            .get_or_insert_with(|| spawn_writer(self.store.clone(), self.acks.clone()));
        if let Err(mpsc::error::SendError(write)) = writer.send(write) {
            tracing::warn!("writer task is gone, dropping {:?} write", write.kind());
            self.writer = None;
        }
    }
}

/// Runs queued writes one after another, so the store sees them in the order
/// they were published even when a write is slow.
fn spawn_writer<Store: DocumentStore>(
    store: Store,
    acks: mpsc::UnboundedSender<WriteAck>,
) -> mpsc::UnboundedSender<Write> {
    let (writer, mut queue) = mpsc::unbounded_channel::<Write>();
    tokio::spawn(async move {
        while let Some(write) = queue.recv().await {
            let kind = write.kind();
            let result = match write {
                Write::Seed(state) => store.set_if_absent(state).await,
                Write::Patch(patch) => store.update(patch).await.map(|_| true),
                Write::Replace(state) => store.set(state).await.map(|_| true),
            };
            // the engine may be gone already; the write itself still happened
            let _ = acks.send(WriteAck { kind, result });
        }
    });
    writer
}

async fn next_delivery<S: DocumentSubscription>(subscription: &mut Option<S>) -> Delivery {
    match subscription {
        Some(subscription) => subscription.next_delivery().await,
        None => std::future::pending().await,
    }
}

async fn watchdog_fired(watchdog: &mut Option<Pin<Box<Sleep>>>) {
    match watchdog {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
