use crate::{
    app::document_store::{
        Delivery,
        DocumentStore,
        DocumentSubscription,
        StoreError,
    },
    state::AppState,
    transaction::Patch,
};
use std::sync::{
    Arc,
    Mutex,
    MutexGuard,
    PoisonError,
};
use tokio::sync::mpsc;

/// A write as the store received it, kept so tests can assert on the exact
/// traffic a client produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWrite {
    Set(AppState),
    Update(Patch),
    SetIfAbsent { state: AppState, applied: bool },
}

#[derive(Default)]
struct Shared {
    document: Option<AppState>,
    subscribers: Vec<mpsc::UnboundedSender<Delivery>>,
    held: bool,
    write_denial: Option<String>,
    writes: Vec<StoreWrite>,
}

impl Shared {
    fn broadcast(&mut self, delivery: Delivery) {
        if self.held {
            return;
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(delivery.clone()).is_ok());
    }

    fn check_write(&self) -> Result<(), StoreError> {
        match &self.write_denial {
            Some(message) => Err(StoreError::Denied(message.clone())),
            None => Ok(()),
        }
    }
}

/// Process-local document store. Every clone shares one document, so two
/// engines built on clones behave like two clients of the same backend.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    shared: Arc<Mutex<Shared>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: AppState) -> Self {
        let store = Self::new();
        store.lock().document = Some(document);
        store
    }

    pub fn document(&self) -> Option<AppState> {
        self.lock().document.clone()
    }

    pub fn writes(&self) -> Vec<StoreWrite> {
        self.lock().writes.clone()
    }

    /// Stop delivering anything, including the initial snapshot of new
    /// subscriptions, until [`Self::release_deliveries`].
    pub fn hold_deliveries(&self) {
        self.lock().held = true;
    }

    /// Resume deliveries and push the current document to every subscriber.
    pub fn release_deliveries(&self) {
        let mut shared = self.lock();
        shared.held = false;
        let current = shared.document.clone();
        shared.broadcast(Ok(current));
    }

    /// Fail every following write with the given message.
    pub fn deny_writes(&self, message: impl Into<String>) {
        self.lock().write_denial = Some(message.into());
    }

    pub fn allow_writes(&self) {
        self.lock().write_denial = None;
    }

    /// Push a read error to every subscriber, as a backend does when a rule
    /// change revokes access.
    pub fn report_error(&self, error: StoreError) {
        self.lock().broadcast(Err(error));
    }

    /// Change the document behind every client's back, without recording a
    /// write.
    pub fn overwrite(&self, document: Option<AppState>) {
        let mut shared = self.lock();
        shared.document = document.clone();
        shared.broadcast(Ok(document));
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct InMemorySubscription {
    deliveries: mpsc::UnboundedReceiver<Delivery>,
}

impl DocumentSubscription for InMemorySubscription {
    async fn next_delivery(&mut self) -> Delivery {
        self.deliveries.recv().await.unwrap_or(Err(StoreError::Closed))
    }
}

impl DocumentStore for InMemoryDocumentStore {
    type Subscription = InMemorySubscription;

    fn subscribe(&self) -> Result<Self::Subscription, StoreError> {
        let (sender, deliveries) = mpsc::unbounded_channel();
        let mut shared = self.lock();
        if !shared.held {
            // receiver is alive, so this cannot fail
            let _ = sender.send(Ok(shared.document.clone()));
        }
        shared.subscribers.push(sender);
        Ok(InMemorySubscription { deliveries })
    }

    async fn set(&self, state: AppState) -> Result<(), StoreError> {
        let mut shared = self.lock();
        shared.check_write()?;
        shared.writes.push(StoreWrite::Set(state.clone()));
        shared.document = Some(state.clone());
        shared.broadcast(Ok(Some(state)));
        Ok(())
    }

    async fn update(&self, patch: Patch) -> Result<(), StoreError> {
        let mut shared = self.lock();
        shared.check_write()?;
        let next = patch.apply_to(&shared.document.clone().unwrap_or_default());
        shared.writes.push(StoreWrite::Update(patch));
        shared.document = Some(next.clone());
        shared.broadcast(Ok(Some(next)));
        Ok(())
    }

    async fn set_if_absent(&self, state: AppState) -> Result<bool, StoreError> {
        let mut shared = self.lock();
        shared.check_write()?;
        let applied = shared.document.is_none();
        shared.writes.push(StoreWrite::SetIfAbsent {
            state: state.clone(),
            applied,
        });
        if applied {
            shared.document = Some(state.clone());
            shared.broadcast(Ok(Some(state)));
        }
        Ok(applied)
    }
}
