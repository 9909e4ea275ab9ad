// Sled-backed document store: the root document lives under one key and
// subscribers are fed by `watch_prefix`.
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
use anyhow::Context;
use sled::{
    Config,
    Db,
    Event,
    IVec,
    Subscriber,
    Tree,
};
use std::{
    path::Path,
    pin::Pin,
    sync::Arc,
};

pub const DEFAULT_DOCUMENT_KEY: &str = "lottery_app";

#[derive(Clone)]
pub struct SledDocumentStore {
    tree: Tree,
    key: Arc<str>,
}

impl SledDocumentStore {
    pub fn new(db: &Db, key: &str) -> crate::Result<Self> {
        let tree = db.open_tree("documents").context("open documents tree")?;
        Ok(Self {
            tree,
            key: Arc::from(key),
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, key: &str) -> crate::Result<Self> {
        let db = Config::default()
            .path(path)
            .open()
            .context("open sled database")?;
        Self::new(&db, key)
    }

    fn load(&self) -> Delivery {
        let bytes = self.tree.get(self.key.as_bytes()).map_err(unavailable)?;
        bytes.as_deref().map(deserialize).transpose()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.tree.flush().map_err(unavailable)?;
        Ok(())
    }

    /// sled reads, swaps and fsyncs block, so writes run on tokio's blocking
    /// pool instead of a runtime worker
    async fn blocking<T, F>(&self, write: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&SledDocumentStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || write(&store))
            .await
            .map_err(|e| StoreError::Unavailable(format!("sled write task failed: {e}")))?
    }

    fn set_blocking(&self, state: &AppState) -> Result<(), StoreError> {
        let bytes = serialize(state)?;
        self.tree
            .insert(self.key.as_bytes(), bytes)
            .map_err(unavailable)?;
        self.flush()
    }

    fn update_blocking(&self, patch: &Patch) -> Result<(), StoreError> {
        loop {
            let current = self.tree.get(self.key.as_bytes()).map_err(unavailable)?;
            let state = match current.as_deref() {
                Some(bytes) => deserialize(bytes)?,
                None => AppState::default(),
            };
            let next = serialize(&patch.apply_to(&state))?;
            let swapped = self
                .tree
                .compare_and_swap(self.key.as_bytes(), current, Some(next))
                .map_err(unavailable)?;
            if swapped.is_ok() {
                return self.flush();
            }
            tracing::debug!("document changed during update, retrying");
        }
    }

    fn set_if_absent_blocking(&self, state: &AppState) -> Result<bool, StoreError> {
        let bytes = serialize(state)?;
        let swapped = self
            .tree
            .compare_and_swap(self.key.as_bytes(), None::<IVec>, Some(bytes))
            .map_err(unavailable)?;
        self.flush()?;
        Ok(swapped.is_ok())
    }
}

pub struct SledSubscription {
    key: Arc<str>,
    initial: Option<Delivery>,
    events: Pin<Box<Subscriber>>,
}

impl DocumentSubscription for SledSubscription {
    async fn next_delivery(&mut self) -> Delivery {
        if let Some(initial) = self.initial.take() {
            return initial;
        }
        loop {
            match self.events.as_mut().await {
                Some(Event::Insert { key, value }) if *key == *self.key.as_bytes() => {
                    return deserialize(&value).map(Some);
                }
                Some(Event::Remove { key }) if *key == *self.key.as_bytes() => {
                    return Ok(None);
                }
                // a longer key that shares our prefix
                Some(_) => continue,
                None => return Err(StoreError::Closed),
            }
        }
    }
}

impl DocumentStore for SledDocumentStore {
    type Subscription = SledSubscription;

    fn subscribe(&self) -> Result<Self::Subscription, StoreError> {
        // watch first so nothing written between the two calls is lost
        let events = Box::pin(self.tree.watch_prefix(self.key.as_bytes()));
        Ok(SledSubscription {
            key: self.key.clone(),
            initial: Some(self.load()),
            events,
        })
    }

    async fn set(&self, state: AppState) -> Result<(), StoreError> {
        self.blocking(move |store| store.set_blocking(&state)).await
    }

    async fn update(&self, patch: Patch) -> Result<(), StoreError> {
        self.blocking(move |store| store.update_blocking(&patch))
            .await
    }

    async fn set_if_absent(&self, state: AppState) -> Result<bool, StoreError> {
        self.blocking(move |store| store.set_if_absent_blocking(&state))
            .await
    }
}

fn unavailable(error: sled::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

fn serialize(state: &AppState) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(state).map_err(|e| StoreError::Malformed(e.to_string()))
}

fn deserialize(bytes: &[u8]) -> Result<AppState, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Malformed(e.to_string()))
}
