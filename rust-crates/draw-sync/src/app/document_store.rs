use crate::{
    state::AppState,
    transaction::Patch,
};

/// What a subscription hands over: the whole document (`None` when the path
/// holds nothing) or the error the store reported.
pub type Delivery = Result<Option<AppState>, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store refused the read or write; the message is the store's own.
    #[error("{0}")]
    Denied(String),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error("stored document is malformed: {0}")]
    Malformed(String),
    #[error("subscription closed")]
    Closed,
}

/// A remote key/JSON-document store holding the root document at one path.
/// Clones talk to the same document.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    type Subscription: DocumentSubscription;

    /// start push delivery of the root document; the current value is
    /// delivered first
    fn subscribe(&self) -> Result<Self::Subscription, StoreError>;

    /// replace the whole document
    fn set(&self, state: AppState) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// replace only the top-level fields named by the patch
    fn update(&self, patch: Patch) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// write the document only if the path is empty; `Ok(false)` when someone
    /// else got there first
    fn set_if_absent(
        &self,
        state: AppState,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

pub trait DocumentSubscription {
    fn next_delivery(&mut self) -> impl Future<Output = Delivery>;
}
