use crate::{
    app::connection::ConnectionState,
    state::{
        AppState,
        ReadModel,
    },
    transaction::Patch,
};
use std::sync::Arc;
use tokio::sync::watch;

/// What every view renders from. Each value is immutable; a change produces
/// a new view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncView {
    pub connection: ConnectionState,
    pub state: Option<Arc<AppState>>,
}

impl SyncView {
    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    pub fn read_model(&self) -> Option<ReadModel> {
        self.state.as_deref().map(AppState::read_model)
    }

    pub fn available_pool_count(&self) -> Option<usize> {
        self.state.as_deref().map(AppState::available_pool_count)
    }
}

/// Local mirror of the remote document. Only the sync engine writes to it;
/// views get a `watch` receiver.
pub struct SnapshotCache {
    views: watch::Sender<SyncView>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let (views, _) = watch::channel(SyncView::default());
        Self { views }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncView> {
        self.views.subscribe()
    }

    pub fn view(&self) -> SyncView {
        self.views.borrow().clone()
    }

    pub fn current(&self) -> Option<Arc<AppState>> {
        self.views.borrow().state.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.views.borrow().connection.clone()
    }

    pub fn replace(&self, state: AppState) {
        self.views
            .send_modify(|view| view.state = Some(Arc::new(state)));
    }

    /// Applies a patch locally; a cache that was never loaded stays empty.
    pub fn apply(&self, patch: &Patch) -> bool {
        self.views.send_if_modified(|view| match view.state.as_deref() {
            Some(current) => {
                view.state = Some(Arc::new(patch.apply_to(current)));
                true
            }
            None => false,
        })
    }

    pub fn set_connection(&self, connection: ConnectionState) {
        self.views.send_if_modified(|view| {
            if view.connection == connection {
                false
            } else {
                view.connection = connection;
                true
            }
        });
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}
