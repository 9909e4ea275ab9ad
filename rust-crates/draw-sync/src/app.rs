use crate::{
    Result,
    app::{
        control_api::{
            Command,
            ControlApi,
            IntentCommand,
            StatusReport,
        },
        document_store::DocumentStore,
        sync_engine::{
            SyncEngine,
            SyncEvent,
        },
    },
    backup,
};
use anyhow::Context;
use backups::BackupDir;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

pub mod actix_control_api;
pub mod connection;
pub mod control_api;
pub mod document_store;
pub mod in_memory_document_store;
pub mod sled_document_store;
pub mod snapshot_cache;
pub mod sync_engine;


pub enum RunState {
    Continue,
    Exit,
}

enum Step {
    Sync(SyncEvent),
    Command(Result<Command>),
    Interrupted,
}

pub struct App<Store: DocumentStore, API> {
    engine: SyncEngine<Store>,
    api: API,
    backups: Option<BackupDir>,
}

impl<Store: DocumentStore, API> App<Store, API> {
    pub fn new(engine: SyncEngine<Store>, api: API) -> Self {
        Self {
            engine,
            api,
            backups: None,
        }
    }

    /// Write a final backup here when the service shuts down.
    pub fn with_backup_dir(mut self, backups: BackupDir) -> Self {
        self.backups = Some(backups);
        self
    }

    pub fn engine(&self) -> &SyncEngine<Store> {
        &self.engine
    }

    pub fn start(&mut self) -> Result<()> {
        self.engine
            .subscribe()
            .context("subscribe to remote document")
    }
}

impl<Store: DocumentStore, API: ControlApi> App<Store, API> {
    pub async fn run(&mut self, interrupt: impl Future<Output = ()>) -> Result<RunState> {
        let step = tokio::select! {
            event = self.engine.next_event() => Step::Sync(event),
            command = self.api.command() => Step::Command(command),
            _ = interrupt => Step::Interrupted,
        };
        match step {
            Step::Sync(event) => {
                tracing::debug!("sync event: {event:?}");
                Ok(RunState::Continue)
            }
            Step::Command(command) => {
                self.handle_command(command?)?;
                Ok(RunState::Continue)
            }
            Step::Interrupted => {
                self.shutdown()?;
                Ok(RunState::Exit)
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Status(sender) => {
                let view = self.engine.view();
                let report = StatusReport {
                    model: view.read_model(),
                    connection: view.connection,
                };
                respond(sender, report, "status");
            }
            Command::History(sender) => {
                let history = self.engine.current().map(|state| state.history());
                respond(sender, history, "history");
            }
            Command::ExportBackup(sender) => {
                let document = self
                    .engine
                    .current()
                    .map(|state| backup::encode(&state))
                    .transpose()?;
                respond(sender, document, "backup");
            }
            Command::Intent(IntentCommand { intent, sender }) => {
                let result = self.engine.dispatch(intent);
                respond(sender, result, "intent");
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.engine.unsubscribe();
        let (Some(backups), Some(state)) = (&self.backups, self.engine.current()) else {
            return Ok(());
        };
        let document = backup::encode(&state)?;
        let path = backups
            .save(&document, chrono::Utc::now())
            .context("write final backup")?;
        tracing::info!("wrote final backup to {}", path.display());
        Ok(())
    }
}

fn respond<T>(sender: oneshot::Sender<T>, value: T, label: &str) {
    if sender.send(value).is_err() {
        tracing::warn!("{label} requester went away before the response");
    }
}

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
