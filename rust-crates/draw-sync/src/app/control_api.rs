use crate::{
    app::connection::ConnectionState,
    state::{
        HistoryEntry,
        ReadModel,
    },
    transaction::{
        Intent,
        IntentError,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use tokio::sync::oneshot;

pub trait ControlApi {
    fn command(&mut self) -> impl Future<Output = crate::Result<Command>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub connection: ConnectionState,
    /// `None` until the first snapshot arrives
    pub model: Option<ReadModel>,
}

#[derive(Debug)]
pub enum Command {
    Status(oneshot::Sender<StatusReport>),
    History(oneshot::Sender<Option<Vec<HistoryEntry>>>),
    ExportBackup(oneshot::Sender<Option<String>>),
    Intent(IntentCommand),
}

#[derive(Debug)]
pub struct IntentCommand {
    pub intent: Intent,
    pub sender: oneshot::Sender<Result<(), IntentError>>,
}

impl Command {
    pub fn intent(
        intent: Intent,
        sender: oneshot::Sender<Result<(), IntentError>>,
    ) -> Self {
        Command::Intent(IntentCommand { intent, sender })
    }
}
