use crate::{
    Result,
    app::control_api::{
        Command,
        ControlApi,
        StatusReport,
    },
    state::{
        HistoryEntry,
        Participant,
        Prize,
        SiteConfig,
        Winner,
    },
    transaction::{
        Intent,
        IntentError,
    },
};
use actix_cors::Cors;
use actix_web::{
    App,
    HttpResponse,
    HttpServer,
    ResponseError,
    dev::ServerHandle,
    http::{
        StatusCode,
        header::{
            ContentDisposition,
            DispositionParam,
            DispositionType,
        },
    },
    web,
};
use anyhow::{
    Context,
    anyhow,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    thread::JoinHandle,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearHistoryRequest {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportRequest {
    pub document: String,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error("{0}")]
    Internal(&'static str),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Intent(IntentError::NotLoaded) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Intent(IntentError::ConfirmationRequired) => {
                StatusCode::PRECONDITION_REQUIRED
            }
            ApiError::Intent(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

type Commands = web::Data<mpsc::Sender<Command>>;

pub struct ActixControlApi {
    receiver: mpsc::Receiver<Command>,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ActixControlApi {
    pub async fn new(port: Option<u16>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(16);

        let listener = TcpListener::bind(("127.0.0.1", port.unwrap_or(0)))
            .context("failed to bind HTTP listener for control API")?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("control API listening on {}", base_url);

        let server = HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(sender.clone()))
                .route("/state", web::get().to(handle_state))
                .route("/history", web::get().to(handle_history))
                .route("/backup", web::get().to(handle_backup))
                .route("/participants", web::put().to(handle_participants))
                .route("/prizes", web::put().to(handle_prizes))
                .route("/site-config", web::put().to(handle_site_config))
                .route("/draw", web::post().to(handle_draw))
                .route("/history/clear", web::post().to(handle_clear_history))
                .route("/import", web::post().to(handle_import))
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            receiver,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ControlApi for ActixControlApi {
    async fn command(&mut self) -> Result<Command> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| anyhow!("control server closed"))
    }
}

impl Drop for ActixControlApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn request<T>(
    commands: &Commands,
    command: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T, ApiError> {
    let (sender, receiver) = oneshot::channel();
    commands
        .get_ref()
        .send(command(sender))
        .await
        .map_err(|_| ApiError::Internal("unable to forward command"))?;
    receiver
        .await
        .map_err(|_| ApiError::Internal("command responder dropped"))
}

async fn submit(commands: &Commands, intent: Intent) -> Result<HttpResponse, ApiError> {
    tracing::info!("received {} request", intent.name());
    request(commands, |sender| Command::intent(intent, sender)).await??;
    Ok(HttpResponse::NoContent().finish())
}

async fn handle_state(commands: Commands) -> Result<web::Json<StatusReport>, ApiError> {
    tracing::debug!("received state request");
    let report = request(&commands, Command::Status).await?;
    Ok(web::Json(report))
}

async fn handle_history(
    commands: Commands,
) -> Result<web::Json<Vec<HistoryEntry>>, ApiError> {
    tracing::debug!("received history request");
    let history = request(&commands, Command::History)
        .await?
        .ok_or(IntentError::NotLoaded)?;
    Ok(web::Json(history))
}

async fn handle_backup(commands: Commands) -> Result<HttpResponse, ApiError> {
    tracing::info!("received backup export request");
    let document = request(&commands, Command::ExportBackup)
        .await?
        .ok_or(IntentError::NotLoaded)?;
    let file_name = backups::backup_file_name(chrono::Utc::now());
    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file_name)],
        })
        .body(document))
}

async fn handle_participants(
    commands: Commands,
    participants: web::Json<Vec<Participant>>,
) -> Result<HttpResponse, ApiError> {
    submit(&commands, Intent::UpdateRoster(participants.into_inner())).await
}

async fn handle_prizes(
    commands: Commands,
    prizes: web::Json<Vec<Prize>>,
) -> Result<HttpResponse, ApiError> {
    submit(&commands, Intent::UpdatePrizes(prizes.into_inner())).await
}

async fn handle_site_config(
    commands: Commands,
    site_config: web::Json<SiteConfig>,
) -> Result<HttpResponse, ApiError> {
    submit(&commands, Intent::UpdateSiteConfig(site_config.into_inner())).await
}

async fn handle_draw(
    commands: Commands,
    winners: web::Json<Vec<Winner>>,
) -> Result<HttpResponse, ApiError> {
    submit(&commands, Intent::CompleteDraw(winners.into_inner())).await
}

async fn handle_clear_history(
    commands: Commands,
    body: web::Json<ClearHistoryRequest>,
) -> Result<HttpResponse, ApiError> {
    let confirmed = body.confirm;
    submit(&commands, Intent::ClearHistory { confirmed }).await
}

async fn handle_import(
    commands: Commands,
    body: web::Json<ImportRequest>,
) -> Result<HttpResponse, ApiError> {
    let ImportRequest { document, confirm } = body.into_inner();
    submit(
        &commands,
        Intent::ImportFullState {
            document,
            confirmed: confirm,
        },
    )
    .await
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app::connection::ConnectionState,
        state::AppState,
        test_helpers::drawn_state,
    };

    #[tokio::test]
    async fn command__can_get_and_respond_to_status() {
        // given
        let mut api = ActixControlApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/state", api.base_url());
        let expected = StatusReport {
            connection: ConnectionState::Connected,
            model: Some(AppState::seed().read_model()),
        };

        let client_task = tokio::spawn(async move {
            let response = client.get(url).send().await.unwrap();
            response.json::<StatusReport>().await.unwrap()
        });

        // when
        let command = api.command().await.unwrap();
        if let Command::Status(sender) = command {
            sender.send(expected.clone()).unwrap();
        } else {
            panic!("expected status command got {:?}", command);
        }

        // then
        let response = client_task.await.unwrap();
        assert_eq!(response, expected);
    }

    #[tokio::test]
    async fn command__draw_request_is_forwarded_as_intent() {
        // given
        let mut api = ActixControlApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/draw", api.base_url());
        let batch = vec![Winner::new("w2", "p2", "2", 2_000)];
        let body = batch.clone();

        let client_task = tokio::spawn(async move {
            client.post(url).json(&body).send().await.unwrap().status()
        });

        // when
        let command = api.command().await.unwrap();
        if let Command::Intent(inner) = command {
            assert_eq!(inner.intent, Intent::CompleteDraw(batch));
            inner.sender.send(Ok(())).unwrap();
        } else {
            panic!("expected intent command got {:?}", command);
        }

        // then
        assert_eq!(client_task.await.unwrap(), reqwest::StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn command__unconfirmed_clear_maps_to_precondition_required() {
        // given
        let mut api = ActixControlApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/history/clear", api.base_url());

        let client_task = tokio::spawn(async move {
            let response = client
                .post(url)
                .json(&ClearHistoryRequest { confirm: false })
                .send()
                .await
                .unwrap();
            let status = response.status();
            (status, response.json::<ErrorBody>().await.unwrap())
        });

        // when
        let command = api.command().await.unwrap();
        if let Command::Intent(inner) = command {
            assert_eq!(inner.intent, Intent::ClearHistory { confirmed: false });
            inner
                .sender
                .send(Err(IntentError::ConfirmationRequired))
                .unwrap();
        } else {
            panic!("expected intent command got {:?}", command);
        }

        // then
        let (status, body) = client_task.await.unwrap();
        assert_eq!(status, reqwest::StatusCode::PRECONDITION_REQUIRED);
        assert_eq!(body.error, IntentError::ConfirmationRequired.to_string());
    }

    #[tokio::test]
    async fn command__backup_is_served_as_attachment() {
        // given
        let mut api = ActixControlApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/backup", api.base_url());
        let document = crate::backup::encode(&drawn_state()).unwrap();
        let expected = document.clone();

        let client_task = tokio::spawn(async move {
            let response = client.get(url).send().await.unwrap();
            let disposition = response
                .headers()
                .get(reqwest::header::CONTENT_DISPOSITION)
                .unwrap()
                .to_str()
                .unwrap()
                .to_string();
            (disposition, response.text().await.unwrap())
        });

        // when
        let command = api.command().await.unwrap();
        if let Command::ExportBackup(sender) = command {
            sender.send(Some(document)).unwrap();
        } else {
            panic!("expected backup command got {:?}", command);
        }

        // then
        let (disposition, body) = client_task.await.unwrap();
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains("lottery_cloud_backup_"));
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn command__history_before_first_snapshot_is_unavailable() {
        // given
        let mut api = ActixControlApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/history", api.base_url());

        let client_task = tokio::spawn(async move {
            client.get(url).send().await.unwrap().status()
        });

        // when
        let command = api.command().await.unwrap();
        if let Command::History(sender) = command {
            sender.send(None).unwrap();
        } else {
            panic!("expected history command got {:?}", command);
        }

        // then
        assert_eq!(
            client_task.await.unwrap(),
            reqwest::StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
