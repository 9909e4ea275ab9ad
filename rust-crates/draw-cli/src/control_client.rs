use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use draw_sync::{
    app::{
        actix_control_api::{
            ClearHistoryRequest,
            ErrorBody,
            ImportRequest,
        },
        control_api::StatusReport,
    },
    state::{
        HistoryEntry,
        Winner,
    },
};
use reqwest::{
    Response,
    StatusCode,
};
use url::Url;

#[derive(Clone)]
pub struct ControlClient {
    base_url: Url,
    http: reqwest::Client,
}

impl ControlClient {
    pub fn new(mut base_url: Url) -> Result<Self> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for control service")?;
        Ok(Self { base_url, http })
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let res = self
            .http
            .get(self.endpoint("state")?)
            .send()
            .await
            .wrap_err("control service request failed")?;
        let res = check(res, "fetching state").await?;
        res.json().await.wrap_err("invalid state payload")
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let res = self
            .http
            .get(self.endpoint("history")?)
            .send()
            .await
            .wrap_err("control service request failed")?;
        let res = check(res, "fetching history").await?;
        res.json().await.wrap_err("invalid history payload")
    }

    pub async fn export_backup(&self) -> Result<String> {
        let res = self
            .http
            .get(self.endpoint("backup")?)
            .send()
            .await
            .wrap_err("control service request failed")?;
        let res = check(res, "exporting backup").await?;
        res.text().await.wrap_err("failed to read backup body")
    }

    pub async fn import_backup(&self, document: String, confirm: bool) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint("import")?)
            .json(&ImportRequest { document, confirm })
            .send()
            .await
            .wrap_err("control service request failed")?;
        check(res, "importing backup").await?;
        Ok(())
    }

    pub async fn clear_history(&self, confirm: bool) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint("history/clear")?)
            .json(&ClearHistoryRequest { confirm })
            .send()
            .await
            .wrap_err("control service request failed")?;
        check(res, "clearing history").await?;
        Ok(())
    }

    pub async fn draw(&self, winners: &[Winner]) -> Result<()> {
        let res = self
            .http
            .post(self.endpoint("draw")?)
            .json(winners)
            .send()
            .await
            .wrap_err("control service request failed")?;
        check(res, "recording draw").await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .wrap_err_with(|| format!("invalid control service path {path}"))
    }
}

async fn check(res: Response, action: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let bytes = res
        .bytes()
        .await
        .wrap_err("failed to read control service response body")?;
    let message = serde_json::from_slice::<ErrorBody>(&bytes)
        .map(|body| body.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).into_owned());
    if status == StatusCode::PRECONDITION_REQUIRED {
        return Err(eyre!("{message}; re-run with --yes to confirm"));
    }
    Err(eyre!(
        "control service responded with {status} when {action}: {message}"
    ))
}
