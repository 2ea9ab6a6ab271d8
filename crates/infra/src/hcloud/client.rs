//! Thin REST client for the Hetzner Cloud API
//!
//! Reads are retried by [`HttpClient::send`]; anything that changes remote
//! state goes out exactly once. Long-running operations return an
//! [`Action`] which [`HcloudClient::wait_for_action`] polls until it
//! succeeds, fails, or the poll budget runs out.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use servertide_common::{poll_until, PollConfig, PollError, PollStatus};
use servertide_domain::{HcloudConfig, Result, ServerTideError};
use tracing::{debug, instrument};

use super::types::{
    Action, ActionResponse, AssignFloatingIpRequest, CreateImageRequest, CreateImageResponse,
    CreateServerRequest, CreateServerResponse, ErrorResponse, FloatingIp, FloatingIpsResponse,
    Image, ImagesResponse, Paginated, Server, ServerResponse, ServersResponse, SshKey,
    SshKeysResponse,
};
use crate::errors::{status_error, InfraError};
use crate::http::HttpClient;

const PER_PAGE: &str = "50";

/// Hetzner Cloud API client
#[derive(Clone)]
pub struct HcloudClient {
    http: HttpClient,
    base_url: String,
    poll: PollConfig,
}

impl HcloudClient {
    pub fn new(http: HttpClient, base_url: impl Into<String>, poll: PollConfig) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, poll }
    }

    /// Build an authenticated client from configuration.
    pub fn from_config(config: &HcloudConfig) -> Result<Self> {
        let http = HttpClient::builder().bearer_token(&config.api_token)?.build()?;
        let poll = PollConfig::new(config.poll_interval(), config.action_max_retries);
        Ok(Self::new(http, &config.api_url, poll))
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Servers carrying `label_selector`, oldest first as the API returns them.
    pub async fn list_servers(&self, label_selector: &str) -> Result<Vec<Server>> {
        self.list_all::<ServersResponse>("/servers", &[("label_selector", label_selector)]).await
    }

    pub async fn get_server(&self, id: u64) -> Result<Server> {
        let body: ServerResponse =
            self.read(self.request(Method::GET, &format!("/servers/{id}"))).await?;
        Ok(body.server)
    }

    pub async fn create_server(&self, body: &CreateServerRequest) -> Result<CreateServerResponse> {
        self.write(self.request(Method::POST, "/servers").json(body)).await
    }

    pub async fn delete_server(&self, id: u64) -> Result<Action> {
        let body: ActionResponse =
            self.write(self.request(Method::DELETE, &format!("/servers/{id}"))).await?;
        Ok(body.action)
    }

    /// Trigger a body-less server action such as `poweron` or `shutdown`.
    pub async fn server_action(&self, id: u64, action: &str) -> Result<Action> {
        let body: ActionResponse = self
            .write(self.request(Method::POST, &format!("/servers/{id}/actions/{action}")))
            .await?;
        Ok(body.action)
    }

    pub async fn create_image(
        &self,
        server_id: u64,
        body: &CreateImageRequest,
    ) -> Result<CreateImageResponse> {
        let path = format!("/servers/{server_id}/actions/create_image");
        self.write(self.request(Method::POST, &path).json(body)).await
    }

    /// Snapshots carrying `label_selector`, newest first.
    pub async fn list_snapshots(&self, label_selector: &str) -> Result<Vec<Image>> {
        let query = [
            ("type", "snapshot"),
            ("label_selector", label_selector),
            ("sort", "created:desc"),
        ];
        self.list_all::<ImagesResponse>("/images", &query).await
    }

    pub async fn delete_image(&self, id: u64) -> Result<()> {
        let request = self.request(Method::DELETE, &format!("/images/{id}"));
        let response = self.http.send_once(request).await?;
        check_status(response).await.map(|_| ())
    }

    pub async fn list_floating_ips(&self, label_selector: &str) -> Result<Vec<FloatingIp>> {
        let query = [("label_selector", label_selector)];
        self.list_all::<FloatingIpsResponse>("/floating_ips", &query).await
    }

    pub async fn assign_floating_ip(&self, floating_ip_id: u64, server_id: u64) -> Result<Action> {
        let path = format!("/floating_ips/{floating_ip_id}/actions/assign");
        let request = self
            .request(Method::POST, &path)
            .json(&AssignFloatingIpRequest { server: server_id });
        let body: ActionResponse = self.write(request).await?;
        Ok(body.action)
    }

    pub async fn list_ssh_keys(&self, label_selector: &str) -> Result<Vec<SshKey>> {
        self.list_all::<SshKeysResponse>("/ssh_keys", &[("label_selector", label_selector)]).await
    }

    pub async fn get_action(&self, id: u64) -> Result<Action> {
        let body: ActionResponse =
            self.read(self.request(Method::GET, &format!("/actions/{id}"))).await?;
        Ok(body.action)
    }

    /// Poll `action` until the provider reports it finished.
    ///
    /// # Errors
    /// `ServerTideError::Driver` when the action ends in `error` or is still
    /// running after the poll budget.
    #[instrument(skip(self, action), fields(action_id = action.id, command = %action.command))]
    pub async fn wait_for_action(&self, action: &Action) -> Result<()> {
        if let Some(result) = action_result(action) {
            return result;
        }

        let outcome = poll_until(self.poll, move || async move {
            let current = self.get_action(action.id).await?;
            match action_result(&current) {
                Some(Ok(())) => Ok::<_, ServerTideError>(PollStatus::Ready(())),
                Some(Err(e)) => Err(e),
                None => Ok(PollStatus::Pending),
            }
        })
        .await;

        match outcome {
            Ok(()) => {
                debug!("action finished");
                Ok(())
            }
            Err(PollError::Failed { source }) => Err(source),
            Err(PollError::Exhausted { attempts }) => Err(ServerTideError::Driver(format!(
                "action {} ({}) still running after {attempts} polls",
                action.id, action.command
            ))),
        }
    }

    /// Poll the server until its status equals `status`.
    #[instrument(skip(self))]
    pub async fn wait_for_server_status(&self, id: u64, status: &str) -> Result<()> {
        let outcome = poll_until(self.poll, move || async move {
            let server = self.get_server(id).await?;
            Ok::<_, ServerTideError>(if server.status == status {
                PollStatus::Ready(())
            } else {
                PollStatus::Pending
            })
        })
        .await;

        outcome.map_err(|e| match e {
            PollError::Failed { source } => source,
            PollError::Exhausted { attempts } => ServerTideError::Driver(format!(
                "server {id} did not reach status '{status}' after {attempts} polls"
            )),
        })
    }

    /// GET every page of a list endpoint, following `meta.pagination.next_page`.
    async fn list_all<R>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<R::Item>>
    where
        R: Paginated + DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page: u32 = 1;
        loop {
            let page_param = page.to_string();
            let request = self
                .request(Method::GET, path)
                .query(query)
                .query(&[("per_page", PER_PAGE), ("page", page_param.as_str())]);
            let body: R = self.read(request).await?;
            let (mut batch, next_page) = body.into_page();
            items.append(&mut batch);

            match next_page {
                Some(next) if next > page => {
                    debug!(path, page = next, "fetching next page");
                    page = next;
                }
                _ => return Ok(items),
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{path}", self.base_url))
    }

    async fn read<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.http.send(builder).await?;
        decode(response).await
    }

    async fn write<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.http.send_once(builder).await?;
        decode(response).await
    }
}

/// `Some` once the action has left the `running` state.
fn action_result(action: &Action) -> Option<Result<()>> {
    match action.status.as_str() {
        "success" => Some(Ok(())),
        "error" => {
            let reason = action
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.code, e.message))
                .unwrap_or_else(|| "unknown error".to_string());
            Some(Err(ServerTideError::Driver(format!(
                "action {} ({}) failed: {reason}",
                action.id, action.command
            ))))
        }
        _ => None,
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(parsed) => format!("{}: {}", parsed.error.code, parsed.error.message),
        Err(_) if body.is_empty() => String::new(),
        Err(_) => body,
    };
    Err(status_error(status, &detail))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    if response.status() == StatusCode::NO_CONTENT {
        return serde_json::from_value(serde_json::Value::Null)
            .map_err(|e| ServerTideError::from(InfraError::from(e)));
    }
    response.json::<T>().await.map_err(|e| ServerTideError::from(InfraError::from(e)))
}
