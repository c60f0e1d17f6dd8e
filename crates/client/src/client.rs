use std::time::Duration;

use async_trait::async_trait;
use medportal_core::config::BackendConfig;
use medportal_core::domain::summary::QuotationSummary;
use medportal_core::flows::payload::QuotationPayload;
use medportal_core::gateway::{GatewayError, QuotationGateway, SavedQuotation, TokenRenewer};
use medportal_core::session::profile::UserProfile;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::extract::{
    extract_error_message, extract_list, extract_profile, extract_token, unwrap_data,
};

/// Token and profile returned by a successful login.
#[derive(Clone, Debug)]
pub struct LoginSession {
    pub token: SecretString,
    pub profile: UserProfile,
}

/// Unauthenticated handle on the backend. Login and token renewal go through
/// here; document calls go through [`AuthenticatedClient`].
#[derive(Clone, Debug)]
pub struct PortalClient {
    http: Client,
    base_url: String,
    login_path: String,
    refresh_path: String,
    quotations_path: String,
    timeout_secs: u64,
}

impl PortalClient {
    pub fn new(config: &BackendConfig) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            login_path: config.login_path.clone(),
            refresh_path: config.refresh_path.clone(),
            quotations_path: config.quotations_path.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn authenticated(&self, token: impl Into<String>) -> AuthenticatedClient {
        AuthenticatedClient { client: self.clone(), token: SecretString::from(token.into()) }
    }

    pub async fn login(
        &self,
        login: &str,
        password: &SecretString,
    ) -> Result<LoginSession, GatewayError> {
        let request = self
            .http
            .post(self.url(&self.login_path))
            .json(&json!({ "login": login, "password": password.expose_secret() }));
        let body = self.execute(request, "login").await?;

        let token = extract_token(&body).ok_or(GatewayError::MissingToken)?;
        let profile = extract_profile(&body, login);
        Ok(LoginSession { token: SecretString::from(token), profile })
    }

    /// Reachability check: any HTTP response counts, whatever its status.
    pub async fn probe(&self) -> Result<u16, GatewayError> {
        let response = self
            .http
            .get(&self.base_url)
            .send()
            .await
            .map_err(|error| self.transport_error(error, "probe"))?;
        Ok(response.status().as_u16())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn document_url(&self, doc_entry: i64) -> String {
        format!("{}({doc_entry})", self.url(&self.quotations_path))
    }

    /// Sends the request and returns the decoded body. An empty body reads as
    /// `null`; non-2xx statuses map through [`GatewayError::from_status`].
    async fn execute(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<Value, GatewayError> {
        let response =
            request.send().await.map_err(|error| self.transport_error(error, operation))?;
        let status = response.status();
        let text =
            response.text().await.map_err(|error| self.transport_error(error, operation))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .as_ref()
                .and_then(extract_error_message);
            warn!(
                event_name = "backend.request.rejected",
                operation,
                status = status.as_u16(),
                message = message.as_deref().unwrap_or(""),
                "backend rejected request"
            );
            return Err(GatewayError::from_status(status.as_u16(), message));
        }

        debug!(event_name = "backend.request.completed", operation, status = status.as_u16());
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|error| GatewayError::Decode(error.to_string()))
    }

    fn transport_error(&self, error: reqwest::Error, operation: &'static str) -> GatewayError {
        let mapped = if error.is_timeout() {
            GatewayError::Timeout { secs: self.timeout_secs }
        } else {
            GatewayError::Transport(error.to_string())
        };
        warn!(
            event_name = "backend.request.failed",
            operation,
            error = %mapped,
            "backend unreachable"
        );
        mapped
    }
}

#[async_trait]
impl TokenRenewer for PortalClient {
    async fn renew(&self, current_token: &str) -> Result<String, GatewayError> {
        let request = self.http.post(self.url(&self.refresh_path)).bearer_auth(current_token);
        let body = self.execute(request, "token_refresh").await?;
        extract_token(&body).ok_or(GatewayError::MissingToken)
    }
}

/// Backend handle carrying the bearer token on every call.
#[derive(Clone, Debug)]
pub struct AuthenticatedClient {
    client: PortalClient,
    token: SecretString,
}

impl AuthenticatedClient {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(self.token.expose_secret())
    }
}

#[async_trait]
impl QuotationGateway for AuthenticatedClient {
    async fn list(&self) -> Result<Vec<QuotationSummary>, GatewayError> {
        let url = self.client.url(&self.client.quotations_path);
        let body = self.client.execute(self.authorize(self.client.http.get(url)), "list").await?;
        Ok(extract_list(body))
    }

    async fn fetch(&self, doc_entry: i64) -> Result<QuotationSummary, GatewayError> {
        let request = self.authorize(self.client.http.get(self.client.document_url(doc_entry)));
        let body = self.client.execute(request, "fetch").await?;
        serde_json::from_value(unwrap_data(body))
            .map_err(|error| GatewayError::Decode(error.to_string()))
    }

    async fn create(&self, payload: &QuotationPayload) -> Result<SavedQuotation, GatewayError> {
        let url = self.client.url(&self.client.quotations_path);
        let request = self.authorize(self.client.http.post(url)).json(payload);
        let body = self.client.execute(request, "create").await?;
        Ok(saved_from(body))
    }

    async fn update(
        &self,
        doc_entry: i64,
        payload: &QuotationPayload,
    ) -> Result<SavedQuotation, GatewayError> {
        let request = self
            .authorize(self.client.http.patch(self.client.document_url(doc_entry)))
            .json(payload);
        let body = self.client.execute(request, "update").await?;
        let mut saved = saved_from(body);
        saved.doc_entry.get_or_insert(doc_entry);
        Ok(saved)
    }
}

fn saved_from(body: Value) -> SavedQuotation {
    let body = unwrap_data(body);
    let read =
        |keys: [&str; 2]| keys.iter().find_map(|key| body.get(*key).and_then(Value::as_i64));
    SavedQuotation {
        doc_entry: read(["DocEntry", "docEntry"]),
        doc_num: read(["DocNum", "docNum"]),
    }
}
