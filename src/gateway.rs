//! Credentialed calls against a provider API.
//!
//! [`ApiGateway`] attaches the session's credential to each request. When the
//! provider answers with an authorization failure it asks the
//! [`SessionManager`] for exactly one refresh and repeats the call once. Any
//! other failure is returned immediately; retrying transient network errors is
//! the caller's decision.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    auth::authorize_request,
    error::{ApiError, truncate_body},
    management::SessionManager,
    types::Credential,
    utils,
};

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }
}

/// Result of one attempt, before the retry decision.
enum Attempt {
    Done(ApiResponse),
    Unauthorized(String),
}

pub struct ApiGateway {
    http: Client,
    session: SessionManager,
}

impl ApiGateway {
    pub fn new(http: Client, session: SessionManager) -> Self {
        ApiGateway { http, session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    /// Performs one API call, with at most one refresh-and-retry on an
    /// authorization failure. A second authorization failure, or a failed
    /// refresh, is returned as `ApiError::Unauthorized` without a third call.
    pub async fn call(
        &mut self,
        method: Method,
        endpoint: &str,
        body: Option<&RequestBody>,
    ) -> Result<ApiResponse, ApiError> {
        let credential = self.session.get_valid_credential().await?;

        let first_body = match self.send(&method, endpoint, body, &credential).await? {
            Attempt::Done(response) => return Ok(response),
            Attempt::Unauthorized(body) => body,
        };

        let provider = self.session.config().provider_id.clone();
        debug!(provider = %provider, endpoint, "authorization failed, refreshing once");
        let refreshed = match self.session.refresh().await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(provider = %provider, "refresh after authorization failure failed: {}", e);
                return Err(ApiError::Unauthorized { body: first_body });
            }
        };

        match self.send(&method, endpoint, body, &refreshed).await? {
            Attempt::Done(response) => Ok(response),
            Attempt::Unauthorized(body) => {
                warn!(provider = %provider, endpoint, "still unauthorized after refresh");
                Err(ApiError::Unauthorized { body })
            }
        }
    }

    pub async fn get(&mut self, endpoint: &str) -> Result<ApiResponse, ApiError> {
        self.call(Method::GET, endpoint, None).await
    }

    pub async fn post_json(&mut self, endpoint: &str, body: Value) -> Result<ApiResponse, ApiError> {
        self.call(Method::POST, endpoint, Some(&RequestBody::Json(body)))
            .await
    }

    async fn send(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&RequestBody>,
        credential: &Credential,
    ) -> Result<Attempt, ApiError> {
        let config = self.session.config();
        let url = utils::join_url(&config.api_base, endpoint);

        let mut request = self.http.request(method.clone(), &url);
        for (name, value) in &config.default_headers {
            request = request.header(name, value);
        }
        request = match body {
            Some(RequestBody::Json(json)) => request.json(json),
            Some(RequestBody::Form(form)) => request.form(form),
            None => request,
        };

        let response = authorize_request(request, credential, config).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(provider = %config.provider_id, %method, url = %url, status = status.as_u16(), "api call finished");

        if status == StatusCode::UNAUTHORIZED || config.is_session_expired_payload(&text) {
            return Ok(Attempt::Unauthorized(truncate_body(&text)));
        }
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &text));
        }

        Ok(Attempt::Done(ApiResponse {
            status: status.as_u16(),
            body: text,
        }))
    }
}
