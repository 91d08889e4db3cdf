//! REST client for the DPX master server.
//!
//! ## Architecture
//!
//! - `models`: wire types and `FilterItem` factories
//! - `DpxClient`: stateless typed calls; every authenticated call takes a `Session`
//! - `Connection`: a client bound to the current session, which re-authenticates
//!   through a `Reauthenticate` strategy when the server answers 401
//!
//! A session is never patched in place. Logging in produces a new `Session`
//! and the connection swaps it in.

pub mod models;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, trace, warn};

use models::{
    FilterItem, JobInstance, JobStatusInfo, LicenseResponse, LogEntry, LoginRequest,
    LoginResponse, Node, NodeGroup,
};

/// Tracing target for request/response logging (`--debug-requests`).
pub const HTTP_TRACE_TARGET: &str = "dpxreport::api::http";

/// Error returned by API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server rejected the bearer token (HTTP 401)
    #[error("not authorized to access {path} (HTTP 401)")]
    Unauthorized { path: String },
    /// Any other non-success status
    #[error("server returned HTTP {status} for {path}")]
    Status { status: u16, path: String },
    /// Connection, TLS or timeout failure
    #[error("request to the server failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The response body was not what we expected
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid server address: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}

/// An authenticated session with the server.
#[derive(Clone)]
pub struct Session {
    user: String,
    token: String,
}

impl Session {
    pub fn new(user: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            token: token.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Prepend `http://` to hosts given without a scheme.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

/// Stateless client for the DPX REST API.
#[derive(Clone)]
pub struct DpxClient {
    base: Url,
    http: reqwest::Client,
}

impl DpxClient {
    /// Create a client for the server at `host` (e.g. `http://dpx-master.local`).
    pub fn new(host: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let normalized = normalize_host(host);
        let base = Url::parse(&normalized).map_err(|e| ApiError::InvalidUrl(format!("{normalized}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(normalized));
        }

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self { base, http })
    }

    /// The server address, as used for requests.
    pub fn host(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Log into the server.
    ///
    /// Returns `Ok(None)` when the server refuses the credentials or hands out
    /// an empty token.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<Session>, ApiError> {
        let path = "/auth/login";
        let body = LoginRequest { username, password };
        let request = self.request(Method::POST, path, None).json(&body);

        let response: LoginResponse = match self.send(path, request).await {
            Ok(response) => response,
            Err(ApiError::Unauthorized { .. }) | Err(ApiError::Status { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        if response.token.trim().is_empty() {
            return Ok(None);
        }

        debug!(user = %username, "Login accepted");
        Ok(Some(Session::new(username, response.token)))
    }

    pub async fn license(&self, session: &Session) -> Result<LicenseResponse, ApiError> {
        self.get(session, "/app/api/license", &[]).await
    }

    /// Job instances matching all of the given filters.
    pub async fn job_instances(
        &self,
        session: &Session,
        filters: &[FilterItem],
    ) -> Result<Vec<JobInstance>, ApiError> {
        let filter = serde_json::to_string(filters).map_err(|source| ApiError::Decode {
            path: "filter".to_string(),
            source,
        })?;
        self.get(session, "/app/api/job_instances", &[("filter", filter)])
            .await
    }

    /// One batch of log entries of a job instance, starting at `start`.
    pub async fn job_logs(
        &self,
        session: &Session,
        job_id: i64,
        start: usize,
        count: usize,
    ) -> Result<Vec<LogEntry>, ApiError> {
        self.get(
            session,
            &format!("/app/api/job_instances/{job_id}/log"),
            &[("index", start.to_string()), ("count", count.to_string())],
        )
        .await
    }

    /// Display information for the status a job instance's status URL points at.
    ///
    /// Returns `Ok(None)` when `status_url` is not an absolute URL.
    pub async fn status_info(
        &self,
        session: &Session,
        status_url: &str,
    ) -> Result<Option<JobStatusInfo>, ApiError> {
        let Some(status) = models::status_url_segment(status_url) else {
            return Ok(None);
        };
        self.get(session, &format!("/app/api/job_instance_statuses/{status}"), &[])
            .await
            .map(Some)
    }

    pub async fn node_groups(&self, session: &Session) -> Result<Vec<NodeGroup>, ApiError> {
        self.get(session, "/app/api/node_groups", &[]).await
    }

    /// Nodes, optionally restricted to a node group and/or node type.
    pub async fn nodes(
        &self,
        session: &Session,
        group: Option<&str>,
        node_type: Option<&str>,
    ) -> Result<Vec<Node>, ApiError> {
        let mut query = Vec::new();
        if let Some(group) = group.filter(|g| !g.trim().is_empty()) {
            query.push(("node_group_name", group.to_string()));
        }
        if let Some(node_type) = node_type.filter(|t| !t.trim().is_empty()) {
            query.push(("node_type", node_type.to_string()));
        }
        self.get(session, "/app/api/nodes", &query).await
    }

    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> reqwest::RequestBuilder {
        let mut url = self.base.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}{path}"));

        let mut request = self.http.request(method, url);
        if let Some(session) = session {
            request = request.header(reqwest::header::AUTHORIZATION, session.bearer());
        }
        request
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let request = self.request(Method::GET, path, Some(session)).query(query);
        self.send(path, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        trace!(target: HTTP_TRACE_TARGET, path = %path, "Sending request");
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        trace!(target: HTTP_TRACE_TARGET, path = %path, status = status.as_u16(), body = %body, "Received response");

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

/// Strategy consulted when the server rejects the current session.
///
/// Returning `None` gives up and lets the original error propagate.
#[async_trait]
pub trait Reauthenticate: Send + Sync {
    async fn reauthenticate(
        &self,
        client: &DpxClient,
        expired: &Session,
        error: &ApiError,
    ) -> Option<Session>;
}

/// Never re-authenticates.
pub struct NoReauth;

#[async_trait]
impl Reauthenticate for NoReauth {
    async fn reauthenticate(&self, _: &DpxClient, _: &Session, _: &ApiError) -> Option<Session> {
        None
    }
}

/// A client bound to the current session.
pub struct Connection {
    client: DpxClient,
    session: Session,
    reauth: Box<dyn Reauthenticate>,
    max_reauth_attempts: u32,
}

impl Connection {
    pub fn new(
        client: DpxClient,
        session: Session,
        reauth: Box<dyn Reauthenticate>,
        max_reauth_attempts: u32,
    ) -> Self {
        Self {
            client,
            session,
            reauth,
            max_reauth_attempts,
        }
    }

    pub fn client(&self) -> &DpxClient {
        &self.client
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run `op` with the current session, re-authenticating on 401.
    ///
    /// At most `max_reauth_attempts` new sessions are requested per call.
    pub async fn call<T, F, Fut>(&mut self, op: F) -> Result<T, ApiError>
    where
        F: Fn(DpxClient, Session) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempts = 0;
        loop {
            let error = match op(self.client.clone(), self.session.clone()).await {
                Err(e) if e.is_unauthorized() => e,
                other => return other,
            };

            if attempts >= self.max_reauth_attempts {
                warn!(attempts, error = %error, "Giving up after re-authentication attempts");
                return Err(error);
            }
            attempts += 1;

            warn!(user = %self.session.user(), error = %error, "Session rejected, re-authenticating");
            match self
                .reauth
                .reauthenticate(&self.client, &self.session, &error)
                .await
            {
                Some(session) => self.session = session,
                None => return Err(error),
            }
        }
    }

    pub async fn license(&mut self) -> Result<LicenseResponse, ApiError> {
        self.call(|c, s| async move { c.license(&s).await }).await
    }

    pub async fn job_instances(&mut self, filters: &[FilterItem]) -> Result<Vec<JobInstance>, ApiError> {
        let filters = filters.to_vec();
        self.call(move |c, s| {
            let filters = filters.clone();
            async move { c.job_instances(&s, &filters).await }
        })
        .await
    }

    pub async fn job_logs(&mut self, job_id: i64, start: usize, count: usize) -> Result<Vec<LogEntry>, ApiError> {
        self.call(|c, s| async move { c.job_logs(&s, job_id, start, count).await })
            .await
    }

    pub async fn status_info(&mut self, status_url: &str) -> Result<Option<JobStatusInfo>, ApiError> {
        self.call(|c, s| async move { c.status_info(&s, status_url).await })
            .await
    }

    pub async fn node_groups(&mut self) -> Result<Vec<NodeGroup>, ApiError> {
        self.call(|c, s| async move { c.node_groups(&s).await }).await
    }

    pub async fn nodes(&mut self, group: Option<&str>, node_type: Option<&str>) -> Result<Vec<Node>, ApiError> {
        let group = group.map(str::to_string);
        let node_type = node_type.map(str::to_string);
        self.call(move |c, s| {
            let group = group.clone();
            let node_type = node_type.clone();
            async move { c.nodes(&s, group.as_deref(), node_type.as_deref()).await }
        })
        .await
    }
}
