//! Authenticated HTTP client
//!
//! Every request reads the access token from the `SessionStore` and sends it
//! as a bearer token. A 401 on a first attempt enters the refresh path (see
//! `recover`); anything else, including a 401 on a replay, goes back to the
//! caller unchanged.

use std::sync::Arc;
use std::time::{Duration, Instant};

use forge_auth::{DEFAULT_API_URL, LOGIN_ROUTE, SessionStore, endpoint_url};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::error::{ApiErrorBody, ClientError, Result, SessionError};
use crate::inactivity::ActivityTracker;
use crate::navigator::{LogNavigator, Navigator};
use crate::refresh::{LeaderGuard, RefreshCoordinator, Ticket};
use crate::users::UsersApi;

/// Correlates client logs with backend logs.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request knobs beyond method, path and body.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Override the client-wide timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Everything needed to send (and later replay) one request.
struct Call<'a> {
    method: Method,
    path: &'a str,
    body: Option<&'a serde_json::Value>,
    options: &'a RequestOptions,
}

/// API client with bearer-token attachment and single-flight refresh.
///
/// Refresh state is per instance, so separate clients (one per test, one
/// per tenant) never wait on each other's refresh. Share one instance
/// behind an `Arc` to get the single-flight behaviour across tasks.
pub struct AuthenticatedClient {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    refresh: RefreshCoordinator,
    activity: ActivityTracker,
}

impl AuthenticatedClient {
    pub fn builder() -> AuthenticatedClientBuilder {
        AuthenticatedClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, without any token handling.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    /// Whether a refresh is running right now.
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    /// Typed access to `/usuarios/`.
    pub fn users(&self) -> UsersApi<'_> {
        UsersApi::new(self)
    }

    /// Send a request, recovering transparently from an expired access token.
    ///
    /// Returns the backend's response whatever its status. Errors are
    /// transport failures and session-ending refresh failures.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        self.request_with(method, path, body, &RequestOptions::default())
            .await
    }

    /// `request` with query parameters or a timeout override.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn request_with(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        options: &RequestOptions,
    ) -> Result<Response> {
        self.activity.touch();

        let call = Call {
            method,
            path,
            body,
            options,
        };
        let token = self.store.access_token().await;
        let response = self.send(&call, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("401 on first attempt, entering refresh path");
        self.recover(&call, token).await
    }

    /// Handle a first-time 401: refresh once, then replay exactly once.
    async fn recover(&self, call: &Call<'_>, sent_with: Option<String>) -> Result<Response> {
        loop {
            let outcome = match self.refresh.join() {
                Ticket::Follower(rx) => rx,
                Ticket::Leader(guard) => {
                    // Another cycle already replaced the token this request was sent with
                    if let Some(current) = self.store.access_token().await
                        && sent_with.as_deref() != Some(current.as_str())
                    {
                        debug!("access token already replaced, replaying without refresh");
                        guard.settle(Ok(current.clone()));
                        crate::metrics::record_refresh("skipped");
                        return self.send(call, Some(&current)).await;
                    }

                    let Some(refresh_token) = self.store.refresh_token().await else {
                        warn!("401 with no refresh token stored, ending session");
                        self.end_session("missing_refresh_token").await;
                        guard.settle(Err(SessionError::MissingRefreshToken));
                        crate::metrics::record_refresh("missing_token");
                        return Err(SessionError::MissingRefreshToken.into());
                    };

                    // Detached: the refresh persists its tokens and settles the
                    // queue even if this request is dropped while it runs
                    let rx = guard.waiter();
                    tokio::spawn(
                        self.refresh_job()
                            .run(refresh_token, guard)
                            .in_current_span(),
                    );
                    rx
                }
            };

            match outcome.await {
                Ok(Ok(token)) => {
                    debug!("replaying request with refreshed token");
                    return self.send(call, Some(&token)).await;
                }
                Ok(Err(SessionError::RefreshAbandoned)) | Err(_) => {
                    debug!("refresh abandoned before completing, joining again");
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    fn refresh_job(&self) -> RefreshJob {
        RefreshJob {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            store: self.store.clone(),
            navigator: self.navigator.clone(),
        }
    }

    /// Put one request on the wire.
    async fn send(&self, call: &Call<'_>, token: Option<&str>) -> Result<Response> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut builder = self
            .http
            .request(call.method.clone(), endpoint_url(&self.base_url, call.path))
            .header(REQUEST_ID_HEADER, request_id.as_str());

        if !call.options.query.is_empty() {
            builder = builder.query(&call.options.query);
        }
        if let Some(timeout) = call.options.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = call.body {
            builder = builder.json(body);
        }

        let started = Instant::now();
        let response = builder.send().await.inspect_err(|e| {
            warn!(request_id = %request_id, error = %e, "request failed without a response");
        })?;

        let status = response.status().as_u16();
        crate::metrics::record_request(
            status,
            call.method.as_str(),
            started.elapsed().as_secs_f64(),
        );
        debug!(request_id = %request_id, status, "response received");
        Ok(response)
    }

    /// Wipe the session and send the navigator to the login route.
    pub(crate) async fn end_session(&self, reason: &'static str) {
        end_session(&self.store, self.navigator.as_ref(), reason).await;
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_json_with(path, &RequestOptions::default()).await
    }

    pub async fn get_json_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: &RequestOptions,
    ) -> Result<T> {
        let response = self.request_with(Method::GET, path, None, options).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.request(Method::POST, path, Some(&body)).await?;
        decode(response).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.request(Method::PUT, path, Some(&body)).await?;
        decode(response).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)?;
        let response = self.request(Method::PATCH, path, Some(&body)).await?;
        decode(response).await
    }

    /// POST to an action endpoint whose response body is irrelevant.
    pub async fn post_action(&self, path: &str, body: Option<&serde_json::Value>) -> Result<()> {
        let response = self.request(Method::POST, path, body).await?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.request(Method::DELETE, path, None).await?;
        ensure_success(response).await.map(|_| ())
    }

    /// GET raw bytes, e.g. a spreadsheet export.
    pub async fn download(&self, path: &str, options: &RequestOptions) -> Result<Vec<u8>> {
        let response = self.request_with(Method::GET, path, None, options).await?;
        let response = ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Owned handles for a refresh that outlives the request that started it.
struct RefreshJob {
    http: reqwest::Client,
    base_url: String,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl RefreshJob {
    async fn run(self, refresh_token: String, guard: LeaderGuard) {
        match forge_auth::refresh_access(&self.http, &self.base_url, &refresh_token).await {
            Ok(tokens) => {
                let access = tokens.access.expose().clone();
                if let Err(e) = self.store.set_access_token(&access).await {
                    warn!(error = %e, "failed to persist refreshed access token");
                }
                if let Some(rotated) = &tokens.refresh
                    && let Err(e) = self.store.set_refresh_token(rotated.expose()).await
                {
                    warn!(error = %e, "failed to persist rotated refresh token");
                }

                let waiters = guard.settle(Ok(access));
                crate::metrics::record_refresh("success");
                info!(waiters, "access token refreshed");
            }
            Err(e) => {
                let err = SessionError::RefreshFailed(e);
                warn!(error = %err, "token refresh failed, ending session");
                end_session(&self.store, self.navigator.as_ref(), "refresh_failed").await;

                let waiters = guard.settle(Err(err));
                crate::metrics::record_refresh("failure");
                debug!(waiters, "waiting requests rejected");
            }
        }
    }
}

async fn end_session(store: &SessionStore, navigator: &dyn Navigator, reason: &'static str) {
    if let Err(e) = store.clear().await {
        warn!(error = %e, "failed to clear session state");
    }
    crate::metrics::record_session_cleared(reason);
    navigator.redirect(LOGIN_ROUTE);
}

/// Turn a non-2xx response into `ClientError::Api`.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let raw = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        body: ApiErrorBody::parse(&raw),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Builder for `AuthenticatedClient`
#[derive(Default)]
pub struct AuthenticatedClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    store: Option<Arc<SessionStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    http: Option<reqwest::Client>,
}

impl AuthenticatedClientBuilder {
    /// API base URL including the `/api` prefix. Defaults to the local backend.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Session storage. Defaults to a fresh in-memory store.
    pub fn store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Where to send the user when the session ends. Defaults to `LogNavigator`.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Use a preconfigured `reqwest::Client`; `timeout` and `user_agent` are then ignored.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> Result<AuthenticatedClient> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::Configuration(format!(
                "base_url must start with http:// or https://, got: {base_url}"
            )));
        }

        let http = match self.http {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder().user_agent(
                    self.user_agent
                        .unwrap_or_else(|| format!("forge-client/{}", env!("CARGO_PKG_VERSION"))),
                );
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            }
        };

        Ok(AuthenticatedClient {
            http,
            base_url,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(SessionStore::in_memory())),
            navigator: self.navigator.unwrap_or_else(|| Arc::new(LogNavigator)),
            refresh: RefreshCoordinator::new(),
            activity: ActivityTracker::new(),
        })
    }
}
