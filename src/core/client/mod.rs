//! Authenticated request client.
//!
//! Wraps every backend call with bearer-token injection and the 401 policy:
//! refresh once through the shared [`RefreshCoordinator`], retry once, and
//! otherwise end the session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use reqwest::{header, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::core::error::{ClientError, ClientResult};
use crate::core::refresh::{HttpTokenRefresher, RefreshCoordinator, RefreshResult, TokenRefresher};
use crate::core::token_store::{Session, TokenStore};
use crate::utils::url::construct_api_url;

/// Invoked once per terminal authentication failure, after the stored
/// session has been cleared.
pub type SessionEndedHook = Arc<dyn Fn() + Send + Sync>;

/// Placeholder body type for requests without a payload.
pub const NO_BODY: Option<&()> = None;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    refresh: RefreshCoordinator,
    on_session_ended: SessionEndedHook,
    last_ended_attempt: Arc<AtomicU64>,
}

pub struct ApiClientBuilder {
    base_url: String,
    http: Option<reqwest::Client>,
    tokens: Option<Arc<TokenStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    on_session_ended: Option<SessionEndedHook>,
}

impl ApiClientBuilder {
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn token_store(mut self, tokens: Arc<TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Replace the HTTP refresher, mainly for tests.
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn on_session_ended(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_ended = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> ApiClient {
        let http = self.http.unwrap_or_default();
        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(HttpTokenRefresher::new(http.clone(), self.base_url.clone()))
        });
        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(TokenStore::in_memory()));
        ApiClient {
            refresh: RefreshCoordinator::new(refresher, tokens.clone()),
            tokens,
            on_session_ended: self.on_session_ended.unwrap_or_else(|| Arc::new(|| {})),
            last_ended_attempt: Arc::new(AtomicU64::new(0)),
            base_url: self.base_url,
            http,
        }
    }
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            http: None,
            tokens: None,
            refresher: None,
            on_session_ended: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// Issue a request and return the successful response.
    ///
    /// Non-success statuses become [`ClientError::Server`]; a 401 on an
    /// authenticated request goes through refresh-and-retry first.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        require_auth: bool,
    ) -> ClientResult<Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        let response = self
            .execute(method, path, body, None, require_auth)
            .await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(server_error(response).await)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        require_auth: bool,
    ) -> ClientResult<T> {
        let response = self.request(Method::GET, path, NO_BODY, require_auth).await?;
        decode_json(response, path).await
    }

    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        require_auth: bool,
    ) -> ClientResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(method, path, Some(body), require_auth).await?;
        decode_json(response, path).await
    }

    /// Like [`ApiClient::send_json`] for endpoints whose body is irrelevant.
    pub async fn send_empty<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        require_auth: bool,
    ) -> ClientResult<()>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.request(method, path, body, require_auth).await?;
        Ok(())
    }

    /// Send with the auth policy applied but hand back whatever status the
    /// server answered with. Used by the streaming client, which reports
    /// failures as packets rather than errors.
    pub(crate) async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        accept: Option<&'static str>,
        require_auth: bool,
    ) -> ClientResult<Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        let bearer = if require_auth {
            self.tokens.access_token()
        } else {
            None
        };
        debug!(%method, path, authenticated = bearer.is_some(), "Sending request");
        let response = self
            .send_once(&method, path, body, accept, bearer.as_deref())
            .await?;

        if !require_auth || response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(%method, path, "Request unauthorized; attempting session refresh");
        let access_token = self.recover_session(bearer.as_deref()).await?;
        self.send_once(&method, path, body, accept, Some(&access_token))
            .await
    }

    async fn send_once<B>(
        &self,
        method: &Method,
        path: &str,
        body: Option<&B>,
        accept: Option<&'static str>,
        bearer: Option<&str>,
    ) -> ClientResult<Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = construct_api_url(&self.base_url, path);
        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Obtain a fresh access token or end the session.
    ///
    /// `rejected` is the bearer the server just refused. When the store
    /// already holds a different one, another request refreshed in the
    /// meantime and that token is used as is.
    async fn recover_session(&self, rejected: Option<&str>) -> ClientResult<String> {
        if let Some(current) = self.signed_in_access_token() {
            if rejected.is_some_and(|rejected| rejected != current) {
                debug!("Session was refreshed by another request; retrying");
                return Ok(current);
            }
        }

        let Some(refresh_token) = self.tokens.refresh_token() else {
            self.end_session(None);
            return Err(ClientError::Unauthenticated);
        };

        let outcome = self.refresh.get_or_start(&refresh_token).await;
        match outcome.result {
            RefreshResult::Refreshed(tokens) => Ok(tokens.access_token),
            RefreshResult::Rejected => {
                self.end_session(Some(outcome.attempt));
                Err(ClientError::AuthExpired)
            }
            RefreshResult::Superseded => self.signed_in_access_token().ok_or_else(|| {
                debug!("Session ended while refreshing");
                ClientError::AuthExpired
            }),
        }
    }

    fn signed_in_access_token(&self) -> Option<String> {
        self.tokens
            .load()
            .filter(Session::is_logged_in)
            .and_then(|session| session.access_token)
    }

    /// Clear the stored session and notify the application. Requests that
    /// waited on the same failed refresh attempt only notify once.
    fn end_session(&self, failed_attempt: Option<u64>) {
        if let Some(attempt) = failed_attempt {
            if self.last_ended_attempt.swap(attempt, Ordering::SeqCst) == attempt {
                return;
            }
        }
        info!(failed_attempt, "Session ended; clearing stored credentials");
        self.tokens.clear();
        (self.on_session_ended)();
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response, path: &str) -> ClientResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|source| ClientError::Decode {
        context: path.to_string(),
        source,
    })
}

pub(crate) async fn server_error(response: Response) -> ClientError {
    let (status, message) = error_details(response).await;
    ClientError::Server { status, message }
}

/// Status code and display message of a non-success response.
pub(crate) async fn error_details(response: Response) -> (u16, String) {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message =
        extract_error_message(&body).unwrap_or_else(|| format!("request failed ({status})"));
    (status, message)
}

/// Pull a human-readable message out of an error body: `error` as a string,
/// `error.message`, or a top-level `message`.
pub(crate) fn extract_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body.trim()).ok()?;
    let summary = value
        .get("error")
        .and_then(|error| match error {
            serde_json::Value::String(text) => Some(text.clone()),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|message| message.as_str().map(str::to_owned)),
            _ => None,
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|message| message.as_str().map(str::to_owned))
        })?;

    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}
