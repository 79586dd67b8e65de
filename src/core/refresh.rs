//! Single-flight token refresh.
//!
//! Any number of requests can hit a 401 at the same time; only one refresh
//! call goes out. The first caller starts it, later callers clone the same
//! shared future, and the in-flight slot is emptied as soon as it resolves,
//! success or not, so the next 401 starts a new attempt. New tokens are only
//! written while the stored refresh token is still the one that was spent.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::api::{RefreshTokenRequest, TokenResponse};
use crate::core::token_store::{SessionPatch, TokenStore};
use crate::utils::url::construct_api_url;

/// Exchanges a refresh token for a new token pair.
///
/// Implementations report every failure (rejected token, transport error,
/// malformed body) as `None`.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Option<TokenResponse>;
}

/// Posts to `/api/auth/refresh`.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenRefresher {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Option<TokenResponse> {
        let url = construct_api_url(&self.base_url, "/api/auth/refresh");
        let response = match self
            .http
            .post(url)
            .json(&RefreshTokenRequest { refresh_token })
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, "Token refresh request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(status = %response.status(), "Token refresh rejected");
            return None;
        }

        match response.json::<TokenResponse>().await {
            Ok(tokens) => Some(tokens),
            Err(err) => {
                debug!(error = %err, "Token refresh returned an unreadable body");
                None
            }
        }
    }
}

/// What became of one refresh attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshResult {
    /// New tokens, already written to the token store.
    Refreshed(TokenResponse),
    /// The backend refused the refresh token or could not be reached.
    Rejected,
    /// The stored session changed while the refresh ran. Nothing was written.
    Superseded,
}

/// Result of one refresh attempt, shared by every caller that waited on it.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    /// Monotonic attempt number, starting at 1.
    pub attempt: u64,
    pub result: RefreshResult,
}

impl RefreshOutcome {
    pub fn tokens(&self) -> Option<&TokenResponse> {
        match &self.result {
            RefreshResult::Refreshed(tokens) => Some(tokens),
            _ => None,
        }
    }
}

type PendingRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct CoordinatorState {
    in_flight: Option<(u64, PendingRefresh)>,
    attempts: u64,
}

/// Runs refreshes on their own task so an attempt finishes, and its tokens
/// are stored, even when every caller waiting on it has gone away.
#[derive(Clone)]
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    tokens: Arc<TokenStore>,
    state: Arc<Mutex<CoordinatorState>>,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>, tokens: Arc<TokenStore>) -> Self {
        Self {
            refresher,
            tokens,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
        }
    }

    /// Join the refresh in flight, or start one with `refresh_token`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn get_or_start(&self, refresh_token: &str) -> RefreshOutcome {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match &state.in_flight {
                Some((attempt, pending)) => {
                    debug!(attempt, "Joining token refresh in flight");
                    pending.clone()
                }
                None => {
                    state.attempts += 1;
                    let attempt = state.attempts;
                    debug!(attempt, "Starting token refresh");
                    let pending = self.start(attempt, refresh_token.to_string());
                    state.in_flight = Some((attempt, pending.clone()));
                    pending
                }
            }
        };
        pending.await
    }

    pub fn is_in_flight(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .in_flight
            .is_some()
    }

    fn start(&self, attempt: u64, refresh_token: String) -> PendingRefresh {
        let refresher = self.refresher.clone();
        let tokens = self.tokens.clone();
        let state = Arc::downgrade(&self.state);
        let state_on_join = state.clone();

        let task = tokio::spawn(async move {
            let result = match refresher.refresh(&refresh_token).await {
                Some(fresh) => {
                    let patch = SessionPatch::tokens_only(&fresh);
                    if tokens.save_if_refresh_token(&refresh_token, patch) {
                        RefreshResult::Refreshed(fresh)
                    } else {
                        debug!(attempt, "Session changed during refresh; discarding new tokens");
                        RefreshResult::Superseded
                    }
                }
                None if tokens.refresh_token().as_deref() == Some(refresh_token.as_str()) => {
                    RefreshResult::Rejected
                }
                None => RefreshResult::Superseded,
            };
            release(&state, attempt);
            debug!(
                attempt,
                refreshed = matches!(result, RefreshResult::Refreshed(_)),
                "Token refresh finished"
            );
            RefreshOutcome { attempt, result }
        });

        task.map(move |joined| {
            joined.unwrap_or_else(|err| {
                debug!(attempt, error = %err, "Token refresh task did not finish");
                release(&state_on_join, attempt);
                RefreshOutcome {
                    attempt,
                    result: RefreshResult::Rejected,
                }
            })
        })
        .boxed()
        .shared()
    }
}

/// Empty the in-flight slot if it still holds `attempt`.
fn release(state: &Weak<Mutex<CoordinatorState>>, attempt: u64) {
    if let Some(state) = state.upgrade() {
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(state.in_flight, Some((current, _)) if current == attempt) {
            state.in_flight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UserIdentity;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingRefresher {
        calls: AtomicUsize,
        succeed: bool,
        delay: Duration,
    }

    impl CountingRefresher {
        fn new(succeed: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                succeed,
                delay,
            })
        }
    }

    fn ada() -> UserIdentity {
        UserIdentity {
            id: "u1".into(),
            username: "ada".into(),
            email: String::new(),
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, refresh_token: &str) -> Option<TokenResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            self.succeed.then(|| TokenResponse {
                access_token: format!("access-{call}"),
                refresh_token: format!("{refresh_token}-next"),
                expires_at: None,
                user: ada(),
            })
        }
    }

    fn signed_in_store(refresh_token: &str) -> Arc<TokenStore> {
        let store = TokenStore::in_memory();
        store.save(SessionPatch {
            access_token: Some("stale".into()),
            refresh_token: Some(refresh_token.into()),
            expires_at: None,
            user: Some(ada()),
        });
        Arc::new(store)
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let refresher = CountingRefresher::new(true, Duration::from_millis(50));
        let store = signed_in_store("r1");
        let coordinator = RefreshCoordinator::new(refresher.clone(), store.clone());

        let waiters = (0..8).map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_or_start("r1").await })
        });
        let outcomes: Vec<RefreshOutcome> = futures_util::future::join_all(waiters)
            .await
            .into_iter()
            .map(|joined| joined.expect("waiter task"))
            .collect();

        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert!(outcomes.iter().all(|outcome| outcome == &outcomes[0]));
        assert_eq!(outcomes[0].attempt, 1);
        assert_eq!(
            outcomes[0].tokens().map(|t| t.access_token.as_str()),
            Some("access-1")
        );
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
        assert_eq!(store.refresh_token().as_deref(), Some("r1-next"));
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn failed_refresh_clears_slot_for_next_attempt() {
        let refresher = CountingRefresher::new(false, Duration::from_millis(5));
        let store = signed_in_store("r1");
        let coordinator = RefreshCoordinator::new(refresher.clone(), store.clone());

        let first = coordinator.get_or_start("r1").await;
        assert_eq!(first.result, RefreshResult::Rejected);
        assert!(!coordinator.is_in_flight());
        assert_eq!(store.access_token().as_deref(), Some("stale"));

        let second = coordinator.get_or_start("r1").await;
        assert_eq!(second.attempt, 2);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slot_is_occupied_while_refresh_runs() {
        let refresher = CountingRefresher::new(true, Duration::from_millis(100));
        let coordinator = RefreshCoordinator::new(refresher, signed_in_store("r1"));

        let background = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_or_start("r1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coordinator.is_in_flight());

        let outcome = background.await.expect("refresh task");
        assert!(outcome.tokens().is_some());
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn abandoned_refresh_still_completes_and_persists() {
        let refresher = CountingRefresher::new(true, Duration::from_millis(100));
        let store = signed_in_store("r1");
        let coordinator = RefreshCoordinator::new(refresher.clone(), store.clone());

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_or_start("r1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!coordinator.is_in_flight());
        assert_eq!(store.access_token().as_deref(), Some("access-1"));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_is_discarded_when_session_is_cleared_meanwhile() {
        let refresher = CountingRefresher::new(true, Duration::from_millis(80));
        let store = signed_in_store("r1");
        let coordinator = RefreshCoordinator::new(refresher, store.clone());

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.get_or_start("r1").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.clear();

        let outcome = waiter.await.expect("refresh task");
        assert_eq!(outcome.result, RefreshResult::Superseded);
        assert_eq!(store.load(), None);
        assert!(!coordinator.is_in_flight());
    }
}
