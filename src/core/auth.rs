//! Account operations: login, registration, logout and session restore.

use reqwest::Method;
use tracing::{debug, info};

use crate::api::{LoginRequest, RefreshTokenRequest, RegisterRequest, TokenResponse, UserIdentity};
use crate::core::client::ApiClient;
use crate::core::error::ClientResult;
use crate::core::token_store::{Session, SessionPatch};

impl ApiClient {
    pub async fn login(&self, username: &str, password: &str) -> ClientResult<Session> {
        let tokens: TokenResponse = self
            .send_json(
                Method::POST,
                "/api/auth/login",
                &LoginRequest { username, password },
                false,
            )
            .await?;
        Ok(self.start_session(tokens))
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ClientResult<Session> {
        let tokens: TokenResponse = self
            .send_json(
                Method::POST,
                "/api/auth/register",
                &RegisterRequest {
                    username,
                    email,
                    password,
                },
                false,
            )
            .await?;
        Ok(self.start_session(tokens))
    }

    /// Revoke the refresh token server-side (best effort) and forget the
    /// local session.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.token_store().refresh_token() {
            let revoked = self
                .send_empty(
                    Method::POST,
                    "/api/auth/logout",
                    Some(&RefreshTokenRequest {
                        refresh_token: &refresh_token,
                    }),
                    true,
                )
                .await;
            if let Err(err) = revoked {
                debug!(error = %err, "Server-side logout failed; clearing local session anyway");
            }
        }
        self.token_store().clear();
        info!("Logged out");
    }

    pub async fn me(&self) -> ClientResult<UserIdentity> {
        self.get_json("/api/auth/me", true).await
    }

    /// Validate a stored session against the backend.
    ///
    /// Returns `false` (and drops whatever was stored) when there is no
    /// access token or the backend does not accept it.
    pub async fn restore_session(&self) -> bool {
        if self.token_store().access_token().is_none() {
            return false;
        }
        match self.me().await {
            Ok(user) => {
                self.token_store().save(SessionPatch::user(user));
                true
            }
            Err(err) => {
                debug!(error = %err, "Stored session rejected");
                self.token_store().clear();
                false
            }
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.token_store().load()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_session()
            .is_some_and(|session| session.is_logged_in())
    }

    fn start_session(&self, tokens: TokenResponse) -> Session {
        self.token_store()
            .save(SessionPatch::from_token_response(&tokens));
        info!(user = %tokens.user.username, "Session started");
        Session {
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            expires_at: tokens.expires_at,
            user: Some(tokens.user),
        }
    }
}
