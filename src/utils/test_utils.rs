#[cfg(test)]
use crate::core::client::ApiClient;
#[cfg(test)]
use crate::core::token_store::{MemorySlot, SessionPatch, TokenStore};
#[cfg(test)]
use serde_json::{json, Value};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use wiremock::MockServer;

/// A mock backend plus the durable slot and hook counter clients share.
#[cfg(test)]
pub struct TestBackend {
    pub server: MockServer,
    pub slot: MemorySlot,
    ended: Arc<AtomicUsize>,
}

#[cfg(test)]
impl TestBackend {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            slot: MemorySlot::default(),
            ended: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A fresh client over the shared slot, as if the process restarted.
    pub fn client(&self) -> ApiClient {
        let ended = self.ended.clone();
        ApiClient::builder(self.server.uri())
            .token_store(Arc::new(TokenStore::new(self.slot.clone())))
            .on_session_ended(move || {
                ended.fetch_add(1, Ordering::SeqCst);
            })
            .build()
    }

    pub fn seed_session(&self, access_token: Option<&str>, refresh_token: Option<&str>) {
        TokenStore::new(self.slot.clone()).save(SessionPatch {
            access_token: access_token.map(str::to_owned),
            refresh_token: refresh_token.map(str::to_owned),
            expires_at: None,
            user: Some(serde_json::from_value(user_json()).expect("user fixture")),
        });
    }

    pub fn stored(&self) -> Option<crate::core::token_store::Session> {
        TokenStore::new(self.slot.clone()).load()
    }

    pub fn sessions_ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }

    /// Number of requests the mock server received on `path`.
    pub async fn hits(&self, path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == path)
            .count()
    }
}

#[cfg(test)]
pub fn user_json() -> Value {
    json!({ "id": "u1", "username": "ada", "email": "ada@example.com" })
}

#[cfg(test)]
pub fn token_json(access_token: &str, refresh_token: &str) -> Value {
    json!({
        "accessToken": access_token,
        "refreshToken": refresh_token,
        "expiresAt": "2030-01-01T00:00:00Z",
        "user": user_json()
    })
}

#[cfg(test)]
pub fn conversation_json(id: &str, created_at: &str, last_message_at: Option<&str>) -> Value {
    json!({
        "id": id,
        "title": format!("Conversation {id}"),
        "externalConversationId": format!("ext-{id}"),
        "agentName": "helper",
        "channel": "web",
        "lastMessageAt": last_message_at,
        "createdAt": created_at,
        "updatedAt": null
    })
}
