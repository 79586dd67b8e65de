//! Wire payloads exchanged with the chat backend.
//!
//! Everything here mirrors the backend's camelCase JSON. Conversation and
//! catalog payloads live in [`conversation`]; authentication and chat
//! payloads, including the streamed packets, live at this level.

pub mod conversation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use conversation::{
    AiModel, Conversation, ConversationDetail, ConversationInvocationInfo, InvocationTokenInfo,
    MessageRole, StoredMessage, TitleRequest,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, with = "crate::utils::time::optional")]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: UserIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFileAttachment {
    pub media_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ChatFileAttachment>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_files(mut self, files: Vec<ChatFileAttachment>) -> Self {
        self.files = files;
        self
    }
}

/// One unit of progress on `/api/chat/stream`, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamPacket {
    Started(StartedPacket),
    Delta(DeltaPacket),
    Completed(CompletedPacket),
    Error(ErrorPacket),
}

impl StreamPacket {
    pub fn conversation_id(&self) -> &str {
        match self {
            StreamPacket::Started(p) => &p.conversation_id,
            StreamPacket::Delta(p) => &p.conversation_id,
            StreamPacket::Completed(p) => &p.conversation_id,
            StreamPacket::Error(p) => &p.conversation_id,
        }
    }

    /// `completed` and `error` close a stream; the others only make sense
    /// in the middle of one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPacket::Completed(_) | StreamPacket::Error(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPacket {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaPacket {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub delta: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPacket {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPacket {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub error: String,
}

impl ErrorPacket {
    /// Client-side packet for failures that never reached the event stream.
    pub fn synthesized(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stream_packet_decodes_by_type_tag() {
        let delta: StreamPacket = serde_json::from_value(json!({
            "type": "delta",
            "conversationId": "c1",
            "agentName": "helper",
            "messageId": "m1",
            "delta": "Hel"
        }))
        .expect("delta packet");
        assert_eq!(delta.conversation_id(), "c1");
        assert!(!delta.is_terminal());
        assert_eq!(
            delta,
            StreamPacket::Delta(DeltaPacket {
                conversation_id: "c1".into(),
                agent_name: "helper".into(),
                message_id: Some("m1".into()),
                delta: "Hel".into(),
            })
        );

        let completed: StreamPacket = serde_json::from_value(json!({
            "type": "completed",
            "conversationId": "c1",
            "agentName": "helper",
            "text": "Hello",
            "inputTokens": 12,
            "outputTokens": 3
        }))
        .expect("completed packet");
        match completed {
            StreamPacket::Completed(packet) => {
                assert_eq!(packet.text.as_deref(), Some("Hello"));
                assert_eq!(packet.input_tokens, Some(12));
                assert_eq!(packet.output_tokens, Some(3));
            }
            other => panic!("expected completed packet, got {other:?}"),
        }
    }

    #[test]
    fn stream_packet_rejects_unknown_type() {
        let parsed = serde_json::from_value::<StreamPacket>(json!({
            "type": "heartbeat",
            "conversationId": "c1"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn chat_request_omits_empty_optionals() {
        let body = serde_json::to_value(ChatRequest::new("hi").with_agent("helper"))
            .expect("serialize");
        assert_eq!(
            body,
            json!({ "message": "hi", "conversationId": null, "agentName": "helper" })
        );
    }

    #[test]
    fn token_response_accepts_naive_expiry() {
        let parsed: TokenResponse = serde_json::from_value(json!({
            "accessToken": "a",
            "refreshToken": "r",
            "expiresAt": "2030-01-01T00:00:00",
            "user": { "id": "u1", "username": "ada", "email": "ada@example.com" }
        }))
        .expect("token response");
        assert!(parsed.expires_at.is_some());
        assert_eq!(parsed.user.username, "ada");
    }
}
