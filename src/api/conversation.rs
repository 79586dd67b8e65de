use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub external_conversation_id: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default, with = "crate::utils::time::optional")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(with = "crate::utils::time::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "crate::utils::time::optional")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Timestamp used for recency ordering: last activity, else creation.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

#[derive(Serialize)]
pub struct TitleRequest<'a> {
    pub title: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
    #[serde(other)]
    Other,
}

/// One persisted row of a conversation, as returned by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    #[serde(default)]
    pub sequence: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message_id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    /// Structured side channel carrying function calls and results.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content_json: String,
    #[serde(default, with = "crate::utils::time::optional")]
    pub created_at: Option<DateTime<Utc>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl StoredMessage {
    /// Identity used for display: the logical message id when present.
    pub fn display_id(&self) -> &str {
        if self.message_id.is_empty() {
            &self.id
        } else {
            &self.message_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiModel {
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationTokenInfo {
    #[serde(default)]
    pub input_token_count: Option<u64>,
    #[serde(default)]
    pub output_token_count: Option<u64>,
    #[serde(default)]
    pub total_token_count: Option<u64>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationInvocationInfo {
    #[serde(flatten)]
    pub tokens: InvocationTokenInfo,
    pub chat_message_id: String,
    #[serde(default)]
    pub chat_message_external_id: String,
}
