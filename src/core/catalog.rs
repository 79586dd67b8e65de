//! Model catalog, tool display names and token usage lookups.

use std::collections::HashMap;

use tracing::debug;

use crate::api::{AiModel, ConversationInvocationInfo, InvocationTokenInfo};
use crate::core::client::ApiClient;
use crate::core::error::ClientResult;

/// Display names for backend tool methods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolNames {
    names: HashMap<String, String>,
}

impl ToolNames {
    pub fn new(names: HashMap<String, String>) -> Self {
        Self { names }
    }

    /// The display name for `method`, or `method` itself when none is known.
    pub fn resolve<'a>(&'a self, method: &'a str) -> &'a str {
        self.names
            .get(method)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .unwrap_or(method)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Pick the model to chat with: `preferred` when the catalog offers it, then
/// the catalog's default, then its first entry.
pub fn select_model<'a>(models: &'a [AiModel], preferred: Option<&str>) -> Option<&'a AiModel> {
    preferred
        .and_then(|id| models.iter().find(|model| model.model_id == id))
        .or_else(|| models.iter().find(|model| model.default))
        .or_else(|| models.first())
}

impl ApiClient {
    pub async fn list_models(&self) -> ClientResult<Vec<AiModel>> {
        self.get_json("/api/models", false).await
    }

    /// Tool display names. Failures yield an empty table.
    pub async fn tool_names(&self) -> ToolNames {
        match self
            .get_json::<HashMap<String, String>>("/api/tools/names", true)
            .await
        {
            Ok(names) => ToolNames::new(names),
            Err(err) => {
                debug!(error = %err, "Tool names unavailable");
                ToolNames::default()
            }
        }
    }

    /// Token usage for one assistant message, if the backend recorded any.
    pub async fn usage_for_message(&self, message_id: &str) -> Option<InvocationTokenInfo> {
        let path = format!("/api/invocation/by-message/{message_id}");
        match self.get_json(&path, true).await {
            Ok(usage) => usage,
            Err(err) => {
                debug!(message = message_id, error = %err, "Usage lookup failed");
                None
            }
        }
    }

    /// Token usage for every invocation in a conversation, keyed by its
    /// external id. Failures yield an empty list.
    pub async fn usage_for_conversation(
        &self,
        external_conversation_id: &str,
    ) -> Vec<ConversationInvocationInfo> {
        let path = format!("/api/invocation/by-conversation/{external_conversation_id}");
        match self.get_json(&path, true).await {
            Ok(usage) => usage,
            Err(err) => {
                debug!(
                    conversation = external_conversation_id,
                    error = %err,
                    "Usage lookup failed"
                );
                Vec::new()
            }
        }
    }
}
