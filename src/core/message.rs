use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayRole {
    User,
    Assistant,
}

impl DisplayRole {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayRole::User => "user",
            DisplayRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool_name: String,
    pub tool_call_id: String,
    pub arguments: Value,
    pub result: Option<Value>,
    pub state: ToolState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text { text: String },
    ToolInvocation(ToolInvocation),
}

/// A renderable message rebuilt from stored conversation rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMessage {
    pub id: String,
    pub role: DisplayRole,
    pub parts: Vec<MessagePart>,
}

impl DisplayMessage {
    pub fn new(id: impl Into<String>, role: DisplayRole) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
        }
    }

    pub fn text(id: impl Into<String>, role: DisplayRole, text: impl Into<String>) -> Self {
        let mut message = Self::new(id, role);
        message.push_text(text);
        message
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.parts.push(MessagePart::Text { text: text.into() });
    }

    pub fn has_tool_invocation(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, MessagePart::ToolInvocation(_)))
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::ToolInvocation(invocation) => Some(invocation),
            MessagePart::Text { .. } => None,
        })
    }

    /// Concatenated text parts, separated by blank lines.
    pub fn plain_text(&self) -> String {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::ToolInvocation(_) => None,
            })
            .collect();
        texts.join("\n\n")
    }
}
