use serde::{Deserialize, Serialize};

/// One chat message, in the order the platform delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(alias = "user")]
    pub author: String,
    pub text: String,
    /// Opaque ordering token from the chat platform
    #[serde(default, alias = "ts")]
    pub timestamp: String,
}

impl ConversationMessage {
    pub fn new(
        author: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Stand-in message used when a thread has no history but the mention itself has text.
    pub fn synthetic(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(author, text, "0")
    }
}

/// Render the conversation as `author: text` lines.
pub fn transcript(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.author, m.text))
        .collect::<Vec<_>>()
        .join("\n")
}
