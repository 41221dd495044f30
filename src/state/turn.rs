use crate::types::Citation;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a conversation. The trailing assistant turn is mutable while
/// its answer streams; every other turn is immutable history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<Citation>,
    /// Unknown while streaming, then whether the answer was grounded in the
    /// knowledge base.
    pub in_kb: Option<bool>,
}

impl ConversationTurn {
    pub fn user(content: String) -> Self {
        Self {
            role: Role::User,
            content,
            sources: Vec::new(),
            in_kb: None,
        }
    }

    pub fn assistant_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            sources: Vec::new(),
            in_kb: None,
        }
    }
}
