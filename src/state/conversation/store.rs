use super::ConversationManager;
use crate::state::turn::{ConversationTurn, Role};
use crate::types::Citation;

/// Fixed content a turn receives when the transport fails; whatever body text
/// had streamed before the failure is replaced wholesale.
pub const CONNECTIVITY_ERROR_MESSAGE: &str = "Could not reach the server.";

/// Message-store update contract: every mutation below targets the single
/// mutable trailing assistant turn, and only while a stream is open. Once the
/// turn is finalized the log is immutable history again.
impl ConversationManager {
    /// Append the user turn and the empty assistant placeholder, and open the
    /// mutation window for the new request.
    pub fn begin_turn(&mut self, question: String) {
        self.turns.push(ConversationTurn::user(question));
        self.turns.push(ConversationTurn::assistant_placeholder());
        self.streaming = true;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Replace the trailing turn's citation list and membership flag, and
    /// adopt the thread id if this conversation has none yet. Replacement
    /// semantics make a repeated identical header a no-op.
    pub fn apply_metadata(
        &mut self,
        sources: Vec<Citation>,
        in_kb: Option<bool>,
        thread_id: Option<String>,
    ) {
        if !self.streaming {
            return;
        }
        if self.thread_id.is_none() {
            self.thread_id = thread_id;
        }
        if let Some(turn) = self.trailing_assistant_turn_mut() {
            turn.sources = sources;
            turn.in_kb = in_kb;
        }
    }

    /// Concatenate body text in arrival order.
    pub fn apply_body_append(&mut self, text: &str) {
        if !self.streaming {
            return;
        }
        if let Some(turn) = self.trailing_assistant_turn_mut() {
            turn.content.push_str(text);
        }
    }

    /// Seal the trailing turn with its accumulated content.
    pub fn finalize_ok(&mut self) {
        self.streaming = false;
    }

    /// Seal the trailing turn with an error: the in-band message verbatim, or
    /// the fixed connectivity message. Citations already applied are kept.
    pub fn finalize_error(&mut self, message: Option<String>) {
        if !self.streaming {
            return;
        }
        if let Some(turn) = self.trailing_assistant_turn_mut() {
            turn.content = message.unwrap_or_else(|| CONNECTIVITY_ERROR_MESSAGE.to_string());
        }
        self.streaming = false;
    }

    fn trailing_assistant_turn_mut(&mut self) -> Option<&mut ConversationTurn> {
        self.turns
            .last_mut()
            .filter(|turn| turn.role == Role::Assistant)
    }
}
