mod conversation;
mod turn;

pub use conversation::{
    ConversationManager, ConversationStreamUpdate, SourceToggle, CONNECTIVITY_ERROR_MESSAGE,
};
pub use turn::{ConversationTurn, Role};
