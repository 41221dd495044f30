mod core;
mod state;
mod store;


pub use state::{ConversationManager, ConversationStreamUpdate, SourceToggle};
pub use store::CONNECTIVITY_ERROR_MESSAGE;
