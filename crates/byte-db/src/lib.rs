pub mod activity_store;
pub mod conversation_store;
pub mod timezone_store;

mod connection;

pub use activity_store::{ActivityRecord, ActivityStore};
pub use conversation_store::{ConversationStore, SqliteConversationStore};
pub use timezone_store::TimezoneStore;
