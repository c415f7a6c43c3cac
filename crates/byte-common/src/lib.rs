pub mod error;
pub mod message;
pub mod turn;
pub mod types;

pub use error::{Error, Result};
pub use message::{ImageAttachment, InboundMessage};
pub use turn::{Role, Turn};
pub use types::{ConversationKey, MessageHandle};
