pub mod memory;
pub mod traits;

#[cfg(feature = "discord")]
pub mod discord;

pub use memory::{MemorySink, SinkOp};
pub use traits::{
    Attachment, ChannelLifecycle, ChannelStatus, InboundHandler, MessageSink, SinkFactory,
};
