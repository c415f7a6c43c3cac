pub mod backoff;
pub mod commands;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod gate;
pub mod phrases;
pub mod prompt;
pub mod providers;
pub mod reengage;
pub mod relay;
pub mod runtime;
pub mod tools;

pub use backoff::{BackoffController, CycleContext};
pub use commands::{Command, CommandHandler};
pub use dispatch::{PendingToolCall, StreamMachine, StreamStep, ToolDispatcher};
pub use error::{CycleError, InvocationError};
pub use gate::{Busy, ConversationGate, ConversationGuard};
pub use providers::{Chunk, ChunkStream, ModelInvoker, OpenAiInvoker, ToolDefinition};
pub use reengage::{ReengageScheduler, next_nudge_at};
pub use relay::{RelayOutcome, RelayPolicy, StreamingRelay};
pub use runtime::{ChatRuntime, RuntimeSettings};
pub use tools::{
    Captioner, GenerateImage, GoogleSearch, HttpCaptioner, ScrapeWebPage, Tool, ToolOutput,
    ToolRegistry, WolframAlpha,
};
