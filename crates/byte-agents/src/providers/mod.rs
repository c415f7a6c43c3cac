use async_trait::async_trait;
use byte_common::Turn;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::InvocationError;

pub mod openai;
pub use openai::OpenAiInvoker;

/// One incremental unit of a streamed model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    TextDelta(String),
    /// The model started a function call.
    ToolCallStart { name: String },
    /// A fragment of the function call's JSON arguments, to be concatenated.
    ToolCallArgs(String),
    End,
}

/// Lazy, finite, non-restartable sequence of chunks.
pub type ChunkStream = BoxStream<'static, Result<Chunk, InvocationError>>;

/// Wraps one completion API call.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Start a completion for `turns` with `model`. Resolves once the API has
    /// accepted the request; chunks then arrive through the returned stream.
    async fn invoke(
        &self,
        model: &str,
        turns: &[Turn],
        functions: &[ToolDefinition],
    ) -> Result<ChunkStream, InvocationError>;
}

/// Function definition advertised to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}
