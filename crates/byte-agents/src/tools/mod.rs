use async_trait::async_trait;
use byte_common::{Error, Result};
use std::sync::Arc;

use crate::providers::ToolDefinition;

pub mod caption;
pub mod generate_image;
pub mod google_search;
pub mod scrape;
pub mod wolfram;

pub use caption::{Captioner, HttpCaptioner};
pub use generate_image::GenerateImage;
pub use google_search::GoogleSearch;
pub use scrape::ScrapeWebPage;
pub use wolfram::WolframAlpha;

/// A function the model may call mid-stream.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Other names the model may use for this tool.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn description(&self) -> &'static str;

    fn input_schema(&self) -> serde_json::Value;

    /// Status text shown while the tool runs.
    fn progress_phrase(&self, args: &serde_json::Value) -> String;

    async fn execute(&self, args: &serde_json::Value) -> Result<ToolOutput>;

    /// Function turn recorded when `execute` fails, so the model can explain
    /// the failure.
    fn failure_content(&self, error: &Error) -> String {
        format!(
            "The {} function failed and returned no results. Tell the user it did not work. This is why it failed: {error}",
            self.name()
        )
    }

    /// Status text replacing the progress phrase after a failure.
    fn failure_notice(&self) -> Option<&'static str> {
        None
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Text recorded as the function turn.
    pub content: String,
    /// Images to download and attach after the follow-up answer.
    pub image_urls: Vec<String>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            image_urls: Vec::new(),
        }
    }

    pub fn with_images(mut self, urls: Vec<String>) -> Self {
        self.image_urls = urls;
        self
    }
}

/// The fixed set of tools offered to the model.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.name() == name || t.aliases().contains(&name))
            .cloned()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

/// Required string argument.
pub(crate) fn str_arg<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::Tool(format!("missing or invalid '{key}' argument")))
}
