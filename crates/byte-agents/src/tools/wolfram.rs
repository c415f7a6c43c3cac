use async_trait::async_trait;
use byte_common::{Error, Result};
use reqwest::Client;
use serde_json::json;

use super::{Tool, ToolOutput, str_arg};

const DEFAULT_ENDPOINT: &str = "https://api.wolframalpha.com/v1/result";

/// Computational queries through the Wolfram|Alpha short answers API.
pub struct WolframAlpha {
    client: Client,
    app_id: String,
    endpoint: String,
}

impl WolframAlpha {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            app_id: app_id.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Tool for WolframAlpha {
    fn name(&self) -> &'static str {
        "ask_wolfram_alpha"
    }

    fn description(&self) -> &'static str {
        "Query Wolfram Alpha and return the results in a conversational format."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The query to send to Wolfram Alpha."
                }
            },
            "required": ["query"]
        })
    }

    fn progress_phrase(&self, args: &serde_json::Value) -> String {
        format!(
            "Checking my answer for {}",
            args["query"].as_str().unwrap_or("that")
        )
    }

    async fn execute(&self, args: &serde_json::Value) -> Result<ToolOutput> {
        let query = str_arg(args, "query")?;
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("appid", self.app_id.as_str()), ("i", query)])
            .send()
            .await
            .map_err(|e| Error::Tool(format!("Wolfram|Alpha request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Tool(format!("failed to read Wolfram|Alpha answer: {e}")))?;

        // 501 means the query was not understood; the body explains why
        if status.as_u16() == 501 {
            return Ok(ToolOutput::text(format!(
                "Wolfram Alpha could not answer \"{query}\": {}",
                body.trim()
            )));
        }
        if !status.is_success() {
            return Err(Error::Tool(format!(
                "Wolfram|Alpha returned {status}: {}",
                body.trim()
            )));
        }

        Ok(ToolOutput::text(body.trim().to_string()))
    }
}
