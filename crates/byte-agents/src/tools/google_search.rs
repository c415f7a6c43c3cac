use async_trait::async_trait;
use byte_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{Tool, ToolOutput, str_arg};
use crate::phrases;

const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// The Custom Search API returns at most this many results per request.
const MAX_RESULTS: u64 = 10;

const PRESENTATION_HINT: &str = "Give these results to the user in a conversational format, \
not a list. Never deliver the results in a list. Here they are: ";

/// Web search through the Google Custom Search JSON API.
pub struct GoogleSearch {
    client: Client,
    api_key: String,
    cse_id: String,
    endpoint: String,
}

impl GoogleSearch {
    pub fn new(api_key: impl Into<String>, cse_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            cse_id: cse_id.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

fn render_results(items: &[SearchItem]) -> String {
    if items.is_empty() {
        return "No results were found.".to_string();
    }
    items
        .iter()
        .map(|i| format!("Title: {}\nLink: {}\nSnippet: {}", i.title, i.link, i.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for GoogleSearch {
    fn name(&self) -> &'static str {
        "google_search"
    }

    fn description(&self) -> &'static str {
        "Use the 'google_search' tool to retrieve internet search results relevant to your input. \
         The results will return links and snippets of text from the webpages"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "search_term": {
                    "type": "string",
                    "description": "The term to search for."
                },
                "num_results": {
                    "type": "integer",
                    "enum": [5, 10, 15],
                    "description": "Number of search results."
                }
            },
            "required": ["search_term"]
        })
    }

    fn progress_phrase(&self, args: &serde_json::Value) -> String {
        phrases::search(args["search_term"].as_str().unwrap_or("that"))
    }

    async fn execute(&self, args: &serde_json::Value) -> Result<ToolOutput> {
        let term = str_arg(args, "search_term")?;
        let num = args["num_results"]
            .as_u64()
            .unwrap_or(5)
            .clamp(1, MAX_RESULTS);

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", term),
                ("num", &num.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Tool(format!("search request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tool(format!("search API returned {status}: {body}")));
        }

        let results: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("invalid search response: {e}")))?;

        Ok(ToolOutput::text(format!(
            "{PRESENTATION_HINT}{}",
            render_results(&results.items)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_title_link_snippet_blocks() {
        let items = vec![
            SearchItem {
                title: "Rust".into(),
                link: "https://rust-lang.org".into(),
                snippet: "A language".into(),
            },
            SearchItem {
                title: "Tokio".into(),
                link: "https://tokio.rs".into(),
                snippet: "Async runtime".into(),
            },
        ];
        let text = render_results(&items);
        assert!(text.starts_with("Title: Rust\nLink: https://rust-lang.org"));
        assert!(text.contains("\n\nTitle: Tokio"));
    }

    #[test]
    fn empty_results_are_explained() {
        assert_eq!(render_results(&[]), "No results were found.");
    }
}
