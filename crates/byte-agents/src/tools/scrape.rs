use async_trait::async_trait;
use byte_common::{Error, Result};
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use std::sync::LazyLock;
use std::time::Duration;

use super::{Tool, ToolOutput, str_arg};
use crate::phrases;

/// Upper bound on page text handed to the model.
const MAX_PAGE_CHARS: usize = 6000;

/// Fetches a page and reduces it to readable text.
pub struct ScrapeWebPage {
    client: Client,
}

impl ScrapeWebPage {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(15))
                .user_agent("Mozilla/5.0 (compatible; ByteBot/0.1)")
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for ScrapeWebPage {
    fn default() -> Self {
        Self::new()
    }
}

static SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script>").expect("script regex should compile")
});
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style>").expect("style regex should compile"));
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex should compile"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex should compile"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

/// Strip markup from an HTML document, keeping its visible text.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT.replace_all(html, " ");
    let text = STYLE.replace_all(&text, " ");
    let text = COMMENT.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

#[async_trait]
impl Tool for ScrapeWebPage {
    fn name(&self) -> &'static str {
        "scrape_web_page"
    }

    fn description(&self) -> &'static str {
        "Scrape data from a webpage given a URL. Return it in conversational format."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL of the webpage to scrape."
                }
            },
            "required": ["url"]
        })
    }

    fn progress_phrase(&self, args: &serde_json::Value) -> String {
        phrases::scrape(args["url"].as_str().unwrap_or("the page"))
    }

    async fn execute(&self, args: &serde_json::Value) -> Result<ToolOutput> {
        let url = str_arg(args, "url")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("failed to fetch {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Tool(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::Tool(format!("failed to read {url}: {e}")))?;

        let text = html_to_text(&html);
        let text: String = text.chars().take(MAX_PAGE_CHARS).collect();
        if text.is_empty() {
            return Ok(ToolOutput::text(format!("The page at {url} had no readable text.")));
        }
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><style>body { color: red }</style>
            <script type="text/javascript">var x = "<p>";</script></head>
            <body><!-- hidden --><h1>Title</h1>
            <p>Hello&nbsp;&amp; welcome</p></body></html>"#;
        assert_eq!(html_to_text(html), "Title Hello & welcome");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(html_to_text("  just   text \n here "), "just text here");
    }
}
