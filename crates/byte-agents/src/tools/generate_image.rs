use async_trait::async_trait;
use byte_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{Tool, ToolOutput, str_arg};
use crate::phrases;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MAX_IMAGES: u64 = 4;

/// Image generation through an OpenAI-compatible `images/generations`
/// endpoint, falling back across a list of image models.
pub struct GenerateImage {
    client: Client,
    api_key: String,
    base_url: String,
    models: Vec<String>,
}

impl GenerateImage {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>, models: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            models,
        }
    }

    async fn generate_with(&self, model: &str, prompt: &str, count: u64) -> Result<Vec<String>> {
        let body = json!({
            "model": model,
            "prompt": prompt,
            "n": count,
            "response_format": "url",
        });

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Tool(format!("image request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Tool(format!("image API returned {status}: {text}")));
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("invalid image response: {e}")))?;

        let urls: Vec<String> = parsed.data.into_iter().filter_map(|d| d.url).collect();
        if urls.is_empty() {
            return Err(Error::Tool("image response contained no urls".into()));
        }
        Ok(urls)
    }

    /// Try each model in order, returning the first non-empty set of URLs.
    pub async fn generate(&self, prompt: &str, count: u64) -> Result<Vec<String>> {
        for model in &self.models {
            match self.generate_with(model, prompt, count).await {
                Ok(urls) => {
                    info!(model = %model, count = urls.len(), "images generated");
                    return Ok(urls);
                }
                Err(e) => warn!(model = %model, "image generation failed: {e}"),
            }
        }
        Err(Error::Tool("Unable to generate images with any model".into()))
    }
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageEntry>,
}

#[derive(Deserialize)]
struct ImageEntry {
    url: Option<String>,
}

fn success_content(prompt: &str, count: usize) -> String {
    if count == 1 {
        format!(
            "Generated an image with the prompt: {prompt} and sent it to the user. Do not include a url in your response. Keep your response concise, and don't over explain the image, just a short summary of 1 or 2 sentances is enough."
        )
    } else {
        format!(
            "Generated {count} images with the prompt: {prompt} and sent them to the user. Do not include a url in your response. Keep your response concise, and don't over explain the images, just a short summary of 1 or 2 sentances is enough."
        )
    }
}

#[async_trait]
impl Tool for GenerateImage {
    fn name(&self) -> &'static str {
        "generate_image"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["send_image"]
    }

    fn description(&self) -> &'static str {
        "Generate an image with the given prompt and send it to the user. \
         Use a detailed, descriptive prompt."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "The prompt to generate the image from."
                },
                "num_images": {
                    "type": "integer",
                    "description": "Number of images to generate, 1 if not specified."
                }
            },
            "required": ["prompt"]
        })
    }

    fn progress_phrase(&self, args: &serde_json::Value) -> String {
        phrases::image_generation(args["prompt"].as_str().unwrap_or("your idea"))
    }

    async fn execute(&self, args: &serde_json::Value) -> Result<ToolOutput> {
        let prompt = str_arg(args, "prompt")?;
        let count = args["num_images"].as_u64().unwrap_or(1).clamp(1, MAX_IMAGES);
        let urls = self.generate(prompt, count).await?;
        Ok(ToolOutput::text(success_content(prompt, urls.len())).with_images(urls))
    }

    fn failure_content(&self, error: &Error) -> String {
        format!(
            "An error occurred while generating the image. Tell the user to try again with a different prompt. This is why it failed: {error}"
        )
    }

    fn failure_notice(&self) -> Option<&'static str> {
        Some("An error occurred while generating the image. Please try again.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_text_matches_image_count() {
        let one = success_content("a cat", 1);
        assert!(one.starts_with("Generated an image with the prompt: a cat and sent it"));
        let many = success_content("a cat", 3);
        assert!(many.starts_with("Generated 3 images with the prompt: a cat and sent them"));
    }

    #[test]
    fn send_image_is_an_alias() {
        let tool = GenerateImage::new("k", None, vec![]);
        assert_eq!(tool.aliases(), &["send_image"]);
        assert!(tool.failure_notice().is_some());
    }

    #[tokio::test]
    async fn no_models_fails_cleanly() {
        let tool = GenerateImage::new("k", None, vec![]);
        let err = tool.generate("a cat", 1).await.unwrap_err();
        assert!(err.to_string().contains("Unable to generate images with any model"));
    }
}
