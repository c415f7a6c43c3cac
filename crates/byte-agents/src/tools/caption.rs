use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

pub const CAPTION_FAILED: &str = "Failed to retrieve caption";

/// Describes an image for the model. Never fails: errors are reported as
/// [`CAPTION_FAILED`].
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, image_url: &str, message_text: &str) -> String;
}

/// Client for the vision-fusion service (`POST {image_url, message_text}`).
pub struct HttpCaptioner {
    client: Client,
    endpoint: String,
}

impl HttpCaptioner {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FusedAnalysis {
    #[serde(default)]
    azure: AzureAnalysis,
    #[serde(default)]
    blip: Vec<String>,
    #[serde(default)]
    google: GoogleAnalysis,
}

#[derive(Debug, Default, Deserialize)]
struct AzureAnalysis {
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    faces: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleAnalysis {
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    web_entities: Vec<String>,
}

fn faces_text(faces: &serde_json::Value) -> String {
    match faces {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl FusedAnalysis {
    fn render(&self) -> String {
        format!(
            "{}. Tags: {}. Categories: {}. Faces detected by Azure: {}. {}. Google Labels: {}. Text detected by Google: {}. Google Web Entities: {}",
            self.azure.description,
            self.azure.tags.join(", "),
            self.azure.categories.join(", "),
            faces_text(&self.azure.faces),
            self.blip.join(". "),
            self.google.labels.join(", "),
            self.google.text,
            self.google.web_entities.join(", "),
        )
        .trim()
        .to_string()
    }
}

#[async_trait]
impl Captioner for HttpCaptioner {
    async fn caption(&self, image_url: &str, message_text: &str) -> String {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "image_url": image_url, "message_text": message_text }))
            .send()
            .await;

        let response = match response {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(status = %r.status(), "caption service rejected the image");
                return CAPTION_FAILED.to_string();
            }
            Err(e) => {
                warn!("caption service unreachable: {e}");
                return CAPTION_FAILED.to_string();
            }
        };

        match response.json::<FusedAnalysis>().await {
            Ok(analysis) => analysis.render(),
            Err(e) => {
                warn!("caption service returned an unreadable body: {e}");
                CAPTION_FAILED.to_string()
            }
        }
    }
}
