//! Vision extraction: ask a hosted vision-language model about a product photo.
//!
//! The model sits behind [`VisionModel`]; [`OpenAiVision`] speaks the
//! OpenAI-compatible chat-completions format. Replies are free text, and when a
//! caller wants structure the first `{...}` block in the reply is parsed leniently.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::VisionSettings;
use crate::images::{decode_data_url, encode_data_url};

pub const PRODUCT_PROMPT: &str = "Identify the product in this photo. Reply with a JSON object \
with the keys \"name\" (the product name) and \"brand\" (the brand or manufacturer). \
Use an empty string for anything you cannot read.";

pub const FULL_PROMPT: &str = "Identify the product in this photo. Reply with a JSON object \
with the keys \"name\" (the product name), \"brand\" (the brand or manufacturer) and \
\"barcode\" (the digits printed under the barcode, no spaces). \
Use an empty string for anything you cannot read.";

pub const BARCODE_PROMPT: &str = "Read the barcode in this photo. Reply with a JSON object \
with the single key \"barcode\" holding the digits printed under the barcode, no spaces. \
Use an empty string if there is no readable barcode.";

pub const NAME_PROMPT: &str = "Reply with a JSON object with the single key \"name\" holding \
the product name printed on the packaging in this photo.";

pub const DESCRIBE_PROMPT: &str = "Describe the product in this photo in one short sentence \
suitable as an inventory name.";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("no vision API key configured")]
    NotConfigured,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("vision upstream failure: {0}")]
    Upstream(String),

    #[error("vision reply did not contain a JSON object")]
    MalformedResponse,
}

impl From<reqwest::Error> for VisionError {
    fn from(err: reqwest::Error) -> Self {
        VisionError::Upstream(err.to_string())
    }
}

/// A single stateless round trip: image plus instruction in, text out.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, image_data_url: &str, instruction: &str) -> Result<String, VisionError>;
}

pub struct OpenAiVision {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
    api_key: String,
}

impl OpenAiVision {
    pub fn new(settings: &VisionSettings, api_key: impl Into<String>) -> Self {
        OpenAiVision {
            client: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl VisionModel for OpenAiVision {
    async fn complete(&self, image_data_url: &str, instruction: &str) -> Result<String, VisionError> {
        info!(model = %self.model, "requesting vision completion");
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": instruction },
                    { "type": "image_url", "image_url": { "url": image_data_url } }
                ]
            }],
            "max_tokens": self.max_tokens
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(VisionError::Upstream(format!("{}: {}", status, detail)));
        }

        let json: Value = resp.json().await?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VisionError::Upstream("reply had no message content".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Text(String),
    Fields(Map<String, Value>),
}

impl Extraction {
    /// String value of `key`, or `""` when the model left it out.
    pub fn field(&self, key: &str) -> String {
        match self {
            Extraction::Fields(map) => match map.get(key) {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
            Extraction::Text(_) => String::new(),
        }
    }

    pub fn text(&self) -> String {
        match self {
            Extraction::Text(text) => text.trim().to_string(),
            Extraction::Fields(map) => Value::Object(map.clone()).to_string(),
        }
    }
}

static JSON_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));

/// Pulls the outermost `{...}` block out of free text and parses it as an object.
pub fn lenient_json(text: &str) -> Option<Map<String, Value>> {
    let block = JSON_BLOCK.find(text)?;
    match serde_json::from_str::<Value>(block.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Front door for vision features. Without a model every call reports
/// [`VisionError::NotConfigured`].
#[derive(Clone, Default)]
pub struct VisionAdapter {
    model: Option<Arc<dyn VisionModel>>,
}

impl VisionAdapter {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        VisionAdapter { model: Some(model) }
    }

    pub fn unconfigured() -> Self {
        VisionAdapter::default()
    }

    pub fn from_settings(settings: &VisionSettings, api_key: Option<String>) -> Self {
        match api_key {
            Some(key) => VisionAdapter::new(Arc::new(OpenAiVision::new(settings, key))),
            None => VisionAdapter::unconfigured(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    pub async fn extract(
        &self,
        image: &str,
        instruction: &str,
        expect_json: bool,
    ) -> Result<Extraction, VisionError> {
        let model = self.model.as_ref().ok_or(VisionError::NotConfigured)?;
        // Re-encode so the upstream always sees a well-formed, tagged data URL.
        let image = decode_data_url(image).map_err(|e| VisionError::InvalidImage(e.to_string()))?;
        let reply = model.complete(&encode_data_url(&image), instruction).await?;
        debug!(chars = reply.len(), "vision reply received");

        if !expect_json {
            return Ok(Extraction::Text(reply));
        }
        lenient_json(&reply)
            .map(Extraction::Fields)
            .ok_or(VisionError::MalformedResponse)
    }
}
