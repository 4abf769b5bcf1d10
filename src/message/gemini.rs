use async_trait::async_trait;
use chrono::Local;
use serde_json::json;
use std::{env, time::Duration};
use tracing::debug;
use url::Url;

use super::{MessageError, MessageProvider};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

/// Asks a Gemini model for a short nudge about the app that was just closed.
pub struct GeminiProvider {
    client: reqwest::Client,
    url: Url,
    api_key: String,
    personality: String,
}

impl GeminiProvider {
    pub fn new(
        endpoint: &Url,
        model: &str,
        api_key: String,
        personality: String,
        timeout: Duration,
    ) -> Result<Self, MessageError> {
        if api_key.trim().is_empty() {
            return Err(MessageError::NotConfigured("API key is empty".to_string()));
        }

        let url = Self::generate_url(endpoint, model)?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            api_key,
            personality,
        })
    }

    /// Same as [`GeminiProvider::new`], with the key read from `GEMINI_API_KEY`.
    pub fn from_env(
        endpoint: &Url,
        model: &str,
        personality: String,
        timeout: Duration,
    ) -> Result<Self, MessageError> {
        let api_key = env::var(API_KEY_VAR)
            .map_err(|_| MessageError::NotConfigured(format!("{API_KEY_VAR} is not set")))?;
        Self::new(endpoint, model, api_key, personality, timeout)
    }

    fn generate_url(endpoint: &Url, model: &str) -> Result<Url, MessageError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(MessageError::NotConfigured("model name is empty".to_string()));
        }

        // without a trailing slash `join` would replace the last path segment
        let mut base = endpoint.clone();
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        base.join(&format!("models/{model}:generateContent"))
            .map_err(|e| MessageError::NotConfigured(format!("invalid endpoint: {e}")))
    }

    fn prompt(&self, app_name: &str, at: &str) -> String {
        let personality = match self.personality.trim() {
            "" => "supportive",
            p => p,
        };

        format!(
            "You are a {personality} productivity assistant.\n\n\
             The app \"{app_name}\" was just closed at {at} because it is currently productive time.\n\n\
             Write a short motivational message (at most 2-3 sentences) that:\n\
             1. Reminds the user why staying focused matters right now\n\
             2. Suggests one concrete thing they can do instead\n\n\
             Reply with the message only, without any formatting or extra explanation."
        )
    }

    fn build_request_body(prompt: &str) -> serde_json::Value {
        json!({
            "contents": [
                { "parts": [{ "text": prompt }] }
            ],
        })
    }

    fn extract_text(response: &serde_json::Value) -> Result<String, MessageError> {
        let text = response["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                MessageError::Parse("missing candidates[0].content.parts[0].text".into())
            })?
            .trim();

        if text.is_empty() {
            return Err(MessageError::Parse("empty message".into()));
        }

        Ok(text.to_string())
    }
}

#[async_trait]
impl MessageProvider for GeminiProvider {
    async fn fetch_message(&self, app_name: &str) -> Result<String, MessageError> {
        let at = Local::now().format("%H:%M").to_string();
        let body = Self::build_request_body(&self.prompt(app_name, &at));

        debug!(url = %self.url, app = app_name, "requesting motivational message");

        let response = self
            .client
            .post(self.url.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(MessageError::Api { status, body });
        }

        let response = response.json::<serde_json::Value>().await?;
        Self::extract_text(&response)
    }
}
