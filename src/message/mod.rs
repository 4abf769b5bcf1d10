//! Motivational text shown alongside a block notification.

mod gemini;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

pub use gemini::{DEFAULT_ENDPOINT, GeminiProvider};

pub const DEFAULT_MESSAGE: &str = "Stay focused! This is your productive time. \
Close the distractions and get back to the task in front of you.";

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Remote text generator asked for a fresh message on every fired notification.
#[async_trait]
pub trait MessageProvider: Send + Sync {
    async fn fetch_message(&self, app_name: &str) -> Result<String, MessageError>;
}

/// Wraps an optional [`MessageProvider`] with a deadline and a fallback.
///
/// Never fails: when the provider errors or times out, the last message it delivered is
/// reused, or [`DEFAULT_MESSAGE`] if it never delivered one.
pub struct MessageSource {
    provider: Option<Arc<dyn MessageProvider>>,
    timeout: Duration,
    last: Mutex<Option<String>>,
}

impl MessageSource {
    /// Always answers with [`DEFAULT_MESSAGE`].
    pub fn fixed() -> Self {
        Self {
            provider: None,
            timeout: Duration::ZERO,
            last: Mutex::new(None),
        }
    }

    pub fn new(provider: Arc<dyn MessageProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
            last: Mutex::new(None),
        }
    }

    pub async fn obtain(&self, app_name: &str) -> String {
        let Some(provider) = &self.provider else {
            return DEFAULT_MESSAGE.to_string();
        };

        match tokio::time::timeout(self.timeout, provider.fetch_message(app_name)).await {
            Ok(Ok(message)) => {
                debug!(app = app_name, "fetched motivational message");
                *self.last.lock() = Some(message.clone());
                message
            }
            Ok(Err(e)) => {
                warn!(app = app_name, error = %e, "message provider failed, using fallback");
                self.fallback()
            }
            Err(_) => {
                warn!(app = app_name, timeout = ?self.timeout, "message provider timed out, using fallback");
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> String {
        self.last
            .lock()
            .clone()
            .unwrap_or_else(|| DEFAULT_MESSAGE.to_string())
    }
}
