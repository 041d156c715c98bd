pub mod error;
pub mod json;
pub mod openai;

use crate::llm::error::ServiceError;
use base64::Engine as _;

#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi,
}

/// One chat turn: a system instruction plus a user message that may carry
/// an attached photo.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub system: String,
    pub user_text: String,
    pub image: Option<ImagePayload>,
}

impl ChatPrompt {
    pub fn text(system: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user_text: user_text.into(),
            image: None,
        }
    }

    pub fn with_image(
        system: impl Into<String>,
        user_text: impl Into<String>,
        image: ImagePayload,
    ) -> Self {
        Self {
            system: system.into(),
            user_text: user_text.into(),
            image: Some(image),
        }
    }
}

/// A base64-encoded still image as received from the UI.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub media_type: String,
    pub data_base64: String,
}

impl ImagePayload {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.media_type.starts_with("image/") {
            return Err(ServiceError::missing_field("image media_type").into());
        }
        if self.data_base64.trim().is_empty()
            || base64::engine::general_purpose::STANDARD
                .decode(self.data_base64.trim())
                .is_err()
        {
            return Err(ServiceError::missing_field("image data").into());
        }
        Ok(())
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64.trim())
    }
}

/// Seam between the extractor/engine and the hosted model, so both can be
/// exercised with a canned client in tests.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Sends one chat completion expecting a JSON-object reply and returns
    /// the first choice's message content.
    async fn complete_json(&self, prompt: ChatPrompt) -> anyhow::Result<String>;
}
