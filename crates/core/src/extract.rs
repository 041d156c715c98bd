use crate::config::Settings;
use crate::domain::card::CardRecord;
use crate::domain::contract::CardAnswer;
use crate::llm::error::ServiceError;
use crate::llm::{json, ChatPrompt, CompletionClient, ImagePayload};
use std::sync::Arc;

/// Turns a card name or photo into a normalized `CardRecord` by delegating
/// interpretation to the hosted model and decoding its structured answer.
#[derive(Clone)]
pub struct CardExtractor {
    llm: Arc<dyn CompletionClient>,
    system_prompt: String,
}

impl CardExtractor {
    pub fn new(llm: Arc<dyn CompletionClient>, settings: &Settings) -> Self {
        let system_prompt = settings
            .extract_prompt
            .clone()
            .unwrap_or_else(default_system_prompt);
        Self { llm, system_prompt }
    }

    pub async fn extract_from_name(&self, name: &str) -> anyhow::Result<CardRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::missing_field("card_name").into());
        }

        let prompt = ChatPrompt::text(
            self.system_prompt.clone(),
            format!("Credit card name: {name}"),
        );
        self.run(prompt).await
    }

    pub async fn extract_from_image(&self, image: ImagePayload) -> anyhow::Result<CardRecord> {
        image.validate()?;

        let prompt = ChatPrompt::with_image(
            self.system_prompt.clone(),
            "Identify the credit card shown in this photo.".to_string(),
            image,
        );
        self.run(prompt).await
    }

    async fn run(&self, prompt: ChatPrompt) -> anyhow::Result<CardRecord> {
        let content = self.llm.complete_json(prompt).await?;
        let answer: CardAnswer = json::decode_answer(&content)?;
        if let Some(notes) = answer.notes.as_deref().filter(|s| !s.trim().is_empty()) {
            tracing::debug!(notes, "model notes on extracted card");
        }
        answer.validate_and_into_record()
    }
}

fn default_system_prompt() -> String {
    [
        "You are a credit card rewards expert.",
        "Given a credit card name or a photo of a card, report its cashback structure.",
        "Return ONLY a valid JSON object. No markdown, no prose, no extra keys.",
        "Output schema:",
        "{",
        "  \"card_name\": \"official card name\",",
        "  \"issuer\": \"issuing bank\",",
        "  \"cashback_categories\": [",
        "    {\"category\": \"Dining\", \"rate\": \"3%\"}",
        "  ],",
        "  \"notes\": \"anything notable about the rewards program\"",
        "}",
        "Rules:",
        "- card_name and issuer MUST be present",
        "- rate is a percentage string like \"3%\" or \"1.5%\"",
        "- include a category entry for the default/base rate when the card has one",
        "- notes may be an empty string",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;

    struct CannedClient {
        reply: String,
    }

    #[async_trait::async_trait]
    impl CompletionClient for CannedClient {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        async fn complete_json(&self, _prompt: ChatPrompt) -> anyhow::Result<String> {
            Ok(self.reply.clone())
        }
    }

    struct FailingClient;

    #[async_trait::async_trait]
    impl CompletionClient for FailingClient {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        async fn complete_json(&self, _prompt: ChatPrompt) -> anyhow::Result<String> {
            Err(ServiceError::upstream(Some(503), "model unavailable").into())
        }
    }

    fn extractor(reply: &str) -> CardExtractor {
        CardExtractor::new(
            Arc::new(CannedClient {
                reply: reply.to_string(),
            }),
            &test_settings(),
        )
    }

    fn test_settings() -> Settings {
        Settings {
            openai_api_key: Some("test-key".to_string()),
            card_api_base_url: None,
            extract_prompt: None,
            recommend_prompt: None,
            sentry_dsn: None,
        }
    }

    #[tokio::test]
    async fn extracts_record_from_name() {
        let reply = r#"{"card_name":"Chase Freedom Unlimited","issuer":"Chase","cashback_categories":[{"category":"Dining","rate":"3%"}]}"#;
        let record = extractor(reply)
            .extract_from_name("Chase Freedom Unlimited")
            .await
            .unwrap();

        assert_eq!(record.id, "chase-freedom-unlimited");
        assert_eq!(record.issuer, "Chase");
        assert_eq!(record.category_rates.get("dining").unwrap().rate, 3.0);
        assert_eq!(
            record.category_rates.get("dining").unwrap().description,
            "Dining - 3%"
        );
    }

    #[tokio::test]
    async fn empty_name_fails_before_any_model_call() {
        let err = extractor("{}").extract_from_name("   ").await.unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert!(matches!(service, ServiceError::Validation { .. }));
    }

    #[tokio::test]
    async fn missing_card_name_in_answer_fails_validation() {
        let err = extractor(r#"{"issuer":"Chase"}"#)
            .extract_from_name("some card")
            .await
            .unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert!(matches!(service, ServiceError::Validation { field } if *field == "card_name"));
    }

    #[tokio::test]
    async fn fenced_answer_is_tolerated() {
        let reply = "```json\n{\"card_name\":\"Amex Gold\",\"issuer\":\"American Express\",\"cashback_categories\":[]}\n```";
        let record = extractor(reply).extract_from_name("amex gold").await.unwrap();
        assert_eq!(record.id, "amex-gold");
        assert!(record.category_rates.is_empty());
    }

    #[tokio::test]
    async fn non_json_answer_is_a_parse_error() {
        let err = extractor("I think that card is great!")
            .extract_from_name("some card")
            .await
            .unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert!(matches!(service, ServiceError::Parse { .. }));
    }

    #[tokio::test]
    async fn upstream_failure_passes_through_with_status() {
        let extractor = CardExtractor::new(Arc::new(FailingClient), &test_settings());
        let err = extractor.extract_from_name("some card").await.unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert_eq!(service.status(), Some(503));
    }

    #[tokio::test]
    async fn invalid_image_payload_fails_validation() {
        let extractor = extractor("{}");
        let err = extractor
            .extract_from_image(ImagePayload {
                media_type: "text/plain".to_string(),
                data_base64: "aGVsbG8=".to_string(),
            })
            .await
            .unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert!(matches!(service, ServiceError::Validation { .. }));
    }
}
