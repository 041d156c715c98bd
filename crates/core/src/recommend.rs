use crate::config::Settings;
use crate::domain::card::CardRecord;
use crate::domain::recommendation::Recommendation;
use crate::llm::error::ServiceError;
use crate::llm::{json, ChatPrompt, CompletionClient, ImagePayload};
use std::fmt::Write as _;
use std::sync::Arc;

const NO_CASHBACK_INFO: &str = "No cashback info";

/// Ranks a user's cards against a described or photographed purchase.
/// Selection is delegated to the hosted model; the answer is advisory and
/// returned without local validation.
#[derive(Clone)]
pub struct Recommender {
    llm: Arc<dyn CompletionClient>,
    system_prompt: String,
}

impl Recommender {
    pub fn new(llm: Arc<dyn CompletionClient>, settings: &Settings) -> Self {
        let system_prompt = settings
            .recommend_prompt
            .clone()
            .unwrap_or_else(default_system_prompt);
        Self { llm, system_prompt }
    }

    pub async fn recommend(
        &self,
        cards: &[CardRecord],
        description: &str,
    ) -> anyhow::Result<Recommendation> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ServiceError::missing_field("purchase description").into());
        }

        let prompt = ChatPrompt::text(
            self.system_prompt.clone(),
            format!(
                "My cards:\n{}\nPurchase: {description}",
                card_context(cards)?
            ),
        );
        self.run(prompt).await
    }

    pub async fn recommend_from_image(
        &self,
        cards: &[CardRecord],
        image: ImagePayload,
        note: Option<&str>,
    ) -> anyhow::Result<Recommendation> {
        image.validate()?;

        let mut user_text = format!(
            "My cards:\n{}\nThe attached photo shows what I am about to buy.\n\
             Also report what you see as \"purchase_description\".",
            card_context(cards)?
        );
        if let Some(note) = note.map(str::trim).filter(|s| !s.is_empty()) {
            let _ = write!(user_text, "\nAdditional context: {note}");
        }

        let prompt = ChatPrompt::with_image(self.system_prompt.clone(), user_text, image);
        self.run(prompt).await
    }

    async fn run(&self, prompt: ChatPrompt) -> anyhow::Result<Recommendation> {
        let content = self.llm.complete_json(prompt).await?;
        json::decode_answer(&content)
    }
}

/// One human-readable line per card, used as model context.
fn card_context(cards: &[CardRecord]) -> anyhow::Result<String> {
    if cards.is_empty() {
        return Err(ServiceError::missing_field("cards").into());
    }

    let mut out = String::new();
    for card in cards {
        let rates = if card.category_rates.is_empty() {
            NO_CASHBACK_INFO.to_string()
        } else {
            card.category_rates
                .values()
                .map(|cr| cr.description.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        };
        let _ = writeln!(out, "- {} ({}): {rates}", card.name, card.issuer);
    }
    Ok(out)
}

fn default_system_prompt() -> String {
    [
        "You are a credit card cashback assistant.",
        "Given a user's cards and a purchase, pick the single best card to pay with.",
        "Return ONLY a valid JSON object. No markdown, no prose, no extra keys.",
        "Output schema:",
        "{",
        "  \"recommended_card\": \"exact card name from the list\",",
        "  \"purchase_category\": \"detected spending category\",",
        "  \"cashback_rate\": \"rate the recommended card earns, e.g. \\\"3%\\\"\",",
        "  \"reasoning\": \"one or two sentences\",",
        "  \"estimated_cashback\": \"dollar estimate, only when the purchase mentions an amount\",",
        "  \"purchase_description\": \"only when a photo is attached: what the photo shows\"",
        "}",
        "Rules:",
        "- recommended_card MUST be one of the supplied cards",
        "- detect the purchase category first, then compare the cards' rates for it",
        "- omit estimated_cashback when no monetary amount is present",
    ]
    .join("\n")
}
