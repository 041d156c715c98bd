use crate::config::Settings;
use crate::domain::card::{CardRecord, CategoryRate};
use crate::llm::error::ServiceError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Card as the storage service serializes it. The wire field names
/// (`card_id`, `card_name`, `bank`) predate this codebase and are kept
/// verbatim; timestamps are passed through as opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCard {
    pub card_id: String,
    pub card_name: String,
    pub bank: String,
    #[serde(default)]
    pub cashback_categories: BTreeMap<String, CategoryRate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl StoredCard {
    pub fn from_record(record: &CardRecord) -> Self {
        Self {
            card_id: record.id.clone(),
            card_name: record.name.clone(),
            bank: record.issuer.clone(),
            cashback_categories: record.category_rates.clone(),
            created_at: None,
        }
    }

    pub fn into_record(self) -> CardRecord {
        CardRecord {
            id: self.card_id,
            name: self.card_name,
            issuer: self.bank,
            category_rates: self.cashback_categories,
        }
    }
}

/// A stored card as it appears in a user's wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCard {
    #[serde(flatten)]
    pub card: StoredCard,
    #[serde(default)]
    pub added_date: Option<String>,
    #[serde(default)]
    pub card_status: Option<String>,
    #[serde(default)]
    pub user_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CardsEnvelope {
    #[serde(default)]
    cards: Vec<StoredCard>,
}

#[derive(Debug, Clone, Deserialize)]
struct CreatedEnvelope {
    card: StoredCard,
}

#[derive(Debug, Clone, Serialize)]
struct AddUserCardBody<'a> {
    card_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

/// Client for the external card-storage API. Persistence itself lives
/// behind that service; this layer only reshapes requests and responses.
#[derive(Debug, Clone)]
pub struct CardStoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl CardStoreClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_card_api_base_url()?.to_string();

        let timeout_secs = std::env::var("CARD_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build card store http client")?;

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn list_cards(&self) -> Result<Vec<StoredCard>> {
        let body = self.get(&self.url("/api/cards")).await?;
        let envelope: CardsEnvelope =
            serde_json::from_str(&body).context("unexpected card list shape")?;
        Ok(envelope.cards)
    }

    pub async fn get_card(&self, card_id: &str) -> Result<StoredCard> {
        let body = self.get(&self.url(&format!("/api/cards/{card_id}"))).await?;
        serde_json::from_str(&body).context("unexpected card shape")
    }

    pub async fn create_card(&self, record: &CardRecord) -> Result<StoredCard> {
        let body = self
            .send(
                self.http
                    .post(self.url("/api/cards"))
                    .json(&StoredCard::from_record(record)),
            )
            .await?;
        let envelope: CreatedEnvelope =
            serde_json::from_str(&body).context("unexpected create card response")?;
        Ok(envelope.card)
    }

    pub async fn delete_card(&self, card_id: &str) -> Result<()> {
        self.send(
            self.http
                .delete(self.url(&format!("/api/cards/{card_id}"))),
        )
        .await?;
        Ok(())
    }

    pub async fn user_cards(&self, user_id: &str) -> Result<Vec<UserCard>> {
        let body = self
            .get(&self.url(&format!("/api/users/{user_id}/cards")))
            .await?;
        serde_json::from_str(&body).context("unexpected user card list shape")
    }

    pub async fn add_card_to_user(
        &self,
        user_id: &str,
        card_id: &str,
        notes: Option<&str>,
    ) -> Result<()> {
        self.send(
            self.http
                .post(self.url(&format!("/api/users/{user_id}/cards")))
                .json(&AddUserCardBody { card_id, notes }),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_card_from_user(&self, user_id: &str, card_id: &str) -> Result<()> {
        self.send(
            self.http
                .delete(self.url(&format!("/api/users/{user_id}/cards/{card_id}"))),
        )
        .await?;
        Ok(())
    }

    async fn get(&self, url: &str) -> Result<String> {
        self.send(self.http.get(url)).await
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String> {
        let res = req
            .send()
            .await
            .map_err(|e| ServiceError::upstream(None, format!("card store request failed: {e}")))?;

        let status = res.status();
        let text = res.text().await.map_err(|e| {
            ServiceError::upstream(None, format!("failed to read card store response: {e}"))
        })?;

        if !status.is_success() {
            return Err(
                ServiceError::upstream(Some(status.as_u16()), error_message(&text)).into(),
            );
        }
        Ok(text)
    }
}

/// The storage service reports failures as `{"error": "..."}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_card_list_envelope() {
        let body = json!({
            "cards": [{
                "card_id": "amex-gold",
                "card_name": "Amex Gold",
                "bank": "American Express",
                "cashback_categories": {
                    "dining": {"rate": 4.0, "description": "Dining - 4%"}
                },
                "created_at": "2026-08-20T10:15:00.123456"
            }]
        })
        .to_string();

        let envelope: CardsEnvelope = serde_json::from_str(&body).unwrap();
        assert_eq!(envelope.cards.len(), 1);
        let record = envelope.cards[0].clone().into_record();
        assert_eq!(record.id, "amex-gold");
        assert_eq!(record.issuer, "American Express");
        assert_eq!(record.category_rates.get("dining").unwrap().rate, 4.0);
    }

    #[test]
    fn parses_user_card_with_wallet_fields() {
        let body = json!([{
            "card_id": "amex-gold",
            "card_name": "Amex Gold",
            "bank": "American Express",
            "added_date": "2026-08-21T09:00:00",
            "card_status": "active",
            "user_notes": "dining card"
        }])
        .to_string();

        let cards: Vec<UserCard> = serde_json::from_str(&body).unwrap();
        assert_eq!(cards[0].card.card_id, "amex-gold");
        assert_eq!(cards[0].card_status.as_deref(), Some("active"));
        assert!(cards[0].card.cashback_categories.is_empty());
    }

    #[test]
    fn create_body_uses_wire_field_names() {
        let record = CardRecord {
            id: "chase-freedom-unlimited".to_string(),
            name: "Chase Freedom Unlimited".to_string(),
            issuer: "Chase".to_string(),
            category_rates: BTreeMap::new(),
        };
        let v = serde_json::to_value(StoredCard::from_record(&record)).unwrap();
        assert_eq!(v["card_id"], "chase-freedom-unlimited");
        assert_eq!(v["card_name"], "Chase Freedom Unlimited");
        assert_eq!(v["bank"], "Chase");
        assert!(v.get("created_at").is_none());
    }

    #[test]
    fn catalog_and_wallet_paths_are_distinct() {
        let client = CardStoreClient {
            http: reqwest::Client::new(),
            base_url: "https://cards.example.com/".to_string(),
        };
        assert_eq!(
            client.url("/api/cards/amex-gold"),
            "https://cards.example.com/api/cards/amex-gold"
        );
        assert_eq!(
            client.url("/api/users/user-001/cards/amex-gold"),
            "https://cards.example.com/api/users/user-001/cards/amex-gold"
        );
    }

    #[test]
    fn error_message_prefers_error_key() {
        assert_eq!(
            error_message(r#"{"error":"Card not found"}"#),
            "Card not found"
        );
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }
}
