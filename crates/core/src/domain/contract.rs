use crate::domain::card::{category_key, parse_rate, round2, slugify, CardRecord, CategoryRate};
use crate::llm::error::ServiceError;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Model answer for card extraction.
///
/// Field policy: `card_name` and `issuer` are required (missing means the
/// whole extraction fails); `cashback_categories` is defaulted (absent or
/// non-array becomes an empty mapping, with a warning); individual category
/// entries are best-effort (malformed ones are logged and skipped);
/// `notes` is free text and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CardAnswer {
    #[serde(default)]
    pub card_name: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub cashback_categories: Option<Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CardAnswer {
    pub fn validate_and_into_record(self) -> anyhow::Result<CardRecord> {
        let name = required_field(self.card_name, "card_name")?;
        let issuer = required_field(self.issuer, "issuer")?;

        let entries = match self.cashback_categories {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                tracing::warn!(
                    value_type = value_type(&other),
                    "cashback_categories is not an array; using empty mapping"
                );
                Vec::new()
            }
            None => {
                tracing::warn!("cashback_categories missing from model answer; using empty mapping");
                Vec::new()
            }
        };

        let mut category_rates = BTreeMap::new();
        for entry in &entries {
            let Some((key, rate)) = decode_category_entry(entry) else {
                continue;
            };
            if category_rates.contains_key(&key) {
                tracing::warn!(%key, "duplicate category key in model answer; keeping first");
                continue;
            }
            category_rates.insert(key, rate);
        }

        Ok(CardRecord {
            id: slugify(&name),
            name,
            issuer,
            category_rates,
        })
    }
}

fn required_field(value: Option<String>, field: &'static str) -> anyhow::Result<String> {
    let trimmed = value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    trimmed.ok_or_else(|| ServiceError::missing_field(field).into())
}

fn decode_category_entry(entry: &Value) -> Option<(String, CategoryRate)> {
    let label = entry
        .get("category")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let Some(label) = label else {
        tracing::warn!(?entry, "category entry missing label; skipping");
        return None;
    };

    // The rate usually arrives as a percentage string, but some answers
    // put a bare number there.
    let (rate, raw_rate) = match entry.get("rate") {
        Some(Value::String(raw)) => (parse_rate(raw), raw.trim().to_string()),
        Some(Value::Number(n)) => {
            let rate = n.as_f64().map(round2).filter(|r| *r >= 0.0).unwrap_or(0.0);
            (rate, n.to_string())
        }
        _ => {
            tracing::warn!(category = label, "category entry missing rate; skipping");
            return None;
        }
    };

    let key = category_key(label);
    if key.is_empty() {
        tracing::warn!(category = label, "category label slugifies to nothing; skipping");
        return None;
    }

    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{label} - {raw_rate}"));

    Some((key, CategoryRate { rate, description }))
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn answer(v: Value) -> CardAnswer {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn builds_normalized_record() {
        let record = answer(json!({
            "card_name": "Chase Freedom Unlimited",
            "issuer": "Chase",
            "cashback_categories": [
                {"category": "Dining", "rate": "3%"}
            ]
        }))
        .validate_and_into_record()
        .unwrap();

        assert_eq!(record.id, "chase-freedom-unlimited");
        assert_eq!(record.name, "Chase Freedom Unlimited");
        assert_eq!(record.issuer, "Chase");
        let dining = record.category_rates.get("dining").unwrap();
        assert_eq!(dining.rate, 3.0);
        assert_eq!(dining.description, "Dining - 3%");
    }

    #[test]
    fn missing_card_name_is_a_validation_error() {
        let err = answer(json!({"issuer": "Chase"}))
            .validate_and_into_record()
            .unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert!(matches!(service, ServiceError::Validation { field } if *field == "card_name"));
    }

    #[test]
    fn missing_issuer_is_a_validation_error() {
        let err = answer(json!({"card_name": "Some Card"}))
            .validate_and_into_record()
            .unwrap_err();
        let service = err.downcast_ref::<ServiceError>().unwrap();
        assert!(matches!(service, ServiceError::Validation { field } if *field == "issuer"));
    }

    #[test]
    fn non_array_categories_become_empty_mapping() {
        let record = answer(json!({
            "card_name": "Some Card",
            "issuer": "Some Bank",
            "cashback_categories": "none really"
        }))
        .validate_and_into_record()
        .unwrap();
        assert!(record.category_rates.is_empty());
    }

    #[test]
    fn absent_categories_become_empty_mapping() {
        let record = answer(json!({"card_name": "Some Card", "issuer": "Some Bank"}))
            .validate_and_into_record()
            .unwrap();
        assert!(record.category_rates.is_empty());
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let record = answer(json!({
            "card_name": "Some Card",
            "issuer": "Some Bank",
            "cashback_categories": [
                {"rate": "2%"},
                {"category": "Travel"},
                {"category": "Gas", "rate": "flat"},
                {"category": "Grocery", "rate": "1.5% back"}
            ]
        }))
        .validate_and_into_record()
        .unwrap();

        assert_eq!(record.category_rates.len(), 2);
        assert_eq!(record.category_rates.get("gas").unwrap().rate, 0.0);
        assert_eq!(record.category_rates.get("grocery").unwrap().rate, 1.5);
    }

    #[test]
    fn numeric_rates_and_descriptions_pass_through() {
        let record = answer(json!({
            "card_name": "Amex Gold",
            "issuer": "American Express",
            "cashback_categories": [
                {"category": "Dining", "rate": 4, "description": "4x points at restaurants"}
            ]
        }))
        .validate_and_into_record()
        .unwrap();

        let dining = record.category_rates.get("dining").unwrap();
        assert_eq!(dining.rate, 4.0);
        assert_eq!(dining.description, "4x points at restaurants");
    }

    #[test]
    fn duplicate_category_keys_keep_first_entry() {
        let record = answer(json!({
            "card_name": "Some Card",
            "issuer": "Some Bank",
            "cashback_categories": [
                {"category": "Dining", "rate": "3%"},
                {"category": "dining", "rate": "5%"}
            ]
        }))
        .validate_and_into_record()
        .unwrap();

        assert_eq!(record.category_rates.len(), 1);
        assert_eq!(record.category_rates.get("dining").unwrap().rate, 3.0);
    }
}
