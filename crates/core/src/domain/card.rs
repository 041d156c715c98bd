use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slugified category keys are capped so DynamoDB-style attribute names
/// stay short no matter what label the model invents.
pub const MAX_CATEGORY_KEY_LEN: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRecord {
    pub id: String,
    pub name: String,
    pub issuer: String,
    pub category_rates: BTreeMap<String, CategoryRate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRate {
    pub rate: f64,
    pub description: String,
}

/// Lowercase, alphanumeric-and-hyphen slug: whitespace (and existing
/// hyphens) collapse to a single hyphen, every other character is dropped.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
        } else if ch.is_whitespace() || ch == '-' {
            pending_hyphen = true;
        }
        // Punctuation and symbols are stripped without leaving a hyphen.
    }
    out
}

/// Category keys are slugs truncated to `MAX_CATEGORY_KEY_LEN` on a char
/// boundary, with any trailing hyphen the cut left behind trimmed off.
pub fn category_key(label: &str) -> String {
    let slug = slugify(label);
    let mut key: String = slug.chars().take(MAX_CATEGORY_KEY_LEN).collect();
    while key.ends_with('-') {
        key.pop();
    }
    key
}

/// Extracts the first numeric token (decimals supported) from a free-form
/// rate string such as `"3.5% cashback"`. No token means 0.
pub fn parse_rate(raw: &str) -> f64 {
    let bytes = raw.as_bytes();
    let Some(start) = bytes.iter().position(|b| b.is_ascii_digit()) else {
        return 0.0;
    };

    let mut end = start;
    let mut seen_dot = false;
    while end < bytes.len() {
        let b = bytes[end];
        if b.is_ascii_digit() {
            end += 1;
        } else if b == b'.' && !seen_dot && bytes.get(end + 1).is_some_and(|n| n.is_ascii_digit()) {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }

    raw[start..end]
        .parse::<f64>()
        .map(round2)
        .unwrap_or(0.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Highest stored rate for a category key across the supplied cards.
/// Local counterpart of the store-side "best card for category" query;
/// the recommendation path itself stays delegated to the model.
pub fn best_for_category<'a>(cards: &'a [CardRecord], key: &str) -> Option<&'a CardRecord> {
    cards
        .iter()
        .filter_map(|card| card.category_rates.get(key).map(|cr| (card, cr.rate)))
        .filter(|(_, rate)| *rate > 0.0)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(card, _)| card)
}
