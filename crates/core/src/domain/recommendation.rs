use serde::{Deserialize, Serialize};

/// Advisory model output for a purchase. None of the fields are required;
/// the answer is surfaced to the UI as-is and never recomputed locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub recommended_card: Option<String>,
    #[serde(default)]
    pub purchase_category: Option<String>,
    #[serde(default)]
    pub cashback_rate: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub estimated_cashback: Option<String>,
    /// Only present for the image variant: what the model saw in the photo.
    #[serde(default)]
    pub purchase_description: Option<String>,
}
