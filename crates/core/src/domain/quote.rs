use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::rule::{RuleId, RuleType};

/// Amounts are exact decimals in memory and plain JSON numbers on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceComponents {
    #[serde(with = "rust_decimal::serde::float")]
    pub base_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub hazard_surcharge: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub access_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub dismantling_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub rule_type: RuleType,
    #[serde(with = "rust_decimal::serde::float")]
    pub applied_adjustment: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteExplanation {
    pub applied_rules: Vec<AppliedRule>,
}

/// The priced, auditable result of one estimation run. Stored on the booking,
/// replacing whatever quote was there before.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    pub volume: f64,
    pub material_risk: f64,
    pub postcode: String,
    pub price_components: PriceComponents,
    pub compliance: Vec<String>,
    pub explanation: QuoteExplanation,
}

impl QuoteBreakdown {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
