use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DEFAULT_CURRENCY: &str = "GBP";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    HazardMultiplier,
    LocationModifier,
    DismantlingFeeAdjustment,
    BaseRateAdjustment,
    VolumeEstimation,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HazardMultiplier => "hazard_multiplier",
            Self::LocationModifier => "location_modifier",
            Self::DismantlingFeeAdjustment => "dismantling_fee_adjustment",
            Self::BaseRateAdjustment => "base_rate_adjustment",
            Self::VolumeEstimation => "volume_estimation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hazard_multiplier" => Some(Self::HazardMultiplier),
            "location_modifier" => Some(Self::LocationModifier),
            "dismantling_fee_adjustment" => Some(Self::DismantlingFeeAdjustment),
            "base_rate_adjustment" => Some(Self::BaseRateAdjustment),
            "volume_estimation" => Some(Self::VolumeEstimation),
            _ => None,
        }
    }
}

impl FromStr for RuleType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
            .ok_or_else(|| DomainError::InvariantViolation(format!("unknown rule_type `{value}`")))
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admin-maintained pricing rule. Only ever read by the estimation core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationRule {
    pub id: RuleId,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub min_value: Option<Decimal>,
    pub max_value: Option<Decimal>,
    pub multiplier: Decimal,
    pub base_rate: Option<Decimal>,
    pub hazard_surcharge: Option<Decimal>,
    pub access_fee: Option<Decimal>,
    pub dismantling_fee: Option<Decimal>,
    pub currency: String,
    pub postcode_prefix: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EstimationRule {
    /// Whether this rule's postcode scope covers the given postcode.
    ///
    /// The scope is the rule's `postcode_prefix`, which must be a prefix of the
    /// first three characters of the postcode. Rules without a prefix never match.
    pub fn covers_postcode(&self, postcode: &str) -> bool {
        match &self.postcode_prefix {
            Some(prefix) => postcode_area(postcode).starts_with(prefix.as_str()),
            None => false,
        }
    }
}

/// The first three characters of a postcode, used as the coarse rule matching key.
pub fn postcode_area(postcode: &str) -> &str {
    match postcode.char_indices().nth(3) {
        Some((index, _)) => &postcode[..index],
        None => postcode,
    }
}
