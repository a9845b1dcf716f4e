use rust_decimal::Decimal;
use serde::Serialize;

/// A validated estimate from the vision model.
///
/// Instances only come out of [`crate::validation::ResponseValidator`], so every
/// ratio lies in `[0, 1]` and every monetary field is a non-negative amount with at
/// most two decimal places.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AIEstimate {
    pub volume: f64,
    pub material_hazard_risk: f64,
    pub access_difficulty: f64,
    pub base_cost_estimate: Decimal,
    pub hazard_surcharge: Decimal,
    pub access_fee: Decimal,
    pub dismantling_fee: Decimal,
    pub special_handling_requirements: Vec<String>,
    pub confidence_score: f64,
}
