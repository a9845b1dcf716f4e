//! Fail-closed validation of untrusted estimator output.
//!
//! Nothing is coerced or clamped. A value that does not already satisfy its range is
//! rejected with the name of the field, so the caller can log exactly what went wrong.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};

use crate::domain::estimate::AIEstimate;
use crate::errors::{EstimateRejection, ValidationError};

/// Monetary amounts may carry at most this many decimal places.
pub const CURRENCY_SCALE: u32 = 2;

pub struct ResponseValidator;

impl ResponseValidator {
    pub fn validate(text: &str) -> Result<AIEstimate, EstimateRejection> {
        let value: Value =
            serde_json::from_str(text).map_err(|error| EstimateRejection::Parse(error.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(ValidationError::new("response", "must be a JSON object").into());
        };

        Ok(AIEstimate {
            volume: non_negative(&fields, "volume")?,
            material_hazard_risk: ratio(&fields, "material_hazard_risk")?,
            access_difficulty: ratio(&fields, "access_difficulty")?,
            base_cost_estimate: amount(&fields, "base_cost_estimate")?,
            hazard_surcharge: amount(&fields, "hazard_surcharge")?,
            access_fee: amount(&fields, "access_fee")?,
            dismantling_fee: amount(&fields, "dismantling_fee")?,
            special_handling_requirements: string_list(&fields, "special_handling_requirements")?,
            confidence_score: ratio(&fields, "confidence_score")?,
        })
    }
}

fn required<'a>(fields: &'a Map<String, Value>, field: &str) -> Result<&'a Value, ValidationError> {
    match fields.get(field) {
        Some(Value::Null) | None => Err(ValidationError::new(field, "is required")),
        Some(value) => Ok(value),
    }
}

fn number<'a>(fields: &'a Map<String, Value>, field: &str) -> Result<&'a Number, ValidationError> {
    match required(fields, field)? {
        Value::Number(number) => Ok(number),
        other => Err(ValidationError::new(field, format!("must be a number, got {}", kind(other)))),
    }
}

fn float(fields: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    number(fields, field)?
        .as_f64()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ValidationError::new(field, "must be a finite number"))
}

fn non_negative(fields: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    let value = float(fields, field)?;
    if value < 0.0 {
        return Err(ValidationError::new(field, format!("must be non-negative, got {value}")));
    }
    Ok(value)
}

fn ratio(fields: &Map<String, Value>, field: &str) -> Result<f64, ValidationError> {
    let value = float(fields, field)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::new(field, format!("must lie in [0, 1], got {value}")));
    }
    Ok(value)
}

fn amount(fields: &Map<String, Value>, field: &str) -> Result<Decimal, ValidationError> {
    let raw = number(fields, field)?.to_string();
    let value = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| ValidationError::new(field, format!("is not a representable amount: {raw}")))?
        .normalize();

    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new(field, format!("must be non-negative, got {value}")));
    }
    if value.scale() > CURRENCY_SCALE {
        return Err(ValidationError::new(
            field,
            format!("must have at most {CURRENCY_SCALE} decimal places, got {value}"),
        ));
    }
    Ok(value.abs())
}

fn string_list(fields: &Map<String, Value>, field: &str) -> Result<Vec<String>, ValidationError> {
    let Value::Array(items) = required(fields, field)? else {
        return Err(ValidationError::new(field, "must be an array of strings"));
    };

    items
        .iter()
        .enumerate()
        .map(|(position, item)| match item {
            Value::String(text) => Ok(text.clone()),
            other => Err(ValidationError::new(
                format!("{field}[{position}]"),
                format!("must be a string, got {}", kind(other)),
            )),
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
