use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::Row;

use haulquote_core::domain::rule::{EstimationRule, RuleId, RuleType};
use haulquote_core::ports::{RuleFilter, RuleRepository, StoreError};

use super::{decode_err, parse_timestamp, RepositoryError};
use crate::DbPool;

const RULE_COLUMNS: &str = "id, rule_name, description, rule_type, min_value, max_value, multiplier,
     base_rate, hazard_surcharge, access_fee, dismantling_fee, currency, postcode_prefix,
     active, created_at, updated_at";

/// Rules are maintained by an external admin flow; `save` exists for seeding and tests.
pub struct SqlRuleRepository {
    pool: DbPool,
}

impl SqlRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> Result<Vec<EstimationRule>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RULE_COLUMNS} FROM estimation_rules WHERE active = 1 ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_rule).collect()
    }

    pub async fn save(&self, rule: &EstimationRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO estimation_rules (id, rule_name, description, rule_type, min_value,
                                           max_value, multiplier, base_rate, hazard_surcharge,
                                           access_fee, dismantling_fee, currency, postcode_prefix,
                                           active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 rule_name = excluded.rule_name,
                 description = excluded.description,
                 rule_type = excluded.rule_type,
                 min_value = excluded.min_value,
                 max_value = excluded.max_value,
                 multiplier = excluded.multiplier,
                 base_rate = excluded.base_rate,
                 hazard_surcharge = excluded.hazard_surcharge,
                 access_fee = excluded.access_fee,
                 dismantling_fee = excluded.dismantling_fee,
                 currency = excluded.currency,
                 postcode_prefix = excluded.postcode_prefix,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&rule.id.0)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(rule.rule_type.as_str())
        .bind(rule.min_value.map(|value| value.to_string()))
        .bind(rule.max_value.map(|value| value.to_string()))
        .bind(rule.multiplier.to_string())
        .bind(rule.base_rate.map(|value| value.to_string()))
        .bind(rule.hazard_surcharge.map(|value| value.to_string()))
        .bind(rule.access_fee.map(|value| value.to_string()))
        .bind(rule.dismantling_fee.map(|value| value.to_string()))
        .bind(&rule.currency)
        .bind(&rule.postcode_prefix)
        .bind(rule.active)
        .bind(rule.created_at.to_rfc3339())
        .bind(rule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decimal(rule_id: &str, field: &str, raw: Option<String>) -> Result<Option<Decimal>, RepositoryError> {
    raw.map(|value| {
        Decimal::from_str(value.trim()).map_err(|error| {
            RepositoryError::Decode(format!("rule `{rule_id}` {field} `{value}`: {error}"))
        })
    })
    .transpose()
}

fn row_to_rule(row: &sqlx::sqlite::SqliteRow) -> Result<EstimationRule, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_err)?;
    let rule_type: String = row.try_get("rule_type").map_err(decode_err)?;
    let rule_type = RuleType::parse(&rule_type).ok_or_else(|| {
        RepositoryError::Decode(format!("rule `{id}` has unknown rule_type `{rule_type}`"))
    })?;
    let multiplier = decimal(&id, "multiplier", row.try_get("multiplier").map_err(decode_err)?)?
        .ok_or_else(|| RepositoryError::Decode(format!("rule `{id}` is missing multiplier")))?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(EstimationRule {
        name: row.try_get("rule_name").map_err(decode_err)?,
        description: row.try_get("description").map_err(decode_err)?,
        rule_type,
        min_value: decimal(&id, "min_value", row.try_get("min_value").map_err(decode_err)?)?,
        max_value: decimal(&id, "max_value", row.try_get("max_value").map_err(decode_err)?)?,
        multiplier,
        base_rate: decimal(&id, "base_rate", row.try_get("base_rate").map_err(decode_err)?)?,
        hazard_surcharge: decimal(
            &id,
            "hazard_surcharge",
            row.try_get("hazard_surcharge").map_err(decode_err)?,
        )?,
        access_fee: decimal(&id, "access_fee", row.try_get("access_fee").map_err(decode_err)?)?,
        dismantling_fee: decimal(
            &id,
            "dismantling_fee",
            row.try_get("dismantling_fee").map_err(decode_err)?,
        )?,
        currency: row.try_get("currency").map_err(decode_err)?,
        postcode_prefix: row.try_get("postcode_prefix").map_err(decode_err)?,
        active: row.try_get("active").map_err(decode_err)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
        id: RuleId(id),
    })
}

#[async_trait]
impl RuleRepository for SqlRuleRepository {
    /// Selects active rules in SQL, then applies the postcode predicate in Rust so
    /// every backend shares one definition of "covers".
    async fn fetch_active_rules(
        &self,
        filter: &RuleFilter,
    ) -> Result<Vec<EstimationRule>, StoreError> {
        let rules = self.list_active().await?;
        Ok(rules.into_iter().filter(|rule| filter.admits(rule)).collect())
    }
}
