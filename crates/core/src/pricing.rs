//! Deterministic price blending.
//!
//! The blend is a fixed-weight, additive nudge: every matched rule moves a component
//! by `INFLUENCE` times its nominal amount, with no normalisation by match count.

use rust_decimal::Decimal;

use crate::domain::booking::BookingContext;
use crate::domain::estimate::AIEstimate;
use crate::domain::quote::{AppliedRule, PriceComponents, QuoteBreakdown, QuoteExplanation};
use crate::domain::rule::{EstimationRule, RuleType};
use crate::ports::RuleFilter;

/// 0.10 of each matched rule's nominal amount.
pub const INFLUENCE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

/// Hazard rules only apply when the estimated material risk is strictly above this.
pub const HAZARD_RISK_THRESHOLD: f64 = 0.30;

/// Active rules whose postcode prefix covers the booking postcode, in backend order.
///
/// Built only through the exact prefix predicate; semantic retrieval hits can never
/// become one of these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedRuleSet {
    postcode: String,
    rules: Vec<EstimationRule>,
}

impl MatchedRuleSet {
    /// Keeps the incoming order and drops anything the predicate does not admit.
    pub fn select(postcode: impl Into<String>, candidates: Vec<EstimationRule>) -> Self {
        let postcode = postcode.into();
        let filter = RuleFilter::CoveringPostcode(postcode.clone());
        let rules = candidates.into_iter().filter(|rule| filter.admits(rule)).collect();
        Self { postcode, rules }
    }

    pub fn postcode(&self) -> &str {
        &self.postcode
    }

    pub fn rules(&self) -> &[EstimationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

pub struct PricingBlender;

impl PricingBlender {
    pub fn blend(
        estimate: &AIEstimate,
        booking: &BookingContext,
        matched: &MatchedRuleSet,
    ) -> QuoteBreakdown {
        let mut base_rate = estimate.base_cost_estimate;
        let mut hazard_surcharge = estimate.hazard_surcharge;
        let mut access_fee = estimate.access_fee;
        let mut dismantling_fee = estimate.dismantling_fee;

        for rule in matched.rules() {
            match rule.rule_type {
                RuleType::BaseRateAdjustment => {
                    base_rate += nudge(rule.base_rate);
                }
                RuleType::HazardMultiplier
                    if estimate.material_hazard_risk > HAZARD_RISK_THRESHOLD =>
                {
                    hazard_surcharge += nudge(rule.hazard_surcharge);
                }
                _ => {}
            }

            if booking.access_restricted {
                access_fee += nudge(rule.access_fee);
            }
            if booking.dismantling_required {
                dismantling_fee += nudge(rule.dismantling_fee);
            }
        }

        let total = base_rate + hazard_surcharge + access_fee + dismantling_fee;

        QuoteBreakdown {
            volume: estimate.volume,
            material_risk: estimate.material_hazard_risk,
            postcode: booking.postcode.clone(),
            price_components: PriceComponents {
                base_rate,
                hazard_surcharge,
                access_fee,
                dismantling_fee,
                total,
            },
            compliance: estimate.special_handling_requirements.clone(),
            explanation: QuoteExplanation {
                applied_rules: matched
                    .rules()
                    .iter()
                    .map(|rule| AppliedRule {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        rule_type: rule.rule_type,
                        applied_adjustment: rule.multiplier,
                    })
                    .collect(),
            },
        }
    }
}

fn nudge(amount: Option<Decimal>) -> Decimal {
    amount.map(|amount| amount * INFLUENCE).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{MatchedRuleSet, PricingBlender, INFLUENCE};
    use crate::domain::booking::BookingContext;
    use crate::domain::estimate::AIEstimate;
    use crate::domain::rule::{EstimationRule, RuleType};
    use crate::test_support::rule;

    fn estimate(base: i64, hazard_risk: f64) -> AIEstimate {
        AIEstimate {
            volume: 2.0,
            material_hazard_risk: hazard_risk,
            access_difficulty: 0.1,
            base_cost_estimate: Decimal::new(base, 0),
            hazard_surcharge: Decimal::ZERO,
            access_fee: Decimal::ZERO,
            dismantling_fee: Decimal::ZERO,
            special_handling_requirements: vec!["sharps container".to_string()],
            confidence_score: 0.9,
        }
    }

    fn booking(access_restricted: bool, dismantling_required: bool) -> BookingContext {
        BookingContext {
            postcode: "SW1A 1AA".to_string(),
            address: "1 Test Road".to_string(),
            location: "loft".to_string(),
            access_restricted,
            dismantling_required,
        }
    }

    fn hazard_rule(id: &str, surcharge: i64) -> EstimationRule {
        let mut rule = rule(id, RuleType::HazardMultiplier, Some("SW1"));
        rule.hazard_surcharge = Some(Decimal::new(surcharge, 0));
        rule
    }

    fn base_rule(id: &str, base_rate: i64) -> EstimationRule {
        let mut rule = rule(id, RuleType::BaseRateAdjustment, Some("SW"));
        rule.base_rate = Some(Decimal::new(base_rate, 0));
        rule
    }

    #[test]
    fn influence_is_ten_percent() {
        assert_eq!(INFLUENCE, Decimal::new(1, 1));
    }

    #[test]
    fn hazard_rule_adds_a_tenth_of_its_surcharge_above_threshold() {
        let matched = MatchedRuleSet::select("SW1A 1AA", vec![hazard_rule("h", 50)]);

        let quote = PricingBlender::blend(&estimate(100, 0.5), &booking(false, false), &matched);

        assert_eq!(quote.price_components.hazard_surcharge, Decimal::new(50, 1));
        assert_eq!(quote.price_components.total, Decimal::new(1050, 1));
    }

    #[test]
    fn hazard_rule_is_inert_at_or_below_threshold() {
        let matched = MatchedRuleSet::select("SW1A 1AA", vec![hazard_rule("h", 50)]);

        let quote = PricingBlender::blend(&estimate(100, 0.3), &booking(false, false), &matched);

        assert_eq!(quote.price_components.hazard_surcharge, Decimal::ZERO);
        assert_eq!(quote.price_components.total, Decimal::new(100, 0));
        assert_eq!(quote.explanation.applied_rules.len(), 1, "no-op rules are still listed");
    }

    #[test]
    fn base_rate_rules_are_additive_not_normalised() {
        let matched =
            MatchedRuleSet::select("SW1A 1AA", vec![base_rule("b1", 20), base_rule("b2", 20)]);

        let quote = PricingBlender::blend(&estimate(100, 0.0), &booking(false, false), &matched);

        assert_eq!(quote.price_components.base_rate, Decimal::new(1040, 1));
        assert_eq!(quote.price_components.total, Decimal::new(1040, 1));
    }

    #[test]
    fn access_and_dismantling_fees_follow_booking_flags() {
        let mut fees = rule("f", RuleType::LocationModifier, Some("SW1"));
        fees.access_fee = Some(Decimal::new(30, 0));
        fees.dismantling_fee = Some(Decimal::new(40, 0));
        let matched = MatchedRuleSet::select("SW1A 1AA", vec![fees]);

        let neither = PricingBlender::blend(&estimate(100, 0.0), &booking(false, false), &matched);
        let both = PricingBlender::blend(&estimate(100, 0.0), &booking(true, true), &matched);

        assert_eq!(neither.price_components.access_fee, Decimal::ZERO);
        assert_eq!(both.price_components.access_fee, Decimal::new(3, 0));
        assert_eq!(both.price_components.dismantling_fee, Decimal::new(4, 0));
        assert_eq!(both.price_components.total, Decimal::new(107, 0));
    }

    #[test]
    fn explanation_lists_every_matched_rule_with_its_multiplier() {
        let mut scoped = base_rule("b1", 20);
        scoped.multiplier = Decimal::new(125, 2);
        let matched = MatchedRuleSet::select("SW1A 1AA", vec![scoped, hazard_rule("h", 50)]);

        let quote = PricingBlender::blend(&estimate(100, 0.0), &booking(false, false), &matched);

        let applied = &quote.explanation.applied_rules;
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].rule_id.0, "b1");
        assert_eq!(applied[0].applied_adjustment, Decimal::new(125, 2));
        assert_eq!(applied[1].rule_type, RuleType::HazardMultiplier);
        assert_eq!(quote.compliance, vec!["sharps container".to_string()]);
        assert_eq!(quote.postcode, "SW1A 1AA");
    }

    #[test]
    fn blending_is_pure() {
        let matched =
            MatchedRuleSet::select("SW1A 1AA", vec![base_rule("b1", 20), hazard_rule("h", 50)]);
        let estimate = estimate(100, 0.7);
        let booking = booking(true, true);

        let first = PricingBlender::blend(&estimate, &booking, &matched);
        let second = PricingBlender::blend(&estimate, &booking, &matched);

        assert_eq!(first, second);
        assert_eq!(first.to_json().expect("json"), second.to_json().expect("json"));
    }

    #[test]
    fn matched_set_is_exactly_the_active_rules_covering_the_postcode_area() {
        let mut inactive = base_rule("inactive", 20);
        inactive.active = false;
        let mut unscoped = base_rule("unscoped", 20);
        unscoped.postcode_prefix = None;
        let mut too_long = base_rule("too-long", 20);
        too_long.postcode_prefix = Some("SW1A".to_string());
        let mut lowercase = base_rule("lowercase", 20);
        lowercase.postcode_prefix = Some("sw1".to_string());
        let mut elsewhere = base_rule("elsewhere", 20);
        elsewhere.postcode_prefix = Some("E1".to_string());
        let mut everywhere = base_rule("everywhere", 20);
        everywhere.postcode_prefix = Some(String::new());
        let candidates = vec![
            base_rule("sw", 20),
            hazard_rule("sw1", 50),
            inactive,
            unscoped,
            too_long,
            lowercase,
            elsewhere,
            everywhere,
        ];

        for postcode in ["SW1A 1AA", "SW19 2AB", "E1 6AN", "S", ""] {
            let matched = MatchedRuleSet::select(postcode, candidates.clone());
            let expected = candidates
                .iter()
                .filter(|rule| {
                    rule.active
                        && rule.postcode_prefix.as_deref().is_some_and(|prefix| {
                            postcode.chars().take(3).collect::<String>().starts_with(prefix)
                        })
                })
                .map(|rule| rule.id.0.clone())
                .collect::<Vec<_>>();
            let actual = matched.rules().iter().map(|rule| rule.id.0.clone()).collect::<Vec<_>>();
            assert_eq!(actual, expected, "postcode {postcode:?}");
        }

        let ids = |postcode: &str| {
            MatchedRuleSet::select(postcode, candidates.clone())
                .rules()
                .iter()
                .map(|rule| rule.id.0.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids("SW1A 1AA"), vec!["sw", "sw1", "everywhere"]);
        assert_eq!(ids("E1 6AN"), vec!["elsewhere", "everywhere"]);
    }
}
