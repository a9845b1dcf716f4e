use tera::{Context, Tera};
use thiserror::Error;

use crate::domain::booking::BookingContext;
use crate::domain::rule::DEFAULT_CURRENCY;
use crate::retrieval::AdvisoryContext;

pub const SYSTEM_INSTRUCTION: &str =
    "You are an expert waste removal cost estimator. Respond only with valid JSON.";

const USER_TEMPLATE_NAME: &str = "estimator/user_prompt.tera";

#[derive(Debug, Error)]
#[error("estimator prompt template failed: {0}")]
pub struct PromptError(#[from] tera::Error);

/// Renders the text half of the estimator's user message.
pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            USER_TEMPLATE_NAME,
            include_str!("../../../../templates/estimator/user_prompt.tera"),
        )?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        booking: &BookingContext,
        advisory: &AdvisoryContext,
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("currency", DEFAULT_CURRENCY);
        context.insert("advisory", &advisory.text);
        context.insert("location", &booking.location);
        context.insert("access_restricted", &booking.access_restricted);
        context.insert("dismantling_required", &booking.dismantling_required);
        context.insert("postcode", &booking.postcode);
        context.insert("address", &booking.address);

        Ok(self.tera.render(USER_TEMPLATE_NAME, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::PromptRenderer;
    use crate::domain::booking::BookingContext;
    use crate::retrieval::AdvisoryContext;

    #[test]
    fn rendered_prompt_carries_schema_advisory_and_booking_fields() {
        let renderer = PromptRenderer::new().expect("template compiles");
        let booking = BookingContext {
            postcode: "M1 2AB".to_string(),
            address: "1 Mill Lane & Co".to_string(),
            location: "back garden".to_string(),
            access_restricted: false,
            dismantling_required: true,
        };
        let advisory = AdvisoryContext::from_documents(Vec::new());

        let text = renderer.render(&booking, &advisory).expect("render");

        assert!(text.contains("\"material_hazard_risk\": \"number between 0-1\""));
        assert!(text.contains("\"base_cost_estimate\": \"number in GBP\""));
        assert!(text.contains("Relevant estimation guidelines:"));
        assert!(text.contains("Location: back garden"));
        assert!(text.contains("Access restricted: false"));
        assert!(text.contains("Dismantling needed: true"));
        assert!(text.contains("Postcode: M1 2AB"));
        assert!(text.contains("Address: 1 Mill Lane & Co"), "text must not be html-escaped");
    }
}
