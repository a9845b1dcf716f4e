use std::sync::Arc;

use haulquote_agent::ModelClients;
use haulquote_core::{
    BookingId, ContextRetriever, EstimationPipeline, RuleCorpusIndex, VisionEstimator,
};
use haulquote_db::{SqlBookingRepository, SqlRuleRepository};

use crate::commands::{load_config, open_database, runtime, CommandResult, StepFailure};

pub fn run(booking_id: &str) -> CommandResult {
    let config = match load_config("quote") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("quote") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let booking_id = BookingId(booking_id.to_string());
    let result = runtime.block_on(async {
        let clients = ModelClients::from_config(&config)
            .map_err(|error| ("model_client", error.to_string(), 7u8))?;
        let pool = open_database(&config).await?;

        let quote = async {
            let rules = Arc::new(SqlRuleRepository::new(pool.clone()));
            let bookings = Arc::new(SqlBookingRepository::new(pool.clone()));

            let index = RuleCorpusIndex::build_or_load(
                config.index.directory.clone(),
                rules.as_ref(),
                clients.embedder.as_ref(),
            )
            .await
            .map_err(|error| ("index_build", error.to_string(), 7u8))?;
            let retriever = ContextRetriever::new(
                Arc::new(index),
                clients.embedder.clone(),
                config.index.top_k,
            );
            let estimator = VisionEstimator::new(clients.vision.clone(), clients.images.clone())
                .map_err(|error| ("prompt_template", error.to_string(), 7u8))?;

            let pipeline = EstimationPipeline::new(bookings, rules, retriever, estimator);
            pipeline
                .run(&booking_id)
                .await
                .map_err(|error| -> StepFailure { (error.error_class(), error.to_string(), 8u8) })
        }
        .await;

        pool.close().await;
        quote
    });

    match result {
        Ok(quote) => match serde_json::to_value(&quote) {
            Ok(data) => CommandResult::success_with_data(
                "quote",
                format!(
                    "stored quote for booking `{booking_id}` totalling {}",
                    quote.price_components.total
                ),
                Some(data),
            ),
            Err(error) => CommandResult::failure("quote", "serialization", error.to_string(), 9),
        },
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("quote", error_class, message, exit_code)
        }
    }
}
