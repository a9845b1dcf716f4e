use std::path::Path;

use haulquote_agent::ModelClients;
use haulquote_core::retrieval::{IndexOrigin, RuleCorpusIndex, SNAPSHOT_FILE};
use haulquote_db::SqlRuleRepository;
use serde_json::json;

use crate::commands::{load_config, open_database, runtime, CommandResult, StepFailure};

pub fn run(status_only: bool) -> CommandResult {
    let config = match load_config("index") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    if status_only {
        return status(&config.index.directory);
    }

    let runtime = match runtime("index") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let clients = ModelClients::from_config(&config)
            .map_err(|error| ("model_client", error.to_string(), 7u8))?;
        let pool = open_database(&config).await?;

        let rules = SqlRuleRepository::new(pool.clone());
        let index = RuleCorpusIndex::build_or_load(
            config.index.directory.clone(),
            &rules,
            clients.embedder.as_ref(),
        )
        .await
        .map_err(|error| -> StepFailure { ("index_build", error.to_string(), 7u8) });

        pool.close().await;
        index
    });

    match result {
        Ok(index) => {
            let origin = match index.origin() {
                IndexOrigin::Built => "built",
                IndexOrigin::Loaded => "loaded",
            };
            CommandResult::success_with_data(
                "index",
                format!(
                    "rule index {origin} at `{}` with {} documents",
                    index.directory().display(),
                    index.len()
                ),
                Some(json!({
                    "directory": index.directory().display().to_string(),
                    "origin": origin,
                    "document_count": index.len(),
                })),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("index", error_class, message, exit_code)
        }
    }
}

/// The directory is the build marker; the snapshot inside it holds the vectors.
fn status(directory: &Path) -> CommandResult {
    let marker_present = directory.is_dir();
    let snapshot_present = directory.join(SNAPSHOT_FILE).is_file();
    let message = match (marker_present, snapshot_present) {
        (true, true) => "rule index is present and will be loaded as-is",
        (true, false) => "rule index marker exists without a snapshot and will load empty",
        (false, _) => "rule index is missing and will be built on next use",
    };

    CommandResult::success_with_data(
        "index",
        message,
        Some(json!({
            "directory": directory.display().to_string(),
            "marker_present": marker_present,
            "snapshot_present": snapshot_present,
        })),
    )
}
