use haulquote_db::{BookingSeedInfo, DemoSeedDataset};

use crate::commands::{load_config, open_database, runtime, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;

        let seed_result = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<SeedOutput, StepFailure> = if !verification.all_present {
            Err(("seed_verification", verification_message(&verification.checks), 6u8))
        } else {
            Ok(SeedOutput {
                bookings: seed_result.bookings_seeded,
                active_rules: seed_result.active_rules,
            })
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(output) => {
            let booking_lines: Vec<String> = output
                .bookings
                .iter()
                .map(|b| format!("  - {} [{}]: {}", b.booking_id, b.postcode, b.description))
                .collect();
            let message = format!(
                "demo dataset loaded with {} active rules and {} bookings:\n{}",
                output.active_rules,
                output.bookings.len(),
                booking_lines.join("\n")
            );
            CommandResult::success("seed", message)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

struct SeedOutput {
    bookings: Vec<BookingSeedInfo>,
    active_rules: usize,
}

fn verification_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks =
        checks.iter().filter_map(|(check, passed)| (!passed).then_some(*check)).collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
