use serde::Serialize;

use crate::commands::{
    load_config, runtime, CommandResult, EXIT_DB_CONNECT, EXIT_MIGRATION, EXIT_SEED_VERIFICATION,
};
use solquote_db::{connect_with_config, migrations, SeedDataset};

#[derive(Debug, Serialize)]
struct SeedSummary {
    contractors: usize,
    requests: usize,
    assignments: usize,
}

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
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECT))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let seeded = SeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), EXIT_MIGRATION))?;
        let verification = SeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), EXIT_SEED_VERIFICATION))?;

        pool.close().await;

        if !verification.all_present {
            return Err((
                "seed_verification",
                verification_failure_message(&verification.checks),
                EXIT_SEED_VERIFICATION,
            ));
        }

        Ok(SeedSummary {
            contractors: seeded.contractors,
            requests: seeded.requests,
            assignments: seeded.assignments,
        })
    });

    match result {
        Ok(summary) => {
            let message = format!(
                "demo dataset loaded: {} contractors, {} request, {} assignments",
                summary.contractors, summary.requests, summary.assignments
            );
            CommandResult::success_with_data("seed", message, Some(summary))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_failure_message(checks: &[(&'static str, bool)]) -> String {
    let failed_checks = checks
        .iter()
        .filter_map(|(check, passed)| (!passed).then_some(*check))
        .collect::<Vec<_>>();
    if failed_checks.is_empty() {
        "some seed data failed to load".to_string()
    } else {
        format!("seed verification failed for checks: {}", failed_checks.join(", "))
    }
}
