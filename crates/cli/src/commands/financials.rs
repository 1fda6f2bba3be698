use rust_decimal::Decimal;
use tracing::info;

use crate::commands::{
    load_config, runtime, CommandResult, EXIT_DB_CONNECT, EXIT_MIGRATION, EXIT_REJECTED,
};
use solquote_core::pricing::PricingInput;
use solquote_core::service::QuoteService;
use solquote_db::{connect_with_config, migrations, sqlite_ports};

/// Validates the price against the rules in the configured store and
/// prints the breakdown. Nothing is written.
pub fn run(
    base_price: Decimal,
    price_per_unit_capacity: Decimal,
    system_size: Decimal,
) -> CommandResult {
    let config = match load_config("financials") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("financials") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let input = PricingInput { base_price, price_per_unit_capacity, system_size };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECT))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

        let service = QuoteService::new(
            sqlite_ports(pool.clone(), config.pricing_cache_ttl()),
            config.engine_settings(),
        );
        let breakdown = service.compute_financials(&input).await;
        pool.close().await;

        breakdown.map_err(|error| (error.kind().as_str(), error.to_string(), EXIT_REJECTED))
    });

    match result {
        Ok(breakdown) => {
            info!(
                event_name = "cli.financials_previewed",
                base_price = %breakdown.base_price,
                total_user_price = %breakdown.total_user_price,
                "financial breakdown computed"
            );
            CommandResult::success_with_data(
                "financials",
                format!("user pays {}", breakdown.total_user_price),
                Some(breakdown),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("financials", error_class, message, exit_code)
        }
    }
}
