pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "solquote",
    about = "Solquote operator CLI",
    long_about = "Operate the Solquote quote engine: migrations, demo data, config inspection, readiness checks and pricing previews.",
    after_help = "Examples:\n  solquote doctor --json\n  solquote config\n  solquote financials --base-price 10000 --price-per-unit 1000 --system-size 10"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo pricing rules, contractor profiles and request")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, schema and pricing rules")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Preview the financial breakdown for a price using the stored rules")]
    Financials {
        #[arg(long, help = "Contractor base price")]
        base_price: Decimal,
        #[arg(long, help = "Price per unit of system capacity")]
        price_per_unit: Decimal,
        #[arg(long, help = "System size in capacity units")]
        system_size: Decimal,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init_from_env();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Financials { base_price, price_per_unit, system_size } => {
            commands::financials::run(base_price, price_per_unit, system_size)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
