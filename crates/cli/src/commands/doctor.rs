use serde::Serialize;
use solquote_core::config::{AppConfig, LoadOptions};
use solquote_core::ports::PricingRulesStore;
use solquote_db::repositories::SqlPricingRulesRepository;
use solquote_db::{connect_with_config, migrations, DbPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: &'static str, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name, status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DB_CHECKS: &[&str] = &["database_connectivity", "schema_migrations", "pricing_rules"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                "configuration loaded and validated",
            ));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, error.to_string()));
            checks.extend(skip_all("skipped because configuration did not load"));
        }
    }

    // Warnings (e.g. default pricing rules in effect) do not fail the report.
    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let skipped = checks.iter().any(|check| check.status == CheckStatus::Skipped);
    let overall_status = if failed || skipped { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if overall_status == CheckStatus::Pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn skip_all(reason: &str) -> Vec<DoctorCheck> {
    DB_CHECKS.iter().map(|name| DoctorCheck::new(*name, CheckStatus::Skipped, reason)).collect()
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let mut checks = vec![DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Fail,
                format!("failed to initialize async runtime: {error}"),
            )];
            checks.extend(skip_all("skipped because the runtime did not start").into_iter().skip(1));
            return checks;
        }
    };

    runtime.block_on(async {
        let pool = match connect_with_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                let mut checks = vec![DoctorCheck::new(
                    "database_connectivity",
                    CheckStatus::Fail,
                    format!("failed to connect to database: {error}"),
                )];
                checks.extend(
                    skip_all("skipped because the database is unreachable").into_iter().skip(1),
                );
                return checks;
            }
        };

        let checks = vec![
            DoctorCheck::new(
                "database_connectivity",
                CheckStatus::Pass,
                format!("connected using `{}`", config.database.url),
            ),
            check_migrations(&pool).await,
            check_pricing_rules(&pool).await,
        ];
        pool.close().await;
        checks
    })
}

async fn check_migrations(pool: &DbPool) -> DoctorCheck {
    match migrations::pending(pool).await {
        Ok(0) => DoctorCheck::new("schema_migrations", CheckStatus::Pass, "schema is up to date"),
        Ok(pending) => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Fail,
            format!("{pending} pending migration(s); run `solquote migrate`"),
        ),
        Err(_) => DoctorCheck::new(
            "schema_migrations",
            CheckStatus::Fail,
            "schema not initialized; run `solquote migrate`",
        ),
    }
}

async fn check_pricing_rules(pool: &DbPool) -> DoctorCheck {
    match SqlPricingRulesRepository::new(pool.clone()).load_pricing_rules().await {
        Ok(Some(rules)) => match rules.validate() {
            Ok(()) => DoctorCheck::new("pricing_rules", CheckStatus::Pass, "stored rules are valid"),
            Err(error) => DoctorCheck::new(
                "pricing_rules",
                CheckStatus::Fail,
                format!("stored rules are invalid: {error}"),
            ),
        },
        Ok(None) => DoctorCheck::new(
            "pricing_rules",
            CheckStatus::Warn,
            "no stored rules; defaults are in effect",
        ),
        Err(error) => DoctorCheck::new(
            "pricing_rules",
            CheckStatus::Warn,
            format!("rules could not be read, defaults would apply: {error}"),
        ),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
