use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lifecycle::SubmissionGate;
use crate::service::EngineSettings;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pricing: PricingConfig,
    pub lifecycle: LifecycleConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PricingConfig {
    pub cache_ttl_secs: u64,
    pub consistency_tolerance_percent: Decimal,
}

#[derive(Clone, Debug, Serialize)]
pub struct LifecycleConfig {
    pub max_contractors_per_request: u32,
    pub submission_gate: SubmissionGate,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub submission_gate: Option<SubmissionGate>,
    pub max_contractors_per_request: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://solquote.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            pricing: PricingConfig {
                cache_ttl_secs: 300,
                consistency_tolerance_percent: Decimal::ONE,
            },
            lifecycle: LifecycleConfig {
                max_contractors_per_request: 10,
                submission_gate: SubmissionGate::Selected,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("solquote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_contractors_per_request: self.lifecycle.max_contractors_per_request as usize,
            submission_gate: self.lifecycle.submission_gate,
            consistency_tolerance_percent: self.pricing.consistency_tolerance_percent,
        }
    }

    pub fn pricing_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.pricing.cache_ttl_secs)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(cache_ttl_secs) = pricing.cache_ttl_secs {
                self.pricing.cache_ttl_secs = cache_ttl_secs;
            }
            if let Some(tolerance) = pricing.consistency_tolerance_percent {
                self.pricing.consistency_tolerance_percent = tolerance;
            }
        }

        if let Some(lifecycle) = patch.lifecycle {
            if let Some(max_contractors) = lifecycle.max_contractors_per_request {
                self.lifecycle.max_contractors_per_request = max_contractors;
            }
            if let Some(submission_gate) = lifecycle.submission_gate {
                self.lifecycle.submission_gate = submission_gate;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SOLQUOTE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SOLQUOTE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SOLQUOTE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SOLQUOTE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SOLQUOTE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SOLQUOTE_PRICING_CACHE_TTL_SECS") {
            self.pricing.cache_ttl_secs = parse_u64("SOLQUOTE_PRICING_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("SOLQUOTE_PRICING_CONSISTENCY_TOLERANCE_PERCENT") {
            self.pricing.consistency_tolerance_percent =
                parse_decimal("SOLQUOTE_PRICING_CONSISTENCY_TOLERANCE_PERCENT", &value)?;
        }

        if let Some(value) = read_env("SOLQUOTE_LIFECYCLE_MAX_CONTRACTORS_PER_REQUEST") {
            self.lifecycle.max_contractors_per_request =
                parse_u32("SOLQUOTE_LIFECYCLE_MAX_CONTRACTORS_PER_REQUEST", &value)?;
        }
        if let Some(value) = read_env("SOLQUOTE_LIFECYCLE_SUBMISSION_GATE") {
            self.lifecycle.submission_gate = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "SOLQUOTE_LIFECYCLE_SUBMISSION_GATE".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        let log_level =
            read_env("SOLQUOTE_LOGGING_LEVEL").or_else(|| read_env("SOLQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SOLQUOTE_LOGGING_FORMAT").or_else(|| read_env("SOLQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(submission_gate) = overrides.submission_gate {
            self.lifecycle.submission_gate = submission_gate;
        }
        if let Some(max_contractors) = overrides.max_contractors_per_request {
            self.lifecycle.max_contractors_per_request = max_contractors;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_pricing(&self.pricing)?;
        validate_lifecycle(&self.lifecycle)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("solquote.toml"), PathBuf::from("config/solquote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    let tolerance = pricing.consistency_tolerance_percent;
    if tolerance < Decimal::ZERO || tolerance > Decimal::ONE_HUNDRED {
        return Err(ConfigError::Validation(
            "pricing.consistency_tolerance_percent must be in range 0..=100".to_string(),
        ));
    }

    if pricing.cache_ttl_secs > 86_400 {
        return Err(ConfigError::Validation(
            "pricing.cache_ttl_secs must not exceed 86400".to_string(),
        ));
    }

    Ok(())
}

fn validate_lifecycle(lifecycle: &LifecycleConfig) -> Result<(), ConfigError> {
    if lifecycle.max_contractors_per_request == 0 {
        return Err(ConfigError::Validation(
            "lifecycle.max_contractors_per_request must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    pricing: Option<PricingPatch>,
    lifecycle: Option<LifecyclePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    cache_ttl_secs: Option<u64>,
    consistency_tolerance_percent: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LifecyclePatch {
    max_contractors_per_request: Option<u32>,
    submission_gate: Option<SubmissionGate>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::lifecycle::SubmissionGate;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| err.to_string())?;

        let settings = config.engine_settings();
        ensure(settings.max_contractors_per_request == 10, "default cap should be 10")?;
        ensure(
            settings.submission_gate == SubmissionGate::Selected,
            "default gate should be selected",
        )?;
        ensure(
            settings.consistency_tolerance_percent == Decimal::ONE,
            "default tolerance should be 1%",
        )?;
        ensure(config.pricing_cache_ttl().as_secs() == 300, "default cache ttl should be 300s")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SOLQUOTE_DB", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("solquote.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_SOLQUOTE_DB}"

[lifecycle]
submission_gate = "accepted"
max_contractors_per_request = 4

[pricing]
consistency_tolerance_percent = "2.5"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be interpolated from the environment",
            )?;
            ensure(
                config.lifecycle.submission_gate == SubmissionGate::Accepted,
                "submission gate should be read from file",
            )?;
            ensure(
                config.lifecycle.max_contractors_per_request == 4,
                "contractor cap should be read from file",
            )?;
            ensure(
                config.pricing.consistency_tolerance_percent == Decimal::new(25, 1),
                "tolerance should be read from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SOLQUOTE_DB"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        env::remove_var("TEST_SOLQUOTE_UNSET");

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("solquote.toml");
        fs::write(&path, "[database]\nurl = \"${TEST_SOLQUOTE_UNSET}\"\n")
            .map_err(|err| err.to_string())?;

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected interpolation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "TEST_SOLQUOTE_UNSET"),
            "error should name the missing variable",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SOLQUOTE_LOG_LEVEL", "warn");
        env::set_var("SOLQUOTE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["SOLQUOTE_LOG_LEVEL", "SOLQUOTE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SOLQUOTE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SOLQUOTE_LIFECYCLE_MAX_CONTRACTORS_PER_REQUEST", "6");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("solquote.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[lifecycle]
max_contractors_per_request = 3

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.lifecycle.max_contractors_per_request == 6,
                "env contractor cap should win over file",
            )?;
            Ok(())
        })();

        clear_vars(&["SOLQUOTE_DATABASE_URL", "SOLQUOTE_LIFECYCLE_MAX_CONTRACTORS_PER_REQUEST"]);
        result
    }

    #[test]
    fn invalid_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SOLQUOTE_LIFECYCLE_SUBMISSION_GATE", "whenever");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "SOLQUOTE_LIFECYCLE_SUBMISSION_GATE"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["SOLQUOTE_LIFECYCLE_SUBMISSION_GATE"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SOLQUOTE_DATABASE_URL", "postgres://nope");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("database.url")
            );
            ensure(has_message, "validation failure should mention database.url")
        })();

        clear_vars(&["SOLQUOTE_DATABASE_URL"]);
        result
    }

    #[test]
    fn zero_contractor_cap_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                max_contractors_per_request: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("max_contractors_per_request")),
            "validation failure should mention the contractor cap",
        )
    }
}
