use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quote::DEFAULT_VALIDITY_DAYS;
use crate::summary::{
    SummaryOptions, DEFAULT_CURRENCY_SYMBOL, DEFAULT_PERIOD_LABEL, DEFAULT_SIGNATURE,
};

pub const DEFAULT_CONFIG_FILE: &str = "fleetquote.toml";
pub const NESTED_CONFIG_FILE: &str = "config/fleetquote.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub submission: SubmissionConfig,
    pub summary: SummaryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SubmissionConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SummaryConfig {
    pub currency_symbol: String,
    pub signature: String,
    pub period_label: String,
    pub default_validity_days: u32,
}

impl SummaryConfig {
    pub fn options(&self) -> SummaryOptions {
        SummaryOptions {
            currency_symbol: self.currency_symbol.clone(),
            signature: self.signature.clone(),
            period_label: self.period_label.clone(),
        }
    }
}

#[derive(Clone, Debug)]
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
    pub catalog_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub submission_enabled: Option<bool>,
    pub submission_endpoint: Option<String>,
    pub submission_api_token: Option<String>,
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
            catalog: CatalogConfig { path: PathBuf::from("catalog.toml") },
            submission: SubmissionConfig {
                enabled: false,
                endpoint: None,
                api_token: None,
                timeout_secs: 10,
            },
            summary: SummaryConfig {
                currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
                signature: DEFAULT_SIGNATURE.to_string(),
                period_label: DEFAULT_PERIOD_LABEL.to_string(),
                default_validity_days: DEFAULT_VALIDITY_DAYS,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(catalog) = patch.catalog {
            if let Some(path) = catalog.path {
                self.catalog.path = path;
            }
        }

        if let Some(submission) = patch.submission {
            if let Some(enabled) = submission.enabled {
                self.submission.enabled = enabled;
            }
            if let Some(endpoint) = submission.endpoint {
                self.submission.endpoint = Some(endpoint);
            }
            if let Some(api_token) = submission.api_token {
                self.submission.api_token = Some(secret_value(api_token));
            }
            if let Some(timeout_secs) = submission.timeout_secs {
                self.submission.timeout_secs = timeout_secs;
            }
        }

        if let Some(summary) = patch.summary {
            if let Some(currency_symbol) = summary.currency_symbol {
                self.summary.currency_symbol = currency_symbol;
            }
            if let Some(signature) = summary.signature {
                self.summary.signature = signature;
            }
            if let Some(period_label) = summary.period_label {
                self.summary.period_label = period_label;
            }
            if let Some(default_validity_days) = summary.default_validity_days {
                self.summary.default_validity_days = default_validity_days;
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
        if let Some(value) = read_env("FLEETQUOTE_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("FLEETQUOTE_SUBMISSION_ENABLED") {
            self.submission.enabled = parse_bool("FLEETQUOTE_SUBMISSION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("FLEETQUOTE_SUBMISSION_ENDPOINT") {
            self.submission.endpoint = Some(value);
        }
        if let Some(value) = read_env("FLEETQUOTE_SUBMISSION_API_TOKEN") {
            self.submission.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("FLEETQUOTE_SUBMISSION_TIMEOUT_SECS") {
            self.submission.timeout_secs =
                parse_u64("FLEETQUOTE_SUBMISSION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FLEETQUOTE_SUMMARY_CURRENCY_SYMBOL") {
            self.summary.currency_symbol = value;
        }
        if let Some(value) = read_env("FLEETQUOTE_SUMMARY_SIGNATURE") {
            self.summary.signature = value;
        }
        if let Some(value) = read_env("FLEETQUOTE_SUMMARY_PERIOD_LABEL") {
            self.summary.period_label = value;
        }
        if let Some(value) = read_env("FLEETQUOTE_SUMMARY_DEFAULT_VALIDITY_DAYS") {
            self.summary.default_validity_days =
                parse_u32("FLEETQUOTE_SUMMARY_DEFAULT_VALIDITY_DAYS", &value)?;
        }

        let log_level =
            read_env("FLEETQUOTE_LOGGING_LEVEL").or_else(|| read_env("FLEETQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FLEETQUOTE_LOGGING_FORMAT").or_else(|| read_env("FLEETQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = catalog_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(enabled) = overrides.submission_enabled {
            self.submission.enabled = enabled;
        }
        if let Some(endpoint) = overrides.submission_endpoint {
            self.submission.endpoint = Some(endpoint);
        }
        if let Some(api_token) = overrides.submission_api_token {
            self.submission.api_token = Some(secret_value(api_token));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_catalog(&self.catalog)?;
        validate_submission(&self.submission)?;
        validate_summary(&self.summary)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Config file that `AppConfig::load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
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

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if catalog.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("catalog.path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_submission(submission: &SubmissionConfig) -> Result<(), ConfigError> {
    if submission.timeout_secs == 0 || submission.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "submission.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    if let Some(endpoint) = &submission.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "submission.endpoint must start with http:// or https://".to_string(),
            ));
        }
    }

    if submission.enabled {
        if submission.endpoint.is_none() {
            return Err(ConfigError::Validation(
                "submission.enabled is true but submission.endpoint is not set".to_string(),
            ));
        }
        let missing_token = submission
            .api_token
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_token {
            return Err(ConfigError::Validation(
                "submission.api_token is required when submission is enabled".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_summary(summary: &SummaryConfig) -> Result<(), ConfigError> {
    if summary.currency_symbol.trim().is_empty() {
        return Err(ConfigError::Validation(
            "summary.currency_symbol must not be empty".to_string(),
        ));
    }
    if summary.default_validity_days == 0 {
        return Err(ConfigError::Validation(
            "summary.default_validity_days must be greater than zero".to_string(),
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
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    catalog: Option<CatalogPatch>,
    submission: Option<SubmissionPatch>,
    summary: Option<SummaryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmissionPatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SummaryPatch {
    currency_symbol: Option<String>,
    signature: Option<String>,
    period_label: Option<String>,
    default_validity_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
