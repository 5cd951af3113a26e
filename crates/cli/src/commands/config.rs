use std::env;
use std::fs;
use std::path::Path;

use fleetquote_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::json;
use toml::Value;

use crate::commands::{to_data, CommandResult, EXIT_CONFIG};

const COMMAND: &str = "config";

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Prints the effective configuration with per-key source attribution.
///
/// Source precedence: env > file > default.
pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let file_path = resolve_config_path(config_path);
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);
    let sources = SourceProbe { file_doc: file_doc.as_ref(), file_path: file_path.as_deref() };

    let submission = &config.submission;
    let api_token = submission
        .api_token
        .as_ref()
        .map(|token| redact_token(token.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let entries = vec![
        sources.entry(
            "catalog.path",
            &["FLEETQUOTE_CATALOG_PATH"],
            config.catalog.path.display().to_string(),
        ),
        sources.entry(
            "submission.enabled",
            &["FLEETQUOTE_SUBMISSION_ENABLED"],
            submission.enabled.to_string(),
        ),
        sources.entry(
            "submission.endpoint",
            &["FLEETQUOTE_SUBMISSION_ENDPOINT"],
            submission.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        sources.entry("submission.api_token", &["FLEETQUOTE_SUBMISSION_API_TOKEN"], api_token),
        sources.entry(
            "submission.timeout_secs",
            &["FLEETQUOTE_SUBMISSION_TIMEOUT_SECS"],
            submission.timeout_secs.to_string(),
        ),
        sources.entry(
            "summary.currency_symbol",
            &["FLEETQUOTE_SUMMARY_CURRENCY_SYMBOL"],
            config.summary.currency_symbol.clone(),
        ),
        sources.entry(
            "summary.signature",
            &["FLEETQUOTE_SUMMARY_SIGNATURE"],
            config.summary.signature.clone(),
        ),
        sources.entry(
            "summary.period_label",
            &["FLEETQUOTE_SUMMARY_PERIOD_LABEL"],
            config.summary.period_label.clone(),
        ),
        sources.entry(
            "summary.default_validity_days",
            &["FLEETQUOTE_SUMMARY_DEFAULT_VALIDITY_DAYS"],
            config.summary.default_validity_days.to_string(),
        ),
        sources.entry(
            "logging.level",
            &["FLEETQUOTE_LOGGING_LEVEL", "FLEETQUOTE_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        sources.entry(
            "logging.format",
            &["FLEETQUOTE_LOGGING_FORMAT", "FLEETQUOTE_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
        ),
    ];

    CommandResult::success_with_data(
        COMMAND,
        "effective config (source precedence: env > file > default)",
        Some(json!({
            "config_file": file_path.map(|path| path.display().to_string()),
            "entries": to_data(entries),
        })),
    )
}

struct SourceProbe<'a> {
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl SourceProbe<'_> {
    fn entry(&self, key: &'static str, env_keys: &[&str], value: String) -> ConfigEntry {
        ConfigEntry { key, value, source: self.source_of(key, env_keys) }
    }

    fn source_of(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps a short prefix so operators can tell tokens apart without exposing them.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.find(['_', '-']) {
        Some(split) if split <= 8 => format!("{}***", &trimmed[..=split]),
        _ => "<redacted>".to_string(),
    }
}
