pub mod apply_promotion;
pub mod config;
pub mod price;
pub mod submit;
pub mod summary;
pub mod validate;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use fleetquote_core::config::{AppConfig, LoadOptions};
use fleetquote_core::cpq::catalog::InMemoryCatalog;
use fleetquote_core::domain::quote::QuoteDraft;
use fleetquote_core::session::EditingSession;
use serde::Serialize;
use serde_json::Value;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_INPUT: u8 = 3;
pub const EXIT_VALIDATION: u8 = 4;
pub const EXIT_SUBMISSION: u8 = 5;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_data(command, error_class, message, exit_code, None)
    }

    pub fn failure_with_data(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\
             \"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Serializes command data; serialization failures degrade to `null`.
pub(crate) fn to_data(value: impl Serialize) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Everything a draft-driven command needs: configuration plus an open session.
pub struct Workspace {
    pub config: AppConfig,
    pub session: EditingSession,
}

pub(crate) fn open_workspace(
    command: &str,
    config_path: Option<&Path>,
    draft_path: &Path,
) -> Result<Workspace, CommandResult> {
    let config = AppConfig::load(LoadOptions {
        config_path: config_path.map(Path::to_path_buf),
        require_file: config_path.is_some(),
        ..LoadOptions::default()
    })
    .map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })?;

    let catalog = InMemoryCatalog::load(&config.catalog.path).map_err(|error| {
        CommandResult::failure(command, "catalog_load", error.to_string(), EXIT_CONFIG)
    })?;
    let draft = read_draft(draft_path, config.summary.default_validity_days)
        .map_err(|message| CommandResult::failure(command, "draft_input", message, EXIT_INPUT))?;

    let catalog = Arc::new(catalog);
    let session = EditingSession::for_existing(draft, catalog.clone(), catalog);
    tracing::debug!(
        event_name = "cli.workspace.opened",
        command,
        session_id = %session.session_id(),
        draft = %draft_path.display(),
        "draft loaded"
    );
    Ok(Workspace { config, session })
}

/// Reads a JSON draft. A draft without `validity_days` takes the configured default.
pub fn read_draft(path: &Path, default_validity_days: u32) -> Result<QuoteDraft, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read draft `{}`: {error}", path.display()))?;
    let mut value: Value = serde_json::from_str(&raw)
        .map_err(|error| format!("could not parse draft `{}`: {error}", path.display()))?;

    if let Some(object) = value.as_object_mut() {
        object
            .entry("validity_days")
            .or_insert_with(|| Value::from(default_validity_days));
    }

    let mut draft: QuoteDraft = serde_json::from_value(value)
        .map_err(|error| format!("invalid draft `{}`: {error}", path.display()))?;
    if draft.unit_count == 0 {
        return Err(format!("invalid draft `{}`: unit_count must be at least 1", path.display()));
    }
    draft.sync_unit_bound_lines();
    Ok(draft)
}
