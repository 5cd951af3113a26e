use std::collections::BTreeMap;
use std::path::Path;

use fleetquote_core::errors::ApplicationError;
use fleetquote_core::session::SubmitError;
use fleetquote_core::submission::{RecordingTransport, SubmissionTransport};
use serde_json::json;

use crate::commands::{
    open_workspace, to_data, CommandResult, EXIT_CONFIG, EXIT_SUBMISSION, EXIT_VALIDATION,
};
use crate::transport::HttpSubmissionTransport;

const COMMAND: &str = "submit";

pub fn run(config_path: Option<&Path>, draft_path: &Path, dry_run: bool) -> CommandResult {
    let workspace = match open_workspace(COMMAND, config_path, draft_path) {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };

    let transport: Box<dyn SubmissionTransport> = if dry_run {
        Box::new(RecordingTransport::default())
    } else {
        if !workspace.config.submission.enabled {
            return CommandResult::failure(
                COMMAND,
                "submission_disabled",
                "submission is disabled; set submission.enabled or use --dry-run",
                EXIT_CONFIG,
            );
        }
        match HttpSubmissionTransport::from_config(&workspace.config.submission) {
            Ok(transport) => Box::new(transport),
            Err(error) => {
                return CommandResult::failure(
                    COMMAND,
                    "submission_transport",
                    error.to_string(),
                    EXIT_CONFIG,
                )
            }
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let session = workspace.session;
    let outcome = runtime.block_on(session.submit(transport.as_ref()));
    match outcome {
        Ok(receipt) => {
            let mut data = json!({ "receipt": to_data(&receipt) });
            if dry_run {
                data["payload"] = to_data(session.submission_payload()).unwrap_or_default();
            }
            let message = if dry_run {
                "dry run: quote is valid and was not sent".to_string()
            } else {
                format!("quote submitted as {}", receipt.quote_id.as_deref().unwrap_or("unknown"))
            };
            CommandResult::success_with_data(COMMAND, message, Some(data))
        }
        Err(error) => {
            let (error_class, exit_code, mut data) = match &error {
                SubmitError::Validation(violation) => (
                    "validation_failed",
                    EXIT_VALIDATION,
                    json!({ "violation": to_data(violation) }),
                ),
                SubmitError::Rejected(fields) => {
                    let field_errors = fields
                        .iter()
                        .map(|(field, messages)| (field.payload_key().to_string(), messages))
                        .collect::<BTreeMap<_, _>>();
                    (
                        "submission_rejected",
                        EXIT_SUBMISSION,
                        json!({ "field_errors": to_data(field_errors) }),
                    )
                }
                SubmitError::Transport(_) => ("submission_transport", EXIT_SUBMISSION, json!({})),
            };
            data["notification"] = to_data(error.notification()).unwrap_or_default();
            data["retryable"] = json!(error.is_retryable());
            let correlation_id = session.session_id().to_string();
            let interface =
                ApplicationError::from(error.clone()).into_interface(correlation_id.as_str());
            data["user_message"] = json!(interface.user_message());
            data["correlation_id"] = json!(correlation_id);
            CommandResult::failure_with_data(
                COMMAND,
                error_class,
                error.to_string(),
                exit_code,
                Some(data),
            )
        }
    }
}
