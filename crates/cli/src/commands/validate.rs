use std::path::Path;

use serde_json::json;

use crate::commands::{open_workspace, to_data, CommandResult, EXIT_VALIDATION};

const COMMAND: &str = "validate";

pub fn run(config_path: Option<&Path>, draft_path: &Path) -> CommandResult {
    let workspace = match open_workspace(COMMAND, config_path, draft_path) {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };

    let recomputation = workspace.session.evaluate();
    match recomputation.validation.violation {
        None => CommandResult::success(COMMAND, "quote is ready to submit"),
        Some(violation) => CommandResult::failure_with_data(
            COMMAND,
            "validation_failed",
            violation.message.clone(),
            EXIT_VALIDATION,
            Some(json!({ "violation": to_data(&violation) })),
        ),
    }
}
