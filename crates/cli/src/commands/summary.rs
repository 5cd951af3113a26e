use std::path::Path;

use serde_json::json;

use crate::commands::{open_workspace, CommandResult, EXIT_INPUT};

const COMMAND: &str = "summary";

pub fn run(config_path: Option<&Path>, draft_path: &Path) -> CommandResult {
    let workspace = match open_workspace(COMMAND, config_path, draft_path) {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };

    let options = workspace.config.summary.options();
    match workspace.session.render_summary(&options) {
        Some(text) => CommandResult::success_with_data(
            COMMAND,
            "summary rendered",
            Some(json!({ "text": text })),
        ),
        None => CommandResult::failure(
            COMMAND,
            "no_contact",
            "the client has no contact phone; nothing to send",
            EXIT_INPUT,
        ),
    }
}
