use std::path::Path;

use fleetquote_core::domain::promotion::PromotionId;
use serde_json::json;

use crate::commands::{open_workspace, to_data, CommandResult, EXIT_INPUT};

const COMMAND: &str = "apply-promotion";

/// Applies a promotion to the draft and prints the resulting draft.
///
/// The draft file is left untouched; callers persist the returned draft if they want it.
pub fn run(config_path: Option<&Path>, draft_path: &Path, promotion_id: &str) -> CommandResult {
    let mut workspace = match open_workspace(COMMAND, config_path, draft_path) {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };

    let promotion_id = PromotionId::new(promotion_id.trim());
    let notifications = workspace.session.select_promotion(promotion_id.clone());
    if workspace.session.draft().selected_promotion_id.as_ref() != Some(&promotion_id) {
        return CommandResult::failure_with_data(
            COMMAND,
            "promotion_not_found",
            format!("promotion `{promotion_id}` is not in the catalog"),
            EXIT_INPUT,
            Some(json!({ "notices": to_data(&notifications) })),
        );
    }

    let recomputation = workspace.session.recompute();
    let data = json!({
        "draft": to_data(workspace.session.draft()),
        "notices": to_data(&notifications),
        "pricing": to_data(&recomputation.pricing),
        "locked_fields": to_data(recomputation.locks.locked_fields()),
    });
    CommandResult::success_with_data(
        COMMAND,
        format!("promotion `{promotion_id}` applied"),
        Some(data),
    )
}
