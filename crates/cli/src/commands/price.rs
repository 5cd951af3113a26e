use std::path::Path;

use serde_json::json;

use crate::commands::{open_workspace, to_data, CommandResult};

const COMMAND: &str = "price";

pub fn run(config_path: Option<&Path>, draft_path: &Path) -> CommandResult {
    let mut workspace = match open_workspace(COMMAND, config_path, draft_path) {
        Ok(workspace) => workspace,
        Err(result) => return result,
    };

    let recomputation = workspace.session.recompute();
    let pricing = &recomputation.pricing;
    let message = format!(
        "one-time {} / recurring {} / first period {}",
        pricing.one_time_investment.round_dp(2),
        pricing.recurring_monthly_cost.round_dp(2),
        pricing.first_period_total.round_dp(2)
    );

    let data = json!({
        "pricing": to_data(pricing),
        "discount_total": to_data(pricing.discount_total()),
        "notices": to_data(&recomputation.notices),
        "locked_fields": to_data(recomputation.locks.locked_fields()),
    });
    CommandResult::success_with_data(COMMAND, message, Some(data))
}
