use std::fmt::Write as _;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::cpq::pricing::{LinePricing, PricingResult};
use crate::domain::quote::QuoteDraft;

pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";
pub const DEFAULT_PERIOD_LABEL: &str = "/month";
pub const DEFAULT_SIGNATURE: &str = "The Fleetquote sales team";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryOptions {
    pub currency_symbol: String,
    pub signature: String,
    pub period_label: String,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
            signature: DEFAULT_SIGNATURE.to_string(),
            period_label: DEFAULT_PERIOD_LABEL.to_string(),
        }
    }
}

/// Renders the client-facing quote text.
///
/// Returns `None` when the client has no phone number to send it to. Output
/// depends only on the arguments, so repeated calls are byte-identical.
pub fn render_summary(
    draft: &QuoteDraft,
    pricing: &PricingResult,
    options: &SummaryOptions,
) -> Option<String> {
    draft.client.contact_phone()?;

    let mut sections = Vec::new();
    sections.push(greeting(draft));

    let mut products = String::new();
    if let Some(line) = &pricing.installation {
        push_line(&mut products, "Installation: ", line, "", options);
    }
    if let Some(line) = &pricing.plan {
        push_line(&mut products, "Plan: ", line, &options.period_label, options);
    }
    if !products.is_empty() {
        sections.push(products);
    }

    if !pricing.services.is_empty() {
        let mut services = String::from("Services:\n");
        for line in &pricing.services {
            push_line(&mut services, "- ", line, &options.period_label, options);
        }
        sections.push(services);
    }

    if !pricing.accessories.is_empty() {
        let mut accessories = String::from("Accessories:\n");
        for line in &pricing.accessories {
            push_line(&mut accessories, "- ", line, "", options);
        }
        sections.push(accessories);
    }

    sections.push(format!(
        "One-time investment: {}\nRecurring cost: {}{}\nFirst period total: {}\n",
        format_money(pricing.one_time_investment, &options.currency_symbol),
        format_money(pricing.recurring_monthly_cost, &options.currency_symbol),
        options.period_label,
        format_money(pricing.first_period_total, &options.currency_symbol),
    ));
    sections.push(terms(draft, pricing));
    sections.push(format!("{}\n", options.signature));

    Some(sections.join("\n"))
}

fn greeting(draft: &QuoteDraft) -> String {
    let name = draft.client.first_name.trim();
    let mut text =
        if name.is_empty() { "Hello,\n".to_string() } else { format!("Hello {name},\n") };

    let units = if draft.unit_count == 1 { "vehicle" } else { "vehicles" };
    let reference = draft.reference_code.trim();
    if reference.is_empty() {
        let _ = writeln!(text, "Here is your quote for {} {units}.", draft.unit_count);
    } else {
        let _ = writeln!(text, "Here is your quote {reference} for {} {units}.", draft.unit_count);
    }
    text
}

fn push_line(
    out: &mut String,
    prefix: &str,
    line: &LinePricing,
    period: &str,
    options: &SummaryOptions,
) {
    let _ = write!(
        out,
        "{prefix}{} x{}: {}{period}",
        line.product_name,
        line.quantity,
        format_money(line.final_amount, &options.currency_symbol)
    );
    if line.has_discount() {
        let _ = write!(out, " ({})", line.discount_label);
    }
    out.push('\n');
}

fn terms(draft: &QuoteDraft, pricing: &PricingResult) -> String {
    let mut text = String::from("Terms:\n");
    match draft.valid_until() {
        Some(date) => {
            let _ = writeln!(
                text,
                "- Valid for {} days (until {}).",
                draft.validity_days,
                date.format("%Y-%m-%d")
            );
        }
        None => {
            let _ = writeln!(text, "- Valid for {} days.", draft.validity_days);
        }
    }
    text.push_str("- Prices do not include taxes.\n");

    match &pricing.promotion {
        Some(promotion) => {
            let _ = write!(text, "- Promotion: {}", promotion.name);
            if let Some(description) =
                promotion.description.as_deref().map(str::trim).filter(|value| !value.is_empty())
            {
                let _ = write!(text, ". {description}");
            }
            text.push('\n');
        }
        None if draft.plan.manual_discount_percent > Decimal::ZERO => {
            text.push_str("- Includes a bulk or automatic debit discount on the plan.\n");
        }
        None => {}
    }
    text
}

/// Formats an amount with two decimals and comma grouping, e.g. `$12,345.60`.
pub fn format_money(amount: Decimal, symbol: &str) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let plain = format!("{:.2}", rounded.abs());
    let (integer, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}{symbol}{grouped}.{fraction}")
}
