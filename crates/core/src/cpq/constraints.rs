use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cpq::promotion::ResolvedPromotion;
use crate::domain::quote::{QuoteDraft, QuoteField};
use crate::errors::EngineError;

/// Pre-submission rules, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationRule {
    InstallationAssigneeSelected,
    InstallationProductSelected,
    InstallationPaymentMethodSelected,
    PlanProductSelected,
    PlanPaymentMethodSelected,
    MinimumUnitCount,
}

impl ValidationRule {
    pub const ORDER: [ValidationRule; 6] = [
        ValidationRule::InstallationAssigneeSelected,
        ValidationRule::InstallationProductSelected,
        ValidationRule::InstallationPaymentMethodSelected,
        ValidationRule::PlanProductSelected,
        ValidationRule::PlanPaymentMethodSelected,
        ValidationRule::MinimumUnitCount,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Self::InstallationAssigneeSelected => "MISSING_INSTALLATION_ASSIGNEE",
            Self::InstallationProductSelected => "MISSING_INSTALLATION_PRODUCT",
            Self::InstallationPaymentMethodSelected => "MISSING_INSTALLATION_PAYMENT_METHOD",
            Self::PlanProductSelected => "MISSING_PLAN_PRODUCT",
            Self::PlanPaymentMethodSelected => "MISSING_PLAN_PAYMENT_METHOD",
            Self::MinimumUnitCount => "UNIT_COUNT_BELOW_PROMOTION_MINIMUM",
        }
    }

    pub fn field(self) -> QuoteField {
        match self {
            Self::InstallationAssigneeSelected => QuoteField::InstallationAssignee,
            Self::InstallationProductSelected => QuoteField::InstallationProduct,
            Self::InstallationPaymentMethodSelected => QuoteField::InstallationPaymentMethod,
            Self::PlanProductSelected => QuoteField::PlanProduct,
            Self::PlanPaymentMethodSelected => QuoteField::PlanPaymentMethod,
            Self::MinimumUnitCount => QuoteField::UnitCount,
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub rule: ValidationRule,
    pub code: String,
    pub field: QuoteField,
    pub message: String,
    pub suggestion: Option<String>,
}

impl From<ConstraintViolation> for EngineError {
    fn from(violation: ConstraintViolation) -> Self {
        EngineError::ValidationFailed(violation.rule)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintResult {
    pub valid: bool,
    pub violation: Option<ConstraintViolation>,
}

impl Default for ConstraintResult {
    fn default() -> Self {
        Self { valid: true, violation: None }
    }
}

impl ConstraintResult {
    pub fn into_result(self) -> Result<(), ConstraintViolation> {
        match self.violation {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

impl From<Result<(), ConstraintViolation>> for ConstraintResult {
    fn from(value: Result<(), ConstraintViolation>) -> Self {
        match value {
            Ok(()) => Self::default(),
            Err(violation) => Self { valid: false, violation: Some(violation) },
        }
    }
}

pub trait ConstraintEngine: Send + Sync {
    fn validate(&self, draft: &QuoteDraft, promotion: &ResolvedPromotion) -> ConstraintResult;
}

#[derive(Default)]
pub struct DeterministicConstraintEngine;

impl ConstraintEngine for DeterministicConstraintEngine {
    fn validate(&self, draft: &QuoteDraft, promotion: &ResolvedPromotion) -> ConstraintResult {
        validate_draft(draft, promotion).into()
    }
}

/// Returns the first failing rule in [`ValidationRule::ORDER`].
pub fn validate_draft(
    draft: &QuoteDraft,
    promotion: &ResolvedPromotion,
) -> Result<(), ConstraintViolation> {
    for rule in ValidationRule::ORDER {
        if let Some(violation) = check_rule(rule, draft, promotion) {
            return Err(violation);
        }
    }
    Ok(())
}

fn check_rule(
    rule: ValidationRule,
    draft: &QuoteDraft,
    promotion: &ResolvedPromotion,
) -> Option<ConstraintViolation> {
    let (message, suggestion) = match rule {
        ValidationRule::InstallationAssigneeSelected if !draft.has_installation_assignee() => (
            "Installation owner is not selected".to_string(),
            "Choose who will perform the installation",
        ),
        ValidationRule::InstallationProductSelected if draft.installation.product_id.is_none() => (
            "Installation product is not selected".to_string(),
            "Choose an installation fee",
        ),
        ValidationRule::InstallationPaymentMethodSelected
            if !draft.installation.has_payment_method() =>
        {
            (
                "Installation payment method is not selected".to_string(),
                "Choose how the installation will be paid",
            )
        }
        ValidationRule::PlanProductSelected if draft.plan.product_id.is_none() => {
            ("Plan is not selected".to_string(), "Choose a monthly plan or convenant")
        }
        ValidationRule::PlanPaymentMethodSelected if !draft.plan.has_payment_method() => (
            "Plan payment method is not selected".to_string(),
            "Choose how the plan will be paid",
        ),
        ValidationRule::MinimumUnitCount
            if draft.selected_promotion_id.is_some()
                && draft.unit_count < promotion.minimum_unit_count =>
        {
            (
                format!(
                    "The selected promotion requires at least {} vehicles (quote has {})",
                    promotion.minimum_unit_count, draft.unit_count
                ),
                "Raise the vehicle count or remove the promotion",
            )
        }
        _ => return None,
    };

    Some(ConstraintViolation {
        rule,
        code: rule.code().to_string(),
        field: rule.field(),
        message,
        suggestion: Some(suggestion.to_string()),
    })
}
