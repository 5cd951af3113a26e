//! Stateful editing shell around the pure quoting pipeline.
//!
//! One session owns one draft. Every mutation returns the notifications the
//! presentation layer should show; derived state is recomputed on demand and
//! never cached.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cpq::catalog::{CatalogLookup, PromotionCatalog};
use crate::cpq::constraints::{validate_draft, ConstraintViolation};
use crate::cpq::locks::{field_locks, FieldLocks};
use crate::cpq::promotion::{apply_promotion, resolve_or_degrade};
use crate::cpq::{CpqEvaluationInput, CpqRuntime, DeterministicCpqRuntime, Recomputation};
use crate::domain::notification::Notification;
use crate::domain::product::{LineItemKind, Product, ProductCategory, ProductId};
use crate::domain::promotion::PromotionId;
use crate::domain::quote::{LineItem, PromotionBaseline, QuoteDraft, QuoteField};
use crate::errors::{ApplicationError, EngineError};
use crate::submission::{
    build_payload, map_field_errors, SubmissionError, SubmissionPayload, SubmissionReceipt,
    SubmissionTransport,
};
use crate::summary::{render_summary, SummaryOptions};

const MAX_DISCOUNT_PERCENT: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("quote is not ready to submit: {}", .0.message)]
    Validation(ConstraintViolation),
    #[error("quote backend rejected {} field(s)", .0.len())]
    Rejected(BTreeMap<QuoteField, Vec<String>>),
    #[error("quote backend unreachable: {0}")]
    Transport(String),
}

impl SubmitError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn notification(&self) -> Notification {
        match self {
            Self::Validation(violation) => Notification::error(violation.message.clone()),
            Self::Rejected(fields) => Notification::error(format!(
                "The quote was not saved. Check: {}",
                fields.keys().map(QuoteField::payload_key).collect::<Vec<_>>().join(", ")
            )),
            Self::Transport(_) => Notification::warning(
                "The quote could not be sent right now. Your changes are kept; please retry.",
            ),
        }
    }
}

impl From<SubmitError> for ApplicationError {
    fn from(error: SubmitError) -> Self {
        let engine = match error {
            SubmitError::Validation(violation) => EngineError::from(violation),
            SubmitError::Rejected(fields) => EngineError::SubmissionRejected(
                fields
                    .into_iter()
                    .map(|(field, messages)| (field.payload_key().to_string(), messages))
                    .collect(),
            ),
            SubmitError::Transport(reason) => EngineError::Transport(reason),
        };
        ApplicationError::Engine(engine)
    }
}

pub struct EditingSession {
    session_id: Uuid,
    draft: QuoteDraft,
    baseline: PromotionBaseline,
    catalog: Arc<dyn CatalogLookup>,
    promotions: Arc<dyn PromotionCatalog>,
    runtime: Arc<dyn CpqRuntime>,
}

impl EditingSession {
    /// Session for a brand-new quote; the promotion baseline is the empty draft.
    pub fn new(catalog: Arc<dyn CatalogLookup>, promotions: Arc<dyn PromotionCatalog>) -> Self {
        Self::for_existing(QuoteDraft::default(), catalog, promotions)
    }

    /// Session for a persisted quote; its current values become the baseline.
    pub fn for_existing(
        mut draft: QuoteDraft,
        catalog: Arc<dyn CatalogLookup>,
        promotions: Arc<dyn PromotionCatalog>,
    ) -> Self {
        draft.unit_count = draft.unit_count.max(1);
        draft.sync_unit_bound_lines();
        let baseline = draft.promotion_baseline();
        let session_id = Uuid::new_v4();
        debug!(
            event_name = "session.opened",
            session_id = %session_id,
            quote_ref = %draft.reference_code,
            "editing session opened"
        );
        Self {
            session_id,
            draft,
            baseline,
            catalog,
            promotions,
            runtime: Arc::new(DeterministicCpqRuntime::default()),
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn CpqRuntime>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn draft(&self) -> &QuoteDraft {
        &self.draft
    }

    pub fn baseline(&self) -> &PromotionBaseline {
        &self.baseline
    }

    pub fn into_draft(self) -> QuoteDraft {
        self.draft
    }

    // Promotion

    /// Applies `promotion_id` on top of the user's current selections. When another
    /// promotion is already active, its effects are rolled back to the baseline first.
    pub fn select_promotion(&mut self, promotion_id: PromotionId) -> Vec<Notification> {
        if let Some(previous) = self.draft.selected_promotion_id.take() {
            self.draft.restore_baseline(&self.baseline);
            self.draft.sync_unit_bound_lines();
            debug!(
                event_name = "session.promotion.switched",
                session_id = %self.session_id,
                from = %previous,
                to = %promotion_id,
                "previous promotion rolled back"
            );
        }

        let promotion = match self.promotions.get_promotion(&promotion_id) {
            Ok(promotion) => promotion,
            Err(error) => {
                warn!(
                    event_name = "session.promotion.unknown",
                    session_id = %self.session_id,
                    promotion_id = %promotion_id,
                    error = %error,
                    "promotion not in catalog; draft left without promotion"
                );
                return vec![Notification::warning(format!(
                    "{error}. No promotion is applied to this quote."
                ))];
            }
        };

        let notifications = apply_promotion(&mut self.draft, &promotion, self.catalog.as_ref());
        self.draft.sync_unit_bound_lines();
        notifications
    }

    pub fn clear_promotion(&mut self) -> Vec<Notification> {
        let Some(previous) = self.draft.selected_promotion_id.take() else {
            return vec![Notification::info("No promotion is selected")];
        };
        self.draft.restore_baseline(&self.baseline);
        self.draft.sync_unit_bound_lines();
        info!(
            event_name = "session.promotion.cleared",
            session_id = %self.session_id,
            promotion_id = %previous,
            "promotion removed; baseline restored"
        );
        vec![Notification::info(format!("Promotion {previous} removed"))]
    }

    // Quote-level fields

    pub fn set_unit_count(&mut self, unit_count: u32) -> Vec<Notification> {
        if unit_count < 1 {
            return vec![Notification::warning("A quote needs at least one vehicle")];
        }
        self.draft.unit_count = unit_count;
        self.draft.sync_unit_bound_lines();

        let (promotion, notice) =
            resolve_or_degrade(self.draft.selected_promotion_id.as_ref(), self.promotions.as_ref());
        let mut notifications: Vec<Notification> = notice.into_iter().collect();
        if self.draft.selected_promotion_id.is_some() && unit_count < promotion.minimum_unit_count {
            notifications.push(Notification::warning(format!(
                "The selected promotion requires at least {} vehicles",
                promotion.minimum_unit_count
            )));
        }
        notifications
    }

    pub fn set_validity_days(&mut self, validity_days: u32) -> Vec<Notification> {
        if validity_days == 0 {
            return vec![Notification::warning("Validity must be at least one day")];
        }
        self.draft.validity_days = validity_days;
        Vec::new()
    }

    // Installation slot

    pub fn select_installation_product(
        &mut self,
        product_id: Option<ProductId>,
    ) -> Vec<Notification> {
        if let Some(rejected) = self.reject_if_locked(QuoteField::InstallationProduct) {
            return vec![rejected];
        }
        if let Some(product_id) = &product_id {
            let in_slot = ProductCategory::is_installation;
            if let Err(rejected) = self.product_in_slot(product_id, in_slot, "installation fee") {
                return vec![rejected];
            }
        }
        self.draft.installation.product_id = product_id;
        Vec::new()
    }

    pub fn set_installation_discount(&mut self, percent: Decimal) -> Vec<Notification> {
        if let Some(rejected) = self.reject_if_locked(QuoteField::InstallationDiscount) {
            return vec![rejected];
        }
        match self.checked_percent(percent, QuoteField::InstallationDiscount) {
            Ok((percent, notifications)) => {
                self.draft.installation.manual_discount_percent = percent;
                notifications
            }
            Err(rejected) => vec![rejected],
        }
    }

    pub fn set_installation_payment_method(
        &mut self,
        method_id: Option<String>,
    ) -> Vec<Notification> {
        self.draft.installation.payment_method_id = non_blank(method_id);
        Vec::new()
    }

    pub fn set_installation_assignee(&mut self, assignee_id: Option<String>) -> Vec<Notification> {
        self.draft.installation_assignee_id = non_blank(assignee_id);
        Vec::new()
    }

    // Plan slot

    pub fn select_plan_product(&mut self, product_id: Option<ProductId>) -> Vec<Notification> {
        if let Some(rejected) = self.reject_if_locked(QuoteField::PlanProduct) {
            return vec![rejected];
        }
        if let Some(product_id) = &product_id {
            let in_slot = ProductCategory::is_plan;
            if let Err(rejected) = self.product_in_slot(product_id, in_slot, "plan") {
                return vec![rejected];
            }
        }
        self.draft.plan.product_id = product_id;
        Vec::new()
    }

    pub fn set_plan_discount(&mut self, percent: Decimal) -> Vec<Notification> {
        if let Some(rejected) = self.reject_if_locked(QuoteField::PlanDiscount) {
            return vec![rejected];
        }
        match self.checked_percent(percent, QuoteField::PlanDiscount) {
            Ok((percent, notifications)) => {
                self.draft.plan.manual_discount_percent = percent;
                notifications
            }
            Err(rejected) => vec![rejected],
        }
    }

    pub fn set_plan_payment_method(&mut self, method_id: Option<String>) -> Vec<Notification> {
        self.draft.plan.payment_method_id = non_blank(method_id);
        Vec::new()
    }

    // Accessories and services

    pub fn add_line_item(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        applies_to_all_units: bool,
    ) -> Vec<Notification> {
        let product = match self.catalog.get_product(&product_id) {
            Ok(product) => product,
            Err(error) => return vec![Notification::warning(error.to_string())],
        };
        let Some(kind) = product.category.line_item_kind() else {
            return vec![Notification::warning(format!(
                "{} is not an accessory or service",
                product.name
            ))];
        };
        if self.draft.line_items.iter().any(|line| line.product_id == product_id) {
            let message = format!("{} is already on the quote", product.name);
            return vec![Notification::warning(message)];
        }
        let quantity = if applies_to_all_units { self.draft.unit_count } else { quantity };
        if quantity < 1 {
            return vec![Notification::warning("Quantity must be at least one")];
        }

        self.draft.line_items.push(new_line(&product, kind, quantity, applies_to_all_units));
        vec![Notification::info(format!("{} added", product.name))]
    }

    pub fn remove_line_item(&mut self, product_id: &ProductId) -> Vec<Notification> {
        let before = self.draft.line_items.len();
        self.draft.line_items.retain(|line| &line.product_id != product_id);
        if self.draft.line_items.len() == before {
            return vec![Notification::warning(format!("{product_id} is not on the quote"))];
        }
        Vec::new()
    }

    pub fn set_line_item_quantity(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Vec<Notification> {
        if quantity < 1 {
            return vec![Notification::warning("Quantity must be at least one")];
        }
        let Some(line) = self.line_mut(product_id) else {
            return vec![Notification::warning(format!("{product_id} is not on the quote"))];
        };
        if line.applies_to_all_units {
            return vec![Notification::warning(format!(
                "{} follows the vehicle count; change the vehicle count instead",
                line.name
            ))];
        }
        line.quantity = quantity;
        Vec::new()
    }

    pub fn set_line_item_discount(
        &mut self,
        product_id: &ProductId,
        percent: Decimal,
    ) -> Vec<Notification> {
        let (percent, notifications) = match self.checked_percent(percent, QuoteField::LineItems) {
            Ok(checked) => checked,
            Err(rejected) => return vec![rejected],
        };
        let Some(line) = self.line_mut(product_id) else {
            return vec![Notification::warning(format!("{product_id} is not on the quote"))];
        };
        line.manual_discount_percent = percent;
        notifications
    }

    // Derived state

    /// Runs the pipeline without touching the draft.
    pub fn evaluate(&self) -> Recomputation {
        self.runtime.recompute(CpqEvaluationInput {
            draft: &self.draft,
            catalog: self.catalog.as_ref(),
            promotions: self.promotions.as_ref(),
        })
    }

    /// Runs the pipeline and writes each line item's computed subtotal back.
    pub fn recompute(&mut self) -> Recomputation {
        let result = self.evaluate();
        let priced_lines =
            result.pricing.accessories.iter().chain(result.pricing.services.iter());
        let subtotals: BTreeMap<&ProductId, Decimal> =
            priced_lines.map(|priced| (&priced.product_id, priced.final_amount)).collect();
        for line in &mut self.draft.line_items {
            // unpriced lines contribute nothing
            line.computed_subtotal =
                subtotals.get(&line.product_id).copied().unwrap_or(Decimal::ZERO);
        }
        result
    }

    pub fn field_locks(&self) -> FieldLocks {
        let (promotion, _) =
            resolve_or_degrade(self.draft.selected_promotion_id.as_ref(), self.promotions.as_ref());
        field_locks(&self.draft, &promotion, self.catalog.as_ref())
    }

    pub fn is_field_locked(&self, field: &QuoteField) -> bool {
        self.field_locks().is_locked(field)
    }

    pub fn render_summary(&self, options: &SummaryOptions) -> Option<String> {
        render_summary(&self.draft, &self.evaluate().pricing, options)
    }

    pub fn submission_payload(&self) -> SubmissionPayload {
        build_payload(&self.draft)
    }

    /// Validates, then hands the payload to the transport.
    ///
    /// Pricing state is unaffected by the outcome; a failed submission leaves
    /// the draft exactly as it was.
    pub async fn submit(
        &self,
        transport: &dyn SubmissionTransport,
    ) -> Result<SubmissionReceipt, SubmitError> {
        let (promotion, _) =
            resolve_or_degrade(self.draft.selected_promotion_id.as_ref(), self.promotions.as_ref());
        validate_draft(&self.draft, &promotion).map_err(SubmitError::Validation)?;

        let payload = self.submission_payload();
        match transport.submit(&payload).await {
            Ok(receipt) => {
                info!(
                    event_name = "session.submission.accepted",
                    session_id = %self.session_id,
                    quote_ref = %self.draft.reference_code,
                    quote_id = receipt.quote_id.as_deref().unwrap_or("unknown"),
                    "quote submitted"
                );
                Ok(receipt)
            }
            Err(SubmissionError::Rejected(errors)) => {
                warn!(
                    event_name = "session.submission.rejected",
                    session_id = %self.session_id,
                    field_count = errors.len(),
                    "quote backend rejected fields"
                );
                Err(SubmitError::Rejected(map_field_errors(&errors)))
            }
            Err(SubmissionError::Transport(reason)) => {
                warn!(
                    event_name = "session.submission.transport_failed",
                    session_id = %self.session_id,
                    error = %reason,
                    "quote backend unreachable"
                );
                Err(SubmitError::Transport(reason))
            }
        }
    }

    fn line_mut(&mut self, product_id: &ProductId) -> Option<&mut LineItem> {
        self.draft.line_items.iter_mut().find(|line| &line.product_id == product_id)
    }

    fn reject_if_locked(&self, field: QuoteField) -> Option<Notification> {
        if !self.is_field_locked(&field) {
            return None;
        }
        debug!(
            event_name = "session.edit.locked",
            session_id = %self.session_id,
            field = field.payload_key(),
            "edit refused; field is driven by the promotion"
        );
        Some(Notification::warning("This field is set by the selected promotion"))
    }

    fn product_in_slot(
        &self,
        product_id: &ProductId,
        in_slot: fn(ProductCategory) -> bool,
        slot_name: &str,
    ) -> Result<(), Notification> {
        let product = self
            .catalog
            .get_product(product_id)
            .map_err(|error| Notification::warning(error.to_string()))?;
        if !in_slot(product.category) {
            return Err(Notification::warning(format!("{} is not a {slot_name}", product.name)));
        }
        Ok(())
    }

    fn checked_percent(
        &self,
        percent: Decimal,
        field: QuoteField,
    ) -> Result<(Decimal, Vec<Notification>), Notification> {
        if percent.is_sign_negative() {
            return Err(Notification::warning("Discounts cannot be negative"));
        }
        if percent > MAX_DISCOUNT_PERCENT {
            warn!(
                event_name = "session.discount.clamped",
                session_id = %self.session_id,
                field = field.payload_key(),
                requested = %percent,
                "manual discount above 100% clamped"
            );
            let notice = Notification::warning("Discount capped at 100%");
            return Ok((MAX_DISCOUNT_PERCENT, vec![notice]));
        }
        Ok((percent, Vec::new()))
    }
}

fn new_line(
    product: &Product,
    kind: LineItemKind,
    quantity: u32,
    applies_to_all_units: bool,
) -> LineItem {
    LineItem {
        product_id: product.id.clone(),
        name: product.name.clone(),
        kind,
        quantity,
        unit_price: product.unit_price,
        manual_discount_percent: Decimal::ZERO,
        applies_to_all_units,
        computed_subtotal: Decimal::ZERO,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}
