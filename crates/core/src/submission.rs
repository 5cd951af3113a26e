//! The one serialized boundary: the payload sent to the quote backend and the
//! transport seam used to send it.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::quote::{QuoteDraft, QuoteField};
use crate::errors::EngineError;

/// Server-side field errors keyed by payload key.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionLineItem {
    pub product_id: String,
    pub quantity: u32,
    pub applies_to_all_units: bool,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub reference_code: String,
    pub installation_assignee_id: Option<String>,
    pub installation_product_id: Option<String>,
    pub installation_discount_percent: Decimal,
    pub installation_payment_method_id: Option<String>,
    pub plan_product_id: Option<String>,
    pub plan_discount_percent: Decimal,
    pub plan_payment_method_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_id: Option<String>,
    pub unit_count: u32,
    pub validity_days: u32,
    pub line_items: Vec<SubmissionLineItem>,
}

pub fn build_payload(draft: &QuoteDraft) -> SubmissionPayload {
    SubmissionPayload {
        reference_code: draft.reference_code.clone(),
        installation_assignee_id: draft.installation_assignee_id.clone(),
        installation_product_id: draft.installation.product_id.as_ref().map(|id| id.0.clone()),
        installation_discount_percent: draft.installation.manual_discount_percent,
        installation_payment_method_id: draft.installation.payment_method_id.clone(),
        plan_product_id: draft.plan.product_id.as_ref().map(|id| id.0.clone()),
        plan_discount_percent: draft.plan.manual_discount_percent,
        plan_payment_method_id: draft.plan.payment_method_id.clone(),
        promotion_id: draft.selected_promotion_id.as_ref().map(|id| id.0.clone()),
        unit_count: draft.unit_count,
        validity_days: draft.validity_days,
        line_items: draft
            .line_items
            .iter()
            .map(|line| SubmissionLineItem {
                product_id: line.product_id.0.clone(),
                quantity: line.quantity,
                applies_to_all_units: line.applies_to_all_units,
                unit_price: line.unit_price,
                discount_percent: line.manual_discount_percent,
            })
            .collect(),
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub quote_id: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("submission rejected with {} field error(s)", .0.len())]
    Rejected(FieldErrors),
    #[error("submission transport failed: {0}")]
    Transport(String),
}

impl From<SubmissionError> for EngineError {
    fn from(error: SubmissionError) -> Self {
        match error {
            SubmissionError::Rejected(errors) => EngineError::SubmissionRejected(errors),
            SubmissionError::Transport(reason) => EngineError::Transport(reason),
        }
    }
}

#[async_trait]
pub trait SubmissionTransport: Send + Sync {
    async fn submit(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, SubmissionError>;
}

/// Maps server field errors back onto form fields. Messages for keys that
/// share a root (`lineItems[0].quantity`, `lineItems[1].unitPrice`) are merged.
pub fn map_field_errors(errors: &FieldErrors) -> BTreeMap<QuoteField, Vec<String>> {
    let mut mapped: BTreeMap<QuoteField, Vec<String>> = BTreeMap::new();
    for (key, messages) in errors {
        let field = QuoteField::from_payload_key(key);
        mapped.entry(field).or_default().extend(messages.iter().cloned());
    }
    mapped
}

/// In-memory transport that records every payload and answers with a fixed outcome.
pub struct RecordingTransport {
    outcome: Result<SubmissionReceipt, SubmissionError>,
    submitted: Mutex<Vec<SubmissionPayload>>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::accepting(SubmissionReceipt::default())
    }
}

impl RecordingTransport {
    pub fn accepting(receipt: SubmissionReceipt) -> Self {
        Self { outcome: Ok(receipt), submitted: Mutex::new(Vec::new()) }
    }

    pub fn rejecting(errors: FieldErrors) -> Self {
        Self { outcome: Err(SubmissionError::Rejected(errors)), submitted: Mutex::new(Vec::new()) }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(SubmissionError::Transport(reason.into())),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub async fn submitted(&self) -> Vec<SubmissionPayload> {
        self.submitted.lock().await.clone()
    }
}

#[async_trait]
impl SubmissionTransport for RecordingTransport {
    async fn submit(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        self.submitted.lock().await.push(payload.clone());
        self.outcome.clone()
    }
}
