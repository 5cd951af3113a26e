use rust_decimal::Decimal;
use thiserror::Error;

use crate::cpq::constraints::ValidationRule;
use crate::domain::product::ProductId;
use crate::domain::promotion::PromotionId;
use crate::submission::FieldErrors;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid discount: {0}")]
    InvalidDiscount(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure kinds raised by the quoting engine itself.
///
/// Lookup failures are recoverable: callers degrade to "absent" and surface a notice.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("catalog product `{0}` was not found")]
    CatalogProductNotFound(ProductId),
    #[error("promotion `{0}` was not found")]
    PromotionNotFound(PromotionId),
    #[error("quote validation failed: {0}")]
    ValidationFailed(ValidationRule),
    #[error("line `{product_id}` computed a negative final amount ({amount})")]
    NegativeFinalAmount { product_id: ProductId, amount: Decimal },
    #[error("line `{0}` amount is outside the supported range")]
    AmountOverflow(ProductId),
    #[error("submission rejected with {} field error(s)", .0.len())]
    SubmissionRejected(FieldErrors),
    #[error("submission transport failure: {0}")]
    Transport(String),
}

impl EngineError {
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CatalogProductNotFound(_)
                | Self::PromotionNotFound(_)
                | Self::NegativeFinalAmount { .. }
                | Self::AmountOverflow(_)
                | Self::Transport(_)
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("catalog failure: {0}")]
    Catalog(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The quote could not be processed. Check the highlighted fields and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The quote service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Engine(
                error @ (EngineError::ValidationFailed(_)
                | EngineError::SubmissionRejected(_)
                | EngineError::CatalogProductNotFound(_)
                | EngineError::PromotionNotFound(_)),
            ) => Self::BadRequest { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Engine(error @ EngineError::Transport(_)) => {
                let message = error.to_string();
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Engine(
                error @ (EngineError::NegativeFinalAmount { .. } | EngineError::AmountOverflow(_)),
            ) => {
                Self::Internal { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Catalog(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}
