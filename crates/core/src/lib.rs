pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod session;
pub mod submission;
pub mod summary;

pub use cpq::catalog::{CatalogError, CatalogLookup, InMemoryCatalog, PromotionCatalog};
pub use cpq::constraints::{ConstraintResult, ConstraintViolation, ValidationRule};
pub use cpq::locks::FieldLocks;
pub use cpq::pricing::{LinePricing, PricingResult};
pub use cpq::promotion::ResolvedPromotion;
pub use cpq::{CpqRuntime, DeterministicCpqRuntime, Recomputation};
pub use domain::notification::{Notification, NotificationKind};
pub use domain::product::{Product, ProductCategory, ProductId};
pub use domain::promotion::{DiscountShape, Promotion, PromotionId, PromotionRule};
pub use domain::quote::{LineItem, ProductSelection, QuoteDraft, QuoteField};
pub use errors::{ApplicationError, DomainError, EngineError, InterfaceError};
pub use session::{EditingSession, SubmitError};
pub use submission::{
    FieldErrors, RecordingTransport, SubmissionError, SubmissionPayload, SubmissionReceipt,
    SubmissionTransport,
};
pub use summary::{render_summary, SummaryOptions};
