pub mod catalog;
pub mod constraints;
pub mod locks;
pub mod pricing;
pub mod promotion;

use serde::{Deserialize, Serialize};

use crate::domain::{notification::Notification, quote::QuoteDraft};

use self::{
    catalog::{CatalogLookup, PromotionCatalog},
    constraints::{ConstraintEngine, ConstraintResult, DeterministicConstraintEngine},
    locks::{field_locks, FieldLocks},
    pricing::{DeterministicPricingEngine, PricingEngine, PricingResult},
    promotion::{DeterministicPromotionResolver, PromotionResolver, ResolvedPromotion},
};

#[derive(Clone, Copy)]
pub struct CpqEvaluationInput<'a> {
    pub draft: &'a QuoteDraft,
    pub catalog: &'a dyn CatalogLookup,
    pub promotions: &'a dyn PromotionCatalog,
}

/// Everything derived from a draft in one synchronous pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recomputation {
    pub resolved_promotion: ResolvedPromotion,
    pub pricing: PricingResult,
    pub validation: ConstraintResult,
    pub locks: FieldLocks,
    pub notices: Vec<Notification>,
}

pub trait CpqRuntime: Send + Sync {
    fn recompute(&self, input: CpqEvaluationInput<'_>) -> Recomputation;
}

pub struct DeterministicCpqRuntime<R, P, C> {
    promotion_resolver: R,
    pricing_engine: P,
    constraint_engine: C,
}

impl<R, P, C> DeterministicCpqRuntime<R, P, C> {
    pub fn new(promotion_resolver: R, pricing_engine: P, constraint_engine: C) -> Self {
        Self { promotion_resolver, pricing_engine, constraint_engine }
    }
}

impl Default
    for DeterministicCpqRuntime<
        DeterministicPromotionResolver,
        DeterministicPricingEngine,
        DeterministicConstraintEngine,
    >
{
    fn default() -> Self {
        Self::new(
            DeterministicPromotionResolver,
            DeterministicPricingEngine,
            DeterministicConstraintEngine,
        )
    }
}

impl<R, P, C> CpqRuntime for DeterministicCpqRuntime<R, P, C>
where
    R: PromotionResolver,
    P: PricingEngine,
    C: ConstraintEngine,
{
    fn recompute(&self, input: CpqEvaluationInput<'_>) -> Recomputation {
        let mut notices = Vec::new();
        let resolved_promotion = match self
            .promotion_resolver
            .resolve(input.draft.selected_promotion_id.as_ref(), input.promotions)
        {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::warn!(
                    event_name = "engine.recompute.promotion_unresolved",
                    quote_ref = %input.draft.reference_code,
                    error = %error,
                    "pricing without promotion"
                );
                notices.push(Notification::warning(format!(
                    "{error}. The quote is priced without a promotion."
                )));
                ResolvedPromotion::none()
            }
        };

        let pricing = self.pricing_engine.price(input.draft, &resolved_promotion, input.catalog);
        notices.extend(pricing.notices.iter().cloned());
        let validation = self.constraint_engine.validate(input.draft, &resolved_promotion);
        let locks = field_locks(input.draft, &resolved_promotion, input.catalog);

        Recomputation { resolved_promotion, pricing, validation, locks, notices }
    }
}
