use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cpq::catalog::CatalogLookup;
use crate::cpq::promotion::ResolvedPromotion;
use crate::domain::notification::Notification;
use crate::domain::product::{LineItemKind, ProductId};
use crate::domain::promotion::{percent_label, DiscountShape, PromotionId};
use crate::domain::quote::{LineItem, ProductSelection, QuoteDraft};
use crate::errors::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSlot {
    Installation,
    Plan,
    Accessory,
    Service,
}

impl LineSlot {
    pub fn is_recurring(self) -> bool {
        matches!(self, Self::Plan | Self::Service)
    }
}

impl From<LineItemKind> for LineSlot {
    fn from(kind: LineItemKind) -> Self {
        match kind {
            LineItemKind::Accessory => Self::Accessory,
            LineItemKind::Service => Self::Service,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    None,
    Manual,
    Promotion,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePricing {
    pub slot: LineSlot,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub base_amount: Decimal,
    pub discount_amount: Decimal,
    pub discount_label: String,
    pub discount_source: DiscountSource,
    pub final_amount: Decimal,
}

impl LinePricing {
    pub fn has_discount(&self) -> bool {
        !self.discount_label.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub quote_ref: String,
    pub steps: Vec<PricingTraceStep>,
}

/// Promotion the result was priced under, kept for display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub promotion_id: PromotionId,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub promotion: Option<AppliedPromotion>,
    pub installation: Option<LinePricing>,
    pub plan: Option<LinePricing>,
    pub accessories: Vec<LinePricing>,
    pub services: Vec<LinePricing>,
    pub one_time_investment: Decimal,
    pub recurring_monthly_cost: Decimal,
    pub first_period_total: Decimal,
    pub trace: PricingTrace,
    pub notices: Vec<Notification>,
}

impl PricingResult {
    pub fn lines(&self) -> impl Iterator<Item = &LinePricing> {
        self.installation
            .iter()
            .chain(self.plan.iter())
            .chain(self.accessories.iter())
            .chain(self.services.iter())
    }

    pub fn discount_total(&self) -> Decimal {
        self.lines().map(|line| line.discount_amount).sum()
    }
}

pub trait PricingEngine: Send + Sync {
    fn price(
        &self,
        draft: &QuoteDraft,
        promotion: &ResolvedPromotion,
        catalog: &dyn CatalogLookup,
    ) -> PricingResult;
}

#[derive(Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn price(
        &self,
        draft: &QuoteDraft,
        promotion: &ResolvedPromotion,
        catalog: &dyn CatalogLookup,
    ) -> PricingResult {
        price_draft(draft, promotion, catalog)
    }
}

/// Inputs for pricing one line, independent of where the line lives in the draft.
#[derive(Clone, Debug)]
pub struct LineInput<'a> {
    pub slot: LineSlot,
    pub product_id: &'a ProductId,
    pub product_name: &'a str,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub manual_discount_percent: Decimal,
}

/// Prices one line. Fails with [`EngineError::AmountOverflow`] when an amount leaves the
/// range `Decimal` can represent.
pub fn price_line(
    input: LineInput<'_>,
    promotion: &ResolvedPromotion,
) -> Result<LinePricing, EngineError> {
    let overflow = || EngineError::AmountOverflow(input.product_id.clone());
    let base_amount =
        input.unit_price.checked_mul(Decimal::from(input.quantity)).ok_or_else(overflow)?;

    let (discount, discount_label, discount_source) = match promotion.rule_for(input.product_id) {
        Some(rule) => (
            promotion_discount(rule.discount, input.unit_price, input.quantity, base_amount),
            rule.discount.label(),
            DiscountSource::Promotion,
        ),
        None if input.manual_discount_percent > Decimal::ZERO => (
            percent_of(base_amount, input.manual_discount_percent),
            percent_label(input.manual_discount_percent),
            DiscountSource::Manual,
        ),
        None => (Some(Decimal::ZERO), String::new(), DiscountSource::None),
    };
    let mut discount_amount = discount.ok_or_else(overflow)?;

    let mut final_amount = base_amount.checked_sub(discount_amount).ok_or_else(overflow)?;
    if final_amount < Decimal::ZERO {
        let error = EngineError::NegativeFinalAmount {
            product_id: input.product_id.clone(),
            amount: final_amount,
        };
        warn!(
            event_name = "engine.pricing.negative_final_amount",
            product_id = %input.product_id,
            base_amount = %base_amount,
            discount_amount = %discount_amount,
            error = %error,
            "final amount clamped to zero"
        );
        discount_amount = base_amount;
        final_amount = Decimal::ZERO;
    }

    Ok(LinePricing {
        slot: input.slot,
        product_id: input.product_id.clone(),
        product_name: input.product_name.to_string(),
        quantity: input.quantity,
        unit_price: input.unit_price,
        base_amount,
        discount_amount,
        discount_label,
        discount_source,
        final_amount,
    })
}

fn promotion_discount(
    shape: DiscountShape,
    unit_price: Decimal,
    quantity: u32,
    base_amount: Decimal,
) -> Option<Decimal> {
    match shape {
        DiscountShape::Percentage { percent } => percent_of(base_amount, percent),
        // every Nth unit is free
        DiscountShape::BuyNGetOneFree { group_size } => match quantity.checked_div(group_size) {
            Some(free_units) => unit_price.checked_mul(Decimal::from(free_units)),
            None => Some(Decimal::ZERO),
        },
    }
}

fn percent_of(amount: Decimal, percent: Decimal) -> Option<Decimal> {
    match amount.checked_mul(percent) {
        Some(scaled) => scaled.checked_div(Decimal::ONE_HUNDRED),
        // near the top of the range, divide first
        None => amount.checked_div(Decimal::ONE_HUNDRED)?.checked_mul(percent),
    }
}

pub fn price_draft(
    draft: &QuoteDraft,
    promotion: &ResolvedPromotion,
    catalog: &dyn CatalogLookup,
) -> PricingResult {
    let mut notices = Vec::new();
    let mut steps = Vec::new();

    let installation = price_selection(
        LineSlot::Installation,
        &draft.installation,
        draft.unit_count,
        promotion,
        catalog,
        &mut notices,
    );
    let plan = price_selection(
        LineSlot::Plan,
        &draft.plan,
        draft.unit_count,
        promotion,
        catalog,
        &mut notices,
    );
    let accessories: Vec<LinePricing> = draft
        .accessories()
        .filter_map(|line| price_line_item(line, promotion, &mut notices))
        .collect();
    let services: Vec<LinePricing> = draft
        .services()
        .filter_map(|line| price_line_item(line, promotion, &mut notices))
        .collect();

    for line in installation.iter().chain(plan.iter()).chain(&accessories).chain(&services) {
        steps.push(PricingTraceStep {
            stage: format!("{}:{}", slot_stage(line.slot), line.product_id),
            detail: trace_detail(line),
            amount: line.final_amount,
        });
    }

    let one_time_investment = capped_total(
        "one_time_investment",
        installation.iter().chain(&accessories).map(|line| line.final_amount),
        &mut notices,
    );
    let recurring_monthly_cost = capped_total(
        "recurring_monthly_cost",
        plan.iter().chain(&services).map(|line| line.final_amount),
        &mut notices,
    );
    let first_period_total = capped_total(
        "first_period_total",
        [one_time_investment, recurring_monthly_cost],
        &mut notices,
    );

    steps.push(PricingTraceStep {
        stage: "one_time_investment".to_string(),
        detail: "installation + sum(accessories)".to_string(),
        amount: one_time_investment,
    });
    steps.push(PricingTraceStep {
        stage: "recurring_monthly_cost".to_string(),
        detail: "plan + sum(services)".to_string(),
        amount: recurring_monthly_cost,
    });
    steps.push(PricingTraceStep {
        stage: "first_period_total".to_string(),
        detail: "one_time_investment + recurring_monthly_cost".to_string(),
        amount: first_period_total,
    });

    let applied = promotion.promotion_id.as_ref().map(|promotion_id| AppliedPromotion {
        promotion_id: promotion_id.clone(),
        name: promotion.name.clone().unwrap_or_else(|| promotion_id.0.clone()),
        description: promotion.description.clone(),
    });

    PricingResult {
        promotion: applied,
        installation,
        plan,
        accessories,
        services,
        one_time_investment,
        recurring_monthly_cost,
        first_period_total,
        trace: PricingTrace { quote_ref: draft.reference_code.clone(), steps },
        notices,
    }
}

fn price_selection(
    slot: LineSlot,
    selection: &ProductSelection,
    unit_count: u32,
    promotion: &ResolvedPromotion,
    catalog: &dyn CatalogLookup,
    notices: &mut Vec<Notification>,
) -> Option<LinePricing> {
    let product_id = selection.product_id.as_ref()?;
    let product = match catalog.get_product(product_id) {
        Ok(product) => product,
        Err(error) => {
            warn!(
                event_name = "engine.pricing.product_missing",
                slot = slot_stage(slot),
                product_id = %product_id,
                "selected product missing from catalog; line left unpriced"
            );
            notices.push(Notification::warning(format!("{error}; its line is not priced")));
            return None;
        }
    };

    let priced = price_line(
        LineInput {
            slot,
            product_id,
            product_name: &product.name,
            unit_price: product.unit_price,
            quantity: unit_count,
            manual_discount_percent: selection.manual_discount_percent,
        },
        promotion,
    );
    priced_or_notice(priced, slot, notices)
}

fn price_line_item(
    line: &LineItem,
    promotion: &ResolvedPromotion,
    notices: &mut Vec<Notification>,
) -> Option<LinePricing> {
    let slot = LineSlot::from(line.kind);
    let priced = price_line(
        LineInput {
            slot,
            product_id: &line.product_id,
            product_name: &line.name,
            unit_price: line.unit_price,
            quantity: line.quantity,
            manual_discount_percent: line.manual_discount_percent,
        },
        promotion,
    );
    priced_or_notice(priced, slot, notices)
}

fn priced_or_notice(
    priced: Result<LinePricing, EngineError>,
    slot: LineSlot,
    notices: &mut Vec<Notification>,
) -> Option<LinePricing> {
    match priced {
        Ok(line) => Some(line),
        Err(error) => {
            warn!(
                event_name = "engine.pricing.line_overflow",
                slot = slot_stage(slot),
                error = %error,
                "line amount out of range; line left unpriced"
            );
            notices.push(Notification::warning(format!("{error}; its line is not priced")));
            None
        }
    }
}

/// Sums `amounts`, saturating at the `Decimal` bounds with a notice instead of panicking.
fn capped_total(
    stage: &'static str,
    amounts: impl IntoIterator<Item = Decimal>,
    notices: &mut Vec<Notification>,
) -> Decimal {
    let mut total = Decimal::ZERO;
    let mut capped = false;
    for amount in amounts {
        match total.checked_add(amount) {
            Some(sum) => total = sum,
            None => {
                capped = true;
                total = total.saturating_add(amount);
            }
        }
    }
    if capped {
        warn!(event_name = "engine.pricing.total_capped", stage, "aggregate saturated");
        notices.push(Notification::warning(format!(
            "The {} is too large to compute exactly and was capped",
            stage.replace('_', " ")
        )));
    }
    total
}

fn slot_stage(slot: LineSlot) -> &'static str {
    match slot {
        LineSlot::Installation => "installation",
        LineSlot::Plan => "plan",
        LineSlot::Accessory => "accessory",
        LineSlot::Service => "service",
    }
}

fn trace_detail(line: &LinePricing) -> String {
    if line.has_discount() {
        format!(
            "{} x {} = {} - {} ({})",
            line.unit_price,
            line.quantity,
            line.base_amount,
            line.discount_amount,
            line.discount_label
        )
    } else {
        format!("{} x {} = {}", line.unit_price, line.quantity, line.base_amount)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        price_draft, price_line, DeterministicPricingEngine, DiscountSource, LineInput,
        LinePricing, LineSlot, PricingEngine,
    };
    use crate::cpq::catalog::InMemoryCatalog;
    use crate::cpq::promotion::ResolvedPromotion;
    use crate::domain::notification::NotificationKind;
    use crate::domain::product::{LineItemKind, Product, ProductCategory, ProductId};
    use crate::domain::promotion::{DiscountShape, Promotion, PromotionId, PromotionRule};
    use crate::domain::quote::{LineItem, ProductSelection, QuoteDraft};
    use crate::errors::EngineError;

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn catalog() -> InMemoryCatalog {
        let product = |id: &str, price: i64, category| Product {
            id: ProductId::new(id),
            name: id.to_uppercase(),
            unit_price: dec(price),
            category,
        };
        InMemoryCatalog::new(
            vec![
                product("a", 1000, ProductCategory::InstallationFee),
                product("b", 500, ProductCategory::PlanConvenant),
                product("c", 200, ProductCategory::Accessory),
            ],
            Vec::new(),
        )
        .expect("fixture catalog is valid")
    }

    fn promotion(rules: Vec<(&str, u32, DiscountShape)>) -> ResolvedPromotion {
        ResolvedPromotion::from_promotion(&Promotion {
            id: PromotionId::new("P"),
            name: "P".to_string(),
            description: None,
            rules: rules
                .into_iter()
                .map(|(product, minimum_unit_count, discount)| PromotionRule {
                    product_id: ProductId::new(product),
                    minimum_unit_count,
                    discount,
                })
                .collect(),
        })
    }

    fn selection(product: &str, manual_percent: Decimal) -> ProductSelection {
        ProductSelection {
            product_id: Some(ProductId::new(product)),
            manual_discount_percent: manual_percent,
            payment_method_id: Some("card".to_string()),
        }
    }

    fn line_item(product: &str, price: i64, quantity: u32) -> LineItem {
        LineItem {
            product_id: ProductId::new(product),
            name: product.to_string(),
            kind: LineItemKind::Accessory,
            quantity,
            unit_price: dec(price),
            manual_discount_percent: Decimal::ZERO,
            applies_to_all_units: false,
            computed_subtotal: Decimal::ZERO,
        }
    }

    fn priced(input: LineInput<'_>, promotion: &ResolvedPromotion) -> LinePricing {
        price_line(input, promotion).expect("fixture amounts are in range")
    }

    fn input(product_id: &ProductId, price: i64, quantity: u32, manual: Decimal) -> LineInput<'_> {
        LineInput {
            slot: LineSlot::Accessory,
            product_id,
            product_name: "line",
            unit_price: dec(price),
            quantity,
            manual_discount_percent: manual,
        }
    }

    #[test]
    fn installation_promotion_scenario_produces_expected_aggregates() {
        let draft = QuoteDraft {
            unit_count: 3,
            installation: selection("a", Decimal::ZERO),
            plan: selection("b", Decimal::ZERO),
            selected_promotion_id: Some(PromotionId::new("P")),
            ..QuoteDraft::default()
        };
        let resolved = promotion(vec![("a", 3, DiscountShape::percentage(Decimal::TEN))]);

        let result = price_draft(&draft, &resolved, &catalog());

        let installation = result.installation.as_ref().expect("installation priced");
        assert_eq!(installation.base_amount, dec(3000));
        assert_eq!(installation.final_amount, dec(2700));
        assert_eq!(installation.discount_label, "10% OFF");
        assert_eq!(installation.discount_source, DiscountSource::Promotion);

        let plan = result.plan.as_ref().expect("plan priced");
        assert_eq!(plan.final_amount, dec(1500));
        assert_eq!(plan.discount_label, "");

        assert_eq!(result.one_time_investment, dec(2700));
        assert_eq!(result.recurring_monthly_cost, dec(1500));
        assert_eq!(result.first_period_total, dec(4200));
        assert!(result.notices.is_empty());
    }

    #[test]
    fn bulk_promotion_frees_every_nth_unit() {
        let draft = QuoteDraft {
            line_items: vec![line_item("c", 200, 4)],
            ..QuoteDraft::default()
        };
        let resolved = promotion(vec![("c", 0, DiscountShape::buy_n_get_one_free(2))]);

        let result = price_draft(&draft, &resolved, &catalog());
        let line = &result.accessories[0];

        assert_eq!(line.discount_amount, dec(400));
        assert_eq!(line.final_amount, dec(400));
        assert_eq!(line.discount_label, "2x1");
        assert_eq!(result.one_time_investment, dec(400));
    }

    #[test]
    fn bulk_promotion_below_group_size_gives_nothing_free() {
        let resolved = promotion(vec![("c", 0, DiscountShape::buy_n_get_one_free(3))]);
        let id = ProductId::new("c");
        for quantity in 0..3 {
            let line = priced(input(&id, 200, quantity, Decimal::ZERO), &resolved);
            assert_eq!(line.discount_amount, Decimal::ZERO);
            assert_eq!(line.discount_label, "3x2");
        }
        let seven = priced(input(&id, 200, 7, Decimal::ZERO), &resolved);
        assert_eq!(seven.discount_amount, dec(400));
        assert_eq!(seven.final_amount, dec(1000));
    }

    #[test]
    fn promotion_rule_overrides_manual_discount() {
        let resolved = promotion(vec![("c", 0, DiscountShape::percentage(Decimal::new(25, 0)))]);
        let id = ProductId::new("c");
        let line = priced(input(&id, 100, 2, dec(50)), &resolved);

        assert_eq!(line.discount_amount, dec(50));
        assert_eq!(line.discount_label, "25% OFF");
    }

    #[test]
    fn manual_discount_applies_to_uncovered_lines() {
        let draft = QuoteDraft {
            unit_count: 2,
            plan: selection("b", dec(7)),
            ..QuoteDraft::default()
        };
        let result = price_draft(&draft, &ResolvedPromotion::none(), &catalog());
        let plan = result.plan.as_ref().expect("plan priced");

        assert_eq!(plan.final_amount, dec(500) * Decimal::new(93, 2) * dec(2));
        assert_eq!(plan.discount_label, "7% OFF");
        assert_eq!(plan.discount_source, DiscountSource::Manual);
    }

    #[test]
    fn undiscounted_lines_price_at_unit_price_times_quantity() {
        let id = ProductId::new("z");
        for (price, quantity) in [(1, 1), (199, 3), (12_345, 17)] {
            let line =
                priced(input(&id, price, quantity, Decimal::ZERO), &ResolvedPromotion::none());
            assert_eq!(line.final_amount, dec(price) * Decimal::from(quantity));
            assert_eq!(line.discount_source, DiscountSource::None);
        }
    }

    #[test]
    fn percentage_results_are_exact_without_intermediate_rounding() {
        let resolved =
            promotion(vec![("c", 0, DiscountShape::percentage(Decimal::new(3333, 2)))]);
        let id = ProductId::new("c");
        let line = priced(
            LineInput { unit_price: Decimal::new(1999, 2), ..input(&id, 0, 3, Decimal::ZERO) },
            &resolved,
        );

        let expected = line.base_amount * (Decimal::ONE - Decimal::new(3333, 4));
        assert_eq!(line.final_amount, expected);
        assert_eq!(line.final_amount, Decimal::new(39_981_999, 6));
    }

    #[test]
    fn oversized_manual_discount_clamps_final_amount_at_zero() {
        let id = ProductId::new("c");
        let line = priced(input(&id, 100, 1, dec(150)), &ResolvedPromotion::none());

        assert_eq!(line.final_amount, Decimal::ZERO);
        assert_eq!(line.discount_amount, line.base_amount);
    }

    #[test]
    fn out_of_range_line_is_left_unpriced_with_notice() {
        let id = ProductId::new("c");
        let huge = LineInput { unit_price: Decimal::MAX, ..input(&id, 0, 3, Decimal::ZERO) };
        assert_eq!(
            price_line(huge, &ResolvedPromotion::none()),
            Err(EngineError::AmountOverflow(id.clone()))
        );

        let mut oversized = line_item("c", 0, 3);
        oversized.unit_price = Decimal::MAX;
        let draft = QuoteDraft {
            installation: selection("a", Decimal::ZERO),
            line_items: vec![oversized],
            ..QuoteDraft::default()
        };
        let result = price_draft(&draft, &ResolvedPromotion::none(), &catalog());

        assert!(result.accessories.is_empty());
        assert_eq!(result.one_time_investment, dec(1000));
        assert_eq!(result.notices.len(), 1);
        assert_eq!(result.notices[0].kind, NotificationKind::Warning);
    }

    #[test]
    fn percentage_discount_near_the_top_of_the_range_still_prices() {
        let resolved = promotion(vec![("c", 0, DiscountShape::percentage(Decimal::TEN))]);
        let id = ProductId::new("c");
        let line = priced(
            LineInput { unit_price: Decimal::MAX, ..input(&id, 0, 1, Decimal::ZERO) },
            &resolved,
        );

        assert_eq!(line.base_amount, Decimal::MAX);
        assert!(line.final_amount < Decimal::MAX);
        assert!(line.final_amount > Decimal::ZERO);
    }

    #[test]
    fn aggregate_overflow_is_capped_with_notice() {
        let mut first = line_item("c", 0, 1);
        first.unit_price = Decimal::MAX;
        let mut second = line_item("c2", 0, 1);
        second.unit_price = Decimal::MAX;
        let draft = QuoteDraft { line_items: vec![first, second], ..QuoteDraft::default() };

        let result = price_draft(&draft, &ResolvedPromotion::none(), &catalog());

        assert_eq!(result.accessories.len(), 2);
        assert_eq!(result.one_time_investment, Decimal::MAX);
        assert_eq!(result.first_period_total, Decimal::MAX);
        assert_eq!(result.notices.len(), 1);
        assert_eq!(result.notices[0].kind, NotificationKind::Warning);
    }

    #[test]
    fn missing_catalog_product_leaves_line_unpriced_with_notice() {
        let draft =
            QuoteDraft { installation: selection("ghost", Decimal::ZERO), ..QuoteDraft::default() };
        let result = price_draft(&draft, &ResolvedPromotion::none(), &catalog());

        assert!(result.installation.is_none());
        assert_eq!(result.one_time_investment, Decimal::ZERO);
        assert_eq!(result.notices.len(), 1);
        assert_eq!(result.notices[0].kind, NotificationKind::Warning);
    }

    #[test]
    fn pricing_is_idempotent_for_an_unchanged_draft() {
        let draft = QuoteDraft {
            unit_count: 5,
            installation: selection("a", dec(3)),
            plan: selection("b", Decimal::ZERO),
            line_items: vec![line_item("c", 200, 4)],
            ..QuoteDraft::default()
        };
        let resolved = promotion(vec![("c", 0, DiscountShape::buy_n_get_one_free(2))]);
        let engine = DeterministicPricingEngine;
        let catalog = catalog();

        let first = engine.price(&draft, &resolved, &catalog);
        let second = engine.price(&draft, &resolved, &catalog);
        assert_eq!(first, second);
        assert_eq!(first.trace.steps.len(), 6);
    }
}
