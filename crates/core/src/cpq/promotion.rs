//! Promotion resolution and application.
//!
//! Resolution is a pure fold over a promotion's rules. Application rewrites the
//! promotable parts of a draft (installation, plan, line items, unit count) and
//! reports what happened as notifications.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cpq::catalog::{CatalogLookup, PromotionCatalog};
use crate::domain::notification::Notification;
use crate::domain::product::{LineItemKind, ProductCategory, ProductId};
use crate::domain::promotion::{Promotion, PromotionId, PromotionRule};
use crate::domain::quote::{LineItem, QuoteDraft};
use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPromotion {
    pub promotion_id: Option<PromotionId>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub covered_product_ids: BTreeSet<ProductId>,
    pub minimum_unit_count: u32,
    pub rules_by_product_id: BTreeMap<ProductId, PromotionRule>,
}

impl Default for ResolvedPromotion {
    fn default() -> Self {
        Self::none()
    }
}

impl ResolvedPromotion {
    /// Empty coverage with the neutral minimum of one unit.
    pub fn none() -> Self {
        Self {
            promotion_id: None,
            name: None,
            description: None,
            covered_product_ids: BTreeSet::new(),
            minimum_unit_count: 1,
            rules_by_product_id: BTreeMap::new(),
        }
    }

    pub fn from_promotion(promotion: &Promotion) -> Self {
        let mut resolved = Self {
            promotion_id: Some(promotion.id.clone()),
            name: Some(promotion.name.clone()),
            description: promotion.description.clone(),
            ..Self::none()
        };

        for rule in &promotion.rules {
            resolved.minimum_unit_count = resolved.minimum_unit_count.max(rule.minimum_unit_count);
            resolved.covered_product_ids.insert(rule.product_id.clone());
            resolved.rules_by_product_id.insert(rule.product_id.clone(), rule.clone());
        }

        resolved
    }

    pub fn is_active(&self) -> bool {
        self.promotion_id.is_some()
    }

    pub fn covers(&self, product_id: &ProductId) -> bool {
        self.covered_product_ids.contains(product_id)
    }

    pub fn rule_for(&self, product_id: &ProductId) -> Option<&PromotionRule> {
        self.rules_by_product_id.get(product_id)
    }
}

pub trait PromotionResolver: Send + Sync {
    fn resolve(
        &self,
        promotion_id: Option<&PromotionId>,
        promotions: &dyn PromotionCatalog,
    ) -> Result<ResolvedPromotion, EngineError>;
}

#[derive(Default)]
pub struct DeterministicPromotionResolver;

impl PromotionResolver for DeterministicPromotionResolver {
    fn resolve(
        &self,
        promotion_id: Option<&PromotionId>,
        promotions: &dyn PromotionCatalog,
    ) -> Result<ResolvedPromotion, EngineError> {
        resolve_promotion(promotion_id, promotions)
    }
}

pub fn resolve_promotion(
    promotion_id: Option<&PromotionId>,
    promotions: &dyn PromotionCatalog,
) -> Result<ResolvedPromotion, EngineError> {
    match promotion_id {
        None => Ok(ResolvedPromotion::none()),
        Some(id) => {
            let promotion = promotions.get_promotion(id)?;
            Ok(ResolvedPromotion::from_promotion(&promotion))
        }
    }
}

/// Resolves a promotion, degrading an unknown id to "no promotion" plus a warning.
pub fn resolve_or_degrade(
    promotion_id: Option<&PromotionId>,
    promotions: &dyn PromotionCatalog,
) -> (ResolvedPromotion, Option<Notification>) {
    match resolve_promotion(promotion_id, promotions) {
        Ok(resolved) => (resolved, None),
        Err(error) => {
            warn!(
                event_name = "engine.promotion.unresolved",
                promotion_id = promotion_id.map(|id| id.0.as_str()).unwrap_or("none"),
                error = %error,
                "promotion lookup failed; continuing without promotion"
            );
            (
                ResolvedPromotion::none(),
                Some(Notification::warning(format!(
                    "{error}. The quote is priced without a promotion."
                ))),
            )
        }
    }
}

/// Rewrites the draft from a promotion's rules.
///
/// Line items are replaced wholesale, not merged. The caller owns baseline
/// restoration; this function only writes.
pub fn apply_promotion(
    draft: &mut QuoteDraft,
    promotion: &Promotion,
    catalog: &dyn CatalogLookup,
) -> Vec<Notification> {
    let mut notifications = Vec::new();
    let mut minimum_units = 1u32;
    let mut accessories = Vec::new();
    let mut services = Vec::new();

    for rule in &promotion.rules {
        minimum_units = minimum_units.max(rule.minimum_unit_count);

        let product = match catalog.get_product(&rule.product_id) {
            Ok(product) => product,
            Err(error) => {
                warn!(
                    event_name = "engine.promotion.rule_skipped",
                    promotion_id = %promotion.id,
                    product_id = %rule.product_id,
                    error = %error,
                    "promotion rule references a product missing from the catalog"
                );
                notifications.push(Notification::warning(format!(
                    "{error}; promotion rule for it was skipped"
                )));
                continue;
            }
        };

        let discount_percent = rule.discount.as_manual_percent();
        match product.category {
            ProductCategory::InstallationFee => {
                draft.installation.product_id = Some(rule.product_id.clone());
                draft.installation.manual_discount_percent = discount_percent;
            }
            ProductCategory::MonthlyPlan | ProductCategory::PlanConvenant => {
                draft.plan.product_id = Some(rule.product_id.clone());
                draft.plan.manual_discount_percent = discount_percent;
            }
            ProductCategory::Accessory | ProductCategory::RecurringService => {
                let kind = product.category.line_item_kind().unwrap_or(LineItemKind::Accessory);
                let line = LineItem {
                    product_id: rule.product_id.clone(),
                    name: product.name.clone(),
                    kind,
                    quantity: rule.minimum_unit_count.max(1),
                    unit_price: product.unit_price,
                    manual_discount_percent: discount_percent,
                    applies_to_all_units: false,
                    computed_subtotal: Decimal::ZERO,
                };
                match kind {
                    LineItemKind::Accessory => accessories.push(line),
                    LineItemKind::Service => services.push(line),
                }
            }
        }
    }

    accessories.extend(services);
    draft.line_items = accessories;

    if minimum_units > 1 {
        draft.unit_count = minimum_units;
    }
    draft.selected_promotion_id = Some(promotion.id.clone());

    info!(
        event_name = "engine.promotion.applied",
        promotion_id = %promotion.id,
        quote_ref = %draft.reference_code,
        rule_count = promotion.rules.len(),
        unit_count = draft.unit_count,
        "promotion applied to draft"
    );
    notifications.push(Notification::success(format!("Promotion \"{}\" applied", promotion.name)));
    notifications
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{apply_promotion, resolve_or_degrade, resolve_promotion, ResolvedPromotion};
    use crate::cpq::catalog::{InMemoryCatalog, PromotionCatalog};
    use crate::domain::notification::NotificationKind;
    use crate::domain::product::{LineItemKind, Product, ProductCategory, ProductId};
    use crate::domain::promotion::{DiscountShape, Promotion, PromotionId, PromotionRule};
    use crate::domain::quote::{LineItem, QuoteDraft};
    use crate::errors::EngineError;

    fn product(id: &str, price: i64, category: ProductCategory) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("{id} name"),
            unit_price: Decimal::new(price, 0),
            category,
        }
    }

    fn rule(product: &str, minimum: u32, discount: DiscountShape) -> PromotionRule {
        PromotionRule { product_id: ProductId::new(product), minimum_unit_count: minimum, discount }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(
            vec![
                product("inst-a", 1000, ProductCategory::InstallationFee),
                product("plan-b", 500, ProductCategory::PlanConvenant),
                product("acc-c", 200, ProductCategory::Accessory),
                product("svc-d", 50, ProductCategory::RecurringService),
            ],
            vec![
                Promotion {
                    id: PromotionId::new("P"),
                    name: "Fleet ten".to_string(),
                    description: Some("10% off installation".to_string()),
                    rules: vec![rule("inst-a", 3, DiscountShape::percentage(Decimal::TEN))],
                },
                Promotion {
                    id: PromotionId::new("BUNDLE"),
                    name: "Bundle".to_string(),
                    description: None,
                    rules: vec![
                        rule("svc-d", 0, DiscountShape::percentage(Decimal::new(20, 0))),
                        rule("acc-c", 4, DiscountShape::buy_n_get_one_free(2)),
                        rule("plan-b", 2, DiscountShape::percentage(Decimal::new(5, 0))),
                    ],
                },
            ],
        )
        .expect("fixture catalog is valid")
    }

    #[test]
    fn no_selection_resolves_to_neutral_coverage() {
        let resolved = resolve_promotion(None, &catalog()).expect("no promotion always resolves");
        assert_eq!(resolved, ResolvedPromotion::none());
        assert_eq!(resolved.minimum_unit_count, 1);
        assert!(!resolved.is_active());
    }

    #[test]
    fn resolution_takes_the_largest_rule_minimum() {
        let resolved = resolve_promotion(Some(&PromotionId::new("BUNDLE")), &catalog())
            .expect("bundle exists");

        assert_eq!(resolved.minimum_unit_count, 4);
        assert_eq!(resolved.covered_product_ids.len(), 3);
        assert!(resolved.covers(&ProductId::new("acc-c")));
        assert_eq!(
            resolved.rule_for(&ProductId::new("acc-c")).map(|rule| rule.discount),
            Some(DiscountShape::buy_n_get_one_free(2))
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let catalog = catalog();
        let id = PromotionId::new("P");
        assert_eq!(
            resolve_promotion(Some(&id), &catalog),
            resolve_promotion(Some(&id), &catalog)
        );
    }

    #[test]
    fn unknown_promotion_fails_then_degrades_with_warning() {
        let id = PromotionId::new("P-404");
        assert_eq!(
            resolve_promotion(Some(&id), &catalog()),
            Err(EngineError::PromotionNotFound(id.clone()))
        );

        let (resolved, notice) = resolve_or_degrade(Some(&id), &catalog());
        assert_eq!(resolved, ResolvedPromotion::none());
        assert!(matches!(notice, Some(ref n) if n.kind == NotificationKind::Warning));
    }

    #[test]
    fn applying_dispatches_rules_by_category_and_resets_line_items() {
        let catalog = catalog();
        let promotion =
            catalog.get_promotion(&PromotionId::new("BUNDLE")).expect("bundle exists");

        let mut draft = QuoteDraft {
            line_items: vec![LineItem {
                product_id: ProductId::new("manual-extra"),
                name: "Manual".to_string(),
                kind: LineItemKind::Accessory,
                quantity: 1,
                unit_price: Decimal::ONE,
                manual_discount_percent: Decimal::ZERO,
                applies_to_all_units: false,
                computed_subtotal: Decimal::ZERO,
            }],
            ..QuoteDraft::default()
        };

        let notifications = apply_promotion(&mut draft, &promotion, &catalog);

        assert_eq!(draft.plan.product_id, Some(ProductId::new("plan-b")));
        assert_eq!(draft.plan.manual_discount_percent, Decimal::new(5, 0));
        assert_eq!(draft.unit_count, 4);
        assert_eq!(draft.selected_promotion_id, Some(PromotionId::new("BUNDLE")));

        // accessories first, then services, manual line discarded
        let ids: Vec<&str> = draft.line_items.iter().map(|line| line.product_id.as_str()).collect();
        assert_eq!(ids, vec!["acc-c", "svc-d"]);
        assert_eq!(draft.line_items[0].quantity, 4);
        assert_eq!(draft.line_items[0].unit_price, Decimal::new(200, 0));
        assert_eq!(draft.line_items[0].manual_discount_percent, Decimal::ZERO);
        assert_eq!(draft.line_items[1].quantity, 1);
        assert_eq!(draft.line_items[1].kind, LineItemKind::Service);

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Success);
    }

    #[test]
    fn rules_for_unknown_products_are_skipped_with_warning() {
        let catalog = catalog();
        let promotion = Promotion {
            id: PromotionId::new("GHOST"),
            name: "Ghost".to_string(),
            description: None,
            rules: vec![rule("missing", 2, DiscountShape::percentage(Decimal::TEN))],
        };
        let mut draft = QuoteDraft::default();

        let notifications = apply_promotion(&mut draft, &promotion, &catalog);

        assert_eq!(draft.unit_count, 2, "minimum still applies");
        assert!(draft.line_items.is_empty());
        assert_eq!(notifications[0].kind, NotificationKind::Warning);
        assert_eq!(notifications[1].kind, NotificationKind::Success);
    }
}
