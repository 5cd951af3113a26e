use serde::{Deserialize, Serialize};

use crate::cpq::catalog::CatalogLookup;
use crate::cpq::promotion::ResolvedPromotion;
use crate::domain::product::{ProductCategory, ProductId};
use crate::domain::quote::{QuoteDraft, QuoteField};

/// Which product slots are driven by the selected promotion.
///
/// A lock is advisory: the draft still accepts writes from promotion
/// application, only user edits are expected to be refused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLocks {
    pub installation: bool,
    pub plan: bool,
}

impl FieldLocks {
    pub fn is_locked(&self, field: &QuoteField) -> bool {
        match field {
            QuoteField::InstallationProduct | QuoteField::InstallationDiscount => self.installation,
            QuoteField::PlanProduct | QuoteField::PlanDiscount => self.plan,
            _ => false,
        }
    }

    pub fn locked_fields(&self) -> Vec<QuoteField> {
        let mut fields = Vec::new();
        if self.installation {
            fields.extend([QuoteField::InstallationProduct, QuoteField::InstallationDiscount]);
        }
        if self.plan {
            fields.extend([QuoteField::PlanProduct, QuoteField::PlanDiscount]);
        }
        fields
    }
}

pub fn field_locks(
    draft: &QuoteDraft,
    promotion: &ResolvedPromotion,
    catalog: &dyn CatalogLookup,
) -> FieldLocks {
    if draft.selected_promotion_id.is_none() || !promotion.is_active() {
        return FieldLocks::default();
    }

    FieldLocks {
        installation: slot_is_promoted(
            draft.installation.product_id.as_ref(),
            promotion,
            catalog,
            ProductCategory::is_installation,
        ),
        plan: slot_is_promoted(
            draft.plan.product_id.as_ref(),
            promotion,
            catalog,
            ProductCategory::is_plan,
        ),
    }
}

pub fn is_field_locked(
    draft: &QuoteDraft,
    promotion: &ResolvedPromotion,
    catalog: &dyn CatalogLookup,
    field: &QuoteField,
) -> bool {
    field_locks(draft, promotion, catalog).is_locked(field)
}

fn slot_is_promoted(
    selected: Option<&ProductId>,
    promotion: &ResolvedPromotion,
    catalog: &dyn CatalogLookup,
    in_slot: fn(ProductCategory) -> bool,
) -> bool {
    if selected.is_some_and(|product_id| promotion.covers(product_id)) {
        return true;
    }

    promotion.covered_product_ids.iter().any(|product_id| {
        catalog.get_product(product_id).map(|product| in_slot(product.category)).unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{field_locks, is_field_locked, FieldLocks};
    use crate::cpq::catalog::InMemoryCatalog;
    use crate::cpq::promotion::ResolvedPromotion;
    use crate::domain::product::{Product, ProductCategory, ProductId};
    use crate::domain::promotion::{DiscountShape, Promotion, PromotionId, PromotionRule};
    use crate::domain::quote::{ProductSelection, QuoteDraft, QuoteField};

    fn catalog() -> InMemoryCatalog {
        let product = |id: &str, category| Product {
            id: ProductId::new(id),
            name: id.to_string(),
            unit_price: Decimal::ONE,
            category,
        };
        InMemoryCatalog::new(
            vec![
                product("inst-a", ProductCategory::InstallationFee),
                product("inst-b", ProductCategory::InstallationFee),
                product("plan-m", ProductCategory::MonthlyPlan),
                product("acc-c", ProductCategory::Accessory),
            ],
            Vec::new(),
        )
        .expect("fixture catalog is valid")
    }

    fn resolved(products: &[&str]) -> ResolvedPromotion {
        ResolvedPromotion::from_promotion(&Promotion {
            id: PromotionId::new("P"),
            name: "P".to_string(),
            description: None,
            rules: products
                .iter()
                .map(|product| PromotionRule {
                    product_id: ProductId::new(*product),
                    minimum_unit_count: 1,
                    discount: DiscountShape::percentage(Decimal::TEN),
                })
                .collect(),
        })
    }

    fn draft_with_promotion(installation: &str) -> QuoteDraft {
        QuoteDraft {
            installation: ProductSelection {
                product_id: Some(ProductId::new(installation)),
                ..ProductSelection::default()
            },
            selected_promotion_id: Some(PromotionId::new("P")),
            ..QuoteDraft::default()
        }
    }

    #[test]
    fn nothing_is_locked_without_a_selected_promotion() {
        let draft = QuoteDraft::default();
        assert_eq!(field_locks(&draft, &resolved(&["inst-a"]), &catalog()), FieldLocks::default());
    }

    #[test]
    fn installation_fields_lock_when_promotion_covers_installation_category() {
        let draft = draft_with_promotion("inst-b");
        let promotion = resolved(&["inst-a"]);
        let catalog = catalog();

        assert!(is_field_locked(&draft, &promotion, &catalog, &QuoteField::InstallationProduct));
        assert!(is_field_locked(&draft, &promotion, &catalog, &QuoteField::InstallationDiscount));
        assert!(!is_field_locked(&draft, &promotion, &catalog, &QuoteField::PlanProduct));
        assert!(!is_field_locked(
            &draft,
            &promotion,
            &catalog,
            &QuoteField::InstallationPaymentMethod
        ));
    }

    #[test]
    fn accessory_only_promotions_leave_slots_editable() {
        let draft = draft_with_promotion("inst-a");
        let locks = field_locks(&draft, &resolved(&["acc-c"]), &catalog());
        assert!(locks.locked_fields().is_empty());
    }

    #[test]
    fn plan_lock_covers_monthly_plans() {
        let draft = draft_with_promotion("inst-a");
        let locks = field_locks(&draft, &resolved(&["plan-m"]), &catalog());
        assert!(locks.plan);
        assert!(!locks.installation);
        assert_eq!(locks.locked_fields(), vec![QuoteField::PlanProduct, QuoteField::PlanDiscount]);
    }

    #[test]
    fn locks_are_recomputed_from_current_state() {
        let mut draft = draft_with_promotion("inst-a");
        let promotion = resolved(&["inst-a"]);
        let catalog = catalog();
        assert!(field_locks(&draft, &promotion, &catalog).installation);

        draft.selected_promotion_id = None;
        assert!(!field_locks(&draft, &promotion, &catalog).installation);
    }
}
