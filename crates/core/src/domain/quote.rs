use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{LineItemKind, ProductId};
use crate::domain::promotion::PromotionId;

pub const DEFAULT_VALIDITY_DAYS: u32 = 15;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientContact {
    pub first_name: String,
    pub phone: Option<String>,
}

impl ClientContact {
    /// A quote can only be messaged out when a non-blank phone number exists.
    pub fn contact_phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|phone| !phone.is_empty())
    }
}

/// The installation slot and the plan slot share the same shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSelection {
    pub product_id: Option<ProductId>,
    pub manual_discount_percent: Decimal,
    pub payment_method_id: Option<String>,
}

impl ProductSelection {
    pub fn has_payment_method(&self) -> bool {
        self.payment_method_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub name: String,
    pub kind: LineItemKind,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub manual_discount_percent: Decimal,
    #[serde(default)]
    pub applies_to_all_units: bool,
    #[serde(default)]
    pub computed_subtotal: Decimal,
}

/// Form fields addressable by locks, validation failures and server-side field errors.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteField {
    InstallationAssignee,
    InstallationProduct,
    InstallationDiscount,
    InstallationPaymentMethod,
    PlanProduct,
    PlanDiscount,
    PlanPaymentMethod,
    Promotion,
    UnitCount,
    ValidityDays,
    LineItems,
    Other(String),
}

impl QuoteField {
    /// Key used for this field in the submission payload.
    pub fn payload_key(&self) -> &str {
        match self {
            Self::InstallationAssignee => "installationAssigneeId",
            Self::InstallationProduct => "installationProductId",
            Self::InstallationDiscount => "installationDiscountPercent",
            Self::InstallationPaymentMethod => "installationPaymentMethodId",
            Self::PlanProduct => "planProductId",
            Self::PlanDiscount => "planDiscountPercent",
            Self::PlanPaymentMethod => "planPaymentMethodId",
            Self::Promotion => "promotionId",
            Self::UnitCount => "unitCount",
            Self::ValidityDays => "validityDays",
            Self::LineItems => "lineItems",
            Self::Other(key) => key.as_str(),
        }
    }

    pub fn from_payload_key(key: &str) -> Self {
        let root = key.split(['.', '[']).next().unwrap_or(key);
        match root {
            "installationAssigneeId" => Self::InstallationAssignee,
            "installationProductId" => Self::InstallationProduct,
            "installationDiscountPercent" => Self::InstallationDiscount,
            "installationPaymentMethodId" => Self::InstallationPaymentMethod,
            "planProductId" => Self::PlanProduct,
            "planDiscountPercent" => Self::PlanDiscount,
            "planPaymentMethodId" => Self::PlanPaymentMethod,
            "promotionId" => Self::Promotion,
            "unitCount" => Self::UnitCount,
            "validityDays" => Self::ValidityDays,
            "lineItems" => Self::LineItems,
            _ => Self::Other(key.to_string()),
        }
    }
}

/// Snapshot of the fields a promotion is allowed to overwrite.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionBaseline {
    pub installation: ProductSelection,
    pub plan: ProductSelection,
    pub line_items: Vec<LineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteDraft {
    pub reference_code: String,
    pub client: ClientContact,
    pub unit_count: u32,
    pub validity_days: u32,
    pub issued_on: Option<NaiveDate>,
    pub installation_assignee_id: Option<String>,
    pub installation: ProductSelection,
    pub plan: ProductSelection,
    pub line_items: Vec<LineItem>,
    pub selected_promotion_id: Option<PromotionId>,
}

impl Default for QuoteDraft {
    fn default() -> Self {
        Self {
            reference_code: String::new(),
            client: ClientContact::default(),
            unit_count: 1,
            validity_days: DEFAULT_VALIDITY_DAYS,
            issued_on: None,
            installation_assignee_id: None,
            installation: ProductSelection::default(),
            plan: ProductSelection::default(),
            line_items: Vec::new(),
            selected_promotion_id: None,
        }
    }
}

impl QuoteDraft {
    pub fn promotion_baseline(&self) -> PromotionBaseline {
        PromotionBaseline {
            installation: self.installation.clone(),
            plan: self.plan.clone(),
            line_items: self.line_items.clone(),
        }
    }

    /// Rolls promotion-driven fields back to `baseline`. Payment methods belong to the
    /// user and are left alone.
    pub fn restore_baseline(&mut self, baseline: &PromotionBaseline) {
        self.installation.product_id = baseline.installation.product_id.clone();
        self.installation.manual_discount_percent = baseline.installation.manual_discount_percent;
        self.plan.product_id = baseline.plan.product_id.clone();
        self.plan.manual_discount_percent = baseline.plan.manual_discount_percent;
        self.line_items = baseline.line_items.clone();
    }

    pub fn accessories(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items.iter().filter(|line| line.kind == LineItemKind::Accessory)
    }

    pub fn services(&self) -> impl Iterator<Item = &LineItem> {
        self.line_items.iter().filter(|line| line.kind == LineItemKind::Service)
    }

    pub fn has_installation_assignee(&self) -> bool {
        self.installation_assignee_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    /// Lines flagged `applies_to_all_units` track the unit count.
    pub fn sync_unit_bound_lines(&mut self) {
        let unit_count = self.unit_count;
        for line in self.line_items.iter_mut().filter(|line| line.applies_to_all_units) {
            line.quantity = unit_count;
        }
    }

    pub fn valid_until(&self) -> Option<NaiveDate> {
        self.issued_on?.checked_add_days(Days::new(u64::from(self.validity_days)))
    }
}
