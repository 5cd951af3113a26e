use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    InstallationFee,
    MonthlyPlan,
    PlanConvenant,
    Accessory,
    RecurringService,
}

impl ProductCategory {
    pub fn is_installation(self) -> bool {
        matches!(self, Self::InstallationFee)
    }

    /// Monthly plans and convenants are interchangeable in the plan slot.
    pub fn is_plan(self) -> bool {
        matches!(self, Self::MonthlyPlan | Self::PlanConvenant)
    }

    pub fn line_item_kind(self) -> Option<LineItemKind> {
        match self {
            Self::Accessory => Some(LineItemKind::Accessory),
            Self::RecurringService => Some(LineItemKind::Service),
            Self::InstallationFee | Self::MonthlyPlan | Self::PlanConvenant => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstallationFee => "installation_fee",
            Self::MonthlyPlan => "monthly_plan",
            Self::PlanConvenant => "plan_convenant",
            Self::Accessory => "accessory",
            Self::RecurringService => "recurring_service",
        }
    }
}

/// Billing nature of an added line: accessories are charged once, services every period.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemKind {
    Accessory,
    Service,
}

impl LineItemKind {
    pub fn is_recurring(self) -> bool {
        matches!(self, Self::Service)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub category: ProductCategory,
}
