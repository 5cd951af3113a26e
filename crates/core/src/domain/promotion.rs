use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromotionId(pub String);

impl PromotionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for PromotionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Group sizes accepted for the "NxN-1" bulk shape.
pub const SUPPORTED_GROUP_SIZES: [u32; 2] = [2, 3];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscountShape {
    Percentage { percent: Decimal },
    /// One unit in every group of `group_size` is free.
    BuyNGetOneFree { group_size: u32 },
}

impl DiscountShape {
    pub fn percentage(percent: Decimal) -> Self {
        Self::Percentage { percent }
    }

    pub fn buy_n_get_one_free(group_size: u32) -> Self {
        Self::BuyNGetOneFree { group_size }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match *self {
            Self::Percentage { percent } => {
                if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
                    return Err(DomainError::InvalidDiscount(format!(
                        "percentage discount must be within 0..=100, got {percent}"
                    )));
                }
            }
            Self::BuyNGetOneFree { group_size } => {
                if !SUPPORTED_GROUP_SIZES.contains(&group_size) {
                    return Err(DomainError::InvalidDiscount(format!(
                        "bulk discount group size must be 2 or 3, got {group_size}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        match *self {
            Self::Percentage { percent } => percent_label(percent),
            Self::BuyNGetOneFree { group_size } => {
                format!("{group_size}x{}", group_size.saturating_sub(1))
            }
        }
    }

    /// Value written into a line's percentage field when a promotion populates it.
    /// Bulk shapes have no percentage form and leave the field at zero.
    pub fn as_manual_percent(&self) -> Decimal {
        match *self {
            Self::Percentage { percent } => percent,
            Self::BuyNGetOneFree { .. } => Decimal::ZERO,
        }
    }
}

pub fn percent_label(percent: Decimal) -> String {
    format!("{}% OFF", percent.normalize())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRule {
    pub product_id: ProductId,
    #[serde(default)]
    pub minimum_unit_count: u32,
    pub discount: DiscountShape,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Vec<PromotionRule>,
}

impl Promotion {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation("promotion id must not be blank".into()));
        }
        for rule in &self.rules {
            rule.discount.validate().map_err(|error| match error {
                DomainError::InvalidDiscount(message) => DomainError::InvalidDiscount(format!(
                    "promotion {} rule for {}: {message}",
                    self.id, rule.product_id
                )),
                other => other,
            })?;
        }
        Ok(())
    }
}
