use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::domain::product::{Product, ProductId};
use crate::domain::promotion::{Promotion, PromotionId};
use crate::errors::{ApplicationError, DomainError, EngineError};

/// Read-only product price lookup.
pub trait CatalogLookup: Send + Sync {
    fn get_product(&self, id: &ProductId) -> Result<Product, EngineError>;
}

/// Read-only promotion lookup.
pub trait PromotionCatalog: Send + Sync {
    fn get_promotion(&self, id: &PromotionId) -> Result<Promotion, EngineError>;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("duplicate product id `{0}` in catalog")]
    DuplicateProduct(ProductId),
    #[error("duplicate promotion id `{0}` in catalog")]
    DuplicatePromotion(PromotionId),
    #[error("invalid promotion: {0}")]
    InvalidPromotion(#[from] DomainError),
}

impl From<CatalogError> for ApplicationError {
    fn from(value: CatalogError) -> Self {
        ApplicationError::Catalog(value.to_string())
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    products: BTreeMap<ProductId, Product>,
    promotions: BTreeMap<PromotionId, Promotion>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    products: Vec<Product>,
    #[serde(default)]
    promotions: Vec<Promotion>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>, promotions: Vec<Promotion>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for product in products {
            if catalog.products.contains_key(&product.id) {
                return Err(CatalogError::DuplicateProduct(product.id));
            }
            catalog.products.insert(product.id.clone(), product);
        }
        for promotion in promotions {
            promotion.validate()?;
            if catalog.promotions.contains_key(&promotion.id) {
                return Err(CatalogError::DuplicatePromotion(promotion.id));
            }
            catalog.promotions.insert(promotion.id.clone(), promotion);
        }
        Ok(catalog)
    }

    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, CatalogError> {
        let document = toml::from_str::<CatalogDocument>(raw)
            .map_err(|source| CatalogError::ParseFile { path: origin.to_path_buf(), source })?;
        Self::new(document.products, document.promotions)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw, path)
    }

    pub fn find(&self, product_id: &ProductId) -> Option<&Product> {
        self.products.get(product_id)
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    pub fn promotions(&self) -> impl Iterator<Item = &Promotion> {
        self.promotions.values()
    }
}

impl CatalogLookup for InMemoryCatalog {
    fn get_product(&self, id: &ProductId) -> Result<Product, EngineError> {
        self.find(id).cloned().ok_or_else(|| EngineError::CatalogProductNotFound(id.clone()))
    }
}

impl PromotionCatalog for InMemoryCatalog {
    fn get_promotion(&self, id: &PromotionId) -> Result<Promotion, EngineError> {
        self.promotions.get(id).cloned().ok_or_else(|| EngineError::PromotionNotFound(id.clone()))
    }
}
