//! Price suggestions
//!
//! A missing answer leaves the draft's price empty; nothing here ever makes a
//! number up.

use anyhow::Result;
use async_trait::async_trait;

use crate::storage::CatalogStore;

#[async_trait]
pub trait PricingOracle: Send + Sync {
    async fn suggest_price(&self, category_en: &str, merchant_id: &str) -> Result<Option<f64>>;
}

/// Averages the merchant's own catalog prices in the same category.
pub struct CatalogPricing {
    catalog: CatalogStore,
}

impl CatalogPricing {
    pub fn new(catalog: CatalogStore) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl PricingOracle for CatalogPricing {
    async fn suggest_price(&self, category_en: &str, merchant_id: &str) -> Result<Option<f64>> {
        if category_en.trim().is_empty() {
            return Ok(None);
        }
        let avg = self.catalog.average_price(merchant_id, category_en.trim())?;
        Ok(avg.map(|p| (p * 100.0).round() / 100.0))
    }
}

/// Never has an opinion.
#[derive(Debug, Default, Clone)]
pub struct NoPricing;

#[async_trait]
impl PricingOracle for NoPricing {
    async fn suggest_price(&self, _category_en: &str, _merchant_id: &str) -> Result<Option<f64>> {
        Ok(None)
    }
}
