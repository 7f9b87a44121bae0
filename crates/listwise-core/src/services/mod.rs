//! External collaborators the agents call through traits

pub mod grouping;
pub mod pricing;

pub use grouping::{normalize_groups, FilenameGrouper, HttpImageGrouper, ImageGrouper};
pub use pricing::{CatalogPricing, NoPricing, PricingOracle};
