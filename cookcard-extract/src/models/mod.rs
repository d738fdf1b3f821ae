//! Data models for the extraction ladder

pub mod cook_card;
pub mod usage;

pub use cook_card::{
    CookCard, ExtractionMeta, ExtractionMethod, Ingredient, Platform, Provenance,
    EXTRACTION_FORMAT_VERSION,
};
pub use usage::ProviderUsage;
