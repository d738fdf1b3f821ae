//! # Cook Card Common Library
//!
//! Shared code for the Cook Card services including:
//! - Common error types
//! - Configuration loading (TOML + environment overrides)

pub mod config;
pub mod error;

pub use config::ServiceConfig;
pub use error::{Error, Result};
