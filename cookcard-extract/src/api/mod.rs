//! HTTP API handlers for the extraction service

pub mod extract;
pub mod health;

pub use extract::extract_routes;
pub use health::health_routes;
