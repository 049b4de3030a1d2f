//! HTTP API handlers for catalog-ingest

pub mod form;
pub mod health;
pub mod products;

pub use health::health_routes;
pub use products::product_routes;
