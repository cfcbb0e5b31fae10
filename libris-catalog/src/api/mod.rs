//! HTTP API handlers for libris-catalog

pub mod caller;
pub mod health;
pub mod import;

pub use caller::CALLER_HEADER;
pub use health::health_routes;
pub use import::import_routes;
