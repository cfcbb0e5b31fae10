//! # Libris Common Library
//!
//! Shared code for the libris catalog services:
//! - Error and result types
//! - Bootstrap configuration loading and data folder resolution
//! - Database initialization and catalog schema
//! - Text normalization used for catalog matching

pub mod config;
pub mod db;
pub mod error;
pub mod text;

pub use error::{Error, Result};
