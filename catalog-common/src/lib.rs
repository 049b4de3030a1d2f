//! # Catalog Common Library
//!
//! Shared code for the catalog services:
//! - Error type and result alias
//! - Bootstrap configuration loading (CLI → ENV → TOML → compiled default)

pub mod config;
pub mod error;

pub use error::{Error, Result};
