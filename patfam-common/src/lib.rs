//! # patfam common library
//!
//! Shared code for the patfam crates:
//! - Error and result types
//! - Configuration file resolution and TOML loading
//! - Patent identifier normalization
//! - Date utilities

pub mod config;
pub mod error;
pub mod identifiers;
pub mod time;

pub use error::{Error, Result};
