//! # RDQ Common Library
//!
//! Shared code for the resource-directory data-quality tools:
//! - Persisted domain model (resources, verification runs, check results)
//! - Database initialization
//! - Configuration loading
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
