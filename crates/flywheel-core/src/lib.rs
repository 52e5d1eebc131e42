//! Flywheel Core
//!
//! Core domain types, port traits, and error handling for Flywheel.
//! This crate has minimal dependencies and defines the shared vocabulary
//! used across all other crates.

pub mod error;
pub mod ids;
pub mod interpolation;
pub mod ports;
pub mod record;
pub mod spec;
pub mod trigger;

pub use error::{Error, Result};
pub use ids::*;
