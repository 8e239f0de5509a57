//! Shared error plumbing used across the jsaddons crates.

pub mod error;

pub use error::{Error, FromMessage, Result};
