//! Application boundary: source traits and process-level errors.

pub mod error;
pub mod repos;
