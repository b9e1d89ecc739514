//! Common types, traits and errors shared across the engine

pub mod errors;
pub mod traits;
pub mod types;
