//! Price provider adapters

pub mod fixed;
pub mod messages;
pub mod rest;

pub use fixed::StaticPriceProvider;
pub use rest::RestPriceProvider;
