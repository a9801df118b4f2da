//! # cord-core
//!
//! Value objects shared by the gateway and REST crates.
//! This crate has no networking dependencies.

pub mod value_objects;

// Re-export commonly used types at crate root
pub use value_objects::{Intents, Snowflake, SnowflakeParseError};
