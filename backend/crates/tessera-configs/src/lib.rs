//! tessera-configs
//!
//! Rewrite engine configuration types and loader.

pub mod config;

pub use config::*;
pub use config::defaults;
