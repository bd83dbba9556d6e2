//! # quire_config - Configuration for quire
//!
//! TOML configuration with `[files]`, `[metadata]` and `[log]` sections,
//! discovered from the usual search paths and reloadable at runtime.

pub mod config;
pub mod error;
pub mod loader;
pub mod settings;

pub use config::*;
pub use error::*;
pub use loader::*;
pub use settings::*;
