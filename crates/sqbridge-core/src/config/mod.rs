//! Bridge configuration
//!
//! This module defines configuration types and default values:
//! - `app_config`: Configuration structure
//! - `defaults`: Default configuration values

pub mod app_config;
pub mod defaults;

pub use app_config::BridgeConfig;
