//! Application configuration.
//!
//! Provides `AppConfig`, loaded from an optional YAML file and layered with
//! environment variables / CLI flags at the call site (see `main::serve`).

mod settings;

pub use settings::{AppConfig, DatabaseConfig, SchedulerConfig, ServerConfig};
