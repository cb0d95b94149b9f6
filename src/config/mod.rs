//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --env flag
//!     → env.rs (Environment, unknown → fat)
//!     → configs/<env>_configs.toml (or --config)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Settings (validated, immutable)
//!     → shared via Arc with the server and dependencies
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod constants;
pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use env::Environment;
pub use loader::{default_config_path, load_config, ConfigError};
pub use schema::{
    BasicSettings, HttpSettings, LogSettings, MetricsSettings, PostgresqlSettings, RedisSettings,
    Settings,
};
