//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, target resolution)
//!     → ProxyConfig (validated, immutable)
//!     → read once at startup to build engines and listeners
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::ListenerConfig;
pub use schema::ListenerKind;
pub use schema::ProxyConfig;
pub use schema::RetryRotation;
pub use schema::TargetSpec;
pub use schema::{ObservabilityConfig, TlsConfig};
pub use validation::{validate_config, ValidationError};
