//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, secret overlay)
//!     → validation.rs (semantic checks)
//!     → GatekeeperConfig (validated, immutable)
//!     → each section handed to its component at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, load_config, parse_config, ConfigError, SECRET_ENV_VAR};
pub use schema::{
    AuthConfig, EgressConfig, GatekeeperConfig, HeaderPolicyConfig, ListenerConfig,
    ObservabilityConfig, RateLimitConfig,
};
