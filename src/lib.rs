//! Request security gatekeeper.
//!
//! Sits in front of application handlers and decides, per request, whether it
//! may proceed.
//!
//! ```text
//!     Client Request
//!          │
//!          ▼
//!   ┌──────────────┐   ┌────────────────────────────────────────────┐
//!   │ http server  │──▶│ pipeline                                   │
//!   │ (axum, tower)│   │  rate_limit → headers → csrf → body+sanitize│
//!   └──────────────┘   └───────────────────┬────────────────────────┘
//!                                          ▼
//!                                   ┌─────────────┐     ┌────────────┐
//!                                   │  handlers   │────▶│ security:: │
//!                                   │             │     │ auth,egress│
//!                                   └─────────────┘     └────────────┘
//! ```
//!
//! Cross-cutting: `config` (TOML, validated once), `observability`
//! (tracing, Prometheus metrics), `lifecycle` (startup, signals, shutdown).

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;

pub use config::GatekeeperConfig;
pub use error::{GateError, GateResult};
pub use http::GatekeeperServer;
pub use lifecycle::Shutdown;
pub use pipeline::SecurityPipeline;
