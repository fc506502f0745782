//! HTTP host subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID, tracing, panic catch, timeout)
//!     → pipeline::security_middleware (checks, sanitized body)
//!     → handlers.rs (auth, egress checks)
//!     → JSON response
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, GatekeeperServer};
