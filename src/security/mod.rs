//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (client identifier)
//!     → rate_limit.rs (sliding window per identifier)
//!     → headers.rs (user agent, content type)
//!     → csrf.rs (double-submit pair, state-changing methods only)
//!     → sanitize.rs (escape every string in the JSON body)
//!     → downstream handler
//!         → auth.rs (bearer token → Identity)
//!         → egress.rs (before any outbound call)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Only the rate-limit store holds cross-request state

pub mod auth;
pub mod clock;
pub mod csrf;
pub mod egress;
pub mod headers;
pub mod rate_limit;
pub mod sanitize;

pub use auth::{Identity, TokenAuthenticator, TokenClaims};
pub use csrf::{CsrfGuard, CsrfSession, CsrfTokenPair};
pub use egress::{EgressError, EgressValidator, SafeFetcher};
pub use headers::{client_identifier, HeaderValidator};
pub use rate_limit::{MemoryRateLimitStore, RateLimitStore, SlidingWindowLimiter};
pub use sanitize::{sanitize_value, validate_input};
