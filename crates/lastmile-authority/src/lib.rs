//! Typed HTTP client for the external routing authority: address
//! normalization, route computation, run start, and delivery outcome
//! recording, with retry of transient transport failures.

pub mod client;
pub mod error;
mod retry;
pub mod types;

pub use client::{AuthorityClient, RetryPolicy};
pub use error::AuthorityError;
