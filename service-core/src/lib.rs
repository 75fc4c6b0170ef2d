//! service-core: shared HTTP plumbing for the Cashfree gateway services.
//!
//! Configuration loading, the common error type, request middleware,
//! tracing setup and webhook signature helpers.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod utils;
