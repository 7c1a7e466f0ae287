//! Resilience Module
//!
//! Failure isolation for the remote cache: a three-state circuit breaker and the
//! reconnect backoff schedule.

mod backoff;
mod circuit_breaker;

pub use backoff::{Backoff, RetryPolicy};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
