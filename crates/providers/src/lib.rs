//! Language-model backend integration for Threadwise.
//!
//! The Anthropic provider implements `threadwise_core::Provider`. Resilience
//! around it (retry with backoff, circuit breaking) lives here too, so both
//! the orchestrator and the delegate gateway share one implementation.

pub mod anthropic;
pub mod breaker;
pub mod retry;

pub use anthropic::{AnthropicProvider, SseParser};
pub use breaker::{BreakerState, CircuitBreaker, Clock, ManualClock, SystemClock};
pub use retry::RetryPolicy;
