//! Delegate queries: focused questions about a thread, answered in a
//! separate session behind a circuit breaker and a concurrency gate.

pub mod gateway;
pub mod queue;

pub use gateway::{DelegateQueryGateway, DelegateWiring, ValidatedQuery};
pub use queue::{ConcurrencyGate, GatePermit};
