//! The Threadwise engine.
//!
//! A turn flows through three stages:
//!
//! 1. **Assemble** a token-bounded context for the channel: the latest
//!    window summary, history after its boundary, and reference documents
//! 2. **Orchestrate** streaming rounds with the backend, executing the
//!    capabilities it invokes until it answers in plain text
//! 3. **Delegate** focused questions about other threads to a separate,
//!    tightly scoped session so their history never enters the context
//!
//! The round count, retries and delegate concurrency are all bounded.

pub mod context;
pub mod delegate;
pub mod orchestrator;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use context::{
    AssembledContext, AssemblyError, AssemblyRequest, ContextAssembler, Strategy, TokenBreakdown,
    TokenBudgetEstimator, TokenCount,
};
pub use delegate::{ConcurrencyGate, DelegateQueryGateway, DelegateWiring};
pub use orchestrator::{
    MAX_ITERATIONS_FALLBACK, StreamOrchestrator, Termination, TurnOutcome, UNAVAILABLE_FALLBACK,
};
pub use session::{CapabilityInvocation, RoundResult, StreamSession};
