//! The streaming capability-invocation loop.
//!
//! Each turn runs up to `max_iterations` streaming rounds:
//!
//! 1. **Stream** one generation round against the running transcript
//! 2. **Partition** its invocations into backend-resolved and client-executed
//! 3. **Finish** if there is nothing for the client to execute
//! 4. **Execute** client invocations in order and append one assistant turn
//!    and one results turn, then loop back to step 1
//!
//! Callers always get text back. Backend outages and exhausted rounds end
//! the turn with a fixed apology instead of an error.

use crate::context::AssembledContext;
use crate::session::{CapabilityInvocation, RoundResult, StreamSession};
use std::sync::Arc;
use threadwise_config::AppConfig;
use threadwise_core::capability::{CapabilityCall, CapabilityRegistry};
use threadwise_core::error::ProviderError;
use threadwise_core::message::{Message, MessageToolCall, MessageToolResult};
use threadwise_core::provider::{EventStream, Provider, ProviderRequest, Usage};
use threadwise_providers::{CircuitBreaker, RetryPolicy};
use tracing::{debug, info, warn};

/// Returned when every round asked for more capability work.
pub const MAX_ITERATIONS_FALLBACK: &str =
    "I've reached the maximum number of tool call iterations. Please provide further guidance.";

/// Returned when the backend could not be reached.
pub const UNAVAILABLE_FALLBACK: &str =
    "Sorry, I couldn't reach the language model just now. Please try again in a moment.";

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A round produced no client-executed invocations
    Completed,
    /// `max_iterations` rounds ran without completing
    MaxIterations,
    /// The backend failed or its circuit is open
    Unavailable,
}

/// The result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Visible answer, or a fallback string
    pub text: String,
    pub rounds: usize,
    pub termination: Termination,
    pub usage: Usage,
    /// Every turn sent or received, starting with the prompt's history
    pub transcript: Vec<Message>,
}

pub struct StreamOrchestrator {
    provider: Arc<dyn Provider>,
    capabilities: Arc<CapabilityRegistry>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    max_iterations: usize,
    retry: RetryPolicy,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl StreamOrchestrator {
    pub fn new(provider: Arc<dyn Provider>, capabilities: Arc<CapabilityRegistry>, model: impl Into<String>) -> Self {
        Self {
            provider,
            capabilities,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            system_prompt: String::new(),
            max_iterations: 5,
            retry: RetryPolicy::default(),
            breaker: None,
        }
    }

    /// Build an orchestrator with the model, sampling and loop settings from config.
    pub fn from_config(provider: Arc<dyn Provider>, capabilities: Arc<CapabilityRegistry>, config: &AppConfig) -> Self {
        Self::new(provider, capabilities, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_system_prompt(config.orchestrator.system_prompt.clone())
            .with_max_iterations(config.orchestrator.max_iterations)
            .with_retry(RetryPolicy::from_config(&config.orchestrator))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum number of rounds per turn.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Gate every generation call through a circuit breaker.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run a turn and return only the visible text.
    pub async fn respond(&self, context: &AssembledContext, prompt: &str) -> String {
        self.run(context, prompt).await.text
    }

    /// Run a turn: stream rounds and execute capabilities until the model
    /// answers without client work or the round cap is hit.
    pub async fn run(&self, context: &AssembledContext, prompt: &str) -> TurnOutcome {
        let system = context.system_preamble(&self.system_prompt);
        let tools = self.capabilities.definitions();

        let mut transcript = context.history_messages();
        transcript.push(context.prompt_message(prompt));
        let mut usage = Usage::default();

        info!(
            channel_id = %context.channel_id,
            history = context.messages.len(),
            documents = context.documents.len(),
            tools = tools.len(),
            "Starting turn"
        );

        for round in 1..=self.max_iterations {
            let mut messages = Vec::with_capacity(transcript.len() + 1);
            if !system.is_empty() {
                messages.push(Message::system(system.clone()));
            }
            messages.extend(transcript.iter().cloned());

            let request = ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tools.clone(),
                stream: true,
                stop: vec![],
            };

            let result = match self.stream_round(&request).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(round, error = %e, "Generation round failed");
                    return TurnOutcome {
                        text: UNAVAILABLE_FALLBACK.into(),
                        rounds: round,
                        termination: Termination::Unavailable,
                        usage,
                        transcript,
                    };
                }
            };

            if let Some(round_usage) = &result.usage {
                usage.accumulate(round_usage);
            }

            for backend in result.backend_invocations() {
                debug!(round, capability = %backend.name, "Invocation resolved by backend");
            }

            let client: Vec<&CapabilityInvocation> = result.client_invocations().collect();
            if client.is_empty() {
                debug!(round, chars = result.text.len(), "Turn complete");
                transcript.push(Message::assistant(result.text.clone()));
                return TurnOutcome {
                    text: result.text,
                    rounds: round,
                    termination: Termination::Completed,
                    usage,
                    transcript,
                };
            }

            debug!(round, invocations = client.len(), "Executing client invocations");
            let (calls, results) = self.execute_all(&client).await;

            // A turn ending on the assistant would read as prefill
            if calls.is_empty() {
                debug!(round, "No capability produced a result");
                continue;
            }
            transcript.push(Message::assistant_with_calls(result.text.clone(), calls));
            transcript.push(Message::tool_results(results));
        }

        warn!(
            rounds = self.max_iterations,
            "Max tool iterations reached, returning fallback"
        );
        TurnOutcome {
            text: MAX_ITERATIONS_FALLBACK.into(),
            rounds: self.max_iterations,
            termination: Termination::MaxIterations,
            usage,
            transcript,
        }
    }

    /// Stream one round, with retry, behind the breaker.
    ///
    /// Each attempt opens a fresh stream and drains it; a failure part way
    /// through discards the partial round. The breaker sees one outcome per
    /// round, after retries.
    async fn stream_round(&self, request: &ProviderRequest) -> Result<RoundResult, ProviderError> {
        let attempt = || self.retry.run("generation", || self.drain_round(request));
        let session = match &self.breaker {
            Some(breaker) => breaker.call(attempt).await?,
            None => attempt().await?,
        };

        if !session.is_done() {
            debug!("Stream closed without a done event");
        }
        if session.reasoning_len() > 0 {
            debug!(chars = session.reasoning_len(), "Reasoning trace discarded");
        }
        Ok(session.finish())
    }

    async fn drain_round(&self, request: &ProviderRequest) -> Result<StreamSession, ProviderError> {
        let mut events: EventStream = self.provider.stream(request.clone()).await?;
        let mut session = StreamSession::new();
        while let Some(event) = events.recv().await {
            session.apply(event?);
        }
        Ok(session)
    }

    /// Execute invocations in order. Unknown capabilities produce nothing;
    /// failures become error results.
    async fn execute_all(&self, invocations: &[&CapabilityInvocation]) -> (Vec<MessageToolCall>, Vec<MessageToolResult>) {
        let mut calls = Vec::new();
        let mut results = Vec::new();

        for invocation in invocations {
            let call = CapabilityCall {
                id: invocation.id.clone(),
                name: invocation.name.clone(),
                arguments: invocation.input.clone(),
            };

            let start = std::time::Instant::now();
            let outcome = self.capabilities.dispatch(&call).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let result = match outcome {
                Ok(Some(result)) => {
                    debug!(capability = %call.name, success = result.success, duration_ms, "Capability executed");
                    MessageToolResult {
                        tool_call_id: call.id.clone(),
                        content: result.output,
                        is_error: !result.success,
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(capability = %call.name, error = %e, duration_ms, "Capability failed");
                    MessageToolResult {
                        tool_call_id: call.id.clone(),
                        content: format!("Error: {e}"),
                        is_error: true,
                    }
                }
            };

            calls.push(MessageToolCall {
                id: call.id,
                name: call.name,
                arguments: call.arguments,
            });
            results.push(result);
        }

        (calls, results)
    }
}
