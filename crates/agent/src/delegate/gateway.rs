//! Delegate query gateway.
//!
//! Answers a focused question about one thread in a separate, tightly
//! scoped generation session, so the thread's history never enters the
//! caller's context. Calls pass, in order, through input validation, the
//! circuit breaker and the concurrency gate before any network work.
//!
//! The gateway is created early and wired with its collaborators later;
//! a call before wiring fails with `DelegateError::NotWired`.

use crate::context::{AssembledContext, AssemblyRequest, ContextAssembler, Strategy};
use crate::delegate::queue::ConcurrencyGate;
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use threadwise_config::{AppConfig, DelegateConfig};
use threadwise_core::attachment::AttachmentResolver;
use threadwise_core::channel::{ChatTransport, FetchOptions};
use threadwise_core::delegate::{DelegateAnswer, DelegateRequest, DelegateService};
use threadwise_core::error::{DelegateError, ProviderError};
use threadwise_core::message::Message;
use threadwise_core::provider::{Provider, ProviderRequest};
use threadwise_providers::{CircuitBreaker, RetryPolicy};
use tracing::{debug, info, warn};

/// Instructions for the delegate session.
const DELEGATE_INSTRUCTIONS: &str = "You answer one question about a single chat thread. \
Use only the thread history and documents provided. Be specific: quote names, dates and \
figures where they matter. If the thread does not contain the answer, say so plainly. \
Keep the answer short.";

/// Collaborators the gateway needs before it can answer.
pub struct DelegateWiring {
    pub provider: Arc<dyn Provider>,
    pub transport: Arc<dyn ChatTransport>,
    pub assembler: Arc<ContextAssembler>,
    pub resolver: Option<Arc<dyn AttachmentResolver>>,
    /// Model for the delegate session
    pub model: String,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery {
    pub thread_id: String,
    pub query: String,
    pub hint: Option<String>,
}

pub struct DelegateQueryGateway {
    config: DelegateConfig,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    gate: ConcurrencyGate,
    wiring: OnceLock<DelegateWiring>,
}

fn clean(input: &str) -> String {
    input.replace('\0', "").trim().to_string()
}

impl DelegateQueryGateway {
    pub fn new(config: DelegateConfig, breaker: Arc<CircuitBreaker>) -> Self {
        let gate = ConcurrencyGate::new(config.max_concurrent);
        Self {
            config,
            retry: RetryPolicy::default(),
            breaker,
            gate,
            wiring: OnceLock::new(),
        }
    }

    /// Gateway with its own "delegate" breaker and the configured retry policy.
    pub fn from_config(config: &AppConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::from_config("delegate", &config.breaker));
        Self::new(config.delegate.clone(), breaker).with_retry(RetryPolicy::from_config(&config.orchestrator))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Supply collaborators. Returns false if the gateway was already wired.
    pub fn wire(&self, wiring: DelegateWiring) -> bool {
        let wired = self.wiring.set(wiring).is_ok();
        if !wired {
            warn!("Delegate gateway already wired, ignoring");
        }
        wired
    }

    pub fn is_wired(&self) -> bool {
        self.wiring.get().is_some()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Check required fields and length limits. No network work happens
    /// before this passes.
    pub fn validate(&self, request: &DelegateRequest) -> Result<ValidatedQuery, DelegateError> {
        let thread_id = clean(&request.thread_id);
        if thread_id.is_empty() {
            return Err(DelegateError::Validation("thread_id is required".into()));
        }

        let query = clean(&request.query);
        if query.is_empty() {
            return Err(DelegateError::Validation("query is required".into()));
        }
        let query_chars = query.chars().count();
        if query_chars > self.config.max_query_chars {
            return Err(DelegateError::Validation(format!(
                "query is {query_chars} characters; the limit is {}",
                self.config.max_query_chars
            )));
        }

        let hint = request.hint.as_deref().map(clean).filter(|h| !h.is_empty());
        if let Some(hint) = &hint {
            let hint_chars = hint.chars().count();
            if hint_chars > self.config.max_hint_chars {
                return Err(DelegateError::Validation(format!(
                    "hint is {hint_chars} characters; the limit is {}",
                    self.config.max_hint_chars
                )));
            }
        }

        Ok(ValidatedQuery { thread_id, query, hint })
    }

    async fn answer(&self, wiring: &DelegateWiring, query: &ValidatedQuery) -> Result<DelegateAnswer, DelegateError> {
        let thread_name = match wiring.transport.describe_channel(&query.thread_id).await {
            Ok(info) => info.name,
            Err(e) => {
                debug!(thread_id = %query.thread_id, error = %e, "Thread lookup failed, using id as name");
                query.thread_id.clone()
            }
        };

        let context = self.thread_context(wiring, &query.thread_id).await?;

        let mut system = context.system_preamble(DELEGATE_INSTRUCTIONS);
        system.push_str(&format!("\n\nThread: {thread_name}"));

        let mut prompt = format!("Question: {}", query.query);
        if let Some(hint) = &query.hint {
            prompt.push_str(&format!("\nFocus: {hint}"));
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(context.history_messages());
        messages.push(context.prompt_message(&prompt));

        let request = ProviderRequest {
            model: wiring.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: Some(self.config.max_tokens),
            tools: vec![],
            stream: false,
            stop: vec![],
        };

        let response = self
            .retry
            .run("delegate", || wiring.provider.complete(request.clone()))
            .await
            .map_err(|e| match e {
                ProviderError::Unavailable(reason) => DelegateError::Unavailable(reason),
                other => DelegateError::Provider(other),
            })?;

        Ok(DelegateAnswer {
            answer: response.message.content,
            thread_id: query.thread_id.clone(),
            thread_name,
            source_message_count: context.messages.len(),
            has_documents: context.has_documents(),
            usage: response.usage.unwrap_or_default(),
            degraded: context.degraded,
        })
    }

    /// Adaptive assembly, falling back to a raw fetch of recent messages.
    async fn thread_context(&self, wiring: &DelegateWiring, thread_id: &str) -> Result<AssembledContext, DelegateError> {
        let mut request = AssemblyRequest::new(thread_id, Strategy::Adaptive { limit: None })
            .with_system_prompt(DELEGATE_INSTRUCTIONS);
        if let Some(resolver) = &wiring.resolver {
            request = request.with_resolver(resolver.as_ref());
        }

        match wiring.assembler.assemble(request).await {
            Ok(context) => Ok(context),
            Err(e) => {
                warn!(thread_id, error = %e, "Thread assembly failed, falling back to raw fetch");
                let messages = wiring
                    .transport
                    .fetch_messages(thread_id, FetchOptions::latest(self.config.fallback_message_limit))
                    .await?;
                Ok(AssembledContext::from_raw_messages(
                    thread_id,
                    messages,
                    wiring.assembler.config(),
                ))
            }
        }
    }
}

#[async_trait]
impl DelegateService for DelegateQueryGateway {
    async fn ask(&self, request: DelegateRequest) -> Result<DelegateAnswer, DelegateError> {
        let query = self.validate(&request)?;
        let wiring = self
            .wiring
            .get()
            .ok_or_else(|| DelegateError::NotWired("provider, transport and assembler were never supplied".into()))?;

        self.breaker
            .check()
            .map_err(|e| DelegateError::Unavailable(e.to_string()))?;

        let _permit = self.gate.acquire().await?;
        debug!(
            thread_id = %query.thread_id,
            active = self.gate.active(),
            queued = self.gate.queued(),
            "Delegate query admitted"
        );

        let outcome = self.answer(wiring, &query).await;
        match &outcome {
            Ok(answer) => {
                self.breaker.record_success();
                info!(
                    thread_id = %answer.thread_id,
                    messages = answer.source_message_count,
                    input_tokens = answer.usage.prompt_tokens,
                    output_tokens = answer.usage.completion_tokens,
                    "Delegate query answered"
                );
            }
            Err(e) => {
                self.breaker.record_failure();
                warn!(thread_id = %query.thread_id, error = %e, "Delegate query failed");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TokenBudgetEstimator;
    use crate::test_helpers::{ScriptedProvider, text_response};
    use std::time::Duration;
    use threadwise_channels::LocalTransport;
    use threadwise_config::ContextConfig;
    use threadwise_core::channel::{Attachment, Author};
    use threadwise_core::error::StoreError;
    use threadwise_core::provider::Usage;
    use threadwise_core::summary::{ConversationWindow, SummaryStore, WindowUpdate};
    use threadwise_memory::InMemorySummaryStore;

    struct BrokenStore;

    #[async_trait]
    impl SummaryStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }
        async fn latest_by_channel(&self, _channel_id: &str) -> Result<Option<ConversationWindow>, StoreError> {
            Err(StoreError::QueryFailed("disk on fire".into()))
        }
        async fn list_by_channel(&self, _channel_id: &str) -> Result<Vec<ConversationWindow>, StoreError> {
            Err(StoreError::QueryFailed("disk on fire".into()))
        }
        async fn create_or_update(&self, _update: WindowUpdate) -> Result<ConversationWindow, StoreError> {
            Err(StoreError::QueryFailed("disk on fire".into()))
        }
    }

    async fn thread() -> (Arc<LocalTransport>, String) {
        let transport = Arc::new(LocalTransport::new("Threadwise"));
        transport.add_channel("general", "general").await;
        let thread = transport
            .create_thread("general", "launch", Some("Launch planning starts here"))
            .await
            .unwrap();
        transport
            .post(&thread.id, Author::user("u1", "Ada"), "Launch moved to Friday", vec![])
            .await
            .unwrap();
        transport
            .post(
                &thread.id,
                Author::user("u2", "Grace"),
                "Checklist attached",
                vec![Attachment {
                    name: "checklist.pdf".into(),
                    size: 10,
                    url: "http://127.0.0.1:9/checklist.pdf".into(),
                    mime_type: Some("application/pdf".into()),
                }],
            )
            .await
            .unwrap();
        (transport, thread.id)
    }

    fn gateway(threshold: u32) -> DelegateQueryGateway {
        let breaker = Arc::new(CircuitBreaker::new("delegate", threshold, Duration::from_secs(60)));
        DelegateQueryGateway::new(DelegateConfig::default(), breaker)
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)))
    }

    fn wire(
        gateway: &DelegateQueryGateway,
        provider: Arc<ScriptedProvider>,
        transport: Arc<LocalTransport>,
        store: Arc<dyn SummaryStore>,
    ) {
        let assembler = Arc::new(ContextAssembler::new(
            store,
            transport.clone(),
            TokenBudgetEstimator::heuristic(),
            ContextConfig::default(),
        ));
        assert!(gateway.wire(DelegateWiring {
            provider,
            transport,
            assembler,
            resolver: None,
            model: "delegate-model".into(),
        }));
    }

    fn request(thread_id: &str, query: &str, hint: Option<&str>) -> DelegateRequest {
        DelegateRequest {
            thread_id: thread_id.into(),
            query: query.into(),
            hint: hint.map(String::from),
        }
    }

    #[tokio::test]
    async fn answers_from_thread_context() {
        let (transport, thread_id) = thread().await;
        let provider = Arc::new(
            ScriptedProvider::new().with_completion(text_response("Friday.", Usage::new(321, 4))),
        );
        let gateway = gateway(5);
        wire(&gateway, provider.clone(), transport, Arc::new(InMemorySummaryStore::new()));

        let answer = gateway
            .ask(request(&thread_id, " When is launch? ", Some("dates")))
            .await
            .unwrap();

        assert_eq!(answer.answer, "Friday.");
        assert_eq!(answer.thread_name, "launch");
        assert_eq!(answer.source_message_count, 3);
        assert!(answer.has_documents);
        assert_eq!(answer.usage, Usage::new(321, 4));

        let sent = provider.last_complete_request().unwrap();
        assert_eq!(sent.model, "delegate-model");
        assert!((sent.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(sent.max_tokens, Some(1024));
        assert!(sent.tools.is_empty());
        assert!(!sent.stream);
        let prompt = sent.messages.last().unwrap();
        assert_eq!(prompt.content, "Question: When is launch?\nFocus: dates");
        assert!(sent.messages[0].content.contains("Thread: launch"));
        assert_eq!(gateway.breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn validation_happens_before_anything_else() {
        let gateway = gateway(5);
        // Not wired: validation still runs first
        let err = gateway.ask(request("t1", " \0 ", None)).await.unwrap_err();
        assert!(matches!(err, DelegateError::Validation(_)));

        let err = gateway.ask(request("", "q", None)).await.unwrap_err();
        assert!(matches!(err, DelegateError::Validation(_)));

        let err = gateway.ask(request("t1", &"q".repeat(2001), None)).await.unwrap_err();
        assert!(matches!(err, DelegateError::Validation(_)));

        let err = gateway
            .ask(request("t1", "q", Some(&"h".repeat(501))))
            .await
            .unwrap_err();
        assert!(matches!(err, DelegateError::Validation(_)));
    }

    #[test]
    fn validation_strips_null_bytes_and_blank_hints() {
        let gateway = gateway(5);
        let query = gateway
            .validate(&request(" t\01 ", "wh\0at?", Some("   ")))
            .unwrap();
        assert_eq!(
            query,
            ValidatedQuery {
                thread_id: "t1".into(),
                query: "what?".into(),
                hint: None,
            }
        );
        assert!(gateway.validate(&request("t1", &"q".repeat(2000), None)).is_ok());
    }

    #[tokio::test]
    async fn unwired_gateway_reports_not_wired() {
        let err = gateway(5).ask(request("t1", "q", None)).await.unwrap_err();
        assert!(matches!(err, DelegateError::NotWired(_)));
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_network() {
        let (transport, thread_id) = thread().await;
        let provider = Arc::new(ScriptedProvider::new());
        let gateway = gateway(1);
        wire(&gateway, provider.clone(), transport, Arc::new(InMemorySummaryStore::new()));
        gateway.breaker().record_failure();

        let err = gateway.ask(request(&thread_id, "q", None)).await.unwrap_err();
        assert!(matches!(err, DelegateError::Unavailable(_)));
        assert_eq!(provider.complete_calls(), 0);
    }

    #[tokio::test]
    async fn assembly_failure_falls_back_to_raw_fetch() {
        let (transport, thread_id) = thread().await;
        let provider = Arc::new(
            ScriptedProvider::new().with_completion(text_response("Friday.", Usage::new(50, 2))),
        );
        let gateway = gateway(5);
        wire(&gateway, provider, transport, Arc::new(BrokenStore));

        let answer = gateway.ask(request(&thread_id, "When?", None)).await.unwrap();
        assert!(answer.degraded);
        assert_eq!(answer.source_message_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_are_unavailable_and_counted() {
        let (transport, thread_id) = thread().await;
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_failed_completion(ProviderError::Network("reset".into()))
                .with_failed_completion(ProviderError::Network("reset".into()))
                .with_failed_completion(ProviderError::Network("reset".into())),
        );
        let gateway = gateway(5);
        wire(&gateway, provider.clone(), transport, Arc::new(InMemorySummaryStore::new()));

        let err = gateway.ask(request(&thread_id, "When?", None)).await.unwrap_err();
        assert!(matches!(err, DelegateError::Unavailable(_)));
        assert_eq!(provider.complete_calls(), 3);
        assert_eq!(gateway.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn unknown_thread_fails_and_is_counted() {
        let (transport, _) = thread().await;
        let gateway = gateway(5);
        wire(&gateway, Arc::new(ScriptedProvider::new()), transport, Arc::new(InMemorySummaryStore::new()));

        let err = gateway.ask(request("nope", "When?", None)).await.unwrap_err();
        assert!(matches!(err, DelegateError::Transport(_)));
        assert_eq!(gateway.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn second_wiring_is_ignored() {
        let (transport, _) = thread().await;
        let gateway = gateway(5);
        wire(&gateway, Arc::new(ScriptedProvider::new()), transport.clone(), Arc::new(InMemorySummaryStore::new()));

        let assembler = Arc::new(ContextAssembler::new(
            Arc::new(InMemorySummaryStore::new()),
            transport.clone(),
            TokenBudgetEstimator::heuristic(),
            ContextConfig::default(),
        ));
        assert!(!gateway.wire(DelegateWiring {
            provider: Arc::new(ScriptedProvider::new()),
            transport,
            assembler,
            resolver: None,
            model: "other".into(),
        }));
        assert!(gateway.is_wired());
    }
}
