//! Context assembly: turns a channel into a token-bounded prompt.
//!
//! An assembled context has three parts:
//!
//! 1. **Summary prefix**: the latest persisted window summary, if any
//! 2. **Recent messages**: history strictly after the window boundary
//! 3. **Reference documents**: deduplicated attachments, current message first
//!
//! # Strategies
//!
//! | Strategy | Fetch | Shrink |
//! |----------|-------|--------|
//! | fixed | the `limit` newest messages | never |
//! | adaptive | an initial window | proportionally when over the soft limit |
//! | unlimited | pages backwards up to a safety cap | never |
//!
//! Token accounting counts the exact payload that will be sent. When the
//! provider cannot count it, the heuristic is used and the result is
//! flagged as degraded.

use crate::context::attachments::collect_documents;
use crate::context::token::{self, TokenBudgetEstimator, TokenCount};
use serde::Serialize;
use std::sync::Arc;
use threadwise_config::ContextConfig;
use threadwise_core::attachment::AttachmentResolver;
use threadwise_core::channel::{ChatMessage, ChatTransport, FetchOptions};
use threadwise_core::error::{StoreError, TransportError};
use threadwise_core::message::{ContentBlock, Message};
use threadwise_core::summary::SummaryStore;
use tracing::{debug, info, warn};

/// Header placed before the window summary in the system preamble.
const SUMMARY_HEADER: &str = "## Summary of earlier conversation";

// ── Types ─────────────────────────────────────────────────────────────────

/// How much history to pull into the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The `limit` most recent messages (configured default when `None`)
    Fixed { limit: Option<usize> },
    /// An initial window (configured default when `None`, always capped),
    /// shrunk when it would crowd the context ceiling
    Adaptive { limit: Option<usize> },
    /// Every message after the boundary, up to a safety cap
    Unlimited,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fixed { .. } => "fixed",
            Self::Adaptive { .. } => "adaptive",
            Self::Unlimited => "unlimited",
        }
    }
}

/// Inputs for one assembly.
#[derive(Clone, Copy)]
pub struct AssemblyRequest<'a> {
    pub channel_id: &'a str,
    pub strategy: Strategy,
    /// Base instructions; counted as part of the payload
    pub system_prompt: &'a str,
    /// The message being answered, excluded from history
    pub current: Option<&'a ChatMessage>,
    pub resolver: Option<&'a dyn AttachmentResolver>,
}

impl<'a> AssemblyRequest<'a> {
    pub fn new(channel_id: &'a str, strategy: Strategy) -> Self {
        Self {
            channel_id,
            strategy,
            system_prompt: "",
            current: None,
            resolver: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: &'a str) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_current(mut self, current: &'a ChatMessage) -> Self {
        self.current = Some(current);
        self
    }

    pub fn with_resolver(mut self, resolver: &'a dyn AttachmentResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// Where the context's tokens go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenBreakdown {
    pub summary: u32,
    pub messages: u32,
    pub documents: u32,
    pub system: u32,
    /// Left for the response after the payload and the response reserve
    pub available: u32,
}

/// The assembled context, ready for a generation call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub channel_id: String,
    /// Latest window summary, if the channel has one
    pub summary_prefix: Option<String>,
    /// History after the window boundary, oldest first
    pub messages: Vec<ChatMessage>,
    pub documents: Vec<ContentBlock>,
    pub total_tokens: u32,
    pub breakdown: TokenBreakdown,
    pub strategy: String,
    pub has_more_history: bool,
    /// Token figures came from the heuristic
    pub degraded: bool,
}

impl AssembledContext {
    /// Context built from a raw message fetch, with heuristic token figures.
    pub fn from_raw_messages(channel_id: &str, messages: Vec<ChatMessage>, config: &ContextConfig) -> Self {
        let history: Vec<Message> = messages.iter().map(to_message).collect();
        let total = token::estimate_payload("", &history);
        let breakdown = TokenBreakdown {
            messages: total,
            available: available_tokens(config, total),
            ..TokenBreakdown::default()
        };
        Self {
            channel_id: channel_id.to_string(),
            summary_prefix: None,
            messages,
            documents: Vec::new(),
            total_tokens: total,
            breakdown,
            strategy: "raw-fallback".into(),
            has_more_history: false,
            degraded: true,
        }
    }

    /// Whether the payload leaves less than the response reserve.
    pub fn exceeds_ceiling(&self, config: &ContextConfig) -> bool {
        self.total_tokens > ceiling(config)
    }

    /// Base instructions followed by the summary section, if any.
    pub fn system_preamble(&self, base: &str) -> String {
        compose_preamble(base, self.summary_prefix.as_deref())
    }

    /// History as conversation turns.
    pub fn history_messages(&self) -> Vec<Message> {
        self.messages.iter().map(to_message).collect()
    }

    /// The final user turn: the prompt plus the reference documents.
    pub fn prompt_message(&self, prompt: &str) -> Message {
        Message::user(prompt).with_attachments(self.documents.clone())
    }

    /// Whether any documents were loaded or referenced in the history.
    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty() || self.messages.iter().any(|m| !m.attachments.is_empty())
    }
}

/// Errors that abort an assembly.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("History fetch failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Summary lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// A platform message as a conversation turn.
///
/// The assistant's own messages become assistant turns; everyone else's
/// become user turns prefixed with the author's name.
pub fn to_message(message: &ChatMessage) -> Message {
    let mut msg = if message.author.is_self {
        Message::assistant(message.content.clone())
    } else {
        Message::user(format!("{}: {}", message.author.name, message.content))
    };
    msg.timestamp = message.created_at;
    msg.metadata
        .insert("message_id".into(), serde_json::Value::String(message.id.clone()));
    msg
}

/// Largest payload that still leaves the response reserve free.
fn ceiling(config: &ContextConfig) -> u32 {
    config.context_window.saturating_sub(config.response_reserve)
}

fn compose_preamble(base: &str, summary: Option<&str>) -> String {
    match summary {
        Some(summary) if !summary.trim().is_empty() => {
            if base.is_empty() {
                format!("{SUMMARY_HEADER}\n{summary}")
            } else {
                format!("{base}\n\n{SUMMARY_HEADER}\n{summary}")
            }
        }
        _ => base.to_string(),
    }
}

fn available_tokens(config: &ContextConfig, total: u32) -> u32 {
    config
        .context_window
        .saturating_sub(total)
        .saturating_sub(config.response_reserve)
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    store: Arc<dyn SummaryStore>,
    transport: Arc<dyn ChatTransport>,
    estimator: TokenBudgetEstimator,
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<dyn SummaryStore>,
        transport: Arc<dyn ChatTransport>,
        estimator: TokenBudgetEstimator,
        config: ContextConfig,
    ) -> Self {
        Self {
            store,
            transport,
            estimator,
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assemble a context for one channel.
    ///
    /// # Algorithm
    ///
    /// 1. Read the latest window; its last message is the boundary
    /// 2. Fetch history strictly after the boundary per the strategy
    /// 3. Collect reference documents when a resolver is supplied
    /// 4. Count the payload; adaptive shrinks and recounts when over the soft limit
    pub async fn assemble(&self, request: AssemblyRequest<'_>) -> Result<AssembledContext, AssemblyError> {
        let channel_id = request.channel_id;
        let window = self.store.latest_by_channel(channel_id).await?;
        let boundary = window.as_ref().and_then(|w| w.last_message_id.clone());
        let summary = window.map(|w| w.summary).filter(|s| !s.trim().is_empty());

        let mut label = request.strategy.label().to_string();
        let (mut history, mut has_more) = match request.strategy {
            Strategy::Fixed { limit } => {
                let limit = limit.unwrap_or(self.config.fixed_limit);
                self.fetch_latest(channel_id, limit, boundary).await?
            }
            Strategy::Adaptive { limit } => {
                let initial = limit
                    .unwrap_or(self.config.adaptive_initial)
                    .min(self.config.adaptive_cap);
                self.fetch_latest(channel_id, initial, boundary).await?
            }
            Strategy::Unlimited => self.fetch_all(channel_id, boundary).await?,
        };

        if let Some(current) = request.current {
            history.retain(|m| m.id != current.id);
        }

        let documents = match request.resolver {
            Some(resolver) => {
                collect_documents(
                    request.current,
                    &history,
                    self.config.attachment_scan_messages,
                    resolver,
                )
                .await
            }
            None => Vec::new(),
        };

        let mut measured = self
            .measure(request.system_prompt, summary.as_deref(), &history, &documents, request.current)
            .await;

        if matches!(request.strategy, Strategy::Adaptive { .. }) {
            let soft_limit = self.config.context_window as f64 * self.config.soft_limit_ratio as f64;
            let estimate = measured.0.total;
            if estimate as f64 > soft_limit && !history.is_empty() {
                let fetched = history.len();
                let keep = ((fetched as f64) * soft_limit / estimate as f64).floor() as usize;
                history.drain(..fetched - keep.min(fetched));
                label = "adaptive (token-optimized)".into();
                has_more = true;
                info!(
                    channel_id,
                    estimate,
                    soft_limit = soft_limit as u64,
                    fetched,
                    kept = history.len(),
                    "Context over soft limit, shrinking history"
                );
                measured = self
                    .measure(request.system_prompt, summary.as_deref(), &history, &documents, request.current)
                    .await;
            }
        }

        let (count, breakdown) = measured;
        debug!(
            channel_id,
            strategy = %label,
            messages = history.len(),
            documents = documents.len(),
            tokens = count.total,
            degraded = count.degraded,
            "Context assembled"
        );

        let context = AssembledContext {
            channel_id: channel_id.to_string(),
            summary_prefix: summary,
            messages: history,
            documents,
            total_tokens: count.total,
            breakdown,
            strategy: label,
            has_more_history: has_more,
            degraded: count.degraded,
        };
        if context.exceeds_ceiling(&self.config) {
            warn!(
                channel_id,
                strategy = %context.strategy,
                tokens = context.total_tokens,
                ceiling = ceiling(&self.config),
                "Assembled context exceeds the window minus the response reserve"
            );
        }
        Ok(context)
    }

    /// Newest `limit` messages after the boundary. The flag reports a full page.
    async fn fetch_latest(
        &self,
        channel_id: &str,
        limit: usize,
        boundary: Option<String>,
    ) -> Result<(Vec<ChatMessage>, bool), TransportError> {
        let page = self
            .transport
            .fetch_messages(channel_id, FetchOptions::latest(limit).after(boundary))
            .await?;
        let full = limit > 0 && page.len() >= limit;
        Ok((page, full))
    }

    /// Page backwards from the newest message until history or the cap runs out.
    async fn fetch_all(
        &self,
        channel_id: &str,
        boundary: Option<String>,
    ) -> Result<(Vec<ChatMessage>, bool), TransportError> {
        let page_size = self.config.page_size.max(1);
        let cap = self.config.unlimited_cap;
        let mut collected: Vec<ChatMessage> = Vec::new();
        let mut before: Option<String> = None;
        let mut pages = 0;

        loop {
            let remaining = cap.saturating_sub(collected.len());
            if remaining == 0 {
                debug!(channel_id, cap, pages, "Unlimited fetch hit safety cap");
                return Ok((collected, true));
            }

            let size = page_size.min(remaining);
            let mut page = self
                .transport
                .fetch_messages(
                    channel_id,
                    FetchOptions::latest(size).after(boundary.clone()).before(before.clone()),
                )
                .await?;
            pages += 1;

            let exhausted = page.len() < size;
            before = page.first().map(|m| m.id.clone());
            page.append(&mut collected);
            collected = page;

            if exhausted || before.is_none() {
                return Ok((collected, false));
            }
        }
    }

    /// Count the payload and split the total across its parts.
    async fn measure(
        &self,
        system_prompt: &str,
        summary: Option<&str>,
        history: &[ChatMessage],
        documents: &[ContentBlock],
        current: Option<&ChatMessage>,
    ) -> (TokenCount, TokenBreakdown) {
        let preamble = compose_preamble(system_prompt, summary);
        let mut messages: Vec<Message> = history.iter().map(to_message).collect();
        let prompt_text = current.map(|m| m.content.clone()).unwrap_or_default();
        if current.is_some() || !documents.is_empty() {
            messages.push(Message::user(prompt_text.clone()).with_attachments(documents.to_vec()));
        }

        let count = self.estimator.count(&preamble, &messages).await;

        // Heuristic shares of each part, scaled to the authoritative total
        let system = token::estimate_tokens(system_prompt);
        let summary_tokens = token::estimate_tokens(&preamble).saturating_sub(system);
        let mut history_tokens: u32 = messages
            .iter()
            .take(history.len())
            .map(token::estimate_message_tokens)
            .sum();
        if messages.len() > history.len() {
            history_tokens += token::estimate_message_tokens(&Message::user(prompt_text));
        }
        let document_tokens: u32 = documents.iter().map(|b| token::estimate_chars(b.char_len())).sum();

        let parts = [summary_tokens, history_tokens, document_tokens, system];
        let share_sum: u64 = parts.iter().map(|&p| p as u64).sum();
        let scaled: Vec<u32> = if share_sum == 0 {
            vec![0; parts.len()]
        } else {
            parts
                .iter()
                .map(|&p| (p as u64 * count.total as u64 / share_sum) as u32)
                .collect()
        };
        let remainder = count.total.saturating_sub(scaled.iter().sum());

        let breakdown = TokenBreakdown {
            summary: scaled[0],
            messages: scaled[1] + remainder,
            documents: scaled[2],
            system: scaled[3],
            available: available_tokens(&self.config, count.total),
        };
        (count, breakdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use async_trait::async_trait;
    use threadwise_channels::LocalTransport;
    use threadwise_core::channel::{Attachment, Author};
    use threadwise_core::summary::WindowUpdate;
    use threadwise_memory::InMemorySummaryStore;

    async fn channel(count: usize) -> (Arc<LocalTransport>, Vec<ChatMessage>) {
        let transport = Arc::new(LocalTransport::new("Threadwise"));
        transport.add_channel("general", "general").await;
        let mut posted = Vec::new();
        for i in 0..count {
            posted.push(
                transport
                    .post("general", Author::user("u1", "Ada"), format!("message {i}"), vec![])
                    .await
                    .unwrap(),
            );
        }
        (transport, posted)
    }

    fn assembler(
        store: Arc<InMemorySummaryStore>,
        transport: Arc<LocalTransport>,
        estimator: TokenBudgetEstimator,
        config: ContextConfig,
    ) -> ContextAssembler {
        ContextAssembler::new(store, transport, estimator, config)
    }

    fn contents(messages: &[ChatMessage]) -> Vec<String> {
        messages.iter().map(|m| m.content.clone()).collect()
    }

    #[tokio::test]
    async fn fixed_without_window_returns_newest_limit() {
        let (transport, posted) = channel(20).await;
        let assembler = assembler(
            Arc::new(InMemorySummaryStore::new()),
            transport,
            TokenBudgetEstimator::heuristic(),
            ContextConfig::default(),
        );

        let ctx = assembler
            .assemble(AssemblyRequest::new("general", Strategy::Fixed { limit: Some(10) }))
            .await
            .unwrap();

        assert_eq!(ctx.messages.len(), 10);
        assert!(ctx.messages.iter().all(|m| posted.iter().any(|p| p.id == m.id)));
        assert_eq!(ctx.messages.last().unwrap().content, "message 19");
        assert_eq!(ctx.strategy, "fixed");
        assert!(ctx.has_more_history);
        assert!(ctx.summary_prefix.is_none());
    }

    #[tokio::test]
    async fn history_resumes_strictly_after_boundary() {
        let (transport, posted) = channel(10).await;
        let store = Arc::new(InMemorySummaryStore::new());
        store
            .create_or_update(WindowUpdate {
                channel_id: "general".into(),
                window_number: 1,
                summary: "Ada introduced the launch plan.".into(),
                file_descriptors: vec![],
                last_message_id: Some(posted[5].id.clone()),
                last_message_at: Some(posted[5].created_at),
            })
            .await
            .unwrap();

        let assembler = assembler(store, transport, TokenBudgetEstimator::heuristic(), ContextConfig::default());
        let ctx = assembler
            .assemble(AssemblyRequest::new("general", Strategy::Fixed { limit: None }).with_system_prompt("Be helpful."))
            .await
            .unwrap();

        assert_eq!(contents(&ctx.messages), vec!["message 6", "message 7", "message 8", "message 9"]);
        let boundary: u64 = posted[5].id.parse().unwrap();
        assert!(ctx.messages.iter().all(|m| m.id.parse::<u64>().unwrap() > boundary));

        let preamble = ctx.system_preamble("Be helpful.");
        assert!(preamble.starts_with("Be helpful."));
        assert!(preamble.contains("launch plan"));
    }

    #[tokio::test]
    async fn adaptive_within_soft_limit_is_unchanged() {
        let (transport, _) = channel(5).await;
        let assembler = assembler(
            Arc::new(InMemorySummaryStore::new()),
            transport,
            TokenBudgetEstimator::heuristic(),
            ContextConfig::default(),
        );

        let ctx = assembler
            .assemble(AssemblyRequest::new("general", Strategy::Adaptive { limit: None }))
            .await
            .unwrap();
        assert_eq!(ctx.messages.len(), 5);
        assert_eq!(ctx.strategy, "adaptive");
        assert!(!ctx.has_more_history);
        assert!(ctx.degraded);
        assert!(!ctx.exceeds_ceiling(assembler.config()));
    }

    #[tokio::test]
    async fn adaptive_explicit_limit_is_capped() {
        let (transport, _) = channel(250).await;
        let assembler = assembler(
            Arc::new(InMemorySummaryStore::new()),
            transport,
            TokenBudgetEstimator::heuristic(),
            ContextConfig::default(),
        );

        let ctx = assembler
            .assemble(AssemblyRequest::new("general", Strategy::Adaptive { limit: Some(500) }))
            .await
            .unwrap();
        assert_eq!(ctx.messages.len(), 200);
        assert_eq!(ctx.messages.last().unwrap().content, "message 249");
        assert!(ctx.has_more_history);

        let ctx = assembler
            .assemble(AssemblyRequest::new("general", Strategy::Adaptive { limit: Some(5) }))
            .await
            .unwrap();
        assert_eq!(ctx.messages.len(), 5);
    }

    #[tokio::test]
    async fn adaptive_shrinks_proportionally_over_soft_limit() {
        let (transport, _) = channel(40).await;
        // Soft limit 0.7 * 1000 = 700; counted estimate 2000; 30 fetched
        let provider = Arc::new(ScriptedProvider::new().with_token_count(2000));
        let config = ContextConfig {
            context_window: 1000,
            response_reserve: 100,
            ..ContextConfig::default()
        };
        let assembler = assembler(
            Arc::new(InMemorySummaryStore::new()),
            transport,
            TokenBudgetEstimator::new(provider, "mock-model"),
            config,
        );

        let ctx = assembler
            .assemble(AssemblyRequest::new("general", Strategy::Adaptive { limit: None }))
            .await
            .unwrap();

        // floor(30 * 700 / 2000) = 10
        assert_eq!(ctx.messages.len(), 10);
        // The recount still reports 2000 against a 900 ceiling
        assert!(ctx.exceeds_ceiling(assembler.config()));
        assert!(ctx.strategy.contains("token-optimized"));
        assert!(ctx.has_more_history);
        assert_eq!(ctx.messages.last().unwrap().content, "message 39");
        assert!(!ctx.degraded);
    }

    #[tokio::test]
    async fn unlimited_pages_up_to_cap() {
        let (transport, _) = channel(13).await;
        let config = ContextConfig {
            page_size: 4,
            unlimited_cap: 10,
            ..ContextConfig::default()
        };
        let assembler = assembler(Arc::new(InMemorySummaryStore::new()), transport, TokenBudgetEstimator::heuristic(), config);

        let ctx = assembler.assemble(AssemblyRequest::new("general", Strategy::Unlimited)).await.unwrap();
        assert_eq!(ctx.messages.len(), 10);
        assert_eq!(ctx.messages.first().unwrap().content, "message 3");
        assert_eq!(ctx.messages.last().unwrap().content, "message 12");
        assert!(ctx.has_more_history);
    }

    #[tokio::test]
    async fn unlimited_stops_when_history_runs_out() {
        let (transport, _) = channel(7).await;
        let config = ContextConfig {
            page_size: 4,
            ..ContextConfig::default()
        };
        let assembler = assembler(Arc::new(InMemorySummaryStore::new()), transport, TokenBudgetEstimator::heuristic(), config);

        let ctx = assembler.assemble(AssemblyRequest::new("general", Strategy::Unlimited)).await.unwrap();
        assert_eq!(ctx.messages.len(), 7);
        assert_eq!(ctx.messages.first().unwrap().content, "message 0");
        assert!(!ctx.has_more_history);
    }

    #[tokio::test]
    async fn breakdown_splits_authoritative_total() {
        let (transport, _) = channel(3).await;
        let provider = Arc::new(ScriptedProvider::new().with_token_count(500));
        let assembler = assembler(
            Arc::new(InMemorySummaryStore::new()),
            transport,
            TokenBudgetEstimator::new(provider, "mock-model"),
            ContextConfig::default(),
        );

        let ctx = assembler
            .assemble(
                AssemblyRequest::new("general", Strategy::Fixed { limit: None })
                    .with_system_prompt("You are a helpful assistant."),
            )
            .await
            .unwrap();

        let b = ctx.breakdown;
        assert_eq!(ctx.total_tokens, 500);
        assert_eq!(b.summary + b.messages + b.documents + b.system, 500);
        assert!(b.system > 0);
        assert_eq!(b.available, 200_000 - 500 - 4096);
    }

    struct NameResolver;

    #[async_trait]
    impl AttachmentResolver for NameResolver {
        async fn load(&self, attachment: &Attachment) -> Result<Option<ContentBlock>, TransportError> {
            Ok(Some(ContentBlock::Text {
                text: format!("{}@{}", attachment.name, attachment.url),
            }))
        }
    }

    #[tokio::test]
    async fn current_message_is_excluded_and_its_attachments_win() {
        let (transport, _) = channel(2).await;
        let file = |url: &str| Attachment {
            name: "plan.md".into(),
            size: 42,
            url: url.into(),
            mime_type: Some("text/markdown".into()),
        };
        transport
            .post("general", Author::user("u2", "Grace"), "older copy", vec![file("old")])
            .await
            .unwrap();
        let current = transport
            .post("general", Author::user("u1", "Ada"), "what does the plan say?", vec![file("new")])
            .await
            .unwrap();

        let assembler = assembler(
            Arc::new(InMemorySummaryStore::new()),
            transport,
            TokenBudgetEstimator::heuristic(),
            ContextConfig::default(),
        );
        let ctx = assembler
            .assemble(
                AssemblyRequest::new("general", Strategy::Fixed { limit: None })
                    .with_current(&current)
                    .with_resolver(&NameResolver),
            )
            .await
            .unwrap();

        assert!(ctx.messages.iter().all(|m| m.id != current.id));
        assert_eq!(ctx.messages.len(), 3);
        assert_eq!(ctx.documents, vec![ContentBlock::Text { text: "plan.md@new".into() }]);
        assert!(ctx.breakdown.documents > 0);
        assert!(ctx.has_documents());
    }

    #[tokio::test]
    async fn fetch_failure_propagates() {
        let (transport, _) = channel(0).await;
        let assembler = assembler(
            Arc::new(InMemorySummaryStore::new()),
            transport,
            TokenBudgetEstimator::heuristic(),
            ContextConfig::default(),
        );
        let err = assembler
            .assemble(AssemblyRequest::new("missing", Strategy::Adaptive { limit: None }))
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::Transport(TransportError::ChannelNotFound(_))));
    }

    #[test]
    fn own_messages_become_assistant_turns() {
        let mine = ChatMessage {
            id: "7".into(),
            author: Author::assistant("bot", "Threadwise"),
            content: "Done.".into(),
            created_at: chrono::Utc::now(),
            attachments: vec![],
        };
        let msg = to_message(&mine);
        assert_eq!(msg.role, threadwise_core::message::Role::Assistant);
        assert_eq!(msg.content, "Done.");
        assert_eq!(msg.metadata["message_id"], "7");

        let theirs = ChatMessage {
            author: Author::user("u1", "Ada"),
            ..mine
        };
        assert_eq!(to_message(&theirs).content, "Ada: Done.");
    }

    #[test]
    fn raw_fallback_is_degraded() {
        let msgs = vec![ChatMessage {
            id: "1".into(),
            author: Author::user("u1", "Ada"),
            content: "hello".into(),
            created_at: chrono::Utc::now(),
            attachments: vec![],
        }];
        let ctx = AssembledContext::from_raw_messages("t1", msgs, &ContextConfig::default());
        assert!(ctx.degraded);
        assert_eq!(ctx.strategy, "raw-fallback");
        assert_eq!(ctx.breakdown.messages, ctx.total_tokens);
    }
}
