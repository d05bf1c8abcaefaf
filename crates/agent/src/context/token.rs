//! Token budget estimation.
//!
//! The provider's token-counting endpoint is authoritative. When it is
//! unavailable the estimator falls back to a character heuristic
//! (~4 characters per token) and marks the count as degraded.

use std::sync::Arc;
use threadwise_core::message::Message;
use threadwise_core::provider::{Provider, ProviderRequest};
use tracing::debug;

/// Fixed per-message cost for role markers and delimiters.
const MESSAGE_OVERHEAD: u32 = 4;

/// A token count and whether it came from the heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCount {
    pub total: u32,
    pub degraded: bool,
}

/// Estimate the token count for a run of characters. Rounds up.
pub fn estimate_chars(chars: usize) -> u32 {
    chars.div_ceil(4) as u32
}

/// Estimate tokens for a string.
pub fn estimate_tokens(text: &str) -> u32 {
    estimate_chars(text.len())
}

/// Estimate tokens for a single message including per-message overhead.
pub fn estimate_message_tokens(message: &Message) -> u32 {
    MESSAGE_OVERHEAD + estimate_chars(message.char_len())
}

/// Estimate tokens for a system prompt plus messages.
pub fn estimate_payload(system: &str, messages: &[Message]) -> u32 {
    estimate_tokens(system) + messages.iter().map(estimate_message_tokens).sum::<u32>()
}

pub struct TokenBudgetEstimator {
    provider: Option<Arc<dyn Provider>>,
    model: String,
}

impl TokenBudgetEstimator {
    /// Count with the provider's endpoint, falling back to the heuristic.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            model: model.into(),
        }
    }

    /// Heuristic-only estimator. Every count is degraded.
    pub fn heuristic() -> Self {
        Self {
            provider: None,
            model: String::new(),
        }
    }

    /// Count the tokens of the exact payload that will be sent.
    pub async fn count(&self, system: &str, messages: &[Message]) -> TokenCount {
        let Some(provider) = &self.provider else {
            return Self::fallback(system, messages);
        };

        let mut payload = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            payload.push(Message::system(system));
        }
        payload.extend_from_slice(messages);
        let request = ProviderRequest::new(self.model.clone(), payload);

        match provider.count_tokens(&request).await {
            Ok(total) => TokenCount { total, degraded: false },
            Err(e) => {
                debug!(provider = provider.name(), error = %e, "Token count unavailable, using heuristic");
                Self::fallback(system, messages)
            }
        }
    }

    fn fallback(system: &str, messages: &[Message]) -> TokenCount {
        TokenCount {
            total: estimate_payload(system, messages),
            degraded: true,
        }
    }
}
