//! One streaming generation round.
//!
//! `StreamSession` folds provider events into visible text, a hidden
//! reasoning trace and a list of capability invocations. Invocations are
//! keyed by content index. An input fragment can arrive before the start
//! event for its index; it is kept in a placeholder that the start event
//! then fills in.

use std::collections::BTreeMap;
use threadwise_core::provider::{InvocationOrigin, StreamEvent, Usage};
use tracing::{trace, warn};

/// A finalized capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityInvocation {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub origin: InvocationOrigin,
    /// Always a JSON object; `{}` when the fragments never parsed
    pub input: serde_json::Value,
}

#[derive(Debug, Default)]
struct PendingInvocation {
    id: Option<String>,
    name: Option<String>,
    origin: Option<InvocationOrigin>,
    buffer: String,
    input: Option<serde_json::Value>,
}

impl PendingInvocation {
    fn finalize(&mut self) {
        if self.input.is_none() {
            self.input = Some(parse_input(self.name.as_deref().unwrap_or("?"), &self.buffer));
        }
    }
}

/// Parse accumulated fragments into an object, defaulting to `{}`.
pub fn parse_input(name: &str, buffer: &str) -> serde_json::Value {
    if buffer.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str::<serde_json::Value>(buffer) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(other) => {
            warn!(capability = name, kind = ?other, "Invocation input is not an object, using {{}}");
            serde_json::json!({})
        }
        Err(e) => {
            warn!(capability = name, error = %e, "Malformed invocation input, using {{}}");
            serde_json::json!({})
        }
    }
}

/// What a finished round produced.
#[derive(Debug, Clone, Default)]
pub struct RoundResult {
    pub text: String,
    pub invocations: Vec<CapabilityInvocation>,
    pub usage: Option<Usage>,
    pub stop_reason: Option<String>,
}

impl RoundResult {
    pub fn client_invocations(&self) -> impl Iterator<Item = &CapabilityInvocation> {
        self.invocations
            .iter()
            .filter(|i| i.origin == InvocationOrigin::Client)
    }

    pub fn backend_invocations(&self) -> impl Iterator<Item = &CapabilityInvocation> {
        self.invocations
            .iter()
            .filter(|i| i.origin == InvocationOrigin::Backend)
    }
}

#[derive(Debug, Default)]
pub struct StreamSession {
    text: String,
    reasoning: String,
    invocations: BTreeMap<usize, PendingInvocation>,
    usage: Option<Usage>,
    stop_reason: Option<String>,
    done: bool,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::TextDelta { text } => self.text.push_str(&text),
            StreamEvent::ReasoningDelta { text } => {
                trace!(reasoning = %text, "Reasoning delta");
                self.reasoning.push_str(&text);
            }
            StreamEvent::InvocationStart { index, id, name, origin } => {
                let pending = self.invocations.entry(index).or_default();
                if !pending.buffer.is_empty() {
                    trace!(index, name = %name, "Merging early input into invocation");
                }
                pending.id = Some(id);
                pending.name = Some(name);
                pending.origin = Some(origin);
            }
            StreamEvent::InvocationInputDelta { index, fragment } => {
                self.invocations.entry(index).or_default().buffer.push_str(&fragment);
            }
            StreamEvent::InvocationStop { index } => match self.invocations.get_mut(&index) {
                Some(pending) => pending.finalize(),
                None => warn!(index, "Stop for unknown invocation"),
            },
            StreamEvent::Usage { usage } => self.usage = Some(usage),
            StreamEvent::Done { stop_reason } => {
                self.stop_reason = stop_reason;
                self.done = true;
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Characters of hidden reasoning seen this round.
    pub fn reasoning_len(&self) -> usize {
        self.reasoning.len()
    }

    /// Close the round. Invocations that never stopped are finalized from
    /// whatever input arrived; ones that never started are dropped.
    pub fn finish(self) -> RoundResult {
        let mut invocations = Vec::with_capacity(self.invocations.len());
        for (index, mut pending) in self.invocations {
            pending.finalize();
            match (pending.id, pending.name) {
                (Some(id), Some(name)) => invocations.push(CapabilityInvocation {
                    index,
                    id,
                    name,
                    origin: pending.origin.unwrap_or(InvocationOrigin::Client),
                    input: pending.input.unwrap_or_else(|| serde_json::json!({})),
                }),
                _ => warn!(index, "Dropping invocation input with no start event"),
            }
        }

        RoundResult {
            text: self.text,
            invocations,
            usage: self.usage,
            stop_reason: self.stop_reason,
        }
    }
}
