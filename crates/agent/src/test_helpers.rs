//! Shared test helpers: a scripted provider and event builders.

use std::collections::VecDeque;
use std::sync::Mutex;
use threadwise_core::error::ProviderError;
use threadwise_core::message::Message;
use threadwise_core::provider::{
    EventStream, InvocationOrigin, Provider, ProviderRequest, ProviderResponse, StreamEvent, Usage,
};

/// One scripted `stream` call: a failure to open, or items to send.
enum Round {
    Failed(ProviderError),
    Items(Vec<Result<StreamEvent, ProviderError>>),
}

/// A mock provider that plays back scripted stream rounds and completions.
///
/// Each `stream` call pops the next round; once the queue is empty the
/// `repeat` round (if any) is replayed forever. Panics when nothing is left.
pub struct ScriptedProvider {
    rounds: Mutex<VecDeque<Round>>,
    repeat: Option<Vec<StreamEvent>>,
    completions: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    token_count: Option<u32>,
    stream_requests: Mutex<Vec<ProviderRequest>>,
    complete_requests: Mutex<Vec<ProviderRequest>>,
    count_requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            rounds: Mutex::new(VecDeque::new()),
            repeat: None,
            completions: Mutex::new(VecDeque::new()),
            token_count: None,
            stream_requests: Mutex::new(Vec::new()),
            complete_requests: Mutex::new(Vec::new()),
            count_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_round(self, events: Vec<StreamEvent>) -> Self {
        self.rounds
            .lock()
            .unwrap()
            .push_back(Round::Items(events.into_iter().map(Ok).collect()));
        self
    }

    pub fn with_failed_round(self, error: ProviderError) -> Self {
        self.rounds.lock().unwrap().push_back(Round::Failed(error));
        self
    }

    /// A stream that opens, sends `events`, then fails with `error`.
    pub fn with_interrupted_round(self, events: Vec<StreamEvent>, error: ProviderError) -> Self {
        let mut items: Vec<Result<StreamEvent, ProviderError>> = events.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.rounds.lock().unwrap().push_back(Round::Items(items));
        self
    }

    pub fn repeating(mut self, events: Vec<StreamEvent>) -> Self {
        self.repeat = Some(events);
        self
    }

    pub fn with_completion(self, response: ProviderResponse) -> Self {
        self.completions.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn with_failed_completion(self, error: ProviderError) -> Self {
        self.completions.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn with_token_count(mut self, total: u32) -> Self {
        self.token_count = Some(total);
        self
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_requests.lock().unwrap().len()
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_requests.lock().unwrap().len()
    }

    pub fn stream_request(&self, n: usize) -> ProviderRequest {
        self.stream_requests.lock().unwrap()[n].clone()
    }

    pub fn last_complete_request(&self) -> Option<ProviderRequest> {
        self.complete_requests.lock().unwrap().last().cloned()
    }

    pub fn last_count_request(&self) -> Option<ProviderRequest> {
        self.count_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.complete_requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no completion scripted for call #{call}"))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<EventStream, ProviderError> {
        let call = {
            let mut requests = self.stream_requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let next = self.rounds.lock().unwrap().pop_front();
        let items = match next {
            Some(Round::Failed(error)) => return Err(error),
            Some(Round::Items(items)) => items,
            None => self
                .repeat
                .clone()
                .unwrap_or_else(|| panic!("ScriptedProvider: no round scripted for call #{call}"))
                .into_iter()
                .map(Ok)
                .collect(),
        };

        let (tx, rx) = tokio::sync::mpsc::channel(items.len().max(1));
        for item in items {
            let _ = tx.send(item).await;
        }
        Ok(rx)
    }

    async fn count_tokens(&self, request: &ProviderRequest) -> Result<u32, ProviderError> {
        self.count_requests.lock().unwrap().push(request.clone());
        self.token_count
            .ok_or_else(|| ProviderError::NotConfigured("no token count scripted".into()))
    }
}

pub fn text(text: &str) -> StreamEvent {
    StreamEvent::TextDelta { text: text.into() }
}

pub fn done() -> StreamEvent {
    StreamEvent::Done {
        stop_reason: Some("end_turn".into()),
    }
}

/// Start, one input fragment, and stop for an invocation at `index`.
pub fn invocation(index: usize, name: &str, origin: InvocationOrigin, input: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::InvocationStart {
            index,
            id: format!("call_{index}_{name}"),
            name: name.into(),
            origin,
        },
        StreamEvent::InvocationInputDelta {
            index,
            fragment: input.into(),
        },
        StreamEvent::InvocationStop { index },
    ]
}

/// A plain text round that ends the turn.
pub fn text_round(answer: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::Usage { usage: Usage::new(10, 5) },
        text(answer),
        done(),
    ]
}

pub fn text_response(text: &str, usage: Usage) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(usage),
        model: "mock-model".into(),
        stop_reason: Some("end_turn".into()),
    }
}
