//! # Threadwise Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! Threadwise context-assembly and orchestration engine. This crate has
//! **no framework dependencies**; every other crate implements against it.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (backend, chat transport, summary store,
//! attachment resolver) is a trait here. Implementations live in their
//! respective crates, so tests can swap in scripted stand-ins and the
//! dependency graph points inward on core.

pub mod attachment;
pub mod capability;
pub mod channel;
pub mod delegate;
pub mod error;
pub mod message;
pub mod provider;
pub mod summary;

// Re-export key types at crate root for ergonomics
pub use attachment::{AttachmentKind, AttachmentResolver};
pub use capability::{Capability, CapabilityCall, CapabilityRegistry, CapabilityResult};
pub use channel::{Attachment, Author, ChannelInfo, ChatMessage, ChatTransport, FetchOptions};
pub use delegate::{DelegateAnswer, DelegateRequest, DelegateService};
pub use error::{
    CapabilityError, DelegateError, Error, ProviderError, Result, StoreError, TransportError,
};
pub use message::{ContentBlock, Message, MessageToolCall, MessageToolResult, Role};
pub use provider::{
    EventStream, InvocationOrigin, Provider, ProviderRequest, ProviderResponse, StreamEvent,
    ToolDefinition, Usage,
};
pub use summary::{ConversationWindow, FileDescriptor, SummaryStore, WindowUpdate};
