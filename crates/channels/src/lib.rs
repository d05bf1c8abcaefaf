//! Chat transport implementations for Threadwise.
//!
//! - **Local**: in-process channels and threads, used by the CLI and tests
//! - **Attachments**: HTTP resolver turning chat attachments into content blocks

pub mod attachments;
pub mod local;

pub use attachments::HttpAttachmentResolver;
pub use local::LocalTransport;
