//! Context assembly: summary prefix, recent history and reference
//! documents, bounded by the token budget.

pub mod assembler;
pub mod attachments;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyError, AssemblyRequest, ContextAssembler, Strategy, TokenBreakdown, to_message,
};
pub use attachments::{SelectedAttachment, collect_documents, select_attachments};
pub use token::{TokenBudgetEstimator, TokenCount};
