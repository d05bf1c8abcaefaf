//! AttachmentResolver trait: turns a chat attachment into a content block.
//!
//! Format decoding lives behind this trait. Deduplication and ordering of
//! attachments across a conversation are done by the context assembler,
//! which calls `load` once per surviving attachment.

use crate::channel::Attachment;
use crate::error::TransportError;
use crate::message::ContentBlock;
use async_trait::async_trait;

/// Broad classification of an attachment, used for priority ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AttachmentKind {
    Image,
    Document,
    Text,
    Unsupported,
}

impl AttachmentKind {
    /// Classify by MIME type, falling back to the file extension.
    pub fn classify(attachment: &Attachment) -> Self {
        if let Some(mime) = attachment.mime_type.as_deref() {
            let mime = mime.split(';').next().unwrap_or(mime).trim();
            if mime.starts_with("image/") {
                return Self::Image;
            }
            if mime == "application/pdf" {
                return Self::Document;
            }
            if mime.starts_with("text/") || mime == "application/json" {
                return Self::Text;
            }
        }

        let ext = attachment
            .name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" => Self::Image,
            "pdf" => Self::Document,
            "txt" | "md" | "csv" | "json" | "log" | "rs" | "py" | "js" | "ts" | "toml" | "yaml" | "yml" => Self::Text,
            _ => Self::Unsupported,
        }
    }
}

#[async_trait]
pub trait AttachmentResolver: Send + Sync {
    /// Load one attachment. `Ok(None)` means the file is skipped
    /// (unsupported type, too large).
    async fn load(&self, attachment: &Attachment) -> std::result::Result<Option<ContentBlock>, TransportError>;
}
