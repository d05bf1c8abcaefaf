//! HTTP attachment resolver.
//!
//! Downloads attachment bytes from the platform CDN and wraps them as
//! content blocks: images and PDFs as base64 source blocks, text files as
//! text blocks. Oversized and unsupported files are skipped.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use threadwise_core::attachment::{AttachmentKind, AttachmentResolver};
use threadwise_core::channel::Attachment;
use threadwise_core::error::TransportError;
use threadwise_core::message::ContentBlock;
use tracing::{debug, warn};

/// Default cap on downloaded file size (10 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Default cap on characters kept from a text attachment.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 100_000;

pub struct HttpAttachmentResolver {
    client: reqwest::Client,
    max_bytes: u64,
    max_text_chars: usize,
}

impl HttpAttachmentResolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            max_bytes: DEFAULT_MAX_BYTES,
            max_text_chars: DEFAULT_MAX_TEXT_CHARS,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_max_text_chars(mut self, max_text_chars: usize) -> Self {
        self.max_text_chars = max_text_chars;
        self
    }

    /// MIME type for a block: the platform's value if present, else a guess
    /// from the extension.
    fn media_type(attachment: &Attachment, kind: AttachmentKind) -> String {
        if let Some(mime) = attachment.mime_type.as_deref() {
            return mime.split(';').next().unwrap_or(mime).trim().to_string();
        }
        let ext = attachment
            .name
            .rsplit_once('.')
            .map(|(_, e)| e.to_ascii_lowercase())
            .unwrap_or_default();
        match (kind, ext.as_str()) {
            (AttachmentKind::Image, "jpg" | "jpeg") => "image/jpeg".into(),
            (AttachmentKind::Image, "gif") => "image/gif".into(),
            (AttachmentKind::Image, "webp") => "image/webp".into(),
            (AttachmentKind::Image, _) => "image/png".into(),
            (AttachmentKind::Document, _) => "application/pdf".into(),
            _ => "text/plain".into(),
        }
    }

    /// Wrap downloaded bytes as a content block.
    fn to_block(&self, attachment: &Attachment, kind: AttachmentKind, bytes: &[u8]) -> Option<ContentBlock> {
        match kind {
            AttachmentKind::Image => Some(ContentBlock::Image {
                media_type: Self::media_type(attachment, kind),
                data: STANDARD.encode(bytes),
            }),
            AttachmentKind::Document => Some(ContentBlock::Document {
                media_type: Self::media_type(attachment, kind),
                data: STANDARD.encode(bytes),
                name: Some(attachment.name.clone()),
            }),
            AttachmentKind::Text => {
                let text = String::from_utf8_lossy(bytes);
                let body: String = text.chars().take(self.max_text_chars).collect();
                Some(ContentBlock::Text {
                    text: format!("[File: {}]\n{}", attachment.name, body),
                })
            }
            AttachmentKind::Unsupported => None,
        }
    }
}

impl Default for HttpAttachmentResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AttachmentResolver for HttpAttachmentResolver {
    async fn load(&self, attachment: &Attachment) -> Result<Option<ContentBlock>, TransportError> {
        let kind = AttachmentKind::classify(attachment);
        if kind == AttachmentKind::Unsupported {
            debug!(name = %attachment.name, "Skipping unsupported attachment");
            return Ok(None);
        }
        if attachment.size > self.max_bytes {
            debug!(
                name = %attachment.name,
                size = attachment.size,
                max = self.max_bytes,
                "Skipping oversized attachment"
            );
            return Ok(None);
        }

        let response = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| TransportError::Attachment(format!("{}: {e}", attachment.name)))?;

        if !response.status().is_success() {
            warn!(name = %attachment.name, status = response.status().as_u16(), "Attachment download failed");
            return Err(TransportError::Attachment(format!(
                "{}: HTTP {}",
                attachment.name,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Attachment(format!("{}: {e}", attachment.name)))?;

        Ok(self.to_block(attachment, kind, &bytes))
    }
}
