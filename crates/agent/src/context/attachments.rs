//! Reference-document collection for an assembled context.
//!
//! Attachments come from the current message and a bounded scan of recent
//! history. The same file is often re-posted, so candidates are
//! deduplicated by (name, size): the current message wins, otherwise the
//! newest copy. The result is ordered current-message first, then images,
//! documents and text.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use threadwise_core::attachment::{AttachmentKind, AttachmentResolver};
use threadwise_core::channel::{Attachment, ChatMessage};
use threadwise_core::message::ContentBlock;
use tracing::{debug, warn};

/// An attachment selected for loading.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedAttachment {
    pub attachment: Attachment,
    pub kind: AttachmentKind,
    pub from_current: bool,
    pub posted_at: DateTime<Utc>,
}

/// Pick the attachments to load, deduplicated and in priority order.
///
/// `history` is oldest-first; only its newest `scan_messages` entries are
/// considered.
pub fn select_attachments(
    current: Option<&ChatMessage>,
    history: &[ChatMessage],
    scan_messages: usize,
) -> Vec<SelectedAttachment> {
    let mut chosen: HashMap<(String, u64), SelectedAttachment> = HashMap::new();

    let current_iter = current
        .into_iter()
        .flat_map(|m| m.attachments.iter().map(move |a| (a, true, m.created_at)));
    let history_iter = history
        .iter()
        .rev()
        .filter(|m| current.is_none_or(|c| c.id != m.id))
        .take(scan_messages)
        .flat_map(|m| m.attachments.iter().map(move |a| (a, false, m.created_at)));

    for (attachment, from_current, posted_at) in current_iter.chain(history_iter) {
        let kind = AttachmentKind::classify(attachment);
        if kind == AttachmentKind::Unsupported {
            debug!(name = %attachment.name, "Ignoring unsupported attachment");
            continue;
        }

        let candidate = SelectedAttachment {
            attachment: attachment.clone(),
            kind,
            from_current,
            posted_at,
        };
        chosen
            .entry(attachment.dedup_key())
            .and_modify(|existing| {
                if !existing.from_current && candidate.posted_at > existing.posted_at {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }

    let mut selected: Vec<SelectedAttachment> = chosen.into_values().collect();
    selected.sort_by(|a, b| {
        b.from_current
            .cmp(&a.from_current)
            .then(a.kind.cmp(&b.kind))
            .then(b.posted_at.cmp(&a.posted_at))
            .then(a.attachment.name.cmp(&b.attachment.name))
    });
    selected
}

/// Select and load attachments into content blocks.
///
/// A file that fails to download is skipped; it never fails the assembly.
pub async fn collect_documents(
    current: Option<&ChatMessage>,
    history: &[ChatMessage],
    scan_messages: usize,
    resolver: &dyn AttachmentResolver,
) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    for selected in select_attachments(current, history, scan_messages) {
        match resolver.load(&selected.attachment).await {
            Ok(Some(block)) => blocks.push(block),
            Ok(None) => {}
            Err(e) => warn!(name = %selected.attachment.name, error = %e, "Attachment load failed, skipping"),
        }
    }
    blocks
}
