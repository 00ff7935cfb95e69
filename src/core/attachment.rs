//! Purpose: Turn the binary side-channel of a document definition into an attachment.
//! Exports: `extract_attachment`, `attachment_id`, control key constants.
//! Role: Used by document creation and edition before fields reach the repository.
//! Invariants: A payload that is not binary is discarded without error.
//! Invariants: Attachment ids depend only on the lower-cased filename.
use sha2::{Digest, Sha256};

use super::value::{Attachment, Document, Value};

pub const PAYLOAD_KEY: &str = "file";
pub const FILENAME_KEY: &str = "file_name";
pub const TARGET_KEY: &str = "file_key";
pub const DEFAULT_FILENAME: &str = "Uploaded file";

/// Convert `doc[file]` into an attachment stored under `doc[file_key]`
/// (default `file`), named after `doc[file_name]` (default "Uploaded file").
///
/// The control keys are removed afterwards unless `keep_control_keys` is set.
/// Returns the field the attachment was stored under, if any.
pub fn extract_attachment(doc: &mut Document, keep_control_keys: bool) -> Option<String> {
    let filename = doc
        .get(FILENAME_KEY)
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_FILENAME)
        .to_string();
    let target = doc
        .get(TARGET_KEY)
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
        .unwrap_or(PAYLOAD_KEY)
        .to_string();

    let payload = if keep_control_keys {
        doc.get(PAYLOAD_KEY).cloned()
    } else {
        doc.remove(PAYLOAD_KEY)
    };
    if !keep_control_keys {
        doc.remove(FILENAME_KEY);
        doc.remove(TARGET_KEY);
    }

    let attachment = match payload? {
        Value::Bytes(data) => Attachment {
            id: attachment_id(&filename),
            filename,
            data,
        },
        Value::File(existing) => existing,
        other => {
            tracing::debug!(kind = other.type_name(), "discarding non-binary file payload");
            return None;
        }
    };
    doc.insert(target.clone(), Value::File(attachment));
    Some(target)
}

/// Identifier for an attachment named `filename`.
///
/// `Report 2005.PDF` becomes `report-2005-<8 hex digits>.pdf`, the digits being
/// a prefix of the SHA-256 of the lower-cased name.
pub fn attachment_id(filename: &str) -> String {
    let lowered = filename.to_lowercase();
    let digest = Sha256::digest(lowered.as_bytes());
    let suffix: String = digest[..4].iter().map(|byte| format!("{byte:02x}")).collect();

    let (stem, extension) = match lowered.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (lowered.as_str(), None),
    };
    let mut id = slug(stem);
    if id.is_empty() {
        id.push_str("file");
    }
    id.push('-');
    id.push_str(&suffix);
    if let Some(ext) = extension.map(slug).filter(|ext| !ext.is_empty()) {
        id.push('.');
        id.push_str(&ext);
    }
    id
}

pub(crate) fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
