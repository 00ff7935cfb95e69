//! Purpose: Contracts the remote controller needs from the hosting portal.
//! Exports: `ContentRepository`, `Workflow`, `LockManager`, `LockInfo`, `HistoryEntry`.
//! Role: Seams between the controller and the content, workflow and lock engines.
//! Invariants: Missing items fail with `NotFound`, forbidden access with `Permission`.
//! Invariants: A refused workflow transition fails with `Conflict`.
#![allow(clippy::result_large_err)]

use std::time::Duration;

use time::OffsetDateTime;

use crate::core::error::Error;
use crate::core::value::Document;
use crate::core::widgets::WidgetSlot;

/// One WebDAV-style lock held on an item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockInfo {
    pub owner: String,
    pub token: String,
    pub expires_at: Option<OffsetDateTime>,
}

impl LockInfo {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// One workflow event recorded on an item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub action: String,
    pub time: OffsetDateTime,
    pub actor: String,
    pub comment: Option<String>,
}

/// Storage of content items addressed by relative path (`workspaces/doc1`).
pub trait ContentRepository: Send + Sync {
    fn exists(&self, rpath: &str) -> bool;

    fn portal_type(&self, rpath: &str) -> Result<String, Error>;

    /// Create an empty item of `portal_type` inside `folder`. The id is derived
    /// from `id_hint` and made unique within the folder.
    fn create(&self, folder: &str, portal_type: &str, id_hint: &str) -> Result<String, Error>;

    fn fields(&self, rpath: &str) -> Result<Document, Error>;

    /// Merge `fields` into the item, overwriting existing keys.
    fn edit(&self, rpath: &str, fields: Document) -> Result<(), Error>;

    /// Delete the item and everything below it.
    fn delete(&self, rpath: &str) -> Result<(), Error>;

    /// Paths of every item below `rpath`.
    fn descendants(&self, rpath: &str) -> Result<Vec<String>, Error>;

    /// Zero-based position of the item in its folder.
    fn position(&self, rpath: &str) -> Result<usize, Error>;

    /// Move the item to `position`, clamped to the folder bounds; returns the
    /// position it ended up at.
    fn move_to(&self, rpath: &str, position: usize) -> Result<usize, Error>;

    /// Whether items of `portal_type` are built from widget slots.
    fn supports_widgets(&self, portal_type: &str) -> bool;

    fn add_widget(&self, rpath: &str, slot: WidgetSlot) -> Result<(), Error>;
}

pub trait Workflow: Send + Sync {
    fn state(&self, rpath: &str) -> Result<String, Error>;

    fn allowed_transitions(&self, rpath: &str) -> Result<Vec<String>, Error>;

    /// Run `transition` on the item. Copying transitions take a destination
    /// folder and return the path of the copy.
    fn execute(
        &self,
        rpath: &str,
        transition: &str,
        destination: Option<&str>,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<Option<String>, Error>;

    fn history(&self, rpath: &str) -> Result<Vec<HistoryEntry>, Error>;
}

pub trait LockManager: Send + Sync {
    /// Add a lock owned by `owner` and return its token.
    fn lock(&self, rpath: &str, owner: &str, timeout: Option<Duration>) -> Result<String, Error>;

    /// Live locks on the item, oldest first.
    fn locks(&self, rpath: &str) -> Result<Vec<LockInfo>, Error>;

    /// Release the lock identified by `token`; an unknown token is a `Conflict`.
    fn unlock(&self, rpath: &str, token: &str) -> Result<(), Error>;

    /// Release every lock on the item; returns how many were released.
    fn clear(&self, rpath: &str) -> Result<usize, Error>;
}

#[cfg(test)]
mod tests {
    use super::LockInfo;
    use time::Duration;
    use time::macros::datetime;

    #[test]
    fn lock_without_expiry_never_expires() {
        let lock = LockInfo {
            owner: "manager".to_string(),
            token: "opaquelocktoken:1".to_string(),
            expires_at: None,
        };
        assert!(!lock.is_expired(datetime!(2100-01-01 0:00 UTC)));
    }

    #[test]
    fn lock_expires_at_its_deadline() {
        let deadline = datetime!(2005-11-29 22:08 UTC);
        let lock = LockInfo {
            owner: "manager".to_string(),
            token: "opaquelocktoken:1".to_string(),
            expires_at: Some(deadline),
        };
        assert!(!lock.is_expired(deadline - Duration::seconds(1)));
        assert!(lock.is_expired(deadline));
    }
}
