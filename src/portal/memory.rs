//! Purpose: In-memory portal implementing every collaborator contract.
//! Exports: `MemoryPortal` and the names of its roots, states and transitions.
//! Role: Backs `portal-remote serve` and the controller tests.
//! Invariants: Two roots exist and cannot be deleted: `workspaces` and `sections`.
//! Invariants: Content under `sections` only arrives and leaves through the workflow.
//! Invariants: Expired locks are purged before any lock query or change.
#![allow(clippy::result_large_err)]

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use getrandom::fill as fill_random;
use time::OffsetDateTime;

use super::collaborators::{ContentRepository, HistoryEntry, LockInfo, LockManager, Workflow};
use crate::core::attachment::slug;
use crate::core::error::{Error, ErrorKind};
use crate::core::value::Document;
use crate::core::widgets::WidgetSlot;

pub const WORKSPACES: &str = "workspaces";
pub const SECTIONS: &str = "sections";

pub const DRAFT_STATE: &str = "work";
pub const PUBLISHED_STATE: &str = "published";

pub const PUBLISH_TRANSITION: &str = "copy_submit";
pub const UNPUBLISH_TRANSITION: &str = "unpublish";

const FOLDER_TYPES: [&str; 4] = ["Portal", "Workspace", "Section", "Folder"];
const WIDGET_TYPES: [&str; 2] = ["Flexible", "News Item"];

#[derive(Clone, Debug)]
struct Item {
    portal_type: String,
    state: String,
    fields: Document,
    children: Vec<String>,
    widgets: Vec<WidgetSlot>,
    history: Vec<HistoryEntry>,
    locks: Vec<LockInfo>,
}

impl Item {
    fn new(portal_type: &str, state: &str) -> Self {
        Self {
            portal_type: portal_type.to_string(),
            state: state.to_string(),
            fields: Document::new(),
            children: Vec::new(),
            widgets: Vec::new(),
            history: Vec::new(),
            locks: Vec::new(),
        }
    }

    fn is_folder(&self) -> bool {
        FOLDER_TYPES.contains(&self.portal_type.as_str())
    }

    fn purge_expired_locks(&mut self) {
        let now = OffsetDateTime::now_utc();
        self.locks.retain(|lock| !lock.is_expired(now));
    }
}

type Items = BTreeMap<String, Item>;

pub struct MemoryPortal {
    items: Mutex<Items>,
}

impl Default for MemoryPortal {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPortal {
    pub fn new() -> Self {
        let mut portal = Item::new("Portal", "");
        portal.children = vec![SECTIONS.to_string(), WORKSPACES.to_string()];
        let mut items = Items::new();
        items.insert(String::new(), portal);
        items.insert(SECTIONS.to_string(), Item::new("Section", ""));
        items.insert(WORKSPACES.to_string(), Item::new("Workspace", ""));
        Self {
            items: Mutex::new(items),
        }
    }

    /// Widget slots created on an item, in creation order.
    pub fn widgets(&self, rpath: &str) -> Result<Vec<WidgetSlot>, Error> {
        let items = self.guard();
        Ok(item(&items, &normalize(rpath))?.widgets.clone())
    }

    fn guard(&self) -> MutexGuard<'_, Items> {
        self.items
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl ContentRepository for MemoryPortal {
    fn exists(&self, rpath: &str) -> bool {
        self.guard().contains_key(&normalize(rpath))
    }

    fn portal_type(&self, rpath: &str) -> Result<String, Error> {
        let items = self.guard();
        Ok(item(&items, &normalize(rpath))?.portal_type.clone())
    }

    fn create(&self, folder: &str, portal_type: &str, id_hint: &str) -> Result<String, Error> {
        let folder = normalize(folder);
        let mut items = self.guard();
        let parent = item(&items, &folder)?;
        if !parent.is_folder() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("{folder} is not a folder")));
        }
        if in_sections(&folder) {
            return Err(Error::new(ErrorKind::Permission)
                .with_message(format!("cannot create content directly in {folder}"))
                .with_hint("Create it in a workspace, then publish it."));
        }
        let rpath = unique_path(&items, &folder, id_hint);
        let id = leaf(&rpath).to_string();
        items.insert(rpath.clone(), Item::new(portal_type, DRAFT_STATE));
        item_mut(&mut items, &folder)?.children.push(id);
        tracing::debug!(rpath = %rpath, portal_type, "created item");
        Ok(rpath)
    }

    fn fields(&self, rpath: &str) -> Result<Document, Error> {
        let items = self.guard();
        Ok(item(&items, &normalize(rpath))?.fields.clone())
    }

    fn edit(&self, rpath: &str, fields: Document) -> Result<(), Error> {
        let rpath = normalize(rpath);
        if in_sections(&rpath) {
            return Err(Error::new(ErrorKind::Permission)
                .with_message(format!("{rpath} is published content"))
                .with_hint("Edit the workspace original and publish it again."));
        }
        let mut items = self.guard();
        item_mut(&mut items, &rpath)?.fields.extend(fields);
        Ok(())
    }

    fn delete(&self, rpath: &str) -> Result<(), Error> {
        let rpath = normalize(rpath);
        if is_root(&rpath) {
            return Err(Error::new(ErrorKind::Permission)
                .with_message(format!("{} cannot be deleted", display_path(&rpath))));
        }
        let mut items = self.guard();
        remove_subtree(&mut items, &rpath)
    }

    fn descendants(&self, rpath: &str) -> Result<Vec<String>, Error> {
        let rpath = normalize(rpath);
        let items = self.guard();
        item(&items, &rpath)?;
        let prefix = if rpath.is_empty() {
            String::new()
        } else {
            format!("{rpath}/")
        };
        Ok(items
            .range(prefix.clone()..)
            .map(|(path, _)| path)
            .take_while(|path| path.starts_with(&prefix))
            .filter(|path| !path.is_empty())
            .cloned()
            .collect())
    }

    fn position(&self, rpath: &str) -> Result<usize, Error> {
        let rpath = normalize(rpath);
        let items = self.guard();
        item(&items, &rpath)?;
        let siblings = &item(&items, parent(&rpath))?.children;
        index_of(siblings, &rpath)
    }

    fn move_to(&self, rpath: &str, position: usize) -> Result<usize, Error> {
        let rpath = normalize(rpath);
        if is_root(&rpath) {
            return Err(Error::new(ErrorKind::Permission)
                .with_message(format!("{} cannot be moved", display_path(&rpath))));
        }
        let mut items = self.guard();
        item(&items, &rpath)?;
        let siblings = &mut item_mut(&mut items, parent(&rpath))?.children;
        let current = index_of(siblings, &rpath)?;
        let id = siblings.remove(current);
        let target = position.min(siblings.len());
        siblings.insert(target, id);
        Ok(target)
    }

    fn supports_widgets(&self, portal_type: &str) -> bool {
        WIDGET_TYPES.contains(&portal_type)
    }

    /// Re-adding a slot with the same kind is a no-op; a different kind at a
    /// taken index is a `Conflict`.
    fn add_widget(&self, rpath: &str, slot: WidgetSlot) -> Result<(), Error> {
        let rpath = normalize(rpath);
        let mut items = self.guard();
        let widgets = &mut item_mut(&mut items, &rpath)?.widgets;
        match widgets.iter().find(|existing| existing.index == slot.index) {
            Some(existing) if existing.kind == slot.kind => Ok(()),
            Some(existing) => Err(Error::new(ErrorKind::Conflict).with_message(format!(
                "{rpath}: slot {} already holds a {} widget",
                slot.index,
                existing.kind.as_str()
            ))),
            None => {
                widgets.push(slot);
                Ok(())
            }
        }
    }
}

impl Workflow for MemoryPortal {
    fn state(&self, rpath: &str) -> Result<String, Error> {
        let items = self.guard();
        Ok(item(&items, &normalize(rpath))?.state.clone())
    }

    fn allowed_transitions(&self, rpath: &str) -> Result<Vec<String>, Error> {
        let rpath = normalize(rpath);
        let items = self.guard();
        Ok(allowed_transitions(&rpath, item(&items, &rpath)?))
    }

    fn execute(
        &self,
        rpath: &str,
        transition: &str,
        destination: Option<&str>,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<Option<String>, Error> {
        let rpath = normalize(rpath);
        let mut items = self.guard();
        let source = item(&items, &rpath)?;
        if !allowed_transitions(&rpath, source).iter().any(|t| t == transition) {
            return Err(Error::new(ErrorKind::Conflict).with_message(format!(
                "transition {transition} is not allowed on {rpath} (state {})",
                source.state
            )));
        }
        let entry = HistoryEntry {
            action: transition.to_string(),
            time: OffsetDateTime::now_utc(),
            actor: actor.to_string(),
            comment: comment.map(str::to_string),
        };
        tracing::info!(rpath = %rpath, transition, actor, "workflow transition");

        match transition {
            PUBLISH_TRANSITION => {
                let Some(destination) = destination.map(normalize) else {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("{transition} needs a destination section")));
                };
                let section = item(&items, &destination)?;
                if !section.is_folder() || !in_sections(&destination) {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message(format!("{destination} is not a section")));
                }
                let mut copy = source.clone();
                copy.state = PUBLISHED_STATE.to_string();
                copy.children.clear();
                copy.locks.clear();
                copy.history.push(entry.clone());
                let copy_path = unique_path(&items, &destination, leaf(&rpath));
                let copy_id = leaf(&copy_path).to_string();
                items.insert(copy_path.clone(), copy);
                item_mut(&mut items, &destination)?.children.push(copy_id);
                item_mut(&mut items, &rpath)?.history.push(entry);
                Ok(Some(copy_path))
            }
            _ => {
                remove_subtree(&mut items, &rpath)?;
                Ok(None)
            }
        }
    }

    fn history(&self, rpath: &str) -> Result<Vec<HistoryEntry>, Error> {
        let items = self.guard();
        Ok(item(&items, &normalize(rpath))?.history.clone())
    }
}

impl LockManager for MemoryPortal {
    fn lock(&self, rpath: &str, owner: &str, timeout: Option<Duration>) -> Result<String, Error> {
        let rpath = normalize(rpath);
        let token = new_lock_token()?;
        let mut items = self.guard();
        let target = item_mut(&mut items, &rpath)?;
        target.purge_expired_locks();
        target.locks.push(LockInfo {
            owner: owner.to_string(),
            token: token.clone(),
            expires_at: timeout.map(|timeout| OffsetDateTime::now_utc() + timeout),
        });
        Ok(token)
    }

    fn locks(&self, rpath: &str) -> Result<Vec<LockInfo>, Error> {
        let rpath = normalize(rpath);
        let mut items = self.guard();
        let target = item_mut(&mut items, &rpath)?;
        target.purge_expired_locks();
        Ok(target.locks.clone())
    }

    fn unlock(&self, rpath: &str, token: &str) -> Result<(), Error> {
        let rpath = normalize(rpath);
        let mut items = self.guard();
        let target = item_mut(&mut items, &rpath)?;
        target.purge_expired_locks();
        let Some(index) = target.locks.iter().position(|lock| lock.token == token) else {
            return Err(Error::new(ErrorKind::Conflict)
                .with_message(format!("{rpath} holds no lock {token}")));
        };
        target.locks.remove(index);
        Ok(())
    }

    fn clear(&self, rpath: &str) -> Result<usize, Error> {
        let rpath = normalize(rpath);
        let mut items = self.guard();
        let target = item_mut(&mut items, &rpath)?;
        target.purge_expired_locks();
        Ok(target.locks.drain(..).count())
    }
}

fn allowed_transitions(rpath: &str, item: &Item) -> Vec<String> {
    if item.is_folder() {
        return Vec::new();
    }
    if in_sections(rpath) {
        vec![UNPUBLISH_TRANSITION.to_string()]
    } else {
        vec![PUBLISH_TRANSITION.to_string()]
    }
}

fn item<'a>(items: &'a Items, rpath: &str) -> Result<&'a Item, Error> {
    items.get(rpath).ok_or_else(|| not_found(rpath))
}

fn item_mut<'a>(items: &'a mut Items, rpath: &str) -> Result<&'a mut Item, Error> {
    items.get_mut(rpath).ok_or_else(|| not_found(rpath))
}

fn not_found(rpath: &str) -> Error {
    Error::new(ErrorKind::NotFound).with_message(format!("{}: no such item", display_path(rpath)))
}

fn remove_subtree(items: &mut Items, rpath: &str) -> Result<(), Error> {
    item(items, rpath)?;
    let prefix = format!("{rpath}/");
    items.retain(|path, _| path != rpath && !path.starts_with(&prefix));
    let id = leaf(rpath);
    item_mut(items, parent(rpath))?
        .children
        .retain(|child| child != id);
    Ok(())
}

fn unique_path(items: &Items, folder: &str, id_hint: &str) -> String {
    let mut base = slug(&id_hint.to_lowercase());
    if base.is_empty() {
        base.push_str("item");
    }
    let mut candidate = join(folder, &base);
    let mut counter = 2;
    while items.contains_key(&candidate) {
        candidate = join(folder, &format!("{base}-{counter}"));
        counter += 1;
    }
    candidate
}

fn index_of(siblings: &[String], rpath: &str) -> Result<usize, Error> {
    let id = leaf(rpath);
    siblings
        .iter()
        .position(|child| child == id)
        .ok_or_else(|| not_found(rpath))
}

fn new_lock_token() -> Result<String, Error> {
    let mut bytes = [0u8; 16];
    fill_random(&mut bytes).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message(format!("failed to generate lock token: {err}"))
    })?;
    let hex: String = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(format!(
        "opaquelocktoken:{}-{}-{}-{}-{}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    ))
}

fn normalize(rpath: &str) -> String {
    rpath.trim().trim_matches('/').to_string()
}

fn parent(rpath: &str) -> &str {
    rpath.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn leaf(rpath: &str) -> &str {
    rpath.rsplit_once('/').map_or(rpath, |(_, leaf)| leaf)
}

fn join(folder: &str, id: &str) -> String {
    if folder.is_empty() {
        id.to_string()
    } else {
        format!("{folder}/{id}")
    }
}

fn is_root(rpath: &str) -> bool {
    rpath.is_empty() || rpath == WORKSPACES || rpath == SECTIONS
}

fn in_sections(rpath: &str) -> bool {
    rpath
        .strip_prefix(SECTIONS)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn display_path(rpath: &str) -> &str {
    if rpath.is_empty() { "portal root" } else { rpath }
}
