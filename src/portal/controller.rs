//! Purpose: Expose portal operations by name to remote callers.
//! Exports: `RemoteController`, `VERSION`.
//! Role: Server side of the protocol; `serve` feeds it request envelopes.
//! Invariants: Arguments are unmarshalled before use and results marshalled after.
//! Invariants: Positional arguments win over keyword arguments of the same name.
//! Invariants: Every failure becomes a fault whose code follows the error kind.
#![allow(clippy::result_large_err)]

use std::sync::Arc;

use serde_json::Value as Json;

use super::collaborators::{ContentRepository, LockManager, Workflow};
use super::memory::{PUBLISH_TRANSITION, UNPUBLISH_TRANSITION};
use crate::core::attachment::extract_attachment;
use crate::core::error::{Error, ErrorKind, to_fault_code};
use crate::core::marshal::{WireDocument, marshal_value, unmarshal_document, unmarshal_value};
use crate::core::protocol::{CallRequest, Fault, fault_body, success_body};
use crate::core::value::{Document, Value};
use crate::core::widgets::infer_widget_slots;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const PUBLISH_COMMENT: &str = "Publishing done through the Remote Controller";
const UNPUBLISH_COMMENT: &str = "Un-publishing done through the Remote Controller";

pub struct RemoteController {
    repository: Arc<dyn ContentRepository>,
    workflow: Arc<dyn Workflow>,
    locks: Arc<dyn LockManager>,
}

impl RemoteController {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        workflow: Arc<dyn Workflow>,
        locks: Arc<dyn LockManager>,
    ) -> Self {
        Self {
            repository,
            workflow,
            locks,
        }
    }

    /// Controller over a single object playing every collaborator role.
    pub fn over<P>(portal: Arc<P>) -> Self
    where
        P: ContentRepository + Workflow + LockManager + 'static,
    {
        Self::new(portal.clone(), portal.clone(), portal)
    }

    /// Answer one request envelope with a result or a fault body.
    pub fn handle(&self, caller: &str, request: &CallRequest) -> Json {
        match self.invoke(caller, &request.method, &request.params, &request.kwargs) {
            Ok(result) => success_body(result),
            Err(err) => {
                tracing::warn!(method = %request.method, caller, error = %err, "remote call failed");
                fault_body(&Fault {
                    code: to_fault_code(err.kind()),
                    message: err.to_string(),
                })
            }
        }
    }

    /// Run `method` with wire arguments on behalf of `caller`.
    pub fn invoke(
        &self,
        caller: &str,
        method: &str,
        params: &[Json],
        kwargs: &WireDocument,
    ) -> Result<Json, Error> {
        let args = Args {
            method,
            params: params
                .iter()
                .map(unmarshal_value)
                .collect::<Result<Vec<_>, _>>()?,
            kwargs: unmarshal_document(kwargs)?,
        };
        tracing::debug!(method, caller, args = args.params.len(), "invoking operation");
        let result = self.dispatch(caller, &args)?;
        marshal_value(&result)
    }

    fn dispatch(&self, caller: &str, args: &Args<'_>) -> Result<Value, Error> {
        match args.method {
            "getVersion" => Ok(Value::text(VERSION)),
            "listContent" => {
                let paths = self.list_content(args.text(0, "rpath")?)?;
                Ok(Value::List(paths.into_iter().map(Value::Text).collect()))
            }
            "getDocumentState" => self.document_state(args.text(0, "rpath")?).map(Value::Text),
            "getDocumentHistory" => self.document_history(args.text(0, "rpath")?).map(Value::Map),
            "getAllowedTransitions" => {
                let transitions = self.allowed_transitions(args.text(0, "rpath")?)?;
                Ok(Value::List(transitions.into_iter().map(Value::Text).collect()))
            }
            "getDocumentFields" => self.document_fields(args.text(0, "rpath")?).map(Value::Map),
            "isDocumentLocked" => self.is_document_locked(args.text(0, "rpath")?).map(Value::Bool),
            "lockDocument" => self.lock_document(caller, args.text(0, "rpath")?).map(Value::Text),
            "unlockDocument" => self
                .unlock_document(
                    caller,
                    args.text(0, "rpath")?,
                    args.optional_text(1, "token")?,
                )
                .map(Value::Bool),
            "deleteDocumentLocks" => {
                let released = self.delete_document_locks(args.text(0, "rpath")?)?;
                Ok(Value::Int(count(released)))
            }
            "getDocumentLocksInfo" => {
                let locks = self.document_locks_info(args.text(0, "rpath")?)?;
                Ok(Value::List(
                    locks
                        .into_iter()
                        .map(|(owner, token)| Value::List(vec![owner.into(), token.into()]))
                        .collect(),
                ))
            }
            "publishDocument" => self
                .publish_document(
                    caller,
                    args.text(0, "rpath")?,
                    args.text(1, "section_rpath")?,
                    args.optional_text(2, "comment")?,
                )
                .map(Value::from),
            "unpublishDocument" => {
                self.unpublish_document(
                    caller,
                    args.text(0, "rpath")?,
                    args.optional_text(1, "comment")?,
                )?;
                Ok(Value::Bool(true))
            }
            "changeDocumentPosition" => {
                let position = self.change_document_position(
                    args.text(0, "rpath")?,
                    args.int_or(1, "step", 0)?,
                )?;
                Ok(Value::Int(count(position)))
            }
            "createDocument" => self
                .create_document(
                    args.text(0, "portal_type")?,
                    args.document(1, "doc_def", false)?,
                    args.text(2, "folder_rpath")?,
                    args.int_or(3, "position", -1)?,
                    args.flag_or(4, "keep_control_keys", false)?,
                )
                .map(Value::Text),
            "editDocument" => {
                self.edit_document(args.text(0, "rpath")?, args.document(1, "doc_def", true)?)?;
                Ok(Value::Bool(true))
            }
            "editOrCreateDocument" => self
                .edit_or_create_document(
                    args.text(0, "rpath")?,
                    args.text(1, "portal_type")?,
                    args.document(2, "doc_def", true)?,
                    args.int_or(3, "position", -1)?,
                )
                .map(Value::Text),
            "deleteDocument" => {
                self.delete_document(args.text(0, "rpath")?)?;
                Ok(Value::Bool(true))
            }
            other => Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown operation {other}"))
                .with_hint("Operation names are case-sensitive, e.g. `getVersion`.")),
        }
    }

    /// Paths of every item below `rpath`.
    pub fn list_content(&self, rpath: &str) -> Result<Vec<String>, Error> {
        self.repository.descendants(rpath)
    }

    pub fn document_state(&self, rpath: &str) -> Result<String, Error> {
        self.workflow.state(rpath)
    }

    /// Workflow history as `{action: time}`; the latest event wins for a
    /// repeated action.
    pub fn document_history(&self, rpath: &str) -> Result<Document, Error> {
        Ok(self
            .workflow
            .history(rpath)?
            .into_iter()
            .map(|entry| (entry.action, Value::Timestamp(entry.time)))
            .collect())
    }

    pub fn allowed_transitions(&self, rpath: &str) -> Result<Vec<String>, Error> {
        self.workflow.allowed_transitions(rpath)
    }

    pub fn document_fields(&self, rpath: &str) -> Result<Document, Error> {
        self.repository.fields(rpath)
    }

    pub fn is_document_locked(&self, rpath: &str) -> Result<bool, Error> {
        Ok(!self.locks.locks(rpath)?.is_empty())
    }

    pub fn lock_document(&self, caller: &str, rpath: &str) -> Result<String, Error> {
        self.locks.lock(rpath, caller, None)
    }

    /// Release `token`, or every lock `caller` holds when no token is given.
    /// Returns whether anything was released.
    pub fn unlock_document(
        &self,
        caller: &str,
        rpath: &str,
        token: Option<&str>,
    ) -> Result<bool, Error> {
        if let Some(token) = token {
            self.locks.unlock(rpath, token)?;
            return Ok(true);
        }
        let mut released = false;
        for lock in self.locks.locks(rpath)? {
            if lock.owner == caller {
                self.locks.unlock(rpath, &lock.token)?;
                released = true;
            }
        }
        Ok(released)
    }

    pub fn delete_document_locks(&self, rpath: &str) -> Result<usize, Error> {
        self.locks.clear(rpath)
    }

    /// `(owner, token)` for each live lock.
    pub fn document_locks_info(&self, rpath: &str) -> Result<Vec<(String, String)>, Error> {
        Ok(self
            .locks
            .locks(rpath)?
            .into_iter()
            .map(|lock| (lock.owner, lock.token))
            .collect())
    }

    /// Submit a copy of `rpath` to `section_rpath`; returns the copy's path.
    pub fn publish_document(
        &self,
        caller: &str,
        rpath: &str,
        section_rpath: &str,
        comment: Option<&str>,
    ) -> Result<Option<String>, Error> {
        self.workflow.execute(
            rpath,
            PUBLISH_TRANSITION,
            Some(section_rpath),
            caller,
            Some(comment.unwrap_or(PUBLISH_COMMENT)),
        )
    }

    pub fn unpublish_document(
        &self,
        caller: &str,
        rpath: &str,
        comment: Option<&str>,
    ) -> Result<(), Error> {
        self.workflow.execute(
            rpath,
            UNPUBLISH_TRANSITION,
            None,
            caller,
            Some(comment.unwrap_or(UNPUBLISH_COMMENT)),
        )?;
        Ok(())
    }

    /// Move the item `step` places within its folder; returns where it landed.
    pub fn change_document_position(&self, rpath: &str, step: i64) -> Result<usize, Error> {
        let current = i64::try_from(self.repository.position(rpath)?).unwrap_or(i64::MAX);
        let target = usize::try_from(current.saturating_add(step)).unwrap_or(0);
        self.repository.move_to(rpath, target)
    }

    /// Create an item of `portal_type` in `folder_rpath` and fill it from
    /// `doc_def`. The id comes from the `Title` field, or the portal type when
    /// there is none. A non-negative `position` moves the new item there.
    pub fn create_document(
        &self,
        portal_type: &str,
        doc_def: Document,
        folder_rpath: &str,
        position: i64,
        keep_control_keys: bool,
    ) -> Result<String, Error> {
        let title = doc_def
            .get("Title")
            .and_then(Value::as_str)
            .unwrap_or(portal_type)
            .to_string();
        let rpath = self.repository.create(folder_rpath, portal_type, &title)?;
        self.lay_out_widgets(&rpath, portal_type, &doc_def)?;
        self.apply_definition(&rpath, doc_def, keep_control_keys)?;
        self.place(&rpath, position)?;
        Ok(rpath)
    }

    /// Replace the given fields of `rpath`. Widget slots are only laid out at
    /// creation, so an edit never touches them.
    pub fn edit_document(&self, rpath: &str, doc_def: Document) -> Result<(), Error> {
        self.repository.portal_type(rpath)?;
        self.apply_definition(rpath, doc_def, false)
    }

    /// Edit `rpath` if it exists, otherwise create it in its parent folder
    /// with its last path segment as id hint. Returns the item's path.
    pub fn edit_or_create_document(
        &self,
        rpath: &str,
        portal_type: &str,
        doc_def: Document,
        position: i64,
    ) -> Result<String, Error> {
        let rpath = rpath.trim_matches('/');
        if self.repository.exists(rpath) {
            self.edit_document(rpath, doc_def)?;
            self.place(rpath, position)?;
            return Ok(rpath.to_string());
        }
        let (folder, id) = rpath.rsplit_once('/').unwrap_or(("", rpath));
        let created = self.repository.create(folder, portal_type, id)?;
        self.lay_out_widgets(&created, portal_type, &doc_def)?;
        self.apply_definition(&created, doc_def, false)?;
        self.place(&created, position)?;
        Ok(created)
    }

    pub fn delete_document(&self, rpath: &str) -> Result<(), Error> {
        self.repository.delete(rpath)
    }

    /// Create the flexible widget slots a new item's definition asks for, in
    /// ascending index order, before any value is applied.
    fn lay_out_widgets(&self, rpath: &str, portal_type: &str, doc_def: &Document) -> Result<(), Error> {
        if !self.repository.supports_widgets(portal_type) {
            return Ok(());
        }
        for slot in infer_widget_slots(doc_def.keys().map(String::as_str)) {
            self.repository.add_widget(rpath, slot)?;
        }
        Ok(())
    }

    fn apply_definition(
        &self,
        rpath: &str,
        mut doc_def: Document,
        keep_control_keys: bool,
    ) -> Result<(), Error> {
        if let Some(field) = extract_attachment(&mut doc_def, keep_control_keys) {
            tracing::debug!(rpath, field = %field, "stored attachment");
        }
        self.repository.edit(rpath, doc_def)
    }

    fn place(&self, rpath: &str, position: i64) -> Result<(), Error> {
        if let Ok(position) = usize::try_from(position) {
            self.repository.move_to(rpath, position)?;
        }
        Ok(())
    }
}

/// Arguments of one call, looked up by position first and name second.
struct Args<'a> {
    method: &'a str,
    params: Vec<Value>,
    kwargs: Document,
}

impl Args<'_> {
    fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.params.get(index).or_else(|| self.kwargs.get(name))
    }

    fn text(&self, index: usize, name: &str) -> Result<&str, Error> {
        match self.get(index, name) {
            Some(Value::Text(text)) => Ok(text),
            Some(other) => Err(self.wrong_type(name, "text", other)),
            None => Err(self.missing(name)),
        }
    }

    fn optional_text(&self, index: usize, name: &str) -> Result<Option<&str>, Error> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text)),
            Some(other) => Err(self.wrong_type(name, "text", other)),
        }
    }

    fn int_or(&self, index: usize, name: &str, default: i64) -> Result<i64, Error> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Int(value)) => Ok(*value),
            Some(other) => Err(self.wrong_type(name, "int", other)),
        }
    }

    fn flag_or(&self, index: usize, name: &str, default: bool) -> Result<bool, Error> {
        match self.get(index, name) {
            None => Ok(default),
            Some(value) => value
                .as_flag()
                .ok_or_else(|| self.wrong_type(name, "bool", value)),
        }
    }

    fn document(&self, index: usize, name: &str, optional: bool) -> Result<Document, Error> {
        match self.get(index, name) {
            Some(Value::Map(doc)) => Ok(doc.clone()),
            None | Some(Value::Null) if optional => Ok(Document::new()),
            Some(other) => Err(self.wrong_type(name, "map", other)),
            None => Err(self.missing(name)),
        }
    }

    fn missing(&self, name: &str) -> Error {
        Error::new(ErrorKind::Usage).with_message(format!("{}: missing argument {name}", self.method))
    }

    fn wrong_type(&self, name: &str, expected: &str, got: &Value) -> Error {
        Error::new(ErrorKind::Usage).with_message(format!(
            "{}: {name} must be {expected}, got {}",
            self.method,
            got.type_name()
        ))
    }
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
