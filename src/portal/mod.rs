//! Purpose: Server side of the remote control facade.
//! Exports: `RemoteController`, collaborator traits, `MemoryPortal`.
//! Role: Maps operation names onto content, workflow and lock collaborators.
//! Invariants: The controller never touches storage directly; it goes through the traits.

pub mod collaborators;
pub mod controller;
pub mod memory;

pub use collaborators::{ContentRepository, HistoryEntry, LockInfo, LockManager, Workflow};
pub use controller::{RemoteController, VERSION};
pub use memory::MemoryPortal;
