//! Purpose: Library crate behind the `portal-remote` CLI, server and tests.
//! Exports: `core` (values, marshalling, errors), `api` (endpoint registry and
//! dispatcher), `portal` (remote controller over collaborator traits).
//! Invariants: Only `core` knows the wire representation; `api` and `portal`
//! exchange native values with it.
pub mod api;
pub mod core;
pub mod portal;
