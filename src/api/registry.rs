//! Purpose: Named endpoints plus the "active" pointer used by unqualified calls.
//! Exports: `EndpointRegistry`.
//! Role: Shared across caller threads; the dispatcher resolves endpoints here.
//! Invariants: One mutex guards both the map and the pointer.
//! Invariants: A set pointer always names an endpoint present in the map.
//! Invariants: Auto-selection picks the first name in sorted order.
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::config::RegistryConfig;
use super::endpoint::Endpoint;
use crate::core::error::{Error, ErrorKind};

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    endpoints: BTreeMap<String, String>,
    active: Option<String>,
}

impl RegistryState {
    fn resolve_active(&mut self) -> Result<Endpoint, Error> {
        if self.active.is_none() {
            self.active = self.endpoints.keys().next().cloned();
        }
        let Some(name) = self.active.as_deref() else {
            return Err(Error::new(ErrorKind::NoEndpointConfigured)
                .with_message("no remote endpoint configured")
                .with_hint("Add one with `portal-remote endpoint add <name> <url>`."));
        };
        self.resolve_named(name)
    }

    fn resolve_named(&self, name: &str) -> Result<Endpoint, Error> {
        match self.endpoints.get(name) {
            Some(url) => Ok(Endpoint::from_url(name, url)),
            None => Err(unknown_endpoint(name)),
        }
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_endpoints<I, N, U>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = (N, U)>,
        N: Into<String>,
        U: Into<String>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(|(name, url)| (name.into(), url.into()))
            .collect();
        Self {
            state: Mutex::new(RegistryState {
                endpoints,
                active: None,
            }),
        }
    }

    /// Build a registry from persisted state; a stale active name is dropped.
    pub fn from_config(config: &RegistryConfig) -> Self {
        let registry = Self::from_endpoints(config.endpoints.clone());
        if let Some(active) = config.active.as_deref() {
            if registry.set_active_endpoint(active).is_err() {
                tracing::debug!(endpoint = active, "ignoring unknown active endpoint");
            }
        }
        registry
    }

    pub fn to_config(&self) -> RegistryConfig {
        let state = self.lock();
        RegistryConfig {
            endpoints: state.endpoints.clone(),
            active: state.active.clone(),
            ..RegistryConfig::default()
        }
    }

    /// Insert or overwrite `name`. The URL is not checked.
    pub fn add_endpoint(&self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        tracing::debug!(endpoint = %name, "adding endpoint");
        self.lock().endpoints.insert(name, url.into());
    }

    /// Remove `name`, clearing the active pointer if it named it. Absent
    /// names are ignored.
    pub fn remove_endpoint(&self, name: &str) {
        let mut state = self.lock();
        state.endpoints.remove(name);
        if state.active.as_deref() == Some(name) {
            state.active = None;
        }
    }

    pub fn set_active_endpoint(&self, name: &str) -> Result<(), Error> {
        let mut state = self.lock();
        if !state.endpoints.contains_key(name) {
            return Err(unknown_endpoint(name));
        }
        state.active = Some(name.to_string());
        Ok(())
    }

    /// The active endpoint name. With `auto_select`, an unset pointer is
    /// set to the first registered name (if any) and that name returned.
    pub fn active_endpoint(&self, auto_select: bool) -> Option<String> {
        let mut state = self.lock();
        if state.active.is_none() && auto_select {
            state.active = state.endpoints.keys().next().cloned();
        }
        state.active.clone()
    }

    /// All `(name, url)` pairs, sorted by name.
    pub fn list_endpoints(&self) -> Vec<(String, String)> {
        self.lock()
            .endpoints
            .iter()
            .map(|(name, url)| (name.clone(), url.clone()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().endpoints.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().endpoints.is_empty()
    }

    /// Resolve the endpoint for an unqualified call, auto-selecting one when
    /// no pointer is set. Read and selection happen under a single lock.
    pub(crate) fn resolve_active(&self) -> Result<Endpoint, Error> {
        self.lock().resolve_active()
    }

    /// Resolve `name` without touching the active pointer.
    pub(crate) fn resolve_named(&self, name: &str) -> Result<Endpoint, Error> {
        self.lock().resolve_named(name)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

fn unknown_endpoint(name: &str) -> Error {
    Error::new(ErrorKind::UnknownEndpoint)
        .with_message(format!("{name}: no such endpoint"))
        .with_endpoint(name)
        .with_hint("List configured endpoints with `portal-remote endpoint list`.")
}
