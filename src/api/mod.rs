//! Purpose: Define the public Rust API for talking to remote portal controllers.
//! Exports: Endpoint registry, dispatcher, transport seam, and the shared value/error types.
//! Role: Public, additive-only surface used by the CLI and by embedding programs.
//! Invariants: Callers never see wire records; values cross this boundary as `Value`.

mod config;
mod dispatcher;
mod endpoint;
mod registry;
mod transport;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::value::{Attachment, Document, Value};
pub use config::{DEFAULT_TIMEOUT, RegistryConfig, default_config_path};
pub use dispatcher::{Dispatcher, RemoteCall};
pub use endpoint::{
    CONTROLLER_PATH, Endpoint, UrlParts, extract_credentials, normalize_controller_url,
};
pub use registry::EndpointRegistry;
pub use transport::{HttpTransport, Transport, basic_auth_header, call_url};
