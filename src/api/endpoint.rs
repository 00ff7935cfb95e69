//! Purpose: Describe a remote endpoint and split credentials out of its URL.
//! Exports: `Endpoint`, `UrlParts`, `extract_credentials`, `normalize_controller_url`.
//! Invariants: Credential extraction is purely textual; no URL validation happens here.
//! Invariants: `https://` is the only thing that turns TLS on.
use std::fmt;

const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";

/// Path segment the controller is published under on a portal.
pub const CONTROLLER_PATH: &str = "portal_remote_controller";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlParts {
    pub user: Option<String>,
    pub password: Option<String>,
    pub url: String,
    pub uses_tls: bool,
}

/// Split `[scheme://][user:password@]host[:port]/path` into its parts.
///
/// The credentials segment runs up to the last `@` and must contain a `:`;
/// the user is the text before the first `:`, the password everything after
/// it. Without such a segment the URL is returned unchanged.
pub fn extract_credentials(url: &str) -> UrlParts {
    let (scheme, rest) = if let Some(rest) = url.strip_prefix(HTTP_PREFIX) {
        (HTTP_PREFIX, rest)
    } else if let Some(rest) = url.strip_prefix(HTTPS_PREFIX) {
        (HTTPS_PREFIX, rest)
    } else {
        ("", url)
    };
    let uses_tls = scheme == HTTPS_PREFIX;

    let credentials = rest.rfind('@').and_then(|at| {
        let (user, password) = rest[..at].split_once(':')?;
        Some((user, password, &rest[at + 1..]))
    });
    match credentials {
        Some((user, password, host)) => UrlParts {
            user: Some(user.to_string()),
            password: Some(password.to_string()),
            url: format!("{scheme}{host}"),
            uses_tls,
        },
        None => UrlParts {
            user: None,
            password: None,
            url: url.to_string(),
            uses_tls,
        },
    }
}

/// Point a portal URL at its remote controller, the way endpoints entered by
/// an operator are stored: trimmed, with `/portal_remote_controller` appended
/// unless already present.
pub fn normalize_controller_url(url: &str) -> String {
    let url = url.trim();
    if url.ends_with(CONTROLLER_PATH) {
        return url.to_string();
    }
    if url.ends_with('/') {
        format!("{url}{CONTROLLER_PATH}")
    } else {
        format!("{url}/{CONTROLLER_PATH}")
    }
}

/// A named remote endpoint with its credentials already extracted.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub uses_tls: bool,
}

impl Endpoint {
    pub fn from_url(name: impl Into<String>, url: &str) -> Self {
        let parts = extract_credentials(url);
        Self {
            name: name.into(),
            base_url: parts.url,
            username: parts.user,
            password: parts.password,
            uses_tls: parts.uses_tls,
        }
    }

    /// Credentials usable for HTTP Basic auth; both halves are required.
    pub fn basic_credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("uses_tls", &self.uses_tls)
            .finish()
    }
}
