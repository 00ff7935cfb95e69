use std::error::Error as StdError;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Permission,
    Conflict,
    Io,
    UnknownEndpoint,
    NoEndpointConfigured,
    AddressResolution,
    Connection,
    RemoteProtocol,
    RemoteApplication,
    Marshalling,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Internal => "Internal",
            ErrorKind::Usage => "Usage",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Permission => "Permission",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Io => "Io",
            ErrorKind::UnknownEndpoint => "UnknownEndpoint",
            ErrorKind::NoEndpointConfigured => "NoEndpointConfigured",
            ErrorKind::AddressResolution => "AddressResolution",
            ErrorKind::Connection => "Connection",
            ErrorKind::RemoteProtocol => "RemoteProtocol",
            ErrorKind::RemoteApplication => "RemoteApplication",
            ErrorKind::Marshalling => "Marshalling",
        }
    }

    /// True for failures raised by the network or the remote side, as opposed
    /// to failures detected locally before any I/O.
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            ErrorKind::AddressResolution
                | ErrorKind::Connection
                | ErrorKind::RemoteProtocol
                | ErrorKind::RemoteApplication
        )
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    endpoint: Option<String>,
    status: Option<u16>,
    fault_code: Option<i64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            endpoint: None,
            status: None,
            fault_code: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn fault_code(&self) -> Option<i64> {
        self.fault_code
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_fault_code(mut self, code: i64) -> Self {
        self.fault_code = Some(code);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(endpoint) = &self.endpoint {
            write!(f, " (endpoint: {endpoint})")?;
        }
        if let Some(status) = self.status {
            write!(f, " (status: {status})")?;
        }
        if let Some(code) = self.fault_code {
            write!(f, " (fault: {code})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Permission => 4,
        ErrorKind::Conflict => 5,
        ErrorKind::Io => 6,
        ErrorKind::UnknownEndpoint => 7,
        ErrorKind::NoEndpointConfigured => 8,
        ErrorKind::AddressResolution => 9,
        ErrorKind::Connection => 10,
        ErrorKind::RemoteProtocol => 11,
        ErrorKind::RemoteApplication => 12,
        ErrorKind::Marshalling => 13,
    }
}

/// Fault codes carried in the `fault` envelope of a failed remote call.
pub fn to_fault_code(kind: ErrorKind) -> i64 {
    match kind {
        ErrorKind::Usage => 400,
        ErrorKind::Permission => 403,
        ErrorKind::NotFound => 404,
        ErrorKind::Conflict => 409,
        ErrorKind::Marshalling => 422,
        _ => 500,
    }
}

/// Server-side kind behind a fault code emitted by `to_fault_code`.
pub fn kind_from_fault_code(code: i64) -> Option<ErrorKind> {
    match code {
        400 => Some(ErrorKind::Usage),
        403 => Some(ErrorKind::Permission),
        404 => Some(ErrorKind::NotFound),
        409 => Some(ErrorKind::Conflict),
        422 => Some(ErrorKind::Marshalling),
        500 => Some(ErrorKind::Internal),
        _ => None,
    }
}
