//! Purpose: JSON envelopes exchanged by the dispatcher and the controller server.
//! Exports: `CallRequest`, `Fault`, `success_body`, `fault_body`, `parse_response`.
//! Role: Shared by `api` (client side) and the `serve` command (server side).
//! Invariants: Request: `{"method", "params": [...], "kwargs": {...}}`.
//! Invariants: Response: `{"result": <wire>}` or `{"fault": {"code", "message"}}`,
//! both with HTTP 200; faults are application errors, not transport errors.
use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use super::error::{Error, ErrorKind};
use super::marshal::WireDocument;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Json>,
    #[serde(default)]
    pub kwargs: WireDocument,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

pub fn success_body(result: Json) -> Json {
    json!({ "result": result })
}

pub fn fault_body(fault: &Fault) -> Json {
    json!({ "fault": { "code": fault.code, "message": fault.message } })
}

/// Extract the result of a call from a response body, turning a fault into a
/// `RemoteApplication` error.
pub fn parse_response(body: &str) -> Result<Json, Error> {
    let envelope: Json = serde_json::from_str(body).map_err(|err| {
        Error::new(ErrorKind::RemoteProtocol)
            .with_message("response body is not valid json")
            .with_source(err)
    })?;
    let Json::Object(mut envelope) = envelope else {
        return Err(Error::new(ErrorKind::RemoteProtocol)
            .with_message("response body must be a json object"));
    };
    if let Some(fault) = envelope.remove("fault") {
        let fault: Fault = serde_json::from_value(fault).map_err(|err| {
            Error::new(ErrorKind::RemoteProtocol)
                .with_message("malformed fault in response")
                .with_source(err)
        })?;
        return Err(Error::new(ErrorKind::RemoteApplication)
            .with_message(fault.message)
            .with_fault_code(fault.code));
    }
    match envelope.remove("result") {
        Some(result) => Ok(result),
        None => Err(Error::new(ErrorKind::RemoteProtocol)
            .with_message("response has neither result nor fault")),
    }
}
