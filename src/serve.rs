//! Purpose: Serve a remote controller over HTTP/JSON.
//! Exports: `ServeConfig`, `serve`, `router`, `init_tracing`.
//! Role: Axum server answering call envelopes with an in-memory portal behind them.
//! Invariants: Calls are answered with HTTP 200 and a result or fault body.
//! Invariants: With credentials configured, requests without matching Basic auth get 401.
//! Invariants: Controller work runs on the blocking pool, never on the async workers.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::json;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use portal_remote::api::{Error, ErrorKind};
use portal_remote::core::error::to_fault_code;
use portal_remote::core::protocol::{CallRequest, Fault, fault_body};
use portal_remote::portal::{MemoryPortal, RemoteController};

use super::ServeArgs;

const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;
const ANONYMOUS: &str = "anonymous";

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub credentials: Option<(String, String)>,
}

impl ServeConfig {
    pub fn from_args(args: ServeArgs) -> Result<Self, Error> {
        let bind = args.bind.parse().map_err(|_| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid bind address {}", args.bind))
                .with_hint("Use a host:port value like 127.0.0.1:9800.")
        })?;
        let credentials = match (args.user, args.password) {
            (Some(user), Some(password)) => Some((user, password)),
            (None, None) => None,
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--user and --password go together"));
            }
        };
        Ok(Self { bind, credentials })
    }
}

struct AppState {
    controller: RemoteController,
    credentials: Option<(String, String)>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    init_tracing("info");

    let app = router(
        RemoteController::over(Arc::new(MemoryPortal::new())),
        config.credentials,
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to bind {}", config.bind))
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, "remote controller listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

pub fn router(controller: RemoteController, credentials: Option<(String, String)>) -> Router {
    let state = Arc::new(AppState {
        controller,
        credentials,
    });
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", post(call))
        .route("/*path", post(call))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install the fmt subscriber on stderr; `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Name of the authenticated caller, or `anonymous` when auth is off.
fn authorize(headers: &HeaderMap, state: &AppState) -> Result<String, Error> {
    let Some((user, password)) = state.credentials.as_ref() else {
        return Ok(ANONYMOUS.to_string());
    };
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Err(Error::new(ErrorKind::Permission).with_message("missing credentials"));
    };
    match basic_credentials(value.to_str().unwrap_or_default()) {
        Some((given_user, given_password)) if given_user == *user && given_password == *password => {
            Ok(given_user)
        }
        _ => Err(Error::new(ErrorKind::Permission).with_message("invalid credentials")),
    }
}

/// Decode an `Authorization: Basic ...` header value into user and password.
fn basic_credentials(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = BASE64_STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn call(State(state): State<Arc<AppState>>, headers: HeaderMap, body: String) -> Response {
    let caller = match authorize(&headers, &state) {
        Ok(caller) => caller,
        Err(err) => return unauthorized(err),
    };
    let request: CallRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(err) => {
            let err = Error::new(ErrorKind::Usage)
                .with_message(format!("malformed call envelope: {err}"));
            return Json(fault_body(&Fault {
                code: to_fault_code(err.kind()),
                message: err.to_string(),
            }))
            .into_response();
        }
    };

    let worker = Arc::clone(&state);
    let answered =
        tokio::task::spawn_blocking(move || worker.controller.handle(&caller, &request)).await;
    match answered {
        Ok(body) => Json(body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "controller task failed");
            let err = Error::new(ErrorKind::Internal).with_message("controller task failed");
            Json(fault_body(&Fault {
                code: to_fault_code(err.kind()),
                message: err.to_string(),
            }))
            .into_response()
        }
    }
}

fn unauthorized(err: Error) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "kind": err.kind().as_str(), "message": err.message() } })),
    )
        .into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"portal-remote\""),
    );
    response
}
