//! Purpose: Hold top-level CLI command dispatch for `portal-remote`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Endpoint commands persist the registry; `call` persists auto-selection.
//! Invariants: Helpers in `main.rs` own output formatting.

use std::path::Path;
use std::sync::Arc;

use portal_remote::api::{
    Dispatcher, Document, EndpointRegistry, HttpTransport, RegistryConfig,
    normalize_controller_url,
};
use portal_remote::core::marshal::{marshal_value, unmarshal_value};

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    config_path: PathBuf,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    if !matches!(command, Command::Serve(_)) {
        serve::init_tracing("warn");
    }
    tracing::debug!(config = %config_path.display(), ?color_mode, "dispatching command");

    match command {
        Command::Completion { shell } => {
            print_completion(shell);
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Endpoint { command } => {
            let config = RegistryConfig::load(&config_path)?;
            let registry = EndpointRegistry::from_config(&config);
            match command {
                EndpointCommand::Add { name, url, raw } => {
                    let url = if raw { url } else { normalize_controller_url(&url) };
                    registry.add_endpoint(name.clone(), url.clone());
                    persist(&registry, &config, &config_path)?;
                    emit_json(json!({ "name": name, "url": redact_url(&url) }));
                }
                EndpointCommand::Remove { name } => {
                    let existed = registry.contains(&name);
                    registry.remove_endpoint(&name);
                    persist(&registry, &config, &config_path)?;
                    emit_json(json!({ "removed": name, "existed": existed }));
                }
                EndpointCommand::Use { name } => {
                    registry.set_active_endpoint(&name)?;
                    persist(&registry, &config, &config_path)?;
                    emit_json(json!({ "active": name }));
                }
                EndpointCommand::List => {
                    let active = registry.active_endpoint(false);
                    let endpoints = registry.list_endpoints();
                    if io::stdout().is_terminal() {
                        let rows: Vec<Vec<String>> = endpoints
                            .iter()
                            .map(|(name, url)| {
                                let marker = if active.as_deref() == Some(name.as_str()) {
                                    "*"
                                } else {
                                    ""
                                };
                                vec![marker.to_string(), name.clone(), redact_url(url)]
                            })
                            .collect();
                        emit_table(&["", "NAME", "URL"], &rows);
                    } else {
                        let values: Vec<Value> = endpoints
                            .iter()
                            .map(|(name, url)| {
                                json!({
                                    "name": name,
                                    "url": redact_url(url),
                                    "active": active.as_deref() == Some(name.as_str()),
                                })
                            })
                            .collect();
                        emit_json(json!({ "endpoints": values }));
                    }
                }
            }
            Ok(RunOutcome::ok())
        }
        Command::Call {
            operation,
            args,
            kwargs,
            on,
        } => {
            let params = args
                .iter()
                .map(|raw| parse_inline_json(raw).and_then(|wire| unmarshal_value(&wire)))
                .collect::<Result<Vec<_>, _>>()?;
            let mut keywords = Document::new();
            for raw in &kwargs {
                let (name, wire) = parse_kwarg(raw)?;
                keywords.insert(name, unmarshal_value(&wire)?);
            }

            let config = RegistryConfig::load(&config_path)?;
            let dispatcher = dispatcher_for(&config);
            let result = match on.as_deref() {
                Some(name) => dispatcher.call_on(name, &operation, params, keywords)?,
                None => {
                    let result = dispatcher.call(&operation, params, keywords);
                    if dispatcher.registry().active_endpoint(false) != config.active {
                        persist(dispatcher.registry(), &config, &config_path)?;
                    }
                    result?
                }
            };
            emit_json(marshal_value(&result)?);
            Ok(RunOutcome::ok())
        }
        Command::Ping { name } => {
            let config = RegistryConfig::load(&config_path)?;
            let line = dispatcher_for(&config).ping(&name)?;
            println!("{line}");
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            let config = serve::ServeConfig::from_args(args)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}

fn dispatcher_for(config: &RegistryConfig) -> Dispatcher {
    Dispatcher::with_transport(
        EndpointRegistry::from_config(config),
        Arc::new(HttpTransport::with_timeout(config.timeout())),
    )
}

/// Write the registry back, keeping settings the registry does not own.
fn persist(registry: &EndpointRegistry, loaded: &RegistryConfig, path: &Path) -> Result<(), Error> {
    let mut updated = registry.to_config();
    updated.timeout_ms = loaded.timeout_ms;
    updated.save(path)
}
