use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::backends::hub::HubLoader;
use crate::backends::{BackendLoader, Device, ErrorKind, LoadFailure};
use crate::completion::CompletionService;
use crate::config::{read_config, Config, Environment};
use crate::registry::catalog::Catalog;
use crate::registry::populate::{preload, FatalStartup};
use crate::server::{create_router, AppState};
use crate::{die, ServeArgs};

/// Keys of the backends that failed because this build cannot run their model
/// family. Retrying them will never help.
fn unsupported_keys(failures: &[LoadFailure]) -> Vec<&str> {
    failures
        .iter()
        .filter(|f| f.source.kind() == ErrorKind::UnsupportedArchitecture)
        .map(|f| f.key.as_str())
        .collect()
}

/// Load the catalog and assemble the state requests are served from. Nothing is
/// listening yet when this returns an error.
pub(crate) async fn prepare<L: BackendLoader + ?Sized>(
    catalog: &Catalog,
    loader: &L,
    device: Device,
    config: &Config,
    environment: &Environment,
) -> Result<AppState, FatalStartup> {
    let startup = preload(catalog, loader, device).await?;

    let default_key = environment.default_key.as_str();

    if !startup.store.contains(default_key) {
        match catalog.spec(default_key) {
            Some(spec) => warn!(
                default = default_key,
                %spec,
                "the default backend failed to load, requests without a model will use the first resident backend"
            ),
            None => warn!(
                default = default_key,
                "the default backend is not declared, requests without a model will use the first resident backend"
            ),
        }
    }

    let resident: Vec<&str> = startup.store.keys().map(|k| k.as_str()).collect();
    info!(backends = ?resident, "resident backends");

    if !startup.failures.is_empty() {
        let failed: Vec<&str> = startup.failures.iter().map(|f| f.key.as_str()).collect();
        warn!(backends = ?failed, "serving without backends that failed to load");

        let unsupported = unsupported_keys(&startup.failures);

        if !unsupported.is_empty() {
            warn!(
                backends = ?unsupported,
                "these backends use a model family this build cannot run, declare llama or qwen2 models under [[backends]] to serve them"
            );
        }
    }

    let completions = CompletionService::new(
        config.generation.max_new_tokens,
        config.generation.timeout(),
    );

    Ok(AppState {
        store: Arc::new(startup.store),
        completions: Arc::new(completions),
        default_key: Some(environment.default_key.clone()),
    })
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", err);

        std::future::pending::<()>().await;
    }

    info!("shutting down");
}

pub(crate) async fn serve_cmd(args: &ServeArgs, config_path: Option<PathBuf>) {
    let config = read_config(config_path);
    let environment = Environment::from_env();

    let catalog = match config.catalog() {
        Ok(catalog) => catalog,
        Err(err) => die!("invalid backend catalog: {}", err),
    };

    let device = Device::resolve(
        environment.accelerator_requested,
        Device::accelerator_available(),
    );

    if environment.accelerator_requested && device == Device::Cpu {
        warn!("accelerator requested but none is available, placing backends on the cpu");
    }

    let loader = match HubLoader::new(config.hub.cache_dir.as_deref()) {
        Ok(loader) => loader,
        Err(err) => die!("failed to initialize the model hub client: {}", err),
    };

    let state = match prepare(&catalog, &loader, device, &config, &environment).await {
        Ok(state) => state,
        Err(fatal) => die!("{}, refusing to serve", fatal),
    };

    let host = args.host.as_deref().unwrap_or(&config.server.host);
    let port = args.port.unwrap_or(config.server.port);

    let listener = match TcpListener::bind((host, port)).await {
        Ok(listener) => listener,
        Err(err) => die!("failed to bind {}:{}: {}", host, port, err),
    };

    info!(
        address = %format!("{}:{}", host, port),
        backends = state.store.len(),
        "serving completions"
    );

    if let Err(err) = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        die!("server error: {}", err);
    }
}
