use thiserror::Error;
use tracing::{error, info, warn};

use super::catalog::Catalog;
use super::residency::{ResidencyBuilder, ResidencyStore};
use crate::backends::{BackendLoader, Device, LoadFailure};

/// No backend could be loaded; the gateway must not start serving.
#[derive(Error, Debug)]
#[error("none of the {} declared backends could be loaded", .failures.len())]
pub(crate) struct FatalStartup {
    pub failures: Vec<LoadFailure>,
}

/// The outcome of a startup that left at least one backend resident.
#[derive(Debug)]
pub(crate) struct Startup {
    pub store: ResidencyStore,
    pub failures: Vec<LoadFailure>,
}

/// Load every catalog entry in declaration order. Individual failures are
/// logged, recorded and skipped; only an empty result is fatal.
pub(crate) async fn preload<L: BackendLoader + ?Sized>(
    catalog: &Catalog,
    loader: &L,
    device: Device,
) -> Result<Startup, FatalStartup> {
    let mut builder = ResidencyBuilder::new();
    let mut failures = Vec::new();

    info!(backends = catalog.len(), %device, "preloading backends");

    for entry in catalog.iter() {
        info!(key = %entry.key, spec = %entry.spec, "loading backend");

        match loader.load(entry, device).await {
            Ok(handle) => {
                builder.insert(handle);

                info!(key = %entry.key, "backend is resident");
            }
            Err(failure) => {
                warn!(key = %failure.key, "{}", failure);

                failures.push(failure);
            }
        }
    }

    let loaded = builder.len();

    match builder.freeze() {
        Some(store) => {
            info!(loaded, failed = failures.len(), "preloading finished");

            Ok(Startup { store, failures })
        }
        None => {
            error!(failed = failures.len(), "no backends were loaded");

            Err(FatalStartup { failures })
        }
    }
}
