use serde::Serialize;
use std::sync::Arc;

use super::residency::ResidencyStore;
use crate::backends::BackendHandle;

/// How a request was matched to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub(crate) enum ResolutionKind {
    /// The requested backend is resident.
    Exact,
    /// The request named nothing usable; the configured default was used.
    DefaultUsed,
    /// Neither the request nor the default was usable; the earliest resident
    /// backend was used.
    ArbitraryFallback,
}

#[derive(Debug, Clone)]
pub(crate) struct Resolution {
    pub handle: Arc<BackendHandle>,
    pub kind: ResolutionKind,
}

/// Resolve the backend for a request. Never fails: unknown or unloaded keys
/// degrade to the default, then to the first resident backend.
pub(crate) fn resolve(
    requested: Option<&str>,
    default: Option<&str>,
    store: &ResidencyStore,
) -> Resolution {
    if let Some(handle) = requested.and_then(|key| store.get(key)) {
        return Resolution {
            handle: handle.clone(),
            kind: ResolutionKind::Exact,
        };
    }

    if let Some(handle) = default.and_then(|key| store.get(key)) {
        return Resolution {
            handle: handle.clone(),
            kind: ResolutionKind::DefaultUsed,
        };
    }

    Resolution {
        handle: store.first().clone(),
        kind: ResolutionKind::ArbitraryFallback,
    }
}
