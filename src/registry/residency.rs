use std::sync::Arc;

use crate::backends::{BackendHandle, BackendKey};

/// Collects backends while they load. Only exists during startup; freezing it
/// produces the read-only [`ResidencyStore`] requests are served from.
#[derive(Default)]
pub(crate) struct ResidencyBuilder {
    handles: Vec<Arc<BackendHandle>>,
}

impl ResidencyBuilder {
    pub(crate) fn new() -> ResidencyBuilder {
        ResidencyBuilder::default()
    }

    pub(crate) fn insert(&mut self, handle: BackendHandle) {
        assert!(
            !self.contains(handle.key().as_str()),
            "the same backend was made resident twice"
        );

        self.handles.push(Arc::new(handle));
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.handles.iter().any(|h| h.key().as_str() == key)
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `None` when nothing became resident.
    pub(crate) fn freeze(self) -> Option<ResidencyStore> {
        if self.handles.is_empty() {
            return None;
        }

        Some(ResidencyStore {
            handles: self.handles,
        })
    }
}

/// Every backend that is servable right now, in the order the loads completed.
/// Never empty, never mutated.
#[derive(Debug)]
pub(crate) struct ResidencyStore {
    handles: Vec<Arc<BackendHandle>>,
}

impl ResidencyStore {
    pub(crate) fn get(&self, key: &str) -> Option<&Arc<BackendHandle>> {
        self.handles.iter().find(|h| h.key().as_str() == key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The earliest resident backend.
    pub(crate) fn first(&self) -> &Arc<BackendHandle> {
        &self.handles[0]
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &BackendKey> {
        self.handles.iter().map(|h| h.key())
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }
}
