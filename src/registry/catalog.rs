use std::collections::HashSet;
use thiserror::Error;

use crate::backends::{BackendKey, BackendSpec};

#[derive(Error, Debug, PartialEq, Eq)]
pub(crate) enum Error {
    /// Two entries share a key
    #[error("backend \"{0}\" is declared more than once")]
    DuplicateKey(BackendKey),
    /// An entry has an empty key
    #[error("a backend is declared with an empty key")]
    EmptyKey,
    /// An entry has no model identifier
    #[error("backend \"{0}\" does not name a model")]
    EmptyModelId(BackendKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogEntry {
    pub key: BackendKey,
    pub spec: BackendSpec,
}

impl CatalogEntry {
    pub(crate) fn new(key: BackendKey, spec: BackendSpec) -> CatalogEntry {
        CatalogEntry { key, spec }
    }
}

/// The ordered list of backends to attempt at startup. Declaration order is the
/// load order.
#[derive(Debug, Clone)]
pub(crate) struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub(crate) fn new(entries: Vec<CatalogEntry>) -> Result<Catalog, Error> {
        validate(&entries)?;

        Ok(Catalog { entries })
    }

    /// The catalog used when the configuration does not declare one.
    pub(crate) fn builtin() -> Catalog {
        let entries = BUILTIN_BACKENDS
            .iter()
            .map(|&(key, model_id)| CatalogEntry::new(key.into(), BackendSpec::new(model_id)))
            .collect();

        Catalog { entries }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub(crate) fn spec(&self, key: &str) -> Option<&BackendSpec> {
        self.entries
            .iter()
            .find(|entry| entry.key.as_str() == key)
            .map(|entry| &entry.spec)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn validate(entries: &[CatalogEntry]) -> Result<(), Error> {
    let mut seen = HashSet::new();

    for entry in entries {
        if entry.key.as_str().is_empty() {
            return Err(Error::EmptyKey);
        }

        if entry.spec.model_id.is_empty() {
            return Err(Error::EmptyModelId(entry.key.clone()));
        }

        if !seen.insert(entry.key.as_str()) {
            return Err(Error::DuplicateKey(entry.key.clone()));
        }
    }

    Ok(())
}

/// Highest quality first, lightest last.
const BUILTIN_BACKENDS: [(&str, &str); 4] = [
    ("deepseek-chat", "deepseek-ai/DeepSeek-R1-Distill-Qwen-1.5B"),
    ("falcon-chat", "tiiuae/falcon-rw-1b"),
    ("dialo-small", "microsoft/DialoGPT-small"),
    ("distilgpt2", "distilgpt2"),
];

pub(crate) const BUILTIN_DEFAULT_KEY: &str = "deepseek-chat";
