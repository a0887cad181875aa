//! Identifiers for backends: the logical key requests use and the loadable
//! identity behind it.

use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;

pub(crate) const DEFAULT_REVISION: &str = "main";

/// The `BackendKey` is a human-chosen nickname for a logical model slot. It is
/// what callers pass as `model_name`, and it is unique within a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub(crate) struct BackendKey(String);

impl BackendKey {
    pub(crate) fn new<S: Into<String>>(key: S) -> BackendKey {
        BackendKey(key.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for BackendKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BackendKey {
    fn from(value: &str) -> Self {
        BackendKey::new(value)
    }
}

/// Everything needed to load a backend: the external model identifier and the
/// revision it is pinned to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BackendSpec {
    pub model_id: String,
    pub revision: String,
}

impl BackendSpec {
    pub(crate) fn new<S: Into<String>>(model_id: S) -> BackendSpec {
        BackendSpec {
            model_id: model_id.into(),
            revision: DEFAULT_REVISION.to_string(),
        }
    }

    pub(crate) fn pinned<S: Into<String>, R: Into<String>>(model_id: S, revision: R) -> BackendSpec {
        BackendSpec {
            model_id: model_id.into(),
            revision: revision.into(),
        }
    }
}

impl fmt::Display for BackendSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.model_id, self.revision)
    }
}
