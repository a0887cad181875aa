//! Traits and type definitions for loaded language-model backends.
//!
//! A backend pairs a tokenizer with a generative model for one logical model
//! key. The numerics of both are opaque to the gateway: all it needs is the
//! pair of capabilities described by [`TextTokenizer`] and [`CausalModel`].
//!
//! ## Loading
//!
//! Backends are materialized by a [`BackendLoader`]. A loader receives a catalog
//! entry and an explicit [`Device`] and either produces a [`BackendHandle`] or a
//! [`LoadFailure`]. Failures are plain values, so a caller iterating over a
//! catalog can record them and move on to the next entry.
//!
//! ## Error Handling
//!
//! Tokenizer and model implementations have their own bespoke error types. These
//! are encapsulated in [`Error`], and the [`ErrorKind`] enum provides an indication
//! of the category of error that was raised.

pub(crate) mod hub;
pub(crate) mod spec;

#[cfg(test)]
pub(crate) mod stub;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

use crate::registry::catalog::CatalogEntry;
pub(crate) use spec::{BackendKey, BackendSpec};

/// This is a list specifying general categories of errors that
/// can be returned by a backend capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// Model files could not be fetched from the hub or the local cache.
    Fetch,
    /// The model configuration is missing fields or is malformed.
    Configuration,
    /// The model declares an architecture this gateway cannot run.
    UnsupportedArchitecture,
    /// The tokenizer could not be constructed or failed to encode.
    Tokenizer,
    /// The model weights could not be read or did not match the configuration.
    Weights,
    /// The requested compute device could not be initialized.
    Device,
    /// The model failed while producing tokens.
    Generation,
    /// The generated token ids could not be decoded into text.
    Decoding,
    /// An error that does not fit into any of the other categories.
    Internal,
}

#[derive(Debug)]
pub(crate) struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub(crate) fn from_source<E>(kind: ErrorKind, source: E) -> Error
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error {
            kind,
            source: Some(source.into()),
        }
    }

    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Fetch => "failed to fetch model files",
            ErrorKind::Configuration => "the model configuration is invalid",
            ErrorKind::UnsupportedArchitecture => "the model architecture is not supported",
            ErrorKind::Tokenizer => "tokenization failed",
            ErrorKind::Weights => "failed to load the model weights",
            ErrorKind::Device => "failed to initialize the compute device",
            ErrorKind::Generation => "generation failed",
            ErrorKind::Decoding => "failed to decode the generated tokens",
            ErrorKind::Internal => "an internal error occurred",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message(), source),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

/// The compute device a backend is placed on. Resolved once from configuration
/// and passed explicitly to every load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum Device {
    Cpu,
    Accelerator,
}

impl Device {
    /// Returns the accelerator only when it was requested and one is present,
    /// falling back to an explicit CPU placement otherwise.
    pub(crate) fn resolve(accelerator_requested: bool, accelerator_available: bool) -> Device {
        if accelerator_requested && accelerator_available {
            Device::Accelerator
        } else {
            Device::Cpu
        }
    }

    /// Probe the host for a usable accelerator.
    pub(crate) fn accelerator_available() -> bool {
        candle_core::utils::cuda_is_available()
    }
}

/// Converts between text and token ids.
pub(crate) trait TextTokenizer: Send + Sync {
    /// Encodes `text`, including whatever special tokens the model expects
    /// around a prompt.
    fn encode(&self, text: &str) -> Result<Vec<u32>, Error>;

    /// Decodes `ids`, dropping special and control tokens.
    fn decode(&self, ids: &[u32]) -> Result<String, Error>;
}

/// Produces a continuation for a tokenized prompt.
pub(crate) trait CausalModel: Send + Sync {
    /// Generates at most `max_new_tokens` ids following `prompt`. The returned
    /// ids exclude the prompt.
    fn generate(&self, prompt: &[u32], max_new_tokens: usize) -> Result<Vec<u32>, Error>;
}

/// A loaded, ready-to-use backend. Never mutated after construction.
pub(crate) struct BackendHandle {
    key: BackendKey,
    tokenizer: Box<dyn TextTokenizer>,
    model: Box<dyn CausalModel>,
    device: Device,
}

impl BackendHandle {
    pub(crate) fn new(
        key: BackendKey,
        tokenizer: Box<dyn TextTokenizer>,
        model: Box<dyn CausalModel>,
        device: Device,
    ) -> BackendHandle {
        BackendHandle {
            key,
            tokenizer,
            model,
            device,
        }
    }

    pub(crate) fn key(&self) -> &BackendKey {
        &self.key
    }

    pub(crate) fn tokenizer(&self) -> &dyn TextTokenizer {
        self.tokenizer.as_ref()
    }

    pub(crate) fn model(&self) -> &dyn CausalModel {
        self.model.as_ref()
    }

    pub(crate) fn device(&self) -> Device {
        self.device
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("key", &self.key)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// A backend could not be loaded. Carries the key it was loaded under.
#[derive(Error, Debug)]
#[error("failed to load backend \"{key}\": {source}")]
pub(crate) struct LoadFailure {
    pub key: BackendKey,
    #[source]
    pub source: Error,
}

impl LoadFailure {
    pub(crate) fn new(key: BackendKey, source: Error) -> LoadFailure {
        LoadFailure { key, source }
    }
}

/// A trait implemented by everything that can materialize a backend.
#[async_trait]
pub(crate) trait BackendLoader: Send + Sync {
    /// Attempts to load one catalog entry onto `device`. Failures are returned,
    /// never raised, and loading the same entry again is safe.
    async fn load(&self, entry: &CatalogEntry, device: Device) -> Result<BackendHandle, LoadFailure>;
}
