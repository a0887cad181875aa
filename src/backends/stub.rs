//! Deterministic in-memory backends for tests.
//!
//! Token ids below 256 are bytes; anything above is treated as a special token
//! and dropped on decode.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    BackendHandle, BackendKey, BackendLoader, CausalModel, Device, Error, ErrorKind, LoadFailure,
    TextTokenizer,
};
use crate::registry::catalog::CatalogEntry;

pub(crate) const END_OF_TEXT: u32 = 1000;

/// Counts how often each capability was invoked.
#[derive(Default, Debug)]
pub(crate) struct Calls {
    pub encode: AtomicUsize,
    pub generate: AtomicUsize,
    pub decode: AtomicUsize,
}

impl Calls {
    pub(crate) fn total(&self) -> usize {
        self.encode.load(Ordering::SeqCst)
            + self.generate.load(Ordering::SeqCst)
            + self.decode.load(Ordering::SeqCst)
    }
}

pub(crate) struct ByteTokenizer {
    calls: Arc<Calls>,
}

impl ByteTokenizer {
    pub(crate) fn new(calls: Arc<Calls>) -> ByteTokenizer {
        ByteTokenizer { calls }
    }
}

impl TextTokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, Error> {
        self.calls.encode.fetch_add(1, Ordering::SeqCst);

        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String, Error> {
        self.calls.decode.fetch_add(1, Ordering::SeqCst);

        let bytes: Vec<u8> = ids
            .iter()
            .filter_map(|&id| u8::try_from(id).ok())
            .collect();

        String::from_utf8(bytes).map_err(|e| Error::from_source(ErrorKind::Decoding, e))
    }
}

#[derive(Clone)]
pub(crate) enum Behavior {
    /// Answers with the prompt reversed followed by an end-of-text token.
    Reverse,
    /// Fails every generation.
    Fail,
    /// Sleeps before answering like `Reverse`.
    Slow(Duration),
}

pub(crate) struct ScriptedModel {
    behavior: Behavior,
    calls: Arc<Calls>,
}

impl ScriptedModel {
    pub(crate) fn new(behavior: Behavior, calls: Arc<Calls>) -> ScriptedModel {
        ScriptedModel { behavior, calls }
    }
}

impl CausalModel for ScriptedModel {
    fn generate(&self, prompt: &[u32], max_new_tokens: usize) -> Result<Vec<u32>, Error> {
        self.calls.generate.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            Behavior::Fail => {
                return Err(Error::from_source(
                    ErrorKind::Generation,
                    "device ran out of memory",
                ))
            }
            Behavior::Slow(delay) => std::thread::sleep(*delay),
            Behavior::Reverse => {}
        }

        let mut out: Vec<u32> = prompt.iter().rev().copied().collect();
        out.push(END_OF_TEXT);
        out.truncate(max_new_tokens);

        Ok(out)
    }
}

pub(crate) fn handle_with(key: &str, behavior: Behavior, calls: Arc<Calls>) -> BackendHandle {
    BackendHandle::new(
        BackendKey::new(key),
        Box::new(ByteTokenizer::new(calls.clone())),
        Box::new(ScriptedModel::new(behavior, calls)),
        Device::Cpu,
    )
}

pub(crate) fn handle(key: &str) -> BackendHandle {
    handle_with(key, Behavior::Reverse, Arc::default())
}

/// Loads every entry except the ones it was told to fail, recording the order
/// of attempts.
#[derive(Default)]
pub(crate) struct ScriptedLoader {
    failing: HashSet<String>,
    attempts: Mutex<Vec<(BackendKey, Device)>>,
}

impl ScriptedLoader {
    pub(crate) fn failing<I, S>(keys: I) -> ScriptedLoader
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedLoader {
            failing: keys.into_iter().map(Into::into).collect(),
            attempts: Mutex::default(),
        }
    }

    pub(crate) fn attempts(&self) -> Vec<(BackendKey, Device)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendLoader for ScriptedLoader {
    async fn load(&self, entry: &CatalogEntry, device: Device) -> Result<BackendHandle, LoadFailure> {
        self.attempts
            .lock()
            .unwrap()
            .push((entry.key.clone(), device));

        if self.failing.contains(entry.key.as_str()) {
            return Err(LoadFailure::new(
                entry.key.clone(),
                Error::from_source(ErrorKind::Fetch, format!("{} is unreachable", entry.spec)),
            ));
        }

        let mut handle = handle(entry.key.as_str());
        handle.device = device;

        Ok(handle)
    }
}
