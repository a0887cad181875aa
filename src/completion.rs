//! Drives one generation against a resident backend.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::backends::{self, BackendHandle, ErrorKind};

pub(crate) const DEFAULT_MAX_NEW_TOKENS: usize = 500;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Error, Debug)]
pub(crate) enum CompletionError {
    /// The caller sent nothing to complete.
    #[error("Prompt is required")]
    EmptyPrompt,
    /// Tokenization, generation or decoding failed.
    #[error("{0}")]
    Generation(#[source] backends::Error),
    /// The generation did not finish in time. The computation itself may still
    /// be running on the blocking pool.
    #[error("generation did not finish within {0:?}")]
    TimedOut(Duration),
}

impl CompletionError {
    /// Whether the caller, rather than the backend, is at fault.
    pub(crate) fn is_client_error(&self) -> bool {
        matches!(self, CompletionError::EmptyPrompt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Completion {
    pub text: String,
    pub generated_tokens: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct CompletionService {
    max_new_tokens: usize,
    timeout: Option<Duration>,
}

impl Default for CompletionService {
    fn default() -> Self {
        CompletionService::new(DEFAULT_MAX_NEW_TOKENS, Some(DEFAULT_TIMEOUT))
    }
}

impl CompletionService {
    pub(crate) fn new(max_new_tokens: usize, timeout: Option<Duration>) -> CompletionService {
        CompletionService {
            max_new_tokens,
            timeout,
        }
    }

    /// Complete `prompt` on `handle`. The generation runs on the blocking pool
    /// and never touches the handle mutably, so a failed or abandoned request
    /// leaves the backend usable for the next one.
    pub(crate) async fn complete(
        &self,
        prompt: &str,
        handle: Arc<BackendHandle>,
    ) -> Result<Completion, CompletionError> {
        if prompt.is_empty() {
            return Err(CompletionError::EmptyPrompt);
        }

        let prompt = prompt.to_owned();
        let max_new_tokens = self.max_new_tokens;

        let task = tokio::task::spawn_blocking(move || run(&handle, &prompt, max_new_tokens));

        let joined = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, task).await {
                Ok(joined) => joined,
                Err(_) => return Err(CompletionError::TimedOut(timeout)),
            },
            None => task.await,
        };

        joined
            .map_err(|e| {
                CompletionError::Generation(backends::Error::from_source(ErrorKind::Internal, e))
            })?
            .map_err(CompletionError::Generation)
    }
}

fn run(handle: &BackendHandle, prompt: &str, max_new_tokens: usize) -> Result<Completion, backends::Error> {
    let input = handle.tokenizer().encode(prompt)?;

    if input.is_empty() {
        return Err(backends::Error::from_source(
            ErrorKind::Tokenizer,
            "the prompt encoded to no tokens",
        ));
    }

    debug!(key = %handle.key(), device = %handle.device(), tokens = input.len(), "prompt encoded");

    let output = handle.model().generate(&input, max_new_tokens)?;
    let text = handle.tokenizer().decode(&output)?;

    Ok(Completion {
        text,
        generated_tokens: output.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::stub::{self, Behavior, Calls, ScriptedModel};
    use crate::backends::{BackendKey, Device, TextTokenizer};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_empty_prompt_never_reaches_the_backend() {
        let calls = Arc::new(Calls::default());
        let handle = Arc::new(stub::handle_with("fast", Behavior::Reverse, calls.clone()));

        let err = CompletionService::default()
            .complete("", handle)
            .await
            .unwrap_err();

        assert!(matches!(err, CompletionError::EmptyPrompt));
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "Prompt is required");
        assert_eq!(calls.total(), 0);
    }

    #[tokio::test]
    async fn test_completes_and_strips_special_tokens() {
        let calls = Arc::new(Calls::default());
        let handle = Arc::new(stub::handle_with("fast", Behavior::Reverse, calls.clone()));

        let completion = CompletionService::default()
            .complete("Hello", handle)
            .await
            .unwrap();

        assert_eq!(completion.text, "olleH");
        assert_eq!(completion.generated_tokens, 6);
        assert_eq!(calls.encode.load(Ordering::SeqCst), 1);
        assert_eq!(calls.generate.load(Ordering::SeqCst), 1);
        assert_eq!(calls.decode.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_new_token_budget_is_applied() {
        let handle = Arc::new(stub::handle("fast"));

        let completion = CompletionService::new(3, None)
            .complete("abcdef", handle)
            .await
            .unwrap();

        assert_eq!(completion.text, "fed");
        assert_eq!(completion.generated_tokens, 3);
    }

    #[tokio::test]
    async fn test_generation_failure_carries_the_cause() {
        let handle = Arc::new(stub::handle_with("fast", Behavior::Fail, Arc::default()));

        let err = CompletionService::default()
            .complete("Hello", handle.clone())
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
        assert!(err.to_string().contains("device ran out of memory"));

        match err {
            CompletionError::Generation(source) => assert_eq!(source.kind(), ErrorKind::Generation),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_abandons_the_wait_only() {
        let calls = Arc::new(Calls::default());
        let handle = Arc::new(stub::handle_with(
            "slow",
            Behavior::Slow(Duration::from_millis(200)),
            calls.clone(),
        ));

        let service = CompletionService::new(16, Some(Duration::from_millis(10)));

        let err = service.complete("Hello", handle.clone()).await.unwrap_err();
        assert!(matches!(err, CompletionError::TimedOut(_)));

        // The handle is still usable once the abandoned generation drains.
        let service = CompletionService::new(16, None);
        let completion = service.complete("Hi", handle).await.unwrap();

        assert_eq!(completion.text, "iH");
        assert_eq!(calls.generate.load(Ordering::SeqCst), 2);
    }

    struct SilentTokenizer;

    impl TextTokenizer for SilentTokenizer {
        fn encode(&self, _text: &str) -> Result<Vec<u32>, backends::Error> {
            Ok(Vec::new())
        }

        fn decode(&self, _ids: &[u32]) -> Result<String, backends::Error> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_prompt_without_tokens_is_not_generated() {
        let calls = Arc::new(Calls::default());
        let handle = Arc::new(BackendHandle::new(
            BackendKey::new("silent"),
            Box::new(SilentTokenizer),
            Box::new(ScriptedModel::new(Behavior::Reverse, calls.clone())),
            Device::Cpu,
        ));

        let err = CompletionService::default()
            .complete(" ", handle)
            .await
            .unwrap_err();

        assert!(!err.is_client_error());
        assert!(err.to_string().contains("the prompt encoded to no tokens"));
        assert_eq!(calls.generate.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_completions_are_independent() {
        let handle = Arc::new(stub::handle("fast"));
        let service = CompletionService::default();

        let (first, second) = tokio::join!(
            service.complete("Hello", handle.clone()),
            service.complete("Hello", handle.clone()),
        );

        assert_eq!(first.unwrap().text, "olleH");
        assert_eq!(second.unwrap().text, "olleH");
        assert_eq!(Arc::strong_count(&handle), 1);
    }
}
