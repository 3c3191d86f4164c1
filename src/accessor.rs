//! Lazily constructed, process-wide tokenizer handles.
//!
//! A [`TokenizerAccessor`] owns a single slot. The first successful call to
//! [`TokenizerAccessor::get`] constructs the tokenizer and every later call
//! returns the same `Arc`, even if the environment has changed since.

use std::sync::{Arc, Mutex, OnceLock};

use log::info;

use crate::config::TokenizerConfig;
use crate::error::{BoxError, TokenizerError};
use crate::tokenizer::{HfLoader, HfTokenizer, TextTokenizer};

/// Constructs a tokenizer from a resolved configuration.
pub trait TokenizerLoader: Send + Sync {
    type Output: TextTokenizer;

    fn load(&self, config: &TokenizerConfig) -> Result<Self::Output, BoxError>;
}

pub struct TokenizerAccessor<L: TokenizerLoader> {
    loader: L,
    slot: OnceLock<Arc<L::Output>>,
    init: Mutex<()>,
}

impl<L: TokenizerLoader> TokenizerAccessor<L> {
    pub const fn new(loader: L) -> Self {
        Self {
            loader,
            slot: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    /// Return the tokenizer configured by the process environment.
    ///
    /// # Returns
    /// * `Ok(Some(tokenizer))` - the cached tokenizer, constructed on the first successful call
    /// * `Ok(None)` - `HF_TOKENIZER_MODEL` is unset and the feature is disabled
    ///
    /// # Errors
    /// Returns an error if the environment holds malformed configuration or the
    /// loader fails. Failures are never cached: the next call tries again.
    pub fn get(&self) -> Result<Option<Arc<L::Output>>, TokenizerError> {
        self.resolve(TokenizerConfig::from_env)
    }

    /// Same as [`get`](Self::get), reading variables through `lookup`.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<Option<Arc<L::Output>>, TokenizerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.resolve(|| TokenizerConfig::from_lookup(lookup))
    }

    fn resolve<C>(&self, read_config: C) -> Result<Option<Arc<L::Output>>, TokenizerError>
    where
        C: FnOnce() -> Result<Option<TokenizerConfig>, TokenizerError>,
    {
        if let Some(tokenizer) = self.slot.get() {
            return Ok(Some(Arc::clone(tokenizer)));
        }

        // A panicking loader leaves nothing behind worth protecting.
        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tokenizer) = self.slot.get() {
            return Ok(Some(Arc::clone(tokenizer)));
        }

        let Some(config) = read_config()? else {
            return Ok(None);
        };

        let tokenizer = self
            .loader
            .load(&config)
            .map(Arc::new)
            .map_err(|source| TokenizerError::Load {
                model: config.model.clone(),
                source,
            })?;
        info!("Huggingface tokenizer has been loaded: {}", config.model);

        let tokenizer = self.slot.get_or_init(|| tokenizer);
        Ok(Some(Arc::clone(tokenizer)))
    }

    /// The cached tokenizer, without attempting construction.
    pub fn loaded(&self) -> Option<Arc<L::Output>> {
        self.slot.get().cloned()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

static HUGGINGFACE: TokenizerAccessor<HfLoader> = TokenizerAccessor::new(HfLoader);

/// Process-wide Hugging Face tokenizer configured by `HF_TOKENIZER_MODEL` and
/// `HF_TOKENIZER_ARGS`, or `None` when no model is configured.
pub fn huggingface_tokenizer() -> Result<Option<Arc<HfTokenizer>>, TokenizerError> {
    HUGGINGFACE.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ARGS_ENV, MODEL_ENV};
    use crate::tokenizer::huggingface::tests::{LOAD_LOCK, tokenizer_dir};
    use std::collections::HashMap;
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug)]
    struct FakeTokenizer {
        model: String,
    }

    impl TextTokenizer for FakeTokenizer {
        fn encode(&self, text: &str, _: bool) -> Result<Vec<u32>, TokenizerError> {
            Ok(text.bytes().map(u32::from).collect())
        }

        fn decode(&self, ids: &[u32], _: bool) -> Result<String, TokenizerError> {
            Ok(ids.iter().filter_map(|&id| char::from_u32(id)).collect())
        }
    }

    #[derive(Default)]
    struct CountingLoader {
        calls: AtomicUsize,
        fail: bool,
    }

    impl TokenizerLoader for CountingLoader {
        type Output = FakeTokenizer;

        fn load(&self, config: &TokenizerConfig) -> Result<FakeTokenizer, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(format!("repository `{}` not found", config.model).into());
            }
            Ok(FakeTokenizer {
                model: config.model.clone(),
            })
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn init_logger() {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init();
    }

    #[test]
    fn test_unset_model_returns_none() {
        init_logger();
        let accessor = TokenizerAccessor::new(CountingLoader::default());
        let env = vars(&[]);
        let result = accessor.resolve_with(|k| env.get(k).cloned()).unwrap();
        assert!(result.is_none());
        assert_eq!(accessor.loader().calls.load(Ordering::SeqCst), 0);
        assert!(accessor.loaded().is_none());
    }

    #[test]
    fn test_constructs_once_and_returns_same_handle() {
        init_logger();
        let accessor = TokenizerAccessor::new(CountingLoader::default());
        let env = vars(&[(MODEL_ENV, "bert-base-uncased")]);

        let first = accessor.resolve_with(|k| env.get(k).cloned()).unwrap().unwrap();
        let second = accessor.resolve_with(|k| env.get(k).cloned()).unwrap().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.model, "bert-base-uncased");
        assert_eq!(accessor.loader().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cached_handle_ignores_environment_changes() {
        let accessor = TokenizerAccessor::new(CountingLoader::default());
        let before = vars(&[(MODEL_ENV, "bert-base-uncased")]);
        let first = accessor.resolve_with(|k| before.get(k).cloned()).unwrap().unwrap();

        let unset = vars(&[]);
        let after_unset = accessor.resolve_with(|k| unset.get(k).cloned()).unwrap();
        assert!(Arc::ptr_eq(&first, after_unset.as_ref().unwrap()));

        let other = vars(&[(MODEL_ENV, "gpt2"), (ARGS_ENV, "not json")]);
        let after_change = accessor.resolve_with(|k| other.get(k).cloned()).unwrap().unwrap();
        assert_eq!(after_change.model, "bert-base-uncased");
        assert_eq!(accessor.loader().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_args_fail_without_caching() {
        let accessor = TokenizerAccessor::new(CountingLoader::default());
        let bad = vars(&[(MODEL_ENV, "bert-base-uncased"), (ARGS_ENV, "not json")]);

        let err = accessor.resolve_with(|k| bad.get(k).cloned()).unwrap_err();
        assert!(matches!(err, TokenizerError::InvalidJson { .. }));
        assert!(err.to_string().contains("\"not json\""));
        assert!(accessor.loaded().is_none());
        assert_eq!(accessor.loader().calls.load(Ordering::SeqCst), 0);

        let good = vars(&[(MODEL_ENV, "bert-base-uncased")]);
        assert!(accessor.resolve_with(|k| good.get(k).cloned()).unwrap().is_some());
    }

    #[test]
    fn test_load_failure_is_wrapped_and_retried() {
        let accessor = TokenizerAccessor::new(CountingLoader {
            fail: true,
            ..Default::default()
        });
        let env = vars(&[(MODEL_ENV, "no/such-model")]);

        for attempt in 1..=2 {
            let err = accessor.resolve_with(|k| env.get(k).cloned()).unwrap_err();
            assert!(matches!(
                err,
                TokenizerError::Load { ref model, .. } if model == "no/such-model"
            ));
            let message = err.to_string();
            assert!(
                message.contains("Unset environment variable 'HF_TOKENIZER_MODEL'"),
                "{message}"
            );
            let cause = err.source().expect("load error keeps its cause").to_string();
            assert!(cause.contains("not found"), "{cause}");
            assert_eq!(accessor.loader().calls.load(Ordering::SeqCst), attempt);
        }
        assert!(accessor.loaded().is_none());
    }

    #[test]
    fn test_concurrent_first_calls_construct_once() {
        let accessor = TokenizerAccessor::new(CountingLoader::default());
        let env = vars(&[(MODEL_ENV, "bert-base-uncased")]);

        let (shared, env) = (&accessor, &env);
        let handles: Vec<_> = thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(move || {
                        shared
                            .resolve_with(|k| env.get(k).cloned())
                            .unwrap()
                            .unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(accessor.loader().calls.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
    }

    #[test]
    fn test_huggingface_loader_through_accessor() {
        init_logger();
        let _guard = LOAD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tokenizer_dir();
        let accessor = TokenizerAccessor::new(HfLoader);
        let env = vars(&[
            (MODEL_ENV, dir.path().to_str().unwrap()),
            (ARGS_ENV, r#"{"model_max_length": 1}"#),
        ]);

        let tokenizer = accessor.resolve_with(|k| env.get(k).cloned()).unwrap().unwrap();
        assert_eq!(tokenizer.model_max_length(), Some(1));
        assert_eq!(tokenizer.encode("hello world", false).unwrap(), vec![1, 2]);
        assert_eq!(tokenizer.decode(&[1, 2], false).unwrap(), "hello world");
    }

    #[test]
    fn test_huggingface_loader_failure_is_wrapped() {
        let _guard = LOAD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let accessor = TokenizerAccessor::new(HfLoader);
        let env = vars(&[(MODEL_ENV, dir.path().to_str().unwrap())]);

        let err = accessor.resolve_with(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, TokenizerError::Load { .. }));
    }
}
