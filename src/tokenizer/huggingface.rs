use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokenizers::{FromPretrainedParameters, PostProcessor};
use tokenizers::tokenizer::Tokenizer;
use tokenizers::utils::parallelism;
use tokenizers::utils::truncation::{TruncationDirection, TruncationParams};

use super::TextTokenizer;
use crate::accessor::TokenizerLoader;
use crate::config::{PARALLELISM_ENV, TokenizerConfig};
use crate::error::{BoxError, TokenizerError};

/// File looked up when the model identifier is a local directory.
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Hugging Face tokenizer wrapper
///
/// Adapts `tokenizers::Tokenizer` to the [`TextTokenizer`] contract.
///
/// # Thread Safety
/// `tokenizers::Tokenizer` is `Send + Sync` and encodes through `&self`, so one
/// instance can be shared across threads behind an `Arc`.
pub struct HfTokenizer {
    inner: Tokenizer,
    model_max_length: Option<usize>,
}

impl HfTokenizer {
    /// Load a tokenizer from a `tokenizer.json` file
    ///
    /// # Arguments
    /// * `path` - Path to a serialized `tokenizers` model (typically `tokenizer.json`)
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid tokenizer definition
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BoxError> {
        Ok(Self {
            inner: Tokenizer::from_file(path)?,
            model_max_length: None,
        })
    }

    /// Number of entries in the vocabulary, added tokens included
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// Maximum sequence length the model accepts, as given by `model_max_length`.
    ///
    /// Only informational: encoding truncates to it when the `truncation` argument is set.
    pub fn model_max_length(&self) -> Option<usize> {
        self.model_max_length
    }
}

impl fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HfTokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("model_max_length", &self.model_max_length)
            .finish()
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>, TokenizerError> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(TokenizerError::Encode)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(TokenizerError::Decode)
    }
}

/// Construction arguments understood from `HF_TOKENIZER_ARGS`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PretrainedArgs {
    revision: Option<String>,
    token: Option<AuthToken>,
    use_auth_token: Option<AuthToken>,
    user_agent: HashMap<String, String>,
    model_max_length: Option<usize>,
    truncation: bool,
    truncation_side: TruncationSide,
    #[serde(flatten)]
    unsupported: Map<String, Value>,
}

impl PretrainedArgs {
    /// Explicit Hub token, if any. `true` means the cached login token, which the
    /// Hub client already picks up on its own.
    fn hub_token(&mut self) -> Option<String> {
        match self.token.take().or_else(|| self.use_auth_token.take()) {
            Some(AuthToken::Token(token)) => Some(token),
            Some(AuthToken::UseCached(_)) | None => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthToken {
    UseCached(bool),
    Token(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TruncationSide {
    Left,
    #[default]
    Right,
}

impl From<TruncationSide> for TruncationDirection {
    fn from(side: TruncationSide) -> Self {
        match side {
            TruncationSide::Left => TruncationDirection::Left,
            TruncationSide::Right => TruncationDirection::Right,
        }
    }
}

#[derive(Debug, PartialEq)]
enum ModelSource {
    File(PathBuf),
    Hub(String),
}

impl ModelSource {
    /// Local files and directories win over Hub identifiers of the same name.
    fn resolve(model: &str) -> Self {
        let path = Path::new(model);
        if path.is_file() {
            ModelSource::File(path.to_path_buf())
        } else if path.is_dir() {
            ModelSource::File(path.join(TOKENIZER_FILE))
        } else {
            ModelSource::Hub(model.to_string())
        }
    }
}

/// Builds [`HfTokenizer`]s from a model identifier and its construction arguments.
#[derive(Debug, Default, Clone, Copy)]
pub struct HfLoader;

impl TokenizerLoader for HfLoader {
    type Output = HfTokenizer;

    /// Build the tokenizer described by `config`.
    ///
    /// # Arguments
    /// * `config` - Model identifier (local file, local directory or Hub id) and the
    ///   construction arguments from `HF_TOKENIZER_ARGS`
    ///
    /// # Errors
    /// Returns an error if:
    /// - a recognised argument has the wrong type
    /// - the tokenizer cannot be read or downloaded
    /// - `truncation` is requested without a usable `model_max_length`
    fn load(&self, config: &TokenizerConfig) -> Result<HfTokenizer, BoxError> {
        let mut args: PretrainedArgs =
            serde_json::from_value(Value::Object(config.args.clone()))?;
        for key in args.unsupported.keys() {
            warn!("Ignoring unsupported tokenizer argument `{}`", key);
        }

        disable_parallelism();

        let mut inner = match ModelSource::resolve(&config.model) {
            ModelSource::File(path) => {
                debug!("Loading tokenizer from {}", path.display());
                Tokenizer::from_file(&path)?
            }
            ModelSource::Hub(identifier) => {
                debug!("Fetching tokenizer `{}` from the Hugging Face Hub", identifier);
                let mut params = FromPretrainedParameters::default();
                params.token = args.hub_token();
                if let Some(revision) = args.revision {
                    params.revision = revision;
                }
                params.user_agent.extend(args.user_agent);
                Tokenizer::from_pretrained(&identifier, Some(params))?
            }
        };

        if args.truncation {
            let Some(max_length) = args.model_max_length else {
                return Err("`truncation` requires `model_max_length`".into());
            };
            let added = inner
                .get_post_processor()
                .map_or(0, |processor| processor.added_tokens(false));
            if max_length < added {
                return Err(format!(
                    "model_max_length {max_length} is below the {added} special tokens \
                     the post-processor adds"
                )
                .into());
            }
            inner.with_truncation(Some(TruncationParams {
                max_length,
                direction: args.truncation_side.into(),
                ..Default::default()
            }))?;
        }

        Ok(HfTokenizer {
            inner,
            model_max_length: args.model_max_length,
        })
    }
}

/// Turn off the tokenizers thread pool, both in-process and for child processes.
fn disable_parallelism() {
    // SAFETY: std serializes `set_var` against its own environment reads. Callers
    // reading the environment through libc on another thread are not covered.
    unsafe { env::set_var(PARALLELISM_ENV, "false") };
    parallelism::set_parallelism(false);
}
