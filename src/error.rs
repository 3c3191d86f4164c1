use std::ffi::OsString;

use thiserror::Error;

use crate::config::MODEL_ENV;

/// Boxed error as returned by the `tokenizers` crate and by custom loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("Environment variable {var} is not valid unicode: {value:?}")]
    NotUnicode { var: String, value: OsString },

    #[error("Failed to decode JSON string {input:?}")]
    InvalidJson {
        input: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Tokenizer arguments must be a JSON object, got {kind} in {input:?}")]
    NotAnObject { input: String, kind: &'static str },

    #[error(
        "Failed to load Huggingface tokenizer `{model}`. Unset environment variable '{env}' to disable using huggingface tokenizer.",
        env = MODEL_ENV
    )]
    Load {
        model: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to encode text: {0}")]
    Encode(#[source] BoxError),

    #[error("Failed to decode token ids: {0}")]
    Decode(#[source] BoxError),
}
