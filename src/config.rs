//! Environment-derived tokenizer configuration.

use std::env::{self, VarError};

use log::debug;
use serde_json::{Map, Value};

use crate::error::TokenizerError;

/// Model identifier: a Hub repository id, a `tokenizer.json` file or a directory holding one.
pub const MODEL_ENV: &str = "HF_TOKENIZER_MODEL";
/// Optional JSON object of extra construction arguments.
pub const ARGS_ENV: &str = "HF_TOKENIZER_ARGS";
/// Written as `"false"` before the tokenizer is constructed.
pub const PARALLELISM_ENV: &str = "TOKENIZERS_PARALLELISM";

#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerConfig {
    pub model: String,
    pub args: Map<String, Value>,
}

impl TokenizerConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            args: Map::new(),
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// # Returns
    /// * `Ok(None)` - `HF_TOKENIZER_MODEL` is unset or empty, the tokenizer is disabled
    /// * `Ok(Some(config))` - a model is configured, with its parsed arguments
    ///
    /// # Errors
    /// Returns an error if:
    /// - either variable is set to a value that is not valid unicode
    /// - `HF_TOKENIZER_ARGS` is not a JSON object
    pub fn from_env() -> Result<Option<Self>, TokenizerError> {
        Self::from_fallible_lookup(read_env)
    }

    /// Read the configuration through `lookup`, same rules as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, TokenizerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_fallible_lookup(|key| Ok(lookup(key)))
    }

    fn from_fallible_lookup<F>(lookup: F) -> Result<Option<Self>, TokenizerError>
    where
        F: Fn(&str) -> Result<Option<String>, TokenizerError>,
    {
        let model = match lookup(MODEL_ENV)? {
            Some(model) if !model.is_empty() => model,
            _ => {
                debug!("{} is not set, huggingface tokenizer disabled", MODEL_ENV);
                return Ok(None);
            }
        };
        let args = parse_json_args(lookup(ARGS_ENV)?.as_deref())?;
        Ok(Some(Self { model, args }))
    }
}

/// Read `key` from the process environment; only an absent variable counts as unset.
pub fn read_env(key: &str) -> Result<Option<String>, TokenizerError> {
    match env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(value)) => Err(TokenizerError::NotUnicode {
            var: key.to_string(),
            value,
        }),
    }
}

/// Parse an optional JSON string into a map of construction arguments.
///
/// Missing or empty input yields an empty map.
pub fn parse_json_args(input: Option<&str>) -> Result<Map<String, Value>, TokenizerError> {
    let Some(input) = input.filter(|s| !s.is_empty()) else {
        return Ok(Map::new());
    };
    let value: Value =
        serde_json::from_str(input).map_err(|source| TokenizerError::InvalidJson {
            input: input.to_string(),
            source,
        })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TokenizerError::NotAnObject {
            input: input.to_string(),
            kind: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
