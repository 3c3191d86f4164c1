//! Environment-configured Hugging Face tokenizer, loaded once per process.
//!
//! Set `HF_TOKENIZER_MODEL` to a Hub model id (or a local `tokenizer.json` /
//! directory) and optionally `HF_TOKENIZER_ARGS` to a JSON object of construction
//! arguments. Leaving `HF_TOKENIZER_MODEL` unset disables the tokenizer.

pub mod accessor;
pub mod config;
pub mod error;
pub mod tokenizer;

pub use accessor::{TokenizerAccessor, TokenizerLoader, huggingface_tokenizer};
pub use config::{ARGS_ENV, MODEL_ENV, PARALLELISM_ENV, TokenizerConfig, parse_json_args};
pub use error::{BoxError, TokenizerError};
pub use tokenizer::{HfLoader, HfTokenizer, TextTokenizer};
