use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::debug;

use hf_tokenizer_env::{HfLoader, MODEL_ENV, TextTokenizer, TokenizerAccessor};

#[derive(Parser)]
#[command(
    name = "hf-tokenizer",
    about = "Encode and decode text with the tokenizer set in HF_TOKENIZER_MODEL"
)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the token ids of TEXT
    Encode {
        text: String,
        /// Add the model's special tokens
        #[arg(long)]
        special_tokens: bool,
    },
    /// Print the text for a sequence of token ids
    Decode {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<u32>,
        /// Keep special tokens in the output
        #[arg(long)]
        keep_special_tokens: bool,
    },
    /// Print the number of tokens in TEXT
    Count { text: String },
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let accessor = TokenizerAccessor::new(HfLoader);
    let Some(tokenizer) = accessor.get()? else {
        eprintln!(
            "Huggingface tokenizer is disabled: set {MODEL_ENV} to a model id or tokenizer.json path"
        );
        return Ok(ExitCode::from(2));
    };
    debug!("Vocabulary size: {}", tokenizer.vocab_size());

    match cli.command {
        Command::Encode { text, special_tokens } => {
            let ids = tokenizer.encode(&text, special_tokens)?;
            let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
            println!("{}", ids.join(" "));
        }
        Command::Decode { ids, keep_special_tokens } => {
            println!("{}", tokenizer.decode(&ids, !keep_special_tokens)?);
        }
        Command::Count { text } => {
            println!("{}", tokenizer.count_tokens(&text)?);
        }
    }
    Ok(ExitCode::SUCCESS)
}
