use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use burn::config::Config;
use clap::{Parser, Subcommand};
use ndarray::ArrayD;
use ndarray_npy::{read_npy, write_npy};
use tracing::{info, Level};

use seqbatch::data::{merge_var_len_array, CollateConfig, Element, VarLengthCollate};
use seqbatch::tokenizer::{
    Sentence, TokenId, Tokenizer, WordVocabulary, WordVocabularyConfig, WordVocabularySnapshot,
};

#[derive(Parser)]
#[command(name = "seqbatch", about = "Pad batches and build vocabularies for sequence models")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct CollateArgs {
    /// JSON collate config; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    pad_value: Option<f64>,
    #[arg(long)]
    batch_dim: Option<usize>,
}

impl CollateArgs {
    fn load(&self) -> Result<CollateConfig> {
        let mut config = match &self.config {
            Some(path) => CollateConfig::load(path)
                .map_err(|err| anyhow!("could not load {}: {err:?}", path.display()))?,
            None => CollateConfig::new(),
        };
        if let Some(pad_value) = self.pad_value {
            config.pad_value = pad_value;
        }
        if let Some(batch_dim) = self.batch_dim {
            config.batch_dim = batch_dim;
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Merge a JSON array of batch items and print the padded batch as JSON.
    Collate {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        collate: CollateArgs,
    },
    /// Merge .npy arrays into one padded .npy array.
    CollateNpy {
        #[arg(long)]
        out: PathBuf,
        /// Read and write i64 arrays instead of f32.
        #[arg(long)]
        int: bool,
        #[command(flatten)]
        collate: CollateArgs,
        #[arg(required = true)]
        arrays: Vec<PathBuf>,
    },
    /// Build a word vocabulary from a corpus, one sentence per line.
    Vocab {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        allow_any_word: bool,
        #[arg(long)]
        no_split_punctuation: bool,
    },
    /// Encode a sentence with a saved vocabulary.
    Encode {
        #[arg(long)]
        vocab: PathBuf,
        text: String,
    },
    /// Decode indices with a saved vocabulary.
    Decode {
        #[arg(long)]
        vocab: PathBuf,
        #[arg(required = true)]
        indices: Vec<TokenId>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Collate { input, collate } => {
            let config = collate.load()?;
            let contents = fs::read_to_string(&input)
                .with_context(|| format!("could not read {}", input.display()))?;
            let value: serde_json::Value = serde_json::from_str(&contents)?;
            let serde_json::Value::Array(items) = value else {
                bail!("{} must hold a JSON array of batch items", input.display());
            };
            let batch = items
                .into_iter()
                .map(Element::try_from)
                .collect::<seqbatch::Result<Vec<_>>>()?;

            info!(size = batch.len(), "collating {}", input.display());
            let merged = VarLengthCollate::new(config).merge(batch)?;
            println!("{}", serde_json::to_string_pretty(&merged.to_json())?);
        }
        Command::CollateNpy {
            out,
            int,
            collate,
            arrays,
        } => {
            let config = collate.load()?;
            if int {
                let batch = read_arrays::<i64>(&arrays)?;
                let merged =
                    merge_var_len_array(&batch, config.pad_value as i64, config.batch_dim)?;
                write_npy(&out, &merged)?;
                info!(shape = ?merged.shape(), "wrote {}", out.display());
            } else {
                let batch = read_arrays::<f32>(&arrays)?;
                let merged =
                    merge_var_len_array(&batch, config.pad_value as f32, config.batch_dim)?;
                write_npy(&out, &merged)?;
                info!(shape = ?merged.shape(), "wrote {}", out.display());
            }
        }
        Command::Vocab {
            corpus,
            out,
            allow_any_word,
            no_split_punctuation,
        } => {
            let config = WordVocabularyConfig::new()
                .with_allow_any_word(allow_any_word)
                .with_split_punctuation(!no_split_punctuation);
            let contents = fs::read_to_string(&corpus)
                .with_context(|| format!("could not read {}", corpus.display()))?;
            let sentences = contents.lines().filter(|line| !line.trim().is_empty());

            let vocab = WordVocabulary::from_sentences(sentences, &config)?;
            fs::write(&out, serde_json::to_string_pretty(&vocab.snapshot())?)?;
            info!(len = vocab.len(), "wrote {}", out.display());
        }
        Command::Encode { vocab, text } => {
            let vocab = load_vocabulary(&vocab)?;
            let indices = vocab.sentence_to_indices(&Sentence::from(text))?;
            println!("{}", serde_json::to_string(&indices)?);
        }
        Command::Decode { vocab, indices } => {
            let vocab = load_vocabulary(&vocab)?;
            println!("{}", vocab.decode(&indices)?);
        }
    }

    Ok(())
}

fn read_arrays<A: ndarray_npy::ReadableElement>(paths: &[PathBuf]) -> Result<Vec<ArrayD<A>>> {
    paths
        .iter()
        .map(|path| {
            read_npy(path).with_context(|| format!("could not read {}", path.display()))
        })
        .collect()
}

fn load_vocabulary(path: &Path) -> Result<WordVocabulary> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let snapshot: WordVocabularySnapshot = serde_json::from_str(&contents)?;
    Ok(WordVocabulary::from_snapshot(snapshot)?)
}
