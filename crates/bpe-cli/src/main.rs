//! `bpe`: train a byte-level BPE vocabulary, or apply one to encode and
//! decode text. Thin front-end over `bpe_core`.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use bpe_core::{train, vocab, BpeEncoder, TokenizerError, TrainConfig};

#[derive(Parser)]
#[command(name = "bpe", about = "Byte-level BPE tokenizer: train, encode, decode")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Learn a merge table from a corpus file.
    Train {
        #[arg(long)]
        input: PathBuf,
        #[arg(long = "vocab-size")]
        vocab_size: usize,
        #[arg(long, default_value = "")]
        specials: String,
        #[arg(long = "num-processes", default_value_t = 1)]
        num_processes: usize,
        #[arg(long = "vocab-out", default_value = "vocab.json")]
        vocab_out: PathBuf,
        #[arg(long = "merges-out", default_value = "merges.txt")]
        merges_out: PathBuf,
    },
    /// Encode text read from stdin into symbol IDs written to stdout.
    Encode {
        #[arg(long)]
        vocab: PathBuf,
        #[arg(long)]
        merges: PathBuf,
        #[arg(long, default_value = "")]
        specials: String,
    },
    /// Decode symbol IDs read from stdin into text written to stdout.
    Decode {
        #[arg(long)]
        vocab: PathBuf,
        #[arg(long)]
        merges: PathBuf,
    },
}

fn parse_specials(csv: &str) -> Vec<Vec<u8>> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.as_bytes().to_vec())
        .collect()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Maps the library's error taxonomy to distinct process exit
/// codes; an error with no `TokenizerError` in its chain (e.g. a CLI
/// argument problem) is treated as a configuration error.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<TokenizerError>() {
        Some(TokenizerError::Configuration(_)) => 2,
        Some(TokenizerError::Io(_)) => 3,
        Some(TokenizerError::Consistency(_)) => 4,
        Some(TokenizerError::Decode(_)) => 4,
        None => 2,
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Train {
            input,
            vocab_size,
            specials,
            num_processes,
            vocab_out,
            merges_out,
        } => cmd_train(input, vocab_size, parse_specials(&specials), num_processes, vocab_out, merges_out),
        Command::Encode { vocab, merges, specials } => cmd_encode(vocab, merges, parse_specials(&specials)),
        Command::Decode { vocab, merges } => cmd_decode(vocab, merges),
    }
}

fn cmd_train(
    input: PathBuf,
    vocab_size: usize,
    specials: Vec<Vec<u8>>,
    num_processes: usize,
    vocab_out: PathBuf,
    merges_out: PathBuf,
) -> Result<()> {
    let config = TrainConfig {
        input_path: input,
        vocab_size,
        specials,
        num_processes,
    };
    let outcome = train(&config, &AtomicBool::new(false)).map_err(anyhow::Error::from)?;
    if !outcome.completed {
        eprintln!("warning: training was cancelled before completion; writing partial result");
    }

    let vocab_file = BufWriter::new(
        File::create(&vocab_out).with_context(|| format!("creating {}", vocab_out.display()))?,
    );
    vocab::write_vocab(&outcome.table, vocab_file).map_err(anyhow::Error::from)?;

    let merges_file = BufWriter::new(
        File::create(&merges_out).with_context(|| format!("creating {}", merges_out.display()))?,
    );
    vocab::write_merges(&outcome.table, merges_file).map_err(anyhow::Error::from)?;

    eprintln!(
        "trained vocab_size={} merges={} -> {}, {}",
        outcome.table.len(),
        outcome.table.merges().len(),
        vocab_out.display(),
        merges_out.display()
    );
    Ok(())
}

fn cmd_encode(vocab_path: PathBuf, merges_path: PathBuf, specials: Vec<Vec<u8>>) -> Result<()> {
    let vocab_file = File::open(&vocab_path).with_context(|| format!("opening {}", vocab_path.display()))?;
    let merges_file = File::open(&merges_path).with_context(|| format!("opening {}", merges_path.display()))?;
    let table = vocab::load_table(vocab_file, merges_file).map_err(anyhow::Error::from)?;

    let mut text = String::new();
    io::stdin().read_to_string(&mut text).context("reading stdin")?;

    let encoder = BpeEncoder::new(&table, specials);
    let ids = encoder.encode(&text);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for id in ids {
        writeln!(out, "{id}")?;
    }
    Ok(())
}

fn cmd_decode(vocab_path: PathBuf, merges_path: PathBuf) -> Result<()> {
    let vocab_file = File::open(&vocab_path).with_context(|| format!("opening {}", vocab_path.display()))?;
    let merges_file = File::open(&merges_path).with_context(|| format!("opening {}", merges_path.display()))?;
    let table = vocab::load_table(vocab_file, merges_file).map_err(anyhow::Error::from)?;

    let mut ids = Vec::new();
    for line in io::stdin().lines() {
        let line = line.context("reading stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id: u32 = line
            .parse()
            .with_context(|| format!("line {line:?} is not a valid symbol ID"))?;
        ids.push(id);
    }

    let text = bpe_core::decode(&table, &ids).map_err(anyhow::Error::from)?;
    print!("{text}");
    Ok(())
}
