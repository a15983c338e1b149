//! The training driver: ties chunking, pre-tokenization, the pair index,
//! and the merge selector together into the phases
//! that turn a corpus file into a symbol table and merge list.

use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::chunk::find_chunk_boundaries;
use crate::error::{Result, TokenizerError};
use crate::pair_index::PairIndex;
use crate::pretoken::Pretokenizer;
use crate::record::PretokenRecord;
use crate::symbol::{Pair, SymbolId, SymbolTable};

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub input_path: PathBuf,
    pub vocab_size: usize,
    pub specials: Vec<Vec<u8>>,
    pub num_processes: usize,
}

impl TrainConfig {
    /// Configuration-error checks, evaluated before any I/O that
    /// would otherwise surface as a (fatal, non-partial) I/O error.
    pub fn validate(&self) -> Result<()> {
        let min_vocab = 256 + self.specials.len();
        if self.vocab_size < min_vocab {
            return Err(TokenizerError::Configuration(format!(
                "vocab_size {} is below the minimum {} (256 base bytes + {} special tokens)",
                self.vocab_size,
                min_vocab,
                self.specials.len()
            )));
        }
        if self.num_processes < 1 {
            return Err(TokenizerError::Configuration(format!(
                "num_processes must be at least 1, got {}",
                self.num_processes
            )));
        }
        std::fs::metadata(&self.input_path).map_err(|e| {
            TokenizerError::Configuration(format!(
                "input path {:?} is not readable: {e}",
                self.input_path
            ))
        })?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub table: SymbolTable,
    /// `false` if a cancellation signal stopped the merge loop before
    /// `vocab_size` (or queue exhaustion) was reached. The symbol
    /// table and merges up to that point are still valid output.
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    count: u64,
    pair: Pair,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.count.cmp(&other.count)
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Train a BPE vocabulary over `config.input_path`. `cancel` is polled
/// between merge iterations; when set, training stops early and
/// returns the partial (but valid) result with `completed = false`.
pub fn train(config: &TrainConfig, cancel: &AtomicBool) -> Result<TrainingOutcome> {
    config.validate()?;

    let mut table = SymbolTable::new();
    for special in &config.specials {
        table.intern_special(special)?;
    }
    // IDs below this threshold are base bytes or declared specials; no
    // merge ever produces an ID in this range.
    let special_floor = 256usize;
    let special_ceiling = table.len();
    let is_special = |id: SymbolId| (id as usize) >= special_floor && (id as usize) < special_ceiling;

    info!(path = ?config.input_path, vocab_size = config.vocab_size, "starting BPE training");

    let freq = build_pretoken_frequencies(config)?;
    debug!(unique_pretokens = freq.len(), "aggregated pre-token frequencies");

    let mut keys: Vec<&Vec<u8>> = freq.keys().collect();
    keys.sort();

    let mut records: Vec<PretokenRecord> = Vec::with_capacity(keys.len());
    for bytes in keys {
        let f = freq[bytes];
        match table.id_of(bytes) {
            Some(id) if is_special(id) => records.push(PretokenRecord::inert(id, f)),
            _ => records.push(PretokenRecord::from_bytes(bytes, f)),
        }
    }

    let mut index = PairIndex::build(&records);
    let mut heap: BinaryHeap<Candidate> = index
        .pairs()
        .filter(|(_, &c)| c > 0)
        .map(|(&pair, &count)| Candidate { count, pair })
        .collect();

    let mut completed = true;
    while table.len() < config.vocab_size {
        if cancel.load(Ordering::Relaxed) {
            completed = false;
            break;
        }

        let Some(top) = heap.pop() else { break };
        let current = index.count_of(&top.pair);
        if current == 0 || current != top.count {
            continue;
        }

        let mut tied = vec![top.pair];
        loop {
            match heap.peek() {
                Some(next) if next.count == top.count => {
                    let next = heap.pop().unwrap();
                    let current = index.count_of(&next.pair);
                    if current > 0 && current == next.count {
                        tied.push(next.pair);
                    }
                }
                _ => break,
            }
        }

        let winner = *tied
            .iter()
            .max_by_key(|p| (table.bytes_of(p.0).unwrap(), table.bytes_of(p.1).unwrap()))
            .unwrap();
        for &p in &tied {
            if p != winner {
                let current = index.count_of(&p);
                if current > 0 {
                    heap.push(Candidate { count: current, pair: p });
                }
            }
        }

        if is_special(winner.0) || is_special(winner.1) {
            // Defensive: construction never inserts adjacencies touching a
            // special ID, so this should be unreachable. If it somehow
            // happens, drop the pair and move on without merging anything.
            index.discard(&winner);
            continue;
        }

        let a_bytes = table.bytes_of(winner.0).unwrap().to_vec();
        let b_bytes = table.bytes_of(winner.1).unwrap().to_vec();
        let new_id = table.record_merge(&a_bytes, &b_bytes)?;
        debug!(rank = table.merges().len() - 1, ?a_bytes, ?b_bytes, "merge adopted");

        let touched = index.apply_merge(&mut records, winner, new_id);
        for pair in touched {
            let count = index.count_of(&pair);
            if count > 0 {
                heap.push(Candidate { count, pair });
            }
        }
    }

    info!(
        vocab_size = table.len(),
        merges = table.merges().len(),
        completed,
        "training finished"
    );
    Ok(TrainingOutcome { table, completed })
}

/// Chunk the file, pre-tokenize each range in parallel, and aggregate
/// into one global frequency table.
fn build_pretoken_frequencies(config: &TrainConfig) -> Result<FxHashMap<Vec<u8>, u64>> {
    let mut file = File::open(&config.input_path)?;
    let boundaries = find_chunk_boundaries(&mut file, config.num_processes, &config.specials)?;

    let ranges: Vec<(u64, u64)> = boundaries
        .windows(2)
        .map(|w| (w[0], w[1]))
        .filter(|(s, e)| s < e)
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_processes)
        .build()
        .map_err(|e| TokenizerError::Configuration(format!("failed to build thread pool: {e}")))?;

    // Each worker re-opens its own read-only handle to the input file
    // rather than sharing one ("any mechanism providing read-only
    // access satisfies the contract").
    let locals: Vec<Result<FxHashMap<Vec<u8>, u64>>> = pool.install(|| {
        ranges
            .par_iter()
            .map(|&(start, end)| {
                let mut worker_file = File::open(&config.input_path)?;
                worker_file.seek(SeekFrom::Start(start))?;
                let mut buf = vec![0u8; (end - start) as usize];
                worker_file.read_exact(&mut buf)?;

                let pretokenizer = Pretokenizer::new();
                let segments = pretokenizer.split(&buf, &config.specials);
                let mut local: FxHashMap<Vec<u8>, u64> = FxHashMap::default();
                for segment in segments {
                    *local.entry(segment.bytes).or_insert(0) += 1;
                }
                Ok(local)
            })
            .collect()
    });

    let mut freq: FxHashMap<Vec<u8>, u64> = FxHashMap::default();
    for local in locals {
        for (bytes, count) in local? {
            *freq.entry(bytes).or_insert(0) += count;
        }
    }
    Ok(freq)
}

/// Convenience entry point mirroring the CLI's `train` surface.
pub fn train_from_path(
    input_path: impl AsRef<Path>,
    vocab_size: usize,
    specials: Vec<Vec<u8>>,
    num_processes: usize,
) -> Result<TrainingOutcome> {
    let config = TrainConfig {
        input_path: input_path.as_ref().to_path_buf(),
        vocab_size,
        specials,
        num_processes,
    };
    train(&config, &AtomicBool::new(false))
}
