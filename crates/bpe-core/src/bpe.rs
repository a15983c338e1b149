//! The encoder and decoder: apply a learned merge table to
//! new text, and invert token IDs back to text.

use rustc_hash::FxHashMap;

use crate::error::{Result, TokenizerError};
use crate::pretoken::{Pretokenizer, SegmentKind};
use crate::symbol::{Pair, SymbolId, SymbolTable};

/// Precomputed `(id_a, id_b) -> rank` lookup from a symbol table's
/// merge list, so encoding never re-scans the list.
#[derive(Debug, Clone, Default)]
struct MergeRanks(FxHashMap<Pair, u32>);

impl MergeRanks {
    fn from_table(table: &SymbolTable) -> Self {
        let ranks = table
            .merges()
            .iter()
            .enumerate()
            .map(|(rank, &pair)| (pair, rank as u32))
            .collect();
        MergeRanks(ranks)
    }

    fn rank_of(&self, pair: Pair) -> Option<u32> {
        self.0.get(&pair).copied()
    }
}

/// Applies a trained symbol table's merges to new input.
pub struct BpeEncoder<'a> {
    table: &'a SymbolTable,
    ranks: MergeRanks,
    specials: Vec<Vec<u8>>,
    pretokenizer: Pretokenizer,
}

impl<'a> BpeEncoder<'a> {
    pub fn new(table: &'a SymbolTable, specials: Vec<Vec<u8>>) -> Self {
        Self {
            table,
            ranks: MergeRanks::from_table(table),
            specials,
            pretokenizer: Pretokenizer::new(),
        }
    }

    /// Encode a text string into symbol IDs.
    pub fn encode(&self, text: &str) -> Vec<SymbolId> {
        let segments = self.pretokenizer.split(text.as_bytes(), &self.specials);
        let mut out = Vec::new();
        for segment in segments {
            self.encode_segment_into(segment.kind, &segment.bytes, &mut out);
        }
        out
    }

    /// Encode independent text fragments, each reduced on its own —
    /// the streaming-fragment variant. Callers needing cross-fragment
    /// merges must concatenate fragments themselves before calling
    /// `encode`.
    pub fn encode_fragments<'s>(&self, fragments: impl Iterator<Item = &'s str>) -> Vec<SymbolId> {
        let mut out = Vec::new();
        for fragment in fragments {
            out.extend(self.encode(fragment));
        }
        out
    }

    /// Encode many independent texts in parallel. Grounded in the same
    /// embarrassingly-parallel batch pattern as chunk pre-tokenization:
    /// each text's reduction touches no shared mutable state.
    pub fn encode_batch(&self, texts: &[&str]) -> Vec<Vec<SymbolId>> {
        use rayon::prelude::*;
        texts.par_iter().map(|t| self.encode(t)).collect()
    }

    fn encode_segment_into(&self, kind: SegmentKind, bytes: &[u8], out: &mut Vec<SymbolId>) {
        if kind == SegmentKind::Special {
            if let Some(id) = self.table.id_of(bytes) {
                out.push(id);
                return;
            }
            // Encoding-time unknown special token: downgrade to
            // Normal and apply the ordinary merge reduction below.
        } else if let Some(id) = self.table.id_of(bytes) {
            out.push(id);
            return;
        }

        out.extend(self.reduce(bytes));
    }

    /// Greedy-rank reduction: repeatedly merge the adjacent pair of
    /// lowest rank, leftmost occurrence breaking ties, until none of
    /// the remaining adjacent pairs appear in the merge table.
    fn reduce(&self, bytes: &[u8]) -> Vec<SymbolId> {
        let mut seq: Vec<SymbolId> = bytes.iter().map(|&b| b as SymbolId).collect();

        loop {
            if seq.len() < 2 {
                break;
            }

            let mut best_rank = u32::MAX;
            let mut best_idx = None;
            for i in 0..seq.len() - 1 {
                if let Some(rank) = self.ranks.rank_of((seq[i], seq[i + 1])) {
                    if rank < best_rank {
                        best_rank = rank;
                        best_idx = Some(i);
                    }
                }
            }

            match best_idx {
                Some(idx) => {
                    let merged_id = self
                        .table
                        .id_of(&self.concat(seq[idx], seq[idx + 1]))
                        .expect("ranked pair must have an interned merge result");
                    seq[idx] = merged_id;
                    seq.remove(idx + 1);
                }
                None => break,
            }
        }

        seq
    }

    fn concat(&self, a: SymbolId, b: SymbolId) -> Vec<u8> {
        let mut merged = self.table.bytes_of(a).unwrap_or(&[]).to_vec();
        merged.extend_from_slice(self.table.bytes_of(b).unwrap_or(&[]));
        merged
    }
}

/// Decode symbol IDs back to text, concatenating token bytes
/// and interpreting the result as UTF-8 with lossy replacement. Total
/// except for unknown IDs, which are a fatal error at the call site
/// (a caller error, not a corpus condition).
pub fn decode(table: &SymbolTable, ids: &[SymbolId]) -> Result<String> {
    let mut bytes = Vec::new();
    for &id in ids {
        match table.bytes_of(id) {
            Some(b) => bytes.extend_from_slice(b),
            None => return Err(TokenizerError::Decode(id)),
        }
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
