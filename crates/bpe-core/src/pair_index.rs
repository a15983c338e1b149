//! The pair index: maintains, for every adjacent symbol pair
//! currently alive anywhere in the corpus, its total frequency and the
//! exact set of positions where it occurs.
//!
//! Positions are tracked precisely rather than conservatively — every
//! live adjacency of a pair is a member of its position set, and
//! nothing else is. Staleness after a merge is handled by re-checking `PretokenRecord::live_pair_at` rather than
//! by eagerly repairing every affected set, so a merge only touches
//! the handful of positions actually involved.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::record::{Position, PretokenRecord};
use crate::symbol::{Pair, SymbolId};

#[derive(Debug, Clone, Default)]
pub struct PairIndex {
    count: FxHashMap<Pair, u64>,
    positions: FxHashMap<Pair, FxHashSet<Position>>,
}

impl PairIndex {
    /// Scan every non-inert record's adjacencies and build the index
    /// from scratch.
    pub fn build(records: &[PretokenRecord]) -> Self {
        let mut index = PairIndex::default();
        for (rec_id, rec) in records.iter().enumerate() {
            if rec.is_inert() {
                continue;
            }
            for (slot, a, b) in rec.adjacencies() {
                index.add((a, b), (rec_id as u32, slot), rec.freq);
            }
        }
        index
    }

    pub fn count_of(&self, pair: &Pair) -> u64 {
        self.count.get(pair).copied().unwrap_or(0)
    }

    pub fn positions_of(&self, pair: &Pair) -> Option<&FxHashSet<Position>> {
        self.positions.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&Pair, &u64)> {
        self.count.iter()
    }

    /// Zero out a pair's count and drop its positions without touching
    /// any record. Used only for a pair that must never be chosen as a
    /// merge winner.
    pub fn discard(&mut self, pair: &Pair) {
        self.count.remove(pair);
        self.positions.remove(pair);
    }

    fn add(&mut self, pair: Pair, pos: Position, freq: u64) {
        *self.count.entry(pair).or_insert(0) += freq;
        self.positions.entry(pair).or_default().insert(pos);
    }

    fn remove_position(&mut self, pair: Pair, pos: Position, freq: u64) {
        if let Some(set) = self.positions.get_mut(&pair) {
            set.remove(&pos);
            if set.is_empty() {
                self.positions.remove(&pair);
            }
        }
        if let Some(c) = self.count.get_mut(&pair) {
            *c = c.saturating_sub(freq);
            if *c == 0 {
                self.count.remove(&pair);
            }
        }
    }

    /// Apply the merge `pair -> new_id` everywhere it currently occurs.
    /// `records` is indexed by the record ids used in this index's
    /// positions. Returns the set of neighboring pairs
    /// whose counts changed, so the caller can refresh heap candidates
    /// for them.
    pub fn apply_merge(
        &mut self,
        records: &mut [PretokenRecord],
        pair: Pair,
        new_id: SymbolId,
    ) -> FxHashSet<Pair> {
        let mut touched = FxHashSet::default();
        let positions = self.positions.remove(&pair).unwrap_or_default();
        self.count.remove(&pair);

        for (rec_id, slot) in positions {
            let rec = &mut records[rec_id as usize];
            match rec.live_pair_at(slot) {
                Some((a, b)) if (a, b) == pair => {}
                _ => continue,
            }
            let freq = rec.freq;

            let left_slot = rec.left_neighbor_slot(slot);
            let left_id = left_slot.and_then(|s| rec.symbol_at(s));
            if let (Some(left_slot), Some(left_id)) = (left_slot, left_id) {
                self.remove_position((left_id, pair.0), (rec_id, left_slot), freq);
            }

            let right_slot = rec.right_slot(slot);
            let rr_slot = rec.right_of_right_slot(slot);
            let rr_id = rr_slot.and_then(|s| rec.symbol_at(s));
            if let (Some(right_slot), Some(rr_id)) = (right_slot, rr_id) {
                self.remove_position((pair.1, rr_id), (rec_id, right_slot), freq);
            }

            rec.apply_merge(slot, new_id);

            if let Some(left_slot) = left_slot {
                let left_id = left_id.unwrap();
                self.add((left_id, new_id), (rec_id, left_slot), freq);
                touched.insert((left_id, new_id));
            }
            if let Some(rr_id) = rr_id {
                self.add((new_id, rr_id), (rec_id, slot), freq);
                touched.insert((new_id, rr_id));
            }
        }

        touched
    }
}
