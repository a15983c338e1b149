//! Pre-token records: one per unique pre-token byte string, holding
//! its frequency and a mutable symbol sequence.
//!
//! The symbol sequence is a doubly linked list embedded in a `Vec`
//! (stable slot indices, `prev`/`next` pointers into the same vec)
//! rather than a plain array with shifting indices. A `Position` is
//! `(record_id, slot_index)`; because slots never
//! move, every position recorded before a merge remains meaningful
//! (alive-or-not) after it — merges elsewhere in the same record never
//! invalidate it by shifting, only by marking its slot dead. This
//! avoids the off-by-one hazard that shifting indices would introduce.

use crate::symbol::SymbolId;

const NONE: i32 = -1;

#[derive(Debug, Clone, Copy)]
struct Node {
    id: SymbolId,
    alive: bool,
    prev: i32,
    next: i32,
}

/// `(pretoken record id, slot index of the left symbol)`.
pub type Position = (u32, u32);

#[derive(Debug, Clone)]
pub struct PretokenRecord {
    pub freq: u64,
    /// `Some(id)` if this pre-token's full bytes equal a declared
    /// special token; such records are inert and never scanned for
    /// merges.
    pub inert_symbol: Option<SymbolId>,
    nodes: Vec<Node>,
    head: i32,
    alive_count: u32,
}

impl PretokenRecord {
    /// A record whose symbols are the per-byte singleton IDs of `bytes`.
    pub fn from_bytes(bytes: &[u8], freq: u64) -> Self {
        let n = bytes.len();
        let nodes: Vec<Node> = (0..n)
            .map(|i| Node {
                id: bytes[i] as SymbolId,
                alive: true,
                prev: if i == 0 { NONE } else { i as i32 - 1 },
                next: if i + 1 == n { NONE } else { i as i32 + 1 },
            })
            .collect();
        PretokenRecord {
            freq,
            inert_symbol: None,
            nodes,
            head: if n == 0 { NONE } else { 0 },
            alive_count: n as u32,
        }
    }

    /// A record that is a single inert special-token symbol.
    pub fn inert(symbol: SymbolId, freq: u64) -> Self {
        PretokenRecord {
            freq,
            inert_symbol: Some(symbol),
            nodes: vec![Node {
                id: symbol,
                alive: true,
                prev: NONE,
                next: NONE,
            }],
            head: 0,
            alive_count: 1,
        }
    }

    pub fn is_inert(&self) -> bool {
        self.inert_symbol.is_some()
    }

    pub fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Live symbol IDs in left-to-right order.
    pub fn symbols(&self) -> Vec<SymbolId> {
        let mut out = Vec::with_capacity(self.alive_count as usize);
        let mut cur = self.head;
        while cur != NONE {
            let node = self.nodes[cur as usize];
            debug_assert!(node.alive);
            out.push(node.id);
            cur = node.next;
        }
        out
    }

    /// Adjacent `(left_slot, left_id, right_id)` triples, in order.
    pub fn adjacencies(&self) -> Vec<(u32, SymbolId, SymbolId)> {
        let mut out = Vec::new();
        let mut cur = self.head;
        while cur != NONE {
            let node = self.nodes[cur as usize];
            if node.next != NONE {
                let rnode = self.nodes[node.next as usize];
                out.push((cur as u32, node.id, rnode.id));
            }
            cur = node.next;
        }
        out
    }

    /// Returns `(left_id, right_id)` at `slot` if both the slot and
    /// its right neighbor are alive, i.e. whether this position is
    /// still a live adjacency (the staleness filter used when applying a merge).
    pub fn live_pair_at(&self, slot: u32) -> Option<(SymbolId, SymbolId)> {
        let node = self.nodes.get(slot as usize)?;
        if !node.alive || node.next == NONE {
            return None;
        }
        let rnode = self.nodes[node.next as usize];
        if !rnode.alive {
            return None;
        }
        Some((node.id, rnode.id))
    }

    pub fn left_neighbor_slot(&self, slot: u32) -> Option<u32> {
        let node = self.nodes.get(slot as usize)?;
        if node.prev == NONE {
            None
        } else {
            Some(node.prev as u32)
        }
    }

    /// Slot index of the right element of the live pair at `slot`
    /// (the slot that dies when this pair is merged).
    pub fn right_slot(&self, slot: u32) -> Option<u32> {
        let node = self.nodes.get(slot as usize)?;
        if node.next == NONE {
            None
        } else {
            Some(node.next as u32)
        }
    }

    pub fn right_of_right_slot(&self, slot: u32) -> Option<u32> {
        let node = self.nodes.get(slot as usize)?;
        if node.next == NONE {
            return None;
        }
        let rnode = self.nodes[node.next as usize];
        if rnode.next == NONE {
            None
        } else {
            Some(rnode.next as u32)
        }
    }

    pub fn symbol_at(&self, slot: u32) -> Option<SymbolId> {
        self.nodes.get(slot as usize).and_then(|n| n.alive.then_some(n.id))
    }

    /// Merge the pair at `slot` (must be a live adjacency) into
    /// `new_id`. Returns the (left, right-of-right) neighbor slots
    /// that need their pair counts/positions touched, if any.
    pub fn apply_merge(&mut self, slot: u32, new_id: SymbolId) {
        let right = self.nodes[slot as usize].next;
        debug_assert_ne!(right, NONE);
        let right_next = self.nodes[right as usize].next;

        self.nodes[slot as usize].id = new_id;
        self.nodes[slot as usize].next = right_next;
        if right_next != NONE {
            self.nodes[right_next as usize].prev = slot as i32;
        }
        self.nodes[right as usize].alive = false;
        self.alive_count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_builds_singleton_chain() {
        let rec = PretokenRecord::from_bytes(b"abc", 3);
        assert_eq!(rec.symbols(), vec![b'a' as u32, b'b' as u32, b'c' as u32]);
        assert_eq!(rec.alive_count(), 3);
    }

    #[test]
    fn adjacencies_cover_every_pair() {
        let rec = PretokenRecord::from_bytes(b"abc", 1);
        let adj = rec.adjacencies();
        assert_eq!(adj.len(), 2);
        assert_eq!((adj[0].1, adj[0].2), (b'a' as u32, b'b' as u32));
        assert_eq!((adj[1].1, adj[1].2), (b'b' as u32, b'c' as u32));
    }

    #[test]
    fn merge_collapses_pair_and_relinks() {
        let mut rec = PretokenRecord::from_bytes(b"abc", 1);
        // merge slot 0 ('a','b') into new id 300
        rec.apply_merge(0, 300);
        assert_eq!(rec.symbols(), vec![300, b'c' as u32]);
        assert_eq!(rec.alive_count(), 2);
    }

    #[test]
    fn positions_survive_unrelated_merges_in_same_record() {
        // "aaaa": merging slot 0 must not invalidate slot 2's liveness check semantics.
        let mut rec = PretokenRecord::from_bytes(b"aaaa", 1);
        let before = rec.live_pair_at(2);
        rec.apply_merge(0, 300);
        // slot 2 is still alive and still holds the original pair content,
        // independent of the merge that happened at slot 0.
        assert_eq!(rec.live_pair_at(2), before);
    }

    #[test]
    fn stale_slot_after_consumption_reports_none() {
        let mut rec = PretokenRecord::from_bytes(b"aaa", 1);
        rec.apply_merge(0, 300); // consumes slot 1 (the second 'a')
        assert!(rec.live_pair_at(1).is_none());
    }
}
