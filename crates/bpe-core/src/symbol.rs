//! The symbol table: a bijection between symbol IDs and byte
//! strings, plus the ordered merge list that grows as training
//! proceeds.

use rustc_hash::FxHashMap;

use crate::error::{Result, TokenizerError};

pub type SymbolId = u32;
pub type Pair = (SymbolId, SymbolId);

/// Bijection between symbol IDs and byte strings.
///
/// IDs 0..256 are always the 256 singleton bytes. Special tokens and
/// merged tokens are appended afterwards and, once inserted, never
/// change ID.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    bytes_by_id: Vec<Vec<u8>>,
    id_by_bytes: FxHashMap<Vec<u8>, SymbolId>,
    /// Merges in adoption order; rank of a merge is its index here.
    merges: Vec<Pair>,
}

impl SymbolTable {
    /// Build a fresh table with only the 256 base bytes interned.
    pub fn new() -> Self {
        let mut table = SymbolTable {
            bytes_by_id: Vec::with_capacity(256),
            id_by_bytes: FxHashMap::default(),
            merges: Vec::new(),
        };
        table.intern_base();
        table
    }

    fn intern_base(&mut self) {
        for b in 0u32..256 {
            let bytes = vec![b as u8];
            self.id_by_bytes.insert(bytes.clone(), b);
            self.bytes_by_id.push(bytes);
        }
    }

    /// Assign the next ID to a special token's bytes.
    ///
    /// Fails if the bytes are already interned (as a base byte, an
    /// earlier special, or a merge — the latter cannot happen before
    /// any merges have been recorded, but the check is defensive).
    pub fn intern_special(&mut self, bytes: &[u8]) -> Result<SymbolId> {
        if self.id_by_bytes.contains_key(bytes) {
            return Err(TokenizerError::Configuration(format!(
                "special token {:?} already interned",
                String::from_utf8_lossy(bytes)
            )));
        }
        let id = self.bytes_by_id.len() as SymbolId;
        self.bytes_by_id.push(bytes.to_vec());
        self.id_by_bytes.insert(bytes.to_vec(), id);
        Ok(id)
    }

    /// Record a merge `(a, b) -> a ++ b`, assigning the next ID.
    ///
    /// Both `a_bytes` and `b_bytes` must already be interned.
    pub fn record_merge(&mut self, a_bytes: &[u8], b_bytes: &[u8]) -> Result<SymbolId> {
        let id_a = self.id_of(a_bytes).ok_or_else(|| {
            TokenizerError::Consistency(format!(
                "merge operand {:?} not interned",
                String::from_utf8_lossy(a_bytes)
            ))
        })?;
        let id_b = self.id_of(b_bytes).ok_or_else(|| {
            TokenizerError::Consistency(format!(
                "merge operand {:?} not interned",
                String::from_utf8_lossy(b_bytes)
            ))
        })?;

        let mut merged = a_bytes.to_vec();
        merged.extend_from_slice(b_bytes);

        let new_id = self.bytes_by_id.len() as SymbolId;
        self.bytes_by_id.push(merged.clone());
        self.id_by_bytes.insert(merged, new_id);
        self.merges.push((id_a, id_b));
        Ok(new_id)
    }

    /// Rebuild a table from a persisted `id -> bytes` vocabulary and an
    /// ordered merges list. Validates the same invariants training
    /// maintains incrementally: base-byte identity (Invariant 2) and
    /// merge well-foundedness (Invariant 3).
    pub fn from_persisted(bytes_by_id: Vec<Vec<u8>>, merge_bytes: Vec<(Vec<u8>, Vec<u8>)>) -> Result<Self> {
        for b in 0u32..256 {
            if bytes_by_id.get(b as usize).map(Vec::as_slice) != Some(&[b as u8][..]) {
                return Err(TokenizerError::Consistency(format!(
                    "vocabulary entry {b} must be the singleton byte {b}"
                )));
            }
        }

        let mut id_by_bytes = FxHashMap::default();
        for (id, bytes) in bytes_by_id.iter().enumerate() {
            id_by_bytes.insert(bytes.clone(), id as SymbolId);
        }

        let mut merges = Vec::with_capacity(merge_bytes.len());
        for (a_bytes, b_bytes) in &merge_bytes {
            let id_a = id_by_bytes.get(a_bytes).copied().ok_or_else(|| {
                TokenizerError::Consistency(format!(
                    "merge operand {:?} is not in the vocabulary",
                    String::from_utf8_lossy(a_bytes)
                ))
            })?;
            let id_b = id_by_bytes.get(b_bytes).copied().ok_or_else(|| {
                TokenizerError::Consistency(format!(
                    "merge operand {:?} is not in the vocabulary",
                    String::from_utf8_lossy(b_bytes)
                ))
            })?;
            let mut merged = a_bytes.clone();
            merged.extend_from_slice(b_bytes);
            let id_m = id_by_bytes.get(&merged).copied().ok_or_else(|| {
                TokenizerError::Consistency(format!(
                    "merge result {:?} is not in the vocabulary",
                    String::from_utf8_lossy(&merged)
                ))
            })?;
            if id_m <= id_a || id_m <= id_b {
                return Err(TokenizerError::Consistency(format!(
                    "merge result id {id_m} must exceed both operand ids {id_a}, {id_b}"
                )));
            }
            merges.push((id_a, id_b));
        }

        Ok(SymbolTable { bytes_by_id, id_by_bytes, merges })
    }

    pub fn id_of(&self, bytes: &[u8]) -> Option<SymbolId> {
        self.id_by_bytes.get(bytes).copied()
    }

    pub fn bytes_of(&self, id: SymbolId) -> Option<&[u8]> {
        self.bytes_by_id.get(id as usize).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.bytes_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_by_id.is_empty()
    }

    /// Merges in adoption order; rank of a merge is its index.
    pub fn merges(&self) -> &[Pair] {
        &self.merges
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &[u8])> {
        self.bytes_by_id
            .iter()
            .enumerate()
            .map(|(id, bytes)| (id as SymbolId, bytes.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_bytes_are_identity_mapped() {
        let table = SymbolTable::new();
        assert_eq!(table.len(), 256);
        for b in 0u32..256 {
            assert_eq!(table.bytes_of(b), Some(vec![b as u8]).as_deref());
            assert_eq!(table.id_of(&[b as u8]), Some(b));
        }
    }

    #[test]
    fn special_tokens_get_sequential_ids_after_bytes() {
        let mut table = SymbolTable::new();
        let id = table.intern_special(b"<|endoftext|>").unwrap();
        assert_eq!(id, 256);
        assert_eq!(table.id_of(b"<|endoftext|>"), Some(256));
    }

    #[test]
    fn duplicate_special_token_is_an_error() {
        let mut table = SymbolTable::new();
        table.intern_special(b"<x>").unwrap();
        assert!(table.intern_special(b"<x>").is_err());
    }

    #[test]
    fn merges_concatenate_bytes_and_are_well_founded() {
        let mut table = SymbolTable::new();
        let id = table.record_merge(b"a", b"b").unwrap();
        assert_eq!(id, 256);
        assert_eq!(table.bytes_of(id), Some(b"ab".as_slice()));
        assert_eq!(table.merges(), &[(b'a' as SymbolId, b'b' as SymbolId)]);

        // Recorded rank 0 refers to symbols interned before rank 0.
        let (a, b) = table.merges()[0];
        assert!(a < id);
        assert!(b < id);
    }

    #[test]
    fn merge_of_unknown_operand_is_consistency_error() {
        let mut table = SymbolTable::new();
        let err = table.record_merge(b"ab", b"c").unwrap_err();
        assert!(matches!(err, TokenizerError::Consistency(_)));
    }

    #[test]
    fn from_persisted_reconstructs_a_trained_table() {
        let mut table = SymbolTable::new();
        table.intern_special(b"<|endoftext|>").unwrap();
        table.record_merge(b"t", b"h").unwrap();
        table.record_merge(b"th", b"e").unwrap();

        let bytes_by_id: Vec<Vec<u8>> = table.iter().map(|(_, b)| b.to_vec()).collect();
        let merge_bytes: Vec<(Vec<u8>, Vec<u8>)> = table
            .merges()
            .iter()
            .map(|&(a, b)| (table.bytes_of(a).unwrap().to_vec(), table.bytes_of(b).unwrap().to_vec()))
            .collect();

        let reloaded = SymbolTable::from_persisted(bytes_by_id, merge_bytes).unwrap();
        assert_eq!(reloaded.len(), table.len());
        assert_eq!(reloaded.id_of(b"the"), table.id_of(b"the"));
        assert_eq!(reloaded.id_of(b"<|endoftext|>"), table.id_of(b"<|endoftext|>"));
    }

    #[test]
    fn from_persisted_rejects_a_tampered_base_byte() {
        let mut bytes_by_id: Vec<Vec<u8>> = (0u32..256).map(|b| vec![b as u8]).collect();
        bytes_by_id[65] = b"not-a-byte".to_vec();
        let err = SymbolTable::from_persisted(bytes_by_id, vec![]).unwrap_err();
        assert!(matches!(err, TokenizerError::Consistency(_)));
    }

    #[test]
    fn id_of_bytes_of_roundtrip_after_merges() {
        let mut table = SymbolTable::new();
        table.record_merge(b"t", b"h").unwrap();
        table.record_merge(b"th", b"e").unwrap();
        for (id, bytes) in table.iter() {
            assert_eq!(table.id_of(bytes), Some(id));
        }
    }
}
