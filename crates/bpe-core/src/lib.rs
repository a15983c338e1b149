//! bpe-core: a byte-level Byte-Pair Encoding tokenizer engine.
//!
//! Provides the training engine that learns a merge table from a
//! corpus file (chunking, pre-tokenization, the pair-frequency index,
//! and the ranked merge selector) and the encode/decode engine that
//! applies a learned merge table to new text, sharing the same symbol
//! table model between both halves.

pub mod bpe;
pub mod chunk;
pub mod error;
pub mod pair_index;
pub mod pretoken;
pub mod record;
pub mod symbol;
pub mod train;
pub mod vocab;

mod util;

pub use bpe::{decode, BpeEncoder};
pub use error::{Result, TokenizerError};
pub use pretoken::Pretokenizer;
pub use symbol::{Pair, SymbolId, SymbolTable};
pub use train::{train, train_from_path, TrainConfig, TrainingOutcome};
