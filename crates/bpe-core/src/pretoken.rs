//! The pre-tokenizer: splits a byte buffer on special-token
//! boundaries, then tokenizes the Normal segments with a fixed
//! GPT-2-style Unicode-category regex.

use fancy_regex::Regex;

use crate::util::find_subslice;

/// The GPT-2 pre-tokenization pattern, treated as a compatibility
/// contract: apostrophe contractions, runs of letters, runs of digits,
/// runs of other non-space symbols, then whitespace.
pub const GPT2_SPLIT_PATTERN: &str =
    r"'(?:[sdmt]|ll|ve|re)| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Special,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub bytes: Vec<u8>,
}

/// Splits byte buffers into `(kind, bytes)` segments.
pub struct Pretokenizer {
    regex: Regex,
}

impl Default for Pretokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pretokenizer {
    pub fn new() -> Self {
        Self {
            regex: Regex::new(GPT2_SPLIT_PATTERN).expect("GPT2_SPLIT_PATTERN must compile"),
        }
    }

    /// Split `buf` into special/normal segments. `specials` are tried
    /// for the earliest occurrence; ties (same start) are broken by
    /// longest special winning, so prefix-overlapping specials behave.
    pub fn split(&self, buf: &[u8], specials: &[Vec<u8>]) -> Vec<Segment> {
        let mut out = Vec::new();
        let mut pos = 0usize;

        loop {
            if pos >= buf.len() {
                break;
            }

            let next_special = find_earliest_special(&buf[pos..], specials);

            match next_special {
                None => {
                    self.tokenize_normal_into(&buf[pos..], &mut out);
                    break;
                }
                Some((rel_start, len)) => {
                    let start = pos + rel_start;
                    if start > pos {
                        self.tokenize_normal_into(&buf[pos..start], &mut out);
                    }
                    out.push(Segment {
                        kind: SegmentKind::Special,
                        bytes: buf[start..start + len].to_vec(),
                    });
                    pos = start + len;
                }
            }
        }

        out
    }

    /// Tokenize a Normal segment (no special tokens inside it) into
    /// pre-token byte strings, applying the fixed regex over maximal
    /// valid-UTF-8 runs and degrading malformed UTF-8 to single-byte
    /// pre-tokens.
    fn tokenize_normal_into(&self, bytes: &[u8], out: &mut Vec<Segment>) {
        let mut pos = 0usize;
        while pos < bytes.len() {
            match std::str::from_utf8(&bytes[pos..]) {
                Ok(s) => {
                    self.match_str_into(s, out);
                    pos = bytes.len();
                }
                Err(e) => {
                    let valid_len = e.valid_up_to();
                    if valid_len > 0 {
                        let s = std::str::from_utf8(&bytes[pos..pos + valid_len]).unwrap();
                        self.match_str_into(s, out);
                        pos += valid_len;
                    }
                    let bad_len = e.error_len().unwrap_or(bytes.len() - pos - valid_len).max(1);
                    for &b in &bytes[pos..pos + bad_len] {
                        out.push(Segment {
                            kind: SegmentKind::Normal,
                            bytes: vec![b],
                        });
                    }
                    pos += bad_len;
                }
            }
        }
    }

    /// Run the fixed regex over a valid-UTF-8 string, anchoring each
    /// match at the current position. Falls back to a single character
    /// (never a position the regex can't advance past) if the pattern
    /// somehow fails to match — this never triggers for well-formed
    /// text given the pattern's exhaustive whitespace/letter/digit/
    /// symbol coverage, but is kept as a defensive fallback so the
    /// scan always advances.
    fn match_str_into(&self, s: &str, out: &mut Vec<Segment>) {
        let mut pos = 0usize;
        while pos < s.len() {
            let rest = &s[pos..];
            match self.regex.find(rest) {
                Ok(Some(m)) if m.start() == 0 && m.end() > 0 => {
                    out.push(Segment {
                        kind: SegmentKind::Normal,
                        bytes: rest[..m.end()].as_bytes().to_vec(),
                    });
                    pos += m.end();
                }
                _ => {
                    let clen = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                    out.push(Segment {
                        kind: SegmentKind::Normal,
                        bytes: rest[..clen].as_bytes().to_vec(),
                    });
                    pos += clen;
                }
            }
        }
    }
}

fn find_earliest_special(buf: &[u8], specials: &[Vec<u8>]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for s in specials {
        if let Some(idx) = find_subslice(buf, s) {
            best = match best {
                None => Some((idx, s.len())),
                Some((bidx, blen)) => {
                    if idx < bidx || (idx == bidx && s.len() > blen) {
                        Some((idx, s.len()))
                    } else {
                        Some((bidx, blen))
                    }
                }
            };
        }
    }
    best
}
