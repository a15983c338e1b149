//! Persistence: read and write the vocabulary and merges files the
//! tokenizer trains to and loads from.
//!
//! Token bytes are rendered as UTF-8 text with `backslashreplace`-style
//! escaping of bytes that are not part of a valid UTF-8 sequence —
//! `\xNN` for each offending byte. This round-trips any valid-UTF-8
//! token exactly, and any other token losslessly too, since every raw
//! byte is either emitted as itself (inside a valid UTF-8 sequence) or
//! as an unambiguous three-character escape. A base64 envelope was
//! considered and rejected: `\xNN` already gives a byte-exact round
//! trip while staying human-readable in the common case.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::error::{Result, TokenizerError};
use crate::symbol::SymbolTable;

/// Render bytes as backslashreplace-escaped text. A literal backslash
/// is itself escaped as `\x5c` — otherwise a valid-UTF-8 token that
/// happens to contain the two characters `\x` followed by hex digits
/// would be misread as an escape sequence by [`unescape`].
pub fn escape(bytes: &[u8]) -> String {
    escape_with(bytes, &[])
}

/// Like [`escape`], additionally escaping ASCII whitespace bytes. Used
/// for `merges.txt`, whose two-tokens-per-line format is whitespace-
/// delimited: without this, a token beginning with a literal space
/// byte (routine under GPT-2-style pre-tokenization, which keeps a
/// leading space attached to words) would make the separator
/// ambiguous on read.
fn escape_merge_token(bytes: &[u8]) -> String {
    escape_with(bytes, &[b' ', b'\t', b'\n', b'\r'])
}

fn escape_with(bytes: &[u8], extra_escaped: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                push_escaped_str(&mut out, s, extra_escaped);
                break;
            }
            Err(e) => {
                let valid_len = e.valid_up_to();
                let s = std::str::from_utf8(&rest[..valid_len]).unwrap();
                push_escaped_str(&mut out, s, extra_escaped);
                let bad_len = e.error_len().unwrap_or(rest.len() - valid_len).max(1);
                for &b in &rest[valid_len..valid_len + bad_len] {
                    out.push_str(&format!("\\x{b:02x}"));
                }
                rest = &rest[valid_len + bad_len..];
            }
        }
    }
    out
}

fn push_escaped_str(out: &mut String, s: &str, extra_escaped: &[u8]) {
    for ch in s.chars() {
        if ch == '\\' {
            out.push_str("\\x5c");
        } else if ch.is_ascii() && extra_escaped.contains(&(ch as u8)) {
            out.push_str(&format!("\\x{:02x}", ch as u8));
        } else {
            out.push(ch);
        }
    }
}

/// Invert [`escape`]: literal text bytes pass through, `\xNN` escapes
/// decode back to the single raw byte they represent.
pub fn unescape(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && bytes.get(i + 1) == Some(&b'x')
            && i + 3 < bytes.len()
            && bytes[i + 2].is_ascii_hexdigit()
            && bytes[i + 3].is_ascii_hexdigit()
        {
            let hi = (bytes[i + 2] as char).to_digit(16).unwrap();
            let lo = (bytes[i + 3] as char).to_digit(16).unwrap();
            out.push((hi * 16 + lo) as u8);
            i += 4;
        } else {
            let clen = text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.extend_from_slice(&bytes[i..i + clen]);
            i += clen;
        }
    }
    out
}

/// Write `vocab.json`: a JSON object mapping each symbol ID's decimal
/// string to its escaped token text.
pub fn write_vocab<W: Write>(table: &SymbolTable, writer: W) -> Result<()> {
    let map: BTreeMap<String, String> = table
        .iter()
        .map(|(id, bytes)| (id.to_string(), escape(bytes)))
        .collect();
    serde_json::to_writer_pretty(writer, &map).map_err(|e| TokenizerError::Configuration(e.to_string()))
}

/// Read `vocab.json` into a dense `id -> bytes` vector. Fails if the
/// IDs are not exactly `0..n` for some `n` (a requirement of
/// [`SymbolTable::from_persisted`]).
pub fn read_vocab<R: Read>(reader: R) -> Result<Vec<Vec<u8>>> {
    let map: BTreeMap<String, String> =
        serde_json::from_reader(reader).map_err(|e| TokenizerError::Configuration(e.to_string()))?;

    let mut entries: Vec<(u32, Vec<u8>)> = Vec::with_capacity(map.len());
    for (key, text) in map {
        let id: u32 = key
            .parse()
            .map_err(|_| TokenizerError::Configuration(format!("vocab key {key:?} is not a decimal integer")))?;
        entries.push((id, unescape(&text)));
    }
    entries.sort_by_key(|(id, _)| *id);

    let mut bytes_by_id = Vec::with_capacity(entries.len());
    for (expected, (id, bytes)) in entries.into_iter().enumerate() {
        if id != expected as u32 {
            return Err(TokenizerError::Configuration(format!(
                "vocab ids must be contiguous from 0; missing or out-of-order id {expected}"
            )));
        }
        bytes_by_id.push(bytes);
    }
    Ok(bytes_by_id)
}

/// Write `merges.txt`: one merge per line, two whitespace-separated
/// escaped tokens, in adoption order. No header line.
pub fn write_merges<W: Write>(table: &SymbolTable, mut writer: W) -> Result<()> {
    for &(a, b) in table.merges() {
        let a_bytes = table.bytes_of(a).unwrap_or(&[]);
        let b_bytes = table.bytes_of(b).unwrap_or(&[]);
        writeln!(writer, "{} {}", escape_merge_token(a_bytes), escape_merge_token(b_bytes))?;
    }
    Ok(())
}

pub fn read_merges<R: Read>(mut reader: R) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    let mut merges = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (a, b) = line.split_once(' ').ok_or_else(|| malformed_merges_line(line))?;
        merges.push((unescape(a), unescape(b)));
    }
    Ok(merges)
}

fn malformed_merges_line(line: &str) -> TokenizerError {
    TokenizerError::Configuration(format!("malformed merges.txt line: {line:?}"))
}

/// Load a symbol table from a vocab/merges file pair.
pub fn load_table(vocab: impl Read, merges: impl Read) -> Result<SymbolTable> {
    let bytes_by_id = read_vocab(vocab)?;
    let merge_bytes = read_merges(merges)?;
    SymbolTable::from_persisted(bytes_by_id, merge_bytes)
}

/// Save a symbol table as a vocab/merges file pair.
pub fn save_table(table: &SymbolTable, vocab: impl Write, merges: impl Write) -> Result<()> {
    write_vocab(table, vocab)?;
    write_merges(table, merges)?;
    Ok(())
}
