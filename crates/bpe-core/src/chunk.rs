//! The chunker: partitions an input file into byte ranges aligned
//! to special-token occurrences, so each range can be pre-tokenized
//! independently.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use crate::error::Result;
use crate::util::find_subslice;

/// Bytes read ahead at a time while hunting for the next special-token
/// occurrence past a uniform chunk-boundary guess.
const MINI_CHUNK_SIZE: usize = 4096;

/// Compute chunk boundaries `0 = b_0 < b_1 < ... < b_M = file_size`
/// with `M <= desired_num_chunks`, such that each `[b_i, b_{i+1})`
/// either contains no special-token boundary strictly in its interior,
/// or begins on one.
///
/// `file` must support seeking; its cursor position on return is
/// unspecified.
pub fn find_chunk_boundaries(
    file: &mut File,
    desired_num_chunks: usize,
    special_tokens: &[Vec<u8>],
) -> Result<Vec<u64>> {
    let file_size = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;

    if desired_num_chunks == 0 {
        return Ok(vec![0, file_size]);
    }

    let chunk_size = file_size / desired_num_chunks as u64;
    let mut boundaries: Vec<u64> = (0..=desired_num_chunks as u64)
        .map(|i| i * chunk_size)
        .collect();
    *boundaries.last_mut().unwrap() = file_size;

    if special_tokens.is_empty() {
        boundaries.sort_unstable();
        boundaries.dedup();
        return Ok(boundaries);
    }

    let max_tok_len = special_tokens.iter().map(Vec::len).max().unwrap_or(0);

    for bi in 1..boundaries.len() - 1 {
        let initial_position = boundaries[bi];
        file.seek(SeekFrom::Start(initial_position))?;

        let mut tail: Vec<u8> = Vec::new();
        let mut absolute_pos = initial_position;
        let mut buf = vec![0u8; MINI_CHUNK_SIZE];

        loop {
            let n = read_up_to(file, &mut buf)?;
            if n == 0 {
                boundaries[bi] = file_size;
                break;
            }

            let mini_chunk = &buf[..n];
            let window_start = absolute_pos - tail.len() as u64;
            let mut window = tail.clone();
            window.extend_from_slice(mini_chunk);

            let mut best_abs: Option<u64> = None;
            for tok in special_tokens {
                if let Some(idx) = find_subslice(&window, tok) {
                    let abs_idx = window_start + idx as u64;
                    best_abs = Some(match best_abs {
                        Some(b) => b.min(abs_idx),
                        None => abs_idx,
                    });
                }
            }

            if let Some(abs) = best_abs {
                boundaries[bi] = abs;
                break;
            }

            absolute_pos += mini_chunk.len() as u64;
            tail = if max_tok_len > 1 {
                let keep = max_tok_len - 1;
                let start = window.len().saturating_sub(keep);
                window[start..].to_vec()
            } else {
                Vec::new()
            };
        }
    }

    boundaries.sort_unstable();
    boundaries.dedup();
    Ok(boundaries)
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &[u8]) -> (tempfile::NamedTempFile, File) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(contents).unwrap();
        tmp.flush().unwrap();
        let file = tmp.reopen().unwrap();
        (tmp, file)
    }

    #[test]
    fn empty_specials_returns_uniform_boundaries() {
        let (_tmp, mut file) = write_temp(b"0123456789");
        let boundaries = find_chunk_boundaries(&mut file, 2, &[]).unwrap();
        assert_eq!(boundaries.first(), Some(&0));
        assert_eq!(boundaries.last(), Some(&10));
    }

    #[test]
    fn boundaries_align_to_special_token_occurrences() {
        let text = b"aaaaaaaaaa<|s|>bbbbbbbbbb<|s|>cccccccccc";
        let (_tmp, mut file) = write_temp(text);
        let specials = vec![b"<|s|>".to_vec()];
        let boundaries = find_chunk_boundaries(&mut file, 3, &specials).unwrap();

        assert_eq!(*boundaries.first().unwrap(), 0);
        assert_eq!(*boundaries.last().unwrap(), text.len() as u64);
        for w in boundaries.windows(2) {
            let (start, end) = (w[0] as usize, w[1] as usize);
            if start == 0 && end == text.len() {
                continue;
            }
            // Every interior boundary begins exactly on a special-token occurrence.
            if start != 0 {
                assert_eq!(&text[start..start + specials[0].len()], b"<|s|>".as_slice());
            }
        }
    }

    #[test]
    fn no_special_token_before_eof_collapses_to_file_size() {
        let text = b"no specials here at all, just plain text repeated ".repeat(10);
        let (_tmp, mut file) = write_temp(&text);
        let specials = vec![b"<|missing|>".to_vec()];
        let boundaries = find_chunk_boundaries(&mut file, 4, &specials).unwrap();
        assert_eq!(*boundaries.last().unwrap(), text.len() as u64);
    }
}
