//! Boundary-aware streaming copy.
//!
//! Bytes are passed through to the writer until the delimiter is seen. A
//! partial delimiter match is held back; when it fails, the bytes that can no
//! longer start a match are flushed and the mismatching byte is re-examined
//! against the shorter prefix (Knuth-Morris-Pratt). Delimiter bytes therefore
//! never reach the output, and a false start directly followed by the real
//! delimiter is still recognised.

use std::io::{self, BufRead, Write};

const STAGE_CAPACITY: usize = 8 * 1024;

/// How a copy ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The full delimiter was consumed.
    Boundary,
    /// The input ended first. Any held-back partial match was flushed.
    Eof,
    /// More than the allowed number of bytes would have been written.
    LimitExceeded,
}

/// `failure[i]` is the length of the longest proper prefix of
/// `pattern[..=i]` that is also a suffix of it.
fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut failure = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = failure[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        failure[i] = k;
    }
    failure
}

/// Copy `reader` into `out` up to (and consuming) `delimiter`.
///
/// Returns the outcome together with the number of bytes written. With a
/// `limit`, the copy stops as soon as the written count would pass it.
///
/// # Errors
///
/// I/O errors from either side.
pub fn copy_until_boundary<R: BufRead, W: Write>(
    reader: &mut R,
    out: &mut W,
    delimiter: &[u8],
    limit: Option<u64>,
) -> io::Result<(CopyOutcome, u64)> {
    if delimiter.is_empty() {
        return Ok((CopyOutcome::Boundary, 0));
    }
    let failure = failure_table(delimiter);
    let mut matched = 0usize;
    let mut written = 0u64;
    let mut stage: Vec<u8> = Vec::with_capacity(STAGE_CAPACITY);

    let flush = |stage: &mut Vec<u8>, out: &mut W, written: &mut u64| -> io::Result<bool> {
        *written += stage.len() as u64;
        if limit.is_some_and(|max| *written > max) {
            stage.clear();
            return Ok(false);
        }
        out.write_all(stage)?;
        stage.clear();
        Ok(true)
    };

    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            stage.extend_from_slice(&delimiter[..matched]);
            if !flush(&mut stage, out, &mut written)? {
                return Ok((CopyOutcome::LimitExceeded, written));
            }
            return Ok((CopyOutcome::Eof, written));
        }

        let mut consumed = 0;
        let mut found = false;
        for &byte in buf {
            consumed += 1;
            loop {
                if byte == delimiter[matched] {
                    matched += 1;
                    break;
                }
                if matched == 0 {
                    stage.push(byte);
                    break;
                }
                let keep = failure[matched - 1];
                stage.extend_from_slice(&delimiter[..matched - keep]);
                matched = keep;
            }
            if matched == delimiter.len() {
                found = true;
                break;
            }
            if stage.len() >= STAGE_CAPACITY {
                break;
            }
        }
        reader.consume(consumed);

        if !flush(&mut stage, out, &mut written)? {
            return Ok((CopyOutcome::LimitExceeded, written));
        }
        if found {
            return Ok((CopyOutcome::Boundary, written));
        }
    }
}
