//! Conversions between raw bytes and their hex string form.
//!
//! `to_byte_array` never fails: a chunk that doesn't start with a hex digit
//! decodes to `None`. Use `decode` if garbage input should be an error instead.

use crate::{Error, Result};
use tracing::trace;

/// Splits a hex string into 2-character chunks and parses each one.
///
/// Chunking restarts after a line terminator, and a trailing odd character is
/// parsed on its own. A chunk's value is its leading hex digits, after any
/// leading whitespace, a `+` sign and a `0x` prefix. So `"1Z"` is `Some(0x01)`,
/// `"+F"` is `Some(0x0F)`, and `"ZZ"` and `"0x"` are `None`. Negative chunks
/// other than `"-0"` are `None` too, since they aren't bytes.
pub fn to_byte_array(text: &str) -> Vec<Option<u8>> {
    text.split(is_line_terminator)
        .flat_map(|line| {
            let chars: Vec<char> = line.chars().collect();
            chars.chunks(2).map(parse_chunk).collect::<Vec<_>>()
        })
        .collect()
}

/// Encodes bytes as an uppercase hex string, two characters per byte.
pub fn to_hex_string(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Like `to_hex_string`, for values that aren't known to fit in a byte.
pub fn to_hex_string_checked(values: &[i64]) -> Result<String> {
    bytes_from_values(values.iter().copied()).map(|bytes| to_hex_string(&bytes))
}

/// Narrows a sequence of integers to bytes, failing on the first one outside 0-255.
pub fn bytes_from_values<I: IntoIterator<Item = i64>>(values: I) -> Result<Vec<u8>> {
    values
        .into_iter()
        .map(|v| u8::try_from(v).map_err(|_| Error::InvalidByteValue(v)))
        .collect()
}

/// Strictly decodes a hex string of either case. Odd lengths and non-hex
/// characters are errors.
pub fn decode(text: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(text.trim())?;
    trace!(len = bytes.len(), "decoded hex");
    Ok(bytes)
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn parse_chunk(chunk: &[char]) -> Option<u8> {
    let text: String = chunk.iter().collect();
    let text = text.trim_start();
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let digits: Vec<u8> = text
        .chars()
        .map_while(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    if digits.is_empty() {
        return None;
    }
    let value = digits.iter().fold(0, |acc, d| acc << 4 | d);
    (!negative || value == 0).then_some(value)
}
