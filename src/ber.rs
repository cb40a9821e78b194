//! BER-TLV parsing, as used by ISO 7816 and EMV.
//!
//! This only splits data into tag-value pairs; building a tree out of
//! constructed data objects is done by `tlv::parse_tree`.

use crate::Result;
use nom::bytes::complete::take;
use nom::error::ErrorKind;
use nom::multi::length_data;
use nom::number::complete::be_u8;
use nom::sequence::pair;

pub type IResult<'a, T> = nom::IResult<&'a [u8], T>;

fn fail<T>(input: &[u8], kind: ErrorKind) -> IResult<'_, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Parses a raw TLV tag as a byte sequence. BER-TLV tags can be any length, if the lower 5 bits of the first
/// byte are all set, the next byte is read, and subsequent bytes may set their highest bit to keep going.
pub fn parse_raw_tag(input: &[u8]) -> IResult<'_, &[u8]> {
    if input.is_empty() {
        return fail(input, ErrorKind::Eof);
    }
    for (i, v) in input.iter().enumerate() {
        let more_mask = if i == 0 { 0x1F } else { 0x80 };
        if v & more_mask != more_mask {
            let (tag, rest) = input.split_at(i + 1);
            return Ok((rest, tag));
        }
    }
    Err(nom::Err::Incomplete(nom::Needed::Unknown))
}

/// Parses a TLV value's length. If bit 8 of the first byte is 0, bits 1-7 encode the length of the data.
/// If bit 8 is set, bits 1-7 encode the number of subsequent bytes representing the length of the data.
pub fn parse_len(input: &[u8]) -> IResult<'_, usize> {
    let (input, first) = be_u8(input)?;
    if first < 0x80 {
        return Ok((input, first as usize));
    }
    // Nobody sends values over 4GB to a smartcard.
    if first & 0x7F > 4 {
        return fail(input, ErrorKind::TooLarge);
    }
    let (input, raw) = take(first & 0x7F)(input)?;
    Ok((input, raw.iter().fold(0, |acc, b| acc << 8 | *b as usize)))
}

/// Parses a raw tag-value pair.
pub fn parse_next(input: &[u8]) -> IResult<'_, (&[u8], &[u8])> {
    pair(parse_raw_tag, length_data(parse_len))(input)
}

/// EMV allows '00' bytes before, between and after data objects, eg. where an
/// object was erased.
fn skip_padding(input: &[u8]) -> &[u8] {
    let n = input.iter().take_while(|b| **b == 0x00).count();
    &input[n..]
}

pub struct Iter<'a> {
    pub input: &'a [u8],
}

/// Iterates over the top-level tag-value pairs in `input`.
pub fn iter(input: &[u8]) -> Iter<'_> {
    Iter { input }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        self.input = skip_padding(self.input);
        if self.input.is_empty() {
            return None;
        }
        match parse_next(self.input) {
            Ok((rest, tv)) => {
                self.input = rest;
                Some(Ok(tv))
            }
            Err(err) => {
                // There's no way to resynchronise after a bad length.
                self.input = &[];
                Some(Err(err.into()))
            }
        }
    }
}
