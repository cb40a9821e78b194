//! NDEF (NFC Data Exchange Format) messages, and NFC Forum Text records.
//!
//! References: NFC Forum NDEF Technical Specification, and the Text Record Type
//! Definition (RTD-Text).

use crate::{Error, Result};
use encoding_rs::{UTF_16BE, UTF_8};
use nom::bytes::complete::take;
use nom::combinator::{cond, map};
use nom::number::complete::{be_u32, be_u8};
use num_enum::FromPrimitive;
use tracing::{debug, trace_span, warn};

pub type IResult<'a, T> = nom::IResult<&'a [u8], T>;

/// Record type of a Text record, under the NFC Forum well-known type namespace.
pub const TEXT_RECORD_TYPE: &[u8] = b"T";

/// Type Name Format: how to interpret a record's type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum TNF {
    Empty = 0x00,
    /// NFC Forum well-known type, eg. "T" or "U".
    WellKnown = 0x01,
    /// RFC 2046 media type.
    Media = 0x02,
    AbsoluteURI = 0x03,
    /// NFC Forum external type.
    External = 0x04,
    Unknown = 0x05,
    Unchanged = 0x06,
    #[num_enum(catch_all)]
    Reserved(u8),
}

/// The first byte of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// MB: First record in the message.
    pub message_begin: bool,
    /// ME: Last record in the message.
    pub message_end: bool,
    /// CF: Record is followed by another chunk of the same payload.
    pub chunked: bool,
    /// SR: Payload length is 1 byte rather than 4.
    pub short_record: bool,
    /// IL: An ID length (and ID) is present.
    pub id_length_present: bool,
    pub tnf: TNF,
}

impl From<u8> for Header {
    fn from(v: u8) -> Self {
        Self {
            message_begin: v & 0b1000_0000 != 0,
            message_end: v & 0b0100_0000 != 0,
            chunked: v & 0b0010_0000 != 0,
            short_record: v & 0b0001_0000 != 0,
            id_length_present: v & 0b0000_1000 != 0,
            tnf: (v & 0b0000_0111).into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub record_type: Vec<u8>,
    pub id: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn is_text(&self) -> bool {
        self.header.tnf == TNF::WellKnown && self.record_type == TEXT_RECORD_TYPE
    }

    /// Decodes the payload as text, if this is a Text record.
    pub fn text(&self) -> Option<Result<Text>> {
        self.is_text().then(|| decode_text_payload(&self.payload))
    }
}

fn parse_record(data: &[u8]) -> IResult<'_, Record> {
    let (data, header): (_, Header) = map(be_u8, Header::from)(data)?;
    let (data, type_len) = be_u8(data)?;
    let (data, payload_len) = if header.short_record {
        map(be_u8, u32::from)(data)?
    } else {
        be_u32(data)?
    };
    let (data, id_len) = cond(header.id_length_present, be_u8)(data)?;
    let (data, record_type) = take(type_len)(data)?;
    let (data, id) = take(id_len.unwrap_or_default())(data)?;
    let (data, payload) = take(payload_len)(data)?;
    Ok((
        data,
        Record {
            header,
            record_type: record_type.to_owned(),
            id: id_len.map(|_| id.to_owned()),
            payload: payload.to_owned(),
        },
    ))
}

/// Parses a raw NDEF message into its records, stopping after the one flagged
/// as the message end.
pub fn parse_message(data: &[u8]) -> Result<Vec<Record>> {
    let span = trace_span!("parse_message");
    let _enter = span.enter();

    let mut records = Vec::new();
    let mut data = data;
    while !data.is_empty() {
        let (rest, record) = parse_record(data)?;
        if record.header.chunked {
            return Err(Error::Ndef("chunked records are not supported"));
        }
        if records.is_empty() && !record.header.message_begin {
            warn!("first NDEF record isn't flagged as the message start");
        }
        data = rest;
        let end = record.header.message_end;
        records.push(record);
        if end {
            break;
        }
    }
    if !data.is_empty() {
        warn!("{} trailing bytes after NDEF message", data.len());
    }
    if records.is_empty() {
        return Err(Error::Ndef("empty message"));
    }
    debug!(records = records.len(), "Parsed NDEF message");
    Ok(records)
}

/// The content of a Text record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    /// IANA language code, eg. "en" or "es-PE".
    pub language: String,
    pub text: String,
}

/// Decodes a Text record's payload.
///
/// The status byte's bit 7 selects UTF-16 over UTF-8, and bits 0-5 hold the
/// length of the language code that follows it. UTF-16 is big-endian unless a
/// byte order mark says otherwise.
pub fn decode_text_payload(payload: &[u8]) -> Result<Text> {
    let (status, rest) = payload
        .split_first()
        .ok_or(Error::Ndef("empty Text payload"))?;
    let lang_len = (status & 0b0011_1111) as usize;
    if lang_len > rest.len() {
        return Err(Error::Ndef("language code overruns Text payload"));
    }
    let (language, text) = rest.split_at(lang_len);

    let encoding = if status & 0b1000_0000 != 0 {
        UTF_16BE
    } else {
        UTF_8
    };
    let (text, used, had_errors) = encoding.decode(text);
    if had_errors {
        warn!("Text record isn't valid {}", used.name());
    }
    Ok(Text {
        language: String::from_utf8_lossy(language).into_owned(),
        text: text.into_owned(),
    })
}

/// Reads the text out of the first record of an NDEF message, if it's a Text record.
pub fn read_text(message: &[u8]) -> Result<Option<Text>> {
    let records = parse_message(message)?;
    records.first().and_then(Record::text).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header() {
        assert_eq!(
            Header {
                message_begin: true,
                message_end: true,
                chunked: false,
                short_record: true,
                id_length_present: false,
                tnf: TNF::WellKnown,
            },
            Header::from(0xD1)
        );
        assert_eq!(TNF::Reserved(0x07), Header::from(0x07).tnf);
    }

    #[test]
    fn test_parse_text_message() {
        let records = parse_message(&[
            0xD1, 0x01, 0x08, 0x54, 0x02, 0x65, 0x6E, 0x48, 0x65, 0x6C, 0x6C, 0x6F,
        ])
        .expect("couldn't parse NDEF message");
        assert_eq!(1, records.len());
        assert!(records[0].is_text());
        assert_eq!(None, records[0].id);
        assert_eq!(
            Some(Ok(Text {
                language: "en".into(),
                text: "Hello".into(),
            })),
            records[0].text()
        );
    }

    #[test]
    fn test_parse_multiple_records() {
        let records = parse_message(&[
            0x91, 0x01, 0x05, 0x54, 0x02, 0x65, 0x6E, 0x48, 0x69, // Text: "Hi"
            0x51, 0x01, 0x04, 0x55, 0x00, 0x61, 0x2E, 0x62, // URI: "a.b"
            0xFE, // Terminator TLV, ignored.
        ])
        .expect("couldn't parse NDEF message");
        assert_eq!(2, records.len());
        assert!(records[0].is_text());
        assert!(!records[1].is_text());
        assert_eq!(b"U", records[1].record_type.as_slice());
        assert_eq!(None, records[1].text());
    }

    #[test]
    fn test_parse_long_record_with_id() {
        let records = parse_message(&[
            0xC1, 0x01, 0x00, 0x00, 0x00, 0x03, 0x54, 0x02, 0x65, 0x6E, // SR unset
            0x59, 0x01, 0x03, 0x01, 0x54, 0x41, 0x02, 0x65, 0x73, // IL set
        ])
        .expect("couldn't parse NDEF message");
        assert_eq!(1, records.len());
        assert_eq!(vec![0x02, 0x65, 0x6E], records[0].payload);

        let records = parse_message(&[0xD9, 0x01, 0x03, 0x01, 0x54, 0x41, 0x02, 0x65, 0x73])
            .expect("couldn't parse NDEF message");
        assert_eq!(Some(vec![0x41]), records[0].id);
        assert_eq!(
            Some(Ok(Text {
                language: "es".into(),
                text: "".into(),
            })),
            records[0].text()
        );
    }

    #[test]
    fn test_parse_bad_messages() {
        assert_eq!(Err(Error::Ndef("empty message")), parse_message(&[]));
        assert_eq!(
            Err(Error::Ndef("chunked records are not supported")),
            parse_message(&[0xB1, 0x01, 0x01, 0x54, 0x00])
        );
        assert!(parse_message(&[0xD1, 0x01, 0x08, 0x54, 0x02]).is_err());
    }

    #[test]
    fn test_decode_text_utf16() {
        // Big-endian, with and without a BOM.
        assert_eq!(
            Ok(Text {
                language: "en".into(),
                text: "Hi".into(),
            }),
            decode_text_payload(&[0x82, 0x65, 0x6E, 0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69])
        );
        assert_eq!(
            "Hi",
            decode_text_payload(&[0x82, 0x65, 0x6E, 0x00, 0x48, 0x00, 0x69])
                .unwrap()
                .text
        );
        // Little-endian BOM.
        assert_eq!(
            "Hi",
            decode_text_payload(&[0x82, 0x65, 0x6E, 0xFF, 0xFE, 0x48, 0x00, 0x69, 0x00])
                .unwrap()
                .text
        );
    }

    #[test]
    fn test_decode_text_utf8() {
        assert_eq!(
            Ok(Text {
                language: "es".into(),
                text: "Señor".into(),
            }),
            decode_text_payload(&[0x02, 0x65, 0x73, 0x53, 0x65, 0xC3, 0xB1, 0x6F, 0x72])
        );
    }

    #[test]
    fn test_decode_text_bad_payloads() {
        assert_eq!(
            Err(Error::Ndef("empty Text payload")),
            decode_text_payload(&[])
        );
        assert_eq!(
            Err(Error::Ndef("language code overruns Text payload")),
            decode_text_payload(&[0x05, 0x65, 0x6E])
        );
    }

    #[test]
    fn test_read_text() {
        assert_eq!(
            Ok(Some(Text {
                language: "en".into(),
                text: "Hello".into(),
            })),
            read_text(&[0xD1, 0x01, 0x08, 0x54, 0x02, 0x65, 0x6E, 0x48, 0x65, 0x6C, 0x6C, 0x6F])
        );
        assert_eq!(
            Ok(None),
            read_text(&[0xD1, 0x01, 0x04, 0x55, 0x00, 0x61, 0x2E, 0x62])
        );
        assert_eq!(Ok(None), read_text(&[0xD0, 0x00, 0x00]));
    }
}
