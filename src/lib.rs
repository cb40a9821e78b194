//! Card data decoding for the Piggy point-of-sale terminal.
//!
//! Turns a raw EMV response into a card number and expiry date, and decodes the
//! NDEF Text records carried by plain NFC tags.

pub mod ber;
pub mod codec;
pub mod emv;
pub mod ndef;
pub mod tlv;
pub mod track2;

pub use emv::{BerDescriber, Describer};
pub use tlv::TlvNode;
pub use track2::{extract_card_info, format_card_exp, CardInfo};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("byte value out of range: {0}")]
    InvalidByteValue(i64),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("parse error: {0:?}")]
    Parse(nom::error::ErrorKind),

    #[error("incomplete data: {0:?}")]
    Incomplete(nom::Needed),

    #[error("malformed NDEF: {0}")]
    Ndef(&'static str),
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(e: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match e {
            nom::Err::Error(err) | nom::Err::Failure(err) => Self::Parse(err.code),
            nom::Err::Incomplete(needed) => Self::Incomplete(needed),
        }
    }
}
