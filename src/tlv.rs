//! A decoded tree of BER-TLV data objects.

use crate::{ber, codec, Error, Result};
use nom::error::ErrorKind;
use num_enum::FromPrimitive;

/// Bit 6 of a tag's first byte marks a constructed data object.
const CONSTRUCTED: u8 = 0b0010_0000;

/// How deeply templates may nest before the data is rejected.
pub const MAX_DEPTH: usize = 16;

/// A single data object. Tags are uppercase hex, eg. `"77"` or `"9F36"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvNode {
    /// Primitive data object; `value` is the hex-encoded value.
    Leaf { tag: String, value: String },
    /// Constructed data object (template), holding further data objects.
    Template { tag: String, children: Vec<TlvNode> },
}

impl TlvNode {
    pub fn leaf<T: Into<String>, V: Into<String>>(tag: T, value: V) -> Self {
        Self::Leaf {
            tag: tag.into(),
            value: value.into(),
        }
    }

    pub fn template<T: Into<String>>(tag: T, children: Vec<TlvNode>) -> Self {
        Self::Template {
            tag: tag.into(),
            children,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Self::Leaf { tag, .. } | Self::Template { tag, .. } => tag,
        }
    }

    /// Looks the tag up in the table of common EMV tags.
    pub fn known_tag(&self) -> Option<KnownTag> {
        let raw = codec::decode(self.tag()).ok()?;
        let num = match raw.as_slice() {
            [a] => *a as u16,
            [a, b] => u16::from_be_bytes([*a, *b]),
            _ => return None,
        };
        match KnownTag::from(num) {
            KnownTag::Unknown(_) => None,
            tag => Some(tag),
        }
    }
}

/// Parses BER-TLV data into a tree, descending into constructed data objects.
/// Templates nested more than `MAX_DEPTH` deep are an error.
pub fn parse_tree(data: &[u8]) -> Result<Vec<TlvNode>> {
    parse_tree_at(data, 0)
}

fn parse_tree_at(data: &[u8], depth: usize) -> Result<Vec<TlvNode>> {
    if depth > MAX_DEPTH {
        return Err(Error::Parse(ErrorKind::TooLarge));
    }
    ber::iter(data)
        .map(|res| {
            let (tag, value) = res?;
            let tag_hex = codec::to_hex_string(tag);
            if tag.first().map_or(false, |b| b & CONSTRUCTED != 0) {
                Ok(TlvNode::template(tag_hex, parse_tree_at(value, depth + 1)?))
            } else {
                Ok(TlvNode::leaf(tag_hex, codec::to_hex_string(value)))
            }
        })
        .collect()
}

/// Common EMV data elements, from EMV Book 3, Annex A, and the contactless kernel specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum KnownTag {
    ApplicationIdentifier = 0x4F,
    ApplicationLabel = 0x50,
    Track2EquivalentData = 0x57,
    PAN = 0x5A,
    FCITemplate = 0x6F,
    RecordTemplate = 0x70,
    ResponseTemplate2 = 0x77,
    ResponseTemplate1 = 0x80,
    ApplicationInterchangeProfile = 0x82,
    DFName = 0x84,
    ApplicationPriorityIndicator = 0x87,
    DirectorySFI = 0x88,
    ApplicationFileLocator = 0x94,
    FCIProprietaryTemplate = 0xA5,
    CardholderName = 0x5F20,
    ExpirationDate = 0x5F24,
    EffectiveDate = 0x5F25,
    IssuerCountryCode = 0x5F28,
    LanguagePreference = 0x5F2D,
    PANSequenceNumber = 0x5F34,
    IssuerApplicationData = 0x9F10,
    ApplicationPreferredName = 0x9F12,
    ApplicationCryptogram = 0x9F26,
    CryptogramInformationData = 0x9F27,
    ApplicationTransactionCounter = 0x9F36,
    PDOL = 0x9F38,
    Track2Data = 0x9F6B,
    CardTransactionQualifiers = 0x9F6C,
    FormFactorIndicator = 0x9F6E,
    FCIIssuerDiscretionaryData = 0xBF0C,
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl KnownTag {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApplicationIdentifier => "Application Identifier (AID)",
            Self::ApplicationLabel => "Application Label",
            Self::Track2EquivalentData => "Track 2 Equivalent Data",
            Self::PAN => "Application Primary Account Number (PAN)",
            Self::FCITemplate => "File Control Information (FCI) Template",
            Self::RecordTemplate => "READ RECORD Response Message Template",
            Self::ResponseTemplate2 => "Response Message Template Format 2",
            Self::ResponseTemplate1 => "Response Message Template Format 1",
            Self::ApplicationInterchangeProfile => "Application Interchange Profile",
            Self::DFName => "Dedicated File (DF) Name",
            Self::ApplicationPriorityIndicator => "Application Priority Indicator",
            Self::DirectorySFI => "Short File Identifier (SFI)",
            Self::ApplicationFileLocator => "Application File Locator (AFL)",
            Self::FCIProprietaryTemplate => "FCI Proprietary Template",
            Self::CardholderName => "Cardholder Name",
            Self::ExpirationDate => "Application Expiration Date",
            Self::EffectiveDate => "Application Effective Date",
            Self::IssuerCountryCode => "Issuer Country Code",
            Self::LanguagePreference => "Language Preference",
            Self::PANSequenceNumber => "PAN Sequence Number",
            Self::IssuerApplicationData => "Issuer Application Data",
            Self::ApplicationPreferredName => "Application Preferred Name",
            Self::ApplicationCryptogram => "Application Cryptogram",
            Self::CryptogramInformationData => "Cryptogram Information Data",
            Self::ApplicationTransactionCounter => "Application Transaction Counter (ATC)",
            Self::PDOL => "Processing Options Data Object List (PDOL)",
            Self::Track2Data => "Track 2 Data",
            Self::CardTransactionQualifiers => "Card Transaction Qualifiers (CTQ)",
            Self::FormFactorIndicator => "Form Factor Indicator",
            Self::FCIIssuerDiscretionaryData => "FCI Issuer Discretionary Data",
            Self::Unknown(_) => "Unknown",
        }
    }
}
