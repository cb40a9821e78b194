//! Card number and expiry extraction from Track 2 Equivalent Data.
//!
//! Track 2 is a string of BCD digits: `PAN 'D' YYMM service-code discretionary-data`,
//! padded with a trailing 'F' to a whole number of bytes.

use crate::tlv::TlvNode;
use tracing::{debug, trace_span};

/// Tag of the Response Message Template Format 2.
pub const RESPONSE_TEMPLATE_2: &str = "77";
/// Tag of the Track 2 Equivalent Data.
pub const TRACK2_EQUIVALENT_DATA: &str = "57";
/// Field separator between the PAN and the rest of the track.
pub const SEPARATOR: char = 'D';

/// A card number and its expiry date, as found on the card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardInfo {
    /// Primary Account Number.
    pub card: String,
    /// Expiry date, YYMM.
    pub exp: String,
}

impl CardInfo {
    /// Splits a Track 2 string on 'D'; None if there's no separator.
    fn from_track2(value: &str) -> Option<Self> {
        let mut parts = value.split(SEPARATOR);
        let card = parts.next()?;
        let rest = parts.next()?;
        Some(Self {
            card: card.into(),
            exp: rest.chars().take(4).collect(),
        })
    }

    /// The card number with everything but the first 6 and last 4 digits blanked out.
    pub fn masked_card(&self) -> String {
        let len = self.card.chars().count();
        if len <= 10 {
            return "*".repeat(len);
        }
        self.card
            .chars()
            .enumerate()
            .map(|(i, c)| if i < 6 || i >= len - 4 { c } else { '*' })
            .collect()
    }

    /// The expiry date as MM/YY.
    pub fn formatted_exp(&self) -> String {
        format_card_exp(&self.exp)
    }
}

/// Finds the card number and expiry date in a described EMV response.
///
/// Looks for a Track 2 Equivalent Data object (57) inside a Response Message
/// Template Format 2 (77). Templates and Track 2 objects are searched in order,
/// and the first Track 2 value containing a separator wins; one without a
/// separator is skipped in favour of the next.
pub fn extract_card_info(tree: Option<&[TlvNode]>) -> Option<CardInfo> {
    let span = trace_span!("extract_card_info");
    let _enter = span.enter();

    let nodes = tree?;
    for node in nodes {
        let TlvNode::Template { tag, children } = node else {
            continue;
        };
        if tag != RESPONSE_TEMPLATE_2 || children.is_empty() {
            continue;
        }
        for child in children {
            let TlvNode::Leaf { tag, value } = child else {
                continue;
            };
            if tag != TRACK2_EQUIVALENT_DATA || value.is_empty() {
                continue;
            }
            match CardInfo::from_track2(value) {
                Some(info) => {
                    debug!(card = %info.masked_card(), exp = %info.exp, "Found Track 2");
                    return Some(info);
                }
                None => debug!("Track 2 has no separator, skipping"),
            }
        }
    }
    None
}

/// Turns a YYMM expiry date into MM/YY. Anything that isn't 4 characters long
/// is returned as-is.
pub fn format_card_exp(exp: &str) -> String {
    let chars: Vec<char> = exp.chars().collect();
    if chars.len() != 4 {
        return exp.into();
    }
    let (yy, mm) = chars.split_at(2);
    format!(
        "{}/{}",
        mm.iter().collect::<String>(),
        yy.iter().collect::<String>()
    )
}

/// All fields of a Track 2 string. Only used for display; `extract_card_info` is
/// what a charge should go by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track2 {
    pub pan: String,
    /// YYMM.
    pub expiry: String,
    pub service_code: Option<String>,
    pub discretionary_data: String,
}

impl Track2 {
    pub fn parse(value: &str) -> Option<Self> {
        let (pan, rest) = value.split_once(SEPARATOR)?;
        let rest = rest.trim_end_matches('F');
        let chars: Vec<char> = rest.chars().collect();
        let expiry: String = chars.iter().take(4).collect();
        let service_code =
            (chars.len() >= 7).then(|| chars[4..7].iter().collect::<String>());
        let discretionary_data = chars.iter().skip(7).collect();
        Some(Self {
            pan: pan.into(),
            expiry,
            service_code,
            discretionary_data,
        })
    }
}
