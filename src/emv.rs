//! Describing EMV responses, and reading card info out of them.
//!
//! The flow is: raw response bytes -> hex -> described TLV tree -> card info.
//! The describing step sits behind the `Describer` trait, so it can be swapped
//! out for a different TLV parser (or a canned tree in tests).

use crate::tlv::{self, TlvNode};
use crate::track2::{self, CardInfo};
use crate::{codec, Result};
use std::future::Future;
use tap::{TapFallible, TapOptional};
use tracing::{debug, trace_span, warn};

/// Something that turns a hex-encoded EMV response into a TLV tree.
///
/// Resolves exactly once. Anything that couldn't be parsed resolves to None;
/// this must never panic on bad input.
pub trait Describer {
    fn describe(&self, hex: &str) -> impl Future<Output = Option<Vec<TlvNode>>> + Send;
}

/// Describes responses with the built-in BER-TLV parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BerDescriber;

impl BerDescriber {
    pub fn new() -> Self {
        Self
    }
}

impl Describer for BerDescriber {
    fn describe(&self, hex: &str) -> impl Future<Output = Option<Vec<TlvNode>>> + Send {
        std::future::ready(
            describe_hex(hex)
                .tap_err(|err| warn!("couldn't describe EMV response: {}", err))
                .ok(),
        )
    }
}

/// Parses a hex-encoded EMV response into a TLV tree.
pub fn describe_hex(hex: &str) -> Result<Vec<TlvNode>> {
    let span = trace_span!("describe_hex");
    let _enter = span.enter();

    let data = codec::decode(hex)?;
    let tree = tlv::parse_tree(&data)?;
    debug!(objects = tree.len(), "Described EMV response");
    Ok(tree)
}

/// Hex-encodes a raw response and has it described.
pub async fn describe_response<D: Describer>(
    describer: &D,
    response: &[u8],
) -> Option<Vec<TlvNode>> {
    let hex = codec::to_hex_string(response);
    describer
        .describe(&hex)
        .await
        .tap_none(|| debug!(len = response.len(), "EMV response couldn't be described"))
}

/// Reads the card number and expiry date out of a raw EMV response, eg. the
/// response to GET PROCESSING OPTIONS.
pub async fn read_card_info<D: Describer>(describer: &D, response: &[u8]) -> Option<CardInfo> {
    let tree = describe_response(describer, response).await;
    track2::extract_card_info(tree.as_deref())
        .tap_none(|| debug!("No Track 2 Equivalent Data in EMV response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // GET PROCESSING OPTIONS response, format 2, status word included.
    const GPO_RESPONSE: &[u8] = &[
        0x77, 0x1C, 0x82, 0x02, 0x20, 0x00, 0x57, 0x11, 0x41, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
        0x11, 0xD2, 0x51, 0x21, 0x01, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x9F, 0x36, 0x02, 0x00, 0x01,
        0x90, 0x00,
    ];

    /// Hands out a canned tree, and remembers what it was asked to describe.
    struct CannedDescriber {
        tree: Option<Vec<TlvNode>>,
        seen: Mutex<Vec<String>>,
    }

    impl CannedDescriber {
        fn new(tree: Option<Vec<TlvNode>>) -> Self {
            Self {
                tree,
                seen: Mutex::new(vec![]),
            }
        }
    }

    impl Describer for CannedDescriber {
        fn describe(&self, hex: &str) -> impl Future<Output = Option<Vec<TlvNode>>> + Send {
            self.seen.lock().unwrap().push(hex.into());
            std::future::ready(self.tree.clone())
        }
    }

    #[test]
    fn test_describe_hex() {
        let tree = describe_hex("770B5707411111D25121019000").unwrap();
        assert_eq!(
            tree,
            vec![TlvNode::template(
                "77",
                vec![TlvNode::leaf("57", "411111D2512101"), TlvNode::leaf("90", "")]
            )]
        );
    }

    #[test]
    fn test_describe_hex_garbage() {
        assert!(describe_hex("not hex").is_err());
        assert!(describe_hex("7705").is_err());
    }

    #[tokio::test]
    async fn test_ber_describer() {
        let describer = BerDescriber::new();
        assert_eq!(
            Some(vec![TlvNode::leaf("5A", "4111")]),
            describer.describe("5A024111").await
        );
        assert_eq!(Some(vec![]), describer.describe("").await);
        assert_eq!(None, describer.describe("5A0241").await);
        assert_eq!(None, describer.describe("ZZ").await);
    }

    #[tokio::test]
    async fn test_read_card_info() {
        assert_eq!(
            Some(CardInfo {
                card: "4111111111111111".into(),
                exp: "2512".into(),
            }),
            read_card_info(&BerDescriber, GPO_RESPONSE).await
        );
    }

    #[tokio::test]
    async fn test_read_card_info_passes_uppercase_hex() {
        let describer = CannedDescriber::new(Some(vec![TlvNode::template(
            "77",
            vec![TlvNode::leaf("57", "5500000000000004D30011")],
        )]));
        let info = read_card_info(&describer, &[0xAB, 0x01, 0xCD]).await;
        assert_eq!(
            Some(CardInfo {
                card: "5500000000000004".into(),
                exp: "3001".into(),
            }),
            info
        );
        assert_eq!(vec!["AB01CD".to_string()], *describer.seen.lock().unwrap());
    }

    #[tokio::test]
    async fn test_read_card_info_undescribable() {
        let describer = CannedDescriber::new(None);
        assert_eq!(None, read_card_info(&describer, GPO_RESPONSE).await);
    }

    #[tokio::test]
    async fn test_read_card_info_truncated() {
        assert_eq!(None, read_card_info(&BerDescriber, &GPO_RESPONSE[..20]).await);
    }
}
