use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::lsa::LinkStatePacket;

// id on Lsa/Resync is the forwarder, not necessarily the LSA's
// originator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Hello { id: u32, cost: u32 },
    Lsa { id: u32, lsas: Vec<LinkStatePacket> },
    Resync { id: u32, lsas: Vec<LinkStatePacket> },
}

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    serde_json::to_vec(frame).context("failed to encode control frame")
}

pub fn decode_frame(data: &[u8]) -> Result<Frame> {
    serde_json::from_slice(data).context("failed to decode control frame")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::lsa::Link;

    #[test]
    fn hello_roundtrip() {
        let frame = Frame::Hello { id: 8080, cost: 1 };
        let encoded = encode_frame(&frame).expect("encode should succeed");
        let decoded = decode_frame(&encoded).expect("decode should succeed");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn lsa_roundtrip_preserves_sequence_number() {
        let lsa = LinkStatePacket::new(8080, 7, vec![Link::new(8081, 1)], 60);
        let frame = Frame::Lsa {
            id: 8080,
            lsas: vec![lsa],
        };
        let encoded = encode_frame(&frame).expect("encode should succeed");
        let decoded = decode_frame(&encoded).expect("decode should succeed");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let err = decode_frame(b"not json").unwrap_err();
        assert!(err.to_string().contains("failed to decode"));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let err = decode_frame(br#"{"type":"goodbye"}"#).unwrap_err();
        assert!(err.to_string().contains("failed to decode"));
    }
}
