//! Messenger contract event types and parsing
//!
//! The cross-domain messenger emits:
//! - `SentMessage(uint256 indexed destination, address indexed target, uint256 indexed messageNonce, address sender, bytes message)`
//! - `RelayedMessage(uint256 indexed source, uint256 indexed messageNonce, bytes32 indexed messageHash)`
//! - `FailedRelayedMessage(uint256 indexed source, uint256 indexed messageNonce, bytes32 indexed messageHash)`

use crate::error::{MonitorError, MonitorResult};
use crate::message::{MessageHash, OutboundMessage};

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Log, H256, U256};
use serde::{Deserialize, Serialize};

/// Event topic signatures (keccak256 of event signature)
pub mod topics {
    use ethers::types::H256;
    use ethers::utils::keccak256;
    use lazy_static::lazy_static;

    pub const SENT_MESSAGE_SIGNATURE: &str = "SentMessage(uint256,address,uint256,address,bytes)";
    pub const RELAYED_MESSAGE_SIGNATURE: &str = "RelayedMessage(uint256,uint256,bytes32)";
    pub const FAILED_RELAYED_MESSAGE_SIGNATURE: &str =
        "FailedRelayedMessage(uint256,uint256,bytes32)";

    lazy_static! {
        pub static ref SENT_MESSAGE: H256 = H256::from(keccak256(SENT_MESSAGE_SIGNATURE));
        pub static ref RELAYED_MESSAGE: H256 = H256::from(keccak256(RELAYED_MESSAGE_SIGNATURE));
        pub static ref FAILED_RELAYED_MESSAGE: H256 =
            H256::from(keccak256(FAILED_RELAYED_MESSAGE_SIGNATURE));
    }
}

/// Destination-side outcome of a relay attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayOutcome {
    Relayed,
    Failed,
}

/// Decoded `RelayedMessage` / `FailedRelayedMessage` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReceipt {
    pub outcome: RelayOutcome,
    pub source_chain_id: U256,
    pub nonce: U256,
    pub message_hash: MessageHash,
    pub tx_hash: Option<H256>,
    pub block_number: Option<u64>,
}

/// Events emitted by the messenger contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessengerEvent {
    Sent(OutboundMessage),
    Relay(RelayReceipt),
}

/// Event parser bound to one chain's messenger contract
#[derive(Debug, Clone)]
pub struct EventParser {
    messenger: Address,
}

impl EventParser {
    pub fn new(messenger: Address) -> Self {
        Self { messenger }
    }

    pub fn messenger(&self) -> Address {
        self.messenger
    }

    /// Whether the log is a `SentMessage` emitted by this messenger
    pub fn is_sent_message(&self, log: &Log) -> bool {
        log.address == self.messenger && log.topics.first() == Some(&*topics::SENT_MESSAGE)
    }

    /// Parse a log into a messenger event.
    ///
    /// Returns `Ok(None)` for logs from other contracts or with unrelated topics.
    pub fn parse_log(&self, log: &Log) -> MonitorResult<Option<MessengerEvent>> {
        if log.address != self.messenger {
            return Ok(None);
        }

        let Some(topic) = log.topics.first() else {
            return Ok(None);
        };

        if *topic == *topics::SENT_MESSAGE {
            decode_sent_message(log).map(|m| Some(MessengerEvent::Sent(m)))
        } else if *topic == *topics::RELAYED_MESSAGE || *topic == *topics::FAILED_RELAYED_MESSAGE {
            decode_relay_receipt(log).map(|r| Some(MessengerEvent::Relay(r)))
        } else {
            Ok(None)
        }
    }
}

/// Decode a `SentMessage` log
pub fn decode_sent_message(log: &Log) -> MonitorResult<OutboundMessage> {
    if log.topics.len() != 4 {
        return Err(MonitorError::Decode(format!(
            "SentMessage expects 4 topics, got {}",
            log.topics.len()
        )));
    }
    if log.topics[0] != *topics::SENT_MESSAGE {
        return Err(MonitorError::Decode(format!(
            "unexpected event signature {:?}",
            log.topics[0]
        )));
    }

    let destination = topic_to_u64(&log.topics[1], "destination")?;
    let target = topic_to_address(&log.topics[2], "target")?;
    let nonce = U256::from_big_endian(log.topics[3].as_bytes());

    let tokens = abi::decode(&[ParamType::Address, ParamType::Bytes], &log.data)
        .map_err(|e| MonitorError::Decode(format!("SentMessage data: {}", e)))?;

    match tokens.as_slice() {
        [Token::Address(sender), Token::Bytes(payload)] => Ok(OutboundMessage {
            destination,
            target,
            nonce,
            sender: *sender,
            payload: Bytes::from(payload.clone()),
        }),
        _ => Err(MonitorError::Decode(
            "SentMessage data does not match (address, bytes)".to_string(),
        )),
    }
}

/// Decode a `RelayedMessage` or `FailedRelayedMessage` log
pub fn decode_relay_receipt(log: &Log) -> MonitorResult<RelayReceipt> {
    if log.topics.len() != 4 {
        return Err(MonitorError::Decode(format!(
            "relay event expects 4 topics, got {}",
            log.topics.len()
        )));
    }

    let outcome = if log.topics[0] == *topics::RELAYED_MESSAGE {
        RelayOutcome::Relayed
    } else if log.topics[0] == *topics::FAILED_RELAYED_MESSAGE {
        RelayOutcome::Failed
    } else {
        return Err(MonitorError::Decode(format!(
            "unexpected event signature {:?}",
            log.topics[0]
        )));
    };

    Ok(RelayReceipt {
        outcome,
        source_chain_id: U256::from_big_endian(log.topics[1].as_bytes()),
        nonce: U256::from_big_endian(log.topics[2].as_bytes()),
        message_hash: log.topics[3],
        tx_hash: log.transaction_hash,
        block_number: log.block_number.map(|b| b.as_u64()),
    })
}

/// ABI-encode the non-indexed `SentMessage` fields
pub fn encode_sent_message_data(message: &OutboundMessage) -> Vec<u8> {
    abi::encode(&[
        Token::Address(message.sender),
        Token::Bytes(message.payload.to_vec()),
    ])
}

/// Build the `SentMessage` log a messenger would emit for `message`
pub fn encode_sent_message_log(messenger: Address, message: &OutboundMessage) -> Log {
    Log {
        address: messenger,
        topics: vec![
            *topics::SENT_MESSAGE,
            uint_topic(U256::from(message.destination)),
            address_topic(message.target),
            uint_topic(message.nonce),
        ],
        data: Bytes::from(encode_sent_message_data(message)),
        ..Default::default()
    }
}

/// Build a `RelayedMessage` / `FailedRelayedMessage` log
pub fn encode_relay_log(
    messenger: Address,
    outcome: RelayOutcome,
    source_chain_id: u64,
    nonce: U256,
    message_hash: MessageHash,
) -> Log {
    let signature = match outcome {
        RelayOutcome::Relayed => *topics::RELAYED_MESSAGE,
        RelayOutcome::Failed => *topics::FAILED_RELAYED_MESSAGE,
    };

    Log {
        address: messenger,
        topics: vec![
            signature,
            uint_topic(U256::from(source_chain_id)),
            uint_topic(nonce),
            message_hash,
        ],
        ..Default::default()
    }
}

fn uint_topic(value: U256) -> H256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    H256::from(buf)
}

fn address_topic(address: Address) -> H256 {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(address.as_bytes());
    H256::from(buf)
}

fn topic_to_u64(topic: &H256, field: &str) -> MonitorResult<u64> {
    let value = U256::from_big_endian(topic.as_bytes());
    if value.bits() > 64 {
        return Err(MonitorError::Decode(format!(
            "{} {} does not fit a chain id",
            field, value
        )));
    }
    Ok(value.as_u64())
}

fn topic_to_address(topic: &H256, field: &str) -> MonitorResult<Address> {
    let bytes = topic.as_bytes();
    if bytes[..12].iter().any(|b| *b != 0) {
        return Err(MonitorError::Decode(format!(
            "{} topic {:?} is not a left-padded address",
            field, topic
        )));
    }
    Ok(Address::from_slice(&bytes[12..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messenger() -> Address {
        "0x4200000000000000000000000000000000000023".parse().unwrap()
    }

    fn message(payload: Vec<u8>) -> OutboundMessage {
        OutboundMessage {
            destination: 902,
            target: Address::repeat_byte(0x11),
            nonce: U256::from(7),
            sender: Address::repeat_byte(0x22),
            payload: Bytes::from(payload),
        }
    }

    #[test]
    fn test_topic_signatures() {
        assert_eq!(
            format!("{:?}", *topics::SENT_MESSAGE),
            "0x382409ac69001e11931a28435afef442cbfd20d9891907e8fa373ba7d351f320"
        );
        assert_eq!(
            format!("{:?}", *topics::RELAYED_MESSAGE),
            "0x5948076590932b9d173029c7df03fe386e755a61c86c7fe2671011a2faa2a379"
        );
        assert_eq!(
            format!("{:?}", *topics::FAILED_RELAYED_MESSAGE),
            "0x86f6ff8108e52c91c968419a809d473123c6168dc059921b2497ed5f683571d6"
        );
    }

    #[test]
    fn test_sent_message_data_layout() {
        let data = encode_sent_message_data(&message(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(
            hex::encode(&data),
            concat!(
                "0000000000000000000000002222222222222222222222222222222222222222",
                "0000000000000000000000000000000000000000000000000000000000000040",
                "0000000000000000000000000000000000000000000000000000000000000004",
                "deadbeef00000000000000000000000000000000000000000000000000000000",
            )
        );
    }

    #[test]
    fn test_sent_message_round_trip() {
        for payload in [vec![], vec![0x01], vec![0xab; 33], vec![0x5a; 64]] {
            let original = message(payload);
            let log = encode_sent_message_log(messenger(), &original);
            assert_eq!(decode_sent_message(&log).unwrap(), original);
        }
    }

    #[test]
    fn test_rejects_wrong_topic_count() {
        let mut log = encode_sent_message_log(messenger(), &message(vec![1, 2, 3]));
        log.topics.pop();
        let err = decode_sent_message(&log).unwrap_err();
        assert!(matches!(err, MonitorError::Decode(_)));
    }

    #[test]
    fn test_rejects_malformed_payload_offset() {
        let mut log = encode_sent_message_log(messenger(), &message(vec![1, 2, 3]));
        let mut data = log.data.to_vec();
        // Point the bytes offset far beyond the end of the data
        data[32..64].copy_from_slice(&uint_topic(U256::from(0x1000)).0);
        log.data = Bytes::from(data);
        assert!(matches!(
            decode_sent_message(&log),
            Err(MonitorError::Decode(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_payload() {
        let mut log = encode_sent_message_log(messenger(), &message(vec![0xab; 40]));
        let data = log.data.to_vec();
        log.data = Bytes::from(data[..data.len() - 32].to_vec());
        assert!(decode_sent_message(&log).is_err());
    }

    #[test]
    fn test_rejects_dirty_address_topic() {
        let mut log = encode_sent_message_log(messenger(), &message(vec![]));
        log.topics[2].0[0] = 0xff;
        assert!(decode_sent_message(&log).is_err());
    }

    #[test]
    fn test_rejects_oversized_destination() {
        let mut log = encode_sent_message_log(messenger(), &message(vec![]));
        log.topics[1] = H256::repeat_byte(0xff);
        assert!(decode_sent_message(&log).is_err());
    }

    #[test]
    fn test_parse_relay_events() {
        let parser = EventParser::new(messenger());
        let hash = H256::repeat_byte(0x77);

        for outcome in [RelayOutcome::Relayed, RelayOutcome::Failed] {
            let mut log = encode_relay_log(messenger(), outcome, 901, U256::from(7), hash);
            log.transaction_hash = Some(H256::repeat_byte(0xbb));

            match parser.parse_log(&log).unwrap() {
                Some(MessengerEvent::Relay(receipt)) => {
                    assert_eq!(receipt.outcome, outcome);
                    assert_eq!(receipt.message_hash, hash);
                    assert_eq!(receipt.source_chain_id, U256::from(901));
                    assert_eq!(receipt.nonce, U256::from(7));
                    assert_eq!(receipt.tx_hash, Some(H256::repeat_byte(0xbb)));
                }
                other => panic!("unexpected parse result {:?}", other),
            }
        }
    }

    #[test]
    fn test_parser_ignores_foreign_logs() {
        let parser = EventParser::new(messenger());
        let log = encode_sent_message_log(Address::repeat_byte(0x99), &message(vec![]));
        assert!(parser.parse_log(&log).unwrap().is_none());
        assert!(!parser.is_sent_message(&log));

        let unrelated = Log {
            address: messenger(),
            topics: vec![H256::repeat_byte(0x01)],
            ..Default::default()
        };
        assert!(parser.parse_log(&unrelated).unwrap().is_none());
    }
}
