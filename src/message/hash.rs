//! Two-stage message hash
//!
//! inner = keccak256(SentMessage topic ‖ destination ‖ target ‖ nonce ‖ abi(sender, payload))
//! outer = keccak256(abi(origin, blockNumber, logIndex, timestamp, chainId) ‖ inner)
//!
//! Every field is a left-padded 32-byte word. The inner stage equals the hash of
//! the emitting log's topics concatenated with its data.

use super::{MessageHash, MessageIdentifier, OutboundMessage};
use crate::events::{encode_sent_message_data, topics};

use ethers::abi::{self, Token};
use ethers::types::{H256, U256};
use sha3::{Digest, Keccak256};

/// Hash of the `SentMessage` payload
pub fn payload_hash(message: &OutboundMessage) -> H256 {
    let indexed = abi::encode(&[
        Token::Uint(U256::from(message.destination)),
        Token::Address(message.target),
        Token::Uint(message.nonce),
    ]);

    let mut hasher = Keccak256::new();
    hasher.update(topics::SENT_MESSAGE.as_bytes());
    hasher.update(&indexed);
    hasher.update(encode_sent_message_data(message));
    H256::from_slice(&hasher.finalize())
}

/// Hash a message together with the identifier of its emitting log
pub fn compute_message_hash(
    identifier: &MessageIdentifier,
    message: &OutboundMessage,
) -> MessageHash {
    let encoded_identifier = abi::encode(&[
        Token::Address(identifier.origin),
        Token::Uint(U256::from(identifier.block_number)),
        Token::Uint(U256::from(identifier.log_index)),
        Token::Uint(U256::from(identifier.timestamp)),
        Token::Uint(U256::from(identifier.chain_id)),
    ]);

    let mut hasher = Keccak256::new();
    hasher.update(&encoded_identifier);
    hasher.update(payload_hash(message).as_bytes());
    H256::from_slice(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Address, Bytes};

    fn fixture() -> (MessageIdentifier, OutboundMessage) {
        let identifier = MessageIdentifier {
            origin: "0x4200000000000000000000000000000000000023".parse().unwrap(),
            chain_id: 901,
            block_number: 12,
            log_index: 3,
            timestamp: 1_700_000_000,
        };
        let message = OutboundMessage {
            destination: 902,
            target: Address::repeat_byte(0x11),
            nonce: U256::from(7),
            sender: Address::repeat_byte(0x22),
            payload: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        };
        (identifier, message)
    }

    fn h256(hex_str: &str) -> H256 {
        hex_str.parse().unwrap()
    }

    #[test]
    fn test_payload_hash_fixed_vector() {
        let (_, message) = fixture();
        assert_eq!(
            payload_hash(&message),
            h256("0x30c051d6acb3df2d69c24c2191a4edeee174a45014a967456eca84be02e3ca49")
        );
    }

    #[test]
    fn test_message_hash_fixed_vector() {
        let (identifier, message) = fixture();
        assert_eq!(
            compute_message_hash(&identifier, &message),
            h256("0x3f409d177348ca6555dda7fc2acce6d152e1cbda110eeccb9dd3ad480ecff789")
        );
    }

    #[test]
    fn test_message_hash_empty_payload_vector() {
        let (identifier, mut message) = fixture();
        message.payload = Bytes::default();
        assert_eq!(
            payload_hash(&message),
            h256("0xba2ff3abb1e656a2737ab2e76a9d22ea38658810cba5d86d5ae766a61044f166")
        );
        assert_eq!(
            compute_message_hash(&identifier, &message),
            h256("0x75c0d6e2a79dc338ec25bf59ec38db4b7b292a0b81a684c25a7344bf145893cb")
        );
    }

    #[test]
    fn test_payload_hash_matches_raw_log_bytes() {
        let (_, message) = fixture();
        let log = crate::events::encode_sent_message_log(Address::repeat_byte(0x42), &message);

        let mut raw = Vec::new();
        for topic in &log.topics {
            raw.extend_from_slice(topic.as_bytes());
        }
        raw.extend_from_slice(&log.data);

        assert_eq!(
            payload_hash(&message),
            H256::from(ethers::utils::keccak256(&raw))
        );
    }

    #[test]
    fn test_every_field_changes_the_hash() {
        let (identifier, message) = fixture();
        let baseline = compute_message_hash(&identifier, &message);
        assert_eq!(baseline, compute_message_hash(&identifier, &message));

        let mut variants = Vec::new();

        let mut m = message.clone();
        m.destination = 903;
        variants.push((identifier, m));
        let mut m = message.clone();
        m.target = Address::repeat_byte(0x12);
        variants.push((identifier, m));
        let mut m = message.clone();
        m.nonce = U256::from(8);
        variants.push((identifier, m));
        let mut m = message.clone();
        m.sender = Address::repeat_byte(0x23);
        variants.push((identifier, m));
        let mut m = message.clone();
        m.payload = Bytes::from(vec![0xde, 0xad, 0xbe, 0xee]);
        variants.push((identifier, m));

        let mut id = identifier;
        id.origin = Address::repeat_byte(0x43);
        variants.push((id, message.clone()));
        let mut id = identifier;
        id.chain_id = 900;
        variants.push((id, message.clone()));
        let mut id = identifier;
        id.block_number = 13;
        variants.push((id, message.clone()));
        let mut id = identifier;
        id.log_index = 4;
        variants.push((id, message.clone()));
        let mut id = identifier;
        id.timestamp += 1;
        variants.push((id, message.clone()));

        for (id, m) in variants {
            assert_ne!(compute_message_hash(&id, &m), baseline, "{:?} {:?}", id, m);
        }
    }
}
