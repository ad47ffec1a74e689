//! Log decoding: raw ledger logs into typed relay events
//!
//! Both recognized events share the layout
//! `Event(address indexed, address indexed, uint256)`:
//! topic 1 carries the token role, topic 2 the recipient role, and the
//! first data word the amount. The `Unwrap` ABI names its fields
//! `underlying_token`/`to`, but decoding by position makes the naming
//! difference irrelevant and transposition impossible.

use alloy::primitives::{Address, U256};

use crate::client::RawLog;
use crate::error::RelayError;
use crate::types::{EventKind, RelayEvent};

/// Number of topics for the recognized events: signature + two indexed
/// address fields.
const EXPECTED_TOPICS: usize = 3;

/// Decode a raw log that matched `kind`'s signature into a `RelayEvent`.
///
/// A failure here is scoped to this one log: the caller logs it and keeps
/// scanning the rest of the batch.
pub fn decode_log(chain_id: u64, kind: EventKind, log: &RawLog) -> Result<RelayEvent, RelayError> {
    if log.topics.len() != EXPECTED_TOPICS {
        return Err(RelayError::MalformedEvent(format!(
            "{} log has {} topics, expected {}",
            kind,
            log.topics.len(),
            EXPECTED_TOPICS
        )));
    }

    if log.topics[0] != kind.topic() {
        return Err(RelayError::MalformedEvent(format!(
            "topic0 does not match {} signature",
            kind
        )));
    }

    if log.data.len() < 32 {
        return Err(RelayError::MalformedEvent(format!(
            "{} log data is {} bytes, expected at least 32",
            kind,
            log.data.len()
        )));
    }

    // Indexed addresses are right-aligned in their 32-byte topics.
    let token = Address::from_slice(&log.topics[1].as_slice()[12..]);
    let recipient = Address::from_slice(&log.topics[2].as_slice()[12..]);
    let amount = U256::from_be_slice(&log.data[..32]);

    let block_number = log
        .block_number
        .ok_or_else(|| RelayError::MalformedEvent("missing block number".to_string()))?;
    let tx_hash = log
        .tx_hash
        .ok_or_else(|| RelayError::MalformedEvent("missing transaction hash".to_string()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| RelayError::MalformedEvent("missing log index".to_string()))?;

    Ok(RelayEvent {
        chain_id,
        kind,
        block_number,
        tx_hash,
        log_index,
        token,
        recipient,
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use std::str::FromStr;

    fn address_topic(addr: Address) -> B256 {
        let mut bytes = [0u8; 32];
        bytes[12..].copy_from_slice(addr.as_slice());
        B256::from(bytes)
    }

    fn sample_log(kind: EventKind, token: Address, recipient: Address, amount: u64) -> RawLog {
        RawLog {
            address: Address::ZERO,
            topics: vec![kind.topic(), address_topic(token), address_topic(recipient)],
            data: U256::from(amount).to_be_bytes::<32>().to_vec(),
            block_number: Some(100),
            tx_hash: Some(
                B256::from_str(
                    "0x1110000000000000000000000000000000000000000000000000000000000000",
                )
                .unwrap(),
            ),
            log_index: Some(0),
        }
    }

    #[test]
    fn test_decode_deposit() {
        let token = Address::from_str("0x0aaa000000000000000000000000000000000000").unwrap();
        let recipient = Address::from_str("0x0bbb000000000000000000000000000000000000").unwrap();
        let log = sample_log(EventKind::Deposit, token, recipient, 1000);

        let event = decode_log(1, EventKind::Deposit, &log).unwrap();
        assert_eq!(event.chain_id, 1);
        assert_eq!(event.kind, EventKind::Deposit);
        assert_eq!(event.token, token);
        assert_eq!(event.recipient, recipient);
        assert_eq!(event.amount, U256::from(1000u64));
        assert_eq!(event.block_number, 100);
        assert_eq!(event.log_index, 0);
    }

    #[test]
    fn test_decode_unwrap_positional_mapping() {
        // The Unwrap ABI names these underlying_token/to; position is what
        // the decoder reads, so the roles must come out untransposed.
        let underlying_token =
            Address::from_str("0x0ccc000000000000000000000000000000000000").unwrap();
        let to = Address::from_str("0x0ddd000000000000000000000000000000000000").unwrap();
        let log = sample_log(EventKind::Unwrap, underlying_token, to, 500);

        let event = decode_log(56, EventKind::Unwrap, &log).unwrap();
        assert_eq!(event.token, underlying_token);
        assert_eq!(event.recipient, to);
        assert_eq!(event.amount, U256::from(500u64));
    }

    #[test]
    fn test_decode_rejects_wrong_topic_count() {
        let mut log = sample_log(EventKind::Deposit, Address::ZERO, Address::ZERO, 1);
        log.topics.pop();
        let err = decode_log(1, EventKind::Deposit, &log).unwrap_err();
        assert!(matches!(err, RelayError::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_rejects_signature_mismatch() {
        let log = sample_log(EventKind::Unwrap, Address::ZERO, Address::ZERO, 1);
        let err = decode_log(1, EventKind::Deposit, &log).unwrap_err();
        assert!(matches!(err, RelayError::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_rejects_short_data() {
        let mut log = sample_log(EventKind::Deposit, Address::ZERO, Address::ZERO, 1);
        log.data.truncate(16);
        let err = decode_log(1, EventKind::Deposit, &log).unwrap_err();
        assert!(matches!(err, RelayError::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_rejects_missing_identity_fields() {
        let mut log = sample_log(EventKind::Deposit, Address::ZERO, Address::ZERO, 1);
        log.tx_hash = None;
        assert!(decode_log(1, EventKind::Deposit, &log).is_err());

        let mut log = sample_log(EventKind::Deposit, Address::ZERO, Address::ZERO, 1);
        log.log_index = None;
        assert!(decode_log(1, EventKind::Deposit, &log).is_err());

        let mut log = sample_log(EventKind::Deposit, Address::ZERO, Address::ZERO, 1);
        log.block_number = None;
        assert!(decode_log(1, EventKind::Deposit, &log).is_err());
    }

    #[test]
    fn test_decode_large_amount_is_lossless() {
        let amount = U256::from_str(
            "115792089237316195423570985008687907853269984665640564039457584007913129639935",
        )
        .unwrap(); // 2^256 - 1
        let mut log = sample_log(EventKind::Deposit, Address::ZERO, Address::ZERO, 0);
        log.data = amount.to_be_bytes::<32>().to_vec();

        let event = decode_log(1, EventKind::Deposit, &log).unwrap();
        assert_eq!(event.amount, amount);
    }
}
