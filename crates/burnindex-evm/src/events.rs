//! Event signatures, log classification and decoding.
//!
//! Every log the indexer fetches goes through a single classifier keyed by
//! `(contract address, topic0)`. Anything the classifier does not recognise is
//! dropped; anything it recognises is decoded into exactly one
//! [`EventRecord`] variant.
//!
//! | Contract  | Event                                                                    |
//! |-----------|--------------------------------------------------------------------------|
//! | token     | `Transfer(address indexed from, address indexed to, uint256 value)`, `to == 0x0` |
//! | burn      | `SwapAndBurn(address indexed user, uint256 ethAmount, uint256 tokensBurned)` |
//! | burn      | `LiquidityAdded(address indexed provider, uint256 tokenAmount, uint256 ethAmount, uint256 liquidity)` |
//! | position  | `PositionCreated(uint256 indexed tokenId, address indexed owner, uint256 amount, uint256 lockDuration)` |
//! | position  | `PositionClaimed(uint256 indexed tokenId, address indexed owner, uint256 amount)` |

use std::sync::OnceLock;

use alloy_primitives::U256;
use tiny_keccak::{Hasher, Keccak};

use burnindex_core::error::IndexerError;
use burnindex_core::types::{ContractSet, EventKind, EventMeta, EventRecord};

use crate::fetcher::{LogFilter, RawLog};

pub const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const SWAP_AND_BURN_SIGNATURE: &str = "SwapAndBurn(address,uint256,uint256)";
pub const LIQUIDITY_ADDED_SIGNATURE: &str = "LiquidityAdded(address,uint256,uint256,uint256)";
pub const POSITION_CREATED_SIGNATURE: &str = "PositionCreated(uint256,address,uint256,uint256)";
pub const POSITION_CLAIMED_SIGNATURE: &str = "PositionClaimed(uint256,address,uint256)";

/// 32-byte zero word, the padded topic of the zero address.
pub const ZERO_TOPIC: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the keccak256 topic of an event signature string.
pub fn keccak256_signature(signature: &str) -> String {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    format!("0x{}", hex::encode(output))
}

struct Topics {
    transfer: String,
    swap_and_burn: String,
    liquidity_added: String,
    position_created: String,
    position_claimed: String,
}

fn topics() -> &'static Topics {
    static TOPICS: OnceLock<Topics> = OnceLock::new();
    TOPICS.get_or_init(|| Topics {
        transfer: keccak256_signature(TRANSFER_SIGNATURE),
        swap_and_burn: keccak256_signature(SWAP_AND_BURN_SIGNATURE),
        liquidity_added: keccak256_signature(LIQUIDITY_ADDED_SIGNATURE),
        position_created: keccak256_signature(POSITION_CREATED_SIGNATURE),
        position_claimed: keccak256_signature(POSITION_CLAIMED_SIGNATURE),
    })
}

/// topic0 of the log that produces `kind`.
pub fn topic0(kind: EventKind) -> &'static str {
    let t = topics();
    match kind {
        EventKind::Burn => &t.transfer,
        EventKind::SwapAndBurn => &t.swap_and_burn,
        EventKind::LiquidityAdded => &t.liquidity_added,
        EventKind::PositionCreated => &t.position_created,
        EventKind::PositionClaimed => &t.position_claimed,
    }
}

/// The three `eth_getLogs` filters covering a chain's contracts, in the
/// order token, burn contract, position contract.
pub fn log_filters(contracts: &ContractSet) -> [LogFilter; 3] {
    [
        LogFilter {
            address: contracts.token.to_ascii_lowercase(),
            topics: vec![
                vec![topic0(EventKind::Burn).to_string()],
                vec![],
                vec![ZERO_TOPIC.to_string()],
            ],
        },
        LogFilter {
            address: contracts.burn_contract.to_ascii_lowercase(),
            topics: vec![vec![
                topic0(EventKind::SwapAndBurn).to_string(),
                topic0(EventKind::LiquidityAdded).to_string(),
            ]],
        },
        LogFilter {
            address: contracts.position_contract.to_ascii_lowercase(),
            topics: vec![vec![
                topic0(EventKind::PositionCreated).to_string(),
                topic0(EventKind::PositionClaimed).to_string(),
            ]],
        },
    ]
}

// ─── Classifier ───────────────────────────────────────────────────────────────

/// Maps `(contract address, topic0)` to an [`EventKind`] for one chain.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    token: String,
    burn_contract: String,
    position_contract: String,
}

impl EventClassifier {
    pub fn new(contracts: &ContractSet) -> Self {
        Self {
            token: contracts.token.to_ascii_lowercase(),
            burn_contract: contracts.burn_contract.to_ascii_lowercase(),
            position_contract: contracts.position_contract.to_ascii_lowercase(),
        }
    }

    pub fn classify(&self, address: &str, topic0: &str) -> Option<EventKind> {
        let address = address.to_ascii_lowercase();
        let topic0 = topic0.to_ascii_lowercase();
        let t = topics();

        if address == self.token {
            (topic0 == t.transfer).then_some(EventKind::Burn)
        } else if address == self.burn_contract {
            if topic0 == t.swap_and_burn {
                Some(EventKind::SwapAndBurn)
            } else if topic0 == t.liquidity_added {
                Some(EventKind::LiquidityAdded)
            } else {
                None
            }
        } else if address == self.position_contract {
            if topic0 == t.position_created {
                Some(EventKind::PositionCreated)
            } else if topic0 == t.position_claimed {
                Some(EventKind::PositionClaimed)
            } else {
                None
            }
        } else {
            None
        }
    }

    /// Classify a raw log by its emitting address and first topic.
    pub fn classify_log(&self, log: &RawLog) -> Option<EventKind> {
        self.classify(&log.address, log.topics.first()?)
    }
}

// ─── Decoding ─────────────────────────────────────────────────────────────────

fn decode_err(kind: EventKind, log: &RawLog, reason: impl Into<String>) -> IndexerError {
    IndexerError::Decode {
        event: kind.as_str(),
        tx_hash: log.tx_hash.clone(),
        reason: reason.into(),
    }
}

fn word_hex(word: &str) -> Option<&str> {
    let hex = word.strip_prefix("0x").unwrap_or(word);
    (hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit())).then_some(hex)
}

/// The address packed into the low 20 bytes of an indexed topic.
fn topic_address(topic: &str) -> Option<String> {
    let hex = word_hex(topic)?;
    Some(format!("0x{}", hex[24..].to_ascii_lowercase()))
}

fn topic_u256(topic: &str) -> Option<U256> {
    U256::from_str_radix(word_hex(topic)?, 16).ok()
}

/// Split ABI-encoded `data` into 32-byte words.
fn data_words(data: &str) -> Option<Vec<U256>> {
    let bytes = hex::decode(data.strip_prefix("0x").unwrap_or(data)).ok()?;
    if bytes.len() % 32 != 0 {
        return None;
    }
    Some(bytes.chunks(32).map(U256::from_be_slice).collect())
}

/// Decode a classified log into its record.
pub fn decode_log(
    kind: EventKind,
    log: &RawLog,
    meta: EventMeta,
) -> Result<EventRecord, IndexerError> {
    let (indexed, words) = match kind {
        EventKind::Burn => (2, 1),
        EventKind::SwapAndBurn => (1, 2),
        EventKind::LiquidityAdded => (1, 3),
        EventKind::PositionCreated => (2, 2),
        EventKind::PositionClaimed => (2, 1),
    };
    if log.topics.len() < indexed + 1 {
        return Err(decode_err(
            kind,
            log,
            format!("expected {} topics, got {}", indexed + 1, log.topics.len()),
        ));
    }
    let data = data_words(&log.data)
        .ok_or_else(|| decode_err(kind, log, "data is not a sequence of 32-byte words"))?;
    if data.len() < words {
        return Err(decode_err(
            kind,
            log,
            format!("expected {words} data words, got {}", data.len()),
        ));
    }

    let address_at = |i: usize| {
        topic_address(&log.topics[i])
            .ok_or_else(|| decode_err(kind, log, format!("topic {i} is not an address")))
    };
    let uint_at = |i: usize| {
        topic_u256(&log.topics[i])
            .ok_or_else(|| decode_err(kind, log, format!("topic {i} is not a uint256")))
    };

    let record = match kind {
        EventKind::Burn => {
            let to = address_at(2)?;
            if to != "0x0000000000000000000000000000000000000000" {
                return Err(decode_err(kind, log, format!("transfer to {to} is not a burn")));
            }
            EventRecord::Burn {
                meta,
                from: address_at(1)?,
                amount: data[0],
            }
        }
        EventKind::SwapAndBurn => EventRecord::SwapAndBurn {
            meta,
            user: address_at(1)?,
            eth_amount: data[0],
            tokens_burned: data[1],
        },
        EventKind::LiquidityAdded => EventRecord::LiquidityAdded {
            meta,
            provider: address_at(1)?,
            token_amount: data[0],
            eth_amount: data[1],
            liquidity: data[2],
        },
        EventKind::PositionCreated => EventRecord::PositionCreated {
            meta,
            token_id: uint_at(1)?,
            owner: address_at(2)?,
            amount: data[0],
            lock_duration: u64::try_from(data[1]).unwrap_or(u64::MAX),
        },
        EventKind::PositionClaimed => EventRecord::PositionClaimed {
            meta,
            token_id: uint_at(1)?,
            owner: address_at(2)?,
            amount: data[0],
        },
    };
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0x1111111111111111111111111111111111111111";
    const BURN: &str = "0x2222222222222222222222222222222222222222";
    const POSITION: &str = "0x3333333333333333333333333333333333333333";
    const USER: &str = "0x000000000000000000000000abcdef0123456789abcdef0123456789abcdef01";

    fn contracts() -> ContractSet {
        ContractSet {
            token: TOKEN.into(),
            burn_contract: BURN.into(),
            position_contract: POSITION.into(),
        }
    }

    fn word(n: u64) -> String {
        format!("{n:064x}")
    }

    fn log(address: &str, topics: Vec<String>, data: String) -> RawLog {
        RawLog {
            address: address.into(),
            topics,
            data,
            block_number: "0x10".into(),
            block_hash: None,
            tx_hash: "0xfeed".into(),
            log_index: "0x1".into(),
            removed: None,
        }
    }

    fn meta() -> EventMeta {
        EventMeta {
            chain_id: 56,
            tx_hash: "0xfeed".into(),
            log_index: 1,
            block_number: 16,
            block_timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn erc20_transfer_topic() {
        assert_eq!(
            topic0(EventKind::Burn),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn classifier_keys_on_address_and_topic() {
        let c = EventClassifier::new(&contracts());
        assert_eq!(c.classify(TOKEN, topic0(EventKind::Burn)), Some(EventKind::Burn));
        assert_eq!(
            c.classify(&BURN.to_uppercase().replace("0X", "0x"), topic0(EventKind::LiquidityAdded)),
            Some(EventKind::LiquidityAdded)
        );
        assert_eq!(
            c.classify(POSITION, topic0(EventKind::PositionClaimed)),
            Some(EventKind::PositionClaimed)
        );
        // Right topic, wrong contract.
        assert_eq!(c.classify(BURN, topic0(EventKind::Burn)), None);
        assert_eq!(c.classify(TOKEN, topic0(EventKind::SwapAndBurn)), None);
        assert_eq!(c.classify("0x4444444444444444444444444444444444444444", topic0(EventKind::Burn)), None);
    }

    #[test]
    fn decode_burn() {
        let l = log(
            TOKEN,
            vec![topic0(EventKind::Burn).into(), USER.into(), ZERO_TOPIC.into()],
            format!("0x{}", word(1_000)),
        );
        match decode_log(EventKind::Burn, &l, meta()).unwrap() {
            EventRecord::Burn { from, amount, .. } => {
                assert_eq!(from, "0xabcdef0123456789abcdef0123456789abcdef01");
                assert_eq!(amount, U256::from(1_000u64));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transfer_to_non_zero_is_rejected() {
        let l = log(
            TOKEN,
            vec![topic0(EventKind::Burn).into(), USER.into(), USER.into()],
            format!("0x{}", word(1)),
        );
        let err = decode_log(EventKind::Burn, &l, meta()).unwrap_err();
        assert!(matches!(err, IndexerError::Decode { event: "Burn", .. }));
    }

    #[test]
    fn decode_position_created() {
        let l = log(
            POSITION,
            vec![
                topic0(EventKind::PositionCreated).into(),
                format!("0x{}", word(7)),
                USER.into(),
            ],
            format!("0x{}{}", word(5_000), word(86_400)),
        );
        match decode_log(EventKind::PositionCreated, &l, meta()).unwrap() {
            EventRecord::PositionCreated {
                token_id,
                owner,
                amount,
                lock_duration,
                ..
            } => {
                assert_eq!(token_id, U256::from(7u64));
                assert_eq!(owner, "0xabcdef0123456789abcdef0123456789abcdef01");
                assert_eq!(amount, U256::from(5_000u64));
                assert_eq!(lock_duration, 86_400);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn short_data_is_a_decode_error() {
        let l = log(
            BURN,
            vec![topic0(EventKind::LiquidityAdded).into(), USER.into()],
            format!("0x{}", word(1)),
        );
        assert!(decode_log(EventKind::LiquidityAdded, &l, meta()).is_err());

        let odd = log(BURN, vec![topic0(EventKind::SwapAndBurn).into(), USER.into()], "0x1234".into());
        assert!(decode_log(EventKind::SwapAndBurn, &odd, meta()).is_err());
    }

    #[test]
    fn filters_cover_all_kinds() {
        let [token, burn, position] = log_filters(&contracts());
        assert_eq!(token.address, TOKEN);
        assert_eq!(token.topics[2], vec![ZERO_TOPIC.to_string()]);
        assert_eq!(burn.topics[0].len(), 2);
        assert_eq!(position.address, POSITION);
    }
}
