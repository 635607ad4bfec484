//! Derived aggregates: rebuildable projections over event records.
//!
//! Deltas are computed only from records that were actually inserted by a
//! batch, so replaying a range (restart, start-up rewind) never double counts.

use std::collections::BTreeMap;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::types::EventRecord;

/// Running totals for one chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTotals {
    pub total_burned: U256,
    pub total_swap_burned: U256,
    pub total_eth_swapped: U256,
    pub total_liquidity_tokens: U256,
    pub total_liquidity_eth: U256,
    pub total_locked: U256,
    pub total_claimed: U256,
    pub positions_created: u64,
    pub positions_claimed: u64,
}

impl ChainTotals {
    /// Fold another delta into these totals.
    pub fn merge(&mut self, other: &ChainTotals) {
        self.total_burned = self.total_burned.saturating_add(other.total_burned);
        self.total_swap_burned = self.total_swap_burned.saturating_add(other.total_swap_burned);
        self.total_eth_swapped = self.total_eth_swapped.saturating_add(other.total_eth_swapped);
        self.total_liquidity_tokens = self
            .total_liquidity_tokens
            .saturating_add(other.total_liquidity_tokens);
        self.total_liquidity_eth = self.total_liquidity_eth.saturating_add(other.total_liquidity_eth);
        self.total_locked = self.total_locked.saturating_add(other.total_locked);
        self.total_claimed = self.total_claimed.saturating_add(other.total_claimed);
        self.positions_created += other.positions_created;
        self.positions_claimed += other.positions_claimed;
    }
}

/// Running totals for one participant address on one chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTotals {
    /// Tokens burned directly plus tokens burned through swap-and-burn.
    pub burned: U256,
    pub locked: U256,
    pub claimed: U256,
    pub event_count: u64,
}

impl UserTotals {
    pub fn merge(&mut self, other: &UserTotals) {
        self.burned = self.burned.saturating_add(other.burned);
        self.locked = self.locked.saturating_add(other.locked);
        self.claimed = self.claimed.saturating_add(other.claimed);
        self.event_count += other.event_count;
    }
}

/// Aggregate changes produced by one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateDelta {
    pub chain: ChainTotals,
    /// Keyed by lowercase participant address.
    pub users: BTreeMap<String, UserTotals>,
}

impl AggregateDelta {
    /// Compute the delta contributed by `records`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EventRecord>) -> Self {
        let mut delta = Self::default();
        for record in records {
            delta.add(record);
        }
        delta
    }

    pub fn add(&mut self, record: &EventRecord) {
        let user = self
            .users
            .entry(record.participant().to_ascii_lowercase())
            .or_default();
        user.event_count += 1;

        let chain = &mut self.chain;
        match record {
            EventRecord::Burn { amount, .. } => {
                chain.total_burned = chain.total_burned.saturating_add(*amount);
                user.burned = user.burned.saturating_add(*amount);
            }
            EventRecord::SwapAndBurn {
                eth_amount,
                tokens_burned,
                ..
            } => {
                chain.total_swap_burned = chain.total_swap_burned.saturating_add(*tokens_burned);
                chain.total_eth_swapped = chain.total_eth_swapped.saturating_add(*eth_amount);
                user.burned = user.burned.saturating_add(*tokens_burned);
            }
            EventRecord::LiquidityAdded {
                token_amount,
                eth_amount,
                ..
            } => {
                chain.total_liquidity_tokens =
                    chain.total_liquidity_tokens.saturating_add(*token_amount);
                chain.total_liquidity_eth = chain.total_liquidity_eth.saturating_add(*eth_amount);
            }
            EventRecord::PositionCreated { amount, .. } => {
                chain.total_locked = chain.total_locked.saturating_add(*amount);
                chain.positions_created += 1;
                user.locked = user.locked.saturating_add(*amount);
            }
            EventRecord::PositionClaimed { amount, .. } => {
                chain.total_claimed = chain.total_claimed.saturating_add(*amount);
                chain.positions_claimed += 1;
                user.claimed = user.claimed.saturating_add(*amount);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventMeta;

    fn meta(tx: &str) -> EventMeta {
        EventMeta {
            chain_id: 1,
            tx_hash: tx.into(),
            log_index: 0,
            block_number: 10,
            block_timestamp: 0,
        }
    }

    #[test]
    fn burns_and_swap_burns_feed_user_burned() {
        let records = vec![
            EventRecord::Burn {
                meta: meta("0x1"),
                from: "0xAbC".into(),
                amount: U256::from(100u64),
            },
            EventRecord::SwapAndBurn {
                meta: meta("0x2"),
                user: "0xabc".into(),
                eth_amount: U256::from(3u64),
                tokens_burned: U256::from(50u64),
            },
        ];
        let delta = AggregateDelta::from_records(&records);
        assert_eq!(delta.chain.total_burned, U256::from(100u64));
        assert_eq!(delta.chain.total_swap_burned, U256::from(50u64));
        assert_eq!(delta.chain.total_eth_swapped, U256::from(3u64));
        let user = &delta.users["0xabc"];
        assert_eq!(user.burned, U256::from(150u64));
        assert_eq!(user.event_count, 2);
    }

    #[test]
    fn positions_tracked() {
        let records = vec![
            EventRecord::PositionCreated {
                meta: meta("0x1"),
                token_id: U256::from(7u64),
                owner: "0xdef".into(),
                amount: U256::from(1_000u64),
                lock_duration: 86_400,
            },
            EventRecord::PositionClaimed {
                meta: meta("0x2"),
                token_id: U256::from(7u64),
                owner: "0xdef".into(),
                amount: U256::from(1_000u64),
            },
        ];
        let mut totals = ChainTotals::default();
        totals.merge(&AggregateDelta::from_records(&records).chain);
        assert_eq!(totals.positions_created, 1);
        assert_eq!(totals.positions_claimed, 1);
        assert_eq!(totals.total_locked, U256::from(1_000u64));
        assert_eq!(totals.total_claimed, U256::from(1_000u64));
    }

    #[test]
    fn empty_delta() {
        let delta = AggregateDelta::from_records(&[]);
        assert!(delta.is_empty());
        assert_eq!(delta.chain, ChainTotals::default());
    }
}
