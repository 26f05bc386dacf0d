use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Duration, Utc};
use relay_types::{derive_in_transfer_id, RelayConfig, Transfer, TransferStatus, TransferType};
use tracing::warn;

use crate::error::IngestError;

/// How far in the future a source-chain timelock must sit for the relay to
/// accept it: below this there isn't enough runway left to lock the
/// destination leg and still refund in time. No ceiling — a long-dated
/// timelock just means the relay's capital sits idle longer, not that the
/// transfer is unsafe.
pub const MIN_TIMELOCK_MARGIN_HOURS: i64 = 16;

/// The destination leg's timelock is the source leg's timelock shortened by a
/// fixed margin, not the legacy "2/3 of remaining window" heuristic: a fixed
/// shave is simpler to reason about and gives the relay a guaranteed 8h
/// window to confirm or refund the IN leg before the OUT leg's own timelock
/// can be exploited by the sender to reclaim funds on both sides.
pub const IN_TIMELOCK_SHAVE_HOURS: i64 = 8;

/// Fields decoded off `LogNewTransferOut`, decoupled from [`relay_chain::BridgeEvent`]
/// so this module has no dependency on the chain crate and stays trivially testable.
#[derive(Debug, Clone, Copy)]
pub struct TransferOutEvent {
    pub transfer_id: B256,
    pub sender: Address,
    pub receiver: Address,
    /// The actual recipient on the destination chain.
    pub dst_address: Address,
    pub token: Address,
    pub amount: U256,
    pub hashlock: B256,
    pub timelock: DateTime<Utc>,
    pub dst_chain_id: u64,
    pub tx_hash: B256,
}

/// Builds the OUT row, and — if the timelock leaves enough margin — its IN
/// sibling. The OUT row is always built once the destination chain/token
/// resolve: the margin check only ever gates the IN leg, never the OUT leg,
/// since the contract has already locked the sender's funds on-chain
/// regardless of what the relay decides to do about the destination leg.
pub fn build_transfer_pair(event: &TransferOutEvent, src_chain_id: u64, config: &RelayConfig, now: DateTime<Utc>) -> Result<(Transfer, Option<Transfer>), IngestError> {
    let src_chain = config.chain(src_chain_id).ok_or(IngestError::UnknownDstChain(src_chain_id))?;
    let src_token = src_chain
        .token_config
        .iter()
        .find(|t| addr_eq(&t.token_address, event.token))
        .ok_or(IngestError::UnknownToken { chain_id: src_chain_id, token: event.token })?;

    let dst_chain = config.chain(event.dst_chain_id).ok_or(IngestError::UnknownDstChain(event.dst_chain_id))?;
    let dst_token = dst_chain
        .token_config
        .iter()
        .find(|t| t.token_name == src_token.token_name)
        .ok_or(IngestError::UnknownToken { chain_id: event.dst_chain_id, token: event.token })?;
    let dst_token_address: Address = dst_token.token_address.parse().unwrap_or_default();

    let scaled_amount = rescale(event.amount, src_token.token_decimal, dst_token.token_decimal);
    let fee = scaled_amount * U256::from(dst_chain.fee_rate) / U256::from(10_000u64);
    let in_amount = scaled_amount.saturating_sub(fee);

    let in_tid = derive_in_transfer_id(event.receiver, event.dst_address, event.hashlock, event.dst_chain_id);
    let in_timelock = event.timelock - Duration::hours(IN_TIMELOCK_SHAVE_HOURS);

    let out_row = Transfer {
        transfer_id: event.transfer_id,
        chain_id: src_chain_id,
        token: event.token,
        amount: event.amount,
        fee: U256::ZERO,
        transfer_type: TransferType::Out,
        status: TransferStatus::Locked,
        hashlock: event.hashlock,
        timelock: event.timelock,
        related_tid: in_tid,
        related_chain_id: event.dst_chain_id,
        related_token: dst_token_address,
        preimage: B256::ZERO,
        sender: event.sender,
        receiver: event.receiver,
        tx_hash: event.tx_hash,
        tx_confirm_hash: B256::ZERO,
        tx_refund_hash: B256::ZERO,
        transfer_gas_cost: U256::ZERO,
        confirm_gas_cost: U256::ZERO,
        refund_gas_cost: U256::ZERO,
        update_ts: now,
        create_ts: now,
    };

    let margin = event.timelock - now;
    if margin < Duration::hours(MIN_TIMELOCK_MARGIN_HOURS) {
        warn!(transfer_id = %event.transfer_id, timelock = event.timelock.timestamp(), "timelock margin too small, leaving OUT leg locked with no IN leg");
        return Ok((out_row, None));
    }

    let in_row = Transfer {
        transfer_id: in_tid,
        chain_id: event.dst_chain_id,
        token: dst_token_address,
        amount: in_amount,
        fee,
        transfer_type: TransferType::In,
        status: TransferStatus::TransferInStart,
        hashlock: event.hashlock,
        timelock: in_timelock,
        related_tid: event.transfer_id,
        related_chain_id: src_chain_id,
        related_token: event.token,
        preimage: B256::ZERO,
        sender: event.sender,
        receiver: event.dst_address,
        tx_hash: B256::ZERO,
        tx_confirm_hash: B256::ZERO,
        tx_refund_hash: B256::ZERO,
        transfer_gas_cost: U256::ZERO,
        confirm_gas_cost: U256::ZERO,
        refund_gas_cost: U256::ZERO,
        update_ts: now,
        create_ts: now,
    };

    Ok((out_row, Some(in_row)))
}

fn addr_eq(raw: &str, addr: Address) -> bool {
    raw.parse::<Address>().map(|a| a == addr).unwrap_or(false)
}

fn rescale(amount: U256, from_decimal: u32, to_decimal: u32) -> U256 {
    if to_decimal >= from_decimal {
        amount.saturating_mul(U256::from(10u64).pow(U256::from(to_decimal - from_decimal)))
    } else {
        amount / U256::from(10u64).pow(U256::from(from_decimal - to_decimal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_types::{ChainConfig, TokenConfig, TransactorConfig, WatchConfig};

    fn cfg() -> RelayConfig {
        RelayConfig {
            gateway: "https://gw".into(),
            db: "db".into(),
            relay_node_name: "r1".into(),
            status_addr: "0.0.0.0:8088".into(),
            chains: vec![
                ChainConfig {
                    chain_id: 1,
                    endpoint: "https://a".into(),
                    contract_address: "0x0000000000000000000000000000000000000001".into(),
                    fee_rate: 0,
                    gas_token_name: "ETH".into(),
                    gas_token_decimal: 18,
                    watch_config: WatchConfig { polling_interval_secs: 5, block_delay: 1, max_block_delta: 100, forward_block_delay: 0 },
                    transactor_config: TransactorConfig { add_gas_gwei: 0, add_gas_estimate_ratio: 0.0, gas_limit: 0 },
                    token_config: vec![TokenConfig {
                        token_name: "USDC".into(),
                        token_address: "0x0000000000000000000000000000000000000002".into(),
                        token_decimal: 6,
                    }],
                },
                ChainConfig {
                    chain_id: 2,
                    endpoint: "https://b".into(),
                    contract_address: "0x0000000000000000000000000000000000000003".into(),
                    fee_rate: 10, // 0.1%
                    gas_token_name: "ETH".into(),
                    gas_token_decimal: 18,
                    watch_config: WatchConfig { polling_interval_secs: 5, block_delay: 1, max_block_delta: 100, forward_block_delay: 0 },
                    transactor_config: TransactorConfig { add_gas_gwei: 0, add_gas_estimate_ratio: 0.0, gas_limit: 0 },
                    token_config: vec![TokenConfig {
                        token_name: "USDC".into(),
                        token_address: "0x0000000000000000000000000000000000000004".into(),
                        token_decimal: 18,
                    }],
                },
            ],
        }
    }

    #[test]
    fn builds_pair_with_rescaled_amount_and_fee() {
        let now = Utc::now();
        let event = TransferOutEvent {
            transfer_id: B256::repeat_byte(0x01),
            sender: Address::repeat_byte(0x02),
            receiver: Address::repeat_byte(0x03),
            dst_address: Address::repeat_byte(0x06),
            token: "0x0000000000000000000000000000000000000002".parse().unwrap(),
            amount: U256::from(1_000_000u64), // 1 USDC at 6 decimals
            hashlock: B256::repeat_byte(0x04),
            timelock: now + Duration::hours(24),
            dst_chain_id: 2,
            tx_hash: B256::repeat_byte(0x05),
        };

        let (out_row, in_row) = build_transfer_pair(&event, 1, &cfg(), now).unwrap();
        let in_row = in_row.expect("margin above floor must seed an IN row");

        assert_eq!(out_row.status, TransferStatus::Locked);
        assert_eq!(in_row.status, TransferStatus::TransferInStart);
        assert_eq!(in_row.related_tid, out_row.transfer_id);
        assert_eq!(out_row.related_tid, in_row.transfer_id);

        let expected_scaled = U256::from(1_000_000_000_000_000_000u128);
        let expected_fee = expected_scaled / U256::from(1000u64);
        assert_eq!(in_row.fee, expected_fee);
        assert_eq!(in_row.amount, expected_scaled - expected_fee);
        assert_eq!(in_row.timelock, event.timelock - Duration::hours(IN_TIMELOCK_SHAVE_HOURS));
    }

    #[test]
    fn too_small_margin_still_locks_out_leg_but_skips_in_leg() {
        let now = Utc::now();
        let mut event = TransferOutEvent {
            transfer_id: B256::repeat_byte(0x01),
            sender: Address::repeat_byte(0x02),
            receiver: Address::repeat_byte(0x03),
            dst_address: Address::repeat_byte(0x06),
            token: "0x0000000000000000000000000000000000000002".parse().unwrap(),
            amount: U256::from(1u64),
            hashlock: B256::repeat_byte(0x04),
            timelock: now + Duration::minutes(10),
            dst_chain_id: 2,
            tx_hash: B256::ZERO,
        };
        let (out_row, in_row) = build_transfer_pair(&event, 1, &cfg(), now).unwrap();
        assert_eq!(out_row.status, TransferStatus::Locked);
        assert!(in_row.is_none());

        // Comfortably above the 16h floor now seeds the IN leg.
        event.timelock = now + Duration::hours(20);
        let (_, in_row) = build_transfer_pair(&event, 1, &cfg(), now).unwrap();
        assert!(in_row.is_some());
    }
}
