use alloy_primitives::{keccak256, Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{TransferStatus, TransferType};

/// One leg of a cross-chain HTLC swap.
///
/// A user's single swap produces two rows: an OUT row on the source chain and
/// an IN row on the destination chain, linked by `related_tid`. See spec §3
/// for the full invariant list; `(transfer_id, chain_id)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: B256,
    pub chain_id: u64,
    pub token: Address,
    pub amount: U256,
    pub fee: U256,
    pub transfer_type: TransferType,
    pub status: TransferStatus,
    pub hashlock: B256,
    pub timelock: DateTime<Utc>,
    pub related_tid: B256,
    pub related_chain_id: u64,
    pub related_token: Address,
    /// Zero until the preimage is revealed on either leg.
    pub preimage: B256,
    pub sender: Address,
    pub receiver: Address,
    pub tx_hash: B256,
    pub tx_confirm_hash: B256,
    pub tx_refund_hash: B256,
    pub transfer_gas_cost: U256,
    pub confirm_gas_cost: U256,
    pub refund_gas_cost: U256,
    pub update_ts: DateTime<Utc>,
    pub create_ts: DateTime<Utc>,
}

impl Transfer {
    /// `true` once the preimage has been observed (set by the Confirmed
    /// handler on both legs via `set_related_preimage`).
    pub fn has_preimage(&self) -> bool {
        self.preimage != B256::ZERO
    }
}

/// Derives the IN leg's `transfer_id` the way the contract derives its own:
/// `keccak256(abi.encodePacked(sender, receiver, hashlock, chainId))`, with
/// `sender`/`receiver` as 20 bytes, `hashlock` as 32 bytes, and `chainId` as a
/// 32-byte big-endian integer. Built from primitives (not a source-specific
/// ABI helper) so it stays bit-identical to the Solidity packing regardless of
/// which chain library touches it next.
pub fn derive_in_transfer_id(sender: Address, receiver: Address, hashlock: B256, dst_chain_id: u64) -> B256 {
    let mut buf = Vec::with_capacity(20 + 20 + 32 + 32);
    buf.extend_from_slice(sender.as_slice());
    buf.extend_from_slice(receiver.as_slice());
    buf.extend_from_slice(hashlock.as_slice());
    buf.extend_from_slice(&U256::from(dst_chain_id).to_be_bytes::<32>());
    keccak256(&buf)
}
