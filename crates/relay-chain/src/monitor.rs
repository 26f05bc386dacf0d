use alloy_primitives::{Address, B256, U256};
use alloy_provider::{Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::Filter;
use alloy_sol_types::SolEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

use crate::abi::IHtlcBridge::{LogConfirm, LogNewTransferIn, LogNewTransferOut, LogRefund};
use crate::error::ChainError;

/// A decoded bridge event plus the cursor position it was found at. The
/// consumer persists `(block_num, log_index)` after it has durably handled
/// the event — never before — so a crash mid-handling just replays the same
/// log on restart instead of silently skipping it.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    NewTransferOut {
        transfer_id: B256,
        sender: Address,
        receiver: Address,
        /// The actual recipient on the destination chain — distinct from
        /// `receiver`, which is the relay's own address on the source chain.
        dst_address: Address,
        token: Address,
        amount: U256,
        hashlock: B256,
        timelock: u64,
        dst_chain_id: u64,
        tx_hash: B256,
        block_num: u64,
        log_index: u64,
    },
    NewTransferIn {
        transfer_id: B256,
        sender: Address,
        receiver: Address,
        token: Address,
        amount: U256,
        hashlock: B256,
        timelock: u64,
        src_chain_id: u64,
        src_transfer_id: B256,
        tx_hash: B256,
        block_num: u64,
        log_index: u64,
    },
    Confirm {
        transfer_id: B256,
        preimage: B256,
        tx_hash: B256,
        block_num: u64,
        log_index: u64,
    },
    Refund {
        transfer_id: B256,
        tx_hash: B256,
        block_num: u64,
        log_index: u64,
    },
}

impl BridgeEvent {
    pub fn cursor(&self) -> (u64, u64) {
        match self {
            Self::NewTransferOut { block_num, log_index, .. }
            | Self::NewTransferIn { block_num, log_index, .. }
            | Self::Confirm { block_num, log_index, .. }
            | Self::Refund { block_num, log_index, .. } => (*block_num, *log_index),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NewTransferOut { .. } => "LogNewTransferOut",
            Self::NewTransferIn { .. } => "LogNewTransferIn",
            Self::Confirm { .. } => "LogConfirm",
            Self::Refund { .. } => "LogRefund",
        }
    }
}

/// Polls `eth_getLogs` for one chain's bridge contract on a fixed interval.
/// Read-only: no wallet, no nonce, nothing that needs the transactor's
/// single-writer discipline.
pub struct LogWatcher {
    provider: RootProvider<alloy_transport_http::Http<reqwest::Client>>,
    contract_address: Address,
    block_delay: u64,
    max_block_delta: u64,
}

impl LogWatcher {
    pub fn new(endpoint: Url, contract_address: Address, block_delay: u64, max_block_delta: u64) -> Self {
        let provider = ProviderBuilder::new().on_http(endpoint);
        Self { provider, contract_address, block_delay, max_block_delta }
    }

    /// Runs until the channel closes. `from_block` is the first block to
    /// (re)scan — typically one past the persisted cursor's block, or the
    /// cursor's own block to catch any log past the persisted index.
    pub async fn run(&self, mut from_block: u64, poll_interval: std::time::Duration, tx: mpsc::Sender<BridgeEvent>) -> Result<(), ChainError> {
        loop {
            let head = self.provider.get_block_number().await?;
            let safe_head = head.saturating_sub(self.block_delay);

            if safe_head >= from_block {
                let to_block = safe_head.min(from_block + self.max_block_delta);
                match self.scan_range(from_block, to_block).await {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                        from_block = to_block + 1;
                    }
                    Err(err) => warn!(error = %err, from_block, to_block, "log scan failed, retrying next tick"),
                }
            } else {
                debug!(safe_head, from_block, "no new confirmed blocks yet");
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    async fn scan_range(&self, from_block: u64, to_block: u64) -> Result<Vec<BridgeEvent>, ChainError> {
        let filter = Filter::new().address(self.contract_address).from_block(from_block).to_block(to_block);
        let logs = self.provider.get_logs(&filter).await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let block_num = log.block_number.unwrap_or(from_block);
            let log_index = log.log_index.unwrap_or(0);
            let tx_hash = log.transaction_hash.unwrap_or_default();
            let inner = log.inner.clone();

            if let Ok(decoded) = LogNewTransferOut::decode_log_data(&inner.data, true) {
                events.push(BridgeEvent::NewTransferOut {
                    transfer_id: decoded.transferId,
                    sender: decoded.sender,
                    receiver: decoded.receiver,
                    dst_address: decoded.dstAddress,
                    token: decoded.token,
                    amount: decoded.amount,
                    hashlock: decoded.hashlock,
                    timelock: decoded.timelock,
                    dst_chain_id: decoded.dstChainId,
                    tx_hash,
                    block_num,
                    log_index,
                });
            } else if let Ok(decoded) = LogNewTransferIn::decode_log_data(&inner.data, true) {
                events.push(BridgeEvent::NewTransferIn {
                    transfer_id: decoded.transferId,
                    sender: decoded.sender,
                    receiver: decoded.receiver,
                    token: decoded.token,
                    amount: decoded.amount,
                    hashlock: decoded.hashlock,
                    timelock: decoded.timelock,
                    src_chain_id: decoded.srcChainId,
                    src_transfer_id: decoded.srcTransferId,
                    tx_hash,
                    block_num,
                    log_index,
                });
            } else if let Ok(decoded) = LogConfirm::decode_log_data(&inner.data, true) {
                events.push(BridgeEvent::Confirm { transfer_id: decoded.transferId, preimage: decoded.preimage, tx_hash, block_num, log_index });
            } else if let Ok(decoded) = LogRefund::decode_log_data(&inner.data, true) {
                events.push(BridgeEvent::Refund { transfer_id: decoded.transferId, tx_hash, block_num, log_index });
            } else {
                warn!(?log_index, block_num, "log from bridge contract did not match any known event, skipping");
            }
        }

        Ok(events)
    }
}
