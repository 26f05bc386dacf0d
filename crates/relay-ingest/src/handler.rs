use std::sync::Arc;

use chrono::Utc;
use relay_chain::BridgeEvent;
use relay_store::TransferStore;
use relay_types::{RelayConfig, TransferStatus};
use tracing::{info, warn};

use crate::error::IngestError;
use crate::seed::{build_transfer_pair, TransferOutEvent};

/// Result of handling one event: `retry == true` means the caller must not
/// advance the monitor cursor (a transient DB error, most likely); otherwise
/// the event is consumed — permanently, even if it could not be applied —
/// because replaying a malformed or unroutable event will never help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub consumed: bool,
    pub retry: bool,
}

impl Outcome {
    fn consumed() -> Self {
        Self { consumed: true, retry: false }
    }

    fn retry() -> Self {
        Self { consumed: false, retry: true }
    }
}

pub struct EventIngestor {
    store: Arc<dyn TransferStore>,
    config: RelayConfig,
}

impl EventIngestor {
    pub fn new(store: Arc<dyn TransferStore>, config: RelayConfig) -> Self {
        Self { store, config }
    }

    pub async fn handle(&self, src_chain_id: u64, event: &BridgeEvent) -> Outcome {
        let result = match event {
            BridgeEvent::NewTransferOut { .. } => self.handle_transfer_out(src_chain_id, event).await,
            BridgeEvent::NewTransferIn { .. } => self.handle_transfer_in(src_chain_id, event).await,
            BridgeEvent::Confirm { .. } => self.handle_confirm(src_chain_id, event).await,
            BridgeEvent::Refund { .. } => self.handle_refund(src_chain_id, event).await,
        };

        match result {
            Ok(()) => Outcome::consumed(),
            Err(err) if err.should_retry() => {
                warn!(error = %err, event = event.name(), "retryable error handling event, cursor held back");
                Outcome::retry()
            }
            Err(err) => {
                warn!(error = %err, event = event.name(), "event could not be applied, consuming anyway");
                Outcome::consumed()
            }
        }
    }

    async fn handle_transfer_out(&self, src_chain_id: u64, event: &BridgeEvent) -> Result<(), IngestError> {
        let BridgeEvent::NewTransferOut { transfer_id, sender, receiver, dst_address, token, amount, hashlock, timelock, dst_chain_id, tx_hash, .. } = *event
        else {
            unreachable!()
        };

        let out_event = TransferOutEvent {
            transfer_id,
            sender,
            receiver,
            dst_address,
            token,
            amount,
            hashlock,
            timelock: chrono::DateTime::<Utc>::from_timestamp(timelock as i64, 0).unwrap_or(Utc::now()),
            dst_chain_id,
            tx_hash,
        };

        let (out_row, in_row) = build_transfer_pair(&out_event, src_chain_id, &self.config, Utc::now())?;
        match in_row {
            Some(in_row) => {
                self.store.insert_transfer_pair(&out_row, &in_row).await?;
                info!(transfer_id = %transfer_id, in_tid = %in_row.transfer_id, "seeded transfer pair");
            }
            None => {
                self.store.insert_transfer(&out_row).await?;
                info!(transfer_id = %transfer_id, "seeded OUT leg only, timelock margin too small for an IN leg");
            }
        }
        Ok(())
    }

    async fn handle_transfer_in(&self, chain_id: u64, event: &BridgeEvent) -> Result<(), IngestError> {
        let BridgeEvent::NewTransferIn { transfer_id, tx_hash, .. } = *event else { unreachable!() };

        self.store.record_transfer_in(transfer_id, chain_id, TransferStatus::Locked).await?;
        self.store.set_transfer_lock_tx(transfer_id, chain_id, tx_hash, alloy_primitives::U256::ZERO).await?;
        Ok(())
    }

    async fn handle_confirm(&self, chain_id: u64, event: &BridgeEvent) -> Result<(), IngestError> {
        let BridgeEvent::Confirm { transfer_id, preimage, tx_hash, .. } = *event else { unreachable!() };

        if self.store.get_by_tid(transfer_id, chain_id).await?.is_some() {
            self.store.confirm_transfer(transfer_id, chain_id, tx_hash, alloy_primitives::U256::ZERO, preimage).await?;
            self.store.set_related_preimage(transfer_id, chain_id, preimage).await?;
        }
        Ok(())
    }

    async fn handle_refund(&self, chain_id: u64, event: &BridgeEvent) -> Result<(), IngestError> {
        let BridgeEvent::Refund { transfer_id, tx_hash, .. } = *event else { unreachable!() };
        self.store.refund_transfer(transfer_id, chain_id, tx_hash, alloy_primitives::U256::ZERO).await?;
        Ok(())
    }
}
