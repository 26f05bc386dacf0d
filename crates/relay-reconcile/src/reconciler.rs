use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use relay_chain::ChainAdapter;
use relay_store::TransferStore;
use relay_types::{RemoteStatus, TransferStatus};
use tracing::{error, info, warn};

use crate::error::ReconcileError;

/// How long a `*Pending` row may sit before the recovery loop stops trusting
/// the in-flight flag and asks the chain directly what actually happened.
/// Must exceed the time a real send can take (RPC latency + confirmations),
/// or the recovery loop would race the send that's still in flight.
const RECOVER_TIMEOUT_MINUTES: i64 = 15;

/// A `TransferInStart` row whose timelock is closer than this to expiry is
/// dropped rather than sent: there isn't enough runway left to land the
/// transaction, let alone confirm it, before the sender can reclaim the OUT
/// leg.
const SEND_TIMELOCK_MARGIN_MINUTES: i64 = 6;

/// Drives the four periodic loops that move transfers forward when no event
/// has (yet) done it for them: send the IN leg, confirm once a preimage is
/// known, refund once a timelock has passed, and recover rows stuck mid-send.
/// Each loop is event-driven-secondary: it only ever acts on what the store
/// and a direct chain view call agree is true, never on an assumption.
pub struct Reconciler {
    store: Arc<dyn TransferStore>,
    adapters: HashMap<u64, Arc<dyn ChainAdapter>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn TransferStore>, adapters: HashMap<u64, Arc<dyn ChainAdapter>>) -> Self {
        Self { store, adapters }
    }

    fn adapter(&self, chain_id: u64) -> Result<&Arc<dyn ChainAdapter>, ReconcileError> {
        self.adapters.get(&chain_id).ok_or(ReconcileError::UnknownChain(chain_id))
    }

    pub fn spawn_all(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tokio::spawn(run_loop("send-transfer-in", StdDuration::from_secs(10), self.clone(), Self::process_try_send_transfer_in)),
            tokio::spawn(run_loop("confirm-transfer", StdDuration::from_secs(10), self.clone(), Self::process_try_confirm_transfer)),
            tokio::spawn(run_loop("refund-transfer", StdDuration::from_secs(60), self.clone(), Self::process_try_refund_transfer_in)),
            tokio::spawn(run_loop("recover-pending", StdDuration::from_secs(120), self.clone(), Self::process_recover_timeout_pending)),
        ]
    }

    /// `TransferInStart` rows: lock the destination leg by calling `transferIn`.
    ///
    /// A successful send only means the call was accepted, not that it was
    /// mined — the row stays in `TransferInPending` until the `LogNewTransferIn`
    /// event (primary) or [`process_recover_timeout_pending`](Self::process_recover_timeout_pending)'s
    /// direct view call (secondary) confirms it actually landed.
    pub async fn process_try_send_transfer_in(&self) -> Result<(), ReconcileError> {
        for t in self.store.scan_startable_transfer_in().await? {
            if t.timelock - Utc::now() < ChronoDuration::minutes(SEND_TIMELOCK_MARGIN_MINUTES) {
                warn!(tid = %t.transfer_id, chain_id = t.chain_id, "timelock too close to expiry, dropping instead of sending");
                continue;
            }

            if !self.store.transition(t.transfer_id, t.chain_id, TransferStatus::TransferInStart, TransferStatus::TransferInPending).await? {
                continue; // another tick (or crash-recovery) already claimed this row
            }

            let adapter = match self.adapter(t.chain_id) {
                Ok(a) => a,
                Err(err) => {
                    error!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "cannot send transfer in");
                    continue;
                }
            };

            match adapter
                .transfer_in(t.transfer_id, t.token, t.amount, t.sender, t.receiver, t.hashlock, t.timelock.timestamp() as u64, t.related_chain_id, t.related_tid)
                .await
            {
                Ok(sent) => {
                    self.store.set_transfer_lock_tx(t.transfer_id, t.chain_id, sent.tx_hash, sent.gas_cost).await?;
                    info!(tid = %t.transfer_id, chain_id = t.chain_id, "transfer in accepted, awaiting confirmation");
                }
                Err(err) => {
                    warn!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "transfer in send failed, will recover on timeout");
                }
            }
        }
        Ok(())
    }

    /// `Locked` IN rows whose hashlock preimage has been revealed by the sibling confirm.
    /// As with `transfer_in`, acceptance moves the row to `ConfirmPending` only;
    /// finalization to `Confirmed` waits for the `LogConfirm` event or a recovered view call.
    pub async fn process_try_confirm_transfer(&self) -> Result<(), ReconcileError> {
        for t in self.store.scan_confirmable_locked().await? {
            if !self.store.transition(t.transfer_id, t.chain_id, TransferStatus::Locked, TransferStatus::ConfirmPending).await? {
                continue;
            }

            let adapter = match self.adapter(t.chain_id) {
                Ok(a) => a,
                Err(err) => {
                    error!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "cannot confirm transfer");
                    continue;
                }
            };

            match adapter.confirm(t.transfer_id, t.preimage).await {
                Ok(sent) => {
                    self.store.set_confirm_tx(t.transfer_id, t.chain_id, sent.tx_hash, sent.gas_cost).await?;
                    info!(tid = %t.transfer_id, chain_id = t.chain_id, "confirm accepted, awaiting confirmation");
                }
                Err(err) => {
                    warn!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "confirm send failed, will recover on timeout");
                }
            }
        }
        Ok(())
    }

    /// `Locked` rows past their timelock. A row is only refunded once its
    /// sibling leg is confirmed not to hold a valid preimage — the receiver
    /// may have confirmed the other leg moments before the timelock expired,
    /// and refunding anyway would let the sender double-collect.
    pub async fn process_try_refund_transfer_in(&self) -> Result<(), ReconcileError> {
        for t in self.store.scan_refundable_transfer_in().await? {
            if let Some(sibling) = self.store.get_by_related_tid(t.transfer_id, t.chain_id).await? {
                if sibling.has_preimage() || sibling.status == TransferStatus::Confirmed {
                    warn!(tid = %t.transfer_id, chain_id = t.chain_id, "sibling already confirmed, refusing to refund");
                    continue;
                }
            }

            if !self.store.transition(t.transfer_id, t.chain_id, TransferStatus::Locked, TransferStatus::RefundPending).await? {
                continue;
            }

            let adapter = match self.adapter(t.chain_id) {
                Ok(a) => a,
                Err(err) => {
                    error!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "cannot refund transfer");
                    continue;
                }
            };

            match adapter.refund(t.transfer_id).await {
                Ok(sent) => {
                    self.store.set_refund_tx(t.transfer_id, t.chain_id, sent.tx_hash, sent.gas_cost).await?;
                    info!(tid = %t.transfer_id, chain_id = t.chain_id, "refund accepted, awaiting confirmation");
                }
                Err(err) => {
                    warn!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "refund send failed, will recover on timeout");
                }
            }
        }
        Ok(())
    }

    /// Rows stuck in a `*Pending` state longer than [`RECOVER_TIMEOUT_MINUTES`]:
    /// ask the chain directly what actually happened rather than assume the
    /// send failed (it may have landed and the relay crashed before recording it).
    pub async fn process_recover_timeout_pending(&self) -> Result<(), ReconcileError> {
        let cutoff = Utc::now() - ChronoDuration::minutes(RECOVER_TIMEOUT_MINUTES);

        for pending in [TransferStatus::TransferInPending, TransferStatus::ConfirmPending, TransferStatus::RefundPending] {
            for t in self.store.scan_recover_timeout_pending(pending, cutoff).await? {
                let adapter = match self.adapter(t.chain_id) {
                    Ok(a) => a,
                    Err(err) => {
                        error!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "cannot recover transfer");
                        continue;
                    }
                };

                let remote = match adapter.remote_status(t.transfer_id).await {
                    Ok(s) => s,
                    Err(err) => {
                        warn!(tid = %t.transfer_id, chain_id = t.chain_id, %err, "remote status check failed, will retry next tick");
                        continue;
                    }
                };

                let recovered = match (pending, remote) {
                    (TransferStatus::TransferInPending, RemoteStatus::Pending) => self.store.transition(t.transfer_id, t.chain_id, pending, TransferStatus::Locked).await?,
                    (TransferStatus::TransferInPending, RemoteStatus::Undefined) => self.store.transition(t.transfer_id, t.chain_id, pending, TransferStatus::TransferInStart).await?,
                    (TransferStatus::ConfirmPending, RemoteStatus::Confirmed) => {
                        self.store.confirm_transfer(t.transfer_id, t.chain_id, t.tx_confirm_hash, t.confirm_gas_cost, t.preimage).await?;
                        true
                    }
                    (TransferStatus::ConfirmPending, RemoteStatus::Pending) => self.store.transition(t.transfer_id, t.chain_id, pending, TransferStatus::Locked).await?,
                    (TransferStatus::RefundPending, RemoteStatus::Refunded) => {
                        self.store.refund_transfer(t.transfer_id, t.chain_id, t.tx_refund_hash, t.refund_gas_cost).await?;
                        true
                    }
                    (TransferStatus::RefundPending, RemoteStatus::Pending) => self.store.transition(t.transfer_id, t.chain_id, pending, TransferStatus::Locked).await?,
                    _ => false,
                };

                if recovered {
                    info!(tid = %t.transfer_id, chain_id = t.chain_id, ?pending, ?remote, "recovered stuck transfer");
                }
            }
        }
        Ok(())
    }
}

async fn run_loop<F, Fut>(name: &'static str, period: StdDuration, reconciler: Arc<Reconciler>, f: F)
where
    F: Fn(&Reconciler) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), ReconcileError>> + Send,
{
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if let Err(err) = f(&reconciler).await {
            error!(loop_name = name, %err, "reconciler loop tick failed");
        }
    }
}
