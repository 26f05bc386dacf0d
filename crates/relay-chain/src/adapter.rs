use std::sync::Arc;
use std::time::Duration;

use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, U256};
use alloy_provider::{PendingTransactionBuilder, Provider, ProviderBuilder};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relay_store::TransferStore;
use relay_types::RemoteStatus;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use crate::abi::IERC20;
use crate::abi::IHtlcBridge::{self, IHtlcBridgeInstance};
use crate::error::ChainError;

/// How long a view call (`transfers`, `allowance`) is allowed to hang before
/// the caller gives up on this tick and retries on the next one.
const VIEW_CALL_TIMEOUT: Duration = Duration::from_secs(4);

/// How long `ensure_approved`'s bootstrap waits for its `approve` to be
/// mined before giving up — this one call runs once at startup, off the hot
/// path, so it can afford to block on inclusion rather than detach.
const APPROVE_INCLUSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Re-approve once the remaining allowance drops below half of `MAX_UINT256`,
/// the same headroom the approval bootstrap this mirrors uses.
fn needs_approval(allowance: U256) -> bool {
    allowance < U256::MAX / U256::from(2u8)
}

/// Outcome of a state-changing contract call: the relay only ever needs the
/// hash (to persist) and the gas actually burned (for the cost ledger), never
/// the full receipt.
#[derive(Debug, Clone, Copy)]
pub struct SentTx {
    pub tx_hash: B256,
    pub gas_cost: U256,
}

/// One chain's RPC + signing surface. The spec requires that all
/// state-changing calls on a chain go through a single writer so nonces never
/// race; `tx_lock` is that discipline, held for the whole send-and-wait.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> u64;

    #[allow(clippy::too_many_arguments)]
    async fn transfer_in(
        &self,
        transfer_id: B256,
        token: Address,
        amount: U256,
        sender: Address,
        receiver: Address,
        hashlock: B256,
        timelock_unix: u64,
        src_chain_id: u64,
        src_transfer_id: B256,
    ) -> Result<SentTx, ChainError>;

    async fn confirm(&self, transfer_id: B256, preimage: B256) -> Result<SentTx, ChainError>;

    async fn refund(&self, transfer_id: B256) -> Result<SentTx, ChainError>;

    async fn remote_status(&self, transfer_id: B256) -> Result<RemoteStatus, ChainError>;

    /// The relay's own token balance on this chain, reported to the gateway
    /// on every heartbeat so it can route volume away from a relay that's
    /// run dry on a given token.
    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError>;
}

type AlloyProvider = alloy_provider::fillers::FillProvider<
    alloy_provider::fillers::JoinFill<
        alloy_provider::Identity,
        alloy_provider::fillers::WalletFiller<EthereumWallet>,
    >,
    alloy_provider::RootProvider<alloy_transport_http::Http<reqwest::Client>>,
    alloy_transport_http::Http<reqwest::Client>,
    alloy_network::Ethereum,
>;

pub struct EvmChainAdapter {
    chain_id: u64,
    contract: IHtlcBridgeInstance<alloy_transport_http::Http<reqwest::Client>, Arc<AlloyProvider>>,
    provider: Arc<AlloyProvider>,
    contract_address: Address,
    tx_lock: Mutex<()>,
    store: Arc<dyn TransferStore>,
}

impl EvmChainAdapter {
    pub fn new(chain_id: u64, endpoint: Url, signer: PrivateKeySigner, contract_address: Address, store: Arc<dyn TransferStore>) -> Self {
        let wallet = EthereumWallet::from(signer);
        let provider = Arc::new(
            ProviderBuilder::new()
                .with_recommended_fillers()
                .wallet(wallet)
                .on_http(endpoint),
        );
        let contract = IHtlcBridge::new(contract_address, provider.clone());
        Self { chain_id, contract, provider, contract_address, tx_lock: Mutex::new(()), store }
    }

    /// Startup bootstrap: check the relay's own allowance on `token` for the
    /// bridge contract and top it up to `MAX_UINT256` if it has fallen below
    /// half that, so a busy relay never stalls `transferIn`/`confirm` mid-tick
    /// on an approval it could have issued once at boot.
    pub async fn ensure_approved(&self, token: Address, owner: Address) -> Result<(), ChainError> {
        let erc20 = IERC20::new(token, self.provider.clone());

        let allowance = tokio::time::timeout(VIEW_CALL_TIMEOUT, erc20.allowance(owner, self.contract_address).call())
            .await
            .map_err(|_| ChainError::Timeout("allowance view call timed out".into()))??
            ._0;

        if !needs_approval(allowance) {
            return Ok(());
        }

        info!(chain_id = self.chain_id, %token, "approving bridge contract for max allowance");
        let _guard = self.tx_lock.lock().await;
        let pending = erc20.approve(self.contract_address, U256::MAX).send().await?;
        tokio::time::timeout(APPROVE_INCLUSION_TIMEOUT, pending.get_receipt())
            .await
            .map_err(|_| ChainError::Timeout("approve transaction never mined".into()))??;
        Ok(())
    }

    /// Awaits the receipt in the background and records the realized gas
    /// cost once mined. Best-effort: a dropped or never-mined transaction
    /// just leaves the cost column at zero, which the recovery loop's direct
    /// view call will eventually reconcile via `remote_status`.
    fn spawn_gas_cost_watcher<F>(
        &self,
        pending: PendingTransactionBuilder<alloy_transport_http::Http<reqwest::Client>, alloy_network::Ethereum>,
        transfer_id: B256,
        write: F,
    ) where
        F: FnOnce(Arc<dyn TransferStore>, B256, u64, B256, U256) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + 'static,
    {
        let store = self.store.clone();
        let chain_id = self.chain_id;
        tokio::spawn(async move {
            match pending.get_receipt().await {
                Ok(receipt) => write(store, transfer_id, chain_id, receipt.transaction_hash, gas_cost_from_receipt(&receipt)).await,
                Err(err) => warn!(%transfer_id, %err, "never observed a receipt for sent transaction"),
            }
        });
    }
}

#[async_trait]
impl ChainAdapter for EvmChainAdapter {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Returns as soon as the node accepts the transaction, not once it is
    /// mined — the caller's row stays `TransferInPending` until an event or a
    /// recovered view call finalizes it.
    async fn transfer_in(
        &self,
        transfer_id: B256,
        token: Address,
        amount: U256,
        sender: Address,
        receiver: Address,
        hashlock: B256,
        timelock_unix: u64,
        src_chain_id: u64,
        src_transfer_id: B256,
    ) -> Result<SentTx, ChainError> {
        let _guard = self.tx_lock.lock().await;
        let call = self.contract.transferIn(
            transfer_id,
            token,
            amount,
            sender,
            receiver,
            hashlock,
            timelock_unix,
            src_chain_id,
            src_transfer_id,
        );
        let pending = call.send().await?;
        let tx_hash = *pending.tx_hash();
        self.spawn_gas_cost_watcher(pending, transfer_id, |store, tid, chain_id, tx_hash, gas_cost| {
            Box::pin(async move {
                let _ = store.set_transfer_lock_tx(tid, chain_id, tx_hash, gas_cost).await;
            })
        });
        Ok(SentTx { tx_hash, gas_cost: U256::ZERO })
    }

    async fn confirm(&self, transfer_id: B256, preimage: B256) -> Result<SentTx, ChainError> {
        let _guard = self.tx_lock.lock().await;
        let pending = self.contract.confirm(transfer_id, preimage).send().await?;
        let tx_hash = *pending.tx_hash();
        self.spawn_gas_cost_watcher(pending, transfer_id, |store, tid, chain_id, tx_hash, gas_cost| {
            Box::pin(async move {
                let _ = store.set_confirm_tx(tid, chain_id, tx_hash, gas_cost).await;
            })
        });
        Ok(SentTx { tx_hash, gas_cost: U256::ZERO })
    }

    async fn refund(&self, transfer_id: B256) -> Result<SentTx, ChainError> {
        let _guard = self.tx_lock.lock().await;
        let pending = self.contract.refund(transfer_id).send().await?;
        let tx_hash = *pending.tx_hash();
        self.spawn_gas_cost_watcher(pending, transfer_id, |store, tid, chain_id, tx_hash, gas_cost| {
            Box::pin(async move {
                let _ = store.set_refund_tx(tid, chain_id, tx_hash, gas_cost).await;
            })
        });
        Ok(SentTx { tx_hash, gas_cost: U256::ZERO })
    }

    async fn remote_status(&self, transfer_id: B256) -> Result<RemoteStatus, ChainError> {
        let status = tokio::time::timeout(VIEW_CALL_TIMEOUT, self.contract.transfers(transfer_id).call())
            .await
            .map_err(|_| ChainError::Timeout("transfers view call timed out".into()))??
            ._0;
        Ok(RemoteStatus::try_from(status)?)
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let erc20 = IERC20::new(token, self.provider.clone());
        let balance = tokio::time::timeout(VIEW_CALL_TIMEOUT, erc20.balanceOf(owner).call())
            .await
            .map_err(|_| ChainError::Timeout("balanceOf view call timed out".into()))??
            ._0;
        Ok(balance)
    }
}

/// `gasUsed * effectiveGasPrice` when the node reports both; zero otherwise
/// rather than failing the whole call over a cosmetic cost figure.
fn gas_cost_from_receipt(receipt: &alloy_rpc_types_eth::TransactionReceipt) -> U256 {
    let gas_used = U256::from(receipt.gas_used);
    let price = receipt.effective_gas_price.map(U256::from).unwrap_or_default();
    gas_used.saturating_mul(price)
}
