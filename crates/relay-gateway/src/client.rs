use alloy_primitives::{Address, B256, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use tonic::transport::Channel;
use tracing::info;

use crate::error::GatewayError;
use crate::proto::gateway_client::GatewayClient as RawClient;
use crate::proto::{ChainInfo, GetFeeRequest, PingRequest, TokenBalance};

/// One configured (chain, token) pair's balance, gathered fresh before every
/// heartbeat so the gateway always sees the relay's current capacity.
#[derive(Debug, Clone)]
pub struct TokenBalanceInfo {
    pub token_name: String,
    pub token_address: Address,
    pub balance: U256,
}

/// One chain's heartbeat payload: its advertised fee rate plus every
/// configured token's current balance on that chain.
#[derive(Debug, Clone)]
pub struct ChainHeartbeat {
    pub chain_id: u64,
    pub fee_rate: u32,
    pub balances: Vec<TokenBalanceInfo>,
}

/// A chain's gas price as reported back by the gateway's `PingResponse`.
#[derive(Debug, Clone, Copy)]
pub struct ChainGasInfo {
    pub chain_id: u64,
    pub gas_price: U256,
}

/// Thin wrapper over the generated gRPC client: registers the relay's
/// per-chain fee rate and token balances with the gateway on a heartbeat, and
/// looks up the fee quoted for a given OUT leg. One client per relay process,
/// shared across all chains' heartbeat loops.
pub struct GatewayClient {
    inner: RawClient<Channel>,
    signer: PrivateKeySigner,
    nickname: String,
    node_version: String,
}

impl GatewayClient {
    pub async fn connect(endpoint: impl Into<String>, signer: PrivateKeySigner, nickname: impl Into<String>) -> Result<Self, GatewayError> {
        let inner = RawClient::connect(endpoint.into()).await?;
        Ok(Self { inner, signer, nickname: nickname.into(), node_version: env!("CARGO_PKG_VERSION").to_owned() })
    }

    /// Heartbeats every configured chain's fee rate and token balances to the
    /// gateway in one call, signing the relay's address so the gateway can
    /// verify it is actually talking to the key it is about to route volume
    /// to. Grounded on the periodic `PingAndRefreshFee` cadence: a relay that
    /// stops pinging is assumed dead and routed around.
    pub async fn ping(&mut self, chains: &[ChainHeartbeat]) -> Result<Vec<ChainGasInfo>, GatewayError> {
        let eth_addr: Address = self.signer.address();
        let signature = self.signer.sign_message(eth_addr.as_slice()).await?.as_bytes().to_vec();

        let req = PingRequest {
            eth_addr: eth_addr.to_vec(),
            signature,
            nickname: self.nickname.clone(),
            node_version: self.node_version.clone(),
            chain_info: chains
                .iter()
                .map(|c| ChainInfo {
                    chain_id: c.chain_id,
                    fee_rate: c.fee_rate,
                    balances: c
                        .balances
                        .iter()
                        .map(|b| TokenBalance { token_name: b.token_name.clone(), token_address: b.token_address.to_vec(), balance: b.balance.to_be_bytes::<32>().to_vec() })
                        .collect(),
                })
                .collect(),
        };
        let resp = self.inner.ping(req).await?.into_inner();
        let chain_info = resp.chain_info.iter().map(|c| ChainGasInfo { chain_id: c.chain_id, gas_price: U256::from_be_slice(&c.gas_price) }).collect();
        info!(chains = chains.len(), ok = resp.ok, "pinged gateway");
        Ok(chain_info)
    }

    pub async fn get_fee(&mut self, transfer_out_id: B256) -> Result<U256, GatewayError> {
        let req = GetFeeRequest { transfer_out_id: transfer_out_id.to_vec() };
        let resp = self.inner.get_fee(req).await?.into_inner();
        Ok(U256::from_be_slice(&resp.fee))
    }
}
