use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_types::{Transfer, TransferStatus, TransferType};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::error::StoreError;

/// Persistence boundary for [`Transfer`] rows and per-(chain, event) monitor
/// cursors. All status moves that can race with another writer go through
/// [`TransferStore::transition`], a compare-and-swap on `(tid, chain_id,
/// status)` so retries are idempotent: a handler that reruns after a crash
/// just finds the `WHERE status = from` clause already false and moves on.
#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn insert_transfer(&self, transfer: &Transfer) -> Result<bool, StoreError>;

    /// Inserts an OUT row and its IN sibling atomically: a lone IN row with
    /// no OUT sibling would be startable with nothing to refund against, so
    /// both rows land in one transaction or neither does.
    async fn insert_transfer_pair(&self, out_row: &Transfer, in_row: &Transfer) -> Result<(), StoreError>;

    async fn get_by_tid(&self, tid: B256, chain_id: u64) -> Result<Option<Transfer>, StoreError>;

    async fn get_by_related_tid(&self, related_tid: B256, related_chain_id: u64) -> Result<Option<Transfer>, StoreError>;

    async fn get_all(&self) -> Result<Vec<Transfer>, StoreError>;

    async fn get_all_with_limit(&self, limit: i64) -> Result<Vec<Transfer>, StoreError>;

    /// CAS status move; returns `true` if the row existed in `from` and was moved to `to`.
    async fn transition(&self, tid: B256, chain_id: u64, from: TransferStatus, to: TransferStatus) -> Result<bool, StoreError>;

    /// CAS variant for `LogNewTransferIn`: the row may still be
    /// `TransferInStart` if the event is observed before the send loop's own
    /// `TransferInStart -> TransferInPending` CAS lands (no ordering
    /// guarantee between the two), so this accepts either status as `from`
    /// instead of requiring exactly one.
    async fn record_transfer_in(&self, tid: B256, chain_id: u64, to: TransferStatus) -> Result<bool, StoreError>;

    async fn set_related_preimage(&self, related_tid: B256, related_chain_id: u64, preimage: B256) -> Result<(), StoreError>;

    async fn set_transfer_in_amount_and_fee(&self, tid: B256, chain_id: u64, amount: U256, fee: U256) -> Result<(), StoreError>;

    async fn confirm_transfer(&self, tid: B256, chain_id: u64, tx_confirm_hash: B256, gas_cost: U256, preimage: B256) -> Result<(), StoreError>;

    async fn refund_transfer(&self, tid: B256, chain_id: u64, tx_refund_hash: B256, gas_cost: U256) -> Result<(), StoreError>;

    async fn set_transfer_lock_tx(&self, tid: B256, chain_id: u64, tx_hash: B256, gas_cost: U256) -> Result<(), StoreError>;

    /// Records a confirm/refund tx hash and gas cost without moving `status`
    /// — used while the send is merely accepted, not yet confirmed by an
    /// event or a direct view call.
    async fn set_confirm_tx(&self, tid: B256, chain_id: u64, tx_confirm_hash: B256, gas_cost: U256) -> Result<(), StoreError>;

    async fn set_refund_tx(&self, tid: B256, chain_id: u64, tx_refund_hash: B256, gas_cost: U256) -> Result<(), StoreError>;

    /// Rows an IN leg can be created in: `TransferInStart` seeded by the OUT
    /// event handler, waiting for `processTrySendTransferIn`.
    async fn scan_startable_transfer_in(&self) -> Result<Vec<Transfer>, StoreError>;

    /// `Locked` IN rows whose hashlock has a revealed preimage and are ready for `confirm`.
    async fn scan_confirmable_locked(&self) -> Result<Vec<Transfer>, StoreError>;

    /// `Locked` OUT/IN rows past their timelock with no sibling confirmation yet.
    async fn scan_refundable_transfer_in(&self) -> Result<Vec<Transfer>, StoreError>;

    /// Rows stuck in a `*Pending` state past the recovery timeout: the relay
    /// crashed or the RPC call never landed, and the next loop tick must
    /// re-derive truth from the chain instead of trusting the in-flight flag.
    async fn scan_recover_timeout_pending(&self, pending: TransferStatus, older_than: DateTime<Utc>) -> Result<Vec<Transfer>, StoreError>;

    async fn get_monitor_block(&self, chain_id: u64, event_name: &str) -> Result<Option<(u64, u64)>, StoreError>;

    async fn upsert_monitor_block(&self, chain_id: u64, event_name: &str, block_num: u64, block_idx: u64) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(16).connect(dsn).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_transfer(row: &sqlx::postgres::PgRow) -> Result<Transfer, StoreError> {
    let tid: Vec<u8> = row.try_get("tid")?;
    let token: Vec<u8> = row.try_get("token")?;
    let hashlock: Vec<u8> = row.try_get("hashlock")?;
    let related_tid: Vec<u8> = row.try_get("related_tid")?;
    let related_token: Vec<u8> = row.try_get("related_token")?;
    let preimage: Vec<u8> = row.try_get("preimage")?;
    let sender: Vec<u8> = row.try_get("sender")?;
    let receiver: Vec<u8> = row.try_get("receiver")?;
    let tx_hash: Vec<u8> = row.try_get("tx_hash")?;
    let tx_confirm_hash: Vec<u8> = row.try_get("tx_confirm_hash")?;
    let tx_refund_hash: Vec<u8> = row.try_get("tx_refund_hash")?;

    let transfer_type: String = row.try_get("transfer_type")?;
    let status: String = row.try_get("status")?;

    Ok(Transfer {
        transfer_id: bytes_to_b256(&tid),
        chain_id: row.try_get::<i64, _>("chain_id")? as u64,
        token: bytes_to_address(&token),
        amount: numeric_to_u256(row.try_get("amount")?),
        fee: numeric_to_u256(row.try_get("fee")?),
        transfer_type: parse_transfer_type(&transfer_type),
        status: parse_status(&status),
        hashlock: bytes_to_b256(&hashlock),
        timelock: row.try_get("timelock")?,
        related_tid: bytes_to_b256(&related_tid),
        related_chain_id: row.try_get::<i64, _>("related_chain_id")? as u64,
        related_token: bytes_to_address(&related_token),
        preimage: bytes_to_b256(&preimage),
        sender: bytes_to_address(&sender),
        receiver: bytes_to_address(&receiver),
        tx_hash: bytes_to_b256(&tx_hash),
        tx_confirm_hash: bytes_to_b256(&tx_confirm_hash),
        tx_refund_hash: bytes_to_b256(&tx_refund_hash),
        transfer_gas_cost: numeric_to_u256(row.try_get("transfer_gas_cost")?),
        confirm_gas_cost: numeric_to_u256(row.try_get("confirm_gas_cost")?),
        refund_gas_cost: numeric_to_u256(row.try_get("refund_gas_cost")?),
        update_ts: row.try_get("update_ts")?,
        create_ts: row.try_get("create_ts")?,
    })
}

fn bytes_to_b256(raw: &[u8]) -> B256 {
    let mut out = [0u8; 32];
    let n = raw.len().min(32);
    out[..n].copy_from_slice(&raw[..n]);
    B256::from(out)
}

fn bytes_to_address(raw: &[u8]) -> Address {
    let mut out = [0u8; 20];
    let n = raw.len().min(20);
    out[..n].copy_from_slice(&raw[..n]);
    Address::from(out)
}

fn numeric_to_u256(raw: rust_decimal::Decimal) -> U256 {
    U256::from_str_radix(&raw.to_string(), 10).unwrap_or_default()
}

fn u256_to_numeric(value: U256) -> rust_decimal::Decimal {
    rust_decimal::Decimal::from_str_exact(&value.to_string()).unwrap_or_default()
}

fn status_str(status: TransferStatus) -> &'static str {
    match status {
        TransferStatus::TransferInStart => "transfer_in_start",
        TransferStatus::TransferInPending => "transfer_in_pending",
        TransferStatus::Locked => "locked",
        TransferStatus::ConfirmPending => "confirm_pending",
        TransferStatus::RefundPending => "refund_pending",
        TransferStatus::Confirmed => "confirmed",
        TransferStatus::Refunded => "refunded",
    }
}

fn parse_status(raw: &str) -> TransferStatus {
    match raw {
        "transfer_in_start" => TransferStatus::TransferInStart,
        "transfer_in_pending" => TransferStatus::TransferInPending,
        "locked" => TransferStatus::Locked,
        "confirm_pending" => TransferStatus::ConfirmPending,
        "refund_pending" => TransferStatus::RefundPending,
        "confirmed" => TransferStatus::Confirmed,
        "refunded" => TransferStatus::Refunded,
        other => panic!("unknown transfer status in db: {other}"),
    }
}

fn transfer_type_str(t: TransferType) -> &'static str {
    match t {
        TransferType::Out => "out",
        TransferType::In => "in",
    }
}

fn parse_transfer_type(raw: &str) -> TransferType {
    match raw {
        "out" => TransferType::Out,
        "in" => TransferType::In,
        other => panic!("unknown transfer type in db: {other}"),
    }
}

/// Builds the insert and runs it against any Postgres executor (a bare pool
/// for a standalone insert, or a transaction handle when two rows must land
/// together). Returns the number of rows actually inserted (0 under the
/// `ON CONFLICT DO NOTHING` race, 1 otherwise).
async fn exec_insert_transfer<'e, E>(t: &Transfer, exec: E) -> Result<u64, StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO transfer (
            tid, chain_id, token, amount, fee, transfer_type, status, hashlock, timelock,
            related_tid, related_chain_id, related_token, preimage, sender, receiver,
            tx_hash, tx_confirm_hash, tx_refund_hash,
            transfer_gas_cost, confirm_gas_cost, refund_gas_cost, update_ts, create_ts
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23)
        ON CONFLICT (tid, chain_id) DO NOTHING
        "#,
    )
    .bind(t.transfer_id.as_slice())
    .bind(t.chain_id as i64)
    .bind(t.token.as_slice())
    .bind(u256_to_numeric(t.amount))
    .bind(u256_to_numeric(t.fee))
    .bind(transfer_type_str(t.transfer_type))
    .bind(status_str(t.status))
    .bind(t.hashlock.as_slice())
    .bind(t.timelock)
    .bind(t.related_tid.as_slice())
    .bind(t.related_chain_id as i64)
    .bind(t.related_token.as_slice())
    .bind(t.preimage.as_slice())
    .bind(t.sender.as_slice())
    .bind(t.receiver.as_slice())
    .bind(t.tx_hash.as_slice())
    .bind(t.tx_confirm_hash.as_slice())
    .bind(t.tx_refund_hash.as_slice())
    .bind(u256_to_numeric(t.transfer_gas_cost))
    .bind(u256_to_numeric(t.confirm_gas_cost))
    .bind(u256_to_numeric(t.refund_gas_cost))
    .bind(t.update_ts)
    .bind(t.create_ts)
    .execute(exec)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait]
impl TransferStore for PgStore {
    async fn insert_transfer(&self, t: &Transfer) -> Result<bool, StoreError> {
        Ok(exec_insert_transfer(t, &self.pool).await? == 1)
    }

    async fn insert_transfer_pair(&self, out_row: &Transfer, in_row: &Transfer) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        exec_insert_transfer(out_row, &mut *tx).await?;
        exec_insert_transfer(in_row, &mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_by_tid(&self, tid: B256, chain_id: u64) -> Result<Option<Transfer>, StoreError> {
        let row = sqlx::query("SELECT * FROM transfer WHERE tid = $1 AND chain_id = $2")
            .bind(tid.as_slice())
            .bind(chain_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_transfer).transpose()
    }

    async fn get_by_related_tid(&self, related_tid: B256, related_chain_id: u64) -> Result<Option<Transfer>, StoreError> {
        let row = sqlx::query("SELECT * FROM transfer WHERE related_tid = $1 AND related_chain_id = $2")
            .bind(related_tid.as_slice())
            .bind(related_chain_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_transfer).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query("SELECT * FROM transfer ORDER BY create_ts DESC").fetch_all(&self.pool).await?;
        rows.iter().map(row_to_transfer).collect()
    }

    async fn get_all_with_limit(&self, limit: i64) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query("SELECT * FROM transfer ORDER BY create_ts DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    async fn transition(&self, tid: B256, chain_id: u64, from: TransferStatus, to: TransferStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE transfer SET status = $1, update_ts = now() WHERE tid = $2 AND chain_id = $3 AND status = $4",
        )
        .bind(status_str(to))
        .bind(tid.as_slice())
        .bind(chain_id as i64)
        .bind(status_str(from))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_related_preimage(&self, related_tid: B256, related_chain_id: u64, preimage: B256) -> Result<(), StoreError> {
        sqlx::query("UPDATE transfer SET preimage = $1, update_ts = now() WHERE related_tid = $2 AND related_chain_id = $3")
            .bind(preimage.as_slice())
            .bind(related_tid.as_slice())
            .bind(related_chain_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_transfer_in_amount_and_fee(&self, tid: B256, chain_id: u64, amount: U256, fee: U256) -> Result<(), StoreError> {
        sqlx::query("UPDATE transfer SET amount = $1, fee = $2, update_ts = now() WHERE tid = $3 AND chain_id = $4")
            .bind(u256_to_numeric(amount))
            .bind(u256_to_numeric(fee))
            .bind(tid.as_slice())
            .bind(chain_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_transfer_in(&self, tid: B256, chain_id: u64, to: TransferStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE transfer SET status = $1, update_ts = now() \
             WHERE tid = $2 AND chain_id = $3 AND status IN ($4, $5)",
        )
        .bind(status_str(to))
        .bind(tid.as_slice())
        .bind(chain_id as i64)
        .bind(status_str(TransferStatus::TransferInStart))
        .bind(status_str(TransferStatus::TransferInPending))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn confirm_transfer(&self, tid: B256, chain_id: u64, tx_confirm_hash: B256, gas_cost: U256, preimage: B256) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfer SET status = $1, tx_confirm_hash = $2, confirm_gas_cost = $3, preimage = $4, update_ts = now() \
             WHERE tid = $5 AND chain_id = $6",
        )
        .bind(status_str(TransferStatus::Confirmed))
        .bind(tx_confirm_hash.as_slice())
        .bind(u256_to_numeric(gas_cost))
        .bind(preimage.as_slice())
        .bind(tid.as_slice())
        .bind(chain_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn refund_transfer(&self, tid: B256, chain_id: u64, tx_refund_hash: B256, gas_cost: U256) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfer SET status = $1, tx_refund_hash = $2, refund_gas_cost = $3, update_ts = now() \
             WHERE tid = $4 AND chain_id = $5",
        )
        .bind(status_str(TransferStatus::Refunded))
        .bind(tx_refund_hash.as_slice())
        .bind(u256_to_numeric(gas_cost))
        .bind(tid.as_slice())
        .bind(chain_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_transfer_lock_tx(&self, tid: B256, chain_id: u64, tx_hash: B256, gas_cost: U256) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfer SET tx_hash = $1, transfer_gas_cost = $2, update_ts = now() WHERE tid = $3 AND chain_id = $4",
        )
        .bind(tx_hash.as_slice())
        .bind(u256_to_numeric(gas_cost))
        .bind(tid.as_slice())
        .bind(chain_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_confirm_tx(&self, tid: B256, chain_id: u64, tx_confirm_hash: B256, gas_cost: U256) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfer SET tx_confirm_hash = $1, confirm_gas_cost = $2, update_ts = now() WHERE tid = $3 AND chain_id = $4",
        )
        .bind(tx_confirm_hash.as_slice())
        .bind(u256_to_numeric(gas_cost))
        .bind(tid.as_slice())
        .bind(chain_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_refund_tx(&self, tid: B256, chain_id: u64, tx_refund_hash: B256, gas_cost: U256) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE transfer SET tx_refund_hash = $1, refund_gas_cost = $2, update_ts = now() WHERE tid = $3 AND chain_id = $4",
        )
        .bind(tx_refund_hash.as_slice())
        .bind(u256_to_numeric(gas_cost))
        .bind(tid.as_slice())
        .bind(chain_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn scan_startable_transfer_in(&self) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM transfer WHERE transfer_type = 'in' AND status = $1 \
             AND timelock > now() + interval '1 hour'",
        )
        .bind(status_str(TransferStatus::TransferInStart))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    async fn scan_confirmable_locked(&self) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM transfer WHERE transfer_type = 'in' AND status = $1 AND preimage <> $2",
        )
        .bind(status_str(TransferStatus::Locked))
        .bind(B256::ZERO.as_slice())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    async fn scan_refundable_transfer_in(&self) -> Result<Vec<Transfer>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM transfer WHERE transfer_type = 'in' AND status = $1 AND timelock < now()",
        )
        .bind(status_str(TransferStatus::Locked))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    async fn scan_recover_timeout_pending(&self, pending: TransferStatus, older_than: DateTime<Utc>) -> Result<Vec<Transfer>, StoreError> {
        // RefundPending rows are expected to already be past their timelock —
        // that's why they're being refunded — so the margin guard only
        // applies to the other two pending states, where recovering a row
        // whose timelock is about to expire would hand it right back to a
        // loop that might not get another chance to send before it does.
        let query = if pending == TransferStatus::RefundPending {
            "SELECT * FROM transfer WHERE status = $1 AND update_ts < $2"
        } else {
            "SELECT * FROM transfer WHERE status = $1 AND update_ts < $2 AND timelock > now() + interval '6 minutes'"
        };
        let rows = sqlx::query(query)
            .bind(status_str(pending))
            .bind(older_than)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    async fn get_monitor_block(&self, chain_id: u64, event_name: &str) -> Result<Option<(u64, u64)>, StoreError> {
        let row = sqlx::query("SELECT block_num, block_idx FROM monitor WHERE chain_id = $1 AND event_name = $2")
            .bind(chain_id as i64)
            .bind(event_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| (r.get::<i64, _>("block_num") as u64, r.get::<i64, _>("block_idx") as u64)))
    }

    async fn upsert_monitor_block(&self, chain_id: u64, event_name: &str, block_num: u64, block_idx: u64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO monitor (chain_id, event_name, block_num, block_idx) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (chain_id, event_name) DO UPDATE SET block_num = $3, block_idx = $4",
        )
        .bind(chain_id as i64)
        .bind(event_name)
        .bind(block_num as i64)
        .bind(block_idx as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
