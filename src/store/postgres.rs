//! Postgres-backed relay store
//!
//! The primary key on `(chain_id, tx_hash, log_index)` plus
//! `INSERT … ON CONFLICT DO NOTHING` makes `try_begin_relay` atomic across
//! tasks and across process instances: during a failover the second
//! instance loses the insert race and sees `AlreadyHandled`.

use std::str::FromStr;

use async_trait::async_trait;
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::RelayError;
use crate::types::{EventKey, EventKind, RelayEvent, RelayRecord, RelayStatus};

use super::{Admission, RelayStore};

/// SELECT columns for relay_records, casting NUMERIC to TEXT for sqlx.
const RECORD_SELECT: &str = r#"chain_id, tx_hash, log_index, kind, block_number, token,
    recipient, amount::TEXT as amount, status, outbound_tx_hash, attempts, last_error,
    created_at, updated_at"#;

/// Durable `RelayStore` on Postgres.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .wrap_err("Failed to connect to relay state database")?;
        Ok(Self { pool })
    }

    /// Run pending migrations (uses the migration files in migrations/).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .wrap_err("Failed to run database migrations")?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    chain_id: i64,
    tx_hash: String,
    log_index: i64,
    kind: String,
    block_number: i64,
    token: String,
    recipient: String,
    amount: String,
    status: String,
    outbound_tx_hash: Option<String>,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_record(self) -> Result<RelayRecord, RelayError> {
        let tx_hash = B256::from_str(&self.tx_hash)
            .map_err(|e| RelayError::Store(format!("bad tx_hash {}: {}", self.tx_hash, e)))?;
        let token = Address::from_str(&self.token)
            .map_err(|e| RelayError::Store(format!("bad token {}: {}", self.token, e)))?;
        let recipient = Address::from_str(&self.recipient)
            .map_err(|e| RelayError::Store(format!("bad recipient {}: {}", self.recipient, e)))?;
        let amount = U256::from_str(&self.amount)
            .map_err(|e| RelayError::Store(format!("bad amount {}: {}", self.amount, e)))?;
        let kind = EventKind::parse(&self.kind)
            .ok_or_else(|| RelayError::Store(format!("unknown event kind {}", self.kind)))?;
        let status = RelayStatus::parse(&self.status)
            .ok_or_else(|| RelayError::Store(format!("unknown status {}", self.status)))?;
        let outbound_tx_hash = match self.outbound_tx_hash {
            Some(h) => Some(
                B256::from_str(&h)
                    .map_err(|e| RelayError::Store(format!("bad outbound hash {}: {}", h, e)))?,
            ),
            None => None,
        };

        Ok(RelayRecord {
            key: EventKey {
                chain_id: self.chain_id as u64,
                tx_hash,
                log_index: self.log_index as u64,
            },
            kind,
            block_number: self.block_number as u64,
            token,
            recipient,
            amount,
            status,
            outbound_tx_hash,
            attempts: self.attempts as u32,
            last_error: self.last_error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn store_err(context: &str, e: sqlx::Error) -> RelayError {
    RelayError::Store(format!("{}: {}", context, e))
}

#[async_trait]
impl RelayStore for PgStore {
    async fn try_begin_relay(&self, event: &RelayEvent) -> Result<Admission, RelayError> {
        // Losing the insert race (concurrent task or another process
        // instance) is the AlreadyHandled path, not an error.
        let result = sqlx::query(
            r#"
            INSERT INTO relay_records
                (chain_id, tx_hash, log_index, kind, block_number, token, recipient, amount, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::NUMERIC, 'pending')
            ON CONFLICT (chain_id, tx_hash, log_index) DO NOTHING
            "#,
        )
        .bind(event.chain_id as i64)
        .bind(format!("{:?}", event.tx_hash))
        .bind(event.log_index as i64)
        .bind(event.kind.as_str())
        .bind(event.block_number as i64)
        .bind(format!("{:?}", event.token))
        .bind(format!("{:?}", event.recipient))
        .bind(event.amount.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("insert relay record", e))?;

        if result.rows_affected() == 1 {
            Ok(Admission::Admitted)
        } else {
            Ok(Admission::AlreadyHandled)
        }
    }

    async fn record_attempt(&self, key: &EventKey, error: &RelayError) -> Result<(), RelayError> {
        sqlx::query(
            r#"UPDATE relay_records
               SET attempts = attempts + 1, last_error = $1, updated_at = NOW()
               WHERE chain_id = $2 AND tx_hash = $3 AND log_index = $4"#,
        )
        .bind(error.to_string())
        .bind(key.chain_id as i64)
        .bind(format!("{:?}", key.tx_hash))
        .bind(key.log_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("record attempt", e))?;
        Ok(())
    }

    async fn record_submitted(
        &self,
        key: &EventKey,
        outbound_tx_hash: B256,
    ) -> Result<(), RelayError> {
        sqlx::query(
            r#"UPDATE relay_records
               SET status = 'submitted', outbound_tx_hash = $1, attempts = attempts + 1,
                   updated_at = NOW()
               WHERE chain_id = $2 AND tx_hash = $3 AND log_index = $4"#,
        )
        .bind(format!("{:?}", outbound_tx_hash))
        .bind(key.chain_id as i64)
        .bind(format!("{:?}", key.tx_hash))
        .bind(key.log_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("record submitted", e))?;
        Ok(())
    }

    async fn record_confirmed(&self, key: &EventKey) -> Result<(), RelayError> {
        sqlx::query(
            r#"UPDATE relay_records SET status = 'confirmed', updated_at = NOW()
               WHERE chain_id = $1 AND tx_hash = $2 AND log_index = $3"#,
        )
        .bind(key.chain_id as i64)
        .bind(format!("{:?}", key.tx_hash))
        .bind(key.log_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("record confirmed", e))?;
        Ok(())
    }

    async fn record_failed(&self, key: &EventKey, error: &str) -> Result<(), RelayError> {
        sqlx::query(
            r#"UPDATE relay_records
               SET status = 'failed', last_error = $1, updated_at = NOW()
               WHERE chain_id = $2 AND tx_hash = $3 AND log_index = $4"#,
        )
        .bind(error)
        .bind(key.chain_id as i64)
        .bind(format!("{:?}", key.tx_hash))
        .bind(key.log_index as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("record failed", e))?;
        Ok(())
    }

    async fn get_record(&self, key: &EventKey) -> Result<Option<RelayRecord>, RelayError> {
        let query = format!(
            "SELECT {} FROM relay_records WHERE chain_id = $1 AND tx_hash = $2 AND log_index = $3",
            RECORD_SELECT
        );
        let row = sqlx::query_as::<_, RecordRow>(&query)
            .bind(key.chain_id as i64)
            .bind(format!("{:?}", key.tx_hash))
            .bind(key.log_index as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| store_err("get record", e))?;

        row.map(RecordRow::into_record).transpose()
    }

    async fn records_with_status(
        &self,
        chain_id: u64,
        status: RelayStatus,
    ) -> Result<Vec<RelayRecord>, RelayError> {
        let query = format!(
            "SELECT {} FROM relay_records WHERE chain_id = $1 AND status = $2 ORDER BY created_at ASC",
            RECORD_SELECT
        );
        let rows = sqlx::query_as::<_, RecordRow>(&query)
            .bind(chain_id as i64)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_err("records with status", e))?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    async fn get_cursor(&self, chain_id: u64, kind: EventKind) -> Result<Option<u64>, RelayError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"SELECT last_scanned_block FROM scan_cursors WHERE chain_id = $1 AND kind = $2"#,
        )
        .bind(chain_id as i64)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_err("get cursor", e))?;

        Ok(row.map(|r| r.0 as u64))
    }

    async fn set_cursor(
        &self,
        chain_id: u64,
        kind: EventKind,
        block: u64,
    ) -> Result<(), RelayError> {
        sqlx::query(
            r#"
            INSERT INTO scan_cursors (chain_id, kind, last_scanned_block)
            VALUES ($1, $2, $3)
            ON CONFLICT (chain_id, kind) DO UPDATE
                SET last_scanned_block = $3, updated_at = NOW()
            "#,
        )
        .bind(chain_id as i64)
        .bind(kind.as_str())
        .bind(block as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| store_err("set cursor", e))?;
        Ok(())
    }
}
