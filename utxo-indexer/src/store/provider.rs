use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row, postgres::PgRow};
use tracing::debug;

use super::{IndexStore, StoreError};
use crate::types::{NO_CHECKPOINT, OutPointKey, TransactionRecord, Utxo};

const CHECKPOINT_KEY: &str = "last_processed_block";

/// Rows per statement in bulk writes.
const BATCH_SIZE: usize = 1000;

#[derive(Clone, Debug)]
pub struct PgStore {
    pub pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        PgStore { pool }
    }

    pub async fn from_db_url(db_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn create_tables(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS utxos (
                txid TEXT NOT NULL,
                vout INTEGER NOT NULL,
                address TEXT NOT NULL,
                amount TEXT NOT NULL,
                hex TEXT NOT NULL,
                block BIGINT NOT NULL,
                block_hash TEXT NOT NULL,
                block_timestamp BIGINT NOT NULL,
                PRIMARY KEY (txid, vout)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS utxos_address_idx ON utxos (address)",
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                txid TEXT PRIMARY KEY,
                block_height BIGINT NOT NULL,
                hash TEXT NOT NULL,
                size BIGINT NOT NULL,
                vsize BIGINT NOT NULL,
                version INTEGER NOT NULL,
                locktime BIGINT NOT NULL,
                vin JSONB NOT NULL,
                vout JSONB NOT NULL,
                hex TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS addresses (
                address TEXT PRIMARY KEY,
                last_seen BIGINT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Collapses rows sharing a key, keeping the last one. `ON CONFLICT` cannot
/// touch the same row twice in one statement.
fn dedupe_last<T, K, F>(rows: &[T], key: F) -> Vec<&T>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> K,
{
    let mut position: HashMap<K, usize> = HashMap::with_capacity(rows.len());
    let mut unique: Vec<&T> = Vec::with_capacity(rows.len());
    for row in rows {
        match position.get(&key(row)) {
            Some(&index) => unique[index] = row,
            None => {
                position.insert(key(row), unique.len());
                unique.push(row);
            }
        }
    }
    unique
}

fn vout_param(vout: u32) -> Result<i32, StoreError> {
    i32::try_from(vout).map_err(|_| StoreError::InvalidData(format!("Output index {vout} out of range")))
}

fn height_param(height: u64) -> Result<i64, StoreError> {
    i64::try_from(height).map_err(|_| StoreError::InvalidData(format!("Height {height} out of range")))
}

fn key_params(keys: &[OutPointKey]) -> Result<(Vec<String>, Vec<i32>), StoreError> {
    let mut txids = Vec::with_capacity(keys.len());
    let mut vouts = Vec::with_capacity(keys.len());
    for key in keys {
        txids.push(key.txid.clone());
        vouts.push(vout_param(key.vout)?);
    }
    Ok((txids, vouts))
}

fn utxo_from_row(row: &PgRow) -> Result<Utxo, StoreError> {
    let amount: String = row.try_get("amount")?;
    let vout: i32 = row.try_get("vout")?;
    let block: i64 = row.try_get("block")?;
    Ok(Utxo {
        txid: row.try_get("txid")?,
        vout: u32::try_from(vout)
            .map_err(|_| StoreError::InvalidData(format!("Stored output index {vout}")))?,
        address: row.try_get("address")?,
        amount: amount
            .parse()
            .map_err(|_| StoreError::InvalidData(format!("Stored amount {amount:?}")))?,
        hex: row.try_get("hex")?,
        block: u64::try_from(block)
            .map_err(|_| StoreError::InvalidData(format!("Stored block height {block}")))?,
        block_hash: row.try_get("block_hash")?,
        block_timestamp: row.try_get("block_timestamp")?,
    })
}

#[async_trait]
impl IndexStore for PgStore {
    async fn last_processed_height(&self) -> Result<i64, StoreError> {
        sqlx::query("INSERT INTO settings (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING")
            .bind(CHECKPOINT_KEY)
            .bind(NO_CHECKPOINT.to_string())
            .execute(&self.pool)
            .await?;

        let value: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = $1")
            .bind(CHECKPOINT_KEY)
            .fetch_one(&self.pool)
            .await?;

        value
            .trim()
            .parse()
            .map_err(|_| StoreError::InvalidData(format!("Checkpoint value {value:?} is not a height")))
    }

    async fn set_last_processed_height(&self, height: i64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(CHECKPOINT_KEY)
        .bind(height.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_utxos(&self, utxos: &[Utxo]) -> Result<(), StoreError> {
        let rows = dedupe_last(utxos, Utxo::key);
        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut txids = Vec::with_capacity(chunk.len());
            let mut vouts = Vec::with_capacity(chunk.len());
            let mut addresses = Vec::with_capacity(chunk.len());
            let mut amounts = Vec::with_capacity(chunk.len());
            let mut hexes = Vec::with_capacity(chunk.len());
            let mut blocks = Vec::with_capacity(chunk.len());
            let mut block_hashes = Vec::with_capacity(chunk.len());
            let mut timestamps = Vec::with_capacity(chunk.len());
            for utxo in chunk {
                txids.push(utxo.txid.clone());
                vouts.push(vout_param(utxo.vout)?);
                addresses.push(utxo.address.clone());
                amounts.push(utxo.amount.to_string());
                hexes.push(utxo.hex.clone());
                blocks.push(height_param(utxo.block)?);
                block_hashes.push(utxo.block_hash.clone());
                timestamps.push(utxo.block_timestamp);
            }

            sqlx::query(
                r#"
                INSERT INTO utxos (txid, vout, address, amount, hex, block, block_hash, block_timestamp)
                SELECT * FROM UNNEST(
                    $1::text[], $2::int4[], $3::text[], $4::text[],
                    $5::text[], $6::int8[], $7::text[], $8::int8[]
                )
                ON CONFLICT (txid, vout) DO UPDATE SET
                    address = EXCLUDED.address,
                    amount = EXCLUDED.amount,
                    hex = EXCLUDED.hex,
                    block = EXCLUDED.block,
                    block_hash = EXCLUDED.block_hash,
                    block_timestamp = EXCLUDED.block_timestamp
                "#,
            )
            .bind(txids)
            .bind(vouts)
            .bind(addresses)
            .bind(amounts)
            .bind(hexes)
            .bind(blocks)
            .bind(block_hashes)
            .bind(timestamps)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(rows = rows.len(), "Upserted utxos");
        Ok(())
    }

    async fn upsert_transactions(&self, transactions: &[TransactionRecord]) -> Result<(), StoreError> {
        let rows = dedupe_last(transactions, |tx| tx.txid.clone());
        let mut tx = self.pool.begin().await?;

        for chunk in rows.chunks(BATCH_SIZE) {
            let mut txids = Vec::with_capacity(chunk.len());
            let mut heights = Vec::with_capacity(chunk.len());
            let mut hashes = Vec::with_capacity(chunk.len());
            let mut sizes = Vec::with_capacity(chunk.len());
            let mut vsizes = Vec::with_capacity(chunk.len());
            let mut versions = Vec::with_capacity(chunk.len());
            let mut locktimes = Vec::with_capacity(chunk.len());
            let mut vins = Vec::with_capacity(chunk.len());
            let mut vouts = Vec::with_capacity(chunk.len());
            let mut hexes = Vec::with_capacity(chunk.len());
            for record in chunk {
                txids.push(record.txid.clone());
                heights.push(height_param(record.block_height)?);
                hashes.push(record.hash.clone());
                sizes.push(height_param(record.size)?);
                vsizes.push(height_param(record.vsize)?);
                versions.push(record.version);
                locktimes.push(i64::from(record.locktime));
                vins.push(serde_json::to_value(&record.vin)?);
                vouts.push(serde_json::to_value(&record.vout)?);
                hexes.push(record.hex.clone());
            }

            sqlx::query(
                r#"
                INSERT INTO transactions (txid, block_height, hash, size, vsize, version, locktime, vin, vout, hex)
                SELECT * FROM UNNEST(
                    $1::text[], $2::int8[], $3::text[], $4::int8[], $5::int8[],
                    $6::int4[], $7::int8[], $8::jsonb[], $9::jsonb[], $10::text[]
                )
                ON CONFLICT (txid) DO UPDATE SET
                    block_height = EXCLUDED.block_height,
                    hash = EXCLUDED.hash,
                    size = EXCLUDED.size,
                    vsize = EXCLUDED.vsize,
                    version = EXCLUDED.version,
                    locktime = EXCLUDED.locktime,
                    vin = EXCLUDED.vin,
                    vout = EXCLUDED.vout,
                    hex = EXCLUDED.hex
                "#,
            )
            .bind(txids)
            .bind(heights)
            .bind(hashes)
            .bind(sizes)
            .bind(vsizes)
            .bind(versions)
            .bind(locktimes)
            .bind(vins)
            .bind(vouts)
            .bind(hexes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(rows = rows.len(), "Upserted transactions");
        Ok(())
    }

    async fn find_utxos(&self, keys: &[OutPointKey]) -> Result<Vec<Utxo>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let (txids, vouts) = key_params(keys)?;

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT u.txid, u.vout, u.address, u.amount, u.hex, u.block, u.block_hash, u.block_timestamp
            FROM utxos u
            JOIN UNNEST($1::text[], $2::int4[]) AS k(txid, vout)
              ON u.txid = k.txid AND u.vout = k.vout
            "#,
        )
        .bind(txids)
        .bind(vouts)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(utxo_from_row).collect()
    }

    async fn delete_utxos(&self, keys: &[OutPointKey]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let (txids, vouts) = key_params(keys)?;

        let result = sqlx::query(
            r#"
            DELETE FROM utxos u
            USING UNNEST($1::text[], $2::int4[]) AS k(txid, vout)
            WHERE u.txid = k.txid AND u.vout = k.vout
            "#,
        )
        .bind(txids)
        .bind(vouts)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn existing_addresses(&self, addresses: &[String]) -> Result<HashSet<String>, StoreError> {
        if addresses.is_empty() {
            return Ok(HashSet::new());
        }
        let known: Vec<String> =
            sqlx::query_scalar("SELECT address FROM addresses WHERE address = ANY($1)")
                .bind(addresses)
                .fetch_all(&self.pool)
                .await?;
        Ok(known.into_iter().collect())
    }

    async fn upsert_addresses(&self, addresses: &[String], last_seen: i64) -> Result<(), StoreError> {
        let unique: Vec<String> = dedupe_last(addresses, |address| address.clone())
            .into_iter()
            .cloned()
            .collect();
        if unique.is_empty() {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO addresses (address, last_seen)
            SELECT address, $2 FROM UNNEST($1::text[]) AS a(address)
            ON CONFLICT (address) DO UPDATE SET last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(unique)
        .bind(last_seen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
