use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexStore, StoreError};
use crate::types::{NO_CHECKPOINT, OutPointKey, TransactionRecord, Utxo};

#[derive(Debug, Default)]
struct Tables {
    utxos: BTreeMap<OutPointKey, Utxo>,
    transactions: BTreeMap<String, TransactionRecord>,
    addresses: BTreeMap<String, i64>,
    checkpoint: Option<i64>,
}

/// Store kept entirely in memory. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn utxos(&self) -> Vec<Utxo> {
        self.tables.read().await.utxos.values().cloned().collect()
    }

    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.tables.read().await.transactions.values().cloned().collect()
    }

    pub async fn addresses(&self) -> BTreeMap<String, i64> {
        self.tables.read().await.addresses.clone()
    }
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn last_processed_height(&self) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(*tables.checkpoint.get_or_insert(NO_CHECKPOINT))
    }

    async fn set_last_processed_height(&self, height: i64) -> Result<(), StoreError> {
        self.tables.write().await.checkpoint = Some(height);
        Ok(())
    }

    async fn upsert_utxos(&self, utxos: &[Utxo]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for utxo in utxos {
            tables.utxos.insert(utxo.key(), utxo.clone());
        }
        Ok(())
    }

    async fn upsert_transactions(&self, transactions: &[TransactionRecord]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for tx in transactions {
            tables.transactions.insert(tx.txid.clone(), tx.clone());
        }
        Ok(())
    }

    async fn find_utxos(&self, keys: &[OutPointKey]) -> Result<Vec<Utxo>, StoreError> {
        let tables = self.tables.read().await;
        let unique: HashSet<&OutPointKey> = keys.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|key| tables.utxos.get(key).cloned())
            .collect())
    }

    async fn delete_utxos(&self, keys: &[OutPointKey]) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = keys
            .iter()
            .filter(|key| tables.utxos.remove(*key).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn existing_addresses(&self, addresses: &[String]) -> Result<HashSet<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(addresses
            .iter()
            .filter(|address| tables.addresses.contains_key(*address))
            .cloned()
            .collect())
    }

    async fn upsert_addresses(&self, addresses: &[String], last_seen: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        for address in addresses {
            tables.addresses.insert(address.clone(), last_seen);
        }
        Ok(())
    }
}
