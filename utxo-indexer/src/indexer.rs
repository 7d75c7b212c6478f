use std::{collections::HashSet, sync::Arc, time::Duration};

use node_rpc::{Block, BlockSource, CodecError, FetchError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{
    delta::derive,
    sleeper::{Sleeper, TokioSleeper},
    store::{IndexStore, StoreError},
    types::{BlockSummary, NO_CHECKPOINT},
};

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Block contents could not be indexed: {0}")]
    Codec(#[from] CodecError),
    #[error("Checkpoint {0} is below -1")]
    InvalidCheckpoint(i64),
}

/// Where the ingestion loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerState {
    /// Processing `height` next, without delay.
    CatchingUp { height: u64 },
    /// `height` could not be fetched; polling until the chain moves on.
    Waiting { height: u64 },
}

pub struct IndexerBuilder {
    store: Option<Arc<dyn IndexStore>>,
    source: Option<Arc<dyn BlockSource>>,
    sleeper: Arc<dyn Sleeper>,
    wait_interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Default for IndexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            source: None,
            sleeper: Arc::new(TokioSleeper),
            wait_interval: Duration::from_millis(500),
            shutdown: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn IndexStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_source(mut self, source: Arc<dyn BlockSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_wait_interval(mut self, wait_interval: Duration) -> Self {
        self.wait_interval = wait_interval;
        self
    }

    /// The loop stops before the next height once the flag turns `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> anyhow::Result<Indexer> {
        let store = self
            .store
            .ok_or(anyhow::anyhow!("IndexStore must be set"))?;
        let source = self
            .source
            .ok_or(anyhow::anyhow!("BlockSource must be set"))?;

        Ok(Indexer {
            store,
            source,
            sleeper: self.sleeper,
            wait_interval: self.wait_interval,
            shutdown: self.shutdown,
        })
    }
}

/// Sequential block ingestion into an [`IndexStore`].
pub struct Indexer {
    store: Arc<dyn IndexStore>,
    source: Arc<dyn BlockSource>,
    sleeper: Arc<dyn Sleeper>,
    wait_interval: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Indexer {
    pub fn builder() -> IndexerBuilder {
        IndexerBuilder::new()
    }

    /// The first height to process: checkpoint + 1.
    pub async fn start_height(&self) -> Result<u64, IndexerError> {
        let checkpoint = self.store.last_processed_height().await?;
        u64::try_from(checkpoint + 1).map_err(|_| IndexerError::InvalidCheckpoint(checkpoint))
    }

    /// Rewrites the checkpoint. The only way it can move backwards.
    pub async fn reset_checkpoint(&self, height: i64) -> Result<(), IndexerError> {
        if height < NO_CHECKPOINT {
            return Err(IndexerError::InvalidCheckpoint(height));
        }
        self.store.set_last_processed_height(height).await?;
        warn!(checkpoint = height, "Checkpoint reset");
        Ok(())
    }

    /// Runs until the shutdown flag is raised.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        let height = self.start_height().await?;
        info!(height, "Indexer started");

        let mut state = IndexerState::CatchingUp { height };
        loop {
            if self.is_shutting_down() {
                info!(?state, "Indexer stopped");
                return Ok(());
            }
            state = self.step(state).await;
        }
    }

    /// Advances the state machine by one transition.
    pub async fn step(&mut self, state: IndexerState) -> IndexerState {
        match state {
            IndexerState::CatchingUp { height } => match self.process_height(height).await {
                Ok(_) => IndexerState::CatchingUp { height: height + 1 },
                Err(IndexerError::Fetch(e)) => {
                    if e.is_not_found() {
                        debug!(height, "Block not available yet");
                    } else {
                        warn!(height, error = %e, "Failed to fetch block");
                    }
                    IndexerState::Waiting { height }
                }
                Err(e) => {
                    error!(height, error = %e, "Failed to index block, retrying");
                    self.pause().await;
                    IndexerState::CatchingUp { height }
                }
            },
            IndexerState::Waiting { height } => {
                self.pause().await;
                // Check the block after the blocked one; the blocked height is what gets retried.
                match self.source.fetch(height + 1).await {
                    Err(FetchError::NotFound(_)) => IndexerState::Waiting { height },
                    _ => IndexerState::CatchingUp { height },
                }
            }
        }
    }

    /// Fetches and indexes a single height, then advances the checkpoint to it.
    pub async fn process_height(&self, height: u64) -> Result<BlockSummary, IndexerError> {
        let block = self.source.fetch(height).await?;
        self.apply_block(&block).await
    }

    pub async fn apply_block(&self, block: &Block) -> Result<BlockSummary, IndexerError> {
        let delta = derive(block)?;

        self.store.upsert_utxos(&delta.created).await?;
        self.store.upsert_transactions(&delta.transactions).await?;

        let spent = self.store.find_utxos(&delta.consumed).await?;
        self.store.delete_utxos(&delta.consumed).await?;

        let created_addresses = delta.created_addresses();
        let known = self.store.existing_addresses(&created_addresses).await?;
        let new_addresses = created_addresses
            .iter()
            .filter(|address| !known.contains(*address))
            .count();

        let mut seen: HashSet<String> = created_addresses.iter().cloned().collect();
        let mut touched = created_addresses;
        for utxo in spent {
            if seen.insert(utxo.address.clone()) {
                touched.push(utxo.address);
            }
        }
        self.store.upsert_addresses(&touched, block.time).await?;

        let checkpoint = i64::try_from(block.height)
            .map_err(|_| StoreError::InvalidData(format!("Height {} out of range", block.height)))?;
        self.store.set_last_processed_height(checkpoint).await?;

        let summary = BlockSummary {
            height: block.height,
            hash: block.hash.clone(),
            transactions: block.tx.len(),
            created: delta.created.len(),
            consumed: delta.consumed.len(),
            new_addresses,
            dropped_transactions: block.dropped_transactions,
        };

        if summary.dropped_transactions > 0 {
            warn!(
                height = summary.height,
                dropped = summary.dropped_transactions,
                "Indexed block with dropped transactions"
            );
        }
        info!(
            height = summary.height,
            hash = %summary.hash,
            transactions = summary.transactions,
            created = summary.created,
            consumed = summary.consumed,
            new_addresses = summary.new_addresses,
            "Indexed block"
        );

        Ok(summary)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|flag| *flag.borrow())
    }

    /// Sleeps for the wait interval, cut short by shutdown.
    async fn pause(&mut self) {
        let sleep = self.sleeper.sleep(self.wait_interval);
        match self.shutdown.as_mut() {
            Some(flag) => {
                let stopped = async {
                    if flag.wait_for(|stop| *stop).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                };
                tokio::select! {
                    _ = sleep => {},
                    _ = stopped => {},
                }
            }
            None => sleep.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        delta::tests::{block, coinbase, data_output, p2pkh_output, spend},
        store::MemoryStore,
        types::{OutPointKey, Utxo},
    };
    use async_trait::async_trait;
    use node_rpc::{RawTransaction, RpcError};
    use std::{
        collections::{BTreeSet, HashMap},
        sync::Mutex,
    };

    const WAIT: Duration = Duration::from_millis(500);

    /// A chain held in memory. Heights can be told to fail a number of times first.
    #[derive(Default)]
    struct ScriptedSource {
        blocks: Mutex<HashMap<u64, Block>>,
        failures: Mutex<HashMap<u64, usize>>,
        fetched: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        fn with_blocks(blocks: Vec<Block>) -> Arc<Self> {
            let source = Arc::new(Self::default());
            for block in blocks {
                source.mine(block);
            }
            source
        }

        fn mine(&self, block: Block) {
            self.blocks.lock().unwrap().insert(block.height, block);
        }

        fn fail(&self, height: u64, times: usize) {
            self.failures.lock().unwrap().insert(height, times);
        }

        fn fetched(&self) -> Vec<u64> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BlockSource for ScriptedSource {
        async fn fetch(&self, height: u64) -> Result<Block, FetchError> {
            self.fetched.lock().unwrap().push(height);
            if let Some(remaining) = self.failures.lock().unwrap().get_mut(&height) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::Transient(RpcError::Http {
                        status: 503,
                        body: "node warming up".to_string(),
                    }));
                }
            }
            self.blocks
                .lock()
                .unwrap()
                .get(&height)
                .cloned()
                .ok_or(FetchError::NotFound(height))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
        stop_on_sleep: Option<watch::Sender<bool>>,
    }

    impl RecordingSleeper {
        fn count(&self) -> usize {
            self.slept.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
            if let Some(stop) = &self.stop_on_sleep {
                let _ = stop.send(true);
            }
        }
    }

    /// Fails `upsert_transactions` a fixed number of times, otherwise delegates.
    struct FlakyStore {
        inner: Arc<MemoryStore>,
        failures: Mutex<usize>,
    }

    #[async_trait]
    impl IndexStore for FlakyStore {
        async fn last_processed_height(&self) -> Result<i64, StoreError> {
            self.inner.last_processed_height().await
        }
        async fn set_last_processed_height(&self, height: i64) -> Result<(), StoreError> {
            self.inner.set_last_processed_height(height).await
        }
        async fn upsert_utxos(&self, utxos: &[Utxo]) -> Result<(), StoreError> {
            self.inner.upsert_utxos(utxos).await
        }
        async fn upsert_transactions(
            &self,
            transactions: &[crate::types::TransactionRecord],
        ) -> Result<(), StoreError> {
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(StoreError::InvalidData("connection reset".to_string()));
                }
            }
            self.inner.upsert_transactions(transactions).await
        }
        async fn find_utxos(&self, keys: &[OutPointKey]) -> Result<Vec<Utxo>, StoreError> {
            self.inner.find_utxos(keys).await
        }
        async fn delete_utxos(&self, keys: &[OutPointKey]) -> Result<u64, StoreError> {
            self.inner.delete_utxos(keys).await
        }
        async fn existing_addresses(
            &self,
            addresses: &[String],
        ) -> Result<HashSet<String>, StoreError> {
            self.inner.existing_addresses(addresses).await
        }
        async fn upsert_addresses(
            &self,
            addresses: &[String],
            last_seen: i64,
        ) -> Result<(), StoreError> {
            self.inner.upsert_addresses(addresses, last_seen).await
        }
    }

    fn indexer(
        store: Arc<dyn IndexStore>,
        source: Arc<ScriptedSource>,
        sleeper: Arc<RecordingSleeper>,
    ) -> Indexer {
        Indexer::builder()
            .with_store(store)
            .with_source(source)
            .with_sleeper(sleeper)
            .with_wait_interval(WAIT)
            .build()
            .unwrap()
    }

    /// A small chain where every block after the first spends an output of the one before.
    fn chain(len: u64) -> Vec<Block> {
        (0..len)
            .map(|height| {
                let time = 1_700_000_000 + height as i64 * 600;
                let mut tx: Vec<RawTransaction> = vec![coinbase(
                    &format!("cb{height}"),
                    vec![p2pkh_output(0, 50.0, &format!("miner{height}")), data_output(1)],
                )];
                if height > 0 {
                    let prev = format!("cb{}", height - 1);
                    tx.push(spend(
                        &format!("tx{height}"),
                        &[(prev.as_str(), 0)],
                        vec![
                            p2pkh_output(0, 30.0, "alice"),
                            p2pkh_output(1, 19.99, &format!("change{height}")),
                        ],
                    ));
                }
                block(height, time, tx)
            })
            .collect()
    }

    async fn drive(indexer: &mut Indexer, mut state: IndexerState, steps: usize) -> IndexerState {
        for _ in 0..steps {
            state = indexer.step(state).await;
        }
        state
    }

    #[tokio::test]
    async fn test_block_with_coinbase_and_spend() {
        let store = Arc::new(MemoryStore::new());
        store.set_last_processed_height(99).await.unwrap();
        store
            .upsert_utxos(&[Utxo {
                txid: "prev".to_string(),
                vout: 0,
                address: "C".to_string(),
                amount: 1_300_000_000,
                hex: "00".to_string(),
                block: 99,
                block_hash: "hash-99".to_string(),
                block_timestamp: 1_699_999_400,
            }])
            .await
            .unwrap();

        let source = ScriptedSource::with_blocks(vec![block(
            100,
            1_700_000_000,
            vec![
                coinbase("cb", vec![p2pkh_output(0, 50.0, "A")]),
                spend("tx1", &[("prev", 0)], vec![p2pkh_output(0, 12.5, "B")]),
            ],
        )]);
        let mut indexer = indexer(store.clone(), source, Arc::default());

        let height = indexer.start_height().await.unwrap();
        assert_eq!(height, 100);
        let summary = indexer.process_height(height).await.unwrap();

        let utxos = store.utxos().await;
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0].key(), OutPointKey::new("cb", 0));
        assert_eq!(utxos[0].amount, 5_000_000_000);
        assert_eq!(utxos[1].key(), OutPointKey::new("tx1", 0));
        assert_eq!(utxos[1].address, "B");
        assert_eq!(utxos[1].amount, 1_250_000_000);

        let addresses = store.addresses().await;
        assert_eq!(addresses.get("A"), Some(&1_700_000_000));
        assert_eq!(addresses.get("B"), Some(&1_700_000_000));
        assert_eq!(addresses.get("C"), Some(&1_700_000_000));
        assert_eq!(store.last_processed_height().await.unwrap(), 100);

        assert_eq!(summary.transactions, 2);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.consumed, 1);
        assert_eq!(summary.new_addresses, 2);

        let state = indexer
            .step(IndexerState::CatchingUp { height: 101 })
            .await;
        assert_eq!(state, IndexerState::Waiting { height: 101 });
    }

    #[tokio::test]
    async fn test_reprocessing_a_height_is_idempotent() {
        let blocks = chain(3);
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(
            store.clone(),
            ScriptedSource::with_blocks(blocks.clone()),
            Arc::default(),
        );

        indexer.process_height(0).await.unwrap();
        indexer.process_height(1).await.unwrap();
        let once = (
            store.utxos().await,
            store.transactions().await,
            store.addresses().await,
            store.last_processed_height().await.unwrap(),
        );

        let replay = indexer.process_height(1).await.unwrap();
        let twice = (
            store.utxos().await,
            store.transactions().await,
            store.addresses().await,
            store.last_processed_height().await.unwrap(),
        );

        assert_eq!(once, twice);
        assert_eq!(replay.new_addresses, 0);
    }

    #[tokio::test]
    async fn test_utxo_set_is_created_minus_consumed() {
        let blocks = chain(6);
        let store = Arc::new(MemoryStore::new());
        let mut indexer = indexer(
            store.clone(),
            ScriptedSource::with_blocks(blocks.clone()),
            Arc::default(),
        );

        let state = drive(&mut indexer, IndexerState::CatchingUp { height: 0 }, 6).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 6 });

        let mut expected = BTreeSet::new();
        for block in &blocks {
            for tx in &block.tx {
                for output in tx.vout.iter().filter(|output| output.address().is_some()) {
                    expected.insert(OutPointKey::new(tx.txid.clone(), output.n));
                }
            }
        }
        for block in &blocks {
            for tx in &block.tx {
                for (txid, vout) in tx.vin.iter().filter_map(|input| input.spent_outpoint()) {
                    expected.remove(&OutPointKey::new(txid, vout));
                }
            }
        }

        let actual: BTreeSet<OutPointKey> = store.utxos().await.iter().map(Utxo::key).collect();
        assert_eq!(actual, expected);
        assert_eq!(store.transactions().await.len(), 11);
        assert_eq!(store.last_processed_height().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_without_advancing() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::with_blocks(chain(3));
        source.fail(1, 2);
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut indexer = indexer(store.clone(), source.clone(), sleeper.clone());

        let state = drive(&mut indexer, IndexerState::CatchingUp { height: 0 }, 2).await;
        assert_eq!(state, IndexerState::Waiting { height: 1 });
        assert_eq!(store.last_processed_height().await.unwrap(), 0);

        // The check of height 2 succeeds, so height 1 is retried.
        let state = indexer.step(state).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 1 });
        let state = drive(&mut indexer, state, 2).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 1 });
        assert_eq!(store.last_processed_height().await.unwrap(), 0);

        let state = indexer.step(state).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 2 });
        assert_eq!(store.last_processed_height().await.unwrap(), 1);

        assert_eq!(source.fetched(), vec![0, 1, 2, 1, 2, 1]);
        assert_eq!(sleeper.slept.lock().unwrap().as_slice(), &[WAIT, WAIT]);
    }

    #[tokio::test]
    async fn test_waiting_at_tip_until_the_next_block_exists() {
        let store = Arc::new(MemoryStore::new());
        let blocks = chain(4);
        let source = ScriptedSource::with_blocks(blocks[..2].to_vec());
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut indexer = indexer(store.clone(), source.clone(), sleeper.clone());

        let state = drive(&mut indexer, IndexerState::CatchingUp { height: 0 }, 3).await;
        assert_eq!(state, IndexerState::Waiting { height: 2 });

        // Height 2 appears, but the loop looks at height 3.
        source.mine(blocks[2].clone());
        let state = indexer.step(state).await;
        assert_eq!(state, IndexerState::Waiting { height: 2 });
        assert_eq!(store.last_processed_height().await.unwrap(), 1);

        source.mine(blocks[3].clone());
        let state = drive(&mut indexer, state, 2).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 3 });
        assert_eq!(store.last_processed_height().await.unwrap(), 2);
        assert_eq!(sleeper.count(), 2);
    }

    #[tokio::test]
    async fn test_erroring_next_height_still_retries_blocked_height() {
        let store = Arc::new(MemoryStore::new());
        let blocks = chain(3);
        let source = ScriptedSource::with_blocks(blocks[..2].to_vec());
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut indexer = indexer(store.clone(), source.clone(), sleeper.clone());

        let state = drive(&mut indexer, IndexerState::CatchingUp { height: 0 }, 3).await;
        assert_eq!(state, IndexerState::Waiting { height: 2 });

        // Height 3 errors instead of being missing, which counts as the chain moving on.
        source.fail(3, 1);
        source.mine(blocks[2].clone());
        let state = indexer.step(state).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 2 });

        let state = indexer.step(state).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 3 });
        assert_eq!(store.last_processed_height().await.unwrap(), 2);
        assert_eq!(source.fetched(), vec![0, 1, 2, 3, 2]);
        assert_eq!(sleeper.count(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_retries_same_height_without_probing() {
        let inner = Arc::new(MemoryStore::new());
        let store = Arc::new(FlakyStore {
            inner: inner.clone(),
            failures: Mutex::new(1),
        });
        let source = ScriptedSource::with_blocks(chain(2));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut indexer = indexer(store, source.clone(), sleeper.clone());

        let state = indexer.step(IndexerState::CatchingUp { height: 0 }).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 0 });
        assert_eq!(inner.last_processed_height().await.unwrap(), NO_CHECKPOINT);
        assert_eq!(sleeper.count(), 1);

        let state = indexer.step(state).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 1 });
        assert_eq!(inner.last_processed_height().await.unwrap(), 0);
        assert_eq!(source.fetched(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_unencodable_block_is_not_persisted() {
        let store = Arc::new(MemoryStore::new());
        let source = ScriptedSource::with_blocks(vec![block(
            0,
            0,
            vec![coinbase("cb", vec![p2pkh_output(0, -5.0, "A")])],
        )]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut indexer = indexer(store.clone(), source, sleeper.clone());

        let state = indexer.step(IndexerState::CatchingUp { height: 0 }).await;
        assert_eq!(state, IndexerState::CatchingUp { height: 0 });
        assert!(store.utxos().await.is_empty());
        assert!(store.transactions().await.is_empty());
        assert_eq!(store.last_processed_height().await.unwrap(), NO_CHECKPOINT);
    }

    #[tokio::test]
    async fn test_dropped_transactions_are_reported() {
        let mut incomplete = chain(1).remove(0);
        incomplete.dropped_transactions = 3;
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(
            store,
            ScriptedSource::with_blocks(vec![incomplete]),
            Arc::default(),
        );

        let summary = indexer.process_height(0).await.unwrap();
        assert_eq!(summary.dropped_transactions, 3);
    }

    #[tokio::test]
    async fn test_checkpoint_resume_and_reset() {
        let store = Arc::new(MemoryStore::new());
        let indexer = indexer(
            store.clone(),
            ScriptedSource::with_blocks(Vec::new()),
            Arc::default(),
        );

        assert_eq!(indexer.start_height().await.unwrap(), 0);

        store.set_last_processed_height(41).await.unwrap();
        assert_eq!(indexer.start_height().await.unwrap(), 42);

        indexer.reset_checkpoint(NO_CHECKPOINT).await.unwrap();
        assert_eq!(indexer.start_height().await.unwrap(), 0);

        assert!(matches!(
            indexer.reset_checkpoint(-2).await,
            Err(IndexerError::InvalidCheckpoint(-2))
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_while_waiting() {
        let (stop, flag) = watch::channel(false);
        let store = Arc::new(MemoryStore::new());
        let sleeper = Arc::new(RecordingSleeper {
            slept: Mutex::default(),
            stop_on_sleep: Some(stop),
        });
        let mut indexer = Indexer::builder()
            .with_store(store.clone())
            .with_source(ScriptedSource::with_blocks(chain(3)))
            .with_sleeper(sleeper.clone())
            .with_wait_interval(WAIT)
            .with_shutdown(flag)
            .build()
            .unwrap();

        indexer.run().await.unwrap();

        assert_eq!(store.last_processed_height().await.unwrap(), 2);
        assert_eq!(sleeper.count(), 1);
    }

    #[tokio::test]
    async fn test_run_does_not_start_after_shutdown() {
        let (_stop, flag) = watch::channel(true);
        let source = ScriptedSource::with_blocks(chain(2));
        let mut indexer = Indexer::builder()
            .with_store(Arc::new(MemoryStore::new()))
            .with_source(source.clone())
            .with_shutdown(flag)
            .build()
            .unwrap();

        indexer.run().await.unwrap();
        assert!(source.fetched().is_empty());
    }

    #[test]
    fn test_builder_requires_store_and_source() {
        assert!(Indexer::builder().build().is_err());
        assert!(
            Indexer::builder()
                .with_store(Arc::new(MemoryStore::new()))
                .build()
                .is_err()
        );
    }
}
