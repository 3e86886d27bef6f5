use crate::{
    error::StateStoreError,
    state::{CounterUpdate, StateStore},
};
use async_trait::async_trait;
use model::{
    migration::{CounterDelta, MigrationState},
    schema::ScanResult,
};
use serde::{Serialize, de::DeserializeOwned};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

const STATE_KEY: &str = "offload:migration_state";
const SCAN_KEY: &str = "offload:scan_result";

pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// In-memory store that is discarded on drop.
    pub fn temporary() -> Result<Self, StateStoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StateStoreError> {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StateStoreError> {
        let bytes = bincode::serialize(value)?;
        self.db.insert(key, bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn load_state(&self) -> Result<Option<MigrationState>, StateStoreError> {
        self.load(STATE_KEY)
    }

    async fn save_state(&self, state: &MigrationState) -> Result<(), StateStoreError> {
        self.store(STATE_KEY, state).await
    }

    async fn record(
        &self,
        run_id: &str,
        delta: CounterDelta,
    ) -> Result<CounterUpdate, StateStoreError> {
        // Read-modify-write inside a transaction; sled re-runs the closure on conflict.
        let result = self
            .db
            .transaction::<_, _, StateStoreError>(|tx_db| {
                let Some(bytes) = tx_db.get(STATE_KEY)? else {
                    return Ok(CounterUpdate::NoMigration);
                };

                let mut state: MigrationState = bincode::deserialize(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;

                if state.run_id != run_id {
                    return Ok(CounterUpdate::StaleRun {
                        current: state.run_id,
                    });
                }

                let applied = state.apply(delta);
                let encoded = bincode::serialize(&state)
                    .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                tx_db.insert(STATE_KEY, encoded)?;

                Ok(CounterUpdate::Applied { applied, state })
            });

        match result {
            Ok(update) => {
                if let CounterUpdate::Applied { state, .. } = &update {
                    debug!(
                        run_id = %state.run_id,
                        completed = state.completed,
                        errors = state.errors,
                        "Recorded progress"
                    );
                }
                Ok(update)
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StateStoreError::Storage(e)),
        }
    }

    async fn save_scan_result(&self, result: &ScanResult) -> Result<(), StateStoreError> {
        self.store(SCAN_KEY, result).await
    }

    async fn load_scan_result(&self) -> Result<Option<ScanResult>, StateStoreError> {
        self.load(SCAN_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::migration::Strategy;
    use std::{
        collections::{BTreeMap, BTreeSet},
        sync::Arc,
    };
    use tempfile::tempdir;

    fn started(total: u64) -> MigrationState {
        MigrationState::start(total, BTreeSet::from(["wp_links".to_string()]), Strategy::Naive)
    }

    #[tokio::test]
    async fn state_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let state = started(10);
        {
            let store = SledStateStore::open(dir.path()).unwrap();
            store.save_state(&state).await.unwrap();
        }

        let store = SledStateStore::open(dir.path()).unwrap();
        assert_eq!(store.load_state().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn record_without_migration() {
        let store = SledStateStore::temporary().unwrap();
        let update = store.record("run", CounterDelta::success()).await.unwrap();
        assert_eq!(update, CounterUpdate::NoMigration);
    }

    #[tokio::test]
    async fn record_rejects_stale_run() {
        let store = SledStateStore::temporary().unwrap();
        let state = started(5);
        store.save_state(&state).await.unwrap();

        let update = store
            .record("previous-run", CounterDelta::failure())
            .await
            .unwrap();
        assert_eq!(
            update,
            CounterUpdate::StaleRun {
                current: state.run_id.clone()
            }
        );

        let stored = store.load_state().await.unwrap().unwrap();
        assert_eq!((stored.completed, stored.errors), (0, 0));
    }

    #[tokio::test]
    async fn concurrent_records_do_not_lose_updates() {
        let store = Arc::new(SledStateStore::temporary().unwrap());
        let state = started(400);
        store.save_state(&state).await.unwrap();

        let tasks = (0..8).map(|_| {
            let store = Arc::clone(&store);
            let run_id = state.run_id.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    let delta = if i % 5 == 0 {
                        CounterDelta::failure()
                    } else {
                        CounterDelta::success()
                    };
                    store.record(&run_id, delta).await.unwrap();
                }
            })
        });
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }

        let stored = store.load_state().await.unwrap().unwrap();
        assert_eq!(stored.completed, 400);
        assert_eq!(stored.errors, 80);
    }

    #[tokio::test]
    async fn scan_result_is_replaced() {
        let store = SledStateStore::temporary().unwrap();
        store
            .save_scan_result(&ScanResult::new(BTreeMap::from([("a".to_string(), 3)])))
            .await
            .unwrap();
        store
            .save_scan_result(&ScanResult::new(BTreeMap::from([("b".to_string(), 1)])))
            .await
            .unwrap();

        let loaded = store.load_scan_result().await.unwrap().unwrap();
        assert_eq!(loaded.table_names(), vec!["b".to_string()]);
    }
}
