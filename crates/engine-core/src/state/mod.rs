use crate::error::StateStoreError;
use async_trait::async_trait;
use model::{
    migration::{CounterDelta, MigrationState},
    schema::ScanResult,
};

pub mod sled_store;

/// Outcome of a counter update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterUpdate {
    /// The delta (possibly clamped) was applied; `state` is the stored document afterwards.
    Applied {
        applied: CounterDelta,
        state: MigrationState,
    },
    /// The update carried a run id other than the current run's.
    StaleRun { current: String },
    /// No migration has been started.
    NoMigration,
}

/// Durable home of the migration state and the last scan result.
///
/// Both documents are read and written whole. `record` is the only partial
/// update and must be atomic against concurrent callers.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_state(&self) -> Result<Option<MigrationState>, StateStoreError>;

    /// Replaces the current migration state.
    async fn save_state(&self, state: &MigrationState) -> Result<(), StateStoreError>;

    async fn record(
        &self,
        run_id: &str,
        delta: CounterDelta,
    ) -> Result<CounterUpdate, StateStoreError>;

    /// Replaces the previous scan result; results are never merged.
    async fn save_scan_result(&self, result: &ScanResult) -> Result<(), StateStoreError>;

    async fn load_scan_result(&self) -> Result<Option<ScanResult>, StateStoreError>;
}
