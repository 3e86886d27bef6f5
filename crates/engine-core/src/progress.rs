use crate::{error::ProgressError, state::StateStore};
use model::migration::Progress;
use std::sync::Arc;

/// Read side of the migration counters.
#[derive(Clone)]
pub struct ProgressService {
    pub store: Arc<dyn StateStore>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        ProgressService { store }
    }

    /// Counters as of now, or `NoMigration` when no run was ever started.
    pub async fn progress(&self) -> Result<Progress, ProgressError> {
        let state = self.store.load_state().await?;
        Ok(state
            .map(|s| s.progress())
            .unwrap_or(Progress::NoMigration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sled_store::SledStateStore;
    use model::migration::{CounterDelta, MigrationState, Strategy};
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn reports_no_migration_before_start() {
        let store = Arc::new(SledStateStore::temporary().unwrap());
        let service = ProgressService::new(store);
        assert_eq!(service.progress().await.unwrap(), Progress::NoMigration);
    }

    #[tokio::test]
    async fn reports_counters_of_current_run() {
        let store = Arc::new(SledStateStore::temporary().unwrap());
        let state = MigrationState::start(2, BTreeSet::new(), Strategy::Advanced);
        store.save_state(&state).await.unwrap();
        store
            .record(&state.run_id, CounterDelta::failure())
            .await
            .unwrap();

        let service = ProgressService::new(store);
        assert_eq!(
            service.progress().await.unwrap(),
            Progress::Running {
                run_id: state.run_id,
                total: 2,
                completed: 1,
                errors: 1,
            }
        );
    }
}
