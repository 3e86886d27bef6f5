use crate::error::MigrationError;
use chrono::Utc;
use engine_core::{
    jobs::{CHUNK_JOB_NAME, JOB_GROUP, JobScheduler},
    state::StateStore,
};
use engine_processing::media::library::MediaLibrary;
use model::{
    chunk::{ChunkPayload, split_into_chunks},
    migration::{CounterDelta, MigrationState, Strategy},
};
use std::{collections::BTreeSet, sync::Arc, time::Duration};
use tracing::{error, info, warn};

/// Starts migration runs: persists the initial state and schedules one
/// staggered job per chunk of media items.
pub struct MigrationCoordinator {
    library: Arc<dyn MediaLibrary>,
    state: Arc<dyn StateStore>,
    scheduler: Arc<dyn JobScheduler>,
    chunk_size: usize,
    stagger: Duration,
}

impl MigrationCoordinator {
    pub fn new(
        library: Arc<dyn MediaLibrary>,
        state: Arc<dyn StateStore>,
        scheduler: Arc<dyn JobScheduler>,
        chunk_size: usize,
        stagger: Duration,
    ) -> Self {
        MigrationCoordinator {
            library,
            state,
            scheduler,
            chunk_size,
            stagger,
        }
    }

    /// Returns the number of chunk jobs scheduled.
    ///
    /// Starting again while a run is in flight replaces the state; chunks
    /// of the earlier run are then rejected by the workers.
    pub async fn start_migration(
        &self,
        selected_tables: BTreeSet<String>,
        strategy: Strategy,
    ) -> Result<usize, MigrationError> {
        if let Some(previous) = self.state.load_state().await? {
            if !previous.is_finished() {
                warn!(
                    run_id = %previous.run_id,
                    completed = previous.completed,
                    total = previous.total,
                    "Superseding unfinished migration run"
                );
            }
        }

        let ids = self.library.list_ids().await?;
        let state = MigrationState::start(ids.len() as u64, selected_tables, strategy);
        self.state.save_state(&state).await?;

        let chunks = split_into_chunks(&ids, self.chunk_size);
        let started = Utc::now();
        let stagger = chrono::Duration::from_std(self.stagger).unwrap_or(chrono::Duration::zero());
        let mut scheduled = 0;

        for chunk in chunks {
            let not_before = started + stagger * chunk.index as i32;
            let items = chunk.len() as u64;
            let payload = serde_json::to_value(ChunkPayload {
                run_id: state.run_id.clone(),
                index: chunk.index,
                chunk: chunk.ids,
            })?;

            match self
                .scheduler
                .schedule(CHUNK_JOB_NAME, payload, not_before, JOB_GROUP)
                .await
            {
                Ok(()) => scheduled += 1,
                Err(err) => {
                    // Unscheduled items are counted as failed so the run can still finish.
                    error!(chunk = chunk.index, error = %err, "Failed to schedule chunk");
                    self.state
                        .record(
                            &state.run_id,
                            CounterDelta {
                                completed: items,
                                errors: items,
                            },
                        )
                        .await?;
                }
            }
        }

        info!(
            run_id = %state.run_id,
            total = state.total,
            jobs = scheduled,
            strategy = %strategy,
            tables = ?state.selected_tables,
            "Migration scheduled"
        );
        Ok(scheduled)
    }
}
