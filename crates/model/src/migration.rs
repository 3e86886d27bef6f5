use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, str::FromStr};

/// How references are rewritten inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Strategy {
    /// Bulk in-database substring replace, one statement per column.
    Naive,
    /// Row by row, decoding serialized and JSON containers before replacing.
    #[default]
    Advanced,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Naive => "naive",
            Strategy::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "naive" | "simple" => Ok(Strategy::Naive),
            "advanced" | "safe" => Ok(Strategy::Advanced),
            other => Err(format!("Unknown rewrite strategy: {other}")),
        }
    }
}

/// Process-wide record of the current migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationState {
    /// Generation token; chunks carrying another id belong to a superseded run.
    pub run_id: String,
    pub total: u64,
    pub completed: u64,
    pub errors: u64,
    pub selected_tables: BTreeSet<String>,
    pub strategy: Strategy,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationState {
    pub fn start(total: u64, selected_tables: BTreeSet<String>, strategy: Strategy) -> Self {
        let now = Utc::now();
        MigrationState {
            run_id: uuid::Uuid::new_v4().to_string(),
            total,
            completed: 0,
            errors: 0,
            selected_tables,
            strategy,
            started_at: now,
            updated_at: now,
        }
    }

    /// Applies a counter delta while keeping `errors <= completed <= total`.
    /// Returns the portion of the delta that was actually applied.
    pub fn apply(&mut self, delta: CounterDelta) -> CounterDelta {
        let room = self.total.saturating_sub(self.completed);
        let completed = delta.completed.min(room);
        self.completed += completed;

        let error_room = self.completed.saturating_sub(self.errors);
        let errors = delta.errors.min(completed).min(error_room);
        self.errors += errors;

        self.updated_at = Utc::now();
        CounterDelta { completed, errors }
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }

    pub fn progress(&self) -> Progress {
        Progress::Running {
            run_id: self.run_id.clone(),
            total: self.total,
            completed: self.completed,
            errors: self.errors,
        }
    }
}

/// Increment applied to the shared progress counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub completed: u64,
    pub errors: u64,
}

impl CounterDelta {
    pub fn success() -> Self {
        CounterDelta {
            completed: 1,
            errors: 0,
        }
    }

    pub fn failure() -> Self {
        CounterDelta {
            completed: 1,
            errors: 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.completed == 0 && self.errors == 0
    }
}

impl std::ops::Add for CounterDelta {
    type Output = CounterDelta;

    fn add(self, rhs: Self) -> Self::Output {
        CounterDelta {
            completed: self.completed + rhs.completed,
            errors: self.errors + rhs.errors,
        }
    }
}

/// Answer of the progress query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Progress {
    NoMigration,
    Running {
        run_id: String,
        total: u64,
        completed: u64,
        errors: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(total: u64) -> MigrationState {
        MigrationState::start(total, BTreeSet::new(), Strategy::Advanced)
    }

    #[test]
    fn apply_respects_invariants() {
        let mut s = state(3);
        s.apply(CounterDelta::success());
        s.apply(CounterDelta::failure());
        assert_eq!((s.completed, s.errors), (2, 1));

        let applied = s.apply(CounterDelta {
            completed: 5,
            errors: 5,
        });
        assert_eq!(applied.completed, 1);
        assert_eq!(s.completed, 3);
        assert!(s.errors <= s.completed);
        assert!(s.is_finished());
    }

    #[test]
    fn strategy_parses() {
        assert_eq!("Naive".parse::<Strategy>(), Ok(Strategy::Naive));
        assert_eq!("advanced".parse::<Strategy>(), Ok(Strategy::Advanced));
        assert!("fast".parse::<Strategy>().is_err());
    }

    #[test]
    fn progress_serializes_with_status_tag() {
        let json = serde_json::to_value(Progress::NoMigration).unwrap();
        assert_eq!(json["status"], "no_migration");
    }
}
