use serde::{Deserialize, Serialize};

/// An `(old, new)` reference pair, fixed for the duration of one rewrite pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RewriteJob {
    pub old: String,
    pub new: String,
}

impl RewriteJob {
    pub fn new(old: impl Into<String>, new: impl Into<String>) -> Self {
        RewriteJob {
            old: old.into(),
            new: new.into(),
        }
    }

    /// Nothing to do when both sides are equal or `old` is empty.
    pub fn is_noop(&self) -> bool {
        self.old.is_empty() || self.old == self.new
    }
}

/// Totals reported by a table rewrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteStats {
    pub rows_updated: u64,
    pub rows_failed: u64,
    /// Tables that could not be scanned at all.
    pub tables_failed: u64,
}

impl std::ops::AddAssign for RewriteStats {
    fn add_assign(&mut self, rhs: Self) {
        self.rows_updated += rhs.rows_updated;
        self.rows_failed += rhs.rows_failed;
        self.tables_failed += rhs.tables_failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_accumulate_row_and_table_failures_separately() {
        let mut total = RewriteStats::default();
        total += RewriteStats {
            rows_updated: 3,
            rows_failed: 1,
            tables_failed: 0,
        };
        total += RewriteStats {
            tables_failed: 1,
            ..Default::default()
        };
        assert_eq!(total.rows_updated, 3);
        assert_eq!(total.rows_failed, 1);
        assert_eq!(total.tables_failed, 1);
    }
}
