pub mod error;
pub mod jobs;
pub mod metrics;
pub mod progress;
pub mod retry;
pub mod state;
