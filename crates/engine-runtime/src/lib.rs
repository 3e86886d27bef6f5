pub mod actor;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod scheduler;
