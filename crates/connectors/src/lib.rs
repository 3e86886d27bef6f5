pub mod adapter;
pub mod blob;
pub mod error;
pub mod sql;
