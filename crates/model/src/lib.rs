pub mod chunk;
pub mod core;
pub mod media;
pub mod migration;
pub mod records;
pub mod rewrite;
pub mod schema;
