pub mod codec;
pub mod error;
pub mod host;
pub mod media;
pub mod rewrite;
pub mod scan;
pub mod worker;
