pub mod library;
pub mod urls;
