//! Document ingestion: section detection, chunking and index construction.
pub mod chunker;
pub mod core;
pub mod sections;
