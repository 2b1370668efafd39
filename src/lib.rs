//! # paperrag: question answering over a scientific paper
//!
//! Ingests one PDF, splits it into named sections and overlapping chunks,
//! embeds the chunks into an exact in-memory vector index, and answers
//! questions with an LLM grounded on rank-weighted retrieved context.
//!
//! ## Architecture
//!
//! - **[`pdf`]**: page text extraction (lopdf)
//! - **[`indexer`]**: section detection, recursive chunking, index construction
//! - **[`embedder`]**: text embedding via ONNX Runtime (all-MiniLM-L6-v2)
//! - **[`db`]**: in-memory SQLite + sqlite-vec exact similarity index
//! - **[`retriever`]**: section-filtered top-k search with rank weighting
//! - **[`llm`]**: completion service boundary (OpenAI chat completions)
//! - **[`answer`]**: tiered prompt composition and source attribution
//! - **[`session`]**: one ingested document and the ask pipeline over it
//! - **[`config`]**: configuration loading and validation

pub mod answer;
pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
pub mod llm;
pub mod pdf;
pub mod retriever;
pub mod session;
