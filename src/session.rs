//! Per-document state: the chunk sequence and its vector index, built once at
//! ingest and only read afterwards.
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::answer::{AnswerError, Answerer};
use crate::db::VectorIndex;
use crate::embedder::Embedder;
use crate::indexer::chunker::{Chunk, ChunkerOptions};
use crate::indexer::core::{Indexer, IndexingError};
use crate::llm::CompletionClient;
use crate::pdf::{self, ExtractError};
use crate::retriever::{RetrievalResult, RetrieveError, Retriever, SectionFilter};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Indexing(#[from] IndexingError),

    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    #[error(transparent)]
    Answer(#[from] AnswerError),

    #[error("no content found in section \"{filter}\"")]
    NoMatchingContent { filter: String },
}

/// Chunk count per section name, in order of first appearance.
pub fn section_counts(chunks: &[Chunk]) -> Vec<(&str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for chunk in chunks {
        match counts.iter_mut().find(|(name, _)| *name == chunk.section) {
            Some((_, count)) => *count += 1,
            None => counts.push((chunk.section.as_str(), 1)),
        }
    }
    counts
}

/// An answer together with the retrieval it was generated from.
#[derive(Debug, Clone)]
pub struct Answered<'s> {
    pub answer: String,
    pub retrieval: RetrievalResult<'s>,
}

/// One ingested paper. Chunk `i` corresponds to vector `i` of the index.
pub struct DocumentSession {
    chunks: Vec<Chunk>,
    index: VectorIndex,
    embeddings: Vec<Vec<f32>>,
}

impl DocumentSession {
    /// Sections, chunks and indexes already-extracted document text.
    pub fn ingest_text<E: Embedder + ?Sized>(
        text: &str,
        embedder: &E,
        options: ChunkerOptions,
    ) -> Result<Self, SessionError> {
        let indexer = Indexer::new(embedder, options);
        let chunks = indexer.chunk_document(text);
        let (index, embeddings) = indexer.index_chunks(&chunks)?;
        info!(
            "Indexed {} chunk(s) at {} dimensions",
            index.len(),
            index.dimensions()
        );
        Ok(Self {
            chunks,
            index,
            embeddings,
        })
    }

    /// Extracts the PDF at `path` and ingests its text.
    pub fn ingest_pdf<E: Embedder + ?Sized>(
        path: &Path,
        embedder: &E,
        options: ChunkerOptions,
    ) -> Result<Self, SessionError> {
        let text = pdf::extract_text(path)?;
        Self::ingest_text(&text, embedder, options)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Distinct section names in order of first appearance.
    pub fn available_sections(&self) -> Vec<&str> {
        self.section_counts().into_iter().map(|(name, _)| name).collect()
    }

    /// Chunk count per section, in order of first appearance.
    pub fn section_counts(&self) -> Vec<(&str, usize)> {
        section_counts(&self.chunks)
    }

    pub fn retrieve<E: Embedder + ?Sized>(
        &self,
        retriever: &Retriever<'_, E>,
        query: &str,
        k: usize,
        filter: &SectionFilter,
    ) -> Result<RetrievalResult<'_>, SessionError> {
        Ok(retriever.retrieve(query, &self.chunks, &self.index, k, filter)?)
    }

    /// Retrieves context for `query` and asks the completion service.
    ///
    /// An empty retrieval (a section filter that matched nothing) is reported
    /// as [`SessionError::NoMatchingContent`] without calling the service.
    pub fn ask<E, C>(
        &self,
        retriever: &Retriever<'_, E>,
        answerer: &Answerer<'_, C>,
        query: &str,
        k: usize,
        filter: &SectionFilter,
    ) -> Result<Answered<'_>, SessionError>
    where
        E: Embedder + ?Sized,
        C: CompletionClient + ?Sized,
    {
        let retrieval = self.retrieve(retriever, query, k, filter)?;
        if retrieval.is_empty() {
            return Err(SessionError::NoMatchingContent {
                filter: filter.to_string(),
            });
        }

        let answer = answerer.answer(query, &retrieval.items)?;
        Ok(Answered { answer, retrieval })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::answer::AnswerOptions;
    use crate::embedder::mock::MockEmbedder;
    use crate::llm::{CompletionError, CompletionRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAPER: &str = "Abstract\nWe present a vision model.\n\
        Methods\nWe trained on the ImageNet dataset.\n\n\
        Training used eight GPUs.\n\
        Results\nTop-1 accuracy reached 80 percent.\n";

    struct CountingClient {
        calls: AtomicUsize,
    }

    impl CompletionClient for CountingClient {
        fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("ImageNet (Methods).".to_string())
        }
    }

    #[test]
    fn test_ingest_text_is_aligned() {
        let embedder = MockEmbedder::default();
        let session =
            DocumentSession::ingest_text(PAPER, &embedder, ChunkerOptions::new(40, 10)).unwrap();

        assert!(!session.is_empty());
        assert_eq!(session.len(), session.index().len());
        assert_eq!(session.len(), session.embeddings().len());
        assert_eq!(session.index().dimensions(), 384);
    }

    #[test]
    fn test_available_sections_and_counts() {
        let embedder = MockEmbedder::default();
        let session =
            DocumentSession::ingest_text(PAPER, &embedder, ChunkerOptions::new(40, 10)).unwrap();

        assert_eq!(
            session.available_sections(),
            vec!["Abstract", "Methods", "Results"]
        );
        let counts = session.section_counts();
        let total: usize = counts.iter().map(|(_, n)| n).sum();
        assert_eq!(total, session.len());
        assert!(counts[1].1 >= 2, "Methods should span several chunks");
    }

    #[test]
    fn test_ask_returns_answer_and_context() {
        let embedder = MockEmbedder::default();
        let session =
            DocumentSession::ingest_text(PAPER, &embedder, ChunkerOptions::default()).unwrap();
        let client = CountingClient {
            calls: AtomicUsize::new(0),
        };
        let retriever = Retriever::new(&embedder);
        let answerer = Answerer::new(&client, AnswerOptions::default());

        let answered = session
            .ask(&retriever, &answerer, "What dataset was used?", 5, &SectionFilter::All)
            .unwrap();

        assert!(answered.answer.starts_with("ImageNet (Methods)."));
        assert!(answered.answer.contains("**Sources:**"));
        assert_eq!(answered.retrieval.len(), 3);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ask_with_unmatched_filter() {
        let embedder = MockEmbedder::default();
        let session =
            DocumentSession::ingest_text(PAPER, &embedder, ChunkerOptions::default()).unwrap();
        let client = CountingClient {
            calls: AtomicUsize::new(0),
        };
        let retriever = Retriever::new(&embedder);
        let answerer = Answerer::new(&client, AnswerOptions::default());

        let err = session
            .ask(
                &retriever,
                &answerer,
                "What were the results?",
                5,
                &SectionFilter::from_label("Discussion"),
            )
            .unwrap_err();

        match err {
            SessionError::NoMatchingContent { filter } => assert_eq!(filter, "Discussion"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ingest_missing_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = MockEmbedder::default();
        let err = DocumentSession::ingest_pdf(
            &dir.path().join("paper.pdf"),
            &embedder,
            ChunkerOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SessionError::Extract(ExtractError::Io(_))));
    }
}
