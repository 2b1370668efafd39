//! Grounded answer generation from retrieved, rank-weighted chunks.
//!
//! Context blocks are labelled by tier and the model is told to rely on the
//! supplied context only, to cite section names, and to say so when the
//! context does not contain the answer.
use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

use crate::llm::{CompletionClient, CompletionError, CompletionRequest};
use crate::retriever::RetrievedChunk;

/// Sentence the model must use when the context lacks the answer.
pub const NOT_AVAILABLE: &str = "This information is not available in the document.";

/// Maximum number of section names listed after the answer.
const MAX_SOURCES: usize = 3;

#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("no retrieved context to answer from")]
    NoContext,

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Importance label of a context block, derived from its rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Secondary,
    Supporting,
}

impl Tier {
    /// Rank 0 is primary, ranks 1-2 secondary, everything after supporting.
    #[must_use]
    pub fn for_rank(rank: usize) -> Self {
        match rank {
            0 => Self::Primary,
            1 | 2 => Self::Secondary,
            _ => Self::Supporting,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
            Self::Supporting => "SUPPORTING",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Completion parameters plus the source-listing switch.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub show_sources: bool,
}

impl Default for AnswerOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            show_sources: true,
        }
    }
}

/// The instruction that constrains the model to the retrieved context.
#[must_use]
pub fn system_message() -> String {
    format!(
        "You are a careful research assistant answering questions about a single scientific paper.\n\
         Use ONLY the context excerpts provided in the prompt; do not use outside knowledge.\n\
         Excerpts are labelled PRIMARY, SECONDARY or SUPPORTING by relevance. Weight PRIMARY \
         content most heavily and use SUPPORTING content only to add detail.\n\
         Cite the section name of the excerpt you rely on inline, for example (Methods).\n\
         If the excerpts do not contain the answer, say exactly: \"{NOT_AVAILABLE}\" \
         Never guess or fabricate facts, numbers or citations."
    )
}

/// Renders the tiered context blocks followed by the question.
#[must_use]
pub fn build_prompt(query: &str, retrieved: &[RetrievedChunk<'_>]) -> String {
    let mut prompt = String::from("Context excerpts from the paper:\n\n");

    for (rank, item) in retrieved.iter().enumerate() {
        prompt.push_str(&format!(
            "[{} | Section: {} | Relevance: {:.1}%]\n{}\n\n",
            Tier::for_rank(rank),
            item.chunk.section,
            item.weight * 100.0,
            item.chunk.text.trim()
        ));
    }

    prompt.push_str("Question:\n");
    prompt.push_str(query.trim());
    prompt.push_str(
        "\n\nAnswer from the excerpts above, citing section names inline. \
         Use bullet points, paragraphs or tables as fits the question.",
    );
    prompt
}

/// Up to three distinct section names in rank order, each with the weight of
/// its best-ranked chunk.
#[must_use]
pub fn top_sources(retrieved: &[RetrievedChunk<'_>]) -> Vec<(String, f32)> {
    let mut sources: Vec<(String, f32)> = Vec::new();
    for item in retrieved {
        if sources.len() == MAX_SOURCES {
            break;
        }
        if !sources.iter().any(|(name, _)| *name == item.chunk.section) {
            sources.push((item.chunk.section.clone(), item.weight));
        }
    }
    sources
}

fn format_sources(sources: &[(String, f32)]) -> String {
    let listed: Vec<String> = sources
        .iter()
        .map(|(name, weight)| format!("{name} ({:.1}%)", weight * 100.0))
        .collect();
    format!("\n\n---\n**Sources:** {}", listed.join(", "))
}

pub struct Answerer<'a, C: CompletionClient + ?Sized> {
    client: &'a C,
    options: AnswerOptions,
}

impl<'a, C: CompletionClient + ?Sized> Answerer<'a, C> {
    pub fn new(client: &'a C, options: AnswerOptions) -> Self {
        Self { client, options }
    }

    #[must_use]
    pub fn options(&self) -> &AnswerOptions {
        &self.options
    }

    /// Asks the completion service to answer `query` from `retrieved`.
    ///
    /// Empty context is rejected before any call is made. Completion failures
    /// are returned as-is; no partial answer is produced.
    pub fn answer(
        &self,
        query: &str,
        retrieved: &[RetrievedChunk<'_>],
    ) -> Result<String, AnswerError> {
        if retrieved.is_empty() {
            return Err(AnswerError::NoContext);
        }

        let system = system_message();
        let prompt = build_prompt(query, retrieved);
        debug!("Prompt has {} context block(s)", retrieved.len());

        let request = CompletionRequest {
            model: &self.options.model,
            system_message: Some(&system),
            prompt: &prompt,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        };
        let mut answer = self.client.complete(&request)?;
        info!("Received answer ({} chars)", answer.chars().count());

        if self.options.show_sources {
            answer.push_str(&format_sources(&top_sources(retrieved)));
        }
        Ok(answer)
    }
}
