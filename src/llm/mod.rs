//! Boundary to the external language-model completion service.
use thiserror::Error;

pub mod openai;

pub use openai::OpenAiClient;

/// Failures of the completion call, distinguishable by kind so callers can
/// decide between retrying and aborting.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("no API key configured for the completion service")]
    MissingApiKey,

    #[error("API key contains characters not allowed in an HTTP header")]
    InvalidApiKey,

    #[error("completion request timed out")]
    Timeout,

    #[error("completion quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("completion service rate limited the request: {0}")]
    RateLimited(String),

    #[error("completion service returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("completion transport error: {0}")]
    Transport(String),

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("completion response contained no text")]
    EmptyCompletion,
}

impl CompletionError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited(_) | Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// One prompt for the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system_message: Option<&'a str>,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Trait implemented by completion backends.
///
/// Implementations return either the full answer text or an error; partial
/// or empty completions are errors.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError>;
}
