use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use paperrag::answer::{AnswerError, Answerer, Tier};
use paperrag::config::{Config, DEFAULT_CONFIG_PATH};
use paperrag::embedder::Embedder;
use paperrag::embedder::download::{all_files_present, download_model_files};
use paperrag::embedder::mock::MockEmbedder;
use paperrag::embedder::onnx::OnnxEmbedder;
use paperrag::embedder::tokenizer::DEFAULT_MAX_LENGTH;
use paperrag::indexer::chunker;
use paperrag::indexer::sections;
use paperrag::llm::OpenAiClient;
use paperrag::pdf;
use paperrag::retriever::{RetrievalResult, Retriever, SectionFilter};
use paperrag::session::{self, DocumentSession, SessionError};

/// Characters of chunk text shown per retrieved chunk with `--details`.
const PREVIEW_CHARS: usize = 500;

/// Range accepted by `--k`.
const CLI_TOP_K: std::ops::RangeInclusive<usize> = 3..=10;

#[derive(Parser, Debug)]
#[command(
    name = "paperrag",
    version,
    about = "Ask questions about a scientific paper with section-aware retrieval"
)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the detected sections of a paper with their chunk counts
    Sections {
        #[command(flatten)]
        ingest: IngestArgs,
    },
    /// Answer one question about a paper
    Ask {
        #[command(flatten)]
        ingest: IngestArgs,

        #[command(flatten)]
        query: QueryArgs,

        /// The question to answer
        question: String,
    },
    /// Answer questions read from stdin until EOF or `exit`
    Chat {
        #[command(flatten)]
        ingest: IngestArgs,

        #[command(flatten)]
        query: QueryArgs,
    },
    /// Download the embedding model files if missing
    DownloadModel {
        /// Target directory (defaults to `model.dir` from the config)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// PDF file of the paper
    pdf: PathBuf,

    /// Chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Overlap between consecutive chunks in characters
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Use the deterministic hashing embedder instead of the ONNX model
    #[arg(long, default_value_t = false)]
    mock_embedder: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Number of chunks to retrieve (3-10; `search_top_k` in the config accepts 1-50)
    #[arg(long, value_parser = parse_top_k)]
    k: Option<usize>,

    /// Restrict retrieval to one section ("All Sections" for no filter)
    #[arg(long)]
    section: Option<String>,

    /// Do not append the source sections to answers
    #[arg(long, default_value_t = false)]
    no_sources: bool,

    /// Print the retrieved chunks with their tier, weight and similarity
    #[arg(long, default_value_t = false)]
    details: bool,

    /// OpenAI API key for the answering model
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat model used for answers (overrides `completion.model`)
    #[arg(long)]
    model: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Command::Sections { ingest } => {
            apply_ingest_overrides(&mut config, &ingest);
            config.validate()?;
            list_sections(&config, &ingest.pdf)
        }
        Command::Ask {
            ingest,
            query,
            question,
        } => {
            apply_ingest_overrides(&mut config, &ingest);
            apply_query_overrides(&mut config, &query);
            config.validate()?;
            let client = completion_client(&config, &query)?;
            let embedder = load_embedder(&config, ingest.mock_embedder)?;
            let session =
                DocumentSession::ingest_pdf(&ingest.pdf, embedder.as_ref(), config.chunker_options())?;
            let retriever = Retriever::new(embedder.as_ref());
            let answerer = Answerer::new(&client, config.answer_options());

            match ask_once(&session, &retriever, &answerer, &config, &question, query.details) {
                Err(SessionError::NoMatchingContent { filter }) => {
                    println!("No content found in section \"{filter}\".");
                    Ok(())
                }
                other => other.map_err(Into::into),
            }
        }
        Command::Chat { ingest, query } => {
            apply_ingest_overrides(&mut config, &ingest);
            apply_query_overrides(&mut config, &query);
            config.validate()?;
            let client = completion_client(&config, &query)?;
            let embedder = load_embedder(&config, ingest.mock_embedder)?;
            let session =
                DocumentSession::ingest_pdf(&ingest.pdf, embedder.as_ref(), config.chunker_options())?;
            let retriever = Retriever::new(embedder.as_ref());
            let answerer = Answerer::new(&client, config.answer_options());
            chat(&session, &retriever, &answerer, &config, query.details)
        }
        Command::DownloadModel { dir } => {
            let dir = dir.unwrap_or_else(|| config.model_dir());
            download_model_files(&dir)?;
            println!("Model files ready in {}", dir.display());
            Ok(())
        }
    }
}

fn parse_top_k(value: &str) -> Result<usize, String> {
    let k: usize = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if CLI_TOP_K.contains(&k) {
        Ok(k)
    } else {
        Err(format!(
            "k must be between {} and {}",
            CLI_TOP_K.start(),
            CLI_TOP_K.end()
        ))
    }
}

fn apply_ingest_overrides(config: &mut Config, ingest: &IngestArgs) {
    if let Some(size) = ingest.chunk_size {
        config.chunk_size = size;
    }
    if let Some(overlap) = ingest.chunk_overlap {
        config.chunk_overlap = overlap;
    }
}

fn apply_query_overrides(config: &mut Config, query: &QueryArgs) {
    if let Some(k) = query.k {
        config.search_top_k = k;
    }
    if let Some(section) = &query.section {
        config.section_filter = section.clone();
    }
    if query.no_sources {
        config.show_sources = false;
    }
    if let Some(model) = &query.model {
        config.completion.model = model.clone();
    }
}

fn completion_client(config: &Config, query: &QueryArgs) -> Result<OpenAiClient> {
    let key = query.api_key.clone().unwrap_or_default();
    OpenAiClient::new(
        key,
        config.completion.api_base.clone(),
        config.completion_timeout(),
    )
    .context("OPENAI_API_KEY must be set to a valid key to answer questions")
}

fn load_embedder(config: &Config, mock: bool) -> Result<Box<dyn Embedder>> {
    if mock {
        warn!("Using the mock embedder; retrieval quality is not representative");
        return Ok(Box::new(MockEmbedder::new(config.model.dimensions)));
    }

    let dir = config.model_dir();
    if !all_files_present(&dir) {
        bail!(
            "model files missing in {}; run `paperrag download-model` first",
            dir.display()
        );
    }
    info!("Loading embedding model {}", config.model.name);
    let embedder = OnnxEmbedder::new(&dir, config.model.dimensions, DEFAULT_MAX_LENGTH)?;
    Ok(Box::new(embedder))
}

/// Prints sections and chunk counts; needs no embedding model.
fn list_sections(config: &Config, path: &Path) -> Result<()> {
    let text = pdf::extract_text(path)?;
    let detected = sections::detect_sections(&text);
    let chunks = chunker::chunk_sections(&detected, config.chunker_options());

    println!("{} ({} chunks)", path.display(), chunks.len());
    for (name, count) in session::section_counts(&chunks) {
        println!("  {name} ({count})");
    }
    Ok(())
}

fn ask_once<E, C>(
    session: &DocumentSession,
    retriever: &Retriever<'_, E>,
    answerer: &Answerer<'_, C>,
    config: &Config,
    question: &str,
    details: bool,
) -> Result<(), SessionError>
where
    E: Embedder + ?Sized,
    C: paperrag::llm::CompletionClient + ?Sized,
{
    let filter = config.section_filter();
    let answered = session.ask(retriever, answerer, question, config.search_top_k, &filter)?;
    if details {
        print_details(&answered.retrieval);
    }
    println!("{}", answered.answer);
    Ok(())
}

fn chat<E, C>(
    session: &DocumentSession,
    retriever: &Retriever<'_, E>,
    answerer: &Answerer<'_, C>,
    config: &Config,
    details: bool,
) -> Result<()>
where
    E: Embedder + ?Sized,
    C: paperrag::llm::CompletionClient + ?Sized,
{
    let sections: Vec<String> = session
        .section_counts()
        .into_iter()
        .map(|(name, count)| format!("{name} ({count})"))
        .collect();
    println!("Paper loaded: {} chunks", session.len());
    println!("Sections: {}", sections.join(", "));
    println!("Filter: {}", SectionFilter::from_label(&config.section_filter));
    println!("Type a question, or `exit` to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        stdout.flush().context("failed to flush stdout")?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read from stdin")?;
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match ask_once(session, retriever, answerer, config, question, details) {
            Ok(()) => {}
            Err(SessionError::NoMatchingContent { filter }) => {
                println!("No content found in section \"{filter}\".");
            }
            Err(SessionError::Answer(AnswerError::Completion(e))) if e.is_retryable() => {
                eprintln!("Error generating answer: {e} (temporary, try again)");
            }
            Err(e) => eprintln!("Error: {e}"),
        }
        println!();
    }
    Ok(())
}

fn print_details(retrieval: &RetrievalResult<'_>) {
    println!("Retrieved chunks:");
    for (rank, item) in retrieval.items.iter().enumerate() {
        println!(
            "#{} [{}] {} | weight {:.1}% | similarity {:.4}",
            rank + 1,
            Tier::for_rank(rank),
            item.chunk.section,
            item.weight * 100.0,
            item.similarity
        );
        println!("{}\n", preview(&item.chunk.text, PREVIEW_CHARS));
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
