use std::collections::VecDeque;

use super::sections::Section;

/// Separators tried in order: paragraphs, lines, sentences, words, characters.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// A bounded slice of one section's content, sized for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Name of the owning section.
    pub section: String,
    /// `start_line` of the owning section.
    pub section_start: usize,
}

/// Character budgets for the splitter (counted in `char`s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkerOptions {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Size clamped to at least one character.
    fn size(&self) -> usize {
        self.chunk_size.max(1)
    }

    /// Overlap clamped below the size so every merge makes progress.
    fn overlap(&self) -> usize {
        self.chunk_overlap.min(self.size() - 1)
    }
}

/// Splits every section into chunks, keeping document order.
///
/// A chunk never spans two sections and blank pieces are discarded.
pub fn chunk_sections(sections: &[Section], options: ChunkerOptions) -> Vec<Chunk> {
    sections
        .iter()
        .flat_map(|section| {
            split_text(&section.content, options)
                .into_iter()
                .map(move |text| Chunk {
                    text,
                    section: section.name.clone(),
                    section_start: section.start_line,
                })
        })
        .collect()
}

/// Splits `text` into trimmed pieces of at most `chunk_size` characters.
///
/// Breaks at the coarsest separator that occurs in the text and recurses with
/// finer separators for pieces that are still too long. Consecutive pieces
/// share at most `chunk_overlap` characters of context.
pub fn split_text(text: &str, options: ChunkerOptions) -> Vec<String> {
    let mut chunks = Vec::new();
    split_recursive(text, SEPARATORS, options, &mut chunks);
    chunks
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    options: ChunkerOptions,
    out: &mut Vec<String>,
) {
    // Pick the first separator present; "" always matches.
    let (idx, separator) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
        .map(|(i, sep)| (i, *sep))
        .unwrap_or((separators.len(), ""));
    let finer = separators.get(idx + 1..).unwrap_or(&[]);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(separator).collect()
    };

    let mut fitting: Vec<&str> = Vec::new();
    for piece in pieces {
        if char_len(piece) <= options.size() {
            fitting.push(piece);
            continue;
        }

        if !fitting.is_empty() {
            merge_pieces(&fitting, options, out);
            fitting.clear();
        }

        if finer.is_empty() {
            push_trimmed(piece, out);
        } else {
            split_recursive(piece, finer, options, out);
        }
    }

    if !fitting.is_empty() {
        merge_pieces(&fitting, options, out);
    }
}

/// Greedily packs small pieces into chunks, carrying a tail of at most
/// `chunk_overlap` characters from one chunk into the next.
fn merge_pieces(pieces: &[&str], options: ChunkerOptions, out: &mut Vec<String>) {
    let size = options.size();
    let overlap = options.overlap();

    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);

        if total + len > size && !window.is_empty() {
            push_trimmed(&window.iter().copied().collect::<String>(), out);

            while total > overlap || (total + len > size && total > 0) {
                match window.pop_front() {
                    Some(front) => total -= char_len(front),
                    None => break,
                }
            }
        }

        window.push_back(piece);
        total += len;
    }

    if !window.is_empty() {
        push_trimmed(&window.iter().copied().collect::<String>(), out);
    }
}

fn push_trimmed(piece: &str, out: &mut Vec<String>) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
