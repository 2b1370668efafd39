//! Heading-based section detection for extracted paper text.
//!
//! A line is a heading only when its whole trimmed content matches one of the
//! standard scientific-paper section names. Headings embedded in a sentence,
//! numbered headings ("2. Methods"), non-English headings and interleaved
//! two-column layouts are not recognised.
use std::sync::LazyLock;

use regex::RegexSet;

/// Name given to the text that precedes the first recognised heading.
pub const HEADER_SECTION: &str = "Header";

/// Anchored whole-line heading patterns, matched against the lowercased,
/// trimmed line.
const HEADING_PATTERNS: &[&str] = &[
    r"^abstract$",
    r"^introduction$",
    r"^background$",
    r"^related work$",
    r"^literature review$",
    r"^methodology$",
    r"^methods$",
    r"^materials and methods$",
    r"^experimental setup$",
    r"^results$",
    r"^findings$",
    r"^results and discussion$",
    r"^discussion$",
    r"^conclusions?$",
    r"^future work$",
    r"^references$",
    r"^bibliography$",
    r"^acknowledge?ments?$",
    r"^appendix$",
];

static HEADINGS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(HEADING_PATTERNS.iter().map(|p| format!("(?i){p}")))
        .expect("heading patterns are valid")
});

/// A contiguous run of source text under one heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    /// Zero-based line index of the heading (0 for the header section).
    pub start_line: usize,
    /// Raw text of the section, heading line excluded, terminators preserved.
    pub content: String,
}

impl Section {
    fn new(name: impl Into<String>, start_line: usize) -> Self {
        Self {
            name: name.into(),
            start_line,
            content: String::new(),
        }
    }

    fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Returns `true` when `line` is, on its own, a recognised section heading.
#[must_use]
pub fn is_heading(line: &str) -> bool {
    let normalized = line.trim().to_lowercase();
    !normalized.is_empty() && HEADINGS.is_match(&normalized)
}

/// Partitions `text` into sections in document order.
///
/// Sections whose content is blank are dropped. A document without any
/// recognised heading yields a single [`HEADER_SECTION`] section.
#[must_use]
pub fn detect_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = Section::new(HEADER_SECTION, 0);

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let bare = line.trim_end_matches(['\n', '\r']);
        if is_heading(bare) {
            let next = Section::new(title_case(bare.trim()), index);
            let finished = std::mem::replace(&mut current, next);
            if !finished.is_blank() {
                sections.push(finished);
            }
        } else {
            current.content.push_str(line);
        }
    }

    if !current.is_blank() {
        sections.push(current);
    }

    sections
}

/// Title-cases a heading: the first letter of every alphabetic run is
/// uppercased and the rest lowercased ("RELATED WORK" -> "Related Work").
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_standard_paper_headings() {
        let text = "Abstract\nWe study things.\nIntroduction\nThings matter.\nMethods\nWe used ImageNet.\nResults\nIt worked.\nConclusion\nDone.\n";
        let sections = detect_sections(text);
        assert_eq!(
            names(&sections),
            vec!["Abstract", "Introduction", "Methods", "Results", "Conclusion"]
        );
        assert_eq!(sections[2].content, "We used ImageNet.\n");
        assert_eq!(sections[2].start_line, 4);
    }

    #[test]
    fn test_leading_text_becomes_header() {
        let text = "A Study of Things\nJ. Doe\nAbstract\nSummary here.\n";
        let sections = detect_sections(text);
        assert_eq!(names(&sections), vec!["Header", "Abstract"]);
        assert_eq!(sections[0].start_line, 0);
        assert_eq!(sections[0].content, "A Study of Things\nJ. Doe\n");
    }

    #[test]
    fn test_blank_header_is_dropped() {
        let text = "\n   \nABSTRACT\nBody.\n";
        let sections = detect_sections(text);
        assert_eq!(names(&sections), vec!["Abstract"]);
    }

    #[test]
    fn test_no_headings_single_header_section() {
        let text = "Just some text\nwith no headings at all.";
        let sections = detect_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, HEADER_SECTION);
        assert_eq!(sections[0].content, text);
    }

    #[test]
    fn test_empty_document() {
        assert!(detect_sections("").is_empty());
        assert!(detect_sections("  \n\n ").is_empty());
    }

    #[test]
    fn test_heading_word_mid_sentence_is_not_boundary() {
        let text = "Methods\nThe results of the introduction were good.\nIn conclusion we stop.\n";
        let sections = detect_sections(text);
        assert_eq!(names(&sections), vec!["Methods"]);
    }

    #[test]
    fn test_case_and_whitespace_normalisation() {
        assert!(is_heading("  RELATED WORK  "));
        assert!(is_heading("Materials and Methods"));
        assert!(is_heading("Conclusions"));
        assert!(is_heading("Acknowledgements"));
        assert!(is_heading("acknowledgment"));
        assert!(!is_heading("2. Methods"));
        assert!(!is_heading("Methods used"));
        assert!(!is_heading(""));
    }

    #[test]
    fn test_heading_names_title_cased() {
        let text = "related work\nPrior art.\nmaterials and methods\nStuff.\n";
        let sections = detect_sections(text);
        assert_eq!(names(&sections), vec!["Related Work", "Materials And Methods"]);
    }

    #[test]
    fn test_empty_section_between_headings_dropped() {
        let text = "Abstract\n\nIntroduction\nText.\n";
        let sections = detect_sections(text);
        assert_eq!(names(&sections), vec!["Introduction"]);
    }

    #[test]
    fn test_contents_reproduce_text_without_headings() {
        let text = "Title line\r\nAbstract\r\nFirst.\r\nSecond.\nResults\nNumbers 1, 2, 3.\nlast line";
        let sections = detect_sections(text);
        let joined: String = sections.iter().map(|s| s.content.as_str()).collect();

        let expected: String = text
            .split_inclusive('\n')
            .filter(|line| !is_heading(line.trim_end_matches(['\n', '\r'])))
            .collect();
        assert_eq!(joined, expected);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("RESULTS AND DISCUSSION"), "Results And Discussion");
        assert_eq!(title_case("future work"), "Future Work");
    }
}
