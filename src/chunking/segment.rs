//! Heading-scoped section splitting and retrieval-chunk extraction.
//!
//! A document is split on markdown heading lines into `(heading, body)`
//! sections. Within each section three kinds of chunks are extracted:
//!
//! - bullet lines long enough to stand alone become micro-chunks,
//! - pipe-delimited table rows (separator rows excluded) become micro-chunks,
//! - the remaining body, with micro-chunk lines removed, is split into
//!   overlapping fixed-size word windows.
//!
//! Short, dense micro-chunks (a price, a single fact) retrieve better than
//! the same fact buried in a paragraph; the window overlap keeps facts that
//! straddle a boundary retrievable. Every chunk is prefixed with document
//! provenance (title, URL, section heading) folded into its text.

use std::sync::LazyLock;

use regex::Regex;

use crate::chunking::normalize::normalize_numbers;
use crate::config::ChunkingConfig;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s").expect("heading pattern"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([*\-]|•)\s+").expect("bullet pattern"));
static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\|[-\s|]+\|\s*$").expect("table separator pattern"));

/// One heading-scoped slice of a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    /// Heading text with leading `#` markers stripped; empty for content
    /// that precedes the first heading.
    pub heading: String,
    /// Body text accumulated up to the next heading.
    pub body: String,
}

/// Splits markdown into ordered `(heading, body)` sections.
///
/// Leading content before any heading is emitted with an empty heading.
/// Non-empty input always yields at least one section, even with zero
/// heading lines.
pub fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current_heading = "";
    let mut buffer: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        if HEADING.is_match(line) {
            if !buffer.is_empty() {
                sections.push(Section {
                    heading: strip_heading_markers(current_heading),
                    body: buffer.join("\n").trim().to_string(),
                });
                buffer.clear();
            }
            current_heading = line;
        } else {
            buffer.push(line);
        }
    }
    if !buffer.is_empty() {
        sections.push(Section {
            heading: strip_heading_markers(current_heading),
            body: buffer.join("\n").trim().to_string(),
        });
    }

    if sections.is_empty() && !markdown.is_empty() {
        sections.push(Section {
            heading: strip_heading_markers(current_heading),
            body: if current_heading.is_empty() {
                markdown.trim().to_string()
            } else {
                String::new()
            },
        });
    }
    sections
}

fn strip_heading_markers(line: &str) -> String {
    line.trim_matches(|c| c == '#' || c == ' ').to_string()
}

/// Document-level provenance folded into every chunk's text.
#[derive(Clone, Debug, Default)]
pub struct Provenance {
    pub title: String,
    pub url: String,
}

/// Extracts retrieval chunks from cleaned document text.
#[derive(Clone, Debug)]
pub struct Segmenter {
    config: ChunkingConfig,
}

impl Segmenter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Turns one cleaned document into chunks: bullet and table micro-chunks
    /// first, then overlapping word windows over the remaining body.
    pub fn chunk_document(&self, provenance: &Provenance, content: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        for section in split_sections(content) {
            self.chunk_section(provenance, &section, &mut chunks);
        }
        chunks
    }

    fn chunk_section(&self, provenance: &Provenance, section: &Section, out: &mut Vec<String>) {
        let mut preamble: Vec<String> = Vec::new();
        if !provenance.title.is_empty() {
            preamble.push(format!("Title: {}", provenance.title));
        }
        if !provenance.url.is_empty() {
            preamble.push(format!("URL: {}", provenance.url));
        }
        if !section.heading.is_empty() {
            preamble.push(format!("Section: {}", section.heading));
        }
        let preamble = preamble.join("\n");

        let body = normalize_numbers(&section.body);
        let mut consumed: Vec<&str> = Vec::new();

        // Bullets -> micro-chunks, capped per section.
        let mut bullet_count = 0usize;
        for line in body.lines() {
            if let Some(found) = BULLET.find(line) {
                let bullet = line[found.end()..].trim();
                if bullet.len() >= self.config.min_micro_bullet {
                    out.push(compose(&preamble, &format!("Bullet: {bullet}")));
                    consumed.push(line);
                    bullet_count += 1;
                    if bullet_count >= self.config.max_bullets_per_section {
                        break;
                    }
                }
            }
        }

        // Table rows -> micro-chunks; separator rows are dropped from the
        // body without producing a chunk.
        let mut row_count = 0usize;
        for line in body.lines() {
            if TABLE_SEPARATOR.is_match(line) {
                consumed.push(line);
                continue;
            }
            if line.matches('|').count() >= 2 {
                let row = line
                    .trim()
                    .trim_start_matches('|')
                    .trim_end_matches('|')
                    .split('|')
                    .map(str::trim)
                    .collect::<Vec<_>>()
                    .join(" | ");
                if row.len() >= self.config.min_table_row {
                    out.push(compose(&preamble, &format!("TableRow: {row}")));
                    consumed.push(line);
                    row_count += 1;
                    if row_count >= self.config.max_table_rows_per_section {
                        break;
                    }
                }
            }
        }

        // Remaining body, with micro-chunk lines removed, becomes windows.
        let remainder = body
            .lines()
            .filter(|line| !consumed.contains(line))
            .collect::<Vec<_>>()
            .join("\n");
        let remainder = remainder.trim();
        if remainder.is_empty() {
            return;
        }
        let paragraph = compose(&preamble, remainder);
        if paragraph.len() >= self.config.min_para {
            for window in word_windows(&paragraph, self.config.window, self.config.overlap) {
                if window.len() >= self.config.min_para {
                    out.push(window);
                }
            }
        }
    }
}

fn compose(preamble: &str, body: &str) -> String {
    if preamble.is_empty() {
        body.trim().to_string()
    } else if body.is_empty() {
        preamble.trim().to_string()
    } else {
        format!("{preamble}\n\n{body}").trim().to_string()
    }
}

/// Splits text into overlapping windows of `window` words, stepping by
/// `window - overlap` (minimum step 1).
pub fn word_windows(text: &str, window: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let step = window.saturating_sub(overlap).max(1);
    let mut out = Vec::new();
    let mut start = 0usize;
    while start < words.len() {
        let end = (start + window).min(words.len());
        out.push(words[start..end].join(" "));
        start += step;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(ChunkingConfig::default())
    }

    #[test]
    fn splits_on_headings_with_preamble_section() {
        let md = "intro text\n# First\nbody one\n## Second\nbody two";
        let sections = split_sections(md);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].heading, "");
        assert_eq!(sections[0].body, "intro text");
        assert_eq!(sections[1].heading, "First");
        assert_eq!(sections[1].body, "body one");
        assert_eq!(sections[2].heading, "Second");
        assert_eq!(sections[2].body, "body two");
    }

    #[test]
    fn heading_requires_trailing_whitespace() {
        let sections = split_sections("#not-a-heading\ncontent");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "");
    }

    #[test]
    fn non_empty_input_yields_at_least_one_section() {
        assert_eq!(split_sections("just text").len(), 1);
        assert!(!split_sections("# Lone heading\nx").is_empty());
        assert!(split_sections("").is_empty());
    }

    #[test]
    fn section_bodies_recover_input_text() {
        let md = "start\n# A\nalpha\nbeta\n# B\ngamma";
        let rebuilt: Vec<String> = split_sections(md).into_iter().map(|s| s.body).collect();
        assert_eq!(rebuilt.join("\n"), "start\nalpha\nbeta\ngamma");
    }

    #[test]
    fn short_bullets_are_dropped_long_bullets_become_micro_chunks() {
        let content = "# Intro\n- a very short bullet\n- this bullet is definitely long enough to keep";
        let chunks = segmenter().chunk_document(&Provenance::default(), content);
        let bullets: Vec<&String> = chunks.iter().filter(|c| c.contains("Bullet:")).collect();
        assert_eq!(bullets.len(), 1);
        assert!(bullets[0].contains("this bullet is definitely long enough to keep"));
        assert!(!chunks.iter().any(|c| c.contains("a very short bullet") && c.contains("Bullet:")));
    }

    #[test]
    fn bullet_cap_limits_micro_chunks_per_section() {
        let config = ChunkingConfig {
            max_bullets_per_section: 2,
            min_micro_bullet: 10,
            ..Default::default()
        };
        let content = "# L\n- first bullet long enough\n- second bullet long enough\n- third bullet long enough";
        let chunks = Segmenter::new(config).chunk_document(&Provenance::default(), content);
        let bullets = chunks.iter().filter(|c| c.contains("Bullet:")).count();
        assert_eq!(bullets, 2);
    }

    #[test]
    fn table_rows_become_micro_chunks_separators_do_not() {
        let content = "# Plans\n| Plan | Price | Seats |\n| --- | --- | --- |\n| Pro | $49 | 10 users |";
        let chunks = segmenter().chunk_document(&Provenance::default(), content);
        let rows: Vec<&String> = chunks.iter().filter(|c| c.contains("TableRow:")).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].contains("Plan | Price | Seats"));
        assert!(rows[1].contains("Pro | $49 (USD 49) | 10 users"));
    }

    #[test]
    fn provenance_is_folded_into_chunks() {
        let provenance = Provenance {
            title: "Acme Pricing".into(),
            url: "https://acme.test/pricing".into(),
        };
        let content = "# Plans\n- this bullet is definitely long enough to keep around";
        let chunks = segmenter().chunk_document(&provenance, content);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.starts_with("Title: Acme Pricing\nURL: https://acme.test/pricing\nSection: Plans"));
        }
    }

    #[test]
    fn micro_chunk_lines_are_removed_from_paragraph_windows() {
        let long_bullet = "- this bullet is long enough to be promoted into a micro chunk";
        let content = format!(
            "# S\n{long_bullet}\nThe paragraph body continues here with enough words to pass the minimum length check for windows."
        );
        let chunks = segmenter().chunk_document(&Provenance::default(), &content);
        let windows: Vec<&String> = chunks.iter().filter(|c| !c.contains("Bullet:")).collect();
        assert_eq!(windows.len(), 1);
        assert!(!windows[0].contains("promoted into a micro chunk"));
        assert!(windows[0].contains("paragraph body continues"));
    }

    #[test]
    fn word_windows_overlap() {
        let words: Vec<String> = (0..10).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");
        let windows = word_windows(&text, 4, 2);
        assert_eq!(windows[0], "w0 w1 w2 w3");
        assert_eq!(windows[1], "w2 w3 w4 w5");
        // Last window covers the tail even when shorter than `window`.
        assert!(windows.last().unwrap().contains("w9"));
    }

    #[test]
    fn numeric_normalization_applies_to_section_bodies() {
        let config = ChunkingConfig {
            min_para: 10,
            ..Default::default()
        };
        let chunks = Segmenter::new(config).chunk_document(
            &Provenance::default(),
            "The enterprise plan costs $200 for every seat you license.",
        );
        assert!(chunks.iter().any(|c| c.contains("$200 (USD 200)")));
    }
}
