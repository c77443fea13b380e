//! Text cleanup applied to every document before segmentation.
//!
//! The normalizer is a pure function over text: Unicode NFKC, whitespace
//! collapsing, line-wise removal of navigation/legal/social boilerplate, and
//! numeric-token expansion that keeps the original token while appending a
//! normalized restatement (so substring retrieval matches both spellings).

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::ChunkingConfig;

static NAV_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(home|about|blog|pricing|contact|careers)(\s*[›»/|•]\s*){2,}")
        .expect("nav line pattern")
});
static TOC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(table\s+of\s+contents|toc)\s*$").expect("toc pattern")
});
static PRICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$ ?(\d+(?:\.\d+)?)").expect("price pattern"));
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})%").expect("percent pattern"));
static PER_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b/mo\b").expect("per-month pattern"));
static PER_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b/yr\b").expect("per-year pattern"));

/// Cleans raw document text. See the module docs for the passes applied.
#[derive(Clone, Debug)]
pub struct Normalizer {
    boilerplate: Vec<String>,
}

impl Normalizer {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            boilerplate: config
                .boilerplate
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    /// Removes boilerplate lines and collapses whitespace. Headings and body
    /// content survive. Empty or whitespace-only input yields an empty
    /// string, never an error.
    pub fn clean(&self, text: &str) -> String {
        let text: String = text.replace('\u{a0}', " ").nfkc().collect();
        let mut out: Vec<&str> = Vec::new();
        let mut blank_run = 0usize;
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                blank_run += 1;
                if blank_run <= 1 {
                    out.push("");
                }
                continue;
            }
            blank_run = 0;
            let low = line.to_lowercase();
            if self.boilerplate.iter().any(|g| low.contains(g.as_str())) {
                continue;
            }
            if NAV_LINE.is_match(line) || TOC_LINE.is_match(line) {
                continue;
            }
            out.push(line);
        }
        collapse_blank_runs(&out.join("\n"))
    }
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blanks = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blanks += 1;
            if blanks > 1 {
                continue;
            }
        } else {
            blanks = 0;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
    }
    out.trim().to_string()
}

/// Rewrites numeric tokens so a normalized restatement rides along with the
/// original: `$50` becomes `$50 (USD 50)`, `20%` becomes `20% (percent 20)`,
/// and `/mo` / `/yr` expand to `per month` / `per year`.
pub fn normalize_numbers(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let text = PRICE.replace_all(text, "$$${1} (USD ${1})");
    let text = PERCENT.replace_all(&text, "${1}% (percent ${1})");
    let text = PER_MONTH.replace_all(&text, " per month");
    PER_YEAR.replace_all(&text, " per year").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> Normalizer {
        Normalizer::new(&ChunkingConfig::default())
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(normalizer().clean(""), "");
        assert_eq!(normalizer().clean("   \n\n\t "), "");
    }

    #[test]
    fn strips_boilerplate_lines_but_keeps_content() {
        let input = "# Pricing\nOur plans start at $10.\nSubscribe to our newsletter\nFollow us on Twitter\nAll rights reserved.";
        let cleaned = normalizer().clean(input);
        assert!(cleaned.contains("# Pricing"));
        assert!(cleaned.contains("plans start"));
        assert!(!cleaned.to_lowercase().contains("newsletter"));
        assert!(!cleaned.to_lowercase().contains("twitter"));
        assert!(!cleaned.to_lowercase().contains("rights reserved"));
    }

    #[test]
    fn strips_nav_breadcrumbs_and_toc() {
        let input = "Home › Blog › Pricing › Plans\nTable of Contents\nReal content stays";
        let cleaned = normalizer().clean(input);
        assert_eq!(cleaned, "Real content stays");
    }

    #[test]
    fn collapses_blank_line_runs() {
        let cleaned = normalizer().clean("a\n\n\n\n\nb");
        assert_eq!(cleaned, "a\n\nb");
    }

    #[test]
    fn applies_nfkc_and_nbsp_replacement() {
        // U+FF21 FULLWIDTH LATIN CAPITAL A normalizes to 'A' under NFKC.
        let cleaned = normalizer().clean("\u{ff21}cme\u{a0}Corp");
        assert_eq!(cleaned, "Acme Corp");
    }

    #[test]
    fn rewrites_prices_and_percentages() {
        assert_eq!(normalize_numbers("The price is $50"), "The price is $50 (USD 50)");
        assert_eq!(normalize_numbers("save 20% today"), "save 20% (percent 20) today");
    }

    #[test]
    fn expands_per_month_and_per_year() {
        assert_eq!(normalize_numbers("starting at 49/mo"), "starting at 49 per month");
        assert_eq!(normalize_numbers("2024/yr plan"), "2024 per year plan");
    }

    #[test]
    fn normalize_numbers_is_identity_without_numeric_tokens() {
        assert_eq!(normalize_numbers("plain text"), "plain text");
        assert_eq!(normalize_numbers(""), "");
    }
}
