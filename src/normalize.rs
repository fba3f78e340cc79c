//! Cleaning and splitting of raw consultation responses.
//!
//! Responses arrive as free text pasted from surveys: editorial annotations
//! in square brackets, parenthetical asides, stuttered punctuation, ragged
//! whitespace. `clean` normalizes a response before it is embedded in a
//! prompt; `split_statements` breaks a compound response into the atomic
//! statements a coder would consider separately.

use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("bracket regex"));
static PARENTHESIZED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").expect("paren regex"));
static DOT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").expect("dot regex"));
static BANG_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").expect("bang regex"));
static QUESTION_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").expect("question regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Statement delimiters: coordinating/contrasting conjunctions as whole
/// words, or a literal `;` / `.`.
static STATEMENT_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:but|however|although|though|and|or)\b|[;.]").expect("split regex")
});

/// Clean a raw response.
///
/// Strips `[...]` and `(...)` spans (non-nested: the first closing delimiter
/// ends the span), collapses runs of repeated `.`/`!`/`?` to a single
/// occurrence, then collapses all whitespace to single spaces and trims.
///
/// Whitespace collapsing runs last so the bracket pass cannot leave a double
/// space behind; this makes `clean` idempotent.
pub fn clean(text: &str) -> String {
    let text = BRACKETED.replace_all(text, "");
    let text = PARENTHESIZED.replace_all(&text, "");
    let text = DOT_RUN.replace_all(&text, ".");
    let text = BANG_RUN.replace_all(&text, "!");
    let text = QUESTION_RUN.replace_all(&text, "?");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    text.trim().to_string()
}

/// Split a compound response into individual statements.
///
/// Splits on word-boundary occurrences of "but", "however", "although",
/// "though", "and", "or" (case-insensitive) and on literal `;` or `.`. Each
/// delimiter is consumed along with its surrounding whitespace. Every
/// fragment is passed through [`clean`]; fragments that clean to nothing are
/// discarded, so leading or trailing delimiters never yield empty entries.
/// Order follows the original text.
pub fn split_statements(text: &str) -> Vec<String> {
    STATEMENT_SPLIT
        .split(text)
        .map(clean)
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_collapses_whitespace_and_trims() {
        assert_eq!(clean("  too   many\t spaces \n"), "too many spaces");
    }

    #[test]
    fn clean_strips_annotations() {
        assert_eq!(
            clean("the bus [inaudible] is late (again) today"),
            "the bus is late today"
        );
    }

    #[test]
    fn clean_collapses_punctuation_runs() {
        assert_eq!(clean("great... really?? yes!!!"), "great. really? yes!");
    }

    #[test]
    fn clean_is_idempotent() {
        let inputs = [
            "a (aside) b",
            "  x [note]   y...  ",
            "plain text",
            "",
            "wow!!(huh)!!",
        ];
        for input in inputs {
            let once = clean(input);
            assert_eq!(clean(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn clean_empty_input() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("   "), "");
        assert_eq!(clean("[all annotation]"), "");
    }

    #[test]
    fn split_on_conjunctions_and_punctuation() {
        let parts = split_statements("it is quicker and more reliable; cheaper too. Better for everyone");
        assert_eq!(
            parts,
            vec!["it is quicker", "more reliable", "cheaper too", "Better for everyone"]
        );
    }

    #[test]
    fn split_is_case_insensitive() {
        let parts = split_statements("good However bad");
        assert_eq!(parts, vec!["good", "bad"]);
    }

    #[test]
    fn split_respects_word_boundaries() {
        // "android" and "organic" contain delimiter words as substrings and
        // must not be split.
        let parts = split_statements("android phones; organic food");
        assert_eq!(parts, vec!["android phones", "organic food"]);
    }

    #[test]
    fn split_discards_empty_fragments_at_edges() {
        let parts = split_statements("and the service is fine.");
        assert_eq!(parts, vec!["the service is fine"]);
        assert!(split_statements("...").is_empty());
    }

    #[test]
    fn split_fragments_are_cleaned() {
        let parts = split_statements("fast [sic] buses and   cheap   fares");
        assert_eq!(parts, vec!["fast buses", "cheap fares"]);
    }

    #[test]
    fn split_never_leaves_delimiter_tokens_at_fragment_edges() {
        let parts = split_statements("a and b but c or d though e");
        for frag in &parts {
            for word in frag.split(' ') {
                let lower = word.to_lowercase();
                assert!(
                    !matches!(lower.as_str(), "but" | "however" | "although" | "though" | "and" | "or"),
                    "delimiter {word:?} survived in fragment {frag:?}"
                );
            }
        }
    }
}
