//! Structural validation of normalized markup.
//!
//! This is a cheap gate, not a parser: it catches the failure modes the
//! normalizer cannot repair (nothing left, no graph header, truncated body)
//! before the markup is sent to the render service. Anything subtler is left
//! to the render service's syntax probe.

use crate::error::MarkupError;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:strict\s+)?(?:di)?graph").unwrap());

/// Check that `markup` looks like a complete graph description.
///
/// Returns the input unchanged on success so calls can be chained.
pub fn validate(markup: &str) -> Result<&str, MarkupError> {
    let trimmed = markup.trim();
    if trimmed.is_empty() {
        return Err(MarkupError::EmptyMarkup);
    }
    if !RE_KEYWORD.is_match(&trimmed.to_lowercase()) {
        return Err(MarkupError::MissingKeyword);
    }

    let open = markup.matches('{').count();
    let close = markup.matches('}').count();
    if open != close {
        return Err(MarkupError::UnbalancedBraces { open, close });
    }

    Ok(markup)
}

/// Total form of [`validate`]: `(true, "")` or `(false, reason)`.
pub fn validation_report(markup: &str) -> (bool, String) {
    match validate(markup) {
        Ok(_) => (true, String::new()),
        Err(e) => (false, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_markup() {
        assert_eq!(validate(""), Err(MarkupError::EmptyMarkup));
        assert_eq!(validate("  \n "), Err(MarkupError::EmptyMarkup));
        assert_eq!(
            validation_report(""),
            (false, "DOT code is empty".to_string())
        );
    }

    #[test]
    fn missing_keyword() {
        assert_eq!(validate("not a graph at all"), Err(MarkupError::MissingKeyword));
        let (ok, reason) = validation_report("flowchart { a }");
        assert!(!ok);
        assert!(reason.contains("digraph"), "got: {reason}");
    }

    #[test]
    fn keyword_is_case_insensitive() {
        assert!(validate("DiGraph G { a -> b }").is_ok());
        assert!(validate("  GRAPH { a -- b }  ").is_ok());
    }

    #[test]
    fn strict_prefix_is_accepted() {
        assert!(validate("strict digraph G { a -> b; }").is_ok());
        assert!(validate("STRICT graph { a -- b }").is_ok());
        assert_eq!(
            validate("strict G { a -> b; }"),
            Err(MarkupError::MissingKeyword)
        );
    }

    #[test]
    fn unbalanced_braces() {
        assert_eq!(
            validate("digraph G { A -> B"),
            Err(MarkupError::UnbalancedBraces { open: 1, close: 0 })
        );
        assert_eq!(
            validation_report("digraph G { a; }}").1,
            "Unbalanced braces: 1 opening, 2 closing"
        );
    }

    #[test]
    fn valid_markup_is_returned_unchanged() {
        let markup = "digraph G {\n  subgraph cluster_0 { a; }\n  a -> b;\n}";
        assert_eq!(validate(markup), Ok(markup));
        assert_eq!(validation_report(markup), (true, String::new()));
    }
}
