//! Prompt templates for the three model roles.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth**: tuning what the classifier accepts or how
//!    the describer colours nodes means editing exactly one place.
//!
//! 2. **Testability**: unit tests can inspect prompts directly without a
//!    live model, so a dropped placeholder is caught before it ships.
//!
//! Each template carries one `{placeholder}` that [`fill_template`] replaces.
//! Literal braces in the DOT example are written as-is: only the exact
//! placeholder token is substituted.

/// Placeholder in [`CLASSIFIER_PROMPT`].
pub const INPUT_PLACEHOLDER: &str = "{input_text}";

/// Placeholder in [`SUMMARIZER_PROMPT`].
pub const LECTURE_PLACEHOLDER: &str = "{lecture}";

/// Placeholder in [`DESCRIBER_PROMPT`].
pub const SUMMARY_PLACEHOLDER: &str = "{summary}";

/// Decides whether the input is educational. The reply is one word.
pub const CLASSIFIER_PROMPT: &str = r#"You screen text before it is turned into a knowledge graph. Decide whether the text below is educational or lecture-style material.

Accept (VALID):
- lectures, lessons and course notes
- tutorials, how-to guides and technical documentation
- explanatory or scientific articles
- training material of any subject

Reject (INVALID):
- personal stories, diaries and casual chat
- fiction, poetry and other creative writing
- advertising or promotional copy
- news items with nothing to learn from
- bare lists with no explanation, random characters or gibberish

Judge the kind of content only. Do not grade how well it is written or organised.

Answer with a single word, VALID or INVALID.

Text: {input_text}"#;

/// Produces the indented hierarchical summary the describer consumes.
pub const SUMMARIZER_PROMPT: &str = r#"LANGUAGE: write the whole summary in the same language as the lecture. Arabic input gets an Arabic summary, English input an English one. Never translate and never mix languages.

Summarise the lecture below as a hierarchy. Start with the main topic, then its subtopics, then finer points. Mark depth with leading hyphens:

Main Topic:
- Subtopic
-- Sub-subtopic
--- Detail

Rules:
- No paragraphs. The output is only the indented list.
- Every entry gets a short definition or explanation. Where it helps, say what it does, where it is used, give a simple example, and note strengths or weaknesses.
- Cover the broad structure and the specifics: when a topic lists methods or algorithms, give each one its own entry with sub-points.
- Be concise. No filler and no repetition.

Style example (English here; follow the lecture's language):

Databases:
- Definition: Organised collections of data with controlled access
- Kinds:
-- Relational
--- Data: Tables of rows and columns
--- Query language: SQL
--- Example: Storing orders and customers
-- Document
--- Data: Nested records such as JSON
--- Example: Product catalogues with varying fields

Lecture: {lecture}

Reply with the hierarchical summary only, in the lecture's language, with no introduction or closing remarks."#;

/// Turns the summary into Graphviz DOT markup.
pub const DESCRIBER_PROMPT: &str = r#"LANGUAGE: every node label must be in the same language as the summary. Never translate labels.

Convert the hierarchical summary below into a Graphviz DOT digraph. Depth in the summary is marked with leading hyphens:

Main Topic:
- Subtopic
-- Sub-subtopic
--- Detail

Requirements:
- Output valid DOT that the dot tool renders without errors.
- Lay the graph out left to right with rankdir=LR.
- One node per summary entry, drawn with shape=box and style=filled.
- Node IDs are simple identifiers (letters, digits, underscores) or quoted strings. Put the visible text in the label attribute, never in the ID.
- Edges join node IDs along parent-child lines.
- Give siblings the same light colour so each group of children reads as one block, using color=lightgray, lightblue, lightgreen and similar light shades.

Example (English labels; use the summary's language):
digraph TopicMap {
    rankdir=LR;
    node [shape=box, style=filled];

    DB [label="Databases", color=lightgray];

    Relational [label="Relational\nTables and SQL", color=lightblue];
    Document [label="Document\nNested JSON records", color=lightblue];

    DB -> Relational;
    DB -> Document;
}

Summary: {summary}

Reply with the DOT code only. No explanations, no surrounding text and no backticks or markdown code fences."#;

/// A short sample lecture for trying the pipeline end to end.
pub const EXAMPLE_LECTURE: &str = "Welcome to this introduction to databases. A database is an organised \
collection of data that software can store, query and update safely. The most common kind is the \
relational database, which keeps data in tables made of rows and columns and is queried with SQL. \
Relational systems enforce schemas and transactions, so a bank transfer either completes fully or not \
at all. Document databases take a different approach: each record is a nested document, often JSON, \
and records in the same collection may have different fields. That flexibility suits product catalogues \
and content management. Key-value stores are simpler still, mapping a key to an opaque value, and they \
excel at caching and session storage. Finally, graph databases store entities and the relationships \
between them directly, which makes questions such as friends of friends in a social network fast to \
answer. Choosing between these models depends on the shape of your data and the queries you need.";

/// Substitute `value` for `placeholder` in `template`.
pub fn fill_template(template: &str, placeholder: &str, value: &str) -> String {
    template.replace(placeholder, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_template_has_its_placeholder_once() {
        for (template, placeholder) in [
            (CLASSIFIER_PROMPT, INPUT_PLACEHOLDER),
            (SUMMARIZER_PROMPT, LECTURE_PLACEHOLDER),
            (DESCRIBER_PROMPT, SUMMARY_PLACEHOLDER),
        ] {
            assert_eq!(template.matches(placeholder).count(), 1, "{placeholder}");
        }
    }

    #[test]
    fn fill_template_keeps_literal_braces() {
        let filled = fill_template(DESCRIBER_PROMPT, SUMMARY_PLACEHOLDER, "AI:\n- ML");
        assert!(filled.contains("digraph TopicMap {"));
        assert!(filled.contains("Summary: AI:\n- ML"));
        assert!(!filled.contains(SUMMARY_PLACEHOLDER));
    }

    #[test]
    fn classifier_asks_for_one_word() {
        assert!(CLASSIFIER_PROMPT.contains("VALID or INVALID"));
    }

    #[test]
    fn describer_requests_filled_boxes() {
        assert!(DESCRIBER_PROMPT.contains("rankdir=LR"));
        assert!(DESCRIBER_PROMPT.contains("style=filled"));
    }

    #[test]
    fn example_lecture_is_long_enough() {
        assert!(EXAMPLE_LECTURE.chars().count() > 500);
    }
}
