//! Normalization: turn raw model output into renderable DOT markup.
//!
//! ## Why is normalization necessary?
//!
//! The describer is asked for "only the DOT code", and models mostly comply.
//! The rest of the time the answer arrives wrapped in a ` ```dot ` fence,
//! introduced with "Here's the DOT code:", signed off with "Hope this helps!",
//! or styled with `color=lightblue` on a `style=filled` node, which paints
//! the border and leaves the background white. The render service accepts
//! none of the conversational text and renders the colour mistake faithfully.
//!
//! ## Stage Order
//!
//! Extraction runs first and is repeated until it stops changing the text:
//! every extraction stage only removes characters, so the loop terminates and
//! its result is a fixed point. Attribute stages then run once, in order:
//!
//! 1. Strip the first code fence (` ```dot `, ` ```graphviz `, bare ` ``` `)
//! 2. Trim stray backtick runs
//! 3. Strip known chatter prefixes and suffixes
//! 4. Anchor on the first `graph`/`digraph` header
//! 5. Drop prose after the brace that closes the graph body
//! 6. On filled graphs, move light `color=` values to `fillcolor=`
//! 7. On filled graphs, give node lists an explicit `fontcolor=black`
//! 8. Map pastel colour names onto the approved palette
//! 9. Force `fontcolor` to contrast with each node's `fillcolor`
//!
//! Attribute stages go through [`super::scan`], so label text is never
//! rewritten. Running [`normalize`] on its own output returns it unchanged.

use super::scan::{self, AttrBlock};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

/// Fill colours that need white text.
pub const DARK_FILLS: [&str; 4] = ["blue", "purple", "red", "green"];

/// Fill colours that read well with black text.
pub const LIGHT_FILLS: [&str; 6] = ["white", "yellow", "cyan", "pink", "orange", "gray"];

/// Pastel colour names and the approved colour each one becomes.
///
/// Every target is a member of [`LIGHT_FILLS`]. Names not listed here pass
/// through unchanged.
pub const PALETTE: [(&str, &str); 13] = [
    ("lightgray", "white"),
    ("lightgrey", "white"),
    ("lightslategray", "white"),
    ("lightslategrey", "white"),
    ("lightblue", "cyan"),
    ("lightsteelblue", "cyan"),
    ("lightcyan", "cyan"),
    ("lightgreen", "yellow"),
    ("lightseagreen", "yellow"),
    ("lightyellow", "yellow"),
    ("lightpink", "pink"),
    ("lightcoral", "pink"),
    ("lightsalmon", "orange"),
];

/// Normalize raw model output into DOT markup.
///
/// Returns an empty string when the input is blank or nothing survives
/// extraction. When no `graph`/`digraph` header can be found the extracted
/// text is returned as-is and left for [`super::validate::validate`] to
/// reject. Never panics.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.trim().to_string();
    if text.is_empty() {
        return text;
    }

    loop {
        let next = extract_markup(&text);
        if next == text {
            break;
        }
        text = next;
    }
    if text.is_empty() {
        return text;
    }

    let filled = uses_filled_style(&text);
    if filled {
        text = move_light_color_to_fill(&text);
        text = ensure_font_color(&text);
    }
    let text = canonicalize_palette(&text);
    let text = enforce_contrast(&text);

    debug!(
        "Normalized {} → {} chars (filled: {})",
        raw.len(),
        text.len(),
        filled
    );
    text.trim().to_string()
}

/// One pass of stages 1–5. Output is always a substring of the input.
fn extract_markup(text: &str) -> String {
    let s = strip_code_fence(text);
    let s = trim_backticks(&s);
    let s = strip_chatter(&s);
    let s = anchor_on_keyword(&s);
    drop_trailing_prose(&s)
}

// ── Stage 1: Strip the first code fence ─────────────────────────────────────

static RE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)```[ \t]*(?:(?:dot|graphviz|gv)\b)?[ \t]*\r?\n?(.*?)```").unwrap()
});

fn strip_code_fence(text: &str) -> String {
    match RE_FENCE.captures(text) {
        Some(caps) => caps[1].trim().to_string(),
        None => text.to_string(),
    }
}

// ── Stage 2: Trim stray backticks ───────────────────────────────────────────

fn trim_backticks(text: &str) -> String {
    text.trim_matches('`').trim().to_string()
}

// ── Stage 3: Strip chatter ──────────────────────────────────────────────────

static RE_PREFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^here(?:'s| is) the (?:dot|graphviz|graph) code\s*:?\s*",
        r"(?i)^the (?:dot|graphviz) code is\s*:?\s*",
        r"(?i)^(?:dot|graphviz) code\s*:?\s*",
        r"(?i)^here is the digraph\s*:?\s*",
        r"(?i)^graph\s*:\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RE_SUFFIXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\s*this creates the knowledge graph\.?$",
        r"(?i)\s*the graph is now ready\.?$",
        r"(?i)\s*hope this helps!?\.?$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn strip_chatter(text: &str) -> String {
    let mut s = text.trim();
    for re in RE_PREFIXES.iter() {
        if let Some(m) = re.find(s) {
            s = s[m.end()..].trim_start();
        }
    }
    for re in RE_SUFFIXES.iter() {
        if let Some(m) = re.find(s) {
            s = s[..m.start()].trim_end();
        }
    }
    s.to_string()
}

// ── Stage 4: Anchor on the graph header ─────────────────────────────────────

static RE_STARTS_WITH_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:strict\s+)?(?:di)?graph(?:\s|\{)").unwrap());

/// Optional `strict`, keyword, optional graph ID, then the opening brace.
/// Requiring the brace keeps prose such as "a graph of topics" from being
/// taken for a header.
static RE_GRAPH_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:strict\s+)?(?:di)?graph\s*(?:"[^"]*"|[^\s{}"]+)?\s*\{"#).unwrap()
});

fn anchor_on_keyword(text: &str) -> String {
    if RE_STARTS_WITH_KEYWORD.is_match(text) {
        return text.to_string();
    }
    match RE_GRAPH_HEADER.find(text) {
        Some(m) => {
            debug!("Discarding {} chars before graph header", m.start());
            text[m.start()..].to_string()
        }
        None => text.to_string(),
    }
}

// ── Stage 5: Drop prose after the graph body ───────────────────────────────

fn drop_trailing_prose(text: &str) -> String {
    if !RE_STARTS_WITH_KEYWORD.is_match(text) {
        return text.to_string();
    }
    match scan::body_end(text) {
        Some(end) if end < text.len() => text[..end].to_string(),
        _ => text.to_string(),
    }
}

// ── Attribute-list plumbing ──────────────────────────────────────────────────

/// Rebuild `text`, letting `rewrite` replace the inner text of any list.
///
/// `rewrite` returns `None` to keep a list byte-for-byte.
fn rewrite_blocks(
    text: &str,
    mut rewrite: impl FnMut(&AttrBlock, &str, &[scan::Attr]) -> Option<String>,
) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    let mut copied = 0;
    for block in scan::find_blocks(text) {
        let inner = &text[block.inner.clone()];
        let attrs = scan::parse_attrs(inner);
        if let Some(new_inner) = rewrite(&block, inner, &attrs) {
            out.push_str(&text[copied..block.inner.start]);
            out.push_str(&new_inner);
            copied = block.inner.end;
        }
    }
    out.push_str(&text[copied..]);
    out
}

/// Apply non-overlapping replacements to `inner`.
fn splice(inner: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(r, _)| r.start);
    let mut out = String::with_capacity(inner.len() + 32);
    let mut copied = 0;
    for (range, replacement) in edits {
        out.push_str(&inner[copied..range.start]);
        out.push_str(&replacement);
        copied = range.end;
    }
    out.push_str(&inner[copied..]);
    out
}

/// Append `pair` to a list, matching the separators it already uses.
fn append_attr(inner: &str, attrs: &[scan::Attr], pair: &str) -> String {
    let body = inner.trim_end();
    let tail = &inner[body.len()..];
    if body.trim_start().is_empty() {
        return format!("{inner}{pair}");
    }
    if body.ends_with(',') || body.ends_with(';') {
        return format!("{body} {pair}");
    }
    let sep = scan::separator_style(inner, attrs);
    format!("{body}{sep}{pair}{tail}")
}

/// Replacement for a value, keeping its quoting.
fn requote(quoted: bool, value: &str) -> String {
    if quoted {
        format!("\"{value}\"")
    } else {
        value.to_string()
    }
}

// ── Stage 6: Light border colours become fills ──────────────────────────────

/// True when any attribute list sets `style` to something containing `filled`.
fn uses_filled_style(text: &str) -> bool {
    scan::find_blocks(text).iter().any(|block| {
        let inner = &text[block.inner.clone()];
        scan::parse_attrs(inner).iter().any(|a| {
            a.is(inner, "style")
                && a.value(inner)
                    .split(',')
                    .any(|s| s.trim().eq_ignore_ascii_case("filled"))
        })
    })
}

fn move_light_color_to_fill(text: &str) -> String {
    rewrite_blocks(text, |block, inner, attrs| {
        if !block.kind.styles_nodes() || attrs.iter().any(|a| a.is(inner, "fillcolor")) {
            return None;
        }
        let attr = attrs.iter().find(|a| {
            a.is(inner, "color") && a.value(inner).to_ascii_lowercase().starts_with("light")
        })?;
        debug!("Moving color={} to fillcolor", attr.value(inner));
        let key = requote(attr.key_is_quoted(inner), "fillcolor");
        Some(splice(inner, vec![(attr.key.clone(), key)]))
    })
}

// ── Stage 7: Explicit text colour on filled graphs ──────────────────────────

fn ensure_font_color(text: &str) -> String {
    rewrite_blocks(text, |block, inner, attrs| {
        if !block.kind.styles_nodes()
            || inner.trim().is_empty()
            || attrs.iter().any(|a| a.is(inner, "fontcolor"))
        {
            return None;
        }
        Some(append_attr(inner, attrs, "fontcolor=black"))
    })
}

// ── Stage 8: Approved palette ───────────────────────────────────────────────

/// Approved replacement for a pastel colour name, if it has one.
pub fn canonical_color(name: &str) -> Option<&'static str> {
    PALETTE
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(name))
        .map(|(_, to)| *to)
}

fn canonicalize_palette(text: &str) -> String {
    rewrite_blocks(text, |_, inner, attrs| {
        let edits: Vec<_> = attrs
            .iter()
            .filter(|a| a.is(inner, "color") || a.is(inner, "fillcolor"))
            .filter_map(|a| {
                let to = canonical_color(a.value(inner))?;
                debug!("Replacing {}={} → {}", a.key(inner), a.value(inner), to);
                Some((a.value.clone(), requote(a.value_is_quoted(inner), to)))
            })
            .collect();
        (!edits.is_empty()).then(|| splice(inner, edits))
    })
}

// ── Stage 9: Contrast ───────────────────────────────────────────────────────

/// The font colour that contrasts with `fill`.
pub fn contrast_font_color(fill: &str) -> &'static str {
    if DARK_FILLS.iter().any(|d| d.eq_ignore_ascii_case(fill.trim())) {
        "white"
    } else {
        "black"
    }
}

fn enforce_contrast(text: &str) -> String {
    rewrite_blocks(text, |block, inner, attrs| {
        if !block.kind.styles_nodes() {
            return None;
        }
        let fill = attrs.iter().rev().find(|a| a.is(inner, "fillcolor"))?;
        let wanted = contrast_font_color(fill.value(inner));

        let fonts: Vec<_> = attrs.iter().filter(|a| a.is(inner, "fontcolor")).collect();
        if fonts.is_empty() {
            return Some(append_attr(inner, attrs, &format!("fontcolor={wanted}")));
        }
        let edits: Vec<_> = fonts
            .into_iter()
            .filter(|a| !a.value(inner).eq_ignore_ascii_case(wanted))
            .map(|a| (a.value.clone(), requote(a.value_is_quoted(inner), wanted)))
            .collect();
        (!edits.is_empty()).then(|| splice(inner, edits))
    })
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarkupError;
    use crate::pipeline::validate::validate;

    #[test]
    fn blank_input_is_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \n\t "), "");
        assert_eq!(normalize("```\n```"), "");
    }

    #[test]
    fn extracts_inline_fence() {
        let raw = "prose ```graph G { A -> B }``` trailing";
        assert_eq!(normalize(raw), "graph G { A -> B }");
    }

    #[test]
    fn extracts_tagged_fence_case_insensitive() {
        let raw = "Sure:\n```DOT\ndigraph G {\n  A -> B;\n}\n```\nLet me know!";
        assert_eq!(normalize(raw), "digraph G {\n  A -> B;\n}");
    }

    #[test]
    fn only_first_fence_is_used() {
        let raw = "```dot\ndigraph A { x; }\n```\n\n```dot\ndigraph B { y; }\n```";
        assert_eq!(normalize(raw), "digraph A { x; }");
    }

    #[test]
    fn unclosed_fence_still_yields_graph() {
        let raw = "```dot\ndigraph G { A -> B; }";
        assert_eq!(normalize(raw), "digraph G { A -> B; }");
    }

    #[test]
    fn strips_prefixes_and_suffixes() {
        let raw = "Here's the DOT code:\ndigraph G { A -> B; }\nHope this helps!";
        assert_eq!(normalize(raw), "digraph G { A -> B; }");

        let raw = "The DOT code is: graph X { a -- b }";
        assert_eq!(normalize(raw), "graph X { a -- b }");

        let raw = "Graph: digraph G { a; }";
        assert_eq!(normalize(raw), "digraph G { a; }");
    }

    #[test]
    fn graph_keyword_is_not_mistaken_for_prefix() {
        assert_eq!(normalize("Graph G { a -- b }"), "Graph G { a -- b }");
    }

    #[test]
    fn anchors_on_first_header() {
        let out = normalize("Sure! digraph G {A->B;}");
        assert!(out.starts_with("digraph G"), "got: {out}");
        assert_eq!(out, "digraph G {A->B;}");
    }

    #[test]
    fn prose_mentioning_graph_is_not_a_header() {
        let raw = "Here is a graph of your topics: digraph Topics { a -> b; }";
        assert_eq!(normalize(raw), "digraph Topics { a -> b; }");
    }

    #[test]
    fn subgraph_is_not_a_header() {
        let raw = "note: subgraph cluster_0 { a; } then digraph G { b; }";
        assert_eq!(normalize(raw), "digraph G { b; }");
    }

    #[test]
    fn no_keyword_passes_through() {
        assert_eq!(normalize("not a graph at all"), "not a graph at all");
    }

    #[test]
    fn drops_prose_after_closing_brace() {
        let raw = "digraph G { a [label=\"}\"]; } This graph shows the hierarchy.";
        assert_eq!(normalize(raw), "digraph G { a [label=\"}\"]; }");
    }

    #[test]
    fn unbalanced_body_is_left_for_validation() {
        assert_eq!(normalize("digraph G { A -> B"), "digraph G { A -> B");
    }

    #[test]
    fn brace_in_line_comment_does_not_close_body() {
        let raw = "digraph G {\n  // groups end here }\n  A [label=\"Root\"];\n  A -> B;\n}";
        let out = normalize(raw);
        assert_eq!(out, raw);
        // The stray brace still counts against the raw balance check.
        assert_eq!(
            validate(&out),
            Err(MarkupError::UnbalancedBraces { open: 1, close: 2 })
        );
    }

    #[test]
    fn comments_are_skipped_when_dropping_trailing_prose() {
        let body = "digraph G {\n  /* legend: } */\n  # {\n  // see {appendix}\n  A -> B;\n}";
        let out = normalize(&format!("{body}\nThis graph shows the flow."));
        assert_eq!(out, body);
        assert_eq!(validate(&out), Ok(body));
    }

    #[test]
    fn brace_in_html_label_does_not_close_body() {
        let raw = "digraph G { a [label=<x}>]; b; } trailing words";
        assert_eq!(normalize(raw), "digraph G { a [label=<x}>]; b; }");

        let raw = "digraph G { a [label=<<b>{x}</b>>]; a -> b; }\nDone.";
        assert_eq!(normalize(raw), "digraph G { a [label=<<b>{x}</b>>]; a -> b; }");
    }

    #[test]
    fn strict_header_is_kept() {
        let out = normalize("Sure! strict digraph G { a -> b; }");
        assert_eq!(out, "strict digraph G { a -> b; }");
        assert!(validate(&out).is_ok());

        let raw = "```dot\nSTRICT graph { a -- b }\n```\nHope this helps!";
        assert_eq!(normalize(raw), "STRICT graph { a -- b }");
        assert_eq!(
            normalize("strict digraph G { a -> b; } Let me know."),
            "strict digraph G { a -> b; }"
        );
    }

    #[test]
    fn edge_and_graph_defaults_only_get_palette() {
        let raw = "digraph G { node [style=filled]; edge [color=lightblue]; graph [fillcolor=lightgray]; A; }";
        assert_eq!(
            normalize(raw),
            "digraph G { node [style=filled, fontcolor=black]; edge [color=cyan]; graph [fillcolor=white]; A; }"
        );
    }

    #[test]
    fn light_border_becomes_fill_with_palette_and_contrast() {
        let raw = "digraph G { X [style=filled, color=lightblue]; }";
        assert_eq!(
            normalize(raw),
            "digraph G { X [style=filled, fillcolor=cyan, fontcolor=black]; }"
        );
    }

    #[test]
    fn dark_fill_gets_white_text() {
        let raw = "digraph G { node [style=filled]; Y [label=\"Y\", fillcolor=blue]; }";
        let out = normalize(raw);
        assert!(
            out.contains("Y [label=\"Y\", fillcolor=blue, fontcolor=white]"),
            "got: {out}"
        );
        assert!(out.contains("node [style=filled, fontcolor=black]"), "got: {out}");
    }

    #[test]
    fn existing_font_color_is_rewritten_not_duplicated() {
        let raw = r#"digraph G { A [style=filled, fillcolor="red", fontcolor="black"]; }"#;
        let out = normalize(raw);
        assert_eq!(
            out,
            r#"digraph G { A [style=filled, fillcolor="red", fontcolor="white"]; }"#
        );
        assert_eq!(out.matches("fontcolor").count(), 1);
    }

    #[test]
    fn quoted_light_color_is_moved_and_mapped() {
        let raw = r#"digraph G { node [style="filled"]; A [color="lightgreen"]; }"#;
        let out = normalize(raw);
        assert!(
            out.contains(r#"A [fillcolor="yellow", fontcolor=black]"#),
            "got: {out}"
        );
    }

    #[test]
    fn border_color_is_kept_when_fill_already_present() {
        let raw = "digraph G { A [style=filled, fillcolor=white, color=lightblue]; }";
        let out = normalize(raw);
        assert!(
            out.contains("A [style=filled, fillcolor=white, color=cyan, fontcolor=black]"),
            "got: {out}"
        );
    }

    #[test]
    fn label_text_is_never_rewritten() {
        let raw = r#"digraph G {
  node [shape=box, style=filled];
  A [label="Set color=lightblue, then [fontcolor=red]\nsecond line", color=lightgray];
}"#;
        let out = normalize(raw);
        assert!(
            out.contains(r#"label="Set color=lightblue, then [fontcolor=red]\nsecond line""#),
            "got: {out}"
        );
        assert!(out.contains("fillcolor=white, fontcolor=black]"), "got: {out}");
    }

    #[test]
    fn edges_keep_border_colors_but_get_palette() {
        let raw = "digraph G { node [style=filled]; A -> B [color=lightblue, label=\"x\"]; }";
        let out = normalize(raw);
        assert!(out.contains("A -> B [color=cyan, label=\"x\"]"), "got: {out}");
    }

    #[test]
    fn unfilled_graph_gets_no_font_color() {
        let raw = "digraph G { A [label=\"a\", color=lightblue]; }";
        assert_eq!(normalize(raw), "digraph G { A [label=\"a\", color=cyan]; }");
    }

    #[test]
    fn unmapped_colors_pass_through() {
        let raw = "digraph G { A [style=filled, fillcolor=lavender]; }";
        assert_eq!(
            normalize(raw),
            "digraph G { A [style=filled, fillcolor=lavender, fontcolor=black]; }"
        );
    }

    #[test]
    fn space_separated_lists_stay_space_separated() {
        let raw = "digraph G { A [shape=box style=filled color=lightpink] }";
        assert_eq!(
            normalize(raw),
            "digraph G { A [shape=box style=filled fillcolor=pink fontcolor=black] }"
        );
    }

    #[test]
    fn trailing_separator_is_not_doubled() {
        let raw = "digraph G { A [style=filled, fillcolor=green, ]; }";
        assert_eq!(
            normalize(raw),
            "digraph G { A [style=filled, fillcolor=green, fontcolor=white]; }"
        );
    }

    #[test]
    fn end_to_end_scenario() {
        let raw = "```dot\ndigraph G {\n  rankdir=LR;\n  node [shape=box, style=filled];\n  A [label=\"Root\", color=lightgray];\n  B [label=\"Child\", color=lightblue];\n  A -> B;\n}\n```";
        let out = normalize(raw);
        assert_eq!(
            out,
            "digraph G {\n  rankdir=LR;\n  node [shape=box, style=filled, fontcolor=black];\n  A [label=\"Root\", fillcolor=white, fontcolor=black];\n  B [label=\"Child\", fillcolor=cyan, fontcolor=black];\n  A -> B;\n}"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "not a graph at all",
            "DOT code: DOT code: nothing here",
            "`DOT code: `x``",
            "prose ```graph G { A -> B }``` trailing",
            "Sure! digraph G {A->B;}",
            "digraph G { A -> B",
            "Here's the DOT code:\n```dot\ndigraph G { node [style=filled]; A [color=lightcoral]; B [fillcolor=\"purple\", fontcolor=black]; }\n```\nThe graph is now ready.",
            r#"digraph G { A [label="x, [y]", color="LightSalmon", style="rounded,filled"]; }"#,
            "digraph G { A [shape=box style=filled color=lightpink] } trailing words",
            "Sure! strict digraph G { a -> b; }",
            "digraph G {\n  // groups end here }\n  A -> B;\n}",
            "digraph G { a [label=<x}>]; b; } trailing words",
        ];
        for s in samples {
            let once = normalize(s);
            let twice = normalize(&once);
            assert_eq!(once, twice, "not idempotent for input: {s:?}");
        }
    }

    #[test]
    fn canonical_color_lookup() {
        assert_eq!(canonical_color("LightSteelBlue"), Some("cyan"));
        assert_eq!(canonical_color("lightsalmon"), Some("orange"));
        assert_eq!(canonical_color("navy"), None);
        for (_, to) in PALETTE {
            assert!(LIGHT_FILLS.contains(&to));
        }
    }

    #[test]
    fn contrast_table() {
        for dark in DARK_FILLS {
            assert_eq!(contrast_font_color(dark), "white");
        }
        for light in LIGHT_FILLS {
            assert_eq!(contrast_font_color(light), "black");
        }
        assert_eq!(contrast_font_color("Purple"), "white");
        assert_eq!(contrast_font_color("#123456"), "black");
    }
}
