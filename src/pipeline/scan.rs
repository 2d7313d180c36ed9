//! Quote-aware scanner for DOT attribute lists.
//!
//! The attribute stages of the normalizer must rewrite `color=`,
//! `fillcolor=` and `fontcolor=` tokens without ever touching label text.
//! Labels routinely contain commas, brackets, `=` signs and `\n` escapes, so
//! a regex over `\w+\s*\[[^\]]+\]` corrupts them. This module walks the text
//! once, skipping quoted strings, HTML labels and comments, and reports:
//!
//! * every bracketed attribute list together with the kind of statement it
//!   belongs to ([`find_blocks`]);
//! * the `key=value` pairs inside one list, as byte ranges into the original
//!   text ([`parse_attrs`]);
//! * where the graph body closes ([`body_end`]).
//!
//! Every range points into the caller's string, so untouched bytes are copied
//! through verbatim and the rewrite stays minimal.
//!
//! All delimiters are ASCII. UTF-8 continuation bytes never collide with them,
//! so byte-wise scanning is safe on multi-byte labels.

use std::ops::Range;

/// What kind of statement owns an attribute list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `A [label="x"]`
    Node,
    /// `node [shape=box]`
    NodeDefaults,
    /// `edge [color=gray]`
    EdgeDefaults,
    /// `graph [rankdir=LR]`
    GraphDefaults,
    /// `A -> B [label="y"]`
    Edge,
}

impl BlockKind {
    /// Node statements and node defaults: the blocks that describe a node's look.
    pub fn styles_nodes(self) -> bool {
        matches!(self, BlockKind::Node | BlockKind::NodeDefaults)
    }
}

/// One bracketed attribute list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrBlock {
    /// Byte range of the text between `[` and `]`.
    pub inner: Range<usize>,
    pub kind: BlockKind,
}

/// One `key=value` pair, ranges relative to the block's inner text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub key: Range<usize>,
    /// Includes surrounding quotes or angle brackets when present.
    pub value: Range<usize>,
}

impl Attr {
    /// Key without quotes.
    pub fn key<'a>(&self, inner: &'a str) -> &'a str {
        unquote(&inner[self.key.clone()])
    }

    /// Value without quotes.
    pub fn value<'a>(&self, inner: &'a str) -> &'a str {
        unquote(&inner[self.value.clone()])
    }

    /// True when the key matches `name`, ignoring ASCII case.
    pub fn is(&self, inner: &str, name: &str) -> bool {
        self.key(inner).eq_ignore_ascii_case(name)
    }

    pub fn value_is_quoted(&self, inner: &str) -> bool {
        inner[self.value.clone()].starts_with('"')
    }

    pub fn key_is_quoted(&self, inner: &str) -> bool {
        inner[self.key.clone()].starts_with('"')
    }
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Locate every attribute list in `src`, in document order.
///
/// A `[` opens an attribute list when the nearest non-blank byte before it is
/// part of an identifier or a closing quote. An unterminated list ends the
/// scan; whatever follows it is left alone.
pub fn find_blocks(src: &str) -> Vec<AttrBlock> {
    let b = src.as_bytes();
    let mut blocks = Vec::new();
    let mut i = 0;
    let mut stmt_start = 0;
    let mut stmt_has_edge = false;

    while i < b.len() {
        match b[i] {
            b'"' => i = skip_quoted(b, i),
            b'/' if b.get(i + 1) == Some(&b'/') => i = skip_line(b, i),
            b'/' if b.get(i + 1) == Some(&b'*') => i = skip_block_comment(b, i),
            b'#' if at_line_start(b, i) => i = skip_line(b, i),
            b';' | b'{' | b'}' | b'\n' => {
                i += 1;
                stmt_start = i;
                stmt_has_edge = false;
            }
            b'-' if matches!(b.get(i + 1), Some(b'>') | Some(b'-')) => {
                stmt_has_edge = true;
                i += 2;
            }
            b'[' => {
                let Some(close) = find_close(b, i + 1) else {
                    break;
                };
                if opens_attr_list(b, i) {
                    let kind = if stmt_has_edge {
                        BlockKind::Edge
                    } else {
                        classify_head(src[stmt_start..i].trim())
                    };
                    blocks.push(AttrBlock {
                        inner: i + 1..close,
                        kind,
                    });
                }
                i = close + 1;
            }
            _ => i += 1,
        }
    }

    blocks
}

/// Split one attribute list into `key=value` pairs.
///
/// Separators (`,` `;` whitespace) are skipped; a key without `=` is ignored.
pub fn parse_attrs(inner: &str) -> Vec<Attr> {
    let b = inner.as_bytes();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < b.len() {
        if is_separator(b[i]) {
            i += 1;
            continue;
        }

        let key_start = i;
        i = if b[i] == b'"' {
            skip_quoted(b, i)
        } else {
            scan_bare(b, i, |c| c == b'=')
        };
        if i == key_start {
            // stray '=' or similar
            i += 1;
            continue;
        }
        let key = key_start..i;

        let mut j = skip_blank(b, i);
        if b.get(j) != Some(&b'=') {
            continue;
        }
        j = skip_blank(b, j + 1);
        if j >= b.len() {
            break;
        }

        let value_start = j;
        i = match b[j] {
            b'"' => skip_quoted(b, j),
            b'<' => skip_html(b, j),
            _ => scan_bare(b, j, |_| false),
        };
        attrs.push(Attr {
            key,
            value: value_start..i,
        });
    }

    attrs
}

/// The separator style a list already uses, for appending a new pair.
pub fn separator_style(inner: &str, attrs: &[Attr]) -> &'static str {
    let gaps: Vec<&str> = attrs
        .windows(2)
        .map(|w| &inner[w[0].value.end..w[1].key.start])
        .collect();
    if gaps.iter().any(|g| g.contains(',')) {
        ", "
    } else if gaps.iter().any(|g| g.contains(';')) {
        "; "
    } else if gaps.is_empty() {
        ", "
    } else {
        " "
    }
}

/// Index just past the `}` that balances the first `{` in `src`.
///
/// Braces inside quoted strings, comments and HTML labels do not count.
/// Returns `None` when the body never closes.
pub fn body_end(src: &str) -> Option<usize> {
    let b = src.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    let mut last_solid = b'\n';

    while i < b.len() {
        match b[i] {
            b'"' => {
                i = skip_quoted(b, i);
                last_solid = b'"';
                continue;
            }
            b'/' if b.get(i + 1) == Some(&b'/') => {
                i = skip_line(b, i);
                continue;
            }
            b'/' if b.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(b, i);
                continue;
            }
            b'#' if at_line_start(b, i) => {
                i = skip_line(b, i);
                continue;
            }
            b'<' if last_solid == b'=' => {
                i = skip_html(b, i);
                last_solid = b'>';
                continue;
            }
            b'{' => depth += 1,
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
        if !b[i].is_ascii_whitespace() {
            last_solid = b[i];
        }
        i += 1;
    }
    None
}

// ── Byte-level helpers ───────────────────────────────────────────────────────

fn is_separator(c: u8) -> bool {
    c == b',' || c == b';' || c.is_ascii_whitespace()
}

fn is_ident_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || c >= 0x80
}

fn classify_head(head: &str) -> BlockKind {
    if head.eq_ignore_ascii_case("node") {
        BlockKind::NodeDefaults
    } else if head.eq_ignore_ascii_case("edge") {
        BlockKind::EdgeDefaults
    } else if head.eq_ignore_ascii_case("graph") {
        BlockKind::GraphDefaults
    } else {
        BlockKind::Node
    }
}

fn opens_attr_list(b: &[u8], open: usize) -> bool {
    b[..open]
        .iter()
        .rev()
        .find(|c| !c.is_ascii_whitespace())
        .is_some_and(|&c| is_ident_byte(c) || c == b'"')
}

/// Index one past the closing quote (or end of input).
fn skip_quoted(b: &[u8], open: usize) -> usize {
    let mut i = open + 1;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'"' => return i + 1,
            _ => i += 1,
        }
    }
    b.len()
}

/// Index one past the `>` that balances the `<` at `open`.
fn skip_html(b: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, &c) in b.iter().enumerate().skip(open) {
        match c {
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    b.len()
}

fn skip_line(b: &[u8], from: usize) -> usize {
    b[from..]
        .iter()
        .position(|&c| c == b'\n')
        .map_or(b.len(), |p| from + p)
}

fn skip_block_comment(b: &[u8], from: usize) -> usize {
    b[from + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(b.len(), |p| from + 2 + p + 2)
}

fn at_line_start(b: &[u8], i: usize) -> bool {
    b[..i]
        .iter()
        .rev()
        .take_while(|&&c| c != b'\n')
        .all(|c| c.is_ascii_whitespace())
}

fn skip_blank(b: &[u8], mut i: usize) -> usize {
    while i < b.len() && b[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn scan_bare(b: &[u8], mut i: usize, also_stop: impl Fn(u8) -> bool) -> usize {
    while i < b.len() && !is_separator(b[i]) && !also_stop(b[i]) {
        i += 1;
    }
    i
}

/// Index of the `]` closing a list whose body starts at `from`.
///
/// `<` only opens an HTML label when it follows `=`; a lone `<` in a bare
/// value must not swallow the closing bracket.
fn find_close(b: &[u8], from: usize) -> Option<usize> {
    let mut i = from;
    let mut last_solid = b'[';
    while i < b.len() {
        match b[i] {
            b'"' => {
                i = skip_quoted(b, i);
                last_solid = b'"';
                continue;
            }
            b'<' if last_solid == b'=' => {
                i = skip_html(b, i);
                last_solid = b'>';
                continue;
            }
            b']' => return Some(i),
            c if !c.is_ascii_whitespace() => last_solid = c,
            _ => {}
        }
        i += 1;
    }
    None
}
