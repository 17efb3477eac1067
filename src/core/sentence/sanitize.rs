//! Unicode punctuation folding table.
//!
//! Applied once per raw text block before paragraph splitting; exposed
//! standalone so the balanced chunker and the structured-mode cleaner can
//! reuse the exact same normalization.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

/// Sanitize a raw text block: fold lookalike punctuation to ASCII
/// equivalents, collapse exotic spaces, strip bidi control marks, and
/// collapse runs of whitespace.
///
/// Applied in order:
/// 1. collapse NBSP / figure space / narrow NBSP / word joiner to an ordinary space;
/// 2. fold curly double/single quotes to `"`/`'`;
/// 3. fold en/em/horizontal-bar dashes to `-`;
/// 4. fold the single-glyph ellipsis `…` to the three-character `...`;
/// 5. strip left-to-right/right-to-left bidi marks;
/// 6. collapse runs of horizontal whitespace to a single space and trim each line.
pub fn sanitize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{2060}' => out.push(' '),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => out.push('"'),
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => out.push('\''),
            '\u{2013}' | '\u{2014}' | '\u{2015}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{200E}' | '\u{200F}' => {}
            _ => out.push(ch),
        }
    }

    out.lines()
        .map(|line| WHITESPACE_RUN.replace_all(line.trim(), " ").to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
