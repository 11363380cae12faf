//! Dependency extraction from formula text.
//!
//! Finds every dotted path token (`F.C`, `F.T.col`) a formula references.
//! Notes:
//! - Tokens inside string literals are ignored
//! - Tokens with more than three segments (external reference chains used by
//!   `CFNLookup`) are not worksheet dependencies
//! - Single identifiers (`IF`, `RowSum`, `true`) are never paths

use indexmap::IndexSet;
use regex::{Match, Regex};
use std::sync::OnceLock;

use super::path::{MAX_SEGMENTS, Path};

/// Regex that matches dotted identifier chains like `F.T.a`.
pub(crate) fn path_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)+")
            .expect("path token regex must compile")
    })
}

/// A token is only a path when it does not continue a longer identifier or
/// number on its left (`x1.5`, `a.b.c` seen from `b`).
pub(crate) fn is_standalone_token(script: &str, m: &Match<'_>) -> bool {
    match script[..m.start()].chars().next_back() {
        Some(prev) => !(prev.is_ascii_alphanumeric() || prev == '_' || prev == '.'),
        None => true,
    }
}

/// Extract all worksheet paths (two or three segments) referenced by a
/// formula, in order of first appearance.
pub fn extract_dependencies(script: &str) -> Vec<Path> {
    let script = strip_string_literals(script);
    let mut deps: IndexSet<Path> = IndexSet::new();

    for m in path_token_re().find_iter(&script) {
        if !is_standalone_token(&script, &m) {
            continue;
        }
        let segments = m.as_str().split('.').count();
        if !(2..=MAX_SEGMENTS).contains(&segments) {
            continue;
        }
        if let Some(path) = Path::from_str(m.as_str()) {
            deps.insert(path);
        }
    }

    deps.into_iter().collect()
}

/// Blank out the contents of `'...'` and `"..."` literals, keeping offsets.
pub(crate) fn strip_string_literals(script: &str) -> String {
    let mut out = String::with_capacity(script.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in script.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                    push_blank(&mut out, ch);
                    continue;
                }
                if ch == '\\' {
                    escaped = true;
                    out.push(' ');
                    continue;
                }
                if ch == q {
                    quote = None;
                    out.push(ch);
                } else {
                    push_blank(&mut out, ch);
                }
            }
            None => {
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }

    out
}

// Multi-byte characters are replaced by as many spaces as they have bytes so
// byte offsets stay aligned with the original script.
fn push_blank(out: &mut String, ch: char) {
    for _ in 0..ch.len_utf8() {
        out.push(' ');
    }
}
