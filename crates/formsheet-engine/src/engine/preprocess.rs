//! Formula preprocessing and reference transformation.
//!
//! Before a formula reaches the expression parser it is rewritten in place.
//! This module handles:
//!
//! - **Conditionals**: `IF(c, a, b)` → `(c) ? (a) : (b)`, repeated to a fixed point
//! - **Path substitution**: `F.C` / `F.T.col` → literal values
//! - **Repeat rewriting**: `F.x` → `F_repeat_2.x_2` plus the repeat macros
//!   (`REPEAT_INDEX()`, `BASE_VALUE('p')`, `PREV_REPEAT('p')`)
//!
//! Every scan runs over a copy of the script whose string literal contents
//! are blanked out, so references and parentheses inside quotes are inert.

use regex::Regex;
use std::sync::OnceLock;

use super::deps::{is_standalone_token, path_token_re, strip_string_literals};
use super::error::{EvalError, EvalResult};
use super::path::{MAX_SEGMENTS, Path};

/// A call located in a script: byte span of the whole call and of each argument.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CallSpan {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub args: Vec<(usize, usize)>,
}

impl CallSpan {
    /// Trimmed argument texts, read from the original script.
    pub fn arg_texts<'a>(&self, script: &'a str) -> Vec<&'a str> {
        self.args
            .iter()
            .map(|&(start, end)| script[start..end].trim())
            .collect()
    }
}

fn if_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(IF)\s*\(").expect("IF call regex must compile"))
}

/// Find the first call matched by `call_re` outside string literals.
///
/// `call_re` must capture the function name in group 1 and end with `(`.
pub(crate) fn find_call(script: &str, call_re: &Regex) -> EvalResult<Option<CallSpan>> {
    let stripped = strip_string_literals(script);

    for caps in call_re.captures_iter(&stripped) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        if !is_standalone_token(&stripped, &whole) {
            continue;
        }
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let open = whole.end() - 1;
        let (args, close) = split_call_args(&stripped, open, name)?;
        return Ok(Some(CallSpan {
            name: name.to_string(),
            start: whole.start(),
            end: close + 1,
            args,
        }));
    }

    Ok(None)
}

/// Split the arguments of the call whose `(` sits at `open`.
/// Returns argument byte spans and the offset of the matching `)`.
fn split_call_args(
    stripped: &str,
    open: usize,
    name: &str,
) -> EvalResult<(Vec<(usize, usize)>, usize)> {
    let bytes = stripped.as_bytes();
    let mut depth = 0usize;
    let mut args = Vec::new();
    let mut arg_start = open + 1;

    for (i, &b) in bytes.iter().enumerate().skip(open + 1) {
        match b {
            b'(' => depth += 1,
            b')' if depth == 0 => {
                if !(args.is_empty() && stripped[arg_start..i].trim().is_empty()) {
                    args.push((arg_start, i));
                }
                return Ok((args, i));
            }
            b')' => depth -= 1,
            b',' if depth == 0 => {
                args.push((arg_start, i));
                arg_start = i + 1;
            }
            _ => {}
        }
    }

    Err(EvalError::syntax(
        open,
        format!("unbalanced parentheses in call to {}", name),
    ))
}

/// Rewrite every `IF(cond, a, b)` into `(cond) ? (a) : (b)`.
///
/// Each pass rewrites one call; nested calls are left inside the rewritten
/// arguments and picked up by later passes, so the loop runs until no `IF(`
/// remains.
pub fn rewrite_conditionals(script: &str) -> EvalResult<String> {
    let mut current = script.to_string();

    while let Some(call) = find_call(&current, if_call_re())? {
        let args = call.arg_texts(&current);
        if args.len() != 3 {
            return Err(EvalError::bad_arguments(
                "IF",
                format!("expected 3 arguments, got {}", args.len()),
            ));
        }
        if args.iter().any(|a| a.is_empty()) {
            return Err(EvalError::bad_arguments("IF", "empty argument"));
        }
        let replacement = format!("({}) ? ({}) : ({})", args[0], args[1], args[2]);
        current.replace_range(call.start..call.end, &replacement);
    }

    Ok(current)
}

/// Replace every two- or three-segment path outside string literals with the
/// text returned by `resolve`. The first resolution error aborts the rewrite.
pub fn substitute_paths<F>(script: &str, mut resolve: F) -> EvalResult<String>
where
    F: FnMut(&Path) -> EvalResult<String>,
{
    let stripped = strip_string_literals(script);
    let mut out = String::with_capacity(script.len());
    let mut last = 0;

    for m in path_token_re().find_iter(&stripped) {
        if !is_standalone_token(&stripped, &m) {
            continue;
        }
        let token = &script[m.start()..m.end()];
        if token.split('.').count() > MAX_SEGMENTS {
            return Err(EvalError::malformed_path(token, "too many segments"));
        }
        let path = Path::from_str(token)
            .ok_or_else(|| EvalError::malformed_path(token, "not a path"))?;
        out.push_str(&script[last..m.start()]);
        out.push_str(&resolve(&path)?);
        last = m.end();
    }

    out.push_str(&script[last..]);
    Ok(out)
}

fn repeat_index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bREPEAT_INDEX\(\s*\)").expect("REPEAT_INDEX regex must compile")
    })
}

fn base_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bBASE_VALUE\(\s*(['"])(.*?)['"]\s*\)"#)
            .expect("BASE_VALUE regex must compile")
    })
}

fn prev_repeat_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bPREV_REPEAT\(\s*(['"])(.*?)['"]\s*\)"#)
            .expect("PREV_REPEAT regex must compile")
    })
}

/// Expand the repeat macros for instance `index` (1-based).
///
/// - `REPEAT_INDEX()` → `index`
/// - `BASE_VALUE('p')` → `GET('p')`
/// - `PREV_REPEAT('p')` → `GET('p_repeat_<index-1>')`, or `null` for the first instance
pub fn expand_repeat_macros(script: &str, index: usize) -> String {
    let script = repeat_index_re().replace_all(script, index.to_string().as_str());

    let script = base_value_re().replace_all(&script, |caps: &regex::Captures| {
        format!("GET({q}{}{q})", &caps[2], q = &caps[1])
    });

    prev_repeat_re()
        .replace_all(&script, |caps: &regex::Captures| {
            if index <= 1 {
                "null".to_string()
            } else {
                format!("GET({q}{}_repeat_{}{q})", &caps[2], index - 1, q = &caps[1])
            }
        })
        .into_owned()
}

/// Point references to `base_function` at repeat instance `new_function`:
/// `F.x` → `F_repeat_2.x_2`. References inside string literals are untouched.
pub fn rewrite_function_references(
    script: &str,
    base_function: &str,
    new_function: &str,
    index: usize,
) -> String {
    let Ok(re) = Regex::new(&format!(
        r"{}\.([A-Za-z0-9_]+)",
        regex::escape(base_function)
    )) else {
        return script.to_string();
    };

    let stripped = strip_string_literals(script);
    let mut out = String::with_capacity(script.len() + 16);
    let mut last = 0;

    for caps in re.captures_iter(&stripped) {
        let (Some(whole), Some(ident)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if !is_standalone_token(&stripped, &whole) {
            continue;
        }
        out.push_str(&script[last..whole.start()]);
        out.push_str(&format!("{}.{}_{}", new_function, ident.as_str(), index));
        last = whole.end();
    }

    out.push_str(&script[last..]);
    out
}

/// Full rewrite applied to a formula copied into repeat instance `index`.
pub fn rewrite_repeat_formula(
    script: &str,
    base_function: &str,
    new_function: &str,
    index: usize,
) -> String {
    let expanded = expand_repeat_macros(script, index);
    rewrite_function_references(&expanded, base_function, new_function, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rewrite_conditionals_simple() {
        assert_eq!(rewrite_conditionals("IF(0, 1, 2)").unwrap(), "(0) ? (1) : (2)");
    }

    #[test]
    fn test_rewrite_conditionals_nested() {
        assert_eq!(
            rewrite_conditionals("IF(1>0, IF(2>1, 5, 6), 7)").unwrap(),
            "(1>0) ? ((2>1) ? (5) : (6)) : (7)"
        );
        let deep = rewrite_conditionals("IF(a, IF(b, IF(c, 1, 2), 3), IF(d, 4, 5))").unwrap();
        assert!(!deep.contains("IF("));
    }

    #[test]
    fn test_rewrite_conditionals_respects_strings_and_calls() {
        assert_eq!(
            rewrite_conditionals("IF(F.a == 'x, y', RowSum(F.T.b), 0)").unwrap(),
            "(F.a == 'x, y') ? (RowSum(F.T.b)) : (0)"
        );
        assert_eq!(rewrite_conditionals("'IF(1,2)'").unwrap(), "'IF(1,2)'");
    }

    #[test]
    fn test_rewrite_conditionals_errors() {
        assert!(matches!(
            rewrite_conditionals("IF(1, 2)"),
            Err(EvalError::BadArguments { .. })
        ));
        assert!(matches!(
            rewrite_conditionals("IF(1, 2, (3)"),
            Err(EvalError::Syntax { .. })
        ));
    }

    #[test]
    fn test_substitute_paths() {
        let out = substitute_paths("F.a + F.T.b + 'F.c'", |p| Ok(format!("<{}>", p))).unwrap();
        assert_eq!(out, "<F.a> + <F.T.b> + 'F.c'");

        let err = substitute_paths("a.b.c.d", |_| Ok("0".into())).unwrap_err();
        assert!(matches!(err, EvalError::MalformedPath { .. }));
    }

    #[test]
    fn test_expand_repeat_macros() {
        assert_eq!(expand_repeat_macros("REPEAT_INDEX() * 2", 3), "3 * 2");
        assert_eq!(expand_repeat_macros("BASE_VALUE('F.a')", 2), "GET('F.a')");
        assert_eq!(expand_repeat_macros("PREV_REPEAT('F.a')", 1), "null");
        assert_eq!(
            expand_repeat_macros("PREV_REPEAT('F.a')", 3),
            "GET('F.a_repeat_2')"
        );
    }

    #[test]
    fn test_rewrite_function_references() {
        assert_eq!(
            rewrite_function_references("F.a + F.T.b + G.F.c + FX.d", "F", "F_repeat_2", 2),
            "F_repeat_2.a_2 + F_repeat_2.T_2.b + G.F.c + FX.d"
        );
        assert_eq!(
            rewrite_repeat_formula("BASE_VALUE('F.a') + F.a", "F", "F_repeat_1", 1),
            "GET('F.a') + F_repeat_1.a_1"
        );
    }
}
