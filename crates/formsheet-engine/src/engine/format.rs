//! Number formatting and literal normalisation.

use regex::Regex;
use std::sync::OnceLock;

use super::value::Value;

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$")
            .expect("numeric literal regex must compile")
    })
}

/// Parse a numeric-looking string. Words such as `inf` or `NaN` are not numeric.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if !numeric_re().is_match(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Canonical decimal form of a number (`5`, `0.25`, `-3`).
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        // Collapse -0.
        return "0".to_string();
    }
    format!("{}", n)
}

/// Render a number as a literal the expression parser reads back unchanged.
/// Negative and non-finite values are parenthesised.
pub fn number_literal(n: f64) -> String {
    if n.is_nan() {
        "(0/0)".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "(1/0)" } else { "(-1/0)" }.to_string()
    } else if n < 0.0 {
        format!("({})", format_number(n))
    } else {
        format_number(n)
    }
}

/// Render a runtime value as a formula literal.
///
/// - blank (null, empty string) => `0`
/// - numbers and numeric strings => canonical numeric literal
/// - other strings => JSON string
/// - booleans => `true` / `false`
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Null => "0".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_literal(*n),
        Value::Text(s) => {
            if s.trim().is_empty() {
                return "0".to_string();
            }
            match parse_numeric(s) {
                Some(n) => number_literal(n),
                None => serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::TestSchema;
    use crate::engine::{EvalContext, ReferenceData, ValueStore, evaluate};

    #[test]
    fn test_text_literals_read_back_unchanged() {
        let schema = TestSchema::default();
        let values = ValueStore::new();
        let reference = ReferenceData::new();
        let ctx = EvalContext::new(&schema, &values, &reference);
        for text in [
            "a\u{8}b\u{c}c",
            "tab\there\nnewline\r",
            "quote \" and back\\slash",
            "ctrl \u{1} and </tag>",
            "unicode é ✓",
        ] {
            let value = Value::Text(text.to_string());
            let literal = value_literal(&value);
            assert_eq!(evaluate(&literal, &ctx).unwrap(), value, "literal {literal}");
        }
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric("42"), Some(42.0));
        assert_eq!(parse_numeric(" 007 "), Some(7.0));
        assert_eq!(parse_numeric("-1.5e2"), Some(-150.0));
        assert_eq!(parse_numeric(".5"), Some(0.5));
        assert_eq!(parse_numeric("inf"), None);
        assert_eq!(parse_numeric("NaN"), None);
        assert_eq!(parse_numeric("12abc"), None);
        assert_eq!(parse_numeric(""), None);
    }

    #[test]
    fn test_number_literal() {
        assert_eq!(number_literal(5.0), "5");
        assert_eq!(number_literal(0.25), "0.25");
        assert_eq!(number_literal(-3.0), "(-3)");
        assert_eq!(number_literal(-0.0), "0");
        assert_eq!(number_literal(f64::NAN), "(0/0)");
        assert_eq!(number_literal(f64::NEG_INFINITY), "(-1/0)");
    }

    #[test]
    fn test_value_literal() {
        assert_eq!(value_literal(&Value::Null), "0");
        assert_eq!(value_literal(&Value::Text("".into())), "0");
        assert_eq!(value_literal(&Value::Text("3.50".into())), "3.5");
        assert_eq!(value_literal(&Value::Text("LOW".into())), "\"LOW\"");
        assert_eq!(value_literal(&Value::Text("say \"hi\"".into())), r#""say \"hi\"""#);
        assert_eq!(value_literal(&Value::Bool(true)), "true");
    }
}
