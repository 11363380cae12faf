//! Expression parser and tree-walking evaluator for fully substituted formulas.
//!
//! After preprocessing a formula contains only literals, operators, grouping
//! and `?:` conditionals. This module tokenizes that text, builds an [`Expr`]
//! tree with precedence climbing, and evaluates it.
//!
//! Precedence, loosest first:
//!
//! | level | operators | assoc |
//! |---|---|---|
//! | conditional | `c ? a : b` | right |
//! | 10 | `\|\|` | left |
//! | 20 | `&&` | left |
//! | 30 | `==` `!=` `===` `!==` | left |
//! | 40 | `<` `<=` `>` `>=` | left |
//! | 50 | `+` `-` | left |
//! | 60 | `*` `/` `%` | left |
//! | prefix | `-` `+` `!` | |

use super::error::{EvalError, EvalResult};
use super::format::format_number;
use super::value::Value;

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Lt,
    LtEq,
    Gt,
    GtEq,
    EqEq,
    BangEq,
    EqEqEq,
    BangEqEq,
    AndAnd,
    OrOr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    And,
    Or,
}

/// A parsed expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

fn tokenize(src: &str) -> EvalResult<Vec<(usize, Token)>> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let starts_fraction =
            c == '.' && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit());
        if c.is_ascii_digit() || starts_fraction {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let end = chars.get(i).map(|(o, _)| *o).unwrap_or(src.len());
            let text = &src[chars[start].0..end];
            let n = text
                .parse::<f64>()
                .map_err(|_| EvalError::syntax(offset, format!("invalid number `{}`", text)))?;
            tokens.push((offset, Token::Number(n)));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, next) = read_string(&chars, i)?;
            tokens.push((offset, Token::Str(text)));
            i = next;
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().map(|(_, c)| *c).collect();
            tokens.push((offset, Token::Ident(ident)));
            continue;
        }

        let next = chars.get(i + 1).map(|(_, c)| *c);
        let next2 = chars.get(i + 2).map(|(_, c)| *c);
        let (token, width) = match (c, next, next2) {
            ('=', Some('='), Some('=')) => (Token::EqEqEq, 3),
            ('!', Some('='), Some('=')) => (Token::BangEqEq, 3),
            ('=', Some('='), _) => (Token::EqEq, 2),
            ('!', Some('='), _) => (Token::BangEq, 2),
            ('<', Some('='), _) => (Token::LtEq, 2),
            ('>', Some('='), _) => (Token::GtEq, 2),
            ('&', Some('&'), _) => (Token::AndAnd, 2),
            ('|', Some('|'), _) => (Token::OrOr, 2),
            ('<', _, _) => (Token::Lt, 1),
            ('>', _, _) => (Token::Gt, 1),
            ('!', _, _) => (Token::Bang, 1),
            ('+', _, _) => (Token::Plus, 1),
            ('-', _, _) => (Token::Minus, 1),
            ('*', _, _) => (Token::Star, 1),
            ('/', _, _) => (Token::Slash, 1),
            ('%', _, _) => (Token::Percent, 1),
            ('(', _, _) => (Token::LParen, 1),
            (')', _, _) => (Token::RParen, 1),
            (',', _, _) => (Token::Comma, 1),
            ('?', _, _) => (Token::Question, 1),
            (':', _, _) => (Token::Colon, 1),
            _ => {
                return Err(EvalError::syntax(
                    offset,
                    format!("unexpected character `{}`", c),
                ));
            }
        };
        tokens.push((offset, token));
        i += width;
    }

    Ok(tokens)
}

/// Read a quoted string starting at `chars[start]`. Returns the unescaped text
/// and the index after the closing quote.
fn read_string(chars: &[(usize, char)], start: usize) -> EvalResult<(String, usize)> {
    let (offset, quote) = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' {
            let Some(&(_, escaped)) = chars.get(i + 1) else {
                break;
            };
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'b' => out.push('\u{8}'),
                'f' => out.push('\u{c}'),
                '/' => out.push('/'),
                'u' => {
                    let hex: String = chars.iter().skip(i + 2).take(4).map(|(_, c)| *c).collect();
                    let ch = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| EvalError::syntax(chars[i].0, "invalid unicode escape"))?;
                    out.push(ch);
                    i += 6;
                    continue;
                }
                other => out.push(other),
            }
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }

    Err(EvalError::syntax(offset, "unterminated string literal"))
}

fn binary_op_info(token: &Token) -> Option<(u8, BinaryOp)> {
    match token {
        Token::OrOr => Some((10, BinaryOp::Or)),
        Token::AndAnd => Some((20, BinaryOp::And)),
        Token::EqEq => Some((30, BinaryOp::Eq)),
        Token::BangEq => Some((30, BinaryOp::Ne)),
        Token::EqEqEq => Some((30, BinaryOp::StrictEq)),
        Token::BangEqEq => Some((30, BinaryOp::StrictNe)),
        Token::Lt => Some((40, BinaryOp::Lt)),
        Token::LtEq => Some((40, BinaryOp::Le)),
        Token::Gt => Some((40, BinaryOp::Gt)),
        Token::GtEq => Some((40, BinaryOp::Ge)),
        Token::Plus => Some((50, BinaryOp::Add)),
        Token::Minus => Some((50, BinaryOp::Sub)),
        Token::Star => Some((60, BinaryOp::Mul)),
        Token::Slash => Some((60, BinaryOp::Div)),
        Token::Percent => Some((60, BinaryOp::Mod)),
        _ => None,
    }
}

struct TokenStream {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end_offset: usize,
}

impl TokenStream {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.end_offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> EvalResult<()> {
        let offset = self.offset();
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            Some(t) => Err(EvalError::syntax(
                offset,
                format!("expected {}, found {:?}", what, t),
            )),
            None => Err(EvalError::syntax(offset, format!("expected {}", what))),
        }
    }
}

/// Parse a substituted formula into an expression tree.
pub fn parse_expression(src: &str) -> EvalResult<Expr> {
    let mut stream = TokenStream {
        tokens: tokenize(src)?,
        pos: 0,
        end_offset: src.len(),
    };
    if stream.peek().is_none() {
        return Err(EvalError::syntax(0, "empty expression"));
    }
    let expr = parse_conditional(&mut stream)?;
    if let Some(token) = stream.peek() {
        return Err(EvalError::syntax(
            stream.offset(),
            format!("unexpected {:?}", token),
        ));
    }
    Ok(expr)
}

fn parse_conditional(stream: &mut TokenStream) -> EvalResult<Expr> {
    let condition = parse_binary(stream, 0)?;
    if stream.peek() != Some(&Token::Question) {
        return Ok(condition);
    }
    stream.advance();
    let then = parse_conditional(stream)?;
    stream.expect(Token::Colon, "`:`")?;
    let otherwise = parse_conditional(stream)?;
    Ok(Expr::Conditional {
        condition: Box::new(condition),
        then: Box::new(then),
        otherwise: Box::new(otherwise),
    })
}

fn parse_binary(stream: &mut TokenStream, min_prec: u8) -> EvalResult<Expr> {
    let mut left = parse_prefix(stream)?;

    while let Some((prec, op)) = stream.peek().and_then(binary_op_info) {
        if prec < min_prec {
            break;
        }
        stream.advance();
        let right = parse_binary(stream, prec + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }

    Ok(left)
}

fn parse_prefix(stream: &mut TokenStream) -> EvalResult<Expr> {
    let op = match stream.peek() {
        Some(Token::Minus) => UnaryOp::Neg,
        Some(Token::Plus) => UnaryOp::Plus,
        Some(Token::Bang) => UnaryOp::Not,
        _ => return parse_primary(stream),
    };
    stream.advance();
    let operand = parse_prefix(stream)?;
    Ok(Expr::Unary {
        op,
        operand: Box::new(operand),
    })
}

fn parse_primary(stream: &mut TokenStream) -> EvalResult<Expr> {
    let offset = stream.offset();
    match stream.advance() {
        Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
        Some(Token::Str(s)) => Ok(Expr::Literal(Value::Text(s))),
        Some(Token::LParen) => {
            let inner = parse_conditional(stream)?;
            stream.expect(Token::RParen, "`)`")?;
            Ok(inner)
        }
        Some(Token::Ident(name)) => match name.as_str() {
            "true" => Ok(Expr::Literal(Value::Bool(true))),
            "false" => Ok(Expr::Literal(Value::Bool(false))),
            "null" => Ok(Expr::Literal(Value::Null)),
            _ if stream.peek() == Some(&Token::LParen) => Err(EvalError::syntax(
                offset,
                format!("unknown function `{}`", name),
            )),
            _ => Err(EvalError::syntax(
                offset,
                format!("unresolved identifier `{}`", name),
            )),
        },
        Some(token) => Err(EvalError::syntax(
            offset,
            format!("unexpected {:?}", token),
        )),
        None => Err(EvalError::syntax(offset, "unexpected end of expression")),
    }
}

impl Expr {
    /// Evaluate the tree. Evaluation itself never fails; type mismatches
    /// coerce (see [`Value::to_number`]).
    pub fn eval(&self) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Unary { op, operand } => {
                let v = operand.eval();
                match op {
                    UnaryOp::Neg => Value::Number(-v.to_number()),
                    UnaryOp::Plus => Value::Number(v.to_number()),
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                }
            }
            Expr::Binary { op, left, right } => apply_binary(*op, left.eval(), right.eval()),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if condition.eval().truthy() {
                    then.eval()
                } else {
                    otherwise.eval()
                }
            }
        }
    }
}

fn concat_text(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}

fn apply_binary(op: BinaryOp, l: Value, r: Value) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(l, Value::Text(_)) || matches!(r, Value::Text(_)) {
                Value::Text(format!("{}{}", concat_text(&l), concat_text(&r)))
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Mod => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            Value::Bool(compare(op, &l, &r))
        }
        BinaryOp::Eq => Value::Bool(loose_eq(&l, &r)),
        BinaryOp::Ne => Value::Bool(!loose_eq(&l, &r)),
        BinaryOp::StrictEq => Value::Bool(strict_eq(&l, &r)),
        BinaryOp::StrictNe => Value::Bool(!strict_eq(&l, &r)),
        // Operands are side-effect free, so both sides are always evaluated.
        BinaryOp::And => {
            if l.truthy() {
                r
            } else {
                l
            }
        }
        BinaryOp::Or => {
            if l.truthy() {
                l
            } else {
                r
            }
        }
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> bool {
    if let (Value::Text(a), Value::Text(b)) = (l, r) {
        return match op {
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Text(a), Value::Text(b)) => a == b,
        _ => l.to_number() == r.to_number(),
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> Value {
        parse_expression(src).unwrap().eval()
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(eval("(1 + 2) * 3"), Value::Number(9.0));
        assert_eq!(eval("10 - 4 - 3"), Value::Number(3.0));
        assert_eq!(eval("2 - -3"), Value::Number(5.0));
        assert_eq!(eval("7 % 4"), Value::Number(3.0));
        assert_eq!(eval("1.5e2 / 3"), Value::Number(50.0));
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(eval("(0) ? (1) : (2)"), Value::Number(2.0));
        assert_eq!(eval("(1>0) ? ((2>1) ? (5) : (6)) : (7)"), Value::Number(5.0));
        assert_eq!(eval("1 ? 2 : 3 ? 4 : 5"), Value::Number(2.0));
        assert_eq!(eval("0 ? 2 : 0 ? 4 : 5"), Value::Number(5.0));
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("2 > 1"), Value::Bool(true));
        assert_eq!(eval("'b' > 'a'"), Value::Bool(true));
        assert_eq!(eval("\"5\" == 5"), Value::Bool(true));
        assert_eq!(eval("\"5\" === 5"), Value::Bool(false));
        assert_eq!(eval("null == 0"), Value::Bool(false));
        assert_eq!(eval("1 && 'x'"), Value::Text("x".into()));
        assert_eq!(eval("0 || 3"), Value::Number(3.0));
        assert_eq!(eval("!0"), Value::Bool(true));
        assert_eq!(eval("true + 1"), Value::Number(2.0));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("'a' + 1"), Value::Text("a1".into()));
        assert_eq!(eval("\"x\\\"y\" + 'z'"), Value::Text("x\"yz".into()));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse_expression("").is_err());
        assert!(parse_expression("1 +").is_err());
        assert!(parse_expression("(1").is_err());
        assert!(parse_expression("1 ? 2").is_err());
        assert!(parse_expression("'open").is_err());
        assert!(parse_expression("x + 1").is_err());
        assert!(matches!(
            parse_expression("GET('F.a')"),
            Err(EvalError::Syntax { message, .. }) if message.contains("GET")
        ));
    }
}
