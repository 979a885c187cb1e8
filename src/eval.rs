//! Expression evaluation against a state snapshot.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or      := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | compare
//! compare := primary (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not in") primary)?
//! primary := string | number | true | false | null | "[" list "]" | "(" or ")" | path
//! path    := ident ("." ident | "." digits | "[" digits "]" | "[" string "]")*
//! ```
//!
//! A path starting with `state` reads the store directly. Any other path is
//! first offered to the enclosing loop scope, then to the store.
//!
//! Evaluation never fails: a malformed expression resolves to null.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::OnceLock;
use tracing::debug;

use crate::path::{self, STATE_PREFIX};
use crate::value::{compare, contains, is_truthy, to_display_string, values_equal};

/// Read access to the values an expression can see.
pub trait Lookup {
    /// Resolves a dotted path. Loop variables shadow state keys.
    fn lookup(&self, path: &str) -> Option<Value>;

    /// Resolves a dotted path against the store only.
    fn lookup_state(&self, path: &str) -> Option<Value> {
        self.lookup(path)
    }
}

impl Lookup for Map<String, Value> {
    fn lookup(&self, path: &str) -> Option<Value> {
        path::get(self, path).cloned()
    }
}

impl<T: Lookup + ?Sized> Lookup for &T {
    fn lookup(&self, path: &str) -> Option<Value> {
        (**self).lookup(path)
    }

    fn lookup_state(&self, path: &str) -> Option<Value> {
        (**self).lookup_state(path)
    }
}

/// Evaluates `expr` and applies truthiness. Missing values are false.
pub fn evaluate_condition(expr: &str, state: &impl Lookup) -> bool {
    is_truthy(&resolve_any(expr, state))
}

/// Resolves a path or literal expression to a typed value.
pub fn resolve_any(expr: &str, state: &impl Lookup) -> Value {
    match parse(expr) {
        Some(ast) => ast.eval(state),
        None => {
            debug!(expression = expr, "unparseable expression resolved to null");
            Value::Null
        }
    }
}

/// Replaces every `{expr}` in `template` with the string form of its value.
pub fn interpolate_text(template: &str, state: &impl Lookup) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures| {
            to_display_string(&resolve_any(&caps[1], state))
        })
        .into_owned()
}

/// Returns the inner expression when `text` is exactly one `{expr}` placeholder.
pub fn single_placeholder(text: &str) -> Option<&str> {
    let caps = single_placeholder_regex().captures(text)?;
    caps.get(1).map(|m| m.as_str().trim())
}

/// Resolves templates inside a prop or action value.
///
/// A string that is exactly one `{expr}` placeholder takes the typed value of
/// `expr`; other strings containing placeholders are interpolated as text.
/// Lists and maps are resolved element by element.
pub fn resolve_template(value: &Value, state: &impl Lookup) -> Value {
    match value {
        Value::String(s) => match single_placeholder(s) {
            Some(expr) => resolve_any(expr, state),
            None if s.contains('{') => Value::String(interpolate_text(s, state)),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_template(v, state)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_template(v, state)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Formats a millisecond Unix timestamp as an ISO date (`YYYY-MM-DD`, UTC).
pub fn format_date_from_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Parses an ISO date or RFC 3339 timestamp back to Unix milliseconds.
pub fn parse_date_to_millis(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("valid placeholder regex"))
}

fn single_placeholder_regex() -> &'static Regex {
    static SINGLE_REGEX: OnceLock<Regex> = OnceLock::new();
    SINGLE_REGEX.get_or_init(|| Regex::new(r"^\s*\{([^{}]*)\}\s*$").expect("valid placeholder regex"))
}

// ─── AST ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Path { state_only: bool, path: String },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl Expr {
    pub(crate) fn eval(&self, state: &impl Lookup) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::List(items) => Value::Array(items.iter().map(|e| e.eval(state)).collect()),
            Expr::Path { state_only, path } => {
                let found = if *state_only {
                    state.lookup_state(path)
                } else {
                    state.lookup(path)
                };
                found.unwrap_or(Value::Null)
            }
            Expr::Not(inner) => Value::Bool(!is_truthy(&inner.eval(state))),
            Expr::And(l, r) => Value::Bool(is_truthy(&l.eval(state)) && is_truthy(&r.eval(state))),
            Expr::Or(l, r) => Value::Bool(is_truthy(&l.eval(state)) || is_truthy(&r.eval(state))),
            Expr::Compare(op, l, r) => {
                let (l, r) = (l.eval(state), r.eval(state));
                let result = match op {
                    CompareOp::Eq => values_equal(&l, &r),
                    CompareOp::Ne => !values_equal(&l, &r),
                    CompareOp::Lt => compare(&l, &r) == Some(Ordering::Less),
                    CompareOp::Le => matches!(compare(&l, &r), Some(Ordering::Less | Ordering::Equal)),
                    CompareOp::Gt => compare(&l, &r) == Some(Ordering::Greater),
                    CompareOp::Ge => {
                        matches!(compare(&l, &r), Some(Ordering::Greater | Ordering::Equal))
                    }
                    CompareOp::In => contains(&r, &l),
                    CompareOp::NotIn => !contains(&r, &l),
                };
                Value::Bool(result)
            }
        }
    }
}

// ─── Lexer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Num(f64),
    Ident(String),
    Op(&'static str),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Minus,
}

fn tokenize(src: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    let ch = *chars.get(i)?;
                    i += 1;
                    match ch {
                        '\\' => {
                            s.push(*chars.get(i)?);
                            i += 1;
                        }
                        ch if ch == quote => break,
                        ch => s.push(ch),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                // A fraction only when the previous token is not a dot, so
                // `items.0.name` keeps its segments.
                let after_dot = matches!(tokens.last(), Some(Token::Dot));
                if !after_dot
                    && i + 1 < chars.len()
                    && chars[i] == '.'
                    && chars[i + 1].is_ascii_digit()
                {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(text.parse().ok()?));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => ("==", 2),
                    ('!', Some('=')) => ("!=", 2),
                    ('<', Some('=')) => ("<=", 2),
                    ('>', Some('=')) => (">=", 2),
                    ('&', Some('&')) => ("&&", 2),
                    ('|', Some('|')) => ("||", 2),
                    ('<', _) => ("<", 1),
                    ('>', _) => (">", 1),
                    ('!', _) => ("!", 1),
                    _ => return None,
                };
                tokens.push(Token::Op(op));
                i += len;
            }
        }
    }
    Some(tokens)
}

// ─── Parser ──────────────────────────────────────────────────────────────────

pub(crate) fn parse(src: &str) -> Option<Expr> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return None;
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return None;
    }
    Some(expr)
}

/// Deepest nesting of parentheses, lists and `!` a single expression may use
const MAX_EXPR_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, symbol: &'static str, word: &str) -> bool {
        match self.peek() {
            Some(Token::Op(op)) if *op == symbol => {
                self.pos += 1;
                true
            }
            Some(Token::Ident(id)) if id == word => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    /// Runs `parse` one nesting level deeper; `None` past `MAX_EXPR_DEPTH`.
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Option<Expr>) -> Option<Expr> {
        if self.depth >= MAX_EXPR_DEPTH {
            return None;
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn or(&mut self) -> Option<Expr> {
        self.nested(Self::or_chain)
    }

    fn or_chain(&mut self) -> Option<Expr> {
        let mut left = self.and()?;
        while self.eat_keyword("||", "or") {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Some(left)
    }

    fn and(&mut self) -> Option<Expr> {
        let mut left = self.unary()?;
        while self.eat_keyword("&&", "and") {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Some(left)
    }

    fn unary(&mut self) -> Option<Expr> {
        let is_not_in = matches!(
            (self.peek(), self.peek_at(1)),
            (Some(Token::Ident(a)), Some(Token::Ident(b))) if a == "not" && b == "in"
        );
        if !is_not_in && self.eat_keyword("!", "not") {
            let inner = self.nested(Self::unary)?;
            return Some(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Option<Expr> {
        let left = self.primary()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => CompareOp::Eq,
            Some(Token::Op("!=")) => CompareOp::Ne,
            Some(Token::Op("<")) => CompareOp::Lt,
            Some(Token::Op("<=")) => CompareOp::Le,
            Some(Token::Op(">")) => CompareOp::Gt,
            Some(Token::Op(">=")) => CompareOp::Ge,
            Some(Token::Ident(id)) if id == "in" => CompareOp::In,
            Some(Token::Ident(id))
                if id == "not"
                    && matches!(self.peek_at(1), Some(Token::Ident(next)) if next == "in") =>
            {
                self.pos += 1;
                CompareOp::NotIn
            }
            _ => return Some(left),
        };
        self.pos += 1;
        let right = self.primary()?;
        Some(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn primary(&mut self) -> Option<Expr> {
        match self.next()? {
            Token::Str(s) => Some(Expr::Literal(Value::String(s))),
            Token::Num(n) => Some(Expr::Literal(number(n))),
            Token::Minus => match self.next()? {
                Token::Num(n) => Some(Expr::Literal(number(-n))),
                _ => None,
            },
            Token::LParen => {
                let inner = self.or()?;
                self.eat(&Token::RParen).then_some(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if self.eat(&Token::RBracket) {
                    return Some(Expr::List(items));
                }
                loop {
                    items.push(self.or()?);
                    if self.eat(&Token::RBracket) {
                        return Some(Expr::List(items));
                    }
                    if !self.eat(&Token::Comma) {
                        return None;
                    }
                }
            }
            Token::Ident(id) => match id.as_str() {
                "true" => Some(Expr::Literal(Value::Bool(true))),
                "false" => Some(Expr::Literal(Value::Bool(false))),
                "null" => Some(Expr::Literal(Value::Null)),
                _ => self.path(id),
            },
            _ => None,
        }
    }

    fn path(&mut self, head: String) -> Option<Expr> {
        let mut segments = vec![head];
        loop {
            if self.eat(&Token::Dot) {
                match self.next()? {
                    Token::Ident(id) => segments.push(id),
                    Token::Num(n) if n.fract() == 0.0 && n >= 0.0 => {
                        segments.push((n as u64).to_string())
                    }
                    _ => return None,
                }
            } else if self.eat(&Token::LBracket) {
                match self.next()? {
                    Token::Num(n) if n.fract() == 0.0 && n >= 0.0 => {
                        segments.push((n as u64).to_string())
                    }
                    Token::Str(s) => segments.push(s),
                    _ => return None,
                }
                if !self.eat(&Token::RBracket) {
                    return None;
                }
            } else {
                break;
            }
        }

        let state_only = segments[0] == STATE_PREFIX;
        let path = if state_only {
            segments[1..].join(".")
        } else {
            segments.join(".")
        };
        Some(Expr::Path { state_only, path })
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
