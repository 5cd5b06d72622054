//! Edge condition language.
//!
//! Conditions are small boolean expressions over the run state:
//!
//! ```text
//! summary_length > 400
//! status == "ok" and not (retries >= 3)
//! stats.words <= 100 || force == true
//! ```
//!
//! Expressions are parsed into an [`Expr`] tree and evaluated against a
//! [`State`]. Evaluation never mutates the state and never coerces: a
//! missing key, a comparison between different kinds of values, or a
//! non-boolean operand to a logical operator is a [`ConditionError`].

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::CharIndices;

use serde_json::{Number, Value};

use strand_core::error::ConditionError;
use strand_core::graph::{CompareOp, ConditionSpec};
use strand_core::types::State;

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Reference to a (possibly dotted) state key.
    Key(String),
    /// Top-level state key taken verbatim, with no path resolution.
    Field(String),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A parsed, ready-to-evaluate edge condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    expr: Expr,
}

impl Condition {
    /// Parse an expression string.
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        let expr = parser.or_expr()?;
        if let Some(tok) = parser.peek() {
            return Err(syntax(tok.offset, format!("unexpected {}", tok.kind.describe())));
        }
        Ok(Self { expr })
    }

    /// Build a condition from either authoring form.
    pub fn from_spec(spec: &ConditionSpec) -> Result<Self, ConditionError> {
        match spec {
            ConditionSpec::Expr(source) => Self::parse(source),
            ConditionSpec::Compare { key, op, value } => Ok(Self {
                expr: Expr::Compare {
                    op: *op,
                    left: Box::new(Expr::Field(key.clone())),
                    right: Box::new(Expr::Literal(value.clone())),
                },
            }),
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against `state`. The result must be a boolean.
    pub fn evaluate(&self, state: &State) -> Result<bool, ConditionError> {
        let value = eval(&self.expr, state)?;
        as_bool(&value, "condition")
    }
}

// ── Evaluation ──────────────────────────────────────────────────

fn eval(expr: &Expr, state: &State) -> Result<Value, ConditionError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Key(key) => state
            .lookup(key)
            .cloned()
            .ok_or_else(|| ConditionError::MissingKey(key.clone())),
        Expr::Field(key) => state
            .get(key)
            .cloned()
            .ok_or_else(|| ConditionError::MissingKey(key.clone())),
        Expr::Compare { op, left, right } => {
            let l = eval(left, state)?;
            let r = eval(right, state)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
        Expr::Not(inner) => {
            let v = eval(inner, state)?;
            Ok(Value::Bool(!as_bool(&v, "not")?))
        }
        Expr::And(a, b) => {
            if !as_bool(&eval(a, state)?, "and")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(as_bool(&eval(b, state)?, "and")?))
        }
        Expr::Or(a, b) => {
            if as_bool(&eval(a, state)?, "or")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(as_bool(&eval(b, state)?, "or")?))
        }
    }
}

fn as_bool(value: &Value, context: &'static str) -> Result<bool, ConditionError> {
    value.as_bool().ok_or(ConditionError::NotBoolean {
        context,
        found: kind(value),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(op: CompareOp, l: &Value, r: &Value) -> ConditionError {
    ConditionError::TypeMismatch {
        op: op.as_str().to_string(),
        left: kind(l),
        right: kind(r),
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

fn compare(op: CompareOp, l: &Value, r: &Value) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match (l, r) {
                (Value::Null, _) | (_, Value::Null) => l == r,
                (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Ordering::Equal,
                _ if kind(l) == kind(r) => l == r,
                _ => return Err(mismatch(op, l, r)),
            };
            Ok(if op == CompareOp::Eq { equal } else { !equal })
        }
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            let ordering = match (l, r) {
                (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => return Err(mismatch(op, l, r)),
            };
            Ok(match op {
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            })
        }
    }
}

// ── Lexing ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Number(Number),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Cmp(CompareOp),
    Minus,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{}'", name),
            Self::Number(n) => format!("number {}", n),
            Self::Str(s) => format!("string {:?}", s),
            Self::True => "'true'".into(),
            Self::False => "'false'".into(),
            Self::Null => "'null'".into(),
            Self::And => "'and'".into(),
            Self::Or => "'or'".into(),
            Self::Not => "'not'".into(),
            Self::Cmp(op) => format!("'{}'", op),
            Self::Minus => "'-'".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> ConditionError {
    ConditionError::Syntax {
        position,
        message: message.into(),
    }
}

fn check_key(key: &str, offset: usize) -> Result<(), ConditionError> {
    let valid = !key.is_empty()
        && key.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(syntax(offset, format!("invalid key '{}'", key)))
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        let kind = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            '-' => {
                chars.next();
                TokenKind::Minus
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = matches!(chars.peek(), Some(&(_, '=')));
                if followed_by_eq {
                    chars.next();
                }
                match (c, followed_by_eq) {
                    ('=', true) => TokenKind::Cmp(CompareOp::Eq),
                    ('=', false) => return Err(syntax(offset, "expected '==' instead of '='")),
                    ('!', true) => TokenKind::Cmp(CompareOp::Ne),
                    ('!', false) => TokenKind::Not,
                    ('<', true) => TokenKind::Cmp(CompareOp::Le),
                    ('<', false) => TokenKind::Cmp(CompareOp::Lt),
                    ('>', true) => TokenKind::Cmp(CompareOp::Ge),
                    _ => TokenKind::Cmp(CompareOp::Gt),
                }
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        if c == '&' {
                            TokenKind::And
                        } else {
                            TokenKind::Or
                        }
                    }
                    _ => return Err(syntax(offset, format!("expected '{}{}'", c, c))),
                }
            }
            '"' | '\'' => TokenKind::Str(lex_string(&mut chars, offset)?),
            c if c.is_ascii_digit() => TokenKind::Number(lex_number(source, &mut chars, offset)?),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let word = take_while(source, &mut chars, offset, |c| {
                    c.is_ascii_alphanumeric() || c == '_' || c == '.'
                });
                match word {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    key => {
                        check_key(key, offset)?;
                        TokenKind::Ident(key.to_string())
                    }
                }
            }
            other => return Err(syntax(offset, format!("unexpected character '{}'", other))),
        };
        tokens.push(Token { kind, offset });
    }

    Ok(tokens)
}

fn take_while<'a>(
    source: &'a str,
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
    pred: impl Fn(char) -> bool,
) -> &'a str {
    let mut end = start;
    while let Some(&(i, c)) = chars.peek() {
        if !pred(c) {
            break;
        }
        end = i + c.len_utf8();
        chars.next();
    }
    &source[start..end]
}

fn lex_number(
    source: &str,
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
) -> Result<Number, ConditionError> {
    let text = take_while(source, chars, start, |c| c.is_ascii_digit() || c == '.');
    if !text.contains('.') {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Number::from(n));
        }
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| syntax(start, format!("invalid number '{}'", text)))
}

fn lex_string(
    chars: &mut Peekable<CharIndices<'_>>,
    start: usize,
) -> Result<String, ConditionError> {
    let quote = match chars.next() {
        Some((_, q)) => q,
        None => return Err(syntax(start, "unterminated string")),
    };
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(syntax(start, "unterminated string")),
            Some((_, c)) if c == quote => return Ok(out),
            Some((i, '\\')) => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, c @ ('\\' | '"' | '\''))) => out.push(c),
                Some((_, other)) => {
                    return Err(syntax(i, format!("unknown escape '\\{}'", other)))
                }
                None => return Err(syntax(start, "unterminated string")),
            },
            Some((_, c)) => out.push(c),
        }
    }
}

// ── Parsing ─────────────────────────────────────────────────────
//
// or_expr    := and_expr (("or" | "||") and_expr)*
// and_expr   := not_expr (("and" | "&&") not_expr)*
// not_expr   := ("not" | "!") not_expr | comparison
// comparison := operand (cmp_op operand)?
// operand    := literal | key | "-" number | "(" or_expr ")"

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().map(|t| &t.kind) == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ConditionError> {
        if self.eat(&TokenKind::Not) {
            return Ok(Expr::Not(Box::new(self.not_expr()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.operand()?;
        let op = match self.peek() {
            Some(Token {
                kind: TokenKind::Cmp(op),
                ..
            }) => *op,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.operand()?;
        if let Some(Token {
            kind: TokenKind::Cmp(_),
            offset,
        }) = self.peek()
        {
            return Err(syntax(*offset, "comparisons cannot be chained"));
        }
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn operand(&mut self) -> Result<Expr, ConditionError> {
        let end = self.end;
        let tok = self
            .next()
            .ok_or_else(|| syntax(end, "unexpected end of expression"))?;
        match tok.kind {
            TokenKind::Ident(key) => Ok(Expr::Key(key)),
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::Minus => match self.next() {
                Some(Token {
                    kind: TokenKind::Number(n),
                    offset,
                }) => negate(&n)
                    .map(|n| Expr::Literal(Value::Number(n)))
                    .ok_or_else(|| syntax(offset, "number out of range")),
                Some(other) => Err(syntax(
                    other.offset,
                    format!("expected a number after '-', found {}", other.kind.describe()),
                )),
                None => Err(syntax(end, "expected a number after '-'")),
            },
            TokenKind::LParen => {
                let inner = self.or_expr()?;
                if !self.eat(&TokenKind::RParen) {
                    let at = self.peek().map(|t| t.offset).unwrap_or(end);
                    return Err(syntax(at, "expected ')'"));
                }
                Ok(inner)
            }
            other => Err(syntax(
                tok.offset,
                format!("expected a value, found {}", other.describe()),
            )),
        }
    }
}

fn negate(n: &Number) -> Option<Number> {
    if let Some(i) = n.as_i64() {
        return i.checked_neg().map(Number::from);
    }
    n.as_f64().and_then(|f| Number::from_f64(-f))
}
