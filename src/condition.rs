//! Typed condition expressions.
//!
//! Formulas such as `hp_percent >= $min_hp_percent and not on_cooldown` are
//! parsed once, at load time, into an [`Expr`] tree and then evaluated
//! directly against a [`State`]. `$name` references are replaced by the
//! configured threshold value while parsing, so evaluation never looks at
//! the formula text again.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr    := and ( ("or" | "||") and )*
//! and     := unary ( ("and" | "&&") unary )*
//! unary   := ("not" | "!") unary | primary
//! primary := "(" expr ")" | key [ op operand ]
//! op      := "==" | "!=" | "<" | "<=" | ">" | ">="
//! operand := integer | 'string' | "string" | true | false | $threshold | key
//! ```
//!
//! A bare `key` means `key == true`.
//!
//! ```
//! use std::collections::BTreeMap;
//! use goap_agent::{Expr, State};
//!
//! let mut thresholds = BTreeMap::new();
//! thresholds.insert("min_hp".to_string(), 50.into());
//! let expr = Expr::parse_with_thresholds("hp >= $min_hp and not resting", &thresholds).unwrap();
//!
//! let mut live = State::new();
//! live.set("hp", 80);
//! live.set("resting", false);
//! assert!(expr.evaluate(&live));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::state::{FactValue, State};
use crate::{GoapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(FactValue),
    /// Another fact of the same state.
    Fact(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Compare {
        key: String,
        op: CompareOp,
        operand: Operand,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    /// Parses a formula that does not reference thresholds.
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_with_thresholds(input, &BTreeMap::new())
    }

    /// Parses a formula, resolving `$name` against `thresholds`.
    pub fn parse_with_thresholds(
        input: &str,
        thresholds: &BTreeMap<String, FactValue>,
    ) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
            thresholds,
        };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error(format!(
                "unexpected trailing token {:?}",
                parser.tokens[parser.pos]
            )));
        }
        Ok(expr)
    }

    /// Evaluates the expression against `facts`.
    ///
    /// A comparison whose key (or right-hand fact) is missing is false, and
    /// so is an ordering comparison between non-integers.
    pub fn evaluate(&self, facts: &State) -> bool {
        match self {
            Expr::Compare { key, op, operand } => {
                let Some(left) = facts.get(key) else {
                    return false;
                };
                let right = match operand {
                    Operand::Literal(value) => value,
                    Operand::Fact(other) => match facts.get(other) {
                        Some(value) => value,
                        None => return false,
                    },
                };
                compare(left, *op, right)
            }
            Expr::And(items) => items.iter().all(|e| e.evaluate(facts)),
            Expr::Or(items) => items.iter().any(|e| e.evaluate(facts)),
            Expr::Not(inner) => !inner.evaluate(facts),
        }
    }

    /// Every fact key the expression reads.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Expr::Compare { key, operand, .. } => {
                keys.push(key);
                if let Operand::Fact(other) = operand {
                    keys.push(other);
                }
            }
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_keys(keys);
                }
            }
            Expr::Not(inner) => inner.collect_keys(keys),
        }
    }
}

fn compare(left: &FactValue, op: CompareOp, right: &FactValue) -> bool {
    match (op, left, right) {
        (CompareOp::Eq, _, _) => left == right,
        (CompareOp::Ne, _, _) => left != right,
        (CompareOp::Lt, FactValue::Int(l), FactValue::Int(r)) => l < r,
        (CompareOp::Le, FactValue::Int(l), FactValue::Int(r)) => l <= r,
        (CompareOp::Gt, FactValue::Int(l), FactValue::Int(r)) => l > r,
        (CompareOp::Ge, FactValue::Int(l), FactValue::Int(r)) => l >= r,
        _ => false,
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Compare { key, op, operand } => match operand {
                Operand::Literal(FactValue::Str(s)) => write!(f, "{} {} '{}'", key, op.symbol(), s),
                Operand::Literal(value) => write!(f, "{} {} {}", key, op.symbol(), value),
                Operand::Fact(other) => write!(f, "{} {} {}", key, op.symbol(), other),
            },
            Expr::And(items) => write_joined(f, items, " and "),
            Expr::Or(items) => write_joined(f, items, " or "),
            Expr::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, ")")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Threshold(String),
    Literal(FactValue),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn expression_error(input: &str, message: impl Into<String>) -> GoapError {
    GoapError::Expression {
        expr: input.to_string(),
        message: message.into(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let inclusive = next == Some('=');
                let op = match (c, inclusive) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                tokens.push(Token::Op(op));
                i += if inclusive { 2 } else { 1 };
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| expression_error(input, "unterminated string"))?;
                let text: String = chars[i + 1..i + 1 + end].iter().collect();
                tokens.push(Token::Literal(FactValue::Str(text)));
                i += end + 2;
            }
            '$' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                if end == start {
                    return Err(expression_error(input, "empty threshold name after '$'"));
                }
                tokens.push(Token::Threshold(chars[start..end].iter().collect()));
                i = end;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<i64>()
                    .map_err(|e| expression_error(input, format!("bad integer '{}': {}", text, e)))?;
                tokens.push(Token::Literal(FactValue::Int(value)));
            }
            c if is_ident_char(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "true" => Token::Literal(FactValue::Bool(true)),
                    "false" => Token::Literal(FactValue::Bool(false)),
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(expression_error(
                    input,
                    format!("unexpected character '{}'", other),
                ))
            }
        }
    }

    if tokens.is_empty() {
        return Err(expression_error(input, "empty expression"));
    }
    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    thresholds: &'a BTreeMap<String, FactValue>,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> GoapError {
        expression_error(self.input, message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut items = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut items = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(Token::Ident(key)) => {
                let op = match self.peek() {
                    Some(Token::Op(op)) => *op,
                    _ => {
                        return Ok(Expr::Compare {
                            key,
                            op: CompareOp::Eq,
                            operand: Operand::Literal(FactValue::Bool(true)),
                        })
                    }
                };
                self.pos += 1;
                let operand = self.parse_operand()?;
                Ok(Expr::Compare { key, op, operand })
            }
            Some(token) => Err(self.error(format!("expected a fact name, found {:?}", token))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.advance() {
            Some(Token::Literal(value)) => Ok(Operand::Literal(value)),
            Some(Token::Ident(key)) => Ok(Operand::Fact(key)),
            Some(Token::Threshold(name)) => self
                .thresholds
                .get(&name)
                .cloned()
                .map(Operand::Literal)
                .ok_or_else(|| self.error(format!("unknown threshold '${}'", name))),
            Some(token) => Err(self.error(format!("expected a value, found {:?}", token))),
            None => Err(self.error("missing value after comparison operator")),
        }
    }
}
