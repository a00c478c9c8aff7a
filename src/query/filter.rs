//! `$filter` expressions: comparisons joined with `and`/`or`/`not` and parentheses.

use crate::schema::{as_decimal, Instance, ScalarType};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn parse(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "gt" => CompareOp::Gt,
            "ge" => CompareOp::Ge,
            "lt" => CompareOp::Lt,
            "le" => CompareOp::Le,
            _ => return None,
        })
    }

    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// Property names are schema names; values are already coerced to the property type.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpr {
    Compare {
        property: String,
        scalar_type: ScalarType,
        op: CompareOp,
        value: Value,
    },
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn matches(&self, row: &Instance) -> bool {
        match self {
            FilterExpr::Compare {
                property,
                scalar_type,
                op,
                value,
            } => {
                let left = row.get(property).unwrap_or(&Value::Null);
                let ordering = match scalar_type {
                    ScalarType::Decimal => as_decimal(left).zip(as_decimal(value)).map(|(l, r)| l.cmp(&r)),
                    _ => compare_values(left, value),
                };
                match op {
                    CompareOp::Eq if *scalar_type == ScalarType::Decimal && !left.is_null() => {
                        ordering == Some(Ordering::Equal)
                    }
                    CompareOp::Ne if *scalar_type == ScalarType::Decimal && !left.is_null() => {
                        ordering != Some(Ordering::Equal)
                    }
                    CompareOp::Eq => values_equal(left, value),
                    CompareOp::Ne => !values_equal(left, value),
                    _ => match ordering {
                        Some(ord) => match op {
                            CompareOp::Gt => ord == Ordering::Greater,
                            CompareOp::Ge => ord != Ordering::Less,
                            CompareOp::Lt => ord == Ordering::Less,
                            CompareOp::Le => ord != Ordering::Greater,
                            CompareOp::Eq | CompareOp::Ne => false,
                        },
                        None => false,
                    },
                }
            }
            FilterExpr::And(a, b) => a.matches(row) && b.matches(row),
            FilterExpr::Or(a, b) => a.matches(row) || b.matches(row),
            FilterExpr::Not(e) => !e.matches(row),
        }
    }
}

pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            matches!((as_decimal(a), as_decimal(b)), (Some(x), Some(y)) if x == y)
        }
        _ => a == b,
    }
}

/// Ordering between two values of the same JSON kind; null and mixed kinds are unordered.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        // exact decimals beyond f64 are held as strings
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            Some(as_decimal(a)?.cmp(&as_decimal(b)?))
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Quoted(String),
    Word(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            s.push('\'');
                        }
                        Some('\'') => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string literal".into()),
                    }
                }
                tokens.push(Token::Quoted(s));
            }
            _ => {
                let mut s = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '(' || ch == ')' || ch == '\'' {
                        break;
                    }
                    s.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(s));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a, F> {
    tokens: Vec<Token>,
    pos: usize,
    resolve: &'a F,
}

/// Parse `input`, resolving wire property names through `resolve` to (schema name, type).
pub fn parse_filter<F>(input: &str, resolve: &F) -> Result<FilterExpr, String>
where
    F: Fn(&str) -> Option<(String, ScalarType)>,
{
    let mut p = Parser {
        tokens: tokenize(input)?,
        pos: 0,
        resolve,
    };
    let expr = p.or()?;
    if p.pos < p.tokens.len() {
        return Err(format!("unexpected token {:?}", p.tokens[p.pos]));
    }
    Ok(expr)
}

impl<'a, F> Parser<'a, F>
where
    F: Fn(&str) -> Option<(String, ScalarType)>,
{
    fn peek_word(&self, word: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w.eq_ignore_ascii_case(word))
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn or(&mut self) -> Result<FilterExpr, String> {
        let mut left = self.and()?;
        while self.peek_word("or") {
            self.pos += 1;
            let right = self.and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<FilterExpr, String> {
        let mut left = self.unary()?;
        while self.peek_word("and") {
            self.pos += 1;
            let right = self.unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<FilterExpr, String> {
        if self.peek_word("not") {
            self.pos += 1;
            return Ok(FilterExpr::Not(Box::new(self.unary()?)));
        }
        if self.tokens.get(self.pos) == Some(&Token::Open) {
            self.pos += 1;
            let inner = self.or()?;
            return match self.next() {
                Some(Token::Close) => Ok(inner),
                _ => Err("expected ')'".into()),
            };
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<FilterExpr, String> {
        let name = match self.next() {
            Some(Token::Word(w)) => w,
            other => return Err(format!("expected a property name, found {:?}", other)),
        };
        let (property, scalar_type) =
            (self.resolve)(&name).ok_or_else(|| format!("unknown property '{}'", name))?;
        let op = match self.next() {
            Some(Token::Word(w)) => CompareOp::parse(&w).ok_or_else(|| format!("unknown operator '{}'", w))?,
            other => return Err(format!("expected an operator, found {:?}", other)),
        };
        let raw = match self.next() {
            Some(Token::Quoted(s)) => Value::String(s),
            Some(Token::Word(w)) => match literal(&w) {
                Value::Number(_) if scalar_type == ScalarType::Decimal => Value::String(w),
                v => v,
            },
            other => return Err(format!("expected a literal, found {:?}", other)),
        };
        let value = scalar_type
            .coerce(&raw)
            .map_err(|e| format!("{}: {}", name, e))?;
        Ok(FilterExpr::Compare {
            property,
            scalar_type,
            op,
            value,
        })
    }
}

fn literal(word: &str) -> Value {
    match word.to_ascii_lowercase().as_str() {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = word.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = word.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
        return Value::Number(n);
    }
    // guids and date-times are written bare
    Value::String(word.to_string())
}
