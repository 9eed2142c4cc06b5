use std::collections::HashMap;

use serde_json::Value;

use crate::context::AgentContext;
use crate::error::{FlowCoreError, Result};

/// Boolean/value expressions guarding task execution.
///
/// The grammar is deliberately small: literals, dotted paths rooted at the
/// two scope variables `data` and `globals`, comparisons, `&&`/`||`/`!`, and
/// parentheses. Missing keys below a known root resolve to null so that
/// `data.flag == null` style checks work; an unknown root is an error.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluates a guard expression. An empty or absent expression is true.
    /// Any evaluation failure degrades to `false` (the task is skipped) and
    /// is surfaced through the log, never to the caller.
    pub fn evaluate(
        condition: &str,
        context: &AgentContext,
        globals: &HashMap<String, Value>,
    ) -> bool {
        let condition = condition.trim();
        if condition.is_empty() {
            return true;
        }
        match Self::eval_value(condition, context, globals) {
            Ok(Value::Bool(result)) => result,
            Ok(other) => {
                tracing::warn!(
                    condition,
                    value = %other,
                    "condition did not evaluate to a boolean, skipping task"
                );
                false
            }
            Err(error) => {
                tracing::warn!(condition, %error, "condition evaluation failed, skipping task");
                false
            }
        }
    }

    /// Typed extraction for loop bounds and dynamic configuration. Unlike
    /// `evaluate`, parse and conversion errors propagate to the caller.
    pub fn evaluate_typed<T: serde::de::DeserializeOwned>(
        expression: &str,
        context: &AgentContext,
        globals: &HashMap<String, Value>,
    ) -> Result<T> {
        let value = Self::eval_value(expression, context, globals)?;
        serde_json::from_value(value).map_err(|e| {
            FlowCoreError::Expression(format!("cannot convert `{expression}` result: {e}"))
        })
    }

    fn eval_value(
        expression: &str,
        context: &AgentContext,
        globals: &HashMap<String, Value>,
    ) -> Result<Value> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let expr = parser.parse_or()?;
        parser.expect_end()?;
        let scope = Scope {
            data: context.data_snapshot(),
            globals,
        };
        expr.eval(&scope)
    }
}

struct Scope<'a> {
    data: HashMap<String, Value>,
    globals: &'a HashMap<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Dot,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(expr_err("expected `==`"));
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_none() {
                    return Err(expr_err("expected `&&`"));
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_none() {
                    return Err(expr_err("expected `||`"));
                }
                tokens.push(Token::Or);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => literal.push(ch),
                        None => return Err(expr_err("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        // A digit after `.` keeps it part of the number.
                        literal.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number: f64 = literal
                    .parse()
                    .map_err(|_| expr_err(&format!("invalid number `{literal}`")))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(ident),
                });
            }
            other => return Err(expr_err(&format!("unexpected character `{other}`"))),
        }
    }
    Ok(tokens)
}

fn expr_err(message: &str) -> FlowCoreError {
    FlowCoreError::Expression(message.to_string())
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, CompareOp, Box<Expr>),
}

#[derive(Clone, Copy, Debug)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_end(&self) -> Result<()> {
        if self.position == self.tokens.len() {
            Ok(())
        } else {
            Err(expr_err("trailing input after expression"))
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_compare()?;
        while self.eat(&Token::And) {
            let right = self.parse_compare()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let left = self.parse_unary()?;
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            _ => return Ok(left),
        };
        self.position += 1;
        let right = self.parse_unary()?;
        Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    return Err(expr_err("missing closing parenthesis"));
                }
                Ok(inner)
            }
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(root)) => {
                let mut segments = vec![root];
                while self.eat(&Token::Dot) {
                    match self.next() {
                        Some(Token::Ident(segment)) => segments.push(segment),
                        _ => return Err(expr_err("expected identifier after `.`")),
                    }
                }
                Ok(Expr::Path(segments))
            }
            other => Err(expr_err(&format!("unexpected token {other:?}"))),
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < (i64::MAX as f64) {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl Expr {
    fn eval(&self, scope: &Scope<'_>) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(segments) => eval_path(segments, scope),
            Expr::Not(inner) => match inner.eval(scope)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(expr_err(&format!("cannot negate non-boolean `{other}`"))),
            },
            Expr::And(left, right) => match left.eval(scope)? {
                Value::Bool(false) => Ok(Value::Bool(false)),
                Value::Bool(true) => require_bool(right.eval(scope)?),
                other => Err(expr_err(&format!("`&&` applied to non-boolean `{other}`"))),
            },
            Expr::Or(left, right) => match left.eval(scope)? {
                Value::Bool(true) => Ok(Value::Bool(true)),
                Value::Bool(false) => require_bool(right.eval(scope)?),
                other => Err(expr_err(&format!("`||` applied to non-boolean `{other}`"))),
            },
            Expr::Compare(left, op, right) => {
                compare(left.eval(scope)?, *op, right.eval(scope)?)
            }
        }
    }
}

fn require_bool(value: Value) -> Result<Value> {
    match value {
        Value::Bool(_) => Ok(value),
        other => Err(expr_err(&format!("expected boolean, found `{other}`"))),
    }
}

fn eval_path(segments: &[String], scope: &Scope<'_>) -> Result<Value> {
    let root = match segments[0].as_str() {
        "data" => &scope.data,
        "globals" => scope.globals,
        other => return Err(expr_err(&format!("unknown variable `{other}`"))),
    };
    let mut current = match segments.get(1) {
        // Bare `data` / `globals` is not addressable as a value.
        None => return Err(expr_err("expected a key after the scope variable")),
        Some(key) => root.get(key).cloned().unwrap_or(Value::Null),
    };
    for segment in &segments[2..] {
        current = match current {
            Value::Object(ref map) => map.get(segment).cloned().unwrap_or(Value::Null),
            Value::Null => Value::Null,
            other => {
                return Err(expr_err(&format!(
                    "cannot descend into `{other}` with `.{segment}`"
                )))
            }
        };
    }
    Ok(current)
}

fn compare(left: Value, op: CompareOp, right: Value) -> Result<Value> {
    let result = match op {
        CompareOp::Eq => values_equal(&left, &right),
        CompareOp::Ne => !values_equal(&left, &right),
        ordering => {
            let ord = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => {
                    let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                    a.partial_cmp(&b)
                        .ok_or_else(|| expr_err("cannot order NaN"))?
                }
                (Value::String(a), Value::String(b)) => a.cmp(b),
                _ => {
                    return Err(expr_err(&format!(
                        "cannot order `{left}` against `{right}`"
                    )))
                }
            };
            match ordering {
                CompareOp::Lt => ord.is_lt(),
                CompareOp::Le => ord.is_le(),
                CompareOp::Gt => ord.is_gt(),
                CompareOp::Ge => ord.is_ge(),
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            }
        }
    };
    Ok(Value::Bool(result))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        // Integer and float representations of the same number are equal.
        (Value::Number(a), Value::Number(b)) => {
            a.as_f64().unwrap_or(f64::NAN) == b.as_f64().unwrap_or(f64::NAN)
        }
        _ => left == right,
    }
}
