//! Breakpoint condition expressions.
//!
//! A deliberately small boolean language: `||`, `&&`, unary `!`, the six
//! comparison operators, literals, and dotted identifier paths resolved
//! against the stopped frame. No method calls, no arithmetic. Precedence from
//! loosest to tightest: `||`, `&&`, `!`, comparison, primary.
//!
//! Parse failures are *syntax* errors and fail `set_breakpoint` up front;
//! failures while evaluating against a live frame are *evaluation* errors and
//! auto-resume the hit with a notification instead.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("{0}")]
pub struct SyntaxError(pub String);

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    /// Operator applied to operand kinds it does not accept.
    #[error("ERR_CONDITION_TYPE: {0}")]
    Type(String),
    /// The frame resolver could not produce a value for a path.
    #[error("{0}")]
    Resolve(String),
}

/// Value domain the evaluator works over. Chars and every numeric primitive
/// collapse to `Number`; objects keep only their type name.
#[derive(Debug, Clone, PartialEq)]
pub enum CondValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Object(Option<String>),
}

impl CondValue {
    fn kind(&self) -> &'static str {
        match self {
            CondValue::Null => "null",
            CondValue::Bool(_) => "boolean",
            CondValue::Number(_) => "number",
            CondValue::Text(_) => "string",
            CondValue::Object(_) => "object",
        }
    }
}

fn truthy(value: &CondValue) -> bool {
    match value {
        CondValue::Null => false,
        CondValue::Bool(b) => *b,
        CondValue::Number(n) => *n != 0.0,
        // Any string, even the empty one, is truthy.
        CondValue::Text(_) => true,
        CondValue::Object(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Literal(CondValue),
    Path(Vec<String>),
}

/// Outcome surfaced to the breakpoint dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOutcome {
    /// Suspend the thread and report the hit.
    True,
    /// Auto-resume silently.
    False,
    /// Auto-resume and emit a `breakpoint_condition_error` notification.
    Error(String),
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    OrOr,
    AndAnd,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Dot,
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
}

fn lex(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
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
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_none() {
                    return Err(SyntaxError("expected '||'".to_string()));
                }
                tokens.push(Token::OrOr);
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_none() {
                    return Err(SyntaxError("expected '&&'".to_string()));
                }
                tokens.push(Token::AndAnd);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(SyntaxError("expected '==' (assignment is not supported)".to_string()));
                }
                tokens.push(Token::EqEq);
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
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err(SyntaxError("unterminated string literal".to_string())),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('"') => text.push('"'),
                            Some('\\') => text.push('\\'),
                            Some('n') => text.push('\n'),
                            Some('r') => text.push('\r'),
                            Some('t') => text.push('\t'),
                            Some(other) => {
                                return Err(SyntaxError(format!("invalid escape '\\{other}'")))
                            }
                            None => {
                                return Err(SyntaxError("unterminated string literal".to_string()))
                            }
                        },
                        Some(other) => text.push(other),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '0'..='9' => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        // A dot only belongs to the number when a digit follows;
                        // otherwise it starts a path segment (not valid after a
                        // number, the parser will reject it).
                        if d == '.' {
                            let mut lookahead = chars.clone();
                            lookahead.next();
                            if !lookahead.peek().is_some_and(|n| n.is_ascii_digit()) {
                                break;
                            }
                        }
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = digits
                    .parse()
                    .map_err(|_| SyntaxError(format!("invalid number literal '{digits}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c == '_' || c == '$' || c.is_ascii_alphabetic() => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d == '_' || d == '$' || d.is_ascii_alphanumeric() {
                        ident.push(d);
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
            other => {
                return Err(SyntaxError(format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.not()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let lhs = self.primary()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(CmpOp::Eq),
            Some(Token::NotEq) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(lhs);
        };
        self.pos += 1;
        let rhs = self.primary()?;
        Ok(Expr::Cmp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or()?;
                if !self.eat(&Token::RParen) {
                    return Err(SyntaxError("expected ')'".to_string()));
                }
                Ok(inner)
            }
            Some(Token::Null) => Ok(Expr::Literal(CondValue::Null)),
            Some(Token::True) => Ok(Expr::Literal(CondValue::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(CondValue::Bool(false))),
            Some(Token::Number(n)) => Ok(Expr::Literal(CondValue::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(CondValue::Text(s))),
            Some(Token::Ident(first)) => {
                let mut path = vec![first];
                while self.eat(&Token::Dot) {
                    match self.next() {
                        Some(Token::Ident(segment)) => path.push(segment),
                        _ => {
                            return Err(SyntaxError(
                                "expected identifier after '.'".to_string(),
                            ))
                        }
                    }
                }
                if self.peek() == Some(&Token::LParen) {
                    return Err(SyntaxError(format!(
                        "method calls are not supported in conditions (near '{}')",
                        path.join(".")
                    )));
                }
                Ok(Expr::Path(path))
            }
            Some(other) => Err(SyntaxError(format!("unexpected token {other:?}"))),
            None => Err(SyntaxError("unexpected end of expression".to_string())),
        }
    }
}

/// Parse a condition into its AST, rejecting anything outside the language.
pub fn parse(src: &str) -> Result<Expr, SyntaxError> {
    let tokens = lex(src)?;
    if tokens.is_empty() {
        return Err(SyntaxError("empty condition".to_string()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or()?;
    if let Some(trailing) = parser.peek() {
        return Err(SyntaxError(format!("unexpected trailing token {trailing:?}")));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluator

pub type PathResolver<'a> = dyn Fn(&[String]) -> Result<CondValue, String> + 'a;

pub fn evaluate(expr: &Expr, resolver: &PathResolver<'_>) -> Result<CondValue, EvalError> {
    match expr {
        Expr::Or(lhs, rhs) => {
            if truthy(&evaluate(lhs, resolver)?) {
                return Ok(CondValue::Bool(true));
            }
            Ok(CondValue::Bool(truthy(&evaluate(rhs, resolver)?)))
        }
        Expr::And(lhs, rhs) => {
            if !truthy(&evaluate(lhs, resolver)?) {
                return Ok(CondValue::Bool(false));
            }
            Ok(CondValue::Bool(truthy(&evaluate(rhs, resolver)?)))
        }
        Expr::Not(inner) => Ok(CondValue::Bool(!truthy(&evaluate(inner, resolver)?))),
        Expr::Cmp(op, lhs, rhs) => {
            let lhs = evaluate(lhs, resolver)?;
            let rhs = evaluate(rhs, resolver)?;
            compare(*op, &lhs, &rhs).map(CondValue::Bool)
        }
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => resolver(path).map_err(EvalError::Resolve),
    }
}

fn compare(op: CmpOp, lhs: &CondValue, rhs: &CondValue) -> Result<bool, EvalError> {
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let equal = equality(lhs, rhs)?;
            Ok(if op == CmpOp::Eq { equal } else { !equal })
        }
        _ => {
            let (CondValue::Number(a), CondValue::Number(b)) = (lhs, rhs) else {
                return Err(EvalError::Type(format!(
                    "'{op}' requires numeric operands, got {} and {}",
                    lhs.kind(),
                    rhs.kind()
                )));
            };
            Ok(match op {
                CmpOp::Lt => a < b,
                CmpOp::Le => a <= b,
                CmpOp::Gt => a > b,
                CmpOp::Ge => a >= b,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            })
        }
    }
}

fn equality(lhs: &CondValue, rhs: &CondValue) -> Result<bool, EvalError> {
    if matches!(lhs, CondValue::Object(_)) || matches!(rhs, CondValue::Object(_)) {
        return Err(EvalError::Type(
            "objects cannot be compared with '==' / '!='".to_string(),
        ));
    }
    Ok(match (lhs, rhs) {
        (CondValue::Null, CondValue::Null) => true,
        (CondValue::Null, _) | (_, CondValue::Null) => false,
        (CondValue::Bool(a), CondValue::Bool(b)) => a == b,
        (CondValue::Number(a), CondValue::Number(b)) => a == b,
        (CondValue::Text(a), CondValue::Text(b)) => a == b,
        (a, b) => {
            return Err(EvalError::Type(format!(
                "'==' cannot compare {} with {}",
                a.kind(),
                b.kind()
            )))
        }
    })
}

/// Evaluate a pre-parsed condition to its dispatcher-facing outcome.
pub fn evaluate_condition(expr: &Expr, resolver: &PathResolver<'_>) -> ConditionOutcome {
    match evaluate(expr, resolver) {
        Ok(value) if truthy(&value) => ConditionOutcome::True,
        Ok(_) => ConditionOutcome::False,
        Err(err) => ConditionOutcome::Error(err.to_string()),
    }
}
