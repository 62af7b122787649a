//! Constant-expression evaluator for `#if` conditions and array sizes.

use crate::error::CompileError;
use crate::frontend::token::Location;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use anyhow::Result;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn is_true(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
        }
    }
    fn as_f64(&self) -> f64 {
        match self {
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
        }
    }
    fn from_bool(b: bool) -> Value {
        Value::Int(b as i64)
    }
}

fn precedence(op: &str) -> Option<u8> {
    let prec = match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | "<=" | ">" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    };
    Some(prec)
}

/// Parse an integer literal such as `42`, `0x2A`, `052` or `42ul`.
pub fn parse_integer(lexeme: &str) -> Option<i64> {
    let digits = lexeme.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse::<i64>().ok()
    }
}

struct Evaluator<'a> {
    tokens: &'a [Token],
    current: usize,
    /// Value of identifiers that survived macro expansion.
    unknown: Option<Value>,
}

impl<'a> Evaluator<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.current)
    }
    fn location(&self) -> Location {
        match self.peek().or(self.tokens.last()) {
            Some(token) => token.location,
            None => Location::default(),
        }
    }
    fn error(&self, msg: &str) -> anyhow::Error {
        CompileError::macros(self.location(), msg.to_string())
    }
    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.current);
        self.current += 1;
        token
    }
    fn expect(&mut self, text: &str) -> Result<()> {
        match self.advance() {
            Some(token) if token.is(text) => Ok(()),
            _ => Err(self.error(&format!("expected `{text}` in constant expression"))),
        }
    }
    fn conditional(&mut self) -> Result<Value> {
        let condition = self.binary(1)?;
        if self.peek().is_some_and(|t| t.is("?")) {
            self.advance();
            let then = self.conditional()?;
            self.expect(":")?;
            let otherwise = self.conditional()?;
            return Ok(if condition.is_true() { then } else { otherwise });
        }
        Ok(condition)
    }
    fn binary(&mut self, min_prec: u8) -> Result<Value> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(token) if token.kind == TokenKind::Operator => token.lexeme.as_str(),
                _ => break,
            };
            let prec = match precedence(op) {
                Some(prec) if prec >= min_prec => prec,
                _ => break,
            };
            self.advance();
            let rhs = self.binary(prec + 1)?;
            lhs = self.apply(op, lhs, rhs)?;
        }
        Ok(lhs)
    }
    fn apply(&self, op: &str, lhs: Value, rhs: Value) -> Result<Value> {
        if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
            let value = match op {
                "+" => a.wrapping_add(b),
                "-" => a.wrapping_sub(b),
                "*" => a.wrapping_mul(b),
                "/" | "%" if b == 0 => return Err(self.error("division by zero")),
                "/" => a.wrapping_div(b),
                "%" => a.wrapping_rem(b),
                "<<" => a.wrapping_shl(b as u32),
                ">>" => a.wrapping_shr(b as u32),
                "&" => a & b,
                "|" => a | b,
                "^" => a ^ b,
                "<" => (a < b) as i64,
                "<=" => (a <= b) as i64,
                ">" => (a > b) as i64,
                ">=" => (a >= b) as i64,
                "==" => (a == b) as i64,
                "!=" => (a != b) as i64,
                "&&" => (a != 0 && b != 0) as i64,
                "||" => (a != 0 || b != 0) as i64,
                _ => return Err(self.error(&format!("unsupported operator `{op}`"))),
            };
            return Ok(Value::Int(value));
        }
        let (a, b) = (lhs.as_f64(), rhs.as_f64());
        let value = match op {
            "+" => Value::Float(a + b),
            "-" => Value::Float(a - b),
            "*" => Value::Float(a * b),
            "/" => Value::Float(a / b),
            "<" => Value::from_bool(a < b),
            "<=" => Value::from_bool(a <= b),
            ">" => Value::from_bool(a > b),
            ">=" => Value::from_bool(a >= b),
            "==" => Value::from_bool(a == b),
            "!=" => Value::from_bool(a != b),
            "&&" => Value::from_bool(lhs.is_true() && rhs.is_true()),
            "||" => Value::from_bool(lhs.is_true() || rhs.is_true()),
            _ => {
                let msg = format!("operator `{op}` requires integer operands");
                return Err(self.error(&msg));
            }
        };
        Ok(value)
    }
    fn unary(&mut self) -> Result<Value> {
        let token = match self.peek() {
            Some(token) => token,
            None => return Err(self.error("unexpected end of constant expression")),
        };
        if token.kind == TokenKind::Operator {
            let op = token.lexeme.as_str();
            if matches!(op, "-" | "+" | "!" | "~") {
                self.advance();
                let value = self.unary()?;
                return match (op, value) {
                    ("-", Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
                    ("-", Value::Float(v)) => Ok(Value::Float(-v)),
                    ("+", value) => Ok(value),
                    ("!", value) => Ok(Value::from_bool(!value.is_true())),
                    ("~", Value::Int(v)) => Ok(Value::Int(!v)),
                    _ => Err(self.error("operator `~` requires an integer operand")),
                };
            }
        }
        self.primary()
    }
    fn primary(&mut self) -> Result<Value> {
        let token = match self.advance() {
            Some(token) => token,
            None => return Err(self.error("unexpected end of constant expression")),
        };
        match token.kind {
            TokenKind::LParen => {
                let value = self.conditional()?;
                self.expect(")")?;
                Ok(value)
            }
            TokenKind::Integer => match parse_integer(&token.lexeme) {
                Some(v) => Ok(Value::Int(v)),
                None => Err(self.error(&format!("invalid integer `{}`", token.lexeme))),
            },
            TokenKind::Float => {
                let digits = token.lexeme.trim_end_matches(['f', 'F', 'l', 'L']);
                match digits.parse::<f64>() {
                    Ok(v) => Ok(Value::Float(v)),
                    Err(_) => Err(self.error(&format!("invalid number `{}`", token.lexeme))),
                }
            }
            TokenKind::Char => {
                let inner = token.lexeme.trim_matches('\'');
                let c = match inner {
                    "\\n" => '\n',
                    "\\t" => '\t',
                    "\\0" => '\0',
                    "\\\\" => '\\',
                    "\\'" => '\'',
                    _ => inner.chars().next().unwrap_or('\0'),
                };
                Ok(Value::Int(c as i64))
            }
            TokenKind::Identifier => match token.lexeme.as_str() {
                "true" => Ok(Value::Int(1)),
                "false" => Ok(Value::Int(0)),
                name => match self.unknown {
                    Some(value) => Ok(value),
                    None => Err(self.error(&format!("`{name}` is not a constant"))),
                },
            },
            _ => {
                let msg = format!("unexpected `{}` in constant expression", token.lexeme);
                Err(self.error(&msg))
            }
        }
    }
}

fn evaluate_with(tokens: &[Token], unknown: Option<Value>) -> Result<Value> {
    let mut evaluator = Evaluator {
        tokens,
        current: 0,
        unknown,
    };
    if tokens.is_empty() {
        return Err(evaluator.error("empty constant expression"));
    }
    let value = evaluator.conditional()?;
    if let Some(token) = evaluator.peek() {
        let msg = format!("unexpected `{}` in constant expression", token.lexeme);
        return Err(evaluator.error(&msg));
    }
    Ok(value)
}

/// Evaluate a preprocessor condition.
///
/// Identifiers left after macro expansion evaluate to zero.
pub fn evaluate_condition(tokens: &[Token]) -> Result<bool> {
    Ok(evaluate_with(tokens, Some(Value::Int(0)))?.is_true())
}

/// Evaluate an expression that must be a compile-time constant.
pub fn evaluate_constant(tokens: &[Token]) -> Result<Value> {
    evaluate_with(tokens, None)
}
