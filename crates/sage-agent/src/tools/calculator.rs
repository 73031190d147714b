//! Calculator tool.
//!
//! Input is sanitized against a character allowlist and then evaluated by a
//! small recursive-descent parser. Only `abs`, `round`, `min`, and `max`
//! exist as functions; there is no other namespace to escape into.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::Result;
use crate::tool::{Tool, ToolInvocation};

/// Calculator tool for arithmetic expressions.
#[derive(Debug, Default, Clone)]
pub struct CalculatorTool;

impl CalculatorTool {
    /// Create a calculator tool.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Performs mathematical calculations. Supports basic arithmetic (+, -, *, /), \
         exponents (**), and common math functions (abs, round, min, max). \
         Use this whenever you need to compute numerical values."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Mathematical expression to evaluate (e.g., '2 + 2', '10 ** 2', 'round(3.14159, 2)')"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolInvocation> {
        let Some(expression) = args.get("expression").and_then(|v| v.as_str()) else {
            return Ok(ToolInvocation::fail(
                self.name(),
                args,
                "Missing 'expression' parameter",
            ));
        };
        let expression = expression.trim().to_string();

        if !is_safe_expression(&expression) {
            return Ok(ToolInvocation::fail(
                self.name(),
                args,
                "Expression contains invalid characters. Only numbers and basic operators allowed.",
            ));
        }

        match evaluate(&expression) {
            Ok(value) => Ok(ToolInvocation::ok_with_metadata(
                self.name(),
                args,
                format_number(value),
                json!({"expression": expression}),
            )),
            Err(message) => Ok(ToolInvocation::fail(self.name(), args, message)),
        }
    }
}

/// Allowlist check: digits, operators, parens, commas, spaces, and the four
/// permitted function names.
fn is_safe_expression(expression: &str) -> bool {
    let stripped = expression
        .replace("abs", "")
        .replace("round", "")
        .replace("min", "")
        .replace("max", "");
    stripped
        .chars()
        .all(|c| c.is_ascii_digit() || "+-*/(). ,".contains(c))
}

/// Render a result the way a calculator would: integers without a decimal
/// point, everything else as-is.
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 9e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expression Evaluator
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::Power);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token::Slash);
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
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| "Invalid mathematical expression".to_string())?;
                tokens.push(Token::Number(number));
            }
            'a'..='z' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_lowercase() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err("Invalid mathematical expression".to_string()),
        }
    }

    Ok(tokens)
}

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

    fn expect(&mut self, token: Token) -> std::result::Result<(), String> {
        if self.next().as_ref() == Some(&token) {
            Ok(())
        } else {
            Err("Invalid mathematical expression".to_string())
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.next();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.next();
                    value *= self.factor()?;
                }
                Some(Token::Slash) => {
                    self.next();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err("Cannot divide by zero".to_string());
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    // factor := unary ('**' factor)?   (right-associative)
    fn factor(&mut self) -> std::result::Result<f64, String> {
        let base = self.unary()?;
        if self.peek() == Some(&Token::Power) {
            self.next();
            let exponent = self.factor()?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    // unary := '-' unary | primary
    fn unary(&mut self) -> std::result::Result<f64, String> {
        if self.peek() == Some(&Token::Minus) {
            self.next();
            Ok(-self.unary()?)
        } else {
            self.primary()
        }
    }

    // primary := number | ident '(' expr (',' expr)* ')' | '(' expr ')'
    fn primary(&mut self) -> std::result::Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                self.expect(Token::LParen)?;
                let mut args = vec![self.expr()?];
                while self.peek() == Some(&Token::Comma) {
                    self.next();
                    args.push(self.expr()?);
                }
                self.expect(Token::RParen)?;
                apply_function(&name, &args)
            }
            _ => Err("Invalid mathematical expression".to_string()),
        }
    }
}

fn apply_function(name: &str, args: &[f64]) -> std::result::Result<f64, String> {
    match (name, args) {
        ("abs", [x]) => Ok(x.abs()),
        ("round", [x]) => Ok(x.round()),
        ("round", [x, digits]) => {
            let factor = 10f64.powi(*digits as i32);
            Ok((x * factor).round() / factor)
        }
        ("min", rest) if !rest.is_empty() => {
            Ok(rest.iter().cloned().fold(f64::INFINITY, f64::min))
        }
        ("max", rest) if !rest.is_empty() => {
            Ok(rest.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
        }
        _ => Err("Invalid mathematical expression".to_string()),
    }
}

/// Evaluate a sanitized arithmetic expression.
fn evaluate(expression: &str) -> std::result::Result<f64, String> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("Invalid mathematical expression".to_string());
    }
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("Invalid mathematical expression".to_string());
    }
    Ok(value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(expression: &str) -> ToolInvocation {
        CalculatorTool::new()
            .execute(json!({"expression": expression}))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_basic_arithmetic() {
        assert_eq!(run("2 + 2").await.text(), "4");
        assert_eq!(run("10 - 3 * 2").await.text(), "4");
        assert_eq!(run("(10 - 3) * 2").await.text(), "14");
        assert_eq!(run("7 / 2").await.text(), "3.5");
    }

    #[tokio::test]
    async fn test_exponents() {
        assert_eq!(run("10 ** 2").await.text(), "100");
        // Right-associative like Python's operator.
        assert_eq!(run("2 ** 3 ** 2").await.text(), "512");
    }

    #[tokio::test]
    async fn test_functions() {
        assert_eq!(run("abs(-5)").await.text(), "5");
        assert_eq!(run("round(3.14159, 2)").await.text(), "3.14");
        assert_eq!(run("round(2.7)").await.text(), "3");
        assert_eq!(run("min(3, 1, 2)").await.text(), "1");
        assert_eq!(run("max(3, 1, 2)").await.text(), "3");
    }

    #[tokio::test]
    async fn test_unary_minus() {
        assert_eq!(run("-4 + 10").await.text(), "6");
    }

    #[tokio::test]
    async fn test_division_by_zero() {
        let inv = run("1 / 0").await;
        assert!(!inv.success);
        assert_eq!(inv.error.as_deref(), Some("Cannot divide by zero"));
    }

    #[tokio::test]
    async fn test_invalid_characters_rejected() {
        let inv = run("__import__('os')").await;
        assert!(!inv.success);
        assert!(inv.error.as_deref().unwrap().contains("invalid characters"));

        let inv = run("2 + x").await;
        assert!(!inv.success);
    }

    #[tokio::test]
    async fn test_malformed_expression() {
        let inv = run("2 +").await;
        assert!(!inv.success);
        assert_eq!(inv.error.as_deref(), Some("Invalid mathematical expression"));

        let inv = run("(1 + 2").await;
        assert!(!inv.success);
    }

    #[tokio::test]
    async fn test_missing_expression_parameter() {
        let inv = CalculatorTool::new().execute(json!({})).await.unwrap();
        assert!(!inv.success);
    }

    #[tokio::test]
    async fn test_unknown_function_rejected() {
        // "minmax" passes the character allowlist but is not a function.
        let inv = run("minmax(1, 2)").await;
        assert!(!inv.success);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-0.25), "-0.25");
    }
}
