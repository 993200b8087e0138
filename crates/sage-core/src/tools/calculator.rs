//! `calculate` tool: a numeric expression evaluator over
//! `{+,-,*,/,^,%, parens, sin, cos, tan, sqrt, log, literal}` (spec.md §4.2).
//!
//! Refuses expressions that mention a financial-calculation keyword,
//! returning guidance toward the specialised tool instead of a (likely
//! wrong) generic numeric answer.

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use super::{ToolContext, ToolDescriptor};

#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("mismatched parentheses")]
    MismatchedParens,
    #[error("division by zero")]
    DivisionByZero,
    #[error("trailing input: '{0}'")]
    TrailingInput(String),
}

/// Recursive-descent evaluator: `expr := term (('+'|'-') term)*`,
/// `term := power (('*'|'/'|'%') power)*`, `power := unary ('^' power)?`
/// (right-associative), `unary := ('-' unary) | atom`,
/// `atom := number | func '(' expr ')' | '(' expr ')'`.
struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse_expr(&mut self) -> Result<f64, EvalError> {
        let mut value = self.parse_term()?;
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.parse_term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.parse_power()?;
        loop {
            self.skip_whitespace();
            match self.chars.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.parse_power()?;
                }
                Some('/') => {
                    self.chars.next();
                    let rhs = self.parse_power()?;
                    if rhs == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    value /= rhs;
                }
                Some('%') => {
                    self.chars.next();
                    let rhs = self.parse_power()?;
                    if rhs == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    value %= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_power(&mut self) -> Result<f64, EvalError> {
        let base = self.parse_unary()?;
        self.skip_whitespace();
        if matches!(self.chars.peek(), Some('^')) {
            self.chars.next();
            let exponent = self.parse_power()?; // right-associative
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<f64, EvalError> {
        self.skip_whitespace();
        if matches!(self.chars.peek(), Some('-')) {
            self.chars.next();
            Ok(-self.parse_unary()?)
        } else if matches!(self.chars.peek(), Some('+')) {
            self.chars.next();
            self.parse_unary()
        } else {
            self.parse_atom()
        }
    }

    fn parse_atom(&mut self) -> Result<f64, EvalError> {
        self.skip_whitespace();
        match self.chars.peek() {
            Some('(') => {
                self.chars.next();
                let value = self.parse_expr()?;
                self.skip_whitespace();
                if self.chars.next() != Some(')') {
                    return Err(EvalError::MismatchedParens);
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || *c == '.' => self.parse_number(),
            Some(c) if c.is_alphabetic() => self.parse_function(),
            Some(&c) => Err(EvalError::UnexpectedChar(c)),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn parse_number(&mut self) -> Result<f64, EvalError> {
        let mut buf = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            buf.push(self.chars.next().unwrap());
        }
        buf.parse::<f64>()
            .map_err(|_| EvalError::UnexpectedChar(buf.chars().next().unwrap_or('?')))
    }

    fn parse_function(&mut self) -> Result<f64, EvalError> {
        let mut name = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_alphabetic()) {
            name.push(self.chars.next().unwrap());
        }
        self.skip_whitespace();
        if self.chars.next() != Some('(') {
            return Err(EvalError::UnknownFunction(name));
        }
        let arg = self.parse_expr()?;
        self.skip_whitespace();
        if self.chars.next() != Some(')') {
            return Err(EvalError::MismatchedParens);
        }

        match name.as_str() {
            "sin" => Ok(arg.sin()),
            "cos" => Ok(arg.cos()),
            "tan" => Ok(arg.tan()),
            "sqrt" => Ok(arg.sqrt()),
            "log" => Ok(arg.ln()),
            other => Err(EvalError::UnknownFunction(other.to_string())),
        }
    }
}

pub fn evaluate(expr: &str) -> Result<f64, EvalError> {
    let mut parser = Parser::new(expr);
    let value = parser.parse_expr()?;
    parser.skip_whitespace();
    if let Some(rest) = parser.chars.clone().next() {
        return Err(EvalError::TrailingInput(rest.to_string()));
    }
    Ok(value)
}

/// Format a result the way a calculator would: integral values print
/// without a trailing `.0`.
fn format_result(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let rounded = (value * 1e10).round() / 1e10;
        format!("{rounded}")
    }
}

pub struct CalculateTool {
    financial_keywords: Vec<String>,
}

impl CalculateTool {
    pub fn new(financial_keywords: Vec<String>) -> Self {
        Self { financial_keywords }
    }

    fn financial_keyword_hit(&self, expr: &str) -> Option<&str> {
        self.financial_keywords
            .iter()
            .find(|kw| expr.contains(kw.as_str()))
            .map(|s| s.as_str())
    }
}

#[async_trait]
impl ToolDescriptor for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluate a numeric expression: +, -, *, /, ^, %, parentheses, and sin/cos/tan/sqrt/log. \
         Refuses financial-calculation phrasing in favour of the specialised finance tools."
    }

    fn parameter_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"expr": {"type": "string", "description": "Arithmetic expression to evaluate"}},
            "required": ["expr"]
        })
    }

    async fn invoke(&self, args: serde_json::Value, _ctx: &ToolContext) -> anyhow::Result<String> {
        let expr = args
            .get("expr")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("'expr' argument required"))?;

        if let Some(keyword) = self.financial_keyword_hit(expr) {
            return Ok(format!(
                "This looks like a financial calculation (matched keyword '{keyword}'). \
                 Use calculateAmortization, calculateIRR, calculateBondPrice, \
                 calculateBondDuration, or calculateOptionPrice instead of the generic \
                 calculator for accurate results."
            ));
        }

        let value = evaluate(expr).map_err(|e| anyhow::anyhow!("could not evaluate '{expr}': {e}"))?;
        Ok(format_result(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_simple_arithmetic() {
        assert_eq!(evaluate("1+1").unwrap(), 2.0);
        assert_eq!(evaluate("2*3+4").unwrap(), 10.0);
        assert_eq!(evaluate("2*(3+4)").unwrap(), 14.0);
        assert_eq!(evaluate("2^3^2").unwrap(), 512.0); // right-assoc: 2^(3^2)
    }

    #[test]
    fn evaluates_functions() {
        assert!((evaluate("sqrt(16)").unwrap() - 4.0).abs() < 1e-9);
        assert!((evaluate("sin(0)").unwrap()).abs() < 1e-9);
    }

    #[test]
    fn rejects_division_by_zero() {
        assert_eq!(evaluate("1/0").unwrap_err(), EvalError::DivisionByZero);
    }

    #[test]
    fn rejects_mismatched_parens() {
        assert!(evaluate("(1+2").is_err());
    }

    #[test]
    fn format_result_drops_trailing_zero_for_integers() {
        assert_eq!(format_result(2.0), "2");
        assert_eq!(format_result(1.5), "1.5");
    }

    #[tokio::test]
    async fn calculate_one_plus_one_is_two() {
        let tool = CalculateTool::new(vec!["本金".to_string()]);
        let ctx = crate::tools::tests_support::dummy_context();
        let result = tool
            .invoke(json!({"expr": "1+1"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result, "2");
    }

    #[tokio::test]
    async fn calculate_refuses_financial_phrasing() {
        let tool = CalculateTool::new(vec![
            "本金".to_string(),
            "利率".to_string(),
            "摊销".to_string(),
        ]);
        let ctx = crate::tools::tests_support::dummy_context();
        let result = tool
            .invoke(json!({"expr": "本金100000元 利率3% 30年"}), &ctx)
            .await
            .unwrap();
        assert!(result.contains("calculateAmortization"));
    }
}
