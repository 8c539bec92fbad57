//! Arithmetic for the `calculate_expression` tool.
//!
//! Expressions are evaluated by `meval` against an allow-list of functions and constants,
//! so nothing is ever handed to an interpreter. Python spellings (`**`, `math.sqrt`) are
//! translated first, and results print the way Python prints them since the model reasons
//! about them as Python values: integral results of integer arithmetic stay integers, `/`
//! always yields a float, and floats use the shortest round-trip form.

use async_trait::async_trait;
use meval::{Context, Expr, FuncEvalError};
use regex::Regex;
use serde_json::json;
use std::cell::Cell;
use std::f64::consts::{E, PI, TAU};
use std::sync::OnceLock;
use thiserror::Error;

use super::{display_arg, ToolHandler};
use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};

pub const TOOL_NAME: &str = "calculate_expression";

pub const MAX_EXPRESSION_LEN: usize = 1000;
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("invalid syntax")]
    Syntax,

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error")]
    Domain,

    #[error("math range error")]
    Range,

    #[error("numerical result out of range")]
    OutOfRange,

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("{0}() was given the wrong number of arguments")]
    Arity(String),

    #[error("{0}")]
    Type(String),

    #[error("expression is longer than 1000 characters")]
    TooLong,

    #[error("expression is nested too deeply")]
    TooDeep,
}

impl From<meval::Error> for EvalError {
    fn from(error: meval::Error) -> Self {
        match error {
            meval::Error::UnknownVariable(name) => EvalError::UnknownName(name),
            meval::Error::Function(name, FuncEvalError::UnknownFunction) => {
                EvalError::UnknownName(name)
            }
            meval::Error::Function(name, _) => EvalError::Arity(name),
            _ => EvalError::Syntax,
        }
    }
}

type EvalResult<T> = Result<T, EvalError>;

fn math_prefix() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(r"\bmath\.").expect("math prefix pattern is valid"))
}

/// Anything that makes Python produce a float: true division, a float literal, or a
/// float-valued function or constant
fn float_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(
            r"/|\d\.|\.\d|\d[eE][+-]?\d|\b(?:sqrt|sin|cos|tan|asin|acos|atan|exp|log|log10|log2|pow|pi|e|tau)\b",
        )
        .expect("float marker pattern is valid")
    })
}

/// Rewrite Python arithmetic into meval's dialect
fn to_meval_syntax(expression: &str) -> String {
    math_prefix()
        .replace_all(expression, "")
        .replace("**", "^")
}

fn nesting_depth(expression: &str) -> usize {
    expression
        .chars()
        .scan(0usize, |depth, c| {
            match c {
                '(' => *depth += 1,
                ')' => *depth = depth.saturating_sub(1),
                _ => {}
            }
            Some(*depth)
        })
        .max()
        .unwrap_or(0)
}

/// Keep the first fault raised while evaluating and poison the result
fn fail(fault: &Cell<Option<EvalError>>, error: EvalError) -> f64 {
    let first = fault.take();
    fault.set(first.or(Some(error)));
    f64::NAN
}

fn round_to(x: f64, ndigits: f64) -> f64 {
    let factor = 10f64.powi(ndigits as i32);
    let rounded = (x * factor).round_ties_even() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        x
    }
}

/// The functions and constants an expression may use
fn context(fault: &Cell<Option<EvalError>>) -> Context<'_> {
    let mut ctx = Context::empty();
    ctx.var("pi", PI)
        .var("e", E)
        .var("tau", TAU)
        .func("sqrt", move |x| {
            if x < 0.0 {
                fail(fault, EvalError::Domain)
            } else {
                x.sqrt()
            }
        })
        .func("sin", f64::sin)
        .func("cos", f64::cos)
        .func("tan", f64::tan)
        .func("asin", move |x| {
            if (-1.0..=1.0).contains(&x) {
                x.asin()
            } else {
                fail(fault, EvalError::Domain)
            }
        })
        .func("acos", move |x| {
            if (-1.0..=1.0).contains(&x) {
                x.acos()
            } else {
                fail(fault, EvalError::Domain)
            }
        })
        .func("atan", f64::atan)
        .func("exp", move |x| {
            let result = x.exp();
            if result.is_infinite() && x.is_finite() {
                fail(fault, EvalError::Range)
            } else {
                result
            }
        })
        .funcn(
            "log",
            move |args: &[f64]| match args {
                [x] if *x > 0.0 => x.ln(),
                [x, base] if *x > 0.0 && *base > 0.0 && *base != 1.0 => x.ln() / base.ln(),
                [x, base] if *x > 0.0 && *base == 1.0 => fail(fault, EvalError::DivisionByZero),
                [_] | [_, _] => fail(fault, EvalError::Domain),
                _ => fail(fault, EvalError::Arity("log".to_string())),
            },
            1usize..,
        )
        .func("log10", move |x| {
            if x > 0.0 {
                x.log10()
            } else {
                fail(fault, EvalError::Domain)
            }
        })
        .func("log2", move |x| {
            if x > 0.0 {
                x.log2()
            } else {
                fail(fault, EvalError::Domain)
            }
        })
        .func("abs", f64::abs)
        .func("floor", f64::floor)
        .func("ceil", f64::ceil)
        .funcn(
            "round",
            move |args: &[f64]| match args {
                [x] => x.round_ties_even(),
                [x, ndigits] if ndigits.fract() == 0.0 => round_to(*x, *ndigits),
                [_, _] => fail(
                    fault,
                    EvalError::Type(
                        "'float' object cannot be interpreted as an integer".to_string(),
                    ),
                ),
                _ => fail(fault, EvalError::Arity("round".to_string())),
            },
            1usize..,
        )
        .funcn(
            "min",
            |args: &[f64]| args.iter().copied().fold(f64::INFINITY, f64::min),
            1usize..,
        )
        .funcn(
            "max",
            |args: &[f64]| args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            1usize..,
        )
        .func2("pow", move |base, exponent| {
            if base == 0.0 && exponent < 0.0 {
                return fail(fault, EvalError::Domain);
            }
            if base < 0.0 && exponent.is_finite() && exponent.fract() != 0.0 {
                return fail(fault, EvalError::Domain);
            }
            let result = base.powf(exponent);
            if result.is_infinite() && base.is_finite() && exponent.is_finite() {
                fail(fault, EvalError::Range)
            } else {
                result
            }
        });
    ctx
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> EvalResult<f64> {
    if expression.chars().count() > MAX_EXPRESSION_LEN {
        return Err(EvalError::TooLong);
    }
    if expression.trim().is_empty() {
        return Err(EvalError::Syntax);
    }
    if nesting_depth(expression) > MAX_DEPTH {
        return Err(EvalError::TooDeep);
    }

    let expr: Expr = to_meval_syntax(expression).parse()?;
    let fault = Cell::new(None);
    let value = expr.eval_with_context(&context(&fault))?;
    if let Some(error) = fault.take() {
        return Err(error);
    }

    if value.is_finite() {
        Ok(value)
    } else if expression.contains(|c| c == '/' || c == '%') {
        Err(EvalError::DivisionByZero)
    } else if value.is_nan() {
        Err(EvalError::Domain)
    } else {
        Err(EvalError::OutOfRange)
    }
}

/// Print a result the way Python would for this expression
pub fn format_result(expression: &str, value: f64) -> String {
    if value.fract() == 0.0 && !float_marker().is_match(expression) {
        if value == 0.0 {
            "0".to_string()
        } else {
            format!("{:.0}", value)
        }
    } else {
        format_float(value)
    }
}

/// Format a float the way Python's `repr` does
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let scientific = format!("{:e}", x);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..16).contains(&exponent) {
        let plain = x.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{}.0", plain)
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    }
}

/// The `calculate_expression` tool
pub struct CalculateExpression {
    tool: Tool,
}

impl CalculateExpression {
    pub fn new() -> Self {
        let tool = Tool::new(
            TOOL_NAME,
            "Calculates the result of a mathematical expression. Use this tool when you need to perform arithmetic operations or evaluate mathematical formulas.",
            json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "The mathematical expression to evaluate (e.g., '2 + 2', '15 * 3 / 2', 'math.sqrt(9)')."
                    }
                },
                "required": ["expression"]
            }),
        );
        Self { tool }
    }

    /// The text handed back to the model for an expression
    pub fn calculate(expression: &str) -> String {
        match evaluate(expression) {
            Ok(value) => format!("Calculation Result: {}", format_result(expression, value)),
            Err(e) => format!("Error evaluating expression '{}': {}", expression, e),
        }
    }
}

impl Default for CalculateExpression {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for CalculateExpression {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    fn summary(&self, tool_call: &ToolCall) -> String {
        format!("Calculating: {}", display_arg(tool_call, "expression"))
    }

    async fn call(&self, tool_call: &ToolCall) -> AgentResult<String> {
        let expression = tool_call.string_arg("expression");
        tracing::debug!(expression, "evaluating expression");
        Ok(Self::calculate(expression))
    }
}
