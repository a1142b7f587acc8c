//! Sandboxed expression engine for attribute-based policy conditions
//!
//! A deliberately small language: boolean/arithmetic expressions over
//! `$scope.path` variables, with no loops, no user-defined functions, and
//! no assignment, so policy evaluation always terminates and stays
//! auditable. Dangerous identifiers are rejected at parse time (fail
//! closed), nesting depth and evaluation steps are both capped.
//!
//! # Example
//!
//! ```
//! use strata_authz::expr::{evaluate, ExprContext, FunctionRegistry, Value};
//!
//! let ctx = ExprContext::new().with_scope(
//!     "user",
//!     Value::Map([("clearance".to_string(), Value::Int(3))].into()),
//! );
//! let functions = FunctionRegistry::with_builtins();
//!
//! let result = evaluate("$user.clearance >= 2", &ctx, &functions).unwrap();
//! assert_eq!(result, Value::Bool(true));
//! ```

pub mod ast;
pub mod context;
pub mod error;
pub mod eval;
pub mod parser;
pub mod token;
pub mod value;

pub use context::ExprContext;
pub use error::{ExprError, ExprResult};
pub use eval::{FunctionRegistry, NativeFn, MAX_EVAL_STEPS};
pub use parser::{parse, FORBIDDEN_NAMES, MAX_DEPTH};
pub use token::MAX_STRING_LENGTH;
pub use value::Value;

/// Parse and evaluate an expression in one call
pub fn evaluate(
    source: &str,
    ctx: &ExprContext,
    functions: &FunctionRegistry,
) -> ExprResult<Value> {
    let expr = parser::parse(source)?;
    eval::eval(&expr, ctx, functions)
}

/// Syntax-check an expression without evaluating it
///
/// Intended for policy-authoring time: a non-empty result means the policy
/// must not be activated. Also flags calls to functions absent from the
/// registry, since those would fail on every evaluation.
pub fn validate(source: &str, functions: &FunctionRegistry) -> Vec<ExprError> {
    let expr = match parser::parse(source) {
        Ok(expr) => expr,
        Err(err) => return vec![err],
    };

    let mut errors = Vec::new();
    expr.walk_calls(&mut |name, _args| {
        if !functions.contains(name) {
            errors.push(ExprError::UnknownFunction(name.to_string()));
        }
    });
    errors
}

/// Substitute `${expr}` placeholders in a template
///
/// Each placeholder is evaluated against the context; null renders as the
/// empty string. Text outside placeholders is copied verbatim.
pub fn interpolate(
    template: &str,
    ctx: &ExprContext,
    functions: &FunctionRegistry,
) -> ExprResult<String> {
    let chars: Vec<char> = template.chars().collect();
    let mut output = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            let start = i + 2;
            let end = find_placeholder_end(&chars, start)
                .ok_or(ExprError::UnterminatedString { pos: i })?;
            let source: String = chars[start..end].iter().collect();
            let value = evaluate(&source, ctx, functions)?;
            output.push_str(&value.coerce_to_string());
            i = end + 1;
        } else {
            output.push(chars[i]);
            i += 1;
        }
    }

    Ok(output)
}

/// Find the `}` closing a placeholder, skipping braces inside string
/// literals within the embedded expression.
fn find_placeholder_end(chars: &[char], start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    let mut i = start;
    while i < chars.len() {
        let ch = chars[i];
        match quote {
            Some(q) => {
                if ch == '\\' {
                    i += 1;
                } else if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => quote = Some(ch),
                '}' => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}
