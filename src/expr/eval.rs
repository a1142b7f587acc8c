//! Tree-walking evaluator for the sandboxed expression language
//!
//! Pure and side-effect free: the only inputs are the AST, the evaluation
//! context, and the injected function registry. The walk carries a step
//! budget so wide (not deep) expressions cannot consume unbounded work —
//! the parser's depth cap alone only bounds structural nesting.

use std::collections::HashMap;
use std::sync::Arc;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::context::ExprContext;
use super::error::{ExprError, ExprResult};
use super::value::Value;

/// Maximum AST nodes visited per evaluation
pub const MAX_EVAL_STEPS: usize = 10_000;

/// Signature of a native function callable from expressions
pub type NativeFn = Arc<dyn Fn(&[Value]) -> ExprResult<Value> + Send + Sync>;

/// Table of callables expressions may dispatch to
///
/// Only names present here are callable; anything else is an evaluation
/// error. The registry is injected per integration, never global.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, NativeFn>,
}

impl FunctionRegistry {
    /// An empty registry: no functions callable at all
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the builtin helpers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("has_role", |args| {
            let [user, role] = expect_args("has_role", args)?;
            let Value::Str(wanted) = role else {
                return Err(ExprError::TypeMismatch(
                    "has_role: role must be a string".to_string(),
                ));
            };
            let Value::Map(user) = user else {
                return Err(ExprError::TypeMismatch(
                    "has_role: user must be a map".to_string(),
                ));
            };
            let held = match user.get("roles") {
                Some(Value::List(items)) => items
                    .iter()
                    .any(|item| matches!(item, Value::Str(s) if s == wanted)),
                _ => false,
            };
            Ok(Value::Bool(held))
        });
        registry.register("in_list", |args| {
            let [needle, haystack] = expect_args("in_list", args)?;
            let Value::List(items) = haystack else {
                return Err(ExprError::TypeMismatch(
                    "in_list: second argument must be a list".to_string(),
                ));
            };
            Ok(Value::Bool(items.iter().any(|item| item.loose_eq(needle))))
        });
        registry.register("len", |args| {
            let [value] = expect_args("len", args)?;
            let len = match value {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                other => {
                    return Err(ExprError::TypeMismatch(format!(
                        "len: expected string, list, or map, got {}",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::Int(len as i64))
        });
        registry.register("lower", |args| {
            let [value] = expect_args("lower", args)?;
            string_arg("lower", value).map(|s| Value::Str(s.to_lowercase()))
        });
        registry.register("upper", |args| {
            let [value] = expect_args("upper", args)?;
            string_arg("upper", value).map(|s| Value::Str(s.to_uppercase()))
        });
        registry.register("starts_with", |args| {
            let [subject, prefix] = expect_args("starts_with", args)?;
            let subject = string_arg("starts_with", subject)?;
            let prefix = string_arg("starts_with", prefix)?;
            Ok(Value::Bool(subject.starts_with(prefix)))
        });
        registry.register("ends_with", |args| {
            let [subject, suffix] = expect_args("ends_with", args)?;
            let subject = string_arg("ends_with", subject)?;
            let suffix = string_arg("ends_with", suffix)?;
            Ok(Value::Bool(subject.ends_with(suffix)))
        });
        registry.register("contains", |args| {
            let [collection, item] = expect_args("contains", args)?;
            match collection {
                Value::Str(s) => {
                    let needle = string_arg("contains", item)?;
                    Ok(Value::Bool(s.contains(needle)))
                }
                Value::List(items) => Ok(Value::Bool(items.iter().any(|v| v.loose_eq(item)))),
                Value::Map(entries) => {
                    let key = string_arg("contains", item)?;
                    Ok(Value::Bool(entries.contains_key(key)))
                }
                other => Err(ExprError::TypeMismatch(format!(
                    "contains: expected string, list, or map, got {}",
                    other.type_name()
                ))),
            }
        });
        registry
    }

    /// Register a native function under a name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.into(), Arc::new(function));
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&NativeFn> {
        self.functions.get(name)
    }

    /// Whether a name is callable
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

fn expect_args<'a, const N: usize>(name: &str, args: &'a [Value]) -> ExprResult<&'a [Value; N]> {
    args.try_into().map_err(|_| ExprError::Arity {
        name: name.to_string(),
        expected: N,
        got: args.len(),
    })
}

fn string_arg<'a>(name: &str, value: &'a Value) -> ExprResult<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ExprError::TypeMismatch(format!(
            "{}: expected string, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Evaluate a parsed expression against a context and function table
pub fn eval(expr: &Expr, ctx: &ExprContext, functions: &FunctionRegistry) -> ExprResult<Value> {
    let mut evaluator = Evaluator {
        ctx,
        functions,
        steps: 0,
    };
    evaluator.eval(expr)
}

struct Evaluator<'a> {
    ctx: &'a ExprContext,
    functions: &'a FunctionRegistry,
    steps: usize,
}

impl Evaluator<'_> {
    fn eval(&mut self, expr: &Expr) -> ExprResult<Value> {
        self.steps += 1;
        if self.steps > MAX_EVAL_STEPS {
            return Err(ExprError::BudgetExceeded {
                max: MAX_EVAL_STEPS,
            });
        }

        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable { scope, path } => self.lookup(scope, path),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                self.apply_unary(*op, value)
            }
            Expr::Binary { op, left, right } => self.apply_binary(*op, left, right),
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.apply_index(target, index)
            }
            Expr::Call { name, args } => {
                let Some(function) = self.functions.get(name) else {
                    return Err(ExprError::UnknownFunction(name.clone()));
                };
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg)?);
                }
                function(&evaluated)
            }
        }
    }

    fn lookup(&self, scope: &str, path: &[String]) -> ExprResult<Value> {
        let mut current = self
            .ctx
            .scope(scope)
            .ok_or_else(|| ExprError::UnknownVariable(format!("${}", scope)))?;

        for (i, segment) in path.iter().enumerate() {
            let Value::Map(entries) = current else {
                return Err(ExprError::TypeMismatch(format!(
                    "${}.{} is {}, not a map",
                    scope,
                    path[..i].join("."),
                    current.type_name()
                )));
            };
            current = entries.get(segment).ok_or_else(|| {
                ExprError::UnknownVariable(format!("${}.{}", scope, path[..=i].join(".")))
            })?;
        }

        Ok(current.clone())
    }

    fn apply_unary(&self, op: UnaryOp, value: Value) -> ExprResult<Value> {
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => match value {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or(ExprError::Overflow("-")),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ExprError::TypeMismatch(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
        }
    }

    fn apply_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> ExprResult<Value> {
        // Logical operators short-circuit; everything else is strict.
        match op {
            BinaryOp::And => {
                let lhs = self.eval(left)?;
                if !lhs.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let rhs = self.eval(right)?;
                return Ok(Value::Bool(rhs.is_truthy()));
            }
            BinaryOp::Or => {
                let lhs = self.eval(left)?;
                if lhs.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let rhs = self.eval(right)?;
                return Ok(Value::Bool(rhs.is_truthy()));
            }
            _ => {}
        }

        let lhs = self.eval(left)?;
        let rhs = self.eval(right)?;

        match op {
            BinaryOp::Add => self.add(lhs, rhs),
            BinaryOp::Sub => self.arithmetic("-", lhs, rhs, i64::checked_sub, |a, b| a - b),
            BinaryOp::Mul => self.arithmetic("*", lhs, rhs, i64::checked_mul, |a, b| a * b),
            BinaryOp::Div => self.divide(lhs, rhs),
            BinaryOp::Mod => self.modulo(lhs, rhs),
            BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
            BinaryOp::Ne => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => self.ordering(op, lhs, rhs),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    /// `+` concatenates when either operand is a string, otherwise adds
    fn add(&self, lhs: Value, rhs: Value) -> ExprResult<Value> {
        if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
            return Ok(Value::Str(format!(
                "{}{}",
                lhs.coerce_to_string(),
                rhs.coerce_to_string()
            )));
        }
        self.arithmetic("+", lhs, rhs, i64::checked_add, |a, b| a + b)
    }

    fn arithmetic(
        &self,
        symbol: &'static str,
        lhs: Value,
        rhs: Value,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> ExprResult<Value> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                int_op(a, b).map(Value::Int).ok_or(ExprError::Overflow(symbol))
            }
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(a as f64, b))),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(a, b as f64))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(a, b))),
            (a, b) => Err(ExprError::TypeMismatch(format!(
                "'{}' needs numbers, got {} and {}",
                symbol,
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn divide(&self, lhs: Value, rhs: Value) -> ExprResult<Value> {
        match &rhs {
            Value::Int(0) => return Err(ExprError::DivisionByZero),
            Value::Float(f) if *f == 0.0 => return Err(ExprError::DivisionByZero),
            _ => {}
        }
        self.arithmetic("/", lhs, rhs, i64::checked_div, |a, b| a / b)
    }

    fn modulo(&self, lhs: Value, rhs: Value) -> ExprResult<Value> {
        match &rhs {
            Value::Int(0) => return Err(ExprError::DivisionByZero),
            Value::Float(f) if *f == 0.0 => return Err(ExprError::DivisionByZero),
            _ => {}
        }
        self.arithmetic("%", lhs, rhs, i64::checked_rem, |a, b| a % b)
    }

    /// Ordering comparisons: numbers against numbers, strings against strings
    fn ordering(&self, op: BinaryOp, lhs: Value, rhs: Value) -> ExprResult<Value> {
        let ordering = match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            _ => None,
        };
        let Some(ordering) = ordering else {
            return Err(ExprError::TypeMismatch(format!(
                "'{}' cannot compare {} and {}",
                op.symbol(),
                lhs.type_name(),
                rhs.type_name()
            )));
        };

        let result = match op {
            BinaryOp::Lt => ordering.is_lt(),
            BinaryOp::Le => ordering.is_le(),
            BinaryOp::Gt => ordering.is_gt(),
            BinaryOp::Ge => ordering.is_ge(),
            _ => unreachable!("ordering called with non-ordering op"),
        };
        Ok(Value::Bool(result))
    }

    /// Indexed access: map by string key, list by non-negative integer
    fn apply_index(&self, target: Value, index: Value) -> ExprResult<Value> {
        match (target, index) {
            (Value::Map(entries), Value::Str(key)) => entries
                .get(&key)
                .cloned()
                .ok_or(ExprError::MissingKey(key)),
            (Value::List(items), Value::Int(i)) => {
                // Negative indices are out of range, never wraparound
                if i < 0 || i as usize >= items.len() {
                    return Err(ExprError::IndexOutOfRange {
                        index: i,
                        len: items.len(),
                    });
                }
                Ok(items[i as usize].clone())
            }
            (target, index) => Err(ExprError::TypeMismatch(format!(
                "cannot index {} with {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }
}
