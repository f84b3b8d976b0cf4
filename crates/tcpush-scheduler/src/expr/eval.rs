//! Expression evaluation against an immutable environment.

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use tcpush_core::time::{format_timestamp, parse_duration};
use tcpush_core::{Error, Result, SlugCache};

use super::ast::{BinaryOp, Expr, UnaryOp};

/// Builtin functions, callable by name.
pub const BUILTINS: &[&str] = &[
    "as_slugid",
    "fromNow",
    "len",
    "lowercase",
    "str",
    "uppercase",
];

/// Immutable name bindings. `$let` produces a new environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Env {
    vars: Map<String, Value>,
}

impl Env {
    pub fn new(vars: Map<String, Value>) -> Self {
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// A child environment where `bindings` shadow existing names.
    pub fn extend(&self, bindings: Map<String, Value>) -> Self {
        let mut vars = self.vars.clone();
        vars.extend(bindings);
        Self { vars }
    }
}

/// Evaluation state shared by one scheduling pass: the label cache and the
/// instant time expressions are relative to.
pub struct Evaluator<'a> {
    slugs: &'a mut SlugCache,
    now: DateTime<Utc>,
}

impl<'a> Evaluator<'a> {
    pub fn new(slugs: &'a mut SlugCache, now: DateTime<Utc>) -> Self {
        Self { slugs, now }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => match env.get(name) {
                Some(value) => Ok(value.clone()),
                None if BUILTINS.contains(&name.as_str()) => Err(Error::Expression(format!(
                    "{} is a function and must be called",
                    name
                ))),
                None => Err(Error::Expression(format!("unknown context value {}", name))),
            },
            Expr::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<Result<_>>()?,
            )),
            Expr::Object(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval(value, env)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, env)?;
                unary(*op, value)
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                if !is_truthy(&self.eval(lhs, env)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(is_truthy(&self.eval(rhs, env)?)))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                if is_truthy(&self.eval(lhs, env)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(is_truthy(&self.eval(rhs, env)?)))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, env)?;
                let rhs = self.eval(rhs, env)?;
                binary(*op, lhs, rhs)
            }
            Expr::Member(target, name) => match self.eval(target, env)? {
                Value::Object(mut map) => map
                    .remove(name)
                    .ok_or_else(|| Error::Expression(format!("object has no property {}", name))),
                other => Err(Error::Expression(format!(
                    "cannot access property {} of {}",
                    name,
                    type_name(&other)
                ))),
            },
            Expr::Index(target, index) => {
                let target = self.eval(target, env)?;
                let index = self.eval(index, env)?;
                index_value(target, index)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, env))
                    .collect::<Result<Vec<_>>>()?;
                self.call(name, args)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        match (name, args.as_slice()) {
            ("as_slugid", [Value::String(label)]) => {
                Ok(Value::String(self.slugs.resolve(label).into_string()))
            }
            ("fromNow", [Value::String(text)]) => self.from_now(text, None),
            ("fromNow", [Value::String(text), Value::String(from)]) => {
                self.from_now(text, Some(from))
            }
            ("lowercase", [Value::String(s)]) => Ok(Value::String(s.to_lowercase())),
            ("uppercase", [Value::String(s)]) => Ok(Value::String(s.to_uppercase())),
            ("len", [Value::String(s)]) => Ok(Value::from(s.chars().count())),
            ("len", [Value::Array(items)]) => Ok(Value::from(items.len())),
            ("str", [value]) => Ok(Value::String(to_text(value)?)),
            _ if BUILTINS.contains(&name) => Err(Error::Expression(format!(
                "invalid arguments to builtin: {}({})",
                name,
                args.iter().map(type_name).collect::<Vec<_>>().join(", ")
            ))),
            _ => Err(Error::Expression(format!("unknown function {}", name))),
        }
    }

    /// Timestamp `text` after `from`, or after the evaluation start.
    pub fn from_now(&self, text: &str, from: Option<&str>) -> Result<Value> {
        let base = match from {
            Some(from) => from
                .parse::<DateTime<Utc>>()
                .map_err(|e| Error::Expression(format!("invalid timestamp '{}': {}", from, e)))?,
            None => self.now,
        };
        let at = base
            .checked_add_signed(parse_duration(text)?)
            .ok_or_else(|| Error::MalformedTimeExpression(text.to_string()))?;
        Ok(Value::String(format_timestamp(at)))
    }
}

/// Falsy values: null, false, 0, "", [] and {}.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text form used by interpolation and `str()`.
pub fn to_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(Error::Expression(format!(
            "cannot convert {} to a string",
            type_name(other)
        ))),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
        UnaryOp::Neg | UnaryOp::Pos => {
            let n = as_number(&value, if op == UnaryOp::Neg { "-" } else { "+" })?;
            Ok(number(if op == UnaryOp::Neg { -n } else { n }))
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&lhs, &rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(&lhs, &rhs))),
        BinaryOp::In => contains(&rhs, &lhs).map(Value::Bool),
        BinaryOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (a, b) => Ok(number(as_number(&a, "+")? + as_number(&b, "+")?)),
        },
        BinaryOp::Sub => Ok(number(as_number(&lhs, "-")? - as_number(&rhs, "-")?)),
        BinaryOp::Mul => Ok(number(as_number(&lhs, "*")? * as_number(&rhs, "*")?)),
        BinaryOp::Div | BinaryOp::Mod => {
            let a = as_number(&lhs, op.symbol())?;
            let b = as_number(&rhs, op.symbol())?;
            if b == 0.0 {
                return Err(Error::Expression("division by zero".to_string()));
            }
            Ok(number(if op == BinaryOp::Div { a / b } else { a % b }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&lhs, &rhs) {
                (Value::String(a), Value::String(b)) => a.cmp(b),
                (Value::Number(_), Value::Number(_)) => {
                    let (a, b) = (as_number(&lhs, op.symbol())?, as_number(&rhs, op.symbol())?);
                    a.partial_cmp(&b).ok_or_else(|| {
                        Error::Expression("numbers are not comparable".to_string())
                    })?
                }
                _ => {
                    return Err(Error::Expression(format!(
                        "cannot compare {} {} {}",
                        type_name(&lhs),
                        op.symbol(),
                        type_name(&rhs)
                    )));
                }
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => Ok(Value::Bool(match op {
            BinaryOp::And => is_truthy(&lhs) && is_truthy(&rhs),
            _ => is_truthy(&lhs) || is_truthy(&rhs),
        })),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool> {
    match (haystack, needle) {
        (Value::String(s), Value::String(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Array(items), _) => Ok(items.iter().any(|item| loose_eq(item, needle))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(Error::Expression(format!(
            "cannot test {} in {}",
            type_name(needle),
            type_name(haystack)
        ))),
    }
}

/// Structural equality where numbers compare by value (`1 == 1.0`).
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| loose_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| loose_eq(x, y)))
        }
        _ => a == b,
    }
}

fn index_value(target: Value, index: Value) -> Result<Value> {
    match (target, index) {
        (Value::Array(mut items), Value::Number(n)) => {
            let i = resolve_index(&n, items.len())?;
            Ok(items.swap_remove(i))
        }
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = resolve_index(&n, chars.len())?;
            Ok(Value::String(chars[i].to_string()))
        }
        (Value::Object(mut map), Value::String(key)) => map
            .remove(&key)
            .ok_or_else(|| Error::Expression(format!("object has no property {}", key))),
        (target, index) => Err(Error::Expression(format!(
            "cannot index {} with {}",
            type_name(&target),
            type_name(&index)
        ))),
    }
}

/// Array position for `n`; negative values count from the end.
fn resolve_index(n: &Number, len: usize) -> Result<usize> {
    let i = n
        .as_i64()
        .ok_or_else(|| Error::Expression(format!("index {} is not an integer", n)))?;
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Error::Expression(format!("index {} out of bounds", i)));
    }
    Ok(resolved as usize)
}

fn as_number(value: &Value, op: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        Error::Expression(format!(
            "operator {} expects numbers, got {}",
            op,
            type_name(value)
        ))
    })
}

/// Integral results stay integers so they interpolate without a fraction.
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
