//! Rule language for principles.
//!
//! A principle's `logic` field is a JSON tree in the json-logic style: an
//! object with exactly one key is an operator application, an array is a
//! list of sub-rules, and every other value is a literal.  The tree is parsed
//! once into the closed [`Rule`] type and then evaluated against a JSON data
//! record.
//!
//! | operator | form | result |
//! |----------|------|--------|
//! | `if` | `[c1, t1, c2, t2, …, else?]` | branch of the first truthy condition |
//! | `==` `!=` | `[a, b]` | loose equality |
//! | `>` `>=` `<` `<=` | `[a, b]` | ordering over numbers or two strings |
//! | `!` | `[a]` or `a` | negated truthiness |
//! | `and` `or` | `[a, …]` | short-circuit, returns the deciding operand |
//! | `in` | `[needle, haystack]` | substring or array membership |
//! | `var` | `"a.b"` or `["a/b", default]` | path lookup in the data record |
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use verity_kernel::logic::{Rule, cost_of};
//!
//! let rule = Rule::parse(&json!({
//!     "if": [{"in": ["animal", {"var": "tags"}]}, "inf", 0]
//! }))
//! .unwrap();
//!
//! let harmful = rule.evaluate(&json!({"tags": ["dog", "animal"]})).unwrap();
//! assert_eq!(cost_of(&harmful).unwrap(), f64::INFINITY);
//!
//! let harmless = rule.evaluate(&json!({"tags": ["rock"]})).unwrap();
//! assert_eq!(cost_of(&harmless).unwrap(), 0.0);
//! ```

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

/// Deepest operator nesting accepted by [`Rule::parse`].
pub const MAX_DEPTH: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LogicError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("a rule object must hold exactly one operator, found {0} keys")]
    OperatorCount(usize),
    #[error("operator '{op}' expects {expected} argument(s), got {found}")]
    Arity {
        op: String,
        expected: &'static str,
        found: usize,
    },
    #[error("rule nesting exceeds the maximum depth")]
    TooDeep,
    #[error("'var' path must be a string or number, got {0}")]
    InvalidVarPath(String),
    #[error("cannot order {lhs} against {rhs} with '{op}'")]
    Incomparable {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("rule result {0} is not a cost")]
    NotACost(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Rule
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// A parsed rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Literal(Value),
    Array(Vec<Rule>),
    Var {
        path: String,
        default: Option<Box<Rule>>,
    },
    If(Vec<Rule>),
    Compare {
        op: CompareOp,
        lhs: Box<Rule>,
        rhs: Box<Rule>,
    },
    Not(Box<Rule>),
    Bool {
        op: BoolOp,
        operands: Vec<Rule>,
    },
    In {
        needle: Box<Rule>,
        haystack: Box<Rule>,
    },
}

impl Rule {
    /// Parse a JSON rule tree.
    pub fn parse(value: &Value) -> Result<Self, LogicError> {
        parse_at(value, 0)
    }

    /// Evaluate against `data`.  Pure: the same rule and data always give
    /// the same result.
    pub fn evaluate(&self, data: &Value) -> Result<Value, LogicError> {
        match self {
            Rule::Literal(v) => Ok(v.clone()),
            Rule::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|r| r.evaluate(data))
                    .collect::<Result<_, _>>()?,
            )),
            Rule::Var { path, default } => match lookup(data, path) {
                Some(v) => Ok(v.clone()),
                None => match default {
                    Some(d) => d.evaluate(data),
                    None => Ok(Value::Null),
                },
            },
            Rule::If(parts) => {
                let mut pairs = parts.chunks_exact(2);
                for pair in pairs.by_ref() {
                    if truthy(&pair[0].evaluate(data)?) {
                        return pair[1].evaluate(data);
                    }
                }
                match pairs.remainder() {
                    [otherwise] => otherwise.evaluate(data),
                    _ => Ok(Value::Null),
                }
            }
            Rule::Compare { op, lhs, rhs } => {
                let a = lhs.evaluate(data)?;
                let b = rhs.evaluate(data)?;
                let result = match op {
                    CompareOp::Eq => loose_eq(&a, &b),
                    CompareOp::Ne => !loose_eq(&a, &b),
                    CompareOp::Gt => order(*op, &a, &b)? == Ordering::Greater,
                    CompareOp::Ge => order(*op, &a, &b)? != Ordering::Less,
                    CompareOp::Lt => order(*op, &a, &b)? == Ordering::Less,
                    CompareOp::Le => order(*op, &a, &b)? != Ordering::Greater,
                };
                Ok(Value::Bool(result))
            }
            Rule::Not(inner) => Ok(Value::Bool(!truthy(&inner.evaluate(data)?))),
            Rule::Bool { op, operands } => {
                let mut last = Value::Null;
                for operand in operands {
                    last = operand.evaluate(data)?;
                    let decided = match op {
                        BoolOp::And => !truthy(&last),
                        BoolOp::Or => truthy(&last),
                    };
                    if decided {
                        break;
                    }
                }
                Ok(last)
            }
            Rule::In { needle, haystack } => {
                let needle = needle.evaluate(data)?;
                let found = match haystack.evaluate(data)? {
                    Value::String(h) => needle.as_str().is_some_and(|n| h.contains(n)),
                    Value::Array(items) => items.iter().any(|item| loose_eq(item, &needle)),
                    _ => false,
                };
                Ok(Value::Bool(found))
            }
        }
    }
}

fn parse_at(value: &Value, depth: usize) -> Result<Rule, LogicError> {
    if depth > MAX_DEPTH {
        return Err(LogicError::TooDeep);
    }
    match value {
        Value::Array(items) => Ok(Rule::Array(parse_all(items, depth)?)),
        Value::Object(map) => {
            if map.len() != 1 {
                return Err(LogicError::OperatorCount(map.len()));
            }
            let Some((op, arg)) = map.iter().next() else {
                return Err(LogicError::OperatorCount(0));
            };
            let args = match arg {
                Value::Array(items) => items.as_slice(),
                other => std::slice::from_ref(other),
            };
            parse_operator(op, args, depth)
        }
        literal => Ok(Rule::Literal(literal.clone())),
    }
}

fn parse_all(items: &[Value], depth: usize) -> Result<Vec<Rule>, LogicError> {
    items.iter().map(|v| parse_at(v, depth + 1)).collect()
}

fn arity(op: &str, args: &[Value], expected: usize, label: &'static str) -> Result<(), LogicError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(LogicError::Arity {
            op: op.to_string(),
            expected: label,
            found: args.len(),
        })
    }
}

fn parse_operator(op: &str, args: &[Value], depth: usize) -> Result<Rule, LogicError> {
    let compare = |cmp: CompareOp| -> Result<Rule, LogicError> {
        arity(op, args, 2, "2")?;
        Ok(Rule::Compare {
            op: cmp,
            lhs: Box::new(parse_at(&args[0], depth + 1)?),
            rhs: Box::new(parse_at(&args[1], depth + 1)?),
        })
    };
    let boolean = |bop: BoolOp| -> Result<Rule, LogicError> {
        if args.is_empty() {
            return Err(LogicError::Arity {
                op: op.to_string(),
                expected: "at least 1",
                found: 0,
            });
        }
        Ok(Rule::Bool {
            op: bop,
            operands: parse_all(args, depth)?,
        })
    };

    match op {
        "if" => Ok(Rule::If(parse_all(args, depth)?)),
        "==" => compare(CompareOp::Eq),
        "!=" => compare(CompareOp::Ne),
        ">" => compare(CompareOp::Gt),
        ">=" => compare(CompareOp::Ge),
        "<" => compare(CompareOp::Lt),
        "<=" => compare(CompareOp::Le),
        "!" => {
            arity(op, args, 1, "1")?;
            Ok(Rule::Not(Box::new(parse_at(&args[0], depth + 1)?)))
        }
        "and" => boolean(BoolOp::And),
        "or" => boolean(BoolOp::Or),
        "in" => {
            arity(op, args, 2, "2")?;
            Ok(Rule::In {
                needle: Box::new(parse_at(&args[0], depth + 1)?),
                haystack: Box::new(parse_at(&args[1], depth + 1)?),
            })
        }
        "var" => {
            if args.is_empty() || args.len() > 2 {
                return Err(LogicError::Arity {
                    op: op.to_string(),
                    expected: "1 or 2",
                    found: args.len(),
                });
            }
            let path = match &args[0] {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Null => String::new(),
                other => return Err(LogicError::InvalidVarPath(type_name(other).to_string())),
            };
            let default = match args.get(1) {
                Some(d) => Some(Box::new(parse_at(d, depth + 1)?)),
                None => None,
            };
            Ok(Rule::Var { path, default })
        }
        other => Err(LogicError::UnknownOperator(other.to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value semantics
// ─────────────────────────────────────────────────────────────────────────────

/// `false`, `null`, `0`, `""` and `[]` are falsy; everything else is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

/// Map a rule result onto a cost.
///
/// Booleans become `1.0`/`0.0`, `null` becomes `0.0`, numbers pass through
/// and numeric strings are parsed (`"inf"` is how JSON spells a veto).
/// NaN and every other shape are rejected.
pub fn cost_of(value: &Value) -> Result<f64, LogicError> {
    let cost = match value {
        Value::Bool(true) => 1.0,
        Value::Bool(false) | Value::Null => 0.0,
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| LogicError::NotACost(value.to_string()))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| LogicError::NotACost(value.to_string()))?,
        other => return Err(LogicError::NotACost(other.to_string())),
    };
    if cost.is_nan() {
        return Err(LogicError::NotACost(value.to_string()));
    }
    Ok(cost)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Path lookup; segments are separated by `.` or `/` and index into objects
/// or arrays.  The empty path is the whole record.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(data);
    }
    let mut current = data;
    for segment in path.split(['.', '/']) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
        _ => None,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            matches!((numeric(a), numeric(b)), (Some(x), Some(y)) if x == y)
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Bool(_), Value::Number(_)) | (Value::Number(_), Value::Bool(_)) => {
            numeric(a) == numeric(b)
        }
        _ => a == b,
    }
}

fn order(op: CompareOp, a: &Value, b: &Value) -> Result<Ordering, LogicError> {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    let incomparable = || LogicError::Incomparable {
        op: op.symbol(),
        lhs: type_name(a),
        rhs: type_name(b),
    };
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(incomparable),
        _ => Err(incomparable()),
    }
}
