//! Runtime values for the workflow dialect.
//!
//! Every value the interpreter manipulates is a [`TrackedValue`]: a raw
//! [`Value`] plus the set of call ids whose outputs contributed to it.
//! Containers hold carriers, so origins nest arbitrarily deep. An empty
//! origin set denotes a literal. Equality compares raw content only;
//! origins never affect identity.

use crate::types::CallId;
use serde_json::{Map, Number, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Response type token accepted by the `elicit` builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElicitKind {
    Int,
    Float,
    Str,
    Bool,
}

impl ElicitKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
        }
    }

    /// JSON schema for the requested primitive, used by elicitation
    /// transports that negotiate a response shape.
    #[must_use]
    pub fn schema(self) -> Json {
        let ty = match self {
            Self::Int => "integer",
            Self::Float => "number",
            Self::Str => "string",
            Self::Bool => "boolean",
        };
        serde_json::json!({ "type": ty })
    }
}

/// Raw value shape of the workflow dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<TrackedValue>),
    Map(BTreeMap<String, TrackedValue>),
    /// Type token for `elicit`; never serializable to a tool argument.
    Kind(ElicitKind),
}

impl Value {
    /// Converts plain JSON into a value tree with empty origins inside.
    #[must_use]
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Json::String(s) => Self::Str(s.clone()),
            Json::Array(items) => Self::List(
                items
                    .iter()
                    .map(|v| TrackedValue::literal(Self::from_json(v)))
                    .collect(),
            ),
            Json::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), TrackedValue::literal(Self::from_json(v))))
                    .collect(),
            ),
        }
    }

    /// Human-readable type name for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "None",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Kind(_) => "type",
        }
    }

    /// Truthiness following the dialect's conventions.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
            Self::Kind(_) => true,
        }
    }

    /// Renders the value the way the dialect's string interpolation does.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Null => "None".to_string(),
            Self::Bool(true) => "True".to_string(),
            Self::Bool(false) => "False".to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Self::Str(s) => s.clone(),
            Self::List(_) | Self::Map(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
            Self::Kind(kind) => format!("<type {}>", kind.name()),
        }
    }

    /// Strips nested carriers, yielding plain JSON.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::Number(Number::from(*i)),
            Self::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::Str(s) => Json::String(s.clone()),
            Self::List(items) => Json::Array(items.iter().map(|v| v.raw.to_json()).collect()),
            Self::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.raw.to_json()))
                    .collect::<Map<String, Json>>(),
            ),
            Self::Kind(kind) => Json::String(kind.name().to_string()),
        }
    }
}

/// Sorted origin set carried by every runtime value.
pub type OriginSet = BTreeSet<CallId>;

/// Value + origin set carrier.
///
/// Origins are monotone non-decreasing along any derivation chain:
/// composition may only add sources, never drop them.
#[derive(Debug, Clone)]
pub struct TrackedValue {
    pub raw: Value,
    pub origins: OriginSet,
}

impl TrackedValue {
    /// Wraps a literal: empty origin set.
    #[must_use]
    pub fn literal(raw: Value) -> Self {
        Self {
            raw,
            origins: OriginSet::new(),
        }
    }

    /// Wraps a fresh tool output with its single origin.
    #[must_use]
    pub fn from_tool(raw: Value, call_id: CallId) -> Self {
        let mut origins = OriginSet::new();
        origins.insert(call_id);
        Self { raw, origins }
    }

    #[must_use]
    pub fn with_origins(raw: Value, origins: OriginSet) -> Self {
        Self { raw, origins }
    }

    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.origins.is_empty()
    }
}

// Identity is the raw value alone; origins are metadata.
impl PartialEq for TrackedValue {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for TrackedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw.render())
    }
}

/// Binary arithmetic on raw values with the dialect's semantics.
///
/// Int/float coercion, `+` concatenation on strings and lists, floored
/// integer division, and divisor-signed modulo. Errors are plain
/// messages; the interpreter wraps them as workflow failures.
pub fn arith(op: ArithOp, lhs: &Value, rhs: &Value) -> Result<Value, String> {
    use ArithOp::*;
    use Value::*;

    match (op, lhs, rhs) {
        (Add, Str(a), Str(b)) => return Ok(Str(format!("{a}{b}"))),
        (Add, List(a), List(b)) => {
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            return Ok(List(items));
        }
        (Mul, Str(s), Int(n)) | (Mul, Int(n), Str(s)) => {
            let n = usize::try_from(*n).unwrap_or(0);
            return Ok(Str(s.repeat(n)));
        }
        _ => {}
    }

    match (lhs, rhs) {
        (Int(a), Int(b)) => int_arith(op, *a, *b),
        (Int(a), Float(b)) => float_arith(op, *a as f64, *b),
        (Float(a), Int(b)) => float_arith(op, *a, *b as f64),
        (Float(a), Float(b)) => float_arith(op, *a, *b),
        _ => Err(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        )),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl ArithOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
        }
    }
}

fn int_arith(op: ArithOp, a: i64, b: i64) -> Result<Value, String> {
    use ArithOp::*;
    match op {
        Add => Ok(Value::Int(a.wrapping_add(b))),
        Sub => Ok(Value::Int(a.wrapping_sub(b))),
        Mul => Ok(Value::Int(a.wrapping_mul(b))),
        Div => {
            if b == 0 {
                Err("division by zero".to_string())
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        FloorDiv => {
            if b == 0 {
                Err("integer division or modulo by zero".to_string())
            } else {
                // floored division: round toward negative infinity
                let q = a / b;
                let floored = if a % b != 0 && (a < 0) != (b < 0) {
                    q - 1
                } else {
                    q
                };
                Ok(Value::Int(floored))
            }
        }
        Mod => {
            if b == 0 {
                Err("integer division or modulo by zero".to_string())
            } else {
                // result takes the divisor's sign
                Ok(Value::Int(((a % b) + b) % b))
            }
        }
    }
}

fn float_arith(op: ArithOp, a: f64, b: f64) -> Result<Value, String> {
    use ArithOp::*;
    match op {
        Add => Ok(Value::Float(a + b)),
        Sub => Ok(Value::Float(a - b)),
        Mul => Ok(Value::Float(a * b)),
        Div => {
            if b == 0.0 {
                Err("float division by zero".to_string())
            } else {
                Ok(Value::Float(a / b))
            }
        }
        FloorDiv => {
            if b == 0.0 {
                Err("float floor division by zero".to_string())
            } else {
                Ok(Value::Float((a / b).floor()))
            }
        }
        Mod => {
            if b == 0.0 {
                Err("float modulo by zero".to_string())
            } else {
                Ok(Value::Float(a - b * (a / b).floor()))
            }
        }
    }
}

/// Equality across the numeric tower (`1 == 1.0` holds).
#[must_use]
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        _ => lhs == rhs,
    }
}

/// Ordering for `<`, `<=`, `>`, `>=`. Numbers compare across the tower,
/// strings lexicographically; anything else is a type error.
pub fn values_compare(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, String> {
    let ord = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64)
            .partial_cmp(b)
            .ok_or_else(|| "cannot compare with NaN".to_string())?,
        (Value::Float(a), Value::Int(b)) => a
            .partial_cmp(&(*b as f64))
            .ok_or_else(|| "cannot compare with NaN".to_string())?,
        (Value::Float(a), Value::Float(b)) => a
            .partial_cmp(b)
            .ok_or_else(|| "cannot compare with NaN".to_string())?,
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        _ => {
            return Err(format!(
                "'<' not supported between instances of '{}' and '{}'",
                lhs.type_name(),
                rhs.type_name()
            ))
        }
    };
    Ok(ord)
}

/// Membership test for the `in` operator.
pub fn value_contains(container: &Value, item: &Value) -> Result<bool, String> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_str())),
            other => Err(format!(
                "'in <str>' requires string as left operand, not {}",
                other.type_name()
            )),
        },
        Value::List(items) => Ok(items.iter().any(|v| values_equal(&v.raw, item))),
        Value::Map(map) => match item {
            Value::Str(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        other => Err(format!("argument of type '{}' is not iterable", other.type_name())),
    }
}

/// Subscript access: `base[key]` with Python-style negative list indices.
pub fn value_index(base: &Value, key: &Value) -> Result<TrackedValue, String> {
    match (base, key) {
        (Value::List(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let idx = if *i < 0 { i + len } else { *i };
            if idx < 0 || idx >= len {
                return Err(format!("list index out of range: {i}"));
            }
            Ok(items[idx as usize].clone())
        }
        (Value::Map(map), Value::Str(k)) => map
            .get(k)
            .cloned()
            .ok_or_else(|| format!("KeyError: '{k}'")),
        (Value::Str(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let idx = if *i < 0 { i + len } else { *i };
            if idx < 0 || idx >= len {
                return Err(format!("string index out of range: {i}"));
            }
            Ok(TrackedValue::literal(Value::Str(
                chars[idx as usize].to_string(),
            )))
        }
        _ => Err(format!(
            "'{}' indices must be valid for '{}'",
            key.type_name(),
            base.type_name()
        )),
    }
}

/// Attribute access. Maps fall back to key lookup so planner programs
/// may spell either `a["x"]` or `a.x`.
pub fn value_attr(base: &Value, name: &str) -> Result<TrackedValue, String> {
    match base {
        Value::Map(map) => map
            .get(name)
            .cloned()
            .ok_or_else(|| format!("'dict' object has no attribute '{name}'")),
        other => Err(format!(
            "'{}' object has no attribute '{name}'",
            other.type_name()
        )),
    }
}

/// Items yielded by `for` iteration and comprehension-style traversal.
/// Maps iterate over their keys.
pub fn value_iter(base: &Value) -> Result<Vec<TrackedValue>, String> {
    match base {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s
            .chars()
            .map(|c| TrackedValue::literal(Value::Str(c.to_string())))
            .collect()),
        Value::Map(map) => Ok(map
            .keys()
            .map(|k| TrackedValue::literal(Value::Str(k.clone())))
            .collect()),
        other => Err(format!("'{}' object is not iterable", other.type_name())),
    }
}

/// Bound-method dispatch for the small built-in method table.
///
/// Arguments arrive unwrapped (raw values); the caller merges origins
/// from the receiver and every carrier argument into the result.
pub fn call_method(recv: &Value, name: &str, args: &[Value]) -> Result<Value, String> {
    match (recv, name) {
        (Value::Str(s), "upper") => no_args(name, args).map(|()| Value::Str(s.to_uppercase())),
        (Value::Str(s), "lower") => no_args(name, args).map(|()| Value::Str(s.to_lowercase())),
        (Value::Str(s), "strip") => no_args(name, args).map(|()| Value::Str(s.trim().to_string())),
        (Value::Str(s), "startswith") => match args {
            [Value::Str(prefix)] => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
            _ => Err("startswith() expects one string argument".to_string()),
        },
        (Value::Str(s), "endswith") => match args {
            [Value::Str(suffix)] => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
            _ => Err("endswith() expects one string argument".to_string()),
        },
        (Value::Str(s), "split") => match args {
            [] => Ok(Value::List(
                s.split_whitespace()
                    .map(|p| TrackedValue::literal(Value::Str(p.to_string())))
                    .collect(),
            )),
            [Value::Str(sep)] => Ok(Value::List(
                s.split(sep.as_str())
                    .map(|p| TrackedValue::literal(Value::Str(p.to_string())))
                    .collect(),
            )),
            _ => Err("split() expects at most one string argument".to_string()),
        },
        (Value::Str(s), "replace") => match args {
            [Value::Str(from), Value::Str(to)] => {
                Ok(Value::Str(s.replace(from.as_str(), to.as_str())))
            }
            _ => Err("replace() expects two string arguments".to_string()),
        },
        (Value::Map(map), "get") => match args {
            [Value::Str(key)] => Ok(map.get(key).map_or(Value::Null, |v| v.raw.clone())),
            [Value::Str(key), default] => {
                Ok(map.get(key).map_or_else(|| default.clone(), |v| v.raw.clone()))
            }
            _ => Err("get() expects a string key and optional default".to_string()),
        },
        (Value::Map(map), "keys") => no_args(name, args).map(|()| {
            Value::List(
                map.keys()
                    .map(|k| TrackedValue::literal(Value::Str(k.clone())))
                    .collect(),
            )
        }),
        (Value::Map(map), "values") => {
            no_args(name, args).map(|()| Value::List(map.values().cloned().collect()))
        }
        (Value::Map(map), "items") => no_args(name, args).map(|()| {
            Value::List(
                map.iter()
                    .map(|(k, v)| {
                        TrackedValue::literal(Value::List(vec![
                            TrackedValue::literal(Value::Str(k.clone())),
                            v.clone(),
                        ]))
                    })
                    .collect(),
            )
        }),
        _ => Err(format!(
            "'{}' object has no method '{name}'",
            recv.type_name()
        )),
    }
}

fn no_args(name: &str, args: &[Value]) -> Result<(), String> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(format!("{name}() takes no arguments"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_division_rounds_down() {
        assert_eq!(
            arith(ArithOp::FloorDiv, &Value::Int(7), &Value::Int(2)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            arith(ArithOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(),
            Value::Int(-4)
        );
    }

    #[test]
    fn test_modulo_takes_divisor_sign() {
        assert_eq!(
            arith(ArithOp::Mod, &Value::Int(-7), &Value::Int(3)).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_true_division_yields_float() {
        assert_eq!(
            arith(ArithOp::Div, &Value::Int(5), &Value::Int(2)).unwrap(),
            Value::Float(2.5)
        );
    }

    #[test]
    fn test_string_concat_and_repeat() {
        assert_eq!(
            arith(ArithOp::Add, &Value::Str("ab".into()), &Value::Str("c".into())).unwrap(),
            Value::Str("abc".into())
        );
        assert_eq!(
            arith(ArithOp::Mul, &Value::Str("ab".into()), &Value::Int(2)).unwrap(),
            Value::Str("abab".into())
        );
    }

    #[test]
    fn test_division_by_zero_is_error() {
        assert!(arith(ArithOp::Div, &Value::Int(1), &Value::Int(0)).is_err());
        assert!(arith(ArithOp::FloorDiv, &Value::Int(1), &Value::Int(0)).is_err());
    }

    #[test]
    fn test_numeric_tower_equality() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(!values_equal(&Value::Int(1), &Value::Str("1".into())));
    }

    #[test]
    fn test_negative_list_index() {
        let list = Value::List(vec![
            TrackedValue::literal(Value::Int(1)),
            TrackedValue::literal(Value::Int(2)),
        ]);
        assert_eq!(
            value_index(&list, &Value::Int(-1)).unwrap().raw,
            Value::Int(2)
        );
        assert!(value_index(&list, &Value::Int(5)).is_err());
    }

    #[test]
    fn test_map_attr_fallback() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), TrackedValue::literal(Value::Int(10)));
        let value = Value::Map(map);
        assert_eq!(value_attr(&value, "x").unwrap().raw, Value::Int(10));
        assert!(value_attr(&value, "missing").is_err());
    }

    #[test]
    fn test_json_roundtrip_strips_origins() {
        let json = serde_json::json!({"a": [1, 2.5, "x"], "b": null});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_equality_ignores_origins() {
        let a = TrackedValue::literal(Value::Int(1));
        let b = TrackedValue::from_tool(Value::Int(1), CallId::new("t", 0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_method_table() {
        let s = Value::Str("Hello World".into());
        assert_eq!(
            call_method(&s, "lower", &[]).unwrap(),
            Value::Str("hello world".into())
        );
        assert_eq!(
            call_method(&s, "startswith", &[Value::Str("Hello".into())]).unwrap(),
            Value::Bool(true)
        );
        assert!(call_method(&s, "nope", &[]).is_err());
    }

    #[test]
    fn test_render_matches_dialect() {
        assert_eq!(Value::Bool(true).render(), "True");
        assert_eq!(Value::Null.render(), "None");
        assert_eq!(Value::Float(2.0).render(), "2.0");
    }
}
