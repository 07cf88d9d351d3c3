//! Declared parameter schemas and argument resolution.
//!
//! An operation declares its parameters as a list of [`Param`]s. Calls arrive as [`CallArgs`]
//! (positional values plus keyword values, typically decoded from JSON or replayed from a
//! persisted [`OperationRecord`]). [`resolve`] binds the two together: it coerces each value to
//! the declared type, fills defaults and collects one [`FieldError`] per bad parameter.
//!
//! Coercion is deliberately lenient in the same ways a JSON request validator is:
//!
//! | Declared | Accepted input                                            |
//! |----------|-----------------------------------------------------------|
//! | `Bool`   | booleans, `"true"/"false"/"yes"/"no"/"1"/"0"`, `0`/`1`    |
//! | `Int`    | integers, whole floats, numeric strings                   |
//! | `Float`  | numbers, numeric strings                                  |
//! | `Str`    | strings, numbers, booleans                                |
//!
//! `null` is never a value on its own: a parameter given as `null` counts as not provided.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use crate::error::{FieldError, ReconError, Result};
use crate::types::OperationRecord;

/// Declared type of a parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    Any,
    Bool,
    Int,
    Float,
    Str,
    List(Box<ParamType>),
    /// String-keyed mapping with values of the inner type.
    Map(Box<ParamType>),
    /// Inner type or `null`.
    Optional(Box<ParamType>),
    /// Structured object validated field by field.
    Record(Vec<Param>),
}

impl ParamType {
    pub fn list(inner: ParamType) -> Self {
        ParamType::List(Box::new(inner))
    }

    pub fn map(inner: ParamType) -> Self {
        ParamType::Map(Box::new(inner))
    }

    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    /// Short name used in error messages.
    pub fn describe(&self) -> String {
        match self {
            ParamType::Any => "any".to_string(),
            ParamType::Bool => "bool".to_string(),
            ParamType::Int => "int".to_string(),
            ParamType::Float => "float".to_string(),
            ParamType::Str => "str".to_string(),
            ParamType::List(inner) => format!("list[{}]", inner.describe()),
            ParamType::Map(inner) => format!("map[str, {}]", inner.describe()),
            ParamType::Optional(inner) => format!("optional[{}]", inner.describe()),
            ParamType::Record(_) => "record".to_string(),
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    /// `None` makes the parameter required.
    pub default: Option<Value>,
    /// Inclusive bounds for numeric values.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Param {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            min: None,
            max: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, default: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            default: Some(default.into()),
            min: None,
            max: None,
        }
    }

    /// Reject given numbers outside `min..=max`.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Reject given numbers below `min`.
    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    fn check_range(&self, root: &str, value: &Value) -> std::result::Result<(), FieldError> {
        let Some(n) = value.as_f64() else {
            return Ok(());
        };
        match (self.min, self.max) {
            (Some(min), _) if n < min => Err(FieldError::new(
                root,
                format!("ensure this value is greater than or equal to {min}"),
            )),
            (_, Some(max)) if n > max => Err(FieldError::new(
                root,
                format!("ensure this value is less than or equal to {max}"),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Raw call arguments, before resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: IndexMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Arguments of a recorded call, for replay.
    pub fn from_record(record: &OperationRecord) -> Self {
        Self {
            args: record.args.clone(),
            kwargs: record.kwargs.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Fully resolved keyword arguments, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedArgs(IndexMap<String, Value>);

impl ResolvedArgs {
    /// Deserialize an argument into a concrete type.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| ReconError::operation(format!("missing argument '{name}'")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ReconError::operation(format!("argument '{name}': {e}")))
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.0.get_mut(name)
    }

    pub fn as_map(&self) -> &IndexMap<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> IndexMap<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<IndexMap<String, Value>> for ResolvedArgs {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Bind `call` to `params` for the operation named `operation`.
///
/// Keyword values are taken first; positional values then fill the parameters that are still
/// unset, in declaration order. Keywords not in the schema are ignored. Defaults are cloned for
/// every call so a resolved value can be mutated freely.
pub fn resolve(operation: &str, params: &[Param], call: &CallArgs) -> Result<ResolvedArgs> {
    let mut errors = Vec::new();
    let mut positional = call.args.iter();
    let mut resolved = IndexMap::with_capacity(params.len());

    for param in params {
        let given = match call.kwargs.get(&param.name) {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => None,
        };
        let given = match given {
            Some(value) => Some(value),
            None if !call.kwargs.contains_key(&param.name) => {
                positional.next().filter(|v| !v.is_null()).cloned()
            }
            None => None,
        };

        match bind(&param.name, given, param) {
            Ok(value) => {
                resolved.insert(param.name.clone(), value);
            }
            Err(mut field_errors) => errors.append(&mut field_errors),
        }
    }

    let surplus = positional.count();
    if surplus > 0 {
        errors.push(FieldError::new(
            "args",
            format!(
                "{} takes {} arguments but {} positional were given",
                operation,
                params.len(),
                call.args.len()
            ),
        ));
    }

    if errors.is_empty() {
        Ok(ResolvedArgs(resolved))
    } else {
        Err(ReconError::ArgumentResolution {
            operation: operation.to_string(),
            errors,
        })
    }
}

type Coerced = std::result::Result<Value, Vec<FieldError>>;

fn bind(root: &str, given: Option<Value>, param: &Param) -> Coerced {
    match (given, &param.default) {
        (Some(value), _) => {
            let value = coerce(root, value, &param.ty)?;
            param.check_range(root, &value).map_err(|e| vec![e])?;
            Ok(value)
        }
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(vec![FieldError::new(root, "field required")]),
    }
}

fn coerce(root: &str, value: Value, ty: &ParamType) -> Coerced {
    let fail = |message: String| -> Coerced { Err(vec![FieldError::new(root, message)]) };

    match ty {
        ParamType::Any => Ok(value),
        ParamType::Optional(inner) => match value {
            Value::Null => Ok(Value::Null),
            other => coerce(root, other, inner),
        },
        ParamType::Bool => match coerce_bool(&value) {
            Some(b) => Ok(Value::Bool(b)),
            None => fail(format!("expected a boolean, got {}", kind(&value))),
        },
        ParamType::Int => match coerce_int(&value) {
            Some(n) => Ok(n),
            None => fail(format!("expected an integer, got {}", kind(&value))),
        },
        ParamType::Float => match coerce_float(&value) {
            Some(n) => Ok(n),
            None => fail(format!("expected a number, got {}", kind(&value))),
        },
        ParamType::Str => match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => fail(format!("expected a string, got {}", kind(&other))),
        },
        ParamType::List(inner) => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut errors = Vec::new();
                for (i, item) in items.into_iter().enumerate() {
                    match coerce(root, item, inner) {
                        Ok(v) => out.push(v),
                        Err(errs) => {
                            let segment = format!("[{i}]");
                            errors.extend(errs.into_iter().map(|e| e.at(&segment)));
                        }
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Array(out))
                } else {
                    Err(errors)
                }
            }
            other => fail(format!("expected a sequence, got {}", kind(&other))),
        },
        ParamType::Map(inner) => match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                let mut errors = Vec::new();
                for (key, item) in map {
                    match coerce(root, item, inner) {
                        Ok(v) => {
                            out.insert(key, v);
                        }
                        Err(errs) => {
                            let segment = format!(".{key}");
                            errors.extend(errs.into_iter().map(|e| e.at(&segment)));
                        }
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Object(out))
                } else {
                    Err(errors)
                }
            }
            other => fail(format!("expected a mapping, got {}", kind(&other))),
        },
        ParamType::Record(fields) => match value {
            Value::Object(mut map) => {
                let mut out = serde_json::Map::with_capacity(fields.len());
                let mut errors = Vec::new();
                for field in fields {
                    let given = map.remove(&field.name).filter(|v| !v.is_null());
                    match bind(root, given, field) {
                        Ok(v) => {
                            out.insert(field.name.clone(), v);
                        }
                        Err(errs) => {
                            let segment = format!(".{}", field.name);
                            errors.extend(errs.into_iter().map(|e| e.at(&segment)));
                        }
                    }
                }
                if errors.is_empty() {
                    Ok(Value::Object(out))
                } else {
                    Err(errors)
                }
            }
            other => fail(format!("expected an object, got {}", kind(&other))),
        },
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n.as_f64().and_then(whole_float),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(i) => Some(Value::from(i)),
                Err(_) => s.parse::<f64>().ok().and_then(whole_float),
            }
        }
        _ => None,
    }
}

fn whole_float(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn coerce_float(value: &Value) -> Option<Value> {
    let f = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    Number::from_f64(f).map(Value::Number)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
