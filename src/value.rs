use std::{
    collections::{BTreeMap, HashMap},
    fmt::Display,
    hash::BuildHasher,
};

/// A scalar produced by evaluation or bound to a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Runtime category of a value. `Null` means "not evaluated yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFlag {
    Null,
    Bool,
    Integer,
    Float,
    String,
}

impl TypeFlag {
    pub fn is_number(self) -> bool {
        matches!(self, TypeFlag::Integer | TypeFlag::Float)
    }

    pub fn is_string(self) -> bool {
        self == TypeFlag::String
    }

    pub fn is_bool(self) -> bool {
        self == TypeFlag::Bool
    }

    pub fn is_null(self) -> bool {
        self == TypeFlag::Null
    }
}

impl Display for TypeFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeFlag::Null => "Null",
            TypeFlag::Bool => "boolean",
            TypeFlag::Integer => "int",
            TypeFlag::Float => "float",
            TypeFlag::String => "string",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn type_flag(&self) -> TypeFlag {
        match self {
            Value::Bool(_) => TypeFlag::Bool,
            Value::Integer(_) => TypeFlag::Integer,
            Value::Float(_) => TypeFlag::Float,
            Value::Text(_) => TypeFlag::String,
        }
    }

    /// Widens a number to `f64`; `None` for anything else.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Integer(n) => serde_json::Value::from(n),
            Value::Float(n) => serde_json::Value::from(n),
            Value::Text(s) => serde_json::Value::String(s),
        }
    }
}

/// Something a caller can bind to a variable name.
///
/// `normalize` maps the external representation onto exactly one of the four
/// value categories, or `None` when it has no scalar meaning.
pub trait Parameter {
    fn normalize(&self) -> Option<Value>;
}

impl Parameter for Value {
    fn normalize(&self) -> Option<Value> {
        Some(self.clone())
    }
}

impl Parameter for bool {
    fn normalize(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

macro_rules! signed_parameter {
    ($($t:ty),*) => {
        $(
            impl Parameter for $t {
                fn normalize(&self) -> Option<Value> {
                    Some(Value::Integer(i64::from(*self)))
                }
            }
        )*
    };
}

signed_parameter!(i8, i16, i32, i64, u8, u16, u32);

// Too wide for i64: fall back to a float rather than wrap.
macro_rules! wide_parameter {
    ($($t:ty),*) => {
        $(
            impl Parameter for $t {
                fn normalize(&self) -> Option<Value> {
                    Some(match i64::try_from(*self) {
                        Ok(n) => Value::Integer(n),
                        Err(_) => Value::Float(*self as f64),
                    })
                }
            }
        )*
    };
}

wide_parameter!(isize, u64, usize);

impl Parameter for f32 {
    fn normalize(&self) -> Option<Value> {
        Some(Value::Float(f64::from(*self)))
    }
}

impl Parameter for f64 {
    fn normalize(&self) -> Option<Value> {
        Some(Value::Float(*self))
    }
}

impl Parameter for String {
    fn normalize(&self) -> Option<Value> {
        Some(Value::Text(self.clone()))
    }
}

impl Parameter for &str {
    fn normalize(&self) -> Option<Value> {
        Some(Value::Text((*self).to_string()))
    }
}

/// JSON numbers without a fraction or exponent that fit in `i64` are
/// integers; every other number is a float.
impl Parameter for serde_json::Number {
    fn normalize(&self) -> Option<Value> {
        if let Some(n) = self.as_i64() {
            return Some(Value::Integer(n));
        }
        self.as_f64().map(Value::Float)
    }
}

impl Parameter for serde_json::Value {
    fn normalize(&self) -> Option<Value> {
        match self {
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.normalize(),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }
}

/// Read-only variable bindings for one evaluation.
pub trait Parameters {
    fn get(&self, name: &str) -> Option<&dyn Parameter>;
}

impl<P: Parameter, S: BuildHasher> Parameters for HashMap<String, P, S> {
    fn get(&self, name: &str) -> Option<&dyn Parameter> {
        HashMap::get(self, name).map(|p| p as &dyn Parameter)
    }
}

impl<P: Parameter> Parameters for BTreeMap<String, P> {
    fn get(&self, name: &str) -> Option<&dyn Parameter> {
        BTreeMap::get(self, name).map(|p| p as &dyn Parameter)
    }
}

impl Parameters for serde_json::Map<String, serde_json::Value> {
    fn get(&self, name: &str) -> Option<&dyn Parameter> {
        serde_json::Map::get(self, name).map(|p| p as &dyn Parameter)
    }
}

/// Binds nothing; any variable reference fails to resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParameters;

impl Parameters for NoParameters {
    fn get(&self, _: &str) -> Option<&dyn Parameter> {
        None
    }
}
