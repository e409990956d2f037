//! Dynamic host values.
//!
//! Every slot on a host object holds a `Value`. The variants carry the
//! engine's setter semantics: `Vector` is the settable kind (`set`,
//! `set_scalar`, `from_array`), `Object` supports `copy` between objects of
//! the same kind, and `List` is the auto-created array slot used by indexed
//! attach paths.

use super::object::HostObject;

/// A dynamically-typed host slot value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    /// Math-like settable value (vector, color, quaternion...).
    Vector(Vec<f64>),
    /// Plain array slot (indexed attach targets).
    List(Vec<Value>),
    /// Nested host object (material, geometry, texture...).
    Object(HostObject),
}

impl Value {
    /// Shorthand for a 3-component vector.
    pub fn vec3(x: f64, y: f64, z: f64) -> Self {
        Value::Vector(vec![x, y, z])
    }

    /// Whether this value exposes the bulk setter surface.
    pub fn is_settable(&self) -> bool {
        matches!(self, Value::Vector(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Map a vector component name to its index.
    pub fn component_index(name: &str) -> Option<usize> {
        match name {
            "x" | "r" => Some(0),
            "y" | "g" => Some(1),
            "z" | "b" => Some(2),
            "w" | "a" => Some(3),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<HostObject> for Value {
    fn from(o: HostObject) -> Self {
        Value::Object(o)
    }
}
