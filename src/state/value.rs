//! State values.
//!
//! A closed set of kinds.  Reads are typed through [`StateKind`]; a read
//! of the wrong kind yields the caller's default, never a coercion.

use core::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum StateValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Text(String),
}

impl StateValue {
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }

    pub fn same_kind(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }
}

/// Plain rendering: `true`, `42`, `1.5`, raw text without quotes.
impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// JSON rendering. Non-finite floats become `null`.
impl Serialize for StateValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i32(*i),
            Self::Float(x) if x.is_finite() => serializer.serialize_f32(*x),
            Self::Float(_) => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for StateValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

// ── Typed reads ───────────────────────────────────────────────

/// A Rust type that maps onto exactly one [`StateValue`] kind.
pub trait StateKind: Sized {
    fn from_value(value: &StateValue) -> Option<Self>;
}

impl StateKind for bool {
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl StateKind for i32 {
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl StateKind for f32 {
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl StateKind for String {
    fn from_value(value: &StateValue) -> Option<Self> {
        match value {
            StateValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

// ── Entry ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct StateEntry {
    current: StateValue,
    previous: Option<StateValue>,
    dirty: bool,
}

impl StateEntry {
    /// A freshly created key counts as changed.
    pub fn new(value: StateValue) -> Self {
        Self {
            current: value,
            previous: None,
            dirty: true,
        }
    }

    /// Store `value`.  Returns `true` if the entry is now dirty because of
    /// this call; an equal value leaves the flag as it was.
    pub fn assign(&mut self, value: StateValue) -> bool {
        if !self.current.same_kind(&value) {
            *self = Self::new(value);
            return true;
        }
        if self.current == value {
            return false;
        }
        self.previous = Some(core::mem::replace(&mut self.current, value));
        self.dirty = true;
        true
    }

    pub fn current(&self) -> &StateValue {
        &self.current
    }

    /// Value before the last change of the same kind.
    pub fn previous(&self) -> Option<&StateValue> {
        self.previous.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_read(&mut self) {
        self.dirty = false;
    }
}
