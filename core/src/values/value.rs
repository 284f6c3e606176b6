use core::{cmp::Ordering, fmt};
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use super::{
    number::Number,
    object::{Closure, Instance, LanguageEnum, LanguageEnumChild},
    ops::OpError,
};

/// A runtime datum. Containers and objects are shared through `Rc`, so
/// cloning a `Value` never deep-copies.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<BTreeMap<MapKey, Value>>>),
    Closure(Rc<Closure>),
    Instance(Rc<Instance>),
    Enum(Rc<LanguageEnum>),
    EnumChild(Rc<LanguageEnumChild>),
}

impl Value {
    pub fn byte(v: i8) -> Self {
        Value::Number(Number::Byte(v))
    }
    pub fn short(v: i16) -> Self {
        Value::Number(Number::Short(v))
    }
    pub fn int(v: i32) -> Self {
        Value::Number(Number::Int(v))
    }
    pub fn long(v: i64) -> Self {
        Value::Number(Number::Long(v))
    }
    pub fn float(v: f32) -> Self {
        Value::Number(Number::Float(v))
    }
    pub fn double(v: f64) -> Self {
        Value::Number(Number::Double(v))
    }
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Rc::from(b))
    }
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Builds a map, rejecting keys that cannot be ordered.
    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Result<Self, OpError> {
        let mut map = BTreeMap::new();
        for (k, v) in entries {
            map.insert(MapKey::new(k)?, v);
        }
        Ok(Value::Map(Rc::new(RefCell::new(map))))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(n) => n.kind_name(),
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Closure(_) => "function",
            Value::Instance(_) => "object",
            Value::Enum(_) => "enum",
            Value::EnumChild(_) => "enum variant",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integral payload of any width.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_number()
            .filter(|n| n.is_integral())
            .map(Number::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Rc<Instance>> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    /// Language-level equality: numbers compare across widths, containers
    /// compare element-wise, objects compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
                }
            }
            (Value::Map(a), Value::Map(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len()
                        && a.iter()
                            .zip(b.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
                }
            }
            _ => self == other,
        }
    }

    fn write_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", &**s),
            other => write!(f, "{other}"),
        }
    }
}

/// Structural identity: same variant and same payload, objects by reference.
/// Used for constant pools and round-trip checks; see [`Value::equals`] for
/// the language's `==`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.identical(*b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Map(a), Value::Map(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len()
                        && a.iter()
                            .zip(b.iter())
                            .all(|((ka, va), (kb, vb))| ka.0 == kb.0 && va == vb)
                }
            }
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Enum(a), Value::Enum(b)) => Rc::ptr_eq(a, b),
            (Value::EnumChild(a), Value::EnumChild(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => {
                write!(f, "b\"")?;
                for byte in b.iter() {
                    write!(f, "{}", core::ascii::escape_default(*byte))?;
                }
                write!(f, "\"")
            }
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.write_repr(f)?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    k.0.write_repr(f)?;
                    write!(f, ": ")?;
                    v.write_repr(f)?;
                }
                write!(f, "}}")
            }
            Value::Closure(closure) => write!(f, "<fn {}>", closure.proto.name),
            Value::Instance(instance) => write!(f, "{instance}"),
            Value::Enum(descriptor) => write!(f, "<enum {}>", descriptor.name),
            Value::EnumChild(child) => write!(f, "<variant {}>", child.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_repr(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::double(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

/// Map key. Only scalars qualify; numbers of different widths that compare
/// equal are the same key.
#[derive(Clone, Debug)]
pub struct MapKey(Value);

impl MapKey {
    pub fn new(value: Value) -> Result<Self, OpError> {
        match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Str(_) | Value::Bytes(_) => {
                Ok(MapKey(value))
            }
            other => Err(OpError::Unhashable(other.type_name())),
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn rank(&self) -> u8 {
        match self.0 {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::Str(_) => 3,
            _ => 4,
        }
    }
}

impl Ord for MapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(*b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for MapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MapKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MapKey {}
