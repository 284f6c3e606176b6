//! Heap objects shared between values: function prototypes, closures,
//! instances and enum descriptors.

use core::{cell::RefCell, fmt};
use std::rc::{Rc, Weak};

use super::{Value, ops::OpError};
use crate::types::Type;

/// Field holding a variant instance's ordinal.
pub const CHILD_FIELD: &str = "$child";
/// Field holding a variant instance's enum descriptor.
pub const PARENT_FIELD: &str = "$parent";

/// Compiled function. The body lives in the owning chunk's instruction
/// stream starting at `entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionProto {
    pub name: Rc<str>,
    pub arity: u8,
    pub upvalue_count: u8,
    /// Slots reserved past the callee and its parameters.
    pub num_locals: u16,
    pub max_stack: u16,
    pub entry: u32,
}

impl FunctionProto {
    /// Frame size: callee slot, parameters, then locals.
    pub fn frame_size(&self) -> usize {
        1 + self.arity as usize + self.num_locals as usize
    }
}

#[derive(Debug)]
pub struct Closure {
    pub proto: Rc<FunctionProto>,
    pub upvalues: RefCell<Vec<Value>>,
}

impl Closure {
    pub fn new(proto: Rc<FunctionProto>, upvalues: Vec<Value>) -> Self {
        Closure {
            proto,
            upvalues: RefCell::new(upvalues),
        }
    }

    pub fn upvalue(&self, index: usize) -> Option<Value> {
        self.upvalues.borrow().get(index).cloned()
    }

    /// Returns false when `index` is not a captured slot.
    pub fn set_upvalue(&self, index: usize, value: Value) -> bool {
        match self.upvalues.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// An object with named fields. Field order is insertion order.
#[derive(Debug)]
pub struct Instance {
    pub class: Rc<str>,
    fields: RefCell<Vec<(Rc<str>, Value)>>,
}

impl Instance {
    pub fn new(class: Rc<str>, fields: Vec<(Rc<str>, Value)>) -> Self {
        Instance {
            class,
            fields: RefCell::new(fields),
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields
            .borrow()
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v.clone())
    }

    pub fn set_field(&self, name: &str, value: Value) {
        let mut fields = self.fields.borrow_mut();
        match fields.iter_mut().find(|(k, _)| &**k == name) {
            Some((_, slot)) => *slot = value,
            None => fields.push((Rc::from(name), value)),
        }
    }

    pub fn field_names(&self) -> Vec<Rc<str>> {
        self.fields.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Ordinal of the variant this instance was built from.
    pub fn ordinal(&self) -> Option<i64> {
        self.field(CHILD_FIELD).and_then(|v| v.as_i64())
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.class)?;
        let mut first = true;
        for (name, value) in self.fields.borrow().iter() {
            if name.starts_with('$') {
                continue;
            }
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}: {value:?}")?;
        }
        write!(f, ")")
    }
}

/// Runtime descriptor of a declared enum.
#[derive(Debug)]
pub struct LanguageEnum {
    pub name: Rc<str>,
    pub children: Vec<Rc<LanguageEnumChild>>,
}

#[derive(Debug)]
pub struct LanguageEnumChild {
    pub name: Rc<str>,
    pub ordinal: u32,
    pub properties: Vec<Rc<str>>,
    parent: Weak<LanguageEnum>,
}

impl LanguageEnum {
    /// Builds the descriptor with children pointing back at it.
    pub fn new(name: &str, variants: &[(&str, &[&str])]) -> Rc<Self> {
        Rc::new_cyclic(|parent| LanguageEnum {
            name: Rc::from(name),
            children: variants
                .iter()
                .enumerate()
                .map(|(ordinal, (child, properties))| {
                    Rc::new(LanguageEnumChild {
                        name: Rc::from(*child),
                        ordinal: ordinal as u32,
                        properties: properties.iter().map(|p| Rc::from(*p)).collect(),
                        parent: parent.clone(),
                    })
                })
                .collect(),
        })
    }

    /// Builds the descriptor for an interned `Type::Enum`.
    pub fn from_type(ty: &Type<'_>) -> Option<Rc<Self>> {
        let Type::Enum { name, children } = ty else {
            return None;
        };
        let mut variants: Vec<(&str, &[&str])> = Vec::with_capacity(children.len());
        for child in children.iter() {
            let Type::EnumChild {
                name, properties, ..
            } = child
            else {
                return None;
            };
            variants.push((*name, *properties));
        }
        Some(LanguageEnum::new(name, &variants))
    }

    pub fn child(&self, name: &str) -> Option<Rc<LanguageEnumChild>> {
        self.children.iter().find(|c| &*c.name == name).cloned()
    }
}

impl LanguageEnumChild {
    pub fn parent(&self) -> Option<Rc<LanguageEnum>> {
        self.parent.upgrade()
    }

    pub fn arity(&self) -> usize {
        self.properties.len()
    }

    /// Creates an instance of this variant, binding `args` to the declared
    /// properties in order.
    pub fn create(&self, args: &[Value]) -> Result<Rc<Instance>, OpError> {
        if args.len() != self.properties.len() {
            return Err(OpError::Arity {
                name: self.name.to_string(),
                expected: self.properties.len(),
                got: args.len(),
            });
        }
        let parent = self
            .parent()
            .ok_or_else(|| OpError::Detached(self.name.to_string()))?;

        let mut fields: Vec<(Rc<str>, Value)> = self
            .properties
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        fields.push((Rc::from(CHILD_FIELD), Value::int(self.ordinal as i32)));
        fields.push((Rc::from(PARENT_FIELD), Value::Enum(parent.clone())));

        Ok(Rc::new(Instance::new(parent.name.clone(), fields)))
    }
}
