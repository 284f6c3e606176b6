use core::fmt::{self, Display};

/// Compile-time type descriptor.
///
/// Instances are interned by [`super::manager::TypeManager`]: two structurally
/// equal types obtained from the same manager are the same reference, so
/// identity can be checked with `core::ptr::eq`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type<'a> {
    // Top and unit.
    Any,
    Null,

    // Primitives.
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Str,
    Bytes,

    // Collections. Elements are dynamically typed.
    List,
    Map,

    Function {
        generics: &'a [&'a str],
        params: &'a [&'a Type<'a>],
        ret: &'a Type<'a>,
    },

    /// Generic placeholder, substituted by `apply_generics`.
    Generic(&'a str),

    /// Instance of the named enum.
    Object(&'a str),

    Enum {
        name: &'a str,
        /// Always `EnumChild` types, in ordinal order.
        children: &'a [&'a Type<'a>],
    },

    EnumChild {
        name: &'a str,
        parent: &'a str,
        ordinal: u32,
        properties: &'a [&'a str],
    },
}

/// Tag identifying a concrete type in the binary IR.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Any = 0,
    Null = 1,
    Bool = 2,
    Byte = 3,
    Short = 4,
    Int = 5,
    Long = 6,
    Float = 7,
    Double = 8,
    Str = 9,
    Bytes = 10,
    List = 11,
    Map = 12,
    Function = 13,
    Generic = 14,
    Object = 15,
    Enum = 16,
    EnumChild = 17,
}

impl TypeCode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        use TypeCode::*;
        const CODES: [TypeCode; 18] = [
            Any, Null, Bool, Byte, Short, Int, Long, Float, Double, Str, Bytes, List, Map,
            Function, Generic, Object, Enum, EnumChild,
        ];
        CODES.get(byte as usize).copied()
    }

    /// Codes that carry no payload.
    pub fn is_primitive(self) -> bool {
        (self as u8) <= TypeCode::Map as u8
    }
}

impl<'a> Type<'a> {
    pub fn code(&self) -> TypeCode {
        match self {
            Type::Any => TypeCode::Any,
            Type::Null => TypeCode::Null,
            Type::Bool => TypeCode::Bool,
            Type::Byte => TypeCode::Byte,
            Type::Short => TypeCode::Short,
            Type::Int => TypeCode::Int,
            Type::Long => TypeCode::Long,
            Type::Float => TypeCode::Float,
            Type::Double => TypeCode::Double,
            Type::Str => TypeCode::Str,
            Type::Bytes => TypeCode::Bytes,
            Type::List => TypeCode::List,
            Type::Map => TypeCode::Map,
            Type::Function { .. } => TypeCode::Function,
            Type::Generic(_) => TypeCode::Generic,
            Type::Object(_) => TypeCode::Object,
            Type::Enum { .. } => TypeCode::Enum,
            Type::EnumChild { .. } => TypeCode::EnumChild,
        }
    }

    /// Numeric rank used for widening, `None` for non-numeric types.
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            Type::Byte => Some(0),
            Type::Short => Some(1),
            Type::Int => Some(2),
            Type::Long => Some(3),
            Type::Float => Some(4),
            Type::Double => Some(5),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Byte | Type::Short | Type::Int | Type::Long)
    }

    /// `Any` and generic placeholders accept everything at compile time.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Any | Type::Generic(_))
    }

    pub fn is_generic(&self) -> bool {
        match self {
            Type::Generic(_) => true,
            Type::Function { params, ret, .. } => {
                ret.is_generic() || params.iter().any(|p| p.is_generic())
            }
            _ => false,
        }
    }

    /// Directional compatibility check.
    ///
    /// Numeric widening is deliberately one-way and not transitive:
    /// a `Byte` may be passed where a `Short` is expected, but not the other
    /// way round, and `Long` is accepted for `Int` while `Short` is not
    /// accepted for `Long`.
    pub fn is_assignable_to(&self, target: &Type<'a>) -> bool {
        if self.is_dynamic() || target.is_dynamic() {
            return true;
        }
        match (self, target) {
            (Type::Byte, Type::Byte | Type::Short) => true,
            (Type::Short, Type::Short | Type::Int) => true,
            (Type::Int, Type::Int | Type::Long) => true,
            (Type::Long, Type::Long | Type::Int | Type::Float) => true,
            (Type::Float, Type::Float | Type::Double) => true,
            (Type::Double, Type::Double) => true,
            (
                Type::Null,
                Type::Null
                | Type::Str
                | Type::Bytes
                | Type::List
                | Type::Map
                | Type::Object(_)
                | Type::Function { .. },
            ) => true,
            (Type::EnumChild { parent, .. }, Type::Enum { name, .. }) => parent == name,
            (
                Type::Function {
                    params: p1,
                    ret: r1,
                    ..
                },
                Type::Function {
                    params: p2,
                    ret: r2,
                    ..
                },
            ) => {
                p1.len() == p2.len()
                    && p1.iter().zip(p2.iter()).all(|(a, b)| b.is_assignable_to(a))
                    && r1.is_assignable_to(r2)
            }
            _ if self.is_numeric() || target.is_numeric() => false,
            _ => self == target,
        }
    }
}

impl Display for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Byte => write!(f, "byte"),
            Type::Short => write!(f, "short"),
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Str => write!(f, "str"),
            Type::Bytes => write!(f, "bytes"),
            Type::List => write!(f, "list"),
            Type::Map => write!(f, "map"),
            Type::Function {
                generics,
                params,
                ret,
            } => {
                write!(f, "fn")?;
                if !generics.is_empty() {
                    write!(f, "<{}>", generics.join(", "))?;
                }
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                write!(f, "({}) -> {}", params.join(", "), ret)
            }
            Type::Generic(name) | Type::Object(name) => write!(f, "{name}"),
            Type::Enum { name, .. } => write!(f, "enum {name}"),
            Type::EnumChild { name, parent, .. } => write!(f, "{parent}.{name}"),
        }
    }
}
