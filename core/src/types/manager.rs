use crate::types::types::Type;
use bumpalo::Bump;
use core::cell::RefCell;
use hashbrown::{DefaultHashBuilder, HashMap};

/// Arena-backed registry of interned types.
///
/// Built once per engine and shared by reference; every factory returns a
/// reference that lives as long as the arena.
pub struct TypeManager<'a> {
    // Arena holding all types from this TypeManager.
    arena: &'a Bump,
    interned_strs: RefCell<HashMap<&'a str, &'a str, DefaultHashBuilder, &'a Bump>>,
    interned: RefCell<HashMap<Type<'a>, &'a Type<'a>, DefaultHashBuilder, &'a Bump>>,
}

impl<'a> TypeManager<'a> {
    pub fn new(arena: &'a Bump) -> &'a Self {
        arena.alloc(Self {
            arena,
            interned_strs: RefCell::new(HashMap::new_in(arena)),
            interned: RefCell::new(HashMap::new_in(arena)),
        })
    }

    pub fn intern_str(&self, s: &str) -> &'a str {
        if let Some(&interned_str) = self.interned_strs.borrow().get(s) {
            return interned_str;
        }
        let arena_str = self.arena.alloc_str(s);
        self.interned_strs.borrow_mut().insert(arena_str, arena_str);
        arena_str
    }

    fn intern_strs<S: AsRef<str>>(&self, items: &[S]) -> &'a [&'a str] {
        self.arena
            .alloc_slice_fill_iter(items.iter().map(|s| self.intern_str(s.as_ref())))
    }

    fn intern(&self, ty: Type<'a>) -> &'a Type<'a> {
        if let Some(&interned_ty) = self.interned.borrow().get(&ty) {
            return interned_ty;
        }
        let arena_ty = self.arena.alloc(ty.clone());
        self.interned.borrow_mut().insert(ty, arena_ty);
        arena_ty
    }

    /// Number of distinct types interned so far.
    pub fn len(&self) -> usize {
        self.interned.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Factory methods for types.
    pub fn any(&self) -> &'a Type<'a> {
        self.intern(Type::Any)
    }
    pub fn null(&self) -> &'a Type<'a> {
        self.intern(Type::Null)
    }
    pub fn bool(&self) -> &'a Type<'a> {
        self.intern(Type::Bool)
    }
    pub fn byte(&self) -> &'a Type<'a> {
        self.intern(Type::Byte)
    }
    pub fn short(&self) -> &'a Type<'a> {
        self.intern(Type::Short)
    }
    pub fn int(&self) -> &'a Type<'a> {
        self.intern(Type::Int)
    }
    pub fn long(&self) -> &'a Type<'a> {
        self.intern(Type::Long)
    }
    pub fn float(&self) -> &'a Type<'a> {
        self.intern(Type::Float)
    }
    pub fn double(&self) -> &'a Type<'a> {
        self.intern(Type::Double)
    }
    pub fn str(&self) -> &'a Type<'a> {
        self.intern(Type::Str)
    }
    pub fn bytes(&self) -> &'a Type<'a> {
        self.intern(Type::Bytes)
    }
    pub fn list(&self) -> &'a Type<'a> {
        self.intern(Type::List)
    }
    pub fn map(&self) -> &'a Type<'a> {
        self.intern(Type::Map)
    }

    pub fn function(&self, params: &[&'a Type<'a>], ret: &'a Type<'a>) -> &'a Type<'a> {
        self.generic_function(&[] as &[&str], params, ret)
    }

    pub fn generic_function<S: AsRef<str>>(
        &self,
        generics: &[S],
        params: &[&'a Type<'a>],
        ret: &'a Type<'a>,
    ) -> &'a Type<'a> {
        self.intern(Type::Function {
            generics: self.intern_strs(generics),
            params: self.arena.alloc_slice_copy(params),
            ret,
        })
    }

    pub fn generic(&self, name: &str) -> &'a Type<'a> {
        self.intern(Type::Generic(self.intern_str(name)))
    }

    pub fn object(&self, name: &str) -> &'a Type<'a> {
        self.intern(Type::Object(self.intern_str(name)))
    }

    pub fn enum_child<S: AsRef<str>>(
        &self,
        parent: &str,
        name: &str,
        ordinal: u32,
        properties: &[S],
    ) -> &'a Type<'a> {
        self.intern(Type::EnumChild {
            name: self.intern_str(name),
            parent: self.intern_str(parent),
            ordinal,
            properties: self.intern_strs(properties),
        })
    }

    /// Declares an enum. Ordinals follow declaration order.
    pub fn enum_type<S: AsRef<str>>(&self, name: &str, variants: &[(S, Vec<S>)]) -> &'a Type<'a> {
        let children: Vec<&'a Type<'a>> = variants
            .iter()
            .enumerate()
            .map(|(ordinal, (child, properties))| {
                self.enum_child(name, child.as_ref(), ordinal as u32, properties)
            })
            .collect();
        self.enum_from_children(name, &children)
    }

    /// Builds an enum from already interned children, as the decoder does.
    pub fn enum_from_children(&self, name: &str, children: &[&'a Type<'a>]) -> &'a Type<'a> {
        self.intern(Type::Enum {
            name: self.intern_str(name),
            children: self.arena.alloc_slice_copy(children),
        })
    }

    /// Resolves a builtin type name as written in annotations.
    pub fn builtin(&self, name: &str) -> Option<&'a Type<'a>> {
        let ty = match name {
            "any" => self.any(),
            "null" => self.null(),
            "bool" => self.bool(),
            "byte" => self.byte(),
            "short" => self.short(),
            "int" => self.int(),
            "long" => self.long(),
            "float" => self.float(),
            "double" => self.double(),
            "str" | "string" => self.str(),
            "bytes" => self.bytes(),
            "list" => self.list(),
            "map" => self.map(),
            _ => return None,
        };
        Some(ty)
    }
}
