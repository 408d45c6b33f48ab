//! Module and the shared module context.

use std::sync::{Arc, RwLock};

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::{function::Function, isa::TypeLayout, types::Type, types::TypeStore};

pub struct Module {
    pub ctx: ModuleCtx,

    /// Holds all functions declared in the module.
    pub funcs: PrimaryMap<FuncRef, Function>,
}

impl Module {
    pub fn new(ctx: ModuleCtx) -> Self {
        Self {
            ctx,
            funcs: PrimaryMap::default(),
        }
    }

    pub fn iter_functions(&self) -> impl Iterator<Item = FuncRef> {
        self.funcs.keys()
    }
}

/// An opaque reference to [`Function`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(u32);
entity_impl!(FuncRef);

/// Module-wide state shared by every function: the interning type store and
/// the target data layout. Clones share the same store.
#[derive(Clone)]
pub struct ModuleCtx {
    ty_store: Arc<RwLock<TypeStore>>,
    pub type_layout: &'static dyn TypeLayout,
}

impl ModuleCtx {
    pub fn new(type_layout: &'static dyn TypeLayout) -> Self {
        Self {
            ty_store: Arc::new(RwLock::new(TypeStore::default())),
            type_layout,
        }
    }

    pub fn with_ty_store<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&TypeStore) -> R,
    {
        f(&self.ty_store.read().unwrap())
    }

    pub fn with_ty_store_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut TypeStore) -> R,
    {
        f(&mut self.ty_store.write().unwrap())
    }

    /// The number of bytes required to store a value of `ty`.
    pub fn size_of(&self, ty: Type) -> usize {
        self.with_ty_store(|s| self.type_layout.size_of(ty, s))
    }

    pub fn make_ptr(&self, ty: Type) -> Type {
        self.with_ty_store_mut(|s| s.make_ptr(ty))
    }

    pub fn make_array(&self, elem: Type, len: usize) -> Type {
        self.with_ty_store_mut(|s| s.make_array(elem, len))
    }

    pub fn make_struct(&self, fields: &[Type], packed: bool) -> Type {
        self.with_ty_store_mut(|s| s.make_struct(fields, packed))
    }

    pub fn indexed_type(&self, base: Type, indices: &[usize]) -> Option<Type> {
        self.with_ty_store(|s| s.indexed_type(base, indices))
    }

    pub fn offset_of(&self, base: Type, indices: &[usize]) -> Option<usize> {
        self.with_ty_store(|s| self.type_layout.offset_of(base, indices, s))
    }

    pub fn is_ptr(&self, ty: Type) -> bool {
        self.with_ty_store(|s| s.is_ptr(ty))
    }
}
