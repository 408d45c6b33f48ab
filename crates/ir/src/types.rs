//! Relift IR type definitions.
//!
//! Compound types are interned in a [`TypeStore`]: structurally identical
//! compounds share one [`CompoundTypeRef`], so type equality is reference
//! equality. Struct types are anonymous; recovered frame layouts are literal
//! packed structs.

use cranelift_entity::PrimaryMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

#[derive(Debug, Default)]
pub struct TypeStore {
    compounds: PrimaryMap<CompoundTypeRef, CompoundType>,
    rev_types: FxHashMap<CompoundType, CompoundTypeRef>,
}

impl TypeStore {
    pub fn make_ptr(&mut self, ty: Type) -> Type {
        let ty = self.make_compound(CompoundType::Ptr(ty));
        Type::Compound(ty)
    }

    pub fn make_array(&mut self, elem: Type, len: usize) -> Type {
        let ty = self.make_compound(CompoundType::Array { elem, len });
        Type::Compound(ty)
    }

    pub fn make_struct(&mut self, fields: &[Type], packed: bool) -> Type {
        let data = CompoundType::Struct(StructData {
            fields: fields.to_vec(),
            packed,
        });
        Type::Compound(self.make_compound(data))
    }

    pub fn make_func(&mut self, args: &[Type], ret_ty: Type) -> Type {
        let data = CompoundType::Func {
            args: args.into(),
            ret_ty,
        };
        Type::Compound(self.make_compound(data))
    }

    /// Returns the struct definition if the given type is a struct type.
    pub fn struct_def(&self, ty: Type) -> Option<&StructData> {
        match ty {
            Type::Compound(cmpd_ref) => match self.compounds[cmpd_ref] {
                CompoundType::Struct(ref def) => Some(def),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn array_def(&self, ty: Type) -> Option<(Type, usize)> {
        match ty {
            Type::Compound(cmpd_ref) => match self.compounds[cmpd_ref] {
                CompoundType::Array { elem, len } => Some((elem, len)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Returns the pointee type if `ptr` is a pointer type.
    pub fn deref(&self, ptr: Type) -> Option<Type> {
        match ptr {
            Type::Compound(cmpd_ref) => match self.compounds[cmpd_ref] {
                CompoundType::Ptr(ty) => Some(ty),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_ptr(&self, ty: Type) -> bool {
        matches!(ty, Type::Compound(r) if self.compounds[r].is_ptr())
    }

    pub fn is_array(&self, ty: Type) -> bool {
        matches!(ty, Type::Compound(r) if self.compounds[r].is_array())
    }

    pub fn is_struct(&self, ty: Type) -> bool {
        matches!(ty, Type::Compound(r) if self.compounds[r].is_struct())
    }

    /// The type addressed by an indexed-element path rooted at `base`.
    ///
    /// `base` must be a pointer type; the first index steps through it, the
    /// remaining indices select struct fields or array elements. Returns
    /// `None` when the path doesn't describe a sub-object of `base`.
    pub fn indexed_type(&self, base: Type, indices: &[usize]) -> Option<Type> {
        let (&_first, rest) = indices.split_first()?;
        let mut current = self.deref(base)?;
        for &idx in rest {
            current = match current {
                Type::Compound(cmpd_ref) => match self.compounds[cmpd_ref] {
                    CompoundType::Struct(ref def) => *def.fields.get(idx)?,
                    CompoundType::Array { elem, .. } => elem,
                    _ => return None,
                },
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn make_compound(&mut self, data: CompoundType) -> CompoundTypeRef {
        match self.rev_types.get(&data) {
            Some(cmpd_ref) => *cmpd_ref,
            None => {
                let cmpd_ref = self.compounds.push(data.clone());
                self.rev_types.insert(data, cmpd_ref);
                cmpd_ref
            }
        }
    }

    pub fn resolve_compound(&self, cmpd_ref: CompoundTypeRef) -> &CompoundType {
        &self.compounds[cmpd_ref]
    }
}

/// Relift IR types definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Compound(CompoundTypeRef),
    #[default]
    Unit,
}

impl Type {
    pub fn is_integral(self) -> bool {
        matches!(self, Self::I1 | Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    pub fn is_compound(self) -> bool {
        matches!(self, Self::Compound(_))
    }

    pub fn is_unit(self) -> bool {
        matches!(self, Self::Unit)
    }

    /// The integer type with the given store size in bytes.
    pub fn int_with_size(bytes: usize) -> Option<Type> {
        match bytes {
            1 => Some(Type::I8),
            2 => Some(Type::I16),
            4 => Some(Type::I32),
            8 => Some(Type::I64),
            _ => None,
        }
    }
}

/// An opaque reference to [`CompoundType`].
#[derive(Debug, Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct CompoundTypeRef(u32);
cranelift_entity::entity_impl!(CompoundTypeRef);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompoundType {
    Array {
        elem: Type,
        len: usize,
    },
    Ptr(Type),
    Struct(StructData),
    Func {
        args: SmallVec<[Type; 8]>,
        ret_ty: Type,
    },
}

impl CompoundType {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array { .. })
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, Self::Ptr(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(..))
    }

    pub fn is_func(&self) -> bool {
        matches!(self, Self::Func { .. })
    }
}

/// An anonymous struct body. Interned structurally, so two layouts with the
/// same fields and packing are the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructData {
    pub fields: Vec<Type>,
    pub packed: bool,
}
