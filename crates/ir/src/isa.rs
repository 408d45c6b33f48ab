//! Target data layout.
//!
//! The pass pipeline only needs byte-level answers from the target: how many
//! bytes a type occupies when stored, how types are aligned, and how a
//! constant indexed-element path translates to a byte offset.

use crate::types::{CompoundType, Type, TypeStore};

pub trait TypeLayout: Sync {
    /// The number of bytes required to store a value of `ty`.
    /// Unsized types (unit, function types) report 0.
    fn size_of(&self, ty: Type, ty_store: &TypeStore) -> usize;

    fn align_of(&self, ty: Type, ty_store: &TypeStore) -> usize;

    fn pointer_size(&self) -> usize;

    fn endian(&self) -> Endian;

    /// The byte offset addressed by an indexed-element path rooted at the
    /// pointer type `base`. Mirrors [`TypeStore::indexed_type`]: the first
    /// index steps through the pointer, the rest select sub-objects.
    fn offset_of(&self, base: Type, indices: &[usize], ty_store: &TypeStore) -> Option<usize> {
        let (&first, rest) = indices.split_first()?;
        let mut current = ty_store.deref(base)?;
        let mut offset = first * self.size_of(current, ty_store);
        for &idx in rest {
            match current {
                Type::Compound(cmpd_ref) => match ty_store.resolve_compound(cmpd_ref) {
                    CompoundType::Struct(def) => {
                        let field = *def.fields.get(idx)?;
                        let mut field_offset: usize = 0;
                        for &prev in &def.fields[..idx] {
                            if !def.packed {
                                let align = self.align_of(prev, ty_store);
                                field_offset = field_offset.next_multiple_of(align);
                            }
                            field_offset += self.size_of(prev, ty_store);
                        }
                        if !def.packed {
                            let align = self.align_of(field, ty_store);
                            field_offset = field_offset.next_multiple_of(align);
                        }
                        offset += field_offset;
                        current = field;
                    }
                    CompoundType::Array { elem, .. } => {
                        offset += idx * self.size_of(*elem, ty_store);
                        current = *elem;
                    }
                    _ => return None,
                },
                _ => return None,
            }
        }
        Some(offset)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endian {
    Be,
    Le,
}

/// The x86-64 layout: little-endian, 8-byte pointers, natural alignment for
/// scalars, no padding inside packed structs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Amd64;

/// Shared layout instance for contexts that only need a `&'static` handle.
pub static AMD64: Amd64 = Amd64;

impl TypeLayout for Amd64 {
    fn size_of(&self, ty: Type, ty_store: &TypeStore) -> usize {
        match ty {
            Type::I1 | Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 | Type::F32 => 4,
            Type::I64 | Type::F64 => 8,
            Type::Unit => 0,
            Type::Compound(cmpd_ref) => match ty_store.resolve_compound(cmpd_ref) {
                CompoundType::Ptr(_) => self.pointer_size(),
                CompoundType::Array { elem, len } => self.size_of(*elem, ty_store) * len,
                CompoundType::Struct(def) => {
                    let mut size: usize = 0;
                    for &field in &def.fields {
                        if !def.packed {
                            let align = self.align_of(field, ty_store);
                            size = size.next_multiple_of(align);
                        }
                        size += self.size_of(field, ty_store);
                    }
                    if !def.packed {
                        size = size.next_multiple_of(self.align_of(ty, ty_store));
                    }
                    size
                }
                CompoundType::Func { .. } => 0,
            },
        }
    }

    fn align_of(&self, ty: Type, ty_store: &TypeStore) -> usize {
        match ty {
            Type::Compound(cmpd_ref) => match ty_store.resolve_compound(cmpd_ref) {
                CompoundType::Ptr(_) => self.pointer_size(),
                CompoundType::Array { elem, .. } => self.align_of(*elem, ty_store),
                CompoundType::Struct(def) => {
                    if def.packed {
                        1
                    } else {
                        def.fields
                            .iter()
                            .map(|&f| self.align_of(f, ty_store))
                            .max()
                            .unwrap_or(1)
                    }
                }
                CompoundType::Func { .. } => 1,
            },
            _ => self.size_of(ty, ty_store).max(1),
        }
    }

    fn pointer_size(&self) -> usize {
        8
    }

    fn endian(&self) -> Endian {
        Endian::Le
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sizes() {
        let store = TypeStore::default();
        assert_eq!(AMD64.size_of(Type::I1, &store), 1);
        assert_eq!(AMD64.size_of(Type::I16, &store), 2);
        assert_eq!(AMD64.size_of(Type::I64, &store), 8);
        assert_eq!(AMD64.size_of(Type::F64, &store), 8);
        assert_eq!(AMD64.size_of(Type::Unit, &store), 0);
    }

    #[test]
    fn packed_struct_size_is_field_sum() {
        let mut store = TypeStore::default();
        let s = store.make_struct(&[Type::I8, Type::I64, Type::I16], true);
        assert_eq!(AMD64.size_of(s, &store), 11);
        assert_eq!(AMD64.align_of(s, &store), 1);
    }

    #[test]
    fn unpacked_struct_gets_natural_padding() {
        let mut store = TypeStore::default();
        let s = store.make_struct(&[Type::I8, Type::I64, Type::I16], false);
        // 1 byte, 7 pad, 8 bytes, 2 bytes, 6 tail pad.
        assert_eq!(AMD64.size_of(s, &store), 24);
        assert_eq!(AMD64.align_of(s, &store), 8);
    }

    #[test]
    fn offset_of_follows_gep_paths() {
        let mut store = TypeStore::default();
        let inner = store.make_struct(&[Type::I16, Type::I16], true);
        let root = store.make_struct(&[Type::I32, inner, Type::I64], true);
        let ptr = store.make_ptr(root);

        assert_eq!(AMD64.offset_of(ptr, &[0], &store), Some(0));
        assert_eq!(AMD64.offset_of(ptr, &[0, 1], &store), Some(4));
        assert_eq!(AMD64.offset_of(ptr, &[0, 1, 1], &store), Some(6));
        assert_eq!(AMD64.offset_of(ptr, &[0, 2], &store), Some(8));
        assert_eq!(AMD64.offset_of(ptr, &[1], &store), Some(16));
    }

    #[test]
    fn offset_of_indexes_arrays() {
        let mut store = TypeStore::default();
        let arr = store.make_array(Type::I32, 8);
        let root = store.make_struct(&[Type::I64, arr], true);
        let ptr = store.make_ptr(root);
        assert_eq!(AMD64.offset_of(ptr, &[0, 1, 3], &store), Some(20));
    }
}
