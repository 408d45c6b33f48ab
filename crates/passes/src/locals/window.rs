//! Overlap windows and their reduction to a single composite field.
//!
//! A window is an ordered run of typed accesses whose byte ranges overlap.
//! Reduction lays the run out as one field: the first access after sorting
//! keeps its type intact, every other access is broken up over padded
//! sub-fields of a packed struct.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use relift_ir::{ModuleCtx, Type};

use super::object::ObjectId;

/// One typed access to a stack object at a byte offset.
#[derive(Debug, Clone, Copy)]
pub(super) struct TypedAccess {
    pub offset: i64,
    pub object: ObjectId,
    pub ty: Type,
}

impl TypedAccess {
    fn size(&self, ctx: &ModuleCtx) -> i64 {
        ctx.size_of(self.ty) as i64
    }

    pub fn end_offset(&self, ctx: &ModuleCtx) -> i64 {
        self.offset + self.size(ctx)
    }
}

/// An ordered collection of mutually overlapping accesses.
#[derive(Debug, Default)]
pub(super) struct AccessWindow {
    accesses: Vec<TypedAccess>,
}

/// The composite produced by reducing a window.
#[derive(Debug)]
pub(super) struct Reduced {
    pub ty: Type,
    /// Field position of each access inside `ty`; empty when the window
    /// collapsed to a single field.
    pub gep_indices: FxHashMap<ObjectId, usize>,
    pub field_count: usize,
}

impl AccessWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    pub fn clear(&mut self) {
        self.accesses.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypedAccess> {
        self.accesses.iter()
    }

    /// End offset of the last inserted access; 0 for an empty window.
    pub fn end_offset(&self, ctx: &ModuleCtx) -> i64 {
        self.accesses
            .last()
            .map_or(0, |access| access.end_offset(ctx))
    }

    /// Appends the access if it overlaps the window's tail. Returns `false`
    /// without inserting when it doesn't.
    pub fn insert(&mut self, ctx: &ModuleCtx, offset: i64, object: ObjectId, ty: Type) -> bool {
        if let Some(last) = self.accesses.last() {
            if last.end_offset(ctx) <= offset {
                return false;
            }
        }

        self.accesses.push(TypedAccess { offset, object, ty });
        true
    }

    /// Reduces the window to one composite type.
    ///
    /// Multi-access windows are sorted by descending offset, then descending
    /// store size, then descending type priority; the head of the sort is
    /// laid out intact and the rest are padded around it. Returns `None` for
    /// an empty window.
    pub fn reduce(&self, ctx: &ModuleCtx) -> Option<Reduced> {
        if self.accesses.is_empty() {
            return None;
        }
        if self.accesses.len() == 1 {
            return Some(Reduced {
                ty: self.accesses[0].ty,
                gep_indices: FxHashMap::default(),
                field_count: 1,
            });
        }

        let mut sorted = self.accesses.clone();
        sorted.sort_by(|a, b| {
            b.offset
                .cmp(&a.offset)
                .then_with(|| b.size(ctx).cmp(&a.size(ctx)))
                .then_with(|| type_priority(ctx, b.ty).cmp(&type_priority(ctx, a.ty)))
        });

        let mut body: VecDeque<Type> = VecDeque::new();
        // Negative placeholders count back from the deque tail; they become
        // real positions once the final deque length is known.
        let mut placeholders: FxHashMap<ObjectId, i64> = FxHashMap::default();
        let mut field_count = 1usize;

        let mut iter = sorted.iter();
        let first = iter.next().unwrap();
        body.push_back(first.ty);
        placeholders.insert(first.object, -1);
        let mut start_offset = first.offset;
        let mut end_offset = first.end_offset(ctx);

        for access in iter {
            let front_difference = start_offset - access.offset;
            if front_difference > 0 {
                for ty in pad(ctx, front_difference) {
                    body.push_front(ty);
                }
                start_offset = access.offset;
                field_count += 1;
            }

            let back_difference = access.end_offset(ctx) - end_offset;
            if back_difference > 0 {
                for ty in pad(ctx, back_difference) {
                    body.push_back(ty);
                }
                end_offset = access.end_offset(ctx);
            }

            placeholders.insert(access.object, -(body.len() as i64));
        }

        if field_count == 1 {
            // Everything collapsed onto the first access; no wrapper struct.
            Some(Reduced {
                ty: body[0],
                gep_indices: FxHashMap::default(),
                field_count: 1,
            })
        } else {
            let fields: Vec<Type> = body.iter().copied().collect();
            let ty = ctx.make_struct(&fields, true);
            let len = body.len() as i64;
            let gep_indices = placeholders
                .into_iter()
                .map(|(object, placeholder)| (object, (placeholder + len) as usize))
                .collect();
            trace!(fields = fields.len(), "reduced overlap window");
            Some(Reduced {
                ty,
                gep_indices,
                field_count,
            })
        }
    }
}

/// Filler types covering a byte gap of `difference`, in emission order: one
/// bulk `[i64; n]` for gaps over 16 bytes, then the minimal run of
/// power-of-two integers.
fn pad(ctx: &ModuleCtx, mut difference: i64) -> SmallVec<[Type; 4]> {
    let mut out = SmallVec::new();
    if difference > 16 {
        let len = (difference / 8) as usize;
        out.push(ctx.make_array(Type::I64, len));
        difference -= (len * 8) as i64;
    }

    let mut width = 8i64;
    while width > 0 && difference > 0 {
        while difference >= width {
            difference -= width;
            out.push(Type::int_with_size(width as usize).unwrap());
        }
        width /= 2;
    }
    out
}

/// Tie-break ranking for equally placed, equally sized accesses.
fn type_priority(ctx: &ModuleCtx, ty: Type) -> u32 {
    use relift_ir::types::CompoundType;

    match ty {
        Type::Compound(cmpd_ref) => ctx.with_ty_store(|s| match s.resolve_compound(cmpd_ref) {
            CompoundType::Array { .. } => 5,
            CompoundType::Struct(_) => 4,
            CompoundType::Ptr(_) => 3,
            CompoundType::Func { .. } => 0,
        }),
        Type::F32 | Type::F64 => 2,
        ty if ty.is_integral() => 1,
        _ => 0,
    }
}
