//! The abstract stack model: a tree of stack objects discovered by walking
//! offset arithmetic rooted at the stack-pointer argument.

use cranelift_entity::PrimaryMap;
use indexmap::IndexSet;
use relift_ir::{CastOp, Function, InstData, ModuleCtx, Type, ValueId};
use tracing::trace;

use super::classify::analyze_base;

/// An opaque reference to a [`StackObject`] in the per-function arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(super) struct ObjectId(u32);
cranelift_entity::entity_impl!(ObjectId);

pub(super) type ObjectArena = PrimaryMap<ObjectId, StackObject>;

/// One recovered stack object. The tree is strictly top-down owned; nothing
/// in the analysis needs a parent back-pointer.
#[derive(Debug)]
pub(super) enum StackObject {
    /// A slot accessed through the given offset-producing value.
    Leaf { offset_value: ValueId },

    /// An aggregate of objects at constant offsets from a common base.
    /// Offsets are relative to the structure's own base and normalized to
    /// start at zero; fields keep discovery order.
    Structure { fields: Vec<StructureField> },
}

#[derive(Debug, Clone, Copy)]
pub(super) struct StructureField {
    pub offset: i64,
    pub object: ObjectId,
}

/// Builds the stack object denoted by `base`, recursing through constant
/// offset additions. Returns `None` when the base's uses are unanalyzable
/// or denote an array (variable offsets).
pub(super) fn read_object(
    func: &Function,
    objects: &mut ObjectArena,
    base: ValueId,
) -> Option<ObjectId> {
    let uses = analyze_base(func, base)?;

    if !uses.variable_offsets.is_empty() {
        // Variable strides would make this an array; array recovery is out
        // of scope, so the whole object is dropped.
        trace!(?base, "variable-offset base, bailing out");
        return None;
    }

    if let Some(front) = uses.min_offset() {
        // Argument recovery has canonicalized stack growth, so offsets from
        // one base share a sign.
        let back = uses.max_offset().unwrap();
        debug_assert!(front == 0 || back == 0 || (front < 0) == (back < 0));

        let mut fields = Vec::new();
        if uses.has_ptr_cast {
            // The base itself is loaded from or stored to: model that as a
            // slot at the start of the structure.
            let leaf = objects.push(StackObject::Leaf { offset_value: base });
            fields.push(StructureField {
                offset: 0,
                object: leaf,
            });
        }

        for (&offset, &add_inst) in &uses.constant_offsets {
            let Some(child_base) = func.dfg.inst_result(add_inst) else {
                continue;
            };
            if let Some(child) = read_object(func, objects, child_base) {
                fields.push(StructureField {
                    offset: offset - front,
                    object: child,
                });
            }
        }
        Some(objects.push(StackObject::Structure { fields }))
    } else {
        Some(objects.push(StackObject::Leaf { offset_value: base }))
    }
}

/// Collects every type witnessed for the slot behind `offset_value`.
///
/// Only loads and stores through an int-to-ptr cast of the value witness a
/// type. A value that merely escapes (stored somewhere, passed to a call)
/// still proves the slot exists; such slots default to `i8`.
///
/// The returned set keeps insertion order; layout synthesis iterates it, so
/// the order is part of the determinism contract.
pub(super) fn union_types(
    func: &Function,
    ctx: &ModuleCtx,
    offset_value: ValueId,
) -> IndexSet<Type> {
    let mut types = IndexSet::new();
    let mut defaults_to_byte = false;

    for &user in func.dfg.users(offset_value) {
        match func.dfg.inst(user) {
            InstData::Cast {
                code: CastOp::IntToPtr,
                ..
            } => {
                if let Some(cast_result) = func.dfg.inst_result(user) {
                    collect_cast_types(func, ctx, cast_result, &mut types);
                }
            }
            InstData::Mstore { value, .. } if *value == offset_value => {
                defaults_to_byte = true;
            }
            InstData::Call { .. } => defaults_to_byte = true,
            // Adds and phis neither witness a type nor prove an access.
            _ => {}
        }
    }

    if types.is_empty() && defaults_to_byte {
        types.insert(Type::I8);
    }
    types
}

/// Walks loads and stores through a pointer obtained by casting an offset
/// value. A loaded integer that is itself cast back to a pointer witnesses
/// pointer-to-T types one level deeper.
fn collect_cast_types(
    func: &Function,
    ctx: &ModuleCtx,
    ptr: ValueId,
    types: &mut IndexSet<Type>,
) {
    for &user in func.dfg.users(ptr) {
        match func.dfg.inst(user) {
            InstData::Mload { addr, ty } if *addr == ptr => {
                types.insert(*ty);

                if ty.is_integral() {
                    let Some(loaded) = func.dfg.inst_result(user) else {
                        continue;
                    };
                    for &load_user in func.dfg.users(loaded) {
                        let InstData::Cast {
                            code: CastOp::IntToPtr,
                            ..
                        } = func.dfg.inst(load_user)
                        else {
                            continue;
                        };
                        let Some(sub_ptr) = func.dfg.inst_result(load_user) else {
                            continue;
                        };
                        let mut sub_types = IndexSet::new();
                        collect_cast_types(func, ctx, sub_ptr, &mut sub_types);
                        for ty in sub_types {
                            types.insert(ctx.make_ptr(ty));
                        }
                    }
                }
            }
            InstData::Mstore { addr, ty, .. } if *addr == ptr => {
                types.insert(*ty);
            }
            _ => {}
        }
    }
}
