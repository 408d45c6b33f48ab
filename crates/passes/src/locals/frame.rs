//! Concrete frame synthesis: lays the abstract stack model out as one
//! composite type and records, per leaf, the indexed-element path that
//! reaches it from a pointer to the frame.

use cranelift_entity::{packed_option::PackedOption, PrimaryMap};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use tracing::trace;

use relift_ir::{
    func_cursor::InstInserter,
    CastOp, Function, InstData, ModuleCtx, Type, ValueId,
};

use super::{
    emit,
    object::{ObjectArena, ObjectId, StackObject},
    window::AccessWindow,
};

/// An opaque reference to a [`GepLink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct LinkId(u32);
cranelift_entity::entity_impl!(LinkId);

/// One step of an indexed-element path. Links form a tree rooted at the
/// frame type; the root-to-leaf chain is the access path for a leaf.
#[derive(Debug, Default)]
struct GepLink {
    parent: PackedOption<LinkId>,
    index: Option<usize>,
    expected: Option<Type>,
}

impl GepLink {
    fn set_index(&mut self, index: usize, expected: Type) {
        self.index = Some(index);
        self.expected = Some(expected);
    }

    fn set_parent(&mut self, parent: LinkId) {
        debug_assert!(self.parent.is_none());
        self.parent = parent.into();
    }
}

/// The synthesized frame for one function.
pub(super) struct StackFrame {
    links: PrimaryMap<LinkId, GepLink>,
    link_map: FxHashMap<ObjectId, LinkId>,
    type_map: FxHashMap<ObjectId, Type>,
    /// Every represented leaf, in discovery order.
    leaves: Vec<ObjectId>,
}

impl StackFrame {
    /// Lays out `root` and every object under it. Returns `None` when some
    /// leaf's witnessed types can't be reconciled into a single field.
    pub fn represent(
        ctx: &ModuleCtx,
        func: &Function,
        objects: &ObjectArena,
        root: ObjectId,
    ) -> Option<StackFrame> {
        let mut frame = StackFrame {
            links: PrimaryMap::new(),
            link_map: FxHashMap::default(),
            type_map: FxHashMap::default(),
            leaves: Vec::new(),
        };

        if !frame.represent_object(ctx, func, objects, root) {
            return None;
        }

        let root_ty = frame.type_map[&root];
        let root_link = frame.link_for(root);
        frame.links[root_link].set_index(0, root_ty);
        Some(frame)
    }

    /// The concrete type chosen for an object.
    pub fn naive_type(&self, object: ObjectId) -> Option<Type> {
        self.type_map.get(&object).copied()
    }

    pub fn leaves(&self) -> &[ObjectId] {
        &self.leaves
    }

    fn link_for(&mut self, object: ObjectId) -> LinkId {
        if let Some(&link) = self.link_map.get(&object) {
            return link;
        }
        let link = self.links.push(GepLink::default());
        self.link_map.insert(object, link);
        link
    }

    fn represent_object(
        &mut self,
        ctx: &ModuleCtx,
        func: &Function,
        objects: &ObjectArena,
        object: ObjectId,
    ) -> bool {
        match &objects[object] {
            StackObject::Leaf { offset_value } => {
                self.represent_leaf(ctx, func, object, *offset_value)
            }
            StackObject::Structure { fields } => {
                self.represent_structure(ctx, func, objects, object, fields)
            }
        }
    }

    /// Reconciles the types witnessed for one leaf. All candidates start at
    /// offset 0, so the window stays overlapping; the reduce must collapse
    /// to a single field or the leaf is unrepresentable.
    fn represent_leaf(
        &mut self,
        ctx: &ModuleCtx,
        func: &Function,
        object: ObjectId,
        offset_value: ValueId,
    ) -> bool {
        let types = super::object::union_types(func, ctx, offset_value);

        let mut window = AccessWindow::new();
        for ty in types {
            if !window.insert(ctx, 0, object, ty) {
                return false;
            }
        }

        let Some(reduced) = window.reduce(ctx) else {
            trace!(?offset_value, "leaf with no witnessed access");
            return false;
        };
        if reduced.field_count != 1 {
            trace!(?offset_value, "irreconcilable leaf types");
            return false;
        }

        debug_assert!(!self.type_map.contains_key(&object));
        self.type_map.insert(object, reduced.ty);
        self.leaves.push(object);
        true
    }

    fn represent_structure(
        &mut self,
        ctx: &ModuleCtx,
        func: &Function,
        objects: &ObjectArena,
        object: ObjectId,
        fields: &[super::object::StructureField],
    ) -> bool {
        let this_link = self.link_for(object);
        let mut field_types: Vec<Type> = Vec::new();
        let mut window = AccessWindow::new();

        for field in fields {
            if !self.represent_object(ctx, func, objects, field.object) {
                // A child that survived discovery but can't be laid out
                // poisons the whole structure.
                return false;
            }

            let field_ty = self.type_map[&field.object];
            if window.insert(ctx, field.offset, field.object, field_ty) {
                // Keep accumulating until accesses no longer overlap.
                continue;
            }

            let Some(reduced) = self.reduce_struct_field(ctx, &window, this_link, field_types.len())
            else {
                return false;
            };
            field_types.push(reduced);

            let padding = field.offset - window.end_offset(ctx);
            if padding > 0 {
                field_types.push(ctx.make_array(Type::I8, padding as usize));
            }

            window.clear();
            window.insert(ctx, field.offset, field.object, field_ty);
        }

        if !window.is_empty() {
            let Some(reduced) = self.reduce_struct_field(ctx, &window, this_link, field_types.len())
            else {
                return false;
            };
            field_types.push(reduced);
        }

        let result_ty = ctx.make_struct(&field_types, true);
        debug_assert!(!self.type_map.contains_key(&object));
        self.type_map.insert(object, result_ty);
        true
    }

    /// Reduces one window into a field of the enclosing structure at
    /// position `index`, wiring the member links.
    fn reduce_struct_field(
        &mut self,
        ctx: &ModuleCtx,
        window: &AccessWindow,
        parent_link: LinkId,
        index: usize,
    ) -> Option<Type> {
        let reduced = window.reduce(ctx)?;

        if reduced.field_count == 1 {
            // Every member shares the field; diverging members get their
            // pointer bitcast at path resolution.
            for access in window.iter() {
                let field_link = self.link_for(access.object);
                self.links[field_link].set_index(index, access.ty);
                self.links[field_link].set_parent(parent_link);
            }
        } else {
            let structure_link = self.links.push(GepLink::default());
            self.links[structure_link].set_parent(parent_link);
            self.links[structure_link].set_index(index, reduced.ty);

            for access in window.iter() {
                let &gep_index = reduced.gep_indices.get(&access.object)?;
                let field_link = self.link_for(access.object);
                self.links[field_link].set_index(gep_index, access.ty);
                self.links[field_link].set_parent(structure_link);
            }
        }

        Some(reduced.ty)
    }

    /// Emits the instruction sequence computing a typed pointer to `object`
    /// from `base_pointer`, at the inserter's position.
    ///
    /// Indices accumulate lazily: an indexed-element instruction (plus a
    /// bitcast) is only flushed when the host's indexed type diverges from
    /// the link's expected type, which keeps every emitted gep
    /// type-consistent with its base.
    pub fn pointer_to(
        &self,
        ctx: &ModuleCtx,
        func: &mut Function,
        inserter: &mut InstInserter,
        object: ObjectId,
        base_pointer: ValueId,
    ) -> ValueId {
        let leaf_link = self.link_map[&object];
        let mut chain: SmallVec<[LinkId; 4]> = smallvec![];
        let mut cursor = Some(leaf_link);
        while let Some(link) = cursor {
            chain.push(link);
            cursor = self.links[link].parent.expand();
        }
        chain.reverse();

        let zero = func.dfg.make_imm_value(0i64);
        let mut result = base_pointer;
        let mut index_values: SmallVec<[ValueId; 4]> = smallvec![];
        let mut index_consts: SmallVec<[usize; 4]> = smallvec![];

        for link in chain {
            let link = &self.links[link];
            let index = link.index.expect("link index is set during layout");
            let expected = link.expected.expect("link type is set during layout");

            // The leading index of each emitted gep steps through the base
            // pointer and is 64-bit; interior indices are field positions.
            let index_value = if index_values.is_empty() {
                func.dfg.make_imm_value(index as i64)
            } else {
                func.dfg.make_imm_value(index as i32)
            };
            index_values.push(index_value);
            index_consts.push(index);

            let base_ty = func.dfg.value_ty(result);
            if ctx.indexed_type(base_ty, &index_consts) != Some(expected) {
                let indexed = ctx
                    .indexed_type(base_ty, &index_consts)
                    .expect("gep path addresses a sub-object of its base");
                let mut args: SmallVec<[ValueId; 8]> = smallvec![result];
                args.extend(index_values.iter().copied());
                let gep_ty = ctx.make_ptr(indexed);
                let gep = emit(func, inserter, InstData::Gep { args }, gep_ty);

                let cast_ty = ctx.make_ptr(expected);
                result = emit(
                    func,
                    inserter,
                    InstData::Cast {
                        code: CastOp::Bitcast,
                        arg: gep,
                        ty: cast_ty,
                    },
                    cast_ty,
                );
                index_values = smallvec![zero];
                index_consts = smallvec![0];
            }
        }

        if index_consts.len() > 1 {
            let base_ty = func.dfg.value_ty(result);
            let indexed = ctx
                .indexed_type(base_ty, &index_consts)
                .expect("gep path addresses a sub-object of its base");
            let mut args: SmallVec<[ValueId; 8]> = smallvec![result];
            args.extend(index_values.iter().copied());
            let gep_ty = ctx.make_ptr(indexed);
            result = emit(func, inserter, InstData::Gep { args }, gep_ty);
        }

        result
    }
}
