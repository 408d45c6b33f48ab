//! Relift IR data flow graph.

use std::collections::BTreeSet;

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashMap;

use crate::{
    inst::{InstData, InstId},
    module::ModuleCtx,
    types::Type,
    value::{Immediate, Value, ValueId},
};

pub struct DataFlowGraph {
    pub ctx: ModuleCtx,
    #[doc(hidden)]
    pub blocks: PrimaryMap<BlockId, Block>,
    #[doc(hidden)]
    pub values: PrimaryMap<ValueId, Value>,
    insts: PrimaryMap<InstId, InstData>,
    inst_results: SecondaryMap<InstId, PackedOption<ValueId>>,
    inst_attrs: SecondaryMap<InstId, InstAttrs>,
    immediates: FxHashMap<Immediate, ValueId>,
    users: SecondaryMap<ValueId, BTreeSet<InstId>>,
}

impl DataFlowGraph {
    pub fn new(ctx: ModuleCtx) -> Self {
        Self {
            ctx,
            blocks: PrimaryMap::default(),
            values: PrimaryMap::default(),
            insts: PrimaryMap::default(),
            inst_results: SecondaryMap::default(),
            inst_attrs: SecondaryMap::default(),
            immediates: FxHashMap::default(),
            users: SecondaryMap::default(),
        }
    }

    pub fn make_block(&mut self) -> BlockId {
        self.blocks.push(Block::new())
    }

    pub fn make_value(&mut self, value: Value) -> ValueId {
        self.values.push(value)
    }

    pub fn make_inst(&mut self, inst: InstData) -> InstId {
        let inst_id = self.insts.push(inst);
        self.track_operand_uses(inst_id);
        inst_id
    }

    /// Returns the interned value for an immediate, creating it on first
    /// use.
    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        let imm: Immediate = imm.into();
        if let Some(&value) = self.immediates.get(&imm) {
            return value;
        }

        let value = self.make_value(Value::Immediate { imm, ty: imm.ty() });
        self.immediates.insert(imm, value);
        value
    }

    pub fn make_undef_value(&mut self, ty: Type) -> ValueId {
        self.make_value(Value::Undef { ty })
    }

    pub fn make_arg_value(&mut self, ty: Type, idx: usize) -> Value {
        Value::Arg { ty, idx }
    }

    pub fn attach_result(&mut self, inst_id: InstId, value_id: ValueId) {
        debug_assert!(self.inst_results[inst_id].is_none());
        self.inst_results[inst_id] = value_id.into();
    }

    pub fn inst(&self, inst_id: InstId) -> &InstData {
        &self.insts[inst_id]
    }

    pub fn value(&self, value_id: ValueId) -> &Value {
        &self.values[value_id]
    }

    pub fn value_ty(&self, value_id: ValueId) -> Type {
        match &self.values[value_id] {
            Value::Inst { ty, .. }
            | Value::Arg { ty, .. }
            | Value::Immediate { ty, .. }
            | Value::Undef { ty } => *ty,
        }
    }

    /// Returns the defining instruction if the value is an instruction
    /// result.
    pub fn value_inst(&self, value_id: ValueId) -> Option<InstId> {
        match self.values[value_id] {
            Value::Inst { inst, .. } => Some(inst),
            _ => None,
        }
    }

    pub fn value_imm(&self, value_id: ValueId) -> Option<Immediate> {
        match self.values[value_id] {
            Value::Immediate { imm, .. } => Some(imm),
            _ => None,
        }
    }

    /// Returns all instructions that use `value_id`, in instruction-creation
    /// order. The order is part of the pass determinism contract.
    pub fn users(&self, value_id: ValueId) -> impl Iterator<Item = &InstId> {
        self.users[value_id].iter()
    }

    pub fn users_num(&self, value_id: ValueId) -> usize {
        self.users[value_id].len()
    }

    pub fn inst_result(&self, inst_id: InstId) -> Option<ValueId> {
        self.inst_results[inst_id].expand()
    }

    pub fn is_terminator(&self, inst_id: InstId) -> bool {
        self.insts[inst_id].is_terminator()
    }

    /// Rewrites every use of `value` to `alias`, migrating the use records
    /// onto the alias. The rewritten value keeps its definition and ends up
    /// userless.
    pub fn change_to_alias(&mut self, value: ValueId, alias: ValueId) {
        let users = std::mem::take(&mut self.users[value]);
        for &user in &users {
            self.insts[user].visit_values_mut(&mut |operand| {
                if *operand == value {
                    *operand = alias;
                }
            });
        }
        self.users[alias].extend(users);
    }

    /// Marks the instruction as the function's recovered stack frame.
    pub fn set_stack_frame(&mut self, inst_id: InstId) {
        self.inst_attrs[inst_id].stack_frame = true;
    }

    pub fn is_stack_frame(&self, inst_id: InstId) -> bool {
        self.inst_attrs[inst_id].stack_frame
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    fn track_operand_uses(&mut self, inst_id: InstId) {
        let inst = &self.insts[inst_id];
        inst.visit_values(&mut |operand| {
            self.users[operand].insert(inst_id);
        })
    }
}

/// An opaque reference to [`Block`].
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);
entity_impl!(BlockId, "block");

/// A block data definition. Program order of blocks and their instructions
/// is held by [`crate::Layout`], not here.
#[derive(Debug, Clone, Default)]
pub struct Block {}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Instruction-level metadata produced by recovery passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InstAttrs {
    /// Set on the allocation that models the function's on-stack locals.
    pub stack_frame: bool,
}
