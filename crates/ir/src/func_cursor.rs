//! Cursors for positional instruction insertion.

use crate::{
    dfg::BlockId,
    function::Function,
    inst::{InstData, InstId},
    types::Type,
    value::{Value, ValueId},
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorLocation {
    At(InstId),
    BlockTop(BlockId),
    BlockBottom(BlockId),
    #[default]
    NoWhere,
}

pub trait FuncCursor {
    fn at_location(loc: CursorLocation) -> Self;
    fn set_location(&mut self, loc: CursorLocation);
    fn loc(&self) -> CursorLocation;

    fn set_to_entry(&mut self, func: &Function) {
        let loc = if let Some(entry) = func.layout.entry_block() {
            CursorLocation::BlockTop(entry)
        } else {
            CursorLocation::NoWhere
        };

        self.set_location(loc);
    }

    /// Positions the cursor so the next insertion lands immediately before
    /// `inst`.
    fn set_before(&mut self, func: &Function, inst: InstId) {
        let loc = match func.layout.prev_inst_of(inst) {
            Some(prev) => CursorLocation::At(prev),
            None => CursorLocation::BlockTop(func.layout.inst_block(inst)),
        };
        self.set_location(loc);
    }

    fn insert_inst(&mut self, func: &mut Function, inst: InstId) {
        match self.loc() {
            CursorLocation::At(at) => func.layout.insert_inst_after(inst, at),
            CursorLocation::BlockTop(block) => func.layout.prepend_inst(inst, block),
            CursorLocation::BlockBottom(block) => func.layout.append_inst(inst, block),
            CursorLocation::NoWhere => panic!("cursor loc points to `NoWhere`"),
        }
    }

    /// Creates `data`, inserts it at the cursor, and advances the cursor to
    /// the new instruction so consecutive insertions stay in program order.
    fn insert_inst_data(&mut self, func: &mut Function, data: InstData) -> InstId {
        let inst = func.dfg.make_inst(data);
        self.insert_inst(func, inst);
        self.set_location(CursorLocation::At(inst));
        inst
    }

    /// Like [`Self::insert_inst_data`], but also attaches a result value of
    /// type `ty` and returns it.
    fn insert_inst_data_with_result(
        &mut self,
        func: &mut Function,
        data: InstData,
        ty: Type,
    ) -> ValueId {
        let inst = self.insert_inst_data(func, data);
        let result = func.dfg.make_value(Value::Inst { inst, ty });
        func.dfg.attach_result(inst, result);
        result
    }

    fn block(&self, func: &Function) -> Option<BlockId> {
        match self.loc() {
            CursorLocation::At(inst) => Some(func.layout.inst_block(inst)),
            CursorLocation::BlockTop(block) | CursorLocation::BlockBottom(block) => Some(block),
            CursorLocation::NoWhere => None,
        }
    }

    fn expect_block(&self, func: &Function) -> BlockId {
        self.block(func).expect("cursor loc points to `NoWhere`")
    }
}

#[derive(Debug, Default)]
pub struct InstInserter {
    loc: CursorLocation,
}

impl FuncCursor for InstInserter {
    fn at_location(loc: CursorLocation) -> Self {
        Self { loc }
    }

    fn set_location(&mut self, loc: CursorLocation) {
        self.loc = loc;
    }

    fn loc(&self) -> CursorLocation {
        self.loc
    }
}
