//! Program order of blocks and instructions.
//!
//! Order lives outside the [`crate::DataFlowGraph`]: blocks form one linked
//! chain, and each block carries a linked chain of instructions. Links are
//! stored as [`PackedOption`] side tables, so an unlisted entity costs
//! nothing. The surface is shaped by its two consumers: cursors, which only
//! ever prepend, append, or insert after a known instruction, and the
//! writer, which walks chains front to back.

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};

use crate::{dfg::BlockId, inst::InstId};

#[derive(Clone, Default)]
pub struct Layout {
    block_links: SecondaryMap<BlockId, BlockLink>,
    inst_links: SecondaryMap<InstId, InstLink>,
    entry_block: PackedOption<BlockId>,
    last_block: PackedOption<BlockId>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.entry_block.expand()
    }

    pub fn is_block_inserted(&self, block: BlockId) -> bool {
        self.block_links[block].inserted
    }

    pub fn is_inst_inserted(&self, inst: InstId) -> bool {
        self.inst_links[inst].block.is_some()
    }

    pub fn first_inst_of(&self, block: BlockId) -> Option<InstId> {
        debug_assert!(self.is_block_inserted(block));
        self.block_links[block].first_inst.expand()
    }

    pub fn last_inst_of(&self, block: BlockId) -> Option<InstId> {
        debug_assert!(self.is_block_inserted(block));
        self.block_links[block].last_inst.expand()
    }

    pub fn prev_inst_of(&self, inst: InstId) -> Option<InstId> {
        debug_assert!(self.is_inst_inserted(inst));
        self.inst_links[inst].prev.expand()
    }

    pub fn inst_block(&self, inst: InstId) -> BlockId {
        debug_assert!(self.is_inst_inserted(inst));
        self.inst_links[inst].block.unwrap()
    }

    pub fn iter_block(&self) -> impl Iterator<Item = BlockId> + '_ {
        std::iter::successors(self.entry_block.expand(), |&block| {
            self.block_links[block].next.expand()
        })
    }

    pub fn iter_inst(&self, block: BlockId) -> impl Iterator<Item = InstId> + '_ {
        debug_assert!(self.is_block_inserted(block));
        std::iter::successors(self.block_links[block].first_inst.expand(), |&inst| {
            self.inst_links[inst].next.expand()
        })
    }

    /// Appends the block at the end of the function. The first appended
    /// block becomes the entry block.
    pub fn append_block(&mut self, block: BlockId) {
        debug_assert!(!self.is_block_inserted(block));

        self.block_links[block].inserted = true;
        match self.last_block.expand() {
            Some(last) => self.block_links[last].next = block.into(),
            None => self.entry_block = block.into(),
        }
        self.last_block = block.into();
    }

    pub fn append_inst(&mut self, inst: InstId, block: BlockId) {
        let prev = self.block_links[block].last_inst.expand();
        self.attach_inst(inst, block, prev, None);
    }

    pub fn prepend_inst(&mut self, inst: InstId, block: BlockId) {
        let next = self.block_links[block].first_inst.expand();
        self.attach_inst(inst, block, None, next);
    }

    pub fn insert_inst_after(&mut self, inst: InstId, after: InstId) {
        let block = self.inst_block(after);
        let next = self.inst_links[after].next.expand();
        self.attach_inst(inst, block, Some(after), next);
    }

    /// Splices `inst` into `block`'s chain between `prev` and `next`, either
    /// of which may be the chain end.
    fn attach_inst(
        &mut self,
        inst: InstId,
        block: BlockId,
        prev: Option<InstId>,
        next: Option<InstId>,
    ) {
        debug_assert!(self.is_block_inserted(block));
        debug_assert!(!self.is_inst_inserted(inst));

        self.inst_links[inst] = InstLink {
            block: block.into(),
            prev: prev.into(),
            next: next.into(),
        };
        match prev {
            Some(prev) => self.inst_links[prev].next = inst.into(),
            None => self.block_links[block].first_inst = inst.into(),
        }
        match next {
            Some(next) => self.inst_links[next].prev = inst.into(),
            None => self.block_links[block].last_inst = inst.into(),
        }
    }
}

#[derive(Clone, Default)]
struct BlockLink {
    next: PackedOption<BlockId>,
    first_inst: PackedOption<InstId>,
    last_inst: PackedOption<InstId>,
    /// An empty block at the chain ends has all-none links, so membership
    /// is tracked explicitly.
    inserted: bool,
}

#[derive(Clone, Default)]
struct InstLink {
    block: PackedOption<BlockId>,
    prev: PackedOption<InstId>,
    next: PackedOption<InstId>,
}
