//! Offset classification for a stack base value.
//!
//! A base is an SSA integer that denotes "stack pointer plus a compile-time
//! offset". Its uses decide what kind of stack object it denotes: constant
//! additions make it a structure, variable additions an array, an
//! int-to-ptr cast a directly accessed slot.

use std::collections::BTreeMap;

use relift_ir::{BinaryOp, CastOp, Function, InstData, InstId, Value, ValueId};
use tracing::trace;

/// Classified uses of one base value.
///
/// `constant_offsets` is keyed by signed offset, so iteration is in
/// ascending offset order and the first key is the minimum.
#[derive(Debug, Default)]
pub(super) struct BaseUses {
    pub has_ptr_cast: bool,
    pub constant_offsets: BTreeMap<i64, InstId>,
    pub variable_offsets: Vec<InstId>,
}

impl BaseUses {
    pub fn min_offset(&self) -> Option<i64> {
        self.constant_offsets.keys().next().copied()
    }

    pub fn max_offset(&self) -> Option<i64> {
        self.constant_offsets.keys().next_back().copied()
    }
}

/// Partitions the users of `base`, or returns `None` when a user falls
/// outside the allow-list and the base can't be modeled as a stack object.
pub(super) fn analyze_base(func: &Function, base: ValueId) -> Option<BaseUses> {
    let mut uses = BaseUses::default();
    for &user in func.dfg.users(base) {
        match func.dfg.inst(user) {
            InstData::Binary {
                code: BinaryOp::Add,
                args,
            } => {
                let other = if args[0] == base { args[1] } else { args[0] };
                match func.dfg.value(other) {
                    Value::Immediate { imm, .. } => {
                        // First add wins when two adds carry the same offset.
                        uses.constant_offsets.entry(imm.as_i64()).or_insert(user);
                    }
                    _ => uses.variable_offsets.push(user),
                }
            }
            InstData::Binary { code, .. } => {
                trace!(?base, ?code, "base combined with a non-add operator");
                return None;
            }
            InstData::Cast {
                code: CastOp::IntToPtr,
                ..
            } => uses.has_ptr_cast = true,
            // Pointer-to-int and width casts don't witness a stack access.
            InstData::Cast { .. } => {}
            // A base escaping as a stored value or call argument still means
            // something lives at that offset; the type walk handles it.
            InstData::Mstore { value, .. } if *value == base => {}
            InstData::Call { .. } => {}
            InstData::Phi { .. } => {}
            other => {
                trace!(?base, user = other.as_text(), "unanalyzable base use");
                return None;
            }
        }
    }
    Some(uses)
}
