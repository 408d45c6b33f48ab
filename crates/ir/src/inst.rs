//! Relift IR instruction definitions.
//!
//! A single [`InstData`] enum covers the instruction vocabulary a lifted
//! function uses: integer arithmetic, casts, memory access through explicit
//! pointer casts, indexed-element address computation, stack allocation,
//! calls, phis and block terminators.

use smallvec::SmallVec;

use crate::{dfg::BlockId, module::FuncRef, types::Type, value::ValueId};

/// An opaque reference to [`InstData`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct InstId(pub u32);
cranelift_entity::entity_impl!(InstId);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstData {
    /// Binary arithmetic or bitwise instruction.
    Binary { code: BinaryOp, args: [ValueId; 2] },

    /// Width or representation change; `ty` is the result type.
    Cast {
        code: CastOp,
        arg: ValueId,
        ty: Type,
    },

    /// Load a value of type `ty` from memory.
    Mload { addr: ValueId, ty: Type },

    /// Store `value` of type `ty` to memory.
    Mstore {
        addr: ValueId,
        value: ValueId,
        ty: Type,
    },

    /// Compute a typed pointer to a sub-object of a composite.
    /// `args[0]` is the base pointer, the rest are indices, one per level.
    Gep { args: SmallVec<[ValueId; 8]> },

    /// Reserve stack storage for a value of type `ty`.
    Alloca { ty: Type },

    Call {
        callee: FuncRef,
        args: SmallVec<[ValueId; 8]>,
        ret_ty: Type,
    },

    Phi {
        args: Vec<(ValueId, BlockId)>,
        ty: Type,
    },

    /// Unconditional jump.
    Jump { dest: BlockId },

    /// Branch to `nz_dest` if `cond` is non-zero, `z_dest` otherwise.
    Br {
        cond: ValueId,
        nz_dest: BlockId,
        z_dest: BlockId,
    },

    Return { arg: Option<ValueId> },
}

impl InstData {
    pub fn visit_values(&self, f: &mut impl FnMut(ValueId)) {
        match self {
            Self::Binary { args, .. } => args.iter().copied().for_each(f),
            Self::Cast { arg, .. } => f(*arg),
            Self::Mload { addr, .. } => f(*addr),
            Self::Mstore { addr, value, .. } => {
                f(*addr);
                f(*value);
            }
            Self::Gep { args } | Self::Call { args, .. } => args.iter().copied().for_each(f),
            Self::Alloca { .. } | Self::Jump { .. } => {}
            Self::Phi { args, .. } => args.iter().for_each(|(value, _)| f(*value)),
            Self::Br { cond, .. } => f(*cond),
            Self::Return { arg } => {
                if let Some(arg) = arg {
                    f(*arg)
                }
            }
        }
    }

    pub fn visit_values_mut(&mut self, f: &mut impl FnMut(&mut ValueId)) {
        match self {
            Self::Binary { args, .. } => args.iter_mut().for_each(f),
            Self::Cast { arg, .. } => f(arg),
            Self::Mload { addr, .. } => f(addr),
            Self::Mstore { addr, value, .. } => {
                f(addr);
                f(value);
            }
            Self::Gep { args } | Self::Call { args, .. } => args.iter_mut().for_each(f),
            Self::Alloca { .. } | Self::Jump { .. } => {}
            Self::Phi { args, .. } => args.iter_mut().for_each(|(value, _)| f(value)),
            Self::Br { cond, .. } => f(cond),
            Self::Return { arg } => {
                if let Some(arg) = arg {
                    f(arg)
                }
            }
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Self::Jump { .. } | Self::Br { .. } | Self::Return { .. })
    }

    pub fn as_text(&self) -> &'static str {
        match self {
            Self::Binary { code, .. } => code.as_str(),
            Self::Cast { code, .. } => code.as_str(),
            Self::Mload { .. } => "mload",
            Self::Mstore { .. } => "mstore",
            Self::Gep { .. } => "gep",
            Self::Alloca { .. } => "alloca",
            Self::Call { .. } => "call",
            Self::Phi { .. } => "phi",
            Self::Jump { .. } => "jump",
            Self::Br { .. } => "br",
            Self::Return { .. } => "return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Sext,
    Zext,
    Trunc,
    Bitcast,
    IntToPtr,
    PtrToInt,
}

impl CastOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sext => "sext",
            Self::Zext => "zext",
            Self::Trunc => "trunc",
            Self::Bitcast => "bitcast",
            Self::IntToPtr => "int_to_ptr",
            Self::PtrToInt => "ptr_to_int",
        }
    }
}
