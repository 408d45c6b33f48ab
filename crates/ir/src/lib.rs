pub mod builder;
pub mod dfg;
pub mod func_cursor;
pub mod function;
pub mod inst;
pub mod ir_writer;
pub mod isa;
pub mod layout;
pub mod linkage;
pub mod module;
pub mod types;
pub mod value;

pub use dfg::{Block, BlockId, DataFlowGraph, InstAttrs};
pub use function::{FuncAttrs, Function, Signature};
pub use inst::{BinaryOp, CastOp, InstData, InstId};
pub use layout::Layout;
pub use linkage::Linkage;
pub use module::{FuncRef, Module, ModuleCtx};
pub use types::Type;
pub use value::{Immediate, Value, ValueId};
