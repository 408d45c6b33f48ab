//! Function, signature and function-level metadata.

use smallvec::SmallVec;

use crate::{
    dfg::DataFlowGraph,
    layout::Layout,
    linkage::Linkage,
    module::ModuleCtx,
    types::Type,
    value::ValueId,
};

pub struct Function {
    pub sig: Signature,
    pub arg_values: SmallVec<[ValueId; 8]>,

    pub dfg: DataFlowGraph,
    pub layout: Layout,

    /// Metadata attached by earlier recovery stages.
    pub attrs: FuncAttrs,
}

impl Function {
    pub fn new(ctx: &ModuleCtx, sig: Signature) -> Self {
        let mut dfg = DataFlowGraph::new(ctx.clone());
        let mut arg_values = SmallVec::new();
        for (idx, &ty) in sig.args().iter().enumerate() {
            let arg = dfg.make_arg_value(ty, idx);
            arg_values.push(dfg.make_value(arg));
        }

        Self {
            sig,
            arg_values,
            dfg,
            layout: Layout::default(),
            attrs: FuncAttrs::default(),
        }
    }

    pub fn ctx(&self) -> &ModuleCtx {
        &self.dfg.ctx
    }
}

/// Function-level metadata.
///
/// Argument recovery runs before local identification and records which
/// formal argument carries the machine stack pointer. Functions without the
/// tag are skipped by stack-frame recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuncAttrs {
    pub stack_pointer: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: String,
    linkage: Linkage,
    args: SmallVec<[Type; 8]>,
    ret_ty: Type,
}

impl Signature {
    pub fn new(name: &str, linkage: Linkage, args: &[Type], ret_ty: Type) -> Self {
        Self {
            name: name.to_string(),
            linkage,
            args: args.into(),
            ret_ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn args(&self) -> &[Type] {
        &self.args
    }

    pub fn ret_ty(&self) -> Type {
        self.ret_ty
    }
}
