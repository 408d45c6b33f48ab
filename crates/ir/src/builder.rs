//! Builders for constructing modules and functions programmatically.
//!
//! Lifter frontends and tests emit SSA directly, so the function builder is
//! positional: append blocks, switch between them, insert instructions at
//! the cursor.

use rustc_hash::FxHashMap;

use crate::{
    dfg::BlockId,
    func_cursor::{CursorLocation, FuncCursor, InstInserter},
    function::{Function, Signature},
    inst::InstData,
    isa::TypeLayout,
    module::{FuncRef, Module, ModuleCtx},
    types::Type,
    value::{Immediate, Value, ValueId},
};

pub struct ModuleBuilder {
    module: Module,

    /// Map function name -> FuncRef to avoid duplicated declaration.
    declared_funcs: FxHashMap<String, FuncRef>,
}

impl ModuleBuilder {
    pub fn new(type_layout: &'static dyn TypeLayout) -> Self {
        Self {
            module: Module::new(ModuleCtx::new(type_layout)),
            declared_funcs: FxHashMap::default(),
        }
    }

    pub fn ctx(&self) -> &ModuleCtx {
        &self.module.ctx
    }

    pub fn declare_function(&mut self, sig: Signature) -> FuncRef {
        if let Some(&func_ref) = self.declared_funcs.get(sig.name()) {
            return func_ref;
        }

        let name = sig.name().to_string();
        let func = Function::new(&self.module.ctx, sig);
        let func_ref = self.module.funcs.push(func);
        self.declared_funcs.insert(name, func_ref);
        func_ref
    }

    pub fn lookup_func(&self, name: &str) -> Option<FuncRef> {
        self.declared_funcs.get(name).copied()
    }

    pub fn ptr_type(&self, ty: Type) -> Type {
        self.module.ctx.make_ptr(ty)
    }

    pub fn declare_array_type(&self, elem: Type, len: usize) -> Type {
        self.module.ctx.make_array(elem, len)
    }

    pub fn declare_struct_type(&self, fields: &[Type], packed: bool) -> Type {
        self.module.ctx.make_struct(fields, packed)
    }

    /// Starts building the body of a declared function. The finished body is
    /// written back with [`FunctionBuilder::finish`].
    pub fn func_builder<C>(&mut self, func_ref: FuncRef) -> FunctionBuilder<C>
    where
        C: FuncCursor,
    {
        let sig = self.module.funcs[func_ref].sig.clone();
        let fresh = Function::new(&self.module.ctx, sig);
        let func = std::mem::replace(&mut self.module.funcs[func_ref], fresh);
        FunctionBuilder {
            func,
            func_ref,
            ctx: self.module.ctx.clone(),
            cursor: C::at_location(CursorLocation::NoWhere),
        }
    }

    pub fn build(self) -> Module {
        self.module
    }
}

pub struct FunctionBuilder<C> {
    pub func: Function,
    func_ref: FuncRef,
    ctx: ModuleCtx,
    cursor: C,
}

impl<C> FunctionBuilder<C>
where
    C: FuncCursor,
{
    pub fn finish(self, module_builder: &mut ModuleBuilder) -> FuncRef {
        module_builder.module.funcs[self.func_ref] = self.func;
        self.func_ref
    }

    pub fn append_block(&mut self) -> BlockId {
        let block = self.func.dfg.make_block();
        self.func.layout.append_block(block);
        block
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.cursor.set_location(CursorLocation::BlockBottom(block));
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.cursor.block(&self.func)
    }

    pub fn make_imm_value<Imm>(&mut self, imm: Imm) -> ValueId
    where
        Imm: Into<Immediate>,
    {
        self.func.dfg.make_imm_value(imm)
    }

    pub fn make_undef_value(&mut self, ty: Type) -> ValueId {
        self.func.dfg.make_undef_value(ty)
    }

    /// Inserts an instruction at the cursor and returns a result value of
    /// type `ret_ty`.
    pub fn insert_inst(&mut self, data: InstData, ret_ty: Type) -> ValueId {
        let inst = self.cursor.insert_inst_data(&mut self.func, data);
        let result = self.func.dfg.make_value(Value::Inst { inst, ty: ret_ty });
        self.func.dfg.attach_result(inst, result);
        result
    }

    /// Inserts an instruction with no result value (stores, terminators).
    pub fn insert_inst_no_result(&mut self, data: InstData) {
        self.cursor.insert_inst_data(&mut self.func, data);
    }

    pub fn ptr_type(&self, ty: Type) -> Type {
        self.ctx.make_ptr(ty)
    }

    pub fn declare_array_type(&self, elem: Type, len: usize) -> Type {
        self.ctx.make_array(elem, len)
    }

    pub fn declare_struct_type(&self, fields: &[Type], packed: bool) -> Type {
        self.ctx.make_struct(fields, packed)
    }

    pub fn type_of(&self, value: ValueId) -> Type {
        self.func.dfg.value_ty(value)
    }

    pub fn args(&self) -> &[ValueId] {
        &self.func.arg_values
    }

    pub fn ctx(&self) -> &ModuleCtx {
        &self.ctx
    }
}

pub mod test_util {
    use super::*;
    use crate::{isa::AMD64, linkage::Linkage};

    pub fn test_module_builder() -> ModuleBuilder {
        ModuleBuilder::new(&AMD64)
    }

    pub fn test_func_builder(
        mb: &mut ModuleBuilder,
        args: &[Type],
        ret_ty: Type,
    ) -> FunctionBuilder<InstInserter> {
        let sig = Signature::new("test_func", Linkage::Public, args, ret_ty);
        let func_ref = mb.declare_function(sig);
        mb.func_builder(func_ref)
    }

    pub fn dump_func(module: &Module, func_ref: FuncRef) -> String {
        format!("{}", module.funcs[func_ref])
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use crate::{
        inst::{BinaryOp, CastOp, InstData},
        types::Type,
    };

    #[test]
    fn entry_block() {
        let mut mb = test_module_builder();
        let mut builder = test_func_builder(&mut mb, &[], Type::Unit);

        let b0 = builder.append_block();
        builder.switch_to_block(b0);
        let v0 = builder.make_imm_value(1i8);
        let v1 = builder.make_imm_value(2i8);
        let v2 = builder.insert_inst(
            InstData::Binary {
                code: BinaryOp::Add,
                args: [v0, v1],
            },
            Type::I8,
        );
        builder.insert_inst(
            InstData::Binary {
                code: BinaryOp::Sub,
                args: [v2, v0],
            },
            Type::I8,
        );
        builder.insert_inst_no_result(InstData::Return { arg: None });

        let func_ref = builder.finish(&mut mb);
        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func public %test_func() -> unit {
    block0:
        v2.i8 = add 1.i8 2.i8;
        v3.i8 = sub v2 1.i8;
        return;
}
"
        );
    }

    #[test]
    fn entry_block_with_args() {
        let mut mb = test_module_builder();
        let mut builder = test_func_builder(&mut mb, &[Type::I32, Type::I64], Type::Unit);

        let entry_block = builder.append_block();
        builder.switch_to_block(entry_block);
        let args = builder.args();
        assert_eq!(args.len(), 2);
        let (arg0, arg1) = (args[0], args[1]);
        let v3 = builder.insert_inst(
            InstData::Cast {
                code: CastOp::Sext,
                arg: arg0,
                ty: Type::I64,
            },
            Type::I64,
        );
        builder.insert_inst(
            InstData::Binary {
                code: BinaryOp::Mul,
                args: [v3, arg1],
            },
            Type::I64,
        );
        builder.insert_inst_no_result(InstData::Return { arg: None });

        let func_ref = builder.finish(&mut mb);
        let module = mb.build();
        assert_eq!(
            dump_func(&module, func_ref),
            "func public %test_func(v0.i32, v1.i64) -> unit {
    block0:
        v2.i64 = sext v0 i64;
        v3.i64 = mul v2 v1;
        return;
}
"
        );
    }
}
