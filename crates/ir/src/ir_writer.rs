//! Textual IR dumping, for tests and debugging.

use std::fmt;

use cranelift_entity::EntityRef;

use crate::{
    function::Function,
    inst::{InstData, InstId},
    module::ModuleCtx,
    types::{CompoundType, Type},
    value::{Value, ValueId},
};

pub struct DisplayType<'a> {
    ty: Type,
    ctx: &'a ModuleCtx,
}

impl<'a> DisplayType<'a> {
    pub fn new(ty: Type, ctx: &'a ModuleCtx) -> Self {
        Self { ty, ctx }
    }
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.ty {
            Type::I1 => write!(f, "i1"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Unit => write!(f, "unit"),
            Type::Compound(cmpd_ref) => {
                let cmpd = self
                    .ctx
                    .with_ty_store(|s| s.resolve_compound(cmpd_ref).clone());
                match cmpd {
                    CompoundType::Ptr(ty) => {
                        write!(f, "*{}", DisplayType::new(ty, self.ctx))
                    }
                    CompoundType::Array { elem, len } => {
                        write!(f, "[{}; {len}]", DisplayType::new(elem, self.ctx))
                    }
                    CompoundType::Struct(def) => {
                        if def.packed {
                            write!(f, "<{{")?;
                        } else {
                            write!(f, "{{")?;
                        }
                        let mut delim = "";
                        for &field in &def.fields {
                            write!(f, "{delim}{}", DisplayType::new(field, self.ctx))?;
                            delim = ", ";
                        }
                        if def.packed {
                            write!(f, "}}>")
                        } else {
                            write!(f, "}}")
                        }
                    }
                    CompoundType::Func { args, ret_ty } => {
                        write!(f, "(")?;
                        let mut delim = "";
                        for &arg in &args {
                            write!(f, "{delim}{}", DisplayType::new(arg, self.ctx))?;
                            delim = ", ";
                        }
                        write!(f, ") -> {}", DisplayType::new(ret_ty, self.ctx))
                    }
                }
            }
        }
    }
}

struct DisplayValue<'a> {
    value: ValueId,
    func: &'a Function,
}

impl fmt::Display for DisplayValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.func.dfg.value(self.value) {
            Value::Immediate { imm, ty } => {
                write!(f, "{imm}.{}", DisplayType::new(*ty, self.func.ctx()))
            }
            Value::Undef { ty } => {
                write!(f, "undef.{}", DisplayType::new(*ty, self.func.ctx()))
            }
            _ => write!(f, "v{}", self.value.index()),
        }
    }
}

struct DisplayInst<'a> {
    inst: InstId,
    func: &'a Function,
}

impl DisplayInst<'_> {
    fn value(&self, value: ValueId) -> DisplayValue<'_> {
        DisplayValue {
            value,
            func: self.func,
        }
    }

    fn ty(&self, ty: Type) -> DisplayType<'_> {
        DisplayType::new(ty, self.func.ctx())
    }
}

impl fmt::Display for DisplayInst<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dfg = &self.func.dfg;
        if let Some(result) = dfg.inst_result(self.inst) {
            write!(
                f,
                "v{}.{} = ",
                result.index(),
                self.ty(dfg.value_ty(result))
            )?;
        }

        let data = dfg.inst(self.inst);
        write!(f, "{}", data.as_text())?;
        match data {
            InstData::Binary { args, .. } => {
                write!(f, " {} {}", self.value(args[0]), self.value(args[1]))
            }
            InstData::Cast { arg, ty, .. } => {
                write!(f, " {} {}", self.value(*arg), self.ty(*ty))
            }
            InstData::Mload { addr, ty } => {
                write!(f, " {} {}", self.value(*addr), self.ty(*ty))
            }
            InstData::Mstore { addr, value, ty } => write!(
                f,
                " {} {} {}",
                self.value(*addr),
                self.value(*value),
                self.ty(*ty)
            ),
            InstData::Gep { args } => {
                for &arg in args {
                    write!(f, " {}", self.value(arg))?;
                }
                Ok(())
            }
            InstData::Alloca { ty } => write!(f, " {}", self.ty(*ty)),
            InstData::Call { callee, args, .. } => {
                write!(f, " %fn{}", callee.index())?;
                for &arg in args {
                    write!(f, " {}", self.value(arg))?;
                }
                Ok(())
            }
            InstData::Phi { args, .. } => {
                for (value, block) in args {
                    write!(f, " ({} {block})", self.value(*value))?;
                }
                Ok(())
            }
            InstData::Jump { dest } => write!(f, " {dest}"),
            InstData::Br {
                cond,
                nz_dest,
                z_dest,
            } => write!(f, " {} {nz_dest} {z_dest}", self.value(*cond)),
            InstData::Return { arg } => {
                if let Some(arg) = arg {
                    write!(f, " {}", self.value(*arg))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "func {} %{}(", self.sig.linkage(), self.sig.name())?;
        let mut delim = "";
        for &arg in &self.arg_values {
            let ty = self.dfg.value_ty(arg);
            write!(f, "{delim}v{}.{}", arg.index(), DisplayType::new(ty, self.ctx()))?;
            delim = ", ";
        }
        writeln!(
            f,
            ") -> {} {{",
            DisplayType::new(self.sig.ret_ty(), self.ctx())
        )?;

        let mut first = true;
        for block in self.layout.iter_block() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "    {block}:")?;
            for inst in self.layout.iter_inst(block) {
                let inst = DisplayInst { inst, func: self };
                writeln!(f, "        {inst};")?;
            }
        }
        writeln!(f, "}}")
    }
}

/// Renders the function as text.
pub fn dump_func(func: &Function) -> String {
    format!("{func}")
}
