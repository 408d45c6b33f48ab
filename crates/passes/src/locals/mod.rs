//! Local variable identification.
//!
//! Reconstructs a function's on-stack locals as one typed composite: builds
//! an abstract stack model from the uses of the stack-pointer argument,
//! synthesizes a concrete layout for it, allocates that layout in the entry
//! block, and rewrites every recovered offset value to a pointer into the
//! allocation.
//!
//! This pass needs to run after argument recovery, which tags functions
//! with their stack-pointer argument.

mod classify;
mod frame;
mod object;
mod window;

use cranelift_entity::PrimaryMap;
use tracing::{debug, trace};

use relift_ir::{
    func_cursor::{CursorLocation, FuncCursor, InstInserter},
    CastOp, Function, InstData, Type, Value, ValueId,
};

use frame::StackFrame;
use object::{read_object, ObjectArena, StackObject};

/// The `--identify-locals` function pass: "Identify local variables".
#[derive(Debug, Default)]
pub struct IdentifyLocals {}

impl IdentifyLocals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs stack-frame recovery on one function. Returns `true` when the
    /// IR was modified.
    ///
    /// Every analysis failure is silent: the function is left untouched and
    /// carries no stack-frame marker, which is how callers detect that
    /// nothing was recovered.
    pub fn run(&mut self, func: &mut Function) -> bool {
        let Some(stack_pointer) = self.stack_pointer(func) else {
            return false;
        };

        let ctx = func.dfg.ctx.clone();
        let mut objects: ObjectArena = PrimaryMap::new();
        let Some(root) = read_object(func, &mut objects, stack_pointer) else {
            return false;
        };
        if !matches!(objects[root], StackObject::Structure { .. }) {
            // A stack pointer without offset arithmetic models no locals.
            trace!("stack pointer is not a structure base");
            return false;
        }

        let Some(frame) = StackFrame::represent(&ctx, func, &objects, root) else {
            return false;
        };
        let Some(entry) = func.layout.entry_block() else {
            return false;
        };

        let root_ty = frame
            .naive_type(root)
            .expect("represented root has a type");
        let alloca = func.dfg.make_inst(InstData::Alloca { ty: root_ty });
        func.layout.prepend_inst(alloca, entry);
        let frame_ptr_ty = ctx.make_ptr(root_ty);
        let frame_ptr = func.dfg.make_value(Value::Inst {
            inst: alloca,
            ty: frame_ptr_ty,
        });
        func.dfg.attach_result(alloca, frame_ptr);
        func.dfg.set_stack_frame(alloca);
        debug!(leaves = frame.leaves().len(), "recovered stack frame");

        let mut inserter = InstInserter::at_location(CursorLocation::NoWhere);
        for &leaf in frame.leaves() {
            let StackObject::Leaf { offset_value } = objects[leaf] else {
                unreachable!("only leaves are recorded for rewriting");
            };

            // Rewrite next to the offset computation when there is one; the
            // implicit leaf for the stack pointer itself has none, so its
            // path goes right after the allocation, where it dominates
            // every use.
            match func.dfg.value_inst(offset_value) {
                Some(inst) => inserter.set_before(func, inst),
                None => inserter.set_location(CursorLocation::At(alloca)),
            }

            let pointer = frame.pointer_to(&ctx, func, &mut inserter, leaf, frame_ptr);
            let offset_ty = func.dfg.value_ty(offset_value);
            let as_int = emit(
                func,
                &mut inserter,
                InstData::Cast {
                    code: CastOp::PtrToInt,
                    arg: pointer,
                    ty: offset_ty,
                },
                offset_ty,
            );
            func.dfg.change_to_alias(offset_value, as_int);
        }

        true
    }

    fn stack_pointer(&self, func: &Function) -> Option<ValueId> {
        let idx = func.attrs.stack_pointer?;
        func.arg_values.get(idx).copied()
    }
}

/// Inserts `data` at the cursor, attaches a result of type `ty`, and leaves
/// the cursor on the new instruction.
fn emit(func: &mut Function, inserter: &mut InstInserter, data: InstData, ty: Type) -> ValueId {
    inserter.insert_inst_data_with_result(func, data, ty)
}
