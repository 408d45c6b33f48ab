//! End-to-end tests for local variable identification.
//!
//! Functions are built the way the lifter emits them: a stack-pointer
//! argument tagged by argument recovery, integer offset arithmetic, and
//! loads/stores through int-to-ptr casts.

use relift_ir::{
    builder::test_util::*,
    builder::{FunctionBuilder, ModuleBuilder},
    func_cursor::InstInserter,
    BinaryOp, CastOp, Function, InstData, InstId, Linkage, Signature, Type, ValueId,
};
use relift_passes::{IdentifyLocals, Pass, Pipeline};

/// A builder for a function with a tagged stack-pointer argument, plus
/// extra arguments as requested.
fn sp_func_builder(mb: &mut ModuleBuilder, extra_args: &[Type]) -> FunctionBuilder<InstInserter> {
    let mut args = vec![Type::I64];
    args.extend_from_slice(extra_args);
    let mut fb = test_func_builder(mb, &args, Type::Unit);
    fb.func.attrs.stack_pointer = Some(0);
    fb
}

fn entry_insts(func: &Function) -> Vec<InstId> {
    let entry = func.layout.entry_block().unwrap();
    func.layout.iter_inst(entry).collect()
}

fn stack_frame_alloca(func: &Function) -> Option<InstId> {
    entry_insts(func)
        .into_iter()
        .find(|&inst| func.dfg.is_stack_frame(inst))
}

/// The constant indices of an indexed-element instruction, base excluded.
fn gep_indices(func: &Function, gep: InstId) -> Vec<usize> {
    let InstData::Gep { args } = func.dfg.inst(gep) else {
        panic!("expected a gep");
    };
    args[1..]
        .iter()
        .map(|&arg| func.dfg.value_imm(arg).unwrap().as_i64() as usize)
        .collect()
}

fn geps_in_order(func: &Function) -> Vec<InstId> {
    entry_insts(func)
        .into_iter()
        .filter(|&inst| matches!(func.dfg.inst(inst), InstData::Gep { .. }))
        .collect()
}

fn add_offset(fb: &mut FunctionBuilder<InstInserter>, base: ValueId, offset: i64) -> ValueId {
    let c = fb.make_imm_value(offset);
    fb.insert_inst(
        InstData::Binary {
            code: BinaryOp::Add,
            args: [base, c],
        },
        Type::I64,
    )
}

fn cast_to_ptr(fb: &mut FunctionBuilder<InstInserter>, value: ValueId, pointee: Type) -> ValueId {
    let ptr_ty = fb.ptr_type(pointee);
    fb.insert_inst(
        InstData::Cast {
            code: CastOp::IntToPtr,
            arg: value,
            ty: ptr_ty,
        },
        ptr_ty,
    )
}

fn store_imm32(fb: &mut FunctionBuilder<InstInserter>, addr: ValueId, value: i32) {
    let v = fb.make_imm_value(value);
    fb.insert_inst_no_result(InstData::Mstore {
        addr,
        value: v,
        ty: Type::I32,
    });
}

#[test]
fn empty_frame_is_a_no_op() {
    // S1: the stack pointer has no uses at all.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let func = &mut fb.func;
    let before = func.dfg.num_insts();
    assert!(!IdentifyLocals::new().run(func));
    assert_eq!(func.dfg.num_insts(), before);
    assert!(stack_frame_alloca(func).is_none());
}

#[test]
fn single_int32_local() {
    // S2: one local at sp+0, stored through an int-to-ptr cast.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];
    let p1 = add_offset(&mut fb, sp, 0);
    let ptr = cast_to_ptr(&mut fb, p1, Type::I32);
    store_imm32(&mut fb, ptr, 7);
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let ctx = fb.ctx().clone();
    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));

    let alloca = stack_frame_alloca(func).expect("stack frame emitted");
    let &InstData::Alloca { ty } = func.dfg.inst(alloca) else {
        panic!("expected an alloca");
    };
    assert_eq!(ty, ctx.make_struct(&[Type::I32], true));
    // The allocation sits at the entry block's first insertion point.
    assert_eq!(entry_insts(func)[0], alloca);

    // One gep (0, 0) computes the slot pointer; no bitcast is needed.
    let geps = geps_in_order(func);
    assert_eq!(geps.len(), 1);
    assert_eq!(gep_indices(func, geps[0]), vec![0, 0]);
    let gep_result = func.dfg.inst_result(geps[0]).unwrap();
    assert_eq!(func.dfg.value_ty(gep_result), ctx.make_ptr(Type::I32));

    // The offset value has been fully replaced by a pointer-to-int cast.
    assert_eq!(func.dfg.users_num(p1), 0);
    let InstData::Cast { code, arg, .. } = func.dfg.inst(func.dfg.value_inst(ptr).unwrap()) else {
        panic!("expected the original cast");
    };
    assert_eq!(*code, CastOp::IntToPtr);
    let replacement = func.dfg.value_inst(*arg).unwrap();
    assert!(matches!(
        func.dfg.inst(replacement),
        InstData::Cast {
            code: CastOp::PtrToInt,
            ..
        }
    ));
}

#[test]
fn two_non_overlapping_locals() {
    // S3: i32 at sp+0 and i64 at sp+4.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];

    let p0 = add_offset(&mut fb, sp, 0);
    let ptr0 = cast_to_ptr(&mut fb, p0, Type::I32);
    store_imm32(&mut fb, ptr0, 1);

    let p4 = add_offset(&mut fb, sp, 4);
    let ptr4 = cast_to_ptr(&mut fb, p4, Type::I64);
    let v = fb.make_imm_value(2i64);
    fb.insert_inst_no_result(InstData::Mstore {
        addr: ptr4,
        value: v,
        ty: Type::I64,
    });
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let ctx = fb.ctx().clone();
    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));

    let alloca = stack_frame_alloca(func).unwrap();
    let &InstData::Alloca { ty } = func.dfg.inst(alloca) else {
        panic!("expected an alloca");
    };
    assert_eq!(ty, ctx.make_struct(&[Type::I32, Type::I64], true));

    let geps = geps_in_order(func);
    assert_eq!(geps.len(), 2);
    assert_eq!(gep_indices(func, geps[0]), vec![0, 0]);
    assert_eq!(gep_indices(func, geps[1]), vec![0, 1]);
    assert_eq!(func.dfg.users_num(p0), 0);
    assert_eq!(func.dfg.users_num(p4), 0);
}

#[test]
fn overlapping_locals_share_a_sub_struct() {
    // S4: an i32 load at sp+0 overlaps an i16 store at sp+2.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];

    let p0 = add_offset(&mut fb, sp, 0);
    let ptr0 = cast_to_ptr(&mut fb, p0, Type::I32);
    fb.insert_inst(
        InstData::Mload {
            addr: ptr0,
            ty: Type::I32,
        },
        Type::I32,
    );

    let p2 = add_offset(&mut fb, sp, 2);
    let ptr2 = cast_to_ptr(&mut fb, p2, Type::I16);
    let v = fb.make_imm_value(5i16);
    fb.insert_inst_no_result(InstData::Mstore {
        addr: ptr2,
        value: v,
        ty: Type::I16,
    });
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let ctx = fb.ctx().clone();
    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));

    // The window reduces to a packed pair of i16s wrapped in the root.
    let sub = ctx.make_struct(&[Type::I16, Type::I16], true);
    let root = ctx.make_struct(&[sub], true);
    let alloca = stack_frame_alloca(func).unwrap();
    let &InstData::Alloca { ty } = func.dfg.inst(alloca) else {
        panic!("expected an alloca");
    };
    assert_eq!(ty, root);

    let geps = geps_in_order(func);
    assert_eq!(geps.len(), 2);

    // The i32 leaf takes field 0 and needs a bitcast to *i32.
    assert_eq!(gep_indices(func, geps[0]), vec![0, 0, 0]);
    let gep0_result = func.dfg.inst_result(geps[0]).unwrap();
    assert_eq!(func.dfg.value_ty(gep0_result), ctx.make_ptr(Type::I16));
    let bitcast = *func.dfg.users(gep0_result).next().unwrap();
    let &InstData::Cast { code, ty, .. } = func.dfg.inst(bitcast) else {
        panic!("expected a bitcast");
    };
    assert_eq!(code, CastOp::Bitcast);
    assert_eq!(ty, ctx.make_ptr(Type::I32));

    // The i16 leaf occupies field 1 with its own type; no cast.
    assert_eq!(gep_indices(func, geps[1]), vec![0, 0, 1]);
    let gep1_result = func.dfg.inst_result(geps[1]).unwrap();
    assert_eq!(func.dfg.value_ty(gep1_result), ctx.make_ptr(Type::I16));

    assert_eq!(func.dfg.users_num(p0), 0);
    assert_eq!(func.dfg.users_num(p2), 0);
}

#[test]
fn untyped_slot_defaults_to_byte() {
    // S5: sp+8 escapes as a call argument and is never loaded or stored.
    let mut mb = test_module_builder();
    let callee = mb.declare_function(Signature::new(
        "callee",
        Linkage::External,
        &[Type::I64],
        Type::Unit,
    ));
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];

    let p8 = add_offset(&mut fb, sp, 8);
    fb.insert_inst_no_result(InstData::Call {
        callee,
        args: [p8].into_iter().collect(),
        ret_ty: Type::Unit,
    });
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let ctx = fb.ctx().clone();
    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));

    // The single slot normalizes to offset 0 and types as i8.
    let alloca = stack_frame_alloca(func).unwrap();
    let &InstData::Alloca { ty } = func.dfg.inst(alloca) else {
        panic!("expected an alloca");
    };
    assert_eq!(ty, ctx.make_struct(&[Type::I8], true));

    // The call now receives the pointer-to-int replacement.
    assert_eq!(func.dfg.users_num(p8), 0);
}

#[test]
fn variable_offset_bails_out() {
    // S6: sp + v for a non-constant v.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[Type::I64]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];
    let v = fb.args()[1];
    let p = fb.insert_inst(
        InstData::Binary {
            code: BinaryOp::Add,
            args: [sp, v],
        },
        Type::I64,
    );
    let ptr = cast_to_ptr(&mut fb, p, Type::I32);
    store_imm32(&mut fb, ptr, 1);
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let func = &mut fb.func;
    let before = func.dfg.num_insts();
    assert!(!IdentifyLocals::new().run(func));
    assert_eq!(func.dfg.num_insts(), before);
    assert!(stack_frame_alloca(func).is_none());
}

#[test]
fn missing_stack_pointer_tag_is_a_no_op() {
    let mut mb = test_module_builder();
    let mut fb = test_func_builder(&mut mb, &[Type::I64], Type::Unit);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];
    let p = add_offset(&mut fb, sp, 0);
    let ptr = cast_to_ptr(&mut fb, p, Type::I32);
    store_imm32(&mut fb, ptr, 1);
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let func = &mut fb.func;
    assert!(!IdentifyLocals::new().run(func));
    assert!(stack_frame_alloca(func).is_none());
}

#[test]
fn directly_accessed_stack_pointer_becomes_an_implicit_slot() {
    // The base itself is stored through (an i16), the same bytes carry an
    // i64 via sp+0, and an i32 lives at sp+8.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];

    let sp_ptr = cast_to_ptr(&mut fb, sp, Type::I16);
    let v = fb.make_imm_value(1i16);
    fb.insert_inst_no_result(InstData::Mstore {
        addr: sp_ptr,
        value: v,
        ty: Type::I16,
    });

    let p0 = add_offset(&mut fb, sp, 0);
    let ptr0 = cast_to_ptr(&mut fb, p0, Type::I64);
    let v = fb.make_imm_value(2i64);
    fb.insert_inst_no_result(InstData::Mstore {
        addr: ptr0,
        value: v,
        ty: Type::I64,
    });

    let p8 = add_offset(&mut fb, sp, 8);
    let ptr8 = cast_to_ptr(&mut fb, p8, Type::I32);
    store_imm32(&mut fb, ptr8, 3);
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let ctx = fb.ctx().clone();
    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));

    // The implicit i16 slot collapses onto the i64 field at offset 0.
    let alloca = stack_frame_alloca(func).unwrap();
    let &InstData::Alloca { ty } = func.dfg.inst(alloca) else {
        panic!("expected an alloca");
    };
    assert_eq!(ty, ctx.make_struct(&[Type::I64, Type::I32], true));

    // Every integer use of the stack pointer is rewritten, including the
    // offset adds feeding the other slots.
    assert_eq!(func.dfg.users_num(sp), 0);

    // The implicit slot's path is emitted right after the allocation: its
    // field holds an i64, so the pointer is bitcast down to *i16.
    let insts = entry_insts(func);
    assert_eq!(insts[0], alloca);
    assert!(matches!(func.dfg.inst(insts[1]), InstData::Gep { .. }));
    assert!(matches!(
        func.dfg.inst(insts[2]),
        InstData::Cast {
            code: CastOp::Bitcast,
            ..
        }
    ));
    assert!(matches!(
        func.dfg.inst(insts[3]),
        InstData::Cast {
            code: CastOp::PtrToInt,
            ..
        }
    ));
    let bitcast_result = func.dfg.inst_result(insts[2]).unwrap();
    assert_eq!(func.dfg.value_ty(bitcast_result), ctx.make_ptr(Type::I16));
}

#[test]
fn float_witness_outranks_integer_of_same_size() {
    // Two witnessed types at one slot: f32 and i32. Type priority picks the
    // float as the slot's naive type.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];

    let p0 = add_offset(&mut fb, sp, 0);
    let int_ptr = cast_to_ptr(&mut fb, p0, Type::I32);
    fb.insert_inst(
        InstData::Mload {
            addr: int_ptr,
            ty: Type::I32,
        },
        Type::I32,
    );
    let float_ptr = cast_to_ptr(&mut fb, p0, Type::F32);
    fb.insert_inst(
        InstData::Mload {
            addr: float_ptr,
            ty: Type::F32,
        },
        Type::F32,
    );
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let ctx = fb.ctx().clone();
    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));

    let alloca = stack_frame_alloca(func).unwrap();
    let &InstData::Alloca { ty } = func.dfg.inst(alloca) else {
        panic!("expected an alloca");
    };
    assert_eq!(ty, ctx.make_struct(&[Type::F32], true));
}

#[test]
fn second_run_is_idempotent() {
    // Property 1: a recovered function has no parseable stack offsets left.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];
    let p1 = add_offset(&mut fb, sp, 0);
    let ptr = cast_to_ptr(&mut fb, p1, Type::I32);
    store_imm32(&mut fb, ptr, 7);
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));
    let insts_after_first = func.dfg.num_insts();

    assert!(!IdentifyLocals::new().run(func));
    assert_eq!(func.dfg.num_insts(), insts_after_first);

    let frames = entry_insts(func)
        .into_iter()
        .filter(|&inst| func.dfg.is_stack_frame(inst))
        .count();
    assert_eq!(frames, 1);
}

#[test]
fn emitted_paths_match_source_offsets() {
    // Property 3: the byte offset of each leaf's path equals its
    // normalized stack offset.
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];

    for (offset, ty) in [(0i64, Type::I32), (4, Type::I64), (16, Type::I8)] {
        let p = add_offset(&mut fb, sp, offset);
        let ptr = cast_to_ptr(&mut fb, p, ty);
        fb.insert_inst(InstData::Mload { addr: ptr, ty }, ty);
    }
    fb.insert_inst_no_result(InstData::Return { arg: None });

    let ctx = fb.ctx().clone();
    let func = &mut fb.func;
    assert!(IdentifyLocals::new().run(func));

    // Non-overlapping slots with a 4-byte hole before offset 16.
    let expected_root = ctx.make_struct(
        &[
            Type::I32,
            Type::I64,
            ctx.make_array(Type::I8, 4),
            Type::I8,
        ],
        true,
    );
    let alloca = stack_frame_alloca(func).unwrap();
    let &InstData::Alloca { ty } = func.dfg.inst(alloca) else {
        panic!("expected an alloca");
    };
    assert_eq!(ty, expected_root);

    let frame_ptr_ty = ctx.make_ptr(expected_root);
    let geps = geps_in_order(func);
    assert_eq!(geps.len(), 3);
    for (gep, expected_offset) in geps.into_iter().zip([0usize, 4, 16]) {
        let indices = gep_indices(func, gep);
        assert_eq!(
            ctx.offset_of(frame_ptr_ty, &indices),
            Some(expected_offset)
        );
    }
}

#[test]
fn default_pipeline_recovers_locals() {
    let mut mb = test_module_builder();
    let mut fb = sp_func_builder(&mut mb, &[]);
    let b0 = fb.append_block();
    fb.switch_to_block(b0);
    let sp = fb.args()[0];
    let p1 = add_offset(&mut fb, sp, 0);
    let ptr = cast_to_ptr(&mut fb, p1, Type::I32);
    store_imm32(&mut fb, ptr, 7);
    fb.insert_inst_no_result(InstData::Return { arg: None });
    let func_ref = fb.finish(&mut mb);

    let mut module = mb.build();
    assert!(Pipeline::default_pipeline().run(&mut module));
    assert!(stack_frame_alloca(&module.funcs[func_ref]).is_some());

    // A second pipeline run leaves the module untouched.
    let mut second = Pipeline::new();
    second.add_pass(Pass::IdentifyLocals);
    assert!(!second.run(&mut module));
}
