//! The per-function recovery pipeline.
//!
//! Passes run sequentially over every function of a module. The driver
//! exposes each pass under a stable CLI identifier so the host tool can
//! enable them individually.

use relift_ir::{Function, Module};

use crate::locals::IdentifyLocals;

/// A per-function recovery pass.
///
/// Pipeline order matters: local identification consumes the stack-pointer
/// tag produced by argument recovery, so it is scheduled after argument
/// recovery has run in the host driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Recover on-stack local variables into a typed stack frame.
    IdentifyLocals,
}

impl Pass {
    /// The identifier the pass registers under in the driver CLI.
    pub fn cli_name(self) -> &'static str {
        match self {
            Self::IdentifyLocals => "--identify-locals",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::IdentifyLocals => "Identify local variables",
        }
    }
}

/// An ordered sequence of recovery passes.
pub struct Pipeline {
    passes: Vec<Pass>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The default recovery sequence.
    pub fn default_pipeline() -> Self {
        let mut p = Self::new();
        p.add_pass(Pass::IdentifyLocals);
        p
    }

    /// Appends a pass. Returns `&mut Self` for chaining.
    pub fn add_pass(&mut self, pass: Pass) -> &mut Self {
        self.passes.push(pass);
        self
    }

    /// Runs every pass over every function, in order. Returns `true` when
    /// any function was modified.
    pub fn run(&self, module: &mut Module) -> bool {
        let mut modified = false;
        for func in module.funcs.values_mut() {
            modified |= run_func_passes(&self.passes, func);
        }
        modified
    }
}

impl Default for Pipeline {
    /// A defaulted pipeline already carries the full recovery sequence;
    /// use [`Pipeline::new`] for an empty one.
    fn default() -> Self {
        Self::default_pipeline()
    }
}

/// Runs a sequence of passes on a single function.
pub fn run_func_passes(passes: &[Pass], func: &mut Function) -> bool {
    let mut modified = false;
    for &pass in passes {
        modified |= run_pass(pass, func);
    }
    modified
}

fn run_pass(pass: Pass, func: &mut Function) -> bool {
    match pass {
        Pass::IdentifyLocals => IdentifyLocals::new().run(func),
    }
}
