#![forbid(unsafe_code)]
#![allow(unused_assignments)]

//! Verification conditions for annotated JavaScript.
//!
//! [`verification_conditions`] runs the front-end and generates one
//! [`VerificationCondition`] per check site. Each condition is solved
//! independently through a [`Solver`]; satisfiable answers are replayed
//! by the concrete interpreter to tell real bugs from spurious models.

mod encode;
mod model;
mod smt;
mod solver;
mod vc;
mod vcgen;

use std::sync::Arc;
use std::time::Duration;

use esverify_core::ir::Program;
use esverify_core::FrontendError;
use esverify_interpret::{InterpConfig, DEFAULT_FUEL};
use miette::Diagnostic;
use thiserror::Error;

pub use model::{Model, ModelValue};
pub use smt::PRELUDE;
pub use solver::{
    parse_output, ErrorKind, HttpSolver, ProcessSolver, SatResult, Solver, SolverError,
    SolverOutput,
};
pub use vc::{solve_all, Status, VcResult, VerificationCondition};

#[derive(Debug, Error, Diagnostic)]
pub enum VerifyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Frontend(#[from] FrontendError),
}

impl VerifyError {
    /// `parse`, `unsupported` or `resolve`.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::Frontend(e) => e.kind(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            VerifyError::Frontend(e) => e.message(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerifyOptions {
    /// Per-condition solver time limit.
    pub timeout: Duration,
    /// Step budget for replaying counterexamples.
    pub replay_fuel: u64,
    /// Solve conditions on the rayon pool.
    pub parallel: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            replay_fuel: DEFAULT_FUEL,
            parallel: true,
        }
    }
}

pub fn verification_conditions(src: &str) -> Result<Vec<VerificationCondition>, VerifyError> {
    verification_conditions_with(src, &VerifyOptions::default())
}

pub fn verification_conditions_with(
    src: &str,
    opts: &VerifyOptions,
) -> Result<Vec<VerificationCondition>, VerifyError> {
    let program = esverify_core::program_from_source(src)?;
    Ok(conditions_for(Arc::new(program), opts))
}

/// Conditions of an already resolved program, in report order: each
/// function's body checks, postconditions and invariants in source order,
/// interleaved with top-level checks, then the `initially` checks.
pub fn conditions_for(program: Arc<Program>, opts: &VerifyOptions) -> Vec<VerificationCondition> {
    let generated = vcgen::generate(&program);
    let functions = Arc::new(generated.functions);
    let replay = InterpConfig {
        fuel: opts.replay_fuel,
        ..InterpConfig::default()
    };
    generated
        .vcs
        .into_iter()
        .map(|raw| {
            VerificationCondition::new(
                Arc::clone(&program),
                Arc::clone(&functions),
                raw.description,
                raw.script,
                raw.entry,
                raw.site,
                raw.free,
                replay.clone(),
            )
        })
        .collect()
}
