#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use esverify_core::ir::{BindingId, Program};
use esverify_interpret::{replay, Entry, InterpConfig, Site, Verdict};
use rayon::prelude::*;

use crate::model::{decode_model, Model};
use crate::solver::{ErrorKind, SatResult, Solver};
use crate::vcgen::FreeVar;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Not sent to a solver yet.
    Pending,
    /// The solver proved the condition.
    Verified,
    /// No proof, and no concrete run decided the counterexample.
    Unverified,
    /// Replaying the counterexample violates the condition.
    Incorrect,
    /// The counterexample replays without a violation.
    Tested,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Verified => "verified",
            Status::Unverified => "unverified",
            Status::Incorrect => "incorrect",
            Status::Tested => "tested",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VcResult {
    pub status: Status,
    pub model: Option<Model>,
    pub error: Option<ErrorKind>,
    /// Why the condition is unverified or failed.
    pub message: Option<String>,
}

impl VcResult {
    fn status(status: Status) -> Self {
        Self {
            status,
            model: None,
            error: None,
            message: None,
        }
    }

    fn error(kind: ErrorKind, message: String) -> Self {
        Self {
            status: Status::Error,
            model: None,
            error: Some(kind),
            message: Some(message),
        }
    }
}

/// One proof obligation with its SMT-LIB script and, once solved, its
/// classification.
#[derive(Clone, Debug)]
pub struct VerificationCondition {
    program: Arc<Program>,
    functions: Arc<Vec<BindingId>>,
    description: String,
    script: String,
    entry: Entry,
    site: Site,
    free: Vec<FreeVar>,
    replay: InterpConfig,
    result: VcResult,
    response: Option<String>,
}

impl VerificationCondition {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        program: Arc<Program>,
        functions: Arc<Vec<BindingId>>,
        description: String,
        script: String,
        entry: Entry,
        site: Site,
        free: Vec<FreeVar>,
        replay: InterpConfig,
    ) -> Self {
        Self {
            program,
            functions,
            description,
            script,
            entry,
            site,
            free,
            replay,
            result: VcResult::status(Status::Pending),
            response: None,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub fn site(&self) -> Site {
        self.site
    }

    pub fn is_solved(&self) -> bool {
        self.result.status != Status::Pending
    }

    pub fn result(&self) -> &VcResult {
        &self.result
    }

    pub fn model(&self) -> Option<&Model> {
        self.result.model.as_ref()
    }

    /// Sends the script to `solver` and classifies the answer. A satisfiable
    /// answer is replayed concretely from the model.
    pub fn solve(&mut self, solver: &dyn Solver) -> &VcResult {
        let span = tracing::debug_span!("solve", description = %self.description);
        let _guard = span.enter();
        self.result = match solver.check(&self.script) {
            Err(e) => {
                tracing::warn!(error = %e, "solver failed");
                VcResult::error(e.kind(), e.to_string())
            }
            Ok(out) => {
                self.response = Some(out.raw.clone());
                match out.result {
                    SatResult::Unsat => VcResult::status(Status::Verified),
                    SatResult::Unknown => {
                        VcResult::error(ErrorKind::Solver, "solver answered unknown".to_string())
                    }
                    SatResult::Sat => self.classify(&out.model),
                }
            }
        };
        tracing::info!(status = %self.result.status, "classified");
        &self.result
    }

    fn classify(&self, reply: &str) -> VcResult {
        let model = match decode_model(reply, &self.free, &self.functions) {
            Ok(model) => model,
            Err(message) => {
                tracing::debug!(%message, "model not decoded");
                return VcResult {
                    status: Status::Unverified,
                    model: None,
                    error: None,
                    message: Some(message),
                };
            }
        };
        let verdict = replay(
            &self.program,
            &self.replay,
            self.entry,
            self.site,
            &model.inputs(),
        );
        let (status, message) = match verdict {
            Verdict::Violated => (Status::Incorrect, None),
            Verdict::Passed => (Status::Tested, None),
            Verdict::Undecided(why) => (Status::Unverified, Some(why)),
        };
        VcResult {
            status,
            model: Some(model),
            error: None,
            message,
        }
    }

    /// Logs the script and the raw solver response at debug level.
    pub fn debug_out(&self) {
        tracing::debug!(description = %self.description, "script:\n{}", self.script);
        if let Some(response) = &self.response {
            tracing::debug!(description = %self.description, "response:\n{}", response);
        }
    }
}

/// Solves every condition, in parallel when `parallel` is set.
pub fn solve_all(vcs: &mut [VerificationCondition], solver: &dyn Solver, parallel: bool) {
    if parallel {
        vcs.par_iter_mut().for_each(|vc| {
            vc.solve(solver);
        });
    } else {
        for vc in vcs.iter_mut() {
            vc.solve(solver);
        }
    }
}
