#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use esverify_verify::{Status, VerificationCondition};
use miette::IntoDiagnostic;
use serde::Serialize;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    Simple,
    #[default]
    Colored,
}

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BOLD_YELLOW: &str = "\x1b[1;33m";
    pub const BOLD_RED: &str = "\x1b[1;31m";
}

/// One line per condition, with the counterexample indented below when the
/// solver produced one.
pub fn render_line(vc: &VerificationCondition, format: LogFormat) -> String {
    let result = vc.result();
    let status = match format {
        LogFormat::Simple => result.status.as_str().to_string(),
        LogFormat::Colored => format!(
            "{}{}{}",
            status_color(result.status),
            result.status,
            colors::RESET
        ),
    };
    let mut line = format!("{status}: {}", vc.description().replace('\n', ": "));
    if let Some(kind) = result.error {
        line.push_str(&format!(" ({})", kind.as_str()));
    }
    if result.status != Status::Verified {
        if let Some(message) = &result.message {
            line.push_str(&format!("\n  {message}"));
        }
    }
    if let Some(model) = vc.model().filter(|m| !m.is_empty()) {
        line.push_str(&format!("\n  counterexample: {model}"));
    }
    line
}

fn status_color(status: Status) -> &'static str {
    match status {
        Status::Verified => colors::GREEN,
        Status::Tested => colors::YELLOW,
        Status::Unverified | Status::Pending => colors::BOLD_YELLOW,
        Status::Incorrect | Status::Error => colors::BOLD_RED,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub schema: &'static str,
    pub input: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub conditions: Vec<ConditionReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionReport {
    pub description: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<serde_json::Value>,
}

impl VerifyReport {
    pub fn new(input: &str, vcs: &[VerificationCondition]) -> Self {
        let conditions: Vec<ConditionReport> = vcs
            .iter()
            .map(|vc| {
                let result = vc.result();
                ConditionReport {
                    description: vc.description().to_string(),
                    status: result.status.as_str(),
                    error: result.error.map(|k| k.as_str()),
                    message: result.message.clone(),
                    model: vc.model().map(|m| m.to_json()),
                }
            })
            .collect();
        Self {
            schema: "esverify.report.v1",
            input: input.to_string(),
            ok: all_verified(vcs),
            error: None,
            conditions,
        }
    }

    /// Report for a run that stopped before any condition was generated.
    pub fn failed(input: &str, error: String) -> Self {
        Self {
            schema: "esverify.report.v1",
            input: input.to_string(),
            ok: false,
            error: Some(error),
            conditions: Vec::new(),
        }
    }

    pub fn write(&self, out_path: &Path) -> miette::Result<()> {
        if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).into_diagnostic()?;
        }
        let json = serde_json::to_string_pretty(self).into_diagnostic()?;
        fs::write(out_path, json).into_diagnostic()?;
        tracing::debug!(path = %out_path.display(), "wrote report");
        Ok(())
    }
}

pub fn all_verified(vcs: &[VerificationCondition]) -> bool {
    vcs.iter().all(|vc| vc.result().status == Status::Verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use esverify_verify::{parse_output, verification_conditions, Solver, SolverError, SolverOutput};

    struct Canned(&'static str);

    impl Solver for Canned {
        fn check(&self, _script: &str) -> Result<SolverOutput, SolverError> {
            parse_output(self.0)
        }
    }

    #[test]
    fn lines_flatten_descriptions() {
        let mut vcs = verification_conditions("let i = 0; assert(i < 1);").unwrap();
        vcs[0].solve(&Canned("unsat\n"));
        assert_eq!(render_line(&vcs[0], LogFormat::Simple), "verified: assert: (i < 1)");
    }

    #[test]
    fn failures_show_their_kind_and_counterexample() {
        let src = "function f(x) {\n  return x;\n  ensures(f(x) > 0);\n}\n";
        let mut vcs = verification_conditions(src).unwrap();
        vcs[0].solve(&Canned("timeout\n"));
        let line = render_line(&vcs[0], LogFormat::Simple);
        assert!(line.starts_with("error: f: (f(x) > 0) (timeout)"), "{line}");

        let reply = "sat\n((x (jsnum 0)) ((arrlength (arrv x)) 0) \
            ((arrelems (arrv x) 0) jsnull) ((arrelems (arrv x) 1) jsnull) \
            ((arrelems (arrv x) 2) jsnull) ((arrelems (arrv x) 3) jsnull))\n";
        vcs[0].solve(&Canned(reply));
        let line = render_line(&vcs[0], LogFormat::Simple);
        assert!(line.starts_with("incorrect: f: (f(x) > 0)"), "{line}");
        assert!(line.ends_with("counterexample: x = 0"), "{line}");
    }

    #[test]
    fn colored_lines_wrap_the_status() {
        let mut vcs = verification_conditions("let i = 0; assert(i < 1);").unwrap();
        vcs[0].solve(&Canned("unsat\n"));
        assert_eq!(
            render_line(&vcs[0], LogFormat::Colored),
            "\x1b[32mverified\x1b[0m: assert: (i < 1)"
        );
    }

    #[test]
    fn unsolved_conditions_are_pending() {
        let vcs = verification_conditions("let i = 0; assert(i < 1);").unwrap();
        assert_eq!(vcs[0].result().status, Status::Pending);
        assert!(!vcs[0].is_solved());
        assert_eq!(render_line(&vcs[0], LogFormat::Simple), "pending: assert: (i < 1)");
        assert!(!all_verified(&vcs));
    }

    #[test]
    fn report_is_written_as_json() {
        let mut vcs = verification_conditions("let i = 0; assert(i < 1);").unwrap();
        vcs[0].solve(&Canned("unsat\n"));
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports").join("max.json");
        VerifyReport::new("max.js", &vcs).write(&out).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["schema"], "esverify.report.v1");
        assert_eq!(json["ok"], true);
        assert_eq!(json["conditions"][0]["status"], "verified");
        assert_eq!(json["conditions"][0]["description"], "assert:\n(i < 1)");
    }
}
