#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Coarse classification of a failed solver run, reported with an `error`
/// status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Transport,
    Solver,
    Parse,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport",
            ErrorKind::Solver => "solver",
            ErrorKind::Parse => "parse",
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum SolverError {
    #[error("solver executable `{0}` not found")]
    #[diagnostic(
        code(esverify::solver::not_found),
        help("install z3 or pass --z3path / --z3url")
    )]
    NotFound(String),
    #[error("solver i/o failed: {0}")]
    #[diagnostic(code(esverify::solver::io))]
    Io(#[from] std::io::Error),
    #[error("solver timed out after {0:?}")]
    #[diagnostic(code(esverify::solver::timeout))]
    Timeout(Duration),
    #[error("solver request failed: {0}")]
    #[diagnostic(code(esverify::solver::http))]
    Http(String),
    #[error("unexpected solver output: {0}")]
    #[diagnostic(code(esverify::solver::parse))]
    Parse(String),
    #[error("solver reported: {0}")]
    #[diagnostic(code(esverify::solver::unknown))]
    Unknown(String),
}

impl SolverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SolverError::NotFound(_) | SolverError::Io(_) | SolverError::Http(_) => {
                ErrorKind::Transport
            }
            SolverError::Timeout(_) => ErrorKind::Timeout,
            SolverError::Parse(_) => ErrorKind::Parse,
            SolverError::Unknown(_) => ErrorKind::Solver,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

#[derive(Clone, Debug)]
pub struct SolverOutput {
    pub result: SatResult,
    /// Everything after the `check-sat` answer, normally the `get-value` reply.
    pub model: String,
    pub raw: String,
}

/// Anything that can answer an SMT-LIB script.
pub trait Solver: Send + Sync {
    fn check(&self, script: &str) -> Result<SolverOutput, SolverError>;
}

/// Splits solver output into the satisfiability answer and the rest.
pub fn parse_output(raw: &str) -> Result<SolverOutput, SolverError> {
    let trimmed = raw.trim_start();
    let (first, rest) = match trimmed.find('\n') {
        Some(i) => (trimmed[..i].trim(), &trimmed[i + 1..]),
        None => (trimmed.trim(), ""),
    };
    let result = match first {
        "sat" => SatResult::Sat,
        "unsat" => SatResult::Unsat,
        "unknown" => SatResult::Unknown,
        "timeout" => return Err(SolverError::Timeout(Duration::ZERO)),
        line if line.starts_with("(error") => return Err(SolverError::Unknown(line.to_string())),
        "" => return Err(SolverError::Parse("empty response".to_string())),
        line => return Err(SolverError::Parse(line.to_string())),
    };
    Ok(SolverOutput {
        result,
        model: rest.to_string(),
        raw: raw.to_string(),
    })
}

/// Runs a local z3 with the script on standard input.
#[derive(Clone, Debug)]
pub struct ProcessSolver {
    path: PathBuf,
    timeout: Duration,
}

impl ProcessSolver {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }
}

impl Solver for ProcessSolver {
    fn check(&self, script: &str) -> Result<SolverOutput, SolverError> {
        let secs = self.timeout.as_secs().max(1);
        let mut child = Command::new(&self.path)
            .args(["-in", "-smt2", &format!("-T:{secs}")])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    SolverError::NotFound(self.path.display().to_string())
                }
                _ => SolverError::Io(e),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(script.as_bytes()) {
                reap(&mut child);
                return Err(SolverError::Io(e));
            }
        }
        let Some(mut stdout) = child.stdout.take() else {
            reap(&mut child);
            return Err(SolverError::Parse("solver stdout unavailable".to_string()));
        };
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut out = String::new();
            let res = stdout.read_to_string(&mut out).map(|_| out);
            let _ = tx.send(res);
        });

        // z3 enforces -T itself; the grace period covers process start-up.
        match rx.recv_timeout(self.timeout + Duration::from_secs(2)) {
            Ok(out) => {
                let out = out?;
                child.wait()?;
                tracing::trace!(bytes = out.len(), "solver answered");
                parse_output(&out).map_err(|e| match e {
                    SolverError::Timeout(_) => SolverError::Timeout(self.timeout),
                    other => other,
                })
            }
            Err(_) => {
                reap(&mut child);
                tracing::warn!(timeout = ?self.timeout, "killed unresponsive solver");
                Err(SolverError::Timeout(self.timeout))
            }
        }
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Posts the script to a remote endpoint that answers with z3's output.
#[derive(Clone, Debug)]
pub struct HttpSolver {
    url: String,
    timeout: Duration,
    client: reqwest::blocking::Client,
}

impl HttpSolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SolverError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout + Duration::from_secs(2))
            .build()
            .map_err(|e| SolverError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            timeout,
            client,
        })
    }
}

impl Solver for HttpSolver {
    fn check(&self, script: &str) -> Result<SolverOutput, SolverError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(script.to_string())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                if e.is_timeout() {
                    SolverError::Timeout(self.timeout)
                } else {
                    SolverError::Http(e.to_string())
                }
            })?;
        let body = response
            .text()
            .map_err(|e| SolverError::Http(e.to_string()))?;
        parse_output(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_are_split_from_the_model() {
        let out = parse_output("sat\n((x (jsnum 1)))\n").unwrap();
        assert_eq!(out.result, SatResult::Sat);
        assert_eq!(out.model.trim(), "((x (jsnum 1)))");
        let out = parse_output("unsat\n(error \"model is not available\")\n").unwrap();
        assert_eq!(out.result, SatResult::Unsat);
        assert_eq!(parse_output("unknown").unwrap().result, SatResult::Unknown);
    }

    #[test]
    fn failures_are_classified() {
        assert_eq!(parse_output("timeout\n").unwrap_err().kind(), ErrorKind::Timeout);
        assert_eq!(
            parse_output("(error \"line 3: unknown constant\")").unwrap_err().kind(),
            ErrorKind::Solver
        );
        assert_eq!(parse_output("").unwrap_err().kind(), ErrorKind::Parse);
        assert_eq!(parse_output("hello").unwrap_err().kind(), ErrorKind::Parse);
    }

    #[test]
    fn missing_executable_is_a_transport_error() {
        let solver = ProcessSolver::new("/nonexistent/esverify-z3", Duration::from_secs(1));
        let err = solver.check("(check-sat)").unwrap_err();
        assert!(matches!(err, SolverError::NotFound(_)), "{err}");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[cfg(unix)]
    #[test]
    fn solver_that_stops_reading_is_a_transport_error() {
        let solver = ProcessSolver::new("true", Duration::from_secs(1));
        let script = "(assert true)\n".repeat(1 << 16);
        let err = solver.check(&script).unwrap_err();
        assert!(matches!(err, SolverError::Io(_)), "{err}");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
