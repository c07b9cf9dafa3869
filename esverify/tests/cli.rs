use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const ESVERIFY: &str = env!("CARGO_BIN_EXE_esverify");

fn esverify(dir: &Path, args: &[&str]) -> Output {
    Command::new(ESVERIFY)
        .args(args)
        .current_dir(dir)
        .env_remove("ESVERIFY_Z3PATH")
        .env_remove("ESVERIFY_Z3URL")
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn esverify")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn version_is_printed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = esverify(dir.path(), &["-v"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_is_printed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = esverify(dir.path(), &["-h"]);
    assert_eq!(out.status.code(), Some(0));
    assert!(stdout(&out).contains("--logformat"));
}

#[test]
fn argument_errors_exit_with_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cases: [&[&str]; 3] = [&["--no-such-flag", "a.js"], &[], &["a.js", "b.js"]];
    for args in cases {
        let out = esverify(dir.path(), args);
        assert_eq!(out.status.code(), Some(1), "{args:?}");
        assert!(!out.stderr.is_empty(), "{args:?}");
    }
}

#[test]
fn programs_without_conditions_succeed() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("plain.js"), "let x = 1;\nx = x + 1;\n").expect("write");
    let out = esverify(dir.path(), &["plain.js"]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "");
}

#[test]
fn front_end_errors_fail_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("bad.js"), "assert(y);\n").expect("write");
    let out = esverify(dir.path(), &["-f", "simple", "bad.js"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("undefined variable y"));

    let out = esverify(dir.path(), &["-q", "bad.js"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(out.stdout.is_empty() && out.stderr.is_empty());
}

#[test]
fn missing_input_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = esverify(dir.path(), &["nope.js"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn unreachable_solver_reports_errors() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("a.js"), "let i = 0;\nassert(i < 1);\n").expect("write");
    let report = dir.path().join("out").join("report.json");
    let report_arg = report.to_str().expect("utf-8 path");
    let out = esverify(
        dir.path(),
        &["-f", "simple", "--z3path", "./no-such-z3", "--report", report_arg, "a.js"],
    );
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out).lines().next(), Some("error: assert: (i < 1) (transport)"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).expect("report")).expect("json");
    assert_eq!(json["ok"], false);
    assert_eq!(json["conditions"][0]["error"], "transport");
}

#[test]
fn config_file_is_picked_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("a.js"), "let i = 0;\nassert(i < 1);\n").expect("write");
    std::fs::write(dir.path().join("esverify.toml"), "[solver]\nremote = true\n").expect("write");
    // Remote without a URL is a configuration error.
    let out = esverify(dir.path(), &["a.js"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("needs a URL"));
}

#[test]
fn standard_input_is_read_for_dash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut child = Command::new(ESVERIFY)
        .args(["-f", "simple", "--z3path", "./no-such-z3", "-"])
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn esverify");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"let i = 0;\nassert(i < 1);\n")
        .expect("write stdin");
    let out = child.wait_with_output().expect("wait");
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).starts_with("error: assert: (i < 1)"));
}

#[test]
fn verifies_with_a_local_z3() {
    let available = Command::new("z3")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("skipping: z3 not found");
        return;
    }
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("max.js"),
        "function max(a, b) {\n  requires(typeof(a) == \"number\");\n  requires(typeof(b) == \"number\");\n  \
         if (a >= b) { return a; } else { return b; }\n  ensures(max(a, b) >= a);\n}\n",
    )
    .expect("write");
    let out = esverify(dir.path(), &["-f", "simple", "max.js"]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "");

    let out = esverify(dir.path(), &["-f", "simple", "--verbose", "max.js"]);
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out).trim(), "verified: max: (max(a, b) >= a)");
}
