//! End-to-end tests driving the `skein` binary.

use std::io::Write;
use std::process::{Command, Stdio};

fn skein() -> Command {
    Command::new(env!("CARGO_BIN_EXE_skein"))
}

/// Run a program from a file with the given engine; (stdout, stderr, ok).
fn run_file(engine: &str, source: &str) -> (String, String, bool) {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(source.as_bytes()).expect("write source");
    let output = skein()
        .arg("-f")
        .arg(file.path())
        .arg("--engine")
        .arg(engine)
        .output()
        .expect("run skein");
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
        output.status.success(),
    )
}

fn assert_prints(source: &str, expected: &str) {
    for engine in ["vm", "tree"] {
        let (stdout, stderr, ok) = run_file(engine, source);
        assert!(ok, "engine {} failed on {}: {}", engine, source, stderr);
        assert_eq!(
            stdout, expected,
            "engine {} printed the wrong output for {}",
            engine, source
        );
    }
}

#[test]
fn test_scenario_arithmetic_display() {
    assert_prints("(display (+ 1 (* 2 3)))", "7\n");
}

#[test]
fn test_scenario_factorial() {
    assert_prints(
        "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1))))) (display (fact 6))",
        "720\n",
    );
}

#[test]
fn test_scenario_quoted_list() {
    assert_prints("(display '(1 2 3))", "(1 2 3)\n");
}

#[test]
fn test_scenario_box() {
    assert_prints("(let ((b (box 0))) (begin (set-box! b 42) (display (unbox b))))", "42\n");
}

#[test]
fn test_scenario_cons_list() {
    assert_prints("(display (cons 1 (cons 2 '())))", "(1 2)\n");
}

#[test]
fn test_scenario_counter_closure() {
    assert_prints(
        "(let ((c (let ((x 0)) (lambda () (begin (set! x (+ x 1)) x))))) \
           (begin (c) (c) (display (c))))",
        "3\n",
    );
}

#[test]
fn test_results_echoed_per_form() {
    assert_prints("(+ 1 2) (define x 4) (* x x)", "3\n16\n");
}

#[test]
fn test_eval_stdin_mode() {
    let mut child = skein()
        .arg("-e")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn skein -e");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"(display (+ 20 22))")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "42\n");
}

#[test]
fn test_dump_mode() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"(+ 1 2)").expect("write source");
    let output = skein().arg("-d").arg(file.path()).output().expect("run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for mnemonic in ["push", "add", "pop 2", "halt"] {
        assert!(stdout.contains(mnemonic), "missing {} in:\n{}", mnemonic, stdout);
    }
    assert!(stdout.contains(":\t"), "addresses missing:\n{}", stdout);
}

#[test]
fn test_dump_branch_blocks() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"(if #t 1 2)").expect("write source");
    let output = skein().arg("-d").arg(file.path()).output().expect("run");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("branch"), "{}", stdout);
    // the else arm starts its own block after a blank line
    assert!(stdout.contains("\n\n"), "{}", stdout);
}

#[test]
fn test_type_error_exits_nonzero() {
    let (_, stderr, ok) = run_file("vm", "(car 1)");
    assert!(!ok);
    assert!(stderr.contains("type error"), "stderr: {}", stderr);
}

#[test]
fn test_unbound_identifier_exits_nonzero() {
    for engine in ["vm", "tree"] {
        let (_, stderr, ok) = run_file(engine, "(display missing)");
        assert!(!ok, "engine {} should fail", engine);
        assert!(stderr.contains("undefined"), "stderr: {}", stderr);
    }
}

#[test]
fn test_parse_error_exits_nonzero() {
    let (_, stderr, ok) = run_file("vm", "(display");
    assert!(!ok);
    assert!(stderr.contains("parse error"), "stderr: {}", stderr);
}

#[test]
fn test_definitions_shared_across_forms() {
    assert_prints(
        "(define (double n) (* n 2)) (define (quad n) (double (double n))) (display (quad 4))",
        "16\n",
    );
}
