use std::io::Write;
use std::process::{Command, Output, Stdio};

use tempfile::NamedTempFile;

fn vm() -> Command {
    Command::new(env!("CARGO_BIN_EXE_vm"))
}

fn script(source: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(source.as_bytes()).expect("write script");
    file
}

fn run_script(source: &str, flags: &[&str]) -> Output {
    let file = script(source);
    vm().args(flags).arg(file.path()).output().expect("run vm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn successful_script_exits_zero() {
    let output = run_script("print 1 + 2;", &[]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "3\n");
}

#[test]
fn compile_error_exits_65() {
    let output = run_script("print 1 +;", &[]);
    assert_eq!(output.status.code(), Some(65));
    assert_eq!(stdout(&output), "");
    assert!(stderr(&output).contains("[line 1] Error at ';': Expect expression."));
}

#[test]
fn runtime_error_exits_70() {
    let output = run_script("print 1 + \"a\";", &[]);
    assert_eq!(output.status.code(), Some(70));
    assert_eq!(stdout(&output), "");
    assert!(stderr(&output).contains("Operands must be two numbers or two strings."));
}

#[test]
fn constructor_arity_error_exits_70() {
    let output = run_script("class A {} A(1);", &[]);
    assert_eq!(output.status.code(), Some(70));
    assert!(stderr(&output).contains("Expected 0 arguments but got 1."));
}

#[test]
fn too_many_arguments_exits_64() {
    let output = vm().args(["one.lox", "two.lox"]).output().expect("run vm");
    assert_eq!(output.status.code(), Some(64));
    assert!(stderr(&output).contains("Usage: vm [path]"));
}

#[test]
fn unknown_flag_exits_64() {
    let output = vm().arg("--bogus").output().expect("run vm");
    assert_eq!(output.status.code(), Some(64));
    assert!(stderr(&output).contains("Usage: vm [path]"));
}

#[test]
fn help_exits_zero() {
    let output = vm().arg("--help").output().expect("run vm");
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("--stress-gc"));
}

#[test]
fn missing_file_exits_74() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("missing.lox");
    let output = vm().arg(&path).output().expect("run vm");
    assert_eq!(output.status.code(), Some(74));
    assert!(stderr(&output).contains("Could not open file"));
}

#[test]
fn stress_gc_flag_runs_program() {
    let src = "fun mk(s) { fun g() { return s + \"!\"; } return g; } print mk(\"hi\")();";
    let output = run_script(src, &["--stress-gc"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "hi!\n");
}

#[test]
fn dump_bytecode_lists_functions_without_running() {
    let output = run_script("fun f() { return 1; }\nprint f();", &["--dump-bytecode"]);
    assert_eq!(output.status.code(), Some(0));
    let listing = stdout(&output);
    assert!(listing.contains("== <script> =="), "{listing}");
    assert!(listing.contains("== f =="), "{listing}");
    assert!(listing.contains("OP_CLOSURE"), "{listing}");
    assert!(!listing.contains("\n1\n"), "{listing}");
}

#[test]
fn repl_evaluates_lines_and_survives_errors() {
    let mut child = vm()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn vm");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"var a = 2;\nprint nope;\nprint a * 21;\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");

    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("42\n"), "{}", stdout(&output));
    assert!(stderr(&output).contains("Undefined variable 'nope'."));
}
