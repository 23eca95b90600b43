use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run(args: &[&str], stdin: &str) -> Output {
  let mut child = Command::new(env!("CARGO_BIN_EXE_ceric"))
    .args(args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .expect("failed to start ceric");
  // The driver may exit before reading its input, a broken pipe is fine.
  let _ = child
    .stdin
    .take()
    .expect("stdin is piped")
    .write_all(stdin.as_bytes());
  child.wait_with_output().expect("ceric did not finish")
}

#[test]
fn valid_program_prints_assembly() {
  let output = run(&["--target", "linux"], "VAR x : INTEGER. x := 1 + 2.");
  assert_eq!(output.status.code(), Some(0));
  let asm = String::from_utf8(output.stdout).unwrap();
  assert!(asm.starts_with("# This code was generated by ceric\n"));
  assert!(asm.contains("popq x(%rip)"));
  assert!(output.stderr.is_empty());
}

#[test]
fn compile_errors_exit_with_one() {
  let output = run(&["--target", "linux"], "VAR x : INTEGER.\nx := y.");
  assert_eq!(output.status.code(), Some(1));
  assert!(output.stdout.is_empty());
  let stderr = String::from_utf8(output.stderr).unwrap();
  assert_eq!(
    stderr,
    "source:2: error: use of undeclared identifier 'y'\nsource:2: note: when reading token 'y'\n"
  );
}

#[test]
fn unknown_target_is_rejected() {
  let output = run(&["--target", "riscv64"], "VAR x : INTEGER. x := 1.");
  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8(output.stderr).unwrap();
  assert!(stderr.contains("unsupported target 'riscv64'"));
}

#[test]
fn darwin_target_mangles_symbols() {
  let output = run(&["--target", "darwin"], "VAR x : INTEGER. DISPLAY x.");
  assert_eq!(output.status.code(), Some(0));
  let asm = String::from_utf8(output.stdout).unwrap();
  assert!(asm.contains("call _printf"));
}

#[test]
fn missing_input_file_exits_with_two() {
  let output = run(&["--target", "linux", "/nonexistent/ceric/input.cr"], "");
  assert_eq!(output.status.code(), Some(2));
  let stderr = String::from_utf8(output.stderr).unwrap();
  assert!(
    stderr.starts_with("error: could not read '/nonexistent/ceric/input.cr'")
  );
}

#[test]
fn token_dump_goes_to_stderr() {
  let output = run(
    &["--target", "linux", "--dump-tokens"],
    "VAR x : INTEGER. x := 1.",
  );
  assert_eq!(output.status.code(), Some(0));
  let stderr = String::from_utf8(output.stderr).unwrap();
  assert!(stderr.starts_with("=== Tokens ===\n"));
  assert!(String::from_utf8(output.stdout).unwrap().contains("main:"));
}
