//! Assemble, link and run compiled programs. Skipped when no C compiler
//! driver is on the path.
#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::path::PathBuf;
use std::process::Command;

use ceric::{Target, compile};

fn scratch_dir(name: &str) -> PathBuf {
  let unique = format!("ceric-{}-{name}", std::process::id());
  let dir = std::env::temp_dir().join(unique);
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

/// Stdout of the compiled program, `None` when there is nothing to link with.
fn run(name: &str, source: &str) -> Option<String> {
  let dir = scratch_dir(name);
  let asm = dir.join("program.s");
  let exe = dir.join("program");
  let text = compile(source, Target::Linux).unwrap();
  std::fs::write(&asm, text).unwrap();

  let cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
  let Ok(linked) = Command::new(&cc)
    .arg("-no-pie")
    .arg(&asm)
    .arg("-o")
    .arg(&exe)
    .arg("-lm")
    .output()
  else {
    return None;
  };
  assert!(
    linked.status.success(),
    "{}",
    String::from_utf8_lossy(&linked.stderr)
  );

  let output = Command::new(&exe).output().unwrap();
  assert_eq!(output.status.code(), Some(0));
  std::fs::remove_dir_all(&dir).ok();
  Some(String::from_utf8(output.stdout).unwrap())
}

#[test]
fn counted_loop_stops_before_the_bound() {
  let source = "VAR i : INTEGER. FOR i := 0 TO 3 DO DISPLAY i.";
  let Some(stdout) = run("for", source) else {
    return;
  };
  assert_eq!(stdout, "0\n1\n2\n");
}

#[test]
fn double_modulus_keeps_operand_order() {
  let source = "VAR d : DOUBLE. BEGIN d := 7.5 % 2.0; DISPLAY d END.";
  let Some(stdout) = run("fmod", source) else {
    return;
  };
  assert_eq!(stdout, "1.500000\n");
}

#[test]
fn calls_at_odd_stack_depth_are_aligned() {
  let source = "VAR d : DOUBLE. BEGIN d := 9.0; DISPLAY 1.5 + d % 4.0 END.";
  let Some(stdout) = run("odd-depth", source) else {
    return;
  };
  assert_eq!(stdout, "2.500000\n");
}

#[test]
fn x87_operations_take_the_left_operand_first() {
  let source = "VAR d : DOUBLE. \
    BEGIN d := DOUBLE(3) / 2.0; DISPLAY d; DISPLAY 10.0 - d; DISPLAY INTEGER(d * 3.0) END.";
  let Some(stdout) = run("x87", source) else {
    return;
  };
  assert_eq!(stdout, "1.500000\n8.500000\n4\n");
}

#[test]
fn wide_literals_survive_the_round_trip() {
  let source = "VAR n : INTEGER. BEGIN n := 18446744073709551615; DISPLAY n END.";
  let Some(stdout) = run("wide", source) else {
    return;
  };
  assert_eq!(stdout, "18446744073709551615\n");
}

#[test]
fn narrow_and_wide_globals_coexist() {
  let source = "VAR b : BOOLEAN; n : INTEGER; c : CHAR. \
    BEGIN c := 'A'; DISPLAY c; b := 3 < 5; DISPLAY b; n := 40 + 2; DISPLAY n END.";
  let Some(stdout) = run("globals", source) else {
    return;
  };
  assert_eq!(stdout, "A1\n42\n");
}

#[test]
fn loops_and_conditions_compute() {
  let source = "VAR n, s : INTEGER. \
    BEGIN \
      n := 5; s := 0; \
      WHILE n > 0 DO BEGIN IF n % 2 == 1 THEN s := s + n; n := n - 1 END; \
      DISPLAY s \
    END.";
  let Some(stdout) = run("loops", source) else {
    return;
  };
  assert_eq!(stdout, "9\n");
}
