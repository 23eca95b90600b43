//! ceric command line driver
//!
//! Usage: ceric [INPUT] [-o OUTPUT] [--target TARGET]

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use ceric::{CompileError, Target, tokenizer};
use clap::Parser;

/// Exit status for programs rejected by the compiler.
const EXIT_COMPILE_ERROR: u8 = 1;
/// Exit status for failures reading the input or writing the output.
const EXIT_IO_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "ceric")]
#[command(version)]
#[command(about = "Compile a small Pascal-like language to x86-64 assembly")]
struct Args {
  /// Source file (reads standard input when omitted)
  #[arg(value_name = "INPUT")]
  input: Option<PathBuf>,

  /// Assembly output file (writes standard output when omitted)
  #[arg(short, long, value_name = "OUTPUT")]
  output: Option<PathBuf>,

  /// Target platform, selects symbol mangling (linux, darwin)
  #[arg(long, value_name = "TARGET")]
  target: Option<String>,

  /// Print the token stream to stderr before compiling
  #[arg(long, default_value_t = false)]
  dump_tokens: bool,
}

fn read_source(input: Option<&PathBuf>) -> io::Result<String> {
  match input {
    Some(path) => std::fs::read_to_string(path),
    None => {
      let mut source = String::new();
      io::stdin().read_to_string(&mut source)?;
      Ok(source)
    }
  }
}

fn report(err: &CompileError) -> ExitCode {
  eprintln!("{}", err.diagnostic());
  ExitCode::from(EXIT_COMPILE_ERROR)
}

fn main() -> ExitCode {
  let args = Args::parse();

  let target = match args.target.as_deref().map(str::parse::<Target>) {
    None => Target::host(),
    Some(Ok(target)) => target,
    Some(Err(err)) => return report(&err),
  };

  let source = match read_source(args.input.as_ref()) {
    Ok(source) => source,
    Err(err) => {
      let name = match &args.input {
        Some(path) => path.display().to_string(),
        None => "<stdin>".to_string(),
      };
      eprintln!("error: could not read '{name}': {err}");
      return ExitCode::from(EXIT_IO_ERROR);
    }
  };

  if args.dump_tokens {
    match tokenizer::tokenize(&source) {
      Ok(tokens) => {
        eprintln!("=== Tokens ===");
        for token in &tokens {
          eprintln!("  {token}");
        }
        eprintln!();
      }
      Err(err) => return report(&err),
    }
  }

  let asm = match ceric::compile(&source, target) {
    Ok(asm) => asm,
    Err(err) => return report(&err),
  };

  let written = match &args.output {
    Some(path) => std::fs::write(path, &asm),
    None => {
      print!("{asm}");
      Ok(())
    }
  };

  if let Err(err) = written {
    eprintln!("error: could not write output: {err}");
    return ExitCode::from(EXIT_IO_ERROR);
  }

  ExitCode::SUCCESS
}
