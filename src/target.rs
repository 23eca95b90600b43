//! Target platform selection. The only externally tunable behaviour of the
//! compiler is how linker-visible symbols are spelled.

use std::fmt;
use std::str::FromStr;

use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
  /// ELF targets: symbols are used as written.
  Linux,
  /// Mach-O targets: symbols get a leading underscore.
  Darwin,
}

impl Target {
  /// Target matching the platform the compiler itself was built for.
  pub fn host() -> Self {
    if cfg!(target_os = "macos") {
      Self::Darwin
    } else {
      Self::Linux
    }
  }

  /// Linker-visible spelling of a function or global name.
  pub fn mangle(self, name: &str) -> String {
    match self {
      Self::Linux => name.to_string(),
      Self::Darwin => format!("_{name}"),
    }
  }
}

impl Default for Target {
  fn default() -> Self {
    Self::host()
  }
}

impl FromStr for Target {
  type Err = CompileError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "linux" | "x86_64-linux" | "x86_64-linux-gnu" | "x86_64-unknown-linux-gnu" => Ok(Self::Linux),
      "darwin" | "macos" | "x86_64-darwin" | "x86_64-apple-darwin" => Ok(Self::Darwin),
      _ => Err(CompileError::InvalidTarget {
        name: s.to_string(),
      }),
    }
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Linux => f.write_str("linux"),
      Self::Darwin => f.write_str("darwin"),
    }
  }
}
