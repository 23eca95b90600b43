//! Shared error utilities used across the compilation pipeline.
//!
//! Every failure is fatal: the first error aborts the pass and is rendered
//! as a two-line diagnostic pointing at the source line and the token that
//! was being read, in the style of classic single-pass compilers.

use snafu::Snafu;

use crate::ty::Type;

pub type CompileResult<T> = Result<T, CompileError>;

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Broad classification of a [`CompileError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Lexical,
  Syntax,
  Semantic,
  Unimplemented,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("{message}"))]
  Lexical {
    line: usize,
    lexeme: String,
    message: String,
  },

  #[snafu(display("{message}"))]
  Syntax {
    line: usize,
    lexeme: String,
    message: String,
  },

  #[snafu(display("{message}"))]
  Semantic {
    line: usize,
    lexeme: String,
    message: String,
  },

  #[snafu(display("unimplemented support: {source}"))]
  Unimplemented {
    line: usize,
    lexeme: String,
    source: CodegenError,
  },

  #[snafu(display("unimplemented support: unsupported target '{name}'"))]
  InvalidTarget { name: String },
}

/// Limitations of the code generator. These are raised for inputs the
/// generator has no case for, never for mistakes in the compiled program.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodegenError {
  #[snafu(display("operation '{operation}' is not implemented for type {ty}"))]
  UnsupportedOperand { operation: &'static str, ty: Type },

  #[snafu(display("unsupported type conversion occured: {from} -> {to}"))]
  UnsupportedConversion { from: Type, to: Type },

  #[snafu(display("unsupported function return type {ty}"))]
  UnsupportedReturn { ty: Type },

  #[snafu(display(
    "pushing extra parameters to stack not supported yet ({class} arguments are limited to {limit})"
  ))]
  ArgumentBudget { class: &'static str, limit: usize },
}

impl CompileError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Lexical { .. } => ErrorKind::Lexical,
      Self::Syntax { .. } => ErrorKind::Syntax,
      Self::Semantic { .. } => ErrorKind::Semantic,
      Self::Unimplemented { .. } | Self::InvalidTarget { .. } => ErrorKind::Unimplemented,
    }
  }

  /// Source line the error was detected on, when it is tied to a token.
  pub fn line(&self) -> Option<usize> {
    match self {
      Self::Lexical { line, .. }
      | Self::Syntax { line, .. }
      | Self::Semantic { line, .. }
      | Self::Unimplemented { line, .. } => Some(*line),
      Self::InvalidTarget { .. } => None,
    }
  }

  /// Text of the token being read when the error was detected.
  pub fn lexeme(&self) -> Option<&str> {
    match self {
      Self::Lexical { lexeme, .. }
      | Self::Syntax { lexeme, .. }
      | Self::Semantic { lexeme, .. }
      | Self::Unimplemented { lexeme, .. } => Some(lexeme),
      Self::InvalidTarget { .. } => None,
    }
  }

  /// Render the error the way it is reported on stderr.
  pub fn diagnostic(&self) -> String {
    match (self.line(), self.lexeme()) {
      (Some(line), Some(lexeme)) => format!(
        "source:{line}: error: {self}\nsource:{line}: note: when reading token '{lexeme}'"
      ),
      _ => format!("error: {self}"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn diagnostic_names_line_and_token() {
    let err = CompileError::Semantic {
      line: 3,
      lexeme: "y".to_string(),
      message: "use of undeclared identifier 'y'".to_string(),
    };
    assert_eq!(
      err.diagnostic(),
      "source:3: error: use of undeclared identifier 'y'\nsource:3: note: when reading token 'y'"
    );
    assert_eq!(err.kind(), ErrorKind::Semantic);
  }

  #[test]
  fn generator_limitations_are_reported_distinctly() {
    let err = CompileError::Unimplemented {
      line: 1,
      lexeme: ".".to_string(),
      source: CodegenError::ArgumentBudget {
        class: "integer",
        limit: 6,
      },
    };
    assert_eq!(err.kind(), ErrorKind::Unimplemented);
    assert!(err.to_string().starts_with("unimplemented support: "));
    assert!(err.diagnostic().contains("limited to 6"));
  }

  #[test]
  fn target_errors_have_no_location() {
    let err = CompileError::InvalidTarget {
      name: "riscv".to_string(),
    };
    assert_eq!(err.line(), None);
    assert_eq!(
      err.diagnostic(),
      "error: unimplemented support: unsupported target 'riscv'"
    );
  }
}
