//! Recursive-descent parser, type checker and code emission in one pass.
//!
//! There is no syntax tree: every production checks its operand types and
//! immediately drives the [`CodeGen`]. Expression productions return the
//! type of the single value they left on the evaluation stack.
//!
//! ```text
//! Program      := [Declarations] Statement {";" Statement} "."
//! Declarations := "VAR" IdList ":" Type {";" IdList ":" Type} [";"] "."
//! Statement    := If | While | For | Block | Display | Assignment
//! If           := "IF" Expression "THEN" Statement ["ELSE" Statement]
//! While        := "WHILE" Expression "DO" Statement
//! For          := "FOR" Assignment "TO" Expression "DO" Statement
//! Block        := "BEGIN" Statement {";" Statement} "END"
//! Display      := "DISPLAY" Expression
//! Assignment   := Identifier ":=" Expression
//! Expression   := SimpleExpr [RelOp SimpleExpr]
//! SimpleExpr   := Term {AddOp Term}
//! Term         := Factor {MulOp Factor}
//! Factor       := Number | Float | Char | "TRUE" | "FALSE" | Identifier
//!               | "(" Expression ")" | "!" Factor | Type "(" Expression ")"
//! ```

use snafu::ResultExt;

use crate::codegen::CodeGen;
use crate::error::{CodegenResult, CompileError, CompileResult, UnimplementedSnafu};
use crate::symbols::{SymbolTable, Variable};
use crate::target::Target;
use crate::tokenizer::{AddOp, Keyword, MulOp, Token, TokenKind, TokenSource};
use crate::ty::{Requirement, Type};

/// Compilation state for one program: the token source, the current
/// lookahead token, the symbol table and the code generator.
pub struct Parser<S> {
  tokens: S,
  current: Token,
  symbols: SymbolTable,
  codegen: CodeGen,
}

impl<S: TokenSource> Parser<S> {
  /// Prime the lookahead with the first token.
  pub fn new(mut tokens: S, target: Target) -> CompileResult<Self> {
    let current = tokens.next_token()?;
    Ok(Self {
      tokens,
      current,
      symbols: SymbolTable::new(),
      codegen: CodeGen::new(target),
    })
  }

  /// Compile a whole program and return the assembly.
  pub fn parse_program(mut self) -> CompileResult<String> {
    self.codegen.begin_program();
    self.codegen.begin_executable_section();
    self.codegen.begin_main_procedure();

    self.parse_declarations()?;
    self.parse_statement_part()?;

    self.codegen.finalize_main_procedure();
    self.codegen.begin_global_data_section();
    for variable in self.symbols.iter() {
      self
        .codegen
        .define_global_variable(variable)
        .context(UnimplementedSnafu {
          line: self.current.line,
          lexeme: &self.current.lexeme,
        })?;
    }

    if self.current.kind != TokenKind::Eof {
      return self.syntax_error("extraneous tokens after end of program");
    }

    Ok(self.codegen.finish())
  }

  /// Consume the current token and pull the next one.
  fn advance(&mut self) -> CompileResult<Token> {
    let next = self.tokens.next_token()?;
    Ok(std::mem::replace(&mut self.current, next))
  }

  fn at(&self, kind: TokenKind) -> bool {
    self.current.kind == kind
  }

  fn at_keyword(&self, keyword: Keyword) -> bool {
    self.current.is_keyword(keyword)
  }

  /// Consume the current token if it is of `kind`, fail with `message`
  /// otherwise.
  fn expect(&mut self, kind: TokenKind, message: &str) -> CompileResult<Token> {
    if self.at(kind) {
      self.advance()
    } else {
      self.syntax_error(message)
    }
  }

  fn expect_keyword(&mut self, keyword: Keyword, message: &str) -> CompileResult<()> {
    self.expect(TokenKind::Keyword(keyword), message).map(drop)
  }

  fn syntax_error<T>(&self, message: impl Into<String>) -> CompileResult<T> {
    Err(CompileError::Syntax {
      line: self.current.line,
      lexeme: self.current.lexeme.clone(),
      message: message.into(),
    })
  }

  fn semantic_error<T>(&self, message: impl Into<String>) -> CompileResult<T> {
    Err(CompileError::Semantic {
      line: self.current.line,
      lexeme: self.current.lexeme.clone(),
      message: message.into(),
    })
  }

  /// Run one generator operation, attaching the current position to any
  /// limitation it reports.
  fn generate<T>(
    &mut self,
    emit: impl FnOnce(&mut CodeGen) -> CodegenResult<T>,
  ) -> CompileResult<T> {
    emit(&mut self.codegen).context(UnimplementedSnafu {
      line: self.current.line,
      lexeme: &self.current.lexeme,
    })
  }

  fn check_type(&self, actual: Type, expected: impl Into<Requirement>) -> CompileResult<()> {
    let expected = expected.into();
    if actual.satisfies(expected) {
      Ok(())
    } else {
      self.semantic_error(format!("incompatible types: {actual}, {expected}"))
    }
  }

  fn lookup(&self, name: &str) -> CompileResult<Variable> {
    match self.symbols.lookup(name) {
      Some(variable) => Ok(variable.clone()),
      None => self.semantic_error(format!("use of undeclared identifier '{name}'")),
    }
  }

  fn parse_declarations(&mut self) -> CompileResult<()> {
    if !self.at_keyword(Keyword::Var) {
      return Ok(());
    }
    self.advance()?;

    loop {
      let mut names = Vec::new();
      loop {
        let name = self.expect(
          TokenKind::Identifier,
          "expected variable name in declaration block",
        )?;
        names.push(name.lexeme);
        if !self.at(TokenKind::Comma) {
          break;
        }
        self.advance()?;
      }

      self.expect(
        TokenKind::Colon,
        "expected ':' after variable name list in declaration block",
      )?;
      let ty = self.parse_type()?;
      for name in names {
        self.symbols.declare(name, ty);
      }

      if !self.at(TokenKind::Semicolon) {
        break;
      }
      self.advance()?;
      if !self.at(TokenKind::Identifier) {
        break;
      }
    }

    self.expect(TokenKind::Dot, "expected '.' at end of declaration block")?;
    Ok(())
  }

  fn parse_type(&mut self) -> CompileResult<Type> {
    match self.current.kind {
      TokenKind::TypeName(ty) => {
        self.advance()?;
        Ok(ty)
      }
      _ => self.syntax_error("expected type"),
    }
  }

  fn parse_statement_part(&mut self) -> CompileResult<()> {
    self.parse_statement()?;
    while self.at(TokenKind::Semicolon) {
      self.advance()?;
      self.parse_statement()?;
    }
    self.expect(TokenKind::Dot, "expected '.' (did you forget a ';'?)")?;
    Ok(())
  }

  fn parse_statement(&mut self) -> CompileResult<()> {
    match self.current.kind {
      TokenKind::Keyword(Keyword::If) => self.parse_if_statement(),
      TokenKind::Keyword(Keyword::While) => self.parse_while_statement(),
      TokenKind::Keyword(Keyword::For) => self.parse_for_statement(),
      TokenKind::Keyword(Keyword::Begin) => self.parse_block_statement(),
      TokenKind::Keyword(Keyword::Display) => self.parse_display_statement(),
      TokenKind::Identifier => self.parse_assignment_statement().map(drop),
      _ => self.syntax_error("expected a statement"),
    }
  }

  /// Returns the assigned variable so `FOR` can reuse it as its control
  /// variable.
  fn parse_assignment_statement(&mut self) -> CompileResult<Variable> {
    if !self.at(TokenKind::Identifier) {
      return self.syntax_error("expected an identifier");
    }
    let variable = self.lookup(&self.current.lexeme)?;
    self.advance()?;

    self.expect(TokenKind::Assign, "expected ':=' in variable assignment")?;
    let ty = self.parse_expression()?;
    self.check_type(ty, variable.ty)?;
    self.codegen.store_variable(&variable);

    Ok(variable)
  }

  fn parse_if_statement(&mut self) -> CompileResult<()> {
    self.advance()?;
    let condition = self.parse_expression()?;
    self.check_type(condition, Type::Boolean)?;

    let statement = self.codegen.statement_if_prepare();
    self.codegen.statement_if_post_check(&statement);

    self.expect_keyword(
      Keyword::Then,
      "expected 'THEN' after conditional expression of 'IF' statement",
    )?;
    self.parse_statement()?;

    if self.at_keyword(Keyword::Else) {
      self.codegen.statement_if_with_else(&statement);
      self.advance()?;
      self.parse_statement()?;
    } else {
      self.codegen.statement_if_without_else(&statement);
    }

    self.codegen.statement_if_finalize(statement);
    Ok(())
  }

  fn parse_while_statement(&mut self) -> CompileResult<()> {
    let statement = self.codegen.statement_while_prepare();

    self.advance()?;
    let condition = self.parse_expression()?;
    self.check_type(condition, Type::Boolean)?;
    self.codegen.statement_while_post_check(&statement);

    self.expect_keyword(
      Keyword::Do,
      "expected 'DO' after conditional expression of 'WHILE' statement",
    )?;
    self.parse_statement()?;

    self.codegen.statement_while_finalize(statement);
    Ok(())
  }

  fn parse_for_statement(&mut self) -> CompileResult<()> {
    self.advance()?;
    let variable = self.parse_assignment_statement()?;
    self.check_type(variable.ty, Type::UnsignedInt)?;

    let statement = self.codegen.statement_for_prepare(&variable);
    self.expect_keyword(
      Keyword::To,
      "expected 'TO' after assignment in 'FOR' statement",
    )?;
    self.codegen.statement_for_post_assignment(&statement);

    let bound = self.parse_expression()?;
    self.check_type(bound, Type::UnsignedInt)?;
    self.codegen.statement_for_post_check(&statement);

    self.expect_keyword(
      Keyword::Do,
      "expected 'DO' after bound expression in 'FOR' statement",
    )?;
    self.parse_statement()?;

    self.codegen.statement_for_finalize(statement);
    Ok(())
  }

  fn parse_block_statement(&mut self) -> CompileResult<()> {
    self.advance()?;
    self.parse_statement()?;
    while self.at(TokenKind::Semicolon) {
      self.advance()?;
      self.parse_statement()?;
    }
    self.expect_keyword(Keyword::End, "expected 'END' to finish block statement")
  }

  fn parse_display_statement(&mut self) -> CompileResult<()> {
    self.advance()?;
    let ty = self.parse_expression()?;
    self.generate(|codegen| codegen.debug_display(ty))
  }

  fn parse_expression(&mut self) -> CompileResult<Type> {
    let lhs = self.parse_simple_expression()?;

    let TokenKind::RelOp(op) = self.current.kind else {
      return Ok(lhs);
    };
    self.advance()?;
    let rhs = self.parse_simple_expression()?;
    self.check_type(lhs, rhs)?;
    self.generate(|codegen| codegen.alu_compare(op, lhs))?;

    Ok(Type::Boolean)
  }

  fn parse_simple_expression(&mut self) -> CompileResult<Type> {
    let lhs = self.parse_term()?;

    while let TokenKind::AddOp(op) = self.current.kind {
      self.advance()?;
      let rhs = self.parse_term()?;
      self.check_type(lhs, rhs)?;

      match op {
        AddOp::Or => {
          self.check_type(lhs, Type::Boolean)?;
          self.codegen.alu_or_bool();
        }
        AddOp::Add => {
          self.check_type(lhs, Requirement::Arithmetic)?;
          self.generate(|codegen| codegen.alu_add(lhs))?;
        }
        AddOp::Sub => {
          self.check_type(lhs, Requirement::Arithmetic)?;
          self.generate(|codegen| codegen.alu_sub(lhs))?;
        }
      }
    }

    Ok(lhs)
  }

  fn parse_term(&mut self) -> CompileResult<Type> {
    let lhs = self.parse_factor()?;

    while let TokenKind::MulOp(op) = self.current.kind {
      self.advance()?;
      let rhs = self.parse_factor()?;
      self.check_type(lhs, rhs)?;

      match op {
        MulOp::And => {
          self.check_type(lhs, Type::Boolean)?;
          self.codegen.alu_and_bool();
        }
        MulOp::Mul => {
          self.check_type(lhs, Requirement::Arithmetic)?;
          self.generate(|codegen| codegen.alu_multiply(lhs))?;
        }
        MulOp::Div => {
          self.check_type(lhs, Requirement::Arithmetic)?;
          self.generate(|codegen| codegen.alu_divide(lhs))?;
        }
        MulOp::Mod => {
          self.check_type(lhs, Requirement::Arithmetic)?;
          self.generate(|codegen| codegen.alu_modulus(lhs))?;
        }
      }
    }

    Ok(lhs)
  }

  fn parse_factor(&mut self) -> CompileResult<Type> {
    match self.current.kind {
      TokenKind::LParen => {
        self.advance()?;
        let ty = self.parse_expression()?;
        self.expect(TokenKind::RParen, "expected ')'")?;
        Ok(ty)
      }
      TokenKind::Number => {
        let Ok(value) = self.current.lexeme.parse::<u64>() else {
          return self.semantic_error("integer literal is too large");
        };
        self.codegen.load_i64(value);
        self.advance()?;
        Ok(Type::UnsignedInt)
      }
      TokenKind::Float => {
        let Ok(value) = self.current.lexeme.parse::<f64>() else {
          return self.syntax_error("malformed floating point literal");
        };
        self.codegen.load_f64(value);
        self.advance()?;
        Ok(Type::Double)
      }
      TokenKind::CharLiteral(value) => {
        self.codegen.load_i64(u64::from(value));
        self.advance()?;
        Ok(Type::Char)
      }
      TokenKind::Keyword(keyword @ (Keyword::True | Keyword::False)) => {
        self.codegen.load_i64(if keyword == Keyword::True { u64::MAX } else { 0 });
        self.advance()?;
        Ok(Type::Boolean)
      }
      TokenKind::Not => {
        self.advance()?;
        let ty = self.parse_factor()?;
        self.check_type(ty, Type::Boolean)?;
        self.codegen.alu_not_bool();
        Ok(Type::Boolean)
      }
      TokenKind::TypeName(to) => {
        self.advance()?;
        self.expect(
          TokenKind::LParen,
          "expected '(' after type name in conversion",
        )?;
        let from = self.parse_expression()?;
        self.expect(TokenKind::RParen, "expected ')'")?;
        self.generate(|codegen| codegen.convert(from, to))?;
        Ok(to)
      }
      TokenKind::Identifier => {
        let variable = self.lookup(&self.current.lexeme)?;
        self.codegen.load_variable(&variable);
        self.advance()?;
        Ok(variable.ty)
      }
      _ => self.syntax_error("expected '(', number or identifier"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::{CodegenError, ErrorKind};
  use crate::tokenizer::Tokenizer;

  /// Parser over `source` targeting Linux.
  fn parser(source: &str) -> Parser<Tokenizer<'_>> {
    Parser::new(Tokenizer::new(source), Target::Linux).unwrap()
  }

  fn program_error(source: &str) -> CompileError {
    parser(source).parse_program().unwrap_err()
  }

  /// Parse `source` as a single expression after declaring `x`, `y` as
  /// integers, `b` as a boolean, `c` as a char and `d` as a double.
  fn expression(source: &str) -> (CompileResult<Type>, i64) {
    let mut p = parser(source);
    p.symbols.declare("x", Type::UnsignedInt);
    p.symbols.declare("y", Type::UnsignedInt);
    p.symbols.declare("b", Type::Boolean);
    p.symbols.declare("c", Type::Char);
    p.symbols.declare("d", Type::Double);
    let ty = p.parse_expression();
    (ty, p.codegen.stack_depth())
  }

  #[test]
  fn expressions_leave_exactly_one_value() {
    for source in [
      "1",
      "x + y * 2",
      "(x + 1) * (y - 2) / 3 % 4",
      "x * y == y + x",
      "!(b && TRUE) || b",
      "d * 2.5 - DOUBLE(x)",
      "d % 1.5 + d",
      "INTEGER(d / 3.0) <= x",
      "c == 'a'",
    ] {
      let (ty, depth) = expression(source);
      assert!(ty.is_ok(), "{source}: {ty:?}");
      assert_eq!(depth, 1, "{source}");
    }
  }

  #[test]
  fn expression_types_are_inferred() {
    assert_eq!(expression("x + 1").0.unwrap(), Type::UnsignedInt);
    assert_eq!(expression("x < 1").0.unwrap(), Type::Boolean);
    assert_eq!(expression("d + 1.0").0.unwrap(), Type::Double);
    assert_eq!(expression("CHAR(65)").0.unwrap(), Type::Char);
  }

  #[test]
  fn mismatched_operands_are_semantic_errors() {
    for source in [
      "x + b", "b + b", "c * c", "x && y", "!x", "d == x", "x + 1.0",
    ] {
      let err = expression(source).0.unwrap_err();
      assert_eq!(err.kind(), ErrorKind::Semantic, "{source}");
      assert!(
        err.to_string().starts_with("incompatible types"),
        "{source}"
      );
    }
  }

  #[test]
  fn unsupported_conversions_are_generator_limitations() {
    let err = expression("DOUBLE(b)").0.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unimplemented);
    assert!(matches!(
      err,
      CompileError::Unimplemented {
        source: CodegenError::UnsupportedConversion { .. },
        ..
      }
    ));
  }

  #[test]
  fn undeclared_identifiers_fail_at_first_use() {
    let err = expression("x + z").0.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Semantic);
    assert_eq!(err.lexeme(), Some("z"));
    assert_eq!(err.to_string(), "use of undeclared identifier 'z'");
  }

  #[test]
  fn missing_factor_is_a_syntax_error() {
    let err = expression("x + )").0.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.lexeme(), Some(")"));
  }

  #[test]
  fn declarations_register_each_group() {
    let mut p = parser("VAR a, b : INTEGER; c : BOOLEAN; . ");
    p.parse_declarations().unwrap();
    assert_eq!(p.symbols.iter().count(), 3);
    assert_eq!(
      p.symbols.lookup("b").map(|v| v.ty),
      Some(Type::UnsignedInt)
    );
    assert_eq!(p.symbols.lookup("c").map(|v| v.ty), Some(Type::Boolean));
    assert_eq!(p.current.kind, TokenKind::Eof);
  }

  #[test]
  fn declarations_need_a_type() {
    let err = parser("VAR a : b.").parse_declarations().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.to_string(), "expected type");
  }

  #[test]
  fn statements_report_missing_keywords() {
    for (source, message) in [
      ("VAR b : BOOLEAN. IF b b := b.", "expected 'THEN'"),
      ("VAR b : BOOLEAN. WHILE b b := b.", "expected 'DO'"),
      ("VAR i : INTEGER. FOR i := 0 10 DO i := i.", "expected 'TO'"),
      ("VAR i : INTEGER. BEGIN i := 1; i := 2 .", "expected 'END'"),
      ("VAR i : INTEGER. i 1.", "expected ':='"),
      ("VAR i : INTEGER. i := 1", "expected '.'"),
    ] {
      let err = program_error(source);
      assert_eq!(err.kind(), ErrorKind::Syntax, "{source}");
      assert!(err.to_string().starts_with(message), "{source}: {err}");
    }
  }

  #[test]
  fn conditions_must_be_boolean() {
    let err = program_error("VAR i : INTEGER. IF i THEN i := 1.");
    assert_eq!(err.kind(), ErrorKind::Semantic);

    let err = program_error("VAR i : INTEGER. WHILE 1 DO i := 1.");
    assert_eq!(err.kind(), ErrorKind::Semantic);
  }

  #[test]
  fn for_requires_an_integer_control_variable() {
    let err = program_error("VAR d : DOUBLE. FOR d := 0.0 TO 1.0 DO DISPLAY d.");
    assert_eq!(err.kind(), ErrorKind::Semantic);
  }

  #[test]
  fn assignments_are_type_checked() {
    let err = program_error("VAR b : BOOLEAN. b := 1.");
    assert_eq!(err.kind(), ErrorKind::Semantic);
    assert_eq!(err.to_string(), "incompatible types: INTEGER, BOOLEAN");
  }

  #[test]
  fn trailing_tokens_are_rejected() {
    let err = program_error("VAR i : INTEGER. i := 1. i");
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert_eq!(err.lexeme(), Some("i"));
  }

  #[test]
  fn statements_leave_the_stack_empty() {
    let mut p = parser(
      "VAR i, n : INTEGER; b : BOOLEAN. \
       BEGIN \
         n := 0; \
         FOR i := 0 TO 3 DO n := n + i; \
         WHILE n > 0 DO n := n - 1; \
         IF n == 0 THEN b := TRUE ELSE b := FALSE; \
         DISPLAY b \
       END.",
    );
    p.parse_declarations().unwrap();
    p.parse_statement_part().unwrap();
    assert_eq!(p.codegen.stack_depth(), 0);
  }
}
