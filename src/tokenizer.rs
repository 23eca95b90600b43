//! Lexical analysis: a pull-based token source over the raw input string.
//!
//! The parser only depends on [`TokenSource`]; [`Tokenizer`] is the stock
//! implementation. Keywords, type names and operators are resolved to closed
//! enumerations here, once, so later stages never compare lexeme text.
//! Two-character operators are matched before single-character ones to avoid
//! ambiguity.

use std::fmt;

use crate::error::{CompileError, CompileResult};
use crate::ty::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
  Var,
  If,
  Then,
  Else,
  While,
  Do,
  For,
  To,
  Begin,
  End,
  Display,
  True,
  False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulOp {
  Mul,
  Div,
  Mod,
  And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOp {
  Add,
  Sub,
  Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Number,
  Float,
  CharLiteral(u8),
  Identifier,
  Keyword(Keyword),
  TypeName(Type),
  MulOp(MulOp),
  AddOp(AddOp),
  RelOp(RelOp),
  Not,
  Assign,
  Comma,
  Colon,
  Semicolon,
  Dot,
  LParen,
  RParen,
  Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub lexeme: String,
  pub line: usize,
}

impl Token {
  pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize) -> Self {
    Self {
      kind,
      lexeme: lexeme.into(),
      line,
    }
  }

  pub fn is_keyword(&self, keyword: Keyword) -> bool {
    self.kind == TokenKind::Keyword(keyword)
  }
}

impl fmt::Display for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {:?} '{}'", self.line, self.kind, self.lexeme)
  }
}

/// Anything the parser can pull tokens from, one at a time.
///
/// Once `Eof` has been returned, every further call returns `Eof` again.
pub trait TokenSource {
  fn next_token(&mut self) -> CompileResult<Token>;
}

const TWO_CHAR_OPERATORS: [(&str, TokenKind); 7] = [
  (":=", TokenKind::Assign),
  ("==", TokenKind::RelOp(RelOp::Eq)),
  ("!=", TokenKind::RelOp(RelOp::Ne)),
  ("<=", TokenKind::RelOp(RelOp::Le)),
  (">=", TokenKind::RelOp(RelOp::Ge)),
  ("&&", TokenKind::MulOp(MulOp::And)),
  ("||", TokenKind::AddOp(AddOp::Or)),
];

fn single_char_operator(c: u8) -> Option<TokenKind> {
  let kind = match c {
    b'*' => TokenKind::MulOp(MulOp::Mul),
    b'/' => TokenKind::MulOp(MulOp::Div),
    b'%' => TokenKind::MulOp(MulOp::Mod),
    b'+' => TokenKind::AddOp(AddOp::Add),
    b'-' => TokenKind::AddOp(AddOp::Sub),
    b'<' => TokenKind::RelOp(RelOp::Lt),
    b'>' => TokenKind::RelOp(RelOp::Gt),
    b'!' => TokenKind::Not,
    b',' => TokenKind::Comma,
    b':' => TokenKind::Colon,
    b';' => TokenKind::Semicolon,
    b'.' => TokenKind::Dot,
    b'(' => TokenKind::LParen,
    b')' => TokenKind::RParen,
    _ => return None,
  };
  Some(kind)
}

fn word_kind(word: &str) -> TokenKind {
  let keyword = match word {
    "VAR" => Keyword::Var,
    "IF" => Keyword::If,
    "THEN" => Keyword::Then,
    "ELSE" => Keyword::Else,
    "WHILE" => Keyword::While,
    "DO" => Keyword::Do,
    "FOR" => Keyword::For,
    "TO" => Keyword::To,
    "BEGIN" => Keyword::Begin,
    "END" => Keyword::End,
    "DISPLAY" => Keyword::Display,
    "TRUE" => Keyword::True,
    "FALSE" => Keyword::False,
    _ => {
      return match Type::from_keyword(word) {
        Some(ty) => TokenKind::TypeName(ty),
        None => TokenKind::Identifier,
      };
    }
  };
  TokenKind::Keyword(keyword)
}

/// Pull-based lexer over a source string.
pub struct Tokenizer<'a> {
  source: &'a str,
  pos: usize,
  line: usize,
}

impl<'a> Tokenizer<'a> {
  pub fn new(source: &'a str) -> Self {
    Self {
      source,
      pos: 0,
      line: 1,
    }
  }

  fn peek_byte(&self, offset: usize) -> Option<u8> {
    self.source.as_bytes().get(self.pos + offset).copied()
  }

  fn error<T>(&self, start: usize, message: impl Into<String>) -> CompileResult<T> {
    let lexeme = self.source[start..].chars().next().map(String::from);
    Err(CompileError::Lexical {
      line: self.line,
      lexeme: lexeme.unwrap_or_default(),
      message: message.into(),
    })
  }

  /// Skip whitespace and comments, counting newlines on the way.
  fn skip_trivia(&mut self) -> CompileResult<()> {
    while let Some(c) = self.peek_byte(0) {
      match c {
        b'\n' => {
          self.line += 1;
          self.pos += 1;
        }
        c if c.is_ascii_whitespace() => self.pos += 1,
        b'/' if self.peek_byte(1) == Some(b'/') => {
          while let Some(c) = self.peek_byte(0)
            && c != b'\n'
          {
            self.pos += 1;
          }
        }
        b'{' => {
          let start = self.pos;
          self.pos += 1;
          loop {
            match self.peek_byte(0) {
              Some(b'}') => {
                self.pos += 1;
                break;
              }
              Some(c) => {
                if c == b'\n' {
                  self.line += 1;
                }
                self.pos += 1;
              }
              None => return self.error(start, "unterminated comment"),
            }
          }
        }
        _ => break,
      }
    }
    Ok(())
  }

  fn lex_number(&mut self, start: usize) -> Token {
    while self.peek_byte(0).is_some_and(|c| c.is_ascii_digit()) {
      self.pos += 1;
    }

    // A dot only belongs to the literal when a digit follows it; otherwise
    // it terminates the program or declaration block.
    let mut kind = TokenKind::Number;
    if self.peek_byte(0) == Some(b'.') && self.peek_byte(1).is_some_and(|c| c.is_ascii_digit()) {
      kind = TokenKind::Float;
      self.pos += 1;
      while self.peek_byte(0).is_some_and(|c| c.is_ascii_digit()) {
        self.pos += 1;
      }
    }

    Token::new(kind, &self.source[start..self.pos], self.line)
  }

  fn lex_char(&mut self, start: usize) -> CompileResult<Token> {
    self.pos += 1;
    let value = match (self.peek_byte(0), self.peek_byte(1)) {
      (Some(b'\\'), Some(escaped)) => {
        self.pos += 2;
        match escaped {
          b'n' => b'\n',
          b't' => b'\t',
          b'0' => 0,
          b'\\' => b'\\',
          b'\'' => b'\'',
          other => {
            let message = format!("unknown escape sequence '\\{}'", other as char);
            return self.error(start, message);
          }
        }
      }
      (Some(c), _) if c.is_ascii() && c != b'\'' && c != b'\n' => {
        self.pos += 1;
        c
      }
      _ => return self.error(start, "invalid character literal"),
    };

    if self.peek_byte(0) != Some(b'\'') {
      return self.error(start, "unterminated character literal");
    }
    self.pos += 1;

    Ok(Token::new(
      TokenKind::CharLiteral(value),
      &self.source[start..self.pos],
      self.line,
    ))
  }
}

impl TokenSource for Tokenizer<'_> {
  fn next_token(&mut self) -> CompileResult<Token> {
    self.skip_trivia()?;

    let start = self.pos;
    let Some(c) = self.peek_byte(0) else {
      return Ok(Token::new(TokenKind::Eof, "", self.line));
    };

    if c.is_ascii_digit() {
      return Ok(self.lex_number(start));
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      while self
        .peek_byte(0)
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
      {
        self.pos += 1;
      }
      let word = &self.source[start..self.pos];
      return Ok(Token::new(word_kind(word), word, self.line));
    }

    if c == b'\'' {
      return self.lex_char(start);
    }

    let rest = &self.source[start..];
    if let Some((text, kind)) = TWO_CHAR_OPERATORS
      .into_iter()
      .find(|(text, _)| rest.starts_with(*text))
    {
      self.pos += text.len();
      return Ok(Token::new(kind, text, self.line));
    }

    if let Some(kind) = single_char_operator(c) {
      self.pos += 1;
      return Ok(Token::new(kind, &rest[..1], self.line));
    }

    let invalid_char = rest.chars().next().unwrap_or('\0');
    self.error(start, format!("invalid token: '{invalid_char}'"))
  }
}

/// Lex the whole input into a vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokenizer = Tokenizer::new(input);
  let mut tokens = Vec::new();
  loop {
    let token = tokenizer.next_token()?;
    let done = token.kind == TokenKind::Eof;
    tokens.push(token);
    if done {
      return Ok(tokens);
    }
  }
}
