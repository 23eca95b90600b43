//! Primitive types of the language and the compatibility rule the type
//! checker applies between operands.

use std::fmt;

/// Concrete type of a value on the evaluation stack or of a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
  UnsignedInt,
  Boolean,
  Char,
  Double,
  Void,
}

/// Argument-passing register class of the System V calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
  Integer,
  Float,
}

/// Right-hand side of a compatibility check: either an exact type or the
/// non-concrete "arithmetic" concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
  Exactly(Type),
  Arithmetic,
}

impl From<Type> for Requirement {
  fn from(ty: Type) -> Self {
    Self::Exactly(ty)
  }
}

impl fmt::Display for Requirement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Exactly(ty) => write!(f, "{ty}"),
      Self::Arithmetic => f.write_str("<arithmetic>"),
    }
  }
}

impl Type {
  /// Resolve a type keyword of the source language.
  pub fn from_keyword(name: &str) -> Option<Self> {
    match name {
      "INTEGER" => Some(Self::UnsignedInt),
      "BOOLEAN" => Some(Self::Boolean),
      "CHAR" => Some(Self::Char),
      "DOUBLE" => Some(Self::Double),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::UnsignedInt => "INTEGER",
      Self::Boolean => "BOOLEAN",
      Self::Char => "CHAR",
      Self::Double => "DOUBLE",
      Self::Void => "VOID",
    }
  }

  /// Storage width in bytes of a global of this type, which is also its
  /// alignment.
  pub fn size(self) -> i64 {
    match self {
      Self::Boolean | Self::Char => 1,
      Self::UnsignedInt | Self::Double => 8,
      Self::Void => 0,
    }
  }

  /// Unsigned integers and characters share one 64-bit stack representation.
  pub fn is_integral(self) -> bool {
    matches!(self, Self::UnsignedInt | Self::Char)
  }

  pub fn is_floating(self) -> bool {
    matches!(self, Self::Double)
  }

  pub fn is_arithmetic(self) -> bool {
    matches!(self, Self::UnsignedInt | Self::Double)
  }

  pub fn register_class(self) -> Option<RegisterClass> {
    match self {
      Self::UnsignedInt | Self::Boolean | Self::Char => Some(RegisterClass::Integer),
      Self::Double => Some(RegisterClass::Float),
      Self::Void => None,
    }
  }

  /// Whether a value of this type satisfies `requirement`.
  pub fn satisfies(self, requirement: impl Into<Requirement>) -> bool {
    match requirement.into() {
      Requirement::Exactly(other) => self == other,
      Requirement::Arithmetic => self.is_arithmetic(),
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_types_are_compatible() {
    assert!(Type::Boolean.satisfies(Type::Boolean));
    assert!(!Type::Boolean.satisfies(Type::UnsignedInt));
    assert!(!Type::Char.satisfies(Type::UnsignedInt));
  }

  #[test]
  fn arithmetic_concept_admits_numbers_only() {
    assert!(Type::UnsignedInt.satisfies(Requirement::Arithmetic));
    assert!(Type::Double.satisfies(Requirement::Arithmetic));
    assert!(!Type::Boolean.satisfies(Requirement::Arithmetic));
    assert!(!Type::Char.satisfies(Requirement::Arithmetic));
    assert!(!Type::Void.satisfies(Requirement::Arithmetic));
  }

  #[test]
  fn keywords_round_trip_through_names() {
    for ty in [Type::UnsignedInt, Type::Boolean, Type::Char, Type::Double] {
      assert_eq!(Type::from_keyword(ty.name()), Some(ty));
    }
    assert_eq!(Type::from_keyword("VOID"), None);
  }

  #[test]
  fn narrow_types_are_one_byte() {
    assert_eq!(Type::Boolean.size(), 1);
    assert_eq!(Type::Char.size(), 1);
    assert_eq!(Type::UnsignedInt.size(), 8);
    assert_eq!(Type::Double.size(), 8);
  }
}
