//! Single global scope of declared variables.

use std::collections::HashMap;

use crate::ty::Type;

/// A process-global variable of the compiled program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
  pub name: String,
  pub ty: Type,
}

/// Append-only mapping from names to variables, iterated in declaration
/// order so the data section is laid out the way the program declared it.
#[derive(Debug, Default)]
pub struct SymbolTable {
  variables: Vec<Variable>,
  index: HashMap<String, usize>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `name`. A name that is already declared keeps its first type;
  /// there is no shadowing and no duplicate diagnostic.
  pub fn declare(&mut self, name: impl Into<String>, ty: Type) -> &Variable {
    let name = name.into();
    let slot = match self.index.get(&name) {
      Some(&slot) => slot,
      None => {
        let slot = self.variables.len();
        self.index.insert(name.clone(), slot);
        self.variables.push(Variable { name, ty });
        slot
      }
    };
    &self.variables[slot]
  }

  pub fn lookup(&self, name: &str) -> Option<&Variable> {
    self.index.get(name).map(|&slot| &self.variables[slot])
  }

  pub fn iter(&self) -> impl Iterator<Item = &Variable> {
    self.variables.iter()
  }
}
