use std::hash::{Hash, Hasher};

use crate::intern::Index;

/// A binary production `parent -> left right` with a log-probability score.
///
/// Equality and hashing are structural over the three states only; the score
/// is carried alongside so the unary-closure relaxation (and nothing else)
/// can revise scores without changing rule identity.
#[derive(Debug, Copy, Clone)]
pub struct BinaryRule {
  pub parent: u32,
  pub left: u32,
  pub right: u32,
  pub score: f32,
}

impl BinaryRule {
  pub fn new(parent: u32, left: u32, right: u32, score: f32) -> Self {
    Self {
      parent,
      left,
      right,
      score,
    }
  }
}

impl PartialEq for BinaryRule {
  fn eq(&self, other: &Self) -> bool {
    self.parent == other.parent && self.left == other.left && self.right == other.right
  }
}

impl Eq for BinaryRule {}

impl Hash for BinaryRule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.parent.hash(state);
    self.left.hash(state);
    self.right.hash(state);
  }
}

/// A unary production `parent -> child` with a log-probability score.
#[derive(Debug, Copy, Clone)]
pub struct UnaryRule {
  pub parent: u32,
  pub child: u32,
  pub score: f32,
}

impl UnaryRule {
  pub fn new(parent: u32, child: u32, score: f32) -> Self {
    Self {
      parent,
      child,
      score,
    }
  }
}

impl PartialEq for UnaryRule {
  fn eq(&self, other: &Self) -> bool {
    self.parent == other.parent && self.child == other.child
  }
}

impl Eq for UnaryRule {}

impl Hash for UnaryRule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.parent.hash(state);
    self.child.hash(state);
  }
}

/// Quotes a symbol for the rule text format: wrapped in `"`, with embedded
/// quotes and backslashes escaped by backslash.
pub fn quote_symbol(s: &str) -> String {
  let mut out = String::with_capacity(s.len() + 2);
  out.push('"');
  for c in s.chars() {
    if c == '"' || c == '\\' {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('"');
  out
}

/// Helper for displaying rules against a state index.
pub struct RuleDisplay<'a> {
  pub states: &'a Index,
}

impl RuleDisplay<'_> {
  pub fn binary(&self, r: &BinaryRule) -> String {
    format!(
      "{} -> {} {} {}",
      quote_symbol(self.states.resolve(r.parent)),
      quote_symbol(self.states.resolve(r.left)),
      quote_symbol(self.states.resolve(r.right)),
      r.score
    )
  }

  pub fn unary(&self, r: &UnaryRule) -> String {
    format!(
      "{} -> {} {}",
      quote_symbol(self.states.resolve(r.parent)),
      quote_symbol(self.states.resolve(r.child)),
      r.score
    )
  }
}
