use std::fmt;

#[derive(Debug, PartialEq, Clone)]
pub struct Constituent<T> {
  pub value: T,
  pub span: (usize, usize),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Word<U> {
  pub value: U,
  pub span: (usize, usize),
}

#[derive(Debug, PartialEq, Clone)]
pub enum SynTree<T, U> {
  Branch(Constituent<T>, Vec<SynTree<T, U>>),
  Leaf(Word<U>),
}

impl<T, U> SynTree<T, U> {
  pub fn is_leaf(&self) -> bool {
    match self {
      Self::Leaf(_) => true,
      _ => false,
    }
  }

  pub fn get_leaf(&self) -> Option<&Word<U>> {
    match self {
      Self::Leaf(w) => Some(w),
      _ => None,
    }
  }

  pub fn get_branch(&self) -> Option<(&Constituent<T>, &Vec<SynTree<T, U>>)> {
    match self {
      Self::Branch(c, cs) => Some((c, cs)),
      _ => None,
    }
  }

  pub fn span(&self) -> (usize, usize) {
    match self {
      Self::Branch(c, _) => c.span,
      Self::Leaf(w) => w.span,
    }
  }
}

impl<T, U> SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  /// Single-line bracketed form: `(S (NP John) (VP ran))`.
  pub fn bracketed(&self) -> String {
    self.to_string()
  }
}

impl<T, U> fmt::Display for SynTree<T, U>
where
  T: fmt::Display,
  U: fmt::Display,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf(w) => write!(f, "{}", w.value),
      Self::Branch(c, children) => {
        write!(f, "({}", c.value)?;
        for child in children {
          write!(f, " {}", child)?;
        }
        write!(f, ")")
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn leaf(value: &str, at: usize) -> SynTree<String, String> {
    SynTree::Leaf(Word {
      value: value.to_string(),
      span: (at, at + 1),
    })
  }

  fn branch(
    value: &str,
    span: (usize, usize),
    children: Vec<SynTree<String, String>>,
  ) -> SynTree<String, String> {
    SynTree::Branch(
      Constituent {
        value: value.to_string(),
        span,
      },
      children,
    )
  }

  #[test]
  fn test_bracketed() {
    let t = branch(
      "S",
      (0, 2),
      vec![
        branch("NP", (0, 1), vec![leaf("John", 0)]),
        branch("VP", (1, 2), vec![leaf("ran", 1)]),
      ],
    );
    assert_eq!(t.bracketed(), "(S (NP John) (VP ran))");
    assert_eq!(t.span(), (0, 2));
  }
}
