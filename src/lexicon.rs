//! The leaf-scoring seam of the parser.
//!
//! The chart initializes its width-one cells by asking a `Lexicon` which tags
//! a word can carry and how likely each tagging is. Everything else about
//! words (unknown-word signatures, morphology) lives behind this trait.

use std::collections::HashMap;

use crate::intern::IntTaggedWord;

pub trait Lexicon {
  /// The taggings this lexicon allows for `word` at sentence position `loc`.
  fn taggings(&self, word: u32, loc: usize) -> Vec<IntTaggedWord>;

  /// Log-probability of the tagging at `loc`; `-inf` if impossible.
  fn score(&self, tagging: IntTaggedWord, loc: usize) -> f32;
}

/// A plain seen-taggings lexicon: every (word, tag) pair it was given, with
/// its log-probability. Unseen words have no taggings.
#[derive(Debug, Default)]
pub struct HashLexicon {
  taggings: HashMap<u32, Vec<(u32, f32)>>,
}

impl HashLexicon {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn add(&mut self, word: u32, tag: u32, score: f32) {
    let entries = self.taggings.entry(word).or_default();
    match entries.iter_mut().find(|(t, _)| *t == tag) {
      Some(entry) => entry.1 = score,
      None => entries.push((tag, score)),
    }
  }
}

impl Lexicon for HashLexicon {
  fn taggings(&self, word: u32, _loc: usize) -> Vec<IntTaggedWord> {
    self
      .taggings
      .get(&word)
      .map(|entries| {
        entries
          .iter()
          .map(|&(tag, _)| IntTaggedWord::new(word as i32, tag as i32))
          .collect()
      })
      .unwrap_or_default()
  }

  fn score(&self, tagging: IntTaggedWord, _loc: usize) -> f32 {
    if tagging.word < 0 || tagging.tag < 0 {
      return f32::NEG_INFINITY;
    }
    self
      .taggings
      .get(&(tagging.word as u32))
      .and_then(|entries| {
        entries
          .iter()
          .find(|(t, _)| *t == tagging.tag as u32)
          .map(|&(_, s)| s)
      })
      .unwrap_or(f32::NEG_INFINITY)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_lexicon() {
    let mut lex = HashLexicon::new();
    lex.add(0, 1, -0.5);
    lex.add(0, 2, -1.5);

    let tags = lex.taggings(0, 0);
    assert_eq!(tags.len(), 2);
    assert_eq!(lex.score(IntTaggedWord::new(0, 1), 0), -0.5);
    assert_eq!(lex.score(IntTaggedWord::new(0, 3), 0), f32::NEG_INFINITY);
    assert!(lex.taggings(9, 0).is_empty());
  }
}
