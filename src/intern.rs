//! Dense string interning for grammar states, words and tags.
//!
//! Every symbol space the parser touches is mapped to contiguous `u32` ids so
//! the chart can be flat arrays instead of hash maps. Ids are stable within
//! one grammar instance.

use std::fmt;

use rustc_hash::FxHashMap;

/// The boundary word appended to every sentence before combined parsing.
pub const BOUNDARY_WORD: &str = ".$.";
/// The tag of the boundary word; also marks root heads in the dependency model.
pub const BOUNDARY_TAG: &str = ".$$.";

/// Wildcard word/tag id in dependency count tables.
pub const ANY: i32 = -1;
/// Id of the generated STOP pseudo-argument.
pub const STOP: i32 = -2;
/// Wildcard distance bucket.
pub const ANY_DISTANCE: i16 = -1;

/// An interning table mapping strings to dense ids and back.
#[derive(Debug, Default, Clone)]
pub struct Index {
  by_str: FxHashMap<String, u32>,
  by_id: Vec<String>,
}

impl Index {
  pub fn new() -> Self {
    Default::default()
  }

  /// Intern a string, returning its id (allocating a fresh one if new).
  pub fn intern(&mut self, s: &str) -> u32 {
    if let Some(&id) = self.by_str.get(s) {
      return id;
    }
    let id = self.by_id.len() as u32;
    self.by_str.insert(s.to_string(), id);
    self.by_id.push(s.to_string());
    id
  }

  /// Look up an already-interned string.
  pub fn id_of(&self, s: &str) -> Option<u32> {
    self.by_str.get(s).copied()
  }

  pub fn resolve(&self, id: u32) -> &str {
    &self.by_id[id as usize]
  }

  pub fn contains(&self, s: &str) -> bool {
    self.by_str.contains_key(s)
  }

  pub fn len(&self) -> usize {
    self.by_id.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_id.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.by_id.iter().map(|s| s.as_str())
  }
}

/// A (word, tag) pair over interned ids. `word`/`tag` are ordinary ids when
/// non-negative; `ANY` (-1) is a wildcard and `STOP` (-2) the generated stop
/// event. The negative encodings are load-bearing: they appear in the
/// dependency model's count tables and text format.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IntTaggedWord {
  pub word: i32,
  pub tag: i32,
}

impl IntTaggedWord {
  pub fn new(word: i32, tag: i32) -> Self {
    Self { word, tag }
  }

  pub fn any() -> Self {
    Self {
      word: ANY,
      tag: ANY,
    }
  }

  pub fn stop() -> Self {
    Self {
      word: STOP,
      tag: STOP,
    }
  }

  pub fn is_stop(&self) -> bool {
    self.word == STOP
  }

  fn field_str<'a>(id: i32, index: &'a Index) -> &'a str {
    match id {
      ANY => "*",
      STOP => "STOP",
      _ => index.resolve(id as u32),
    }
  }

  /// Render as `word/tag` against the given indexes, with sentinels spelled
  /// the way the model text format spells them.
  pub fn display<'a>(&self, words: &'a Index, tags: &'a Index) -> String {
    format!(
      "{}/{}",
      Self::field_str(self.word, words),
      Self::field_str(self.tag, tags)
    )
  }
}

impl fmt::Display for IntTaggedWord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.word, self.tag)
  }
}
