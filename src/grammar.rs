//! Indexed storage for binary and unary grammar rules.
//!
//! Grammars are built in two phases: a mutable builder accepts rules during
//! training or deserialization, and `compile()` consumes it to produce an
//! immutable grammar with every derived table (split-rule arrays, unary
//! closure) materialized. Parsing code only ever sees the compiled type, so
//! querying an unfinalized grammar is unrepresentable.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::intern::Index;
use crate::rules::{BinaryRule, UnaryRule};

/// Marker prefix for binarization-introduced states.
pub const SYNTHETIC_PREFIX: char = '@';

pub fn is_synthetic_name(name: &str) -> bool {
  name.starts_with(SYNTHETIC_PREFIX)
}

static NO_BINARIES: &[BinaryRule] = &[];
static NO_UNARIES: &[UnaryRule] = &[];

/// Accumulates binary rules before compilation.
#[derive(Debug, Default)]
pub struct BinaryGrammarBuilder {
  rules: Vec<BinaryRule>,
  seen: FxHashMap<(u32, u32, u32), usize>,
}

impl BinaryGrammarBuilder {
  pub fn new() -> Self {
    Default::default()
  }

  /// Insert a rule. Re-adding an existing rule keeps the better score.
  pub fn add_rule(&mut self, rule: BinaryRule) {
    let key = (rule.parent, rule.left, rule.right);
    if let Some(&i) = self.seen.get(&key) {
      if rule.score > self.rules[i].score {
        self.rules[i].score = rule.score;
      }
    } else {
      self.seen.insert(key, self.rules.len());
      self.rules.push(rule);
    }
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// Finalize into an immutable grammar over the given state inventory.
  pub fn compile(self, states: &Index) -> BinaryGrammar {
    let n = states.len();
    let synthetic: Vec<bool> = states.iter().map(is_synthetic_name).collect();

    let mut by_parent = vec![Vec::new(); n];
    let mut by_left = vec![Vec::new(); n];
    let mut by_right = vec![Vec::new(); n];
    let mut scores = FxHashMap::default();

    for r in &self.rules {
      by_parent[r.parent as usize].push(*r);
      by_left[r.left as usize].push(*r);
      by_right[r.right as usize].push(*r);
      scores.insert((r.parent, r.left, r.right), r.score);
    }

    // The split arrays are the CKY inner-loop rule lists: from a known child
    // state, only rules whose other child could actually sit next to it.
    // A synthetic sibling is only reachable while we are inside the same
    // binarized chain, so rules with a synthetic other-child are admitted
    // only from synthetic states.
    let mut split_with_lc = vec![Vec::new(); n];
    let mut split_with_rc = vec![Vec::new(); n];
    for r in &self.rules {
      if synthetic[r.left as usize] || !synthetic[r.right as usize] {
        split_with_lc[r.left as usize].push(*r);
      }
      if synthetic[r.right as usize] || !synthetic[r.left as usize] {
        split_with_rc[r.right as usize].push(*r);
      }
    }

    debug!(
      rules = self.rules.len(),
      states = n,
      "compiled binary grammar"
    );

    BinaryGrammar {
      num_states: n,
      synthetic,
      rules: self.rules,
      by_parent,
      by_left,
      by_right,
      split_with_lc,
      split_with_rc,
      scores,
    }
  }
}

/// Immutable, fully indexed binary grammar.
#[derive(Debug)]
pub struct BinaryGrammar {
  num_states: usize,
  synthetic: Vec<bool>,
  rules: Vec<BinaryRule>,
  by_parent: Vec<Vec<BinaryRule>>,
  by_left: Vec<Vec<BinaryRule>>,
  by_right: Vec<Vec<BinaryRule>>,
  split_with_lc: Vec<Vec<BinaryRule>>,
  split_with_rc: Vec<Vec<BinaryRule>>,
  scores: FxHashMap<(u32, u32, u32), f32>,
}

impl BinaryGrammar {
  pub fn num_states(&self) -> usize {
    self.num_states
  }

  pub fn num_rules(&self) -> usize {
    self.rules.len()
  }

  pub fn all_rules(&self) -> &[BinaryRule] {
    &self.rules
  }

  pub fn is_synthetic(&self, state: u32) -> bool {
    self.synthetic.get(state as usize).copied().unwrap_or(false)
  }

  fn slice(from: &[Vec<BinaryRule>], state: u32) -> &[BinaryRule] {
    from.get(state as usize).map_or(NO_BINARIES, Vec::as_slice)
  }

  /// Rules with this parent. Out-of-range states yield an empty list.
  pub fn rules_by_parent(&self, state: u32) -> &[BinaryRule] {
    Self::slice(&self.by_parent, state)
  }

  pub fn rules_by_left_child(&self, state: u32) -> &[BinaryRule] {
    Self::slice(&self.by_left, state)
  }

  pub fn rules_by_right_child(&self, state: u32) -> &[BinaryRule] {
    Self::slice(&self.by_right, state)
  }

  /// Rules admissible in the inner loop when `state` is the known left child.
  pub fn split_rules_with_lc(&self, state: u32) -> &[BinaryRule] {
    Self::slice(&self.split_with_lc, state)
  }

  /// Rules admissible in the inner loop when `state` is the known right child.
  pub fn split_rules_with_rc(&self, state: u32) -> &[BinaryRule] {
    Self::slice(&self.split_with_rc, state)
  }

  pub fn score_of(&self, parent: u32, left: u32, right: u32) -> Option<f32> {
    self.scores.get(&(parent, left, right)).copied()
  }
}

/// Accumulates unary rules, maintaining the transitive closure incrementally:
/// every `add_rule` composes the new rule with all existing closure entries on
/// both sides, so the closure is complete after each insertion rather than
/// recomputed by a global fixed point.
#[derive(Debug, Default)]
pub struct UnaryGrammarBuilder {
  rules: Vec<UnaryRule>,
  seen: FxHashMap<(u32, u32), usize>,
  closed: FxHashMap<(u32, u32), f32>,
  // adjacency over closure entries: sources reaching s / targets reachable from s
  ends_at: FxHashMap<u32, Vec<u32>>,
  starts_at: FxHashMap<u32, Vec<u32>>,
}

impl UnaryGrammarBuilder {
  pub fn new() -> Self {
    Default::default()
  }

  /// Seed the identity entry `s -> s` (score 0) that anchors relaxation.
  fn ensure_state(&mut self, s: u32) {
    if !self.closed.contains_key(&(s, s)) {
      self.closed.insert((s, s), 0.0);
      self.ends_at.entry(s).or_default().push(s);
      self.starts_at.entry(s).or_default().push(s);
    }
  }

  fn relax(&mut self, from: u32, to: u32, score: f32) {
    match self.closed.get_mut(&(from, to)) {
      Some(existing) => {
        if score > *existing {
          *existing = score;
        }
      }
      None => {
        self.closed.insert((from, to), score);
        self.ends_at.entry(to).or_default().push(from);
        self.starts_at.entry(from).or_default().push(to);
      }
    }
  }

  /// Insert a rule and immediately re-close around it.
  pub fn add_rule(&mut self, rule: UnaryRule) {
    self.ensure_state(rule.parent);
    self.ensure_state(rule.child);

    match self.seen.get(&(rule.parent, rule.child)) {
      Some(&i) => {
        if rule.score > self.rules[i].score {
          self.rules[i].score = rule.score;
        }
      }
      None => {
        self.seen.insert((rule.parent, rule.child), self.rules.len());
        self.rules.push(rule);
      }
    }

    let sources = self.ends_at.get(&rule.parent).cloned().unwrap_or_default();
    let targets = self.starts_at.get(&rule.child).cloned().unwrap_or_default();
    for &x in &sources {
      let lead = self.closed[&(x, rule.parent)];
      for &y in &targets {
        let tail = self.closed[&(rule.child, y)];
        self.relax(x, y, lead + rule.score + tail);
      }
    }
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// Finalize: purge the identity self-loops (they only exist to seed the
  /// relaxation) and materialize the per-state closed rule arrays.
  pub fn compile(self, states: &Index) -> UnaryGrammar {
    let n = states.len();

    let mut by_parent = vec![Vec::new(); n];
    let mut by_child = vec![Vec::new(); n];
    for r in &self.rules {
      by_parent[r.parent as usize].push(*r);
      by_child[r.child as usize].push(*r);
    }

    let mut closed_by_parent = vec![Vec::new(); n];
    let mut closed_by_child = vec![Vec::new(); n];
    let mut closed_scores = FxHashMap::default();
    for (&(parent, child), &score) in &self.closed {
      if parent == child {
        continue;
      }
      let rule = UnaryRule::new(parent, child, score);
      closed_by_parent[parent as usize].push(rule);
      closed_by_child[child as usize].push(rule);
      closed_scores.insert((parent, child), score);
    }

    debug!(
      rules = self.rules.len(),
      closed = closed_scores.len(),
      "compiled unary grammar"
    );

    UnaryGrammar {
      rules: self.rules,
      by_parent,
      by_child,
      closed_by_parent,
      closed_by_child,
      closed_scores,
    }
  }
}

/// Immutable unary grammar with its transitive closure.
#[derive(Debug)]
pub struct UnaryGrammar {
  rules: Vec<UnaryRule>,
  by_parent: Vec<Vec<UnaryRule>>,
  by_child: Vec<Vec<UnaryRule>>,
  closed_by_parent: Vec<Vec<UnaryRule>>,
  closed_by_child: Vec<Vec<UnaryRule>>,
  closed_scores: FxHashMap<(u32, u32), f32>,
}

impl UnaryGrammar {
  pub fn num_rules(&self) -> usize {
    self.rules.len()
  }

  pub fn all_rules(&self) -> &[UnaryRule] {
    &self.rules
  }

  fn slice(from: &[Vec<UnaryRule>], state: u32) -> &[UnaryRule] {
    from.get(state as usize).map_or(NO_UNARIES, Vec::as_slice)
  }

  /// Raw (non-closed) rules, used when reconstructing trees: the chart was
  /// filled with the closed grammar, but every intermediate state of a chain
  /// was also built, so recovery can walk single steps.
  pub fn rules_by_parent(&self, state: u32) -> &[UnaryRule] {
    Self::slice(&self.by_parent, state)
  }

  pub fn rules_by_child(&self, state: u32) -> &[UnaryRule] {
    Self::slice(&self.by_child, state)
  }

  /// Best-score closed chains ending in this child.
  pub fn closed_rules_by_child(&self, state: u32) -> &[UnaryRule] {
    Self::slice(&self.closed_by_child, state)
  }

  /// Best-score closed chains headed by this parent.
  pub fn closed_rules_by_parent(&self, state: u32) -> &[UnaryRule] {
    Self::slice(&self.closed_by_parent, state)
  }

  pub fn closed_score(&self, parent: u32, child: u32) -> Option<f32> {
    self.closed_scores.get(&(parent, child)).copied()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn states(names: &[&str]) -> Index {
    let mut idx = Index::new();
    for n in names {
      idx.intern(n);
    }
    idx
  }

  #[test]
  fn test_binary_indexes_are_exact() {
    let idx = states(&["S", "NP", "VP", "PP"]);
    let mut b = BinaryGrammarBuilder::new();
    b.add_rule(BinaryRule::new(0, 1, 2, -0.1));
    b.add_rule(BinaryRule::new(2, 2, 3, -0.7));
    let g = b.compile(&idx);

    assert_eq!(g.rules_by_parent(0), &[BinaryRule::new(0, 1, 2, -0.1)]);
    assert_eq!(g.rules_by_left_child(1).len(), 1);
    assert_eq!(g.rules_by_right_child(2).len(), 1);
    assert_eq!(g.rules_by_right_child(3).len(), 1);
    assert_eq!(g.rules_by_parent(1), &[]);
    assert_eq!(g.score_of(2, 2, 3), Some(-0.7));
    assert_eq!(g.score_of(2, 3, 2), None);
  }

  #[test]
  fn test_out_of_range_state_is_empty_not_panic() {
    let idx = states(&["S"]);
    let g = BinaryGrammarBuilder::new().compile(&idx);
    assert_eq!(g.rules_by_parent(999), &[]);
    assert_eq!(g.split_rules_with_lc(999), &[]);

    let ug = UnaryGrammarBuilder::new().compile(&idx);
    assert_eq!(ug.closed_rules_by_child(999), &[]);
  }

  #[test]
  fn test_split_rules_filter_synthetic_siblings() {
    let idx = states(&["S", "NP", "@S|NP"]);
    let mut b = BinaryGrammarBuilder::new();
    // S -> NP @S|NP : synthetic right child
    b.add_rule(BinaryRule::new(0, 1, 2, -0.2));
    // S -> NP NP : plain
    b.add_rule(BinaryRule::new(0, 1, 1, -0.4));
    let g = b.compile(&idx);

    // from NP (non-synthetic) as left child, the synthetic-sibling rule is
    // filtered out
    let lc: Vec<_> = g.split_rules_with_lc(1).iter().map(|r| r.right).collect();
    assert_eq!(lc, vec![1]);
    // but from the synthetic state's own perspective the rule survives
    assert_eq!(g.split_rules_with_rc(2).len(), 1);
    // and the full by-left index still has both
    assert_eq!(g.rules_by_left_child(1).len(), 2);
  }

  #[test]
  fn test_unary_closure_transitive() {
    let idx = states(&["A", "B", "C", "D"]);
    let mut u = UnaryGrammarBuilder::new();
    u.add_rule(UnaryRule::new(0, 1, -1.0)); // A -> B
    u.add_rule(UnaryRule::new(1, 2, -2.0)); // B -> C
    u.add_rule(UnaryRule::new(2, 3, -4.0)); // C -> D
    // direct but worse A -> C
    u.add_rule(UnaryRule::new(0, 2, -5.0));
    let g = u.compile(&idx);

    assert_eq!(g.closed_score(0, 1), Some(-1.0));
    // best A -> C goes through B
    assert_eq!(g.closed_score(0, 2), Some(-3.0));
    assert_eq!(g.closed_score(0, 3), Some(-7.0));
    assert_eq!(g.closed_score(1, 3), Some(-6.0));
    // identity self-loops are purged at compile time
    assert_eq!(g.closed_score(0, 0), None);
    // raw rules keep the original scores
    assert_eq!(g.rules_by_parent(0).len(), 2);
  }

  #[test]
  fn test_unary_closure_insertion_order_independent() {
    let idx = states(&["A", "B", "C"]);
    // add the tail of the chain first; the head must still compose
    let mut u = UnaryGrammarBuilder::new();
    u.add_rule(UnaryRule::new(1, 2, -2.0)); // B -> C
    u.add_rule(UnaryRule::new(0, 1, -1.0)); // A -> B
    let g = u.compile(&idx);
    assert_eq!(g.closed_score(0, 2), Some(-3.0));
  }
}
