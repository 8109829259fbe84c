//! The CKY inside-score engine, in exhaustive and iterative-deepening forms.
//!
//! One `ChartParser` is a per-sentence query object: it borrows the compiled
//! grammars and lexicon (shared, read-only) and owns every score array it
//! fills. The inside recurrence enumerates binary rules from both children
//! using the narrow/wide extent intersection to bound split points, then
//! applies the closed unary rules to each finished cell.
//!
//! The iterative-deepening variant (Tsuruoka & Tsujii 2004) runs the same
//! recurrence but only commits scores above a threshold, lowering the
//! threshold per outer iteration until the goal is built or an iteration
//! prunes nothing, which proves no parse exists at any threshold.

use regex::Regex;
use tracing::{debug, trace};

use crate::chart::{Extents, Possibles, ScoreChart, WordsChart};
use crate::grammar::{BinaryGrammar, UnaryGrammar};
use crate::hooks::Hook;
use crate::intern::Index;
use crate::lexicon::Lexicon;
use crate::syntree::{Constituent, SynTree, Word};
use crate::utils::matches;

/// Per-iteration threshold step for iterative deepening (Tsuruoka & Tsujii).
pub const ITERATIVE_STEP: f32 = -11.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchStrategy {
  #[default]
  Exhaustive,
  IterativeDeepening,
}

/// A span-level requirement supplied by the caller: a completed span exactly
/// matching `[start, end)` must have a state label matching `state_pattern`,
/// and no rule application may introduce a split that straddles the boundary.
#[derive(Debug, Clone)]
pub struct ParserConstraint {
  pub start: usize,
  pub end: usize,
  pub state_pattern: Regex,
}

impl ParserConstraint {
  pub fn new(start: usize, end: usize, pattern: &str) -> Result<Self, crate::Err> {
    Ok(Self {
      start,
      end,
      state_pattern: Regex::new(pattern)?,
    })
  }
}

/// The inside/outside score capability the hook-chart stage consumes.
pub trait Scorer {
  fn i_score(&self, start: usize, end: usize, state: u32) -> f64;
  fn o_score(&self, start: usize, end: usize, state: u32) -> f64;
  fn i_possible(&self, hook: &Hook) -> bool;
  fn o_possible(&self, hook: &Hook) -> bool;
}

pub struct ChartParser<'a> {
  bg: &'a BinaryGrammar,
  ug: &'a UnaryGrammar,
  lex: &'a dyn Lexicon,
  states: &'a Index,
  word_index: &'a Index,
  /// state id -> tag id for preterminal states
  state_to_tag: &'a [Option<u32>],
  /// tag id -> state id
  tag_to_state: &'a [u32],
  goal: u32,
  num_states: usize,
  strategy: SearchStrategy,
  length_normalization: bool,
  /// word id treated as the sentence boundary, if the caller appends one
  boundary_word: Option<u32>,

  constraints: Vec<ParserConstraint>,

  // per-sentence state, rebuilt by parse()
  length: usize,
  words: Vec<u32>,
  iscore: Option<ScoreChart>,
  oscore: Option<ScoreChart>,
  words_in_span: Option<WordsChart>,
  extents: Option<Extents>,
  possibles: Option<Possibles>,
  best_score: f32,
}

impl<'a> ChartParser<'a> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    bg: &'a BinaryGrammar,
    ug: &'a UnaryGrammar,
    lex: &'a dyn Lexicon,
    states: &'a Index,
    word_index: &'a Index,
    state_to_tag: &'a [Option<u32>],
    tag_to_state: &'a [u32],
    goal: u32,
  ) -> Self {
    Self {
      bg,
      ug,
      lex,
      states,
      word_index,
      state_to_tag,
      tag_to_state,
      goal,
      num_states: bg.num_states(),
      strategy: SearchStrategy::Exhaustive,
      length_normalization: false,
      boundary_word: None,
      constraints: Vec::new(),
      length: 0,
      words: Vec::new(),
      iscore: None,
      oscore: None,
      words_in_span: None,
      extents: None,
      possibles: None,
      best_score: f32::NEG_INFINITY,
    }
  }

  pub fn set_strategy(&mut self, strategy: SearchStrategy) {
    self.strategy = strategy;
  }

  pub fn set_length_normalization(&mut self, on: bool) {
    self.length_normalization = on;
  }

  pub fn set_boundary_word(&mut self, word: Option<u32>) {
    self.boundary_word = word;
  }

  pub fn set_constraints(&mut self, constraints: Vec<ParserConstraint>) {
    self.constraints = constraints;
  }

  pub fn goal(&self) -> u32 {
    self.goal
  }

  pub fn length(&self) -> usize {
    self.length
  }

  pub fn words(&self) -> &[u32] {
    &self.words
  }

  pub fn states(&self) -> &Index {
    self.states
  }

  pub fn word_index(&self) -> &Index {
    self.word_index
  }

  pub fn binary_grammar(&self) -> &BinaryGrammar {
    self.bg
  }

  pub fn unary_grammar(&self) -> &UnaryGrammar {
    self.ug
  }

  pub fn lexicon(&self) -> &dyn Lexicon {
    self.lex
  }

  pub fn is_tag_state(&self, state: u32) -> bool {
    self
      .state_to_tag
      .get(state as usize)
      .map_or(false, Option::is_some)
  }

  pub fn tag_of_state(&self, state: u32) -> Option<u32> {
    self.state_to_tag.get(state as usize).copied().flatten()
  }

  pub fn state_of_tag(&self, tag: u32) -> u32 {
    self.tag_to_state[tag as usize]
  }

  /// Parse a sentence of interned word ids. Returns whether the goal state
  /// covers the whole input.
  pub fn parse(&mut self, words: &[u32]) -> bool {
    let length = words.len();
    self.length = length;
    self.words = words.to_vec();
    self.oscore = None;
    self.possibles = None;

    let mut iscore = ScoreChart::new(length, self.num_states);
    let mut extents = Extents::new(length, self.num_states);
    self.words_in_span = if self.length_normalization {
      Some(WordsChart::new(length, self.num_states))
    } else {
      None
    };

    self.initialize_chart(&mut iscore, &mut extents);
    self.iscore = Some(iscore);
    self.extents = Some(extents);

    if length >= 2 {
      match self.strategy {
        SearchStrategy::Exhaustive => {
          self.do_inside_scores(None);
        }
        SearchStrategy::IterativeDeepening => {
          let mut threshold = ITERATIVE_STEP;
          loop {
            let pruned = self.do_inside_scores(Some(threshold));
            if self.goal_built() || !pruned {
              break;
            }
            threshold += ITERATIVE_STEP;
          }
        }
      }
    }

    self.best_score = self.iscore.as_ref().unwrap().get(0, length, self.goal);
    debug!(
      length,
      goal = self.states.resolve(self.goal),
      score = self.best_score,
      "inside pass done"
    );
    self.has_parse()
  }

  pub fn has_parse(&self) -> bool {
    self.best_score > f32::NEG_INFINITY
  }

  pub fn best_score(&self) -> f32 {
    self.best_score
  }

  fn goal_built(&self) -> bool {
    self
      .iscore
      .as_ref()
      .map_or(false, |c| c.get(0, self.length, self.goal) > f32::NEG_INFINITY)
  }

  /// Width-one cells: every tagging the lexicon allows, then closed unary
  /// chains terminating in those tags.
  fn initialize_chart(&self, iscore: &mut ScoreChart, extents: &mut Extents) {
    for start in 0..self.length {
      let end = start + 1;
      let word = self.words[start];

      for tagging in self.lex.taggings(word, start) {
        let state = self.tag_to_state[tagging.tag as usize];
        let score = self.lex.score(tagging, start);
        if score > f32::NEG_INFINITY && score > iscore.get(start, end, state) {
          iscore.set(start, end, state, score);
          extents.observe_minmax(start, end, state);
        }
      }

      // unary rules (possibly chains) that terminate in tags
      for state in 0..self.num_states as u32 {
        let is = iscore.get(start, end, state);
        if is == f32::NEG_INFINITY {
          continue;
        }
        for ur in self.ug.closed_rules_by_child(state) {
          let tot = is + ur.score;
          if tot > iscore.get(start, end, ur.parent) {
            iscore.set(start, end, ur.parent, tot);
            extents.observe_minmax(start, end, ur.parent);
          }
        }
      }
    }
  }

  /// One full inside pass. With a threshold, scores at or below it are not
  /// committed; returns whether anything was withheld.
  fn do_inside_scores(&mut self, threshold: Option<f32>) -> bool {
    let mut pruned = false;
    let length = self.length;
    // the boundary symbol only combines over the whole sentence span, so
    // spans that touch the final position are skipped below the top width
    let boundary_last = self
      .boundary_word
      .map_or(false, |b| self.words.last() == Some(&b));

    for diff in 2..=length {
      let start_limit = if diff == length {
        1
      } else if boundary_last {
        length - diff
      } else {
        length - diff + 1
      };
      for start in 0..start_limit {
        pruned |= self.do_inside_chart_cell(start, start + diff, threshold);
      }
    }
    pruned
  }

  fn span_blocked_by_constraints(&self, start: usize, end: usize) -> bool {
    self.constraints.iter().any(|c| {
      (start > c.start && start < c.end && end > c.end)
        || (end > c.start && end < c.end && start < c.start)
    })
  }

  fn split_blocked_by_constraints(
    &self,
    start: usize,
    end: usize,
    split: usize,
    left_state: u32,
    right_state: u32,
  ) -> bool {
    for c in &self.constraints {
      if ((start < c.start && end >= c.end) || (start <= c.start && end > c.end))
        && split > c.start
        && split < c.end
      {
        return true;
      }
      if start == c.start && split == c.end {
        let label = self.states.resolve(left_state);
        if !c.state_pattern.is_match(label) {
          return true;
        }
      }
      if split == c.start && end == c.end {
        let label = self.states.resolve(right_state);
        if !c.state_pattern.is_match(label) {
          return true;
        }
      }
    }
    false
  }

  fn unary_blocked_by_constraints(&self, start: usize, end: usize, parent: u32) -> bool {
    self.constraints.iter().any(|c| {
      start == c.start && end == c.end && !c.state_pattern.is_match(self.states.resolve(parent))
    })
  }

  /// The inner CKY cell computation: left-child-indexed rules, then
  /// right-child-indexed rules, then closed unaries. Returns whether any
  /// improvement was withheld by the threshold.
  fn do_inside_chart_cell(&mut self, start: usize, end: usize, threshold: Option<f32>) -> bool {
    if self.span_blocked_by_constraints(start, end) {
      return false;
    }
    let mut pruned = false;

    let mut iscore = self.iscore.take().expect("chart allocated by parse()");
    let mut extents = self.extents.take().expect("extents allocated by parse()");
    let mut words_in_span = self.words_in_span.take();

    trace!(start, end, "inside cell");

    // rules indexed by left child
    for left_state in 0..self.num_states as u32 {
      let narrow_r = extents.narrow_r(start, left_state);
      if narrow_r >= end as i32 {
        // no room left for a right constituent
        continue;
      }
      for rule in self.bg.split_rules_with_lc(left_state) {
        let right_child = rule.right;
        let narrow_l = extents.narrow_l(end, right_child);
        if narrow_l < narrow_r {
          continue;
        }
        let min = narrow_r.max(extents.wide_l(end, right_child));
        let max = extents.wide_r(start, left_state).min(narrow_l);
        if min > max {
          continue;
        }
        pruned |= self.relax_binary(
          &mut iscore,
          &mut extents,
          words_in_span.as_mut(),
          start,
          end,
          min as usize,
          max as usize,
          left_state,
          right_child,
          rule.parent,
          rule.score,
          threshold,
        );
      }
    }

    // rules indexed by right child
    for right_state in 0..self.num_states as u32 {
      let narrow_l = extents.narrow_l(end, right_state);
      if narrow_l <= start as i32 {
        continue;
      }
      for rule in self.bg.split_rules_with_rc(right_state) {
        let left_child = rule.left;
        let narrow_r = extents.narrow_r(start, left_child);
        if narrow_r > narrow_l {
          continue;
        }
        let min = narrow_r.max(extents.wide_l(end, right_state));
        if min > narrow_l {
          continue;
        }
        let max = extents.wide_r(start, left_child).min(narrow_l);
        if min > max {
          continue;
        }
        pruned |= self.relax_binary(
          &mut iscore,
          &mut extents,
          words_in_span.as_mut(),
          start,
          end,
          min as usize,
          max as usize,
          left_child,
          right_state,
          rule.parent,
          rule.score,
          threshold,
        );
      }
    }

    // closed unary rules over the finished cell
    for state in 0..self.num_states as u32 {
      let is = iscore.get(start, end, state);
      if is == f32::NEG_INFINITY {
        continue;
      }
      for ur in self.ug.closed_rules_by_child(state) {
        if self.unary_blocked_by_constraints(start, end, ur.parent) {
          continue;
        }
        let tot = is + ur.score;
        let cur = iscore.get(start, end, ur.parent);
        let found_better = if let Some(wis) = words_in_span.as_ref() {
          let norm_tot = tot / wis.get(start, end, state) as f32;
          let norm_cur = cur / wis.get(start, end, ur.parent) as f32;
          norm_tot > norm_cur
        } else {
          tot > cur
        };
        if found_better {
          if threshold.map_or(true, |t| tot > t) {
            if let Some(wis) = words_in_span.as_mut() {
              let child_words = wis.get(start, end, state);
              wis.set(start, end, ur.parent, child_words);
            }
            iscore.set(start, end, ur.parent, tot);
            if cur == f32::NEG_INFINITY {
              extents.observe_new(start, end, ur.parent);
            }
          } else {
            pruned = true;
          }
        }
      }
    }

    self.iscore = Some(iscore);
    self.extents = Some(extents);
    self.words_in_span = words_in_span;
    pruned
  }

  /// Find the best split for one binary rule over `[start, end)` and commit
  /// it if it beats the current cell score (and the threshold, if any).
  #[allow(clippy::too_many_arguments)]
  fn relax_binary(
    &self,
    iscore: &mut ScoreChart,
    extents: &mut Extents,
    mut words_in_span: Option<&mut WordsChart>,
    start: usize,
    end: usize,
    min: usize,
    max: usize,
    left: u32,
    right: u32,
    parent: u32,
    rule_score: f32,
    threshold: Option<f32>,
  ) -> bool {
    let old_iscore = iscore.get(start, end, parent);
    let mut best_iscore = old_iscore;
    let found_better;
    let mut best_words = 0;

    match words_in_span.as_ref() {
      None => {
        for split in min..=max {
          if !self.constraints.is_empty()
            && self.split_blocked_by_constraints(start, end, split, left, right)
          {
            continue;
          }
          let ls = iscore.get(start, split, left);
          if ls == f32::NEG_INFINITY {
            continue;
          }
          let rs = iscore.get(split, end, right);
          if rs == f32::NEG_INFINITY {
            continue;
          }
          let tot = rule_score + ls + rs;
          if tot > best_iscore {
            best_iscore = tot;
          }
        }
        found_better = best_iscore > old_iscore;
      }
      Some(wis) => {
        // length-normalized objective: the best split is the one with the
        // best score per word spanned, and only that objective is tracked
        best_words = wis.get(start, end, parent);
        let old_norm = old_iscore / best_words as f32;
        let mut best_norm = old_norm;
        for split in min..=max {
          if !self.constraints.is_empty()
            && self.split_blocked_by_constraints(start, end, split, left, right)
          {
            continue;
          }
          let ls = iscore.get(start, split, left);
          if ls == f32::NEG_INFINITY {
            continue;
          }
          let rs = iscore.get(split, end, right);
          if rs == f32::NEG_INFINITY {
            continue;
          }
          let tot = rule_score + ls + rs;
          let new_words = wis.get(start, split, left) + wis.get(split, end, right);
          let norm_tot = tot / new_words as f32;
          if norm_tot > best_norm {
            best_iscore = tot;
            best_norm = norm_tot;
            best_words = new_words;
          }
        }
        found_better = best_norm > old_norm;
      }
    }

    if found_better {
      if threshold.map_or(true, |t| best_iscore > t) {
        if let Some(wis) = words_in_span.as_mut() {
          wis.set(start, end, parent, best_words);
        }
        iscore.set(start, end, parent, best_iscore);
        if old_iscore == f32::NEG_INFINITY {
          extents.observe_new(start, end, parent);
        }
        false
      } else {
        true
      }
    } else {
      false
    }
  }

  /// Fill the outside-score table top-down from the goal. Must run after a
  /// successful parse; required before the possibles masks or the hook-chart
  /// stage can be used.
  pub fn compute_outside_scores(&mut self) {
    let length = self.length;
    let iscore = self.iscore.take().expect("parse() before outside scores");
    let mut oscore = ScoreChart::new(length, self.num_states);
    oscore.set(0, length, self.goal, 0.0);

    for diff in (1..=length).rev() {
      for start in 0..=(length - diff) {
        let end = start + diff;

        // unaries: parent outside flows to child
        for s in 0..self.num_states as u32 {
          let os = oscore.get(start, end, s);
          if os == f32::NEG_INFINITY {
            continue;
          }
          for ur in self.ug.closed_rules_by_parent(s) {
            let tot = os + ur.score;
            if tot > oscore.get(start, end, ur.child)
              && iscore.get(start, end, ur.child) > f32::NEG_INFINITY
            {
              oscore.set(start, end, ur.child, tot);
            }
          }
        }

        // binaries indexed by left child
        for s in 0..self.num_states as u32 {
          let min1 = self.extents.as_ref().unwrap().narrow_r(start, s);
          if (end as i32) < min1 {
            continue;
          }
          for rule in self.bg.split_rules_with_lc(s) {
            let os = oscore.get(start, end, rule.parent);
            if os == f32::NEG_INFINITY {
              continue;
            }
            let ext = self.extents.as_ref().unwrap();
            let max1 = ext.narrow_l(end, rule.right);
            if max1 < min1 {
              continue;
            }
            let mut min = min1;
            let mut max = max1;
            if max - min > 2 {
              min = min.max(ext.wide_l(end, rule.right));
              if max1 < min {
                continue;
              }
              max = max.min(ext.wide_r(start, s));
              if max < min {
                continue;
              }
            }
            self.relax_outside_splits(
              &iscore, &mut oscore, start, end, min, max, s, rule.right, rule.score, os,
            );
          }
        }

        // binaries indexed by right child
        for s in 0..self.num_states as u32 {
          let max1 = self.extents.as_ref().unwrap().narrow_l(end, s);
          if max1 < start as i32 {
            continue;
          }
          for rule in self.bg.split_rules_with_rc(s) {
            let os = oscore.get(start, end, rule.parent);
            if os == f32::NEG_INFINITY {
              continue;
            }
            let ext = self.extents.as_ref().unwrap();
            let min1 = ext.narrow_r(start, rule.left);
            if max1 < min1 {
              continue;
            }
            let mut min = min1;
            let mut max = max1;
            if max - min > 2 {
              min = min.max(ext.wide_l(end, s));
              if max1 < min {
                continue;
              }
              max = max.min(ext.wide_r(start, rule.left));
              if max < min {
                continue;
              }
            }
            self.relax_outside_splits(
              &iscore, &mut oscore, start, end, min, max, rule.left, s, rule.score, os,
            );
          }
        }
      }
    }

    self.possibles = Some(Possibles::compute(&iscore, &oscore));
    self.iscore = Some(iscore);
    self.oscore = Some(oscore);
  }

  #[allow(clippy::too_many_arguments)]
  fn relax_outside_splits(
    &self,
    iscore: &ScoreChart,
    oscore: &mut ScoreChart,
    start: usize,
    end: usize,
    min: i32,
    max: i32,
    left: u32,
    right: u32,
    rule_score: f32,
    os: f32,
  ) {
    for split in min..=max {
      let split = split as usize;
      let ls = iscore.get(start, split, left);
      if ls == f32::NEG_INFINITY {
        continue;
      }
      let rs = iscore.get(split, end, right);
      if rs == f32::NEG_INFINITY {
        continue;
      }
      let tot_l = rule_score + rs + os;
      if tot_l > oscore.get(start, split, left) {
        oscore.set(start, split, left, tot_l);
      }
      let tot_r = rule_score + ls + os;
      if tot_r > oscore.get(split, end, right) {
        oscore.set(split, end, right, tot_r);
      }
    }
  }

  pub fn inside_score(&self, start: usize, end: usize, state: u32) -> f32 {
    self
      .iscore
      .as_ref()
      .map_or(f32::NEG_INFINITY, |c| c.get(start, end, state))
  }

  pub fn outside_score(&self, start: usize, end: usize, state: u32) -> f32 {
    self
      .oscore
      .as_ref()
      .map_or(f32::NEG_INFINITY, |c| c.get(start, end, state))
  }

  /// Recover the best tree for the goal over the whole sentence.
  pub fn best_parse(&self) -> Option<(SynTree<String, String>, f64)> {
    if !self.has_parse() {
      return None;
    }
    let tree = self.extract_best_parse(self.goal, 0, self.length)?;
    Some((tree, self.best_score as f64))
  }

  /// Reconstruct a best tree for (state, span) by re-deriving which rule and
  /// split produced the recorded inside score. Binary first; unary chains are
  /// walked with the raw (non-closed) rules, since every intermediate state
  /// of a chain was also built in the chart.
  fn extract_best_parse(&self, goal: u32, start: usize, end: usize) -> Option<SynTree<String, String>> {
    let iscore = self.iscore.as_ref()?;
    let best = iscore.get(start, end, goal);
    if best == f32::NEG_INFINITY {
      return None;
    }
    let goal_str = self.states.resolve(goal);

    // preterminal?
    if end - start == 1 {
      if let Some(tag) = self.tag_of_state(goal) {
        let tagging = crate::intern::IntTaggedWord::new(self.words[start] as i32, tag as i32);
        let tag_score = self.lex.score(tagging, start);
        if tag_score > f32::NEG_INFINITY && matches(tag_score as f64, best as f64) {
          let leaf = SynTree::Leaf(Word {
            value: self.word_index.resolve(self.words[start]).to_string(),
            span: (start, end),
          });
          return Some(SynTree::Branch(
            Constituent {
              value: goal_str.to_string(),
              span: (start, end),
            },
            vec![leaf],
          ));
        }
      }
    }

    // binaries
    for split in (start + 1)..end {
      for rule in self.bg.rules_by_parent(goal) {
        let ls = iscore.get(start, split, rule.left);
        let rs = iscore.get(split, end, rule.right);
        let score = rule.score + ls + rs;
        let found = if let Some(wis) = self.words_in_span.as_ref() {
          let norm = score / (wis.get(start, split, rule.left) + wis.get(split, end, rule.right)) as f32;
          matches(norm as f64, (best / wis.get(start, end, goal) as f32) as f64)
        } else {
          matches(score as f64, best as f64)
        };
        if found {
          let left_tree = self.extract_best_parse(rule.left, start, split)?;
          let right_tree = self.extract_best_parse(rule.right, split, end)?;
          return Some(SynTree::Branch(
            Constituent {
              value: goal_str.to_string(),
              span: (start, end),
            },
            vec![left_tree, right_tree],
          ));
        }
      }
    }

    // unaries
    for ur in self.ug.rules_by_parent(goal) {
      if ur.child == ur.parent {
        continue;
      }
      let score = ur.score + iscore.get(start, end, ur.child);
      let found = if let Some(wis) = self.words_in_span.as_ref() {
        let norm = score / wis.get(start, end, ur.child) as f32;
        matches(norm as f64, (best / wis.get(start, end, goal) as f32) as f64)
      } else {
        matches(score as f64, best as f64)
      };
      if found {
        let child_tree = self.extract_best_parse(ur.child, start, end)?;
        return Some(SynTree::Branch(
          Constituent {
            value: goal_str.to_string(),
            span: (start, end),
          },
          vec![child_tree],
        ));
      }
    }

    debug!(
      start,
      end,
      state = goal_str,
      "no derivation found while recovering parse"
    );
    None
  }
}

impl Scorer for ChartParser<'_> {
  fn i_score(&self, start: usize, end: usize, state: u32) -> f64 {
    self.inside_score(start, end, state) as f64
  }

  fn o_score(&self, start: usize, end: usize, state: u32) -> f64 {
    self.outside_score(start, end, state) as f64
  }

  fn i_possible(&self, hook: &Hook) -> bool {
    let Some(p) = self.possibles.as_ref() else {
      return true;
    };
    if hook.is_pre_hook() {
      p.i_possible_by_r(hook.start, hook.sub_state)
    } else {
      p.i_possible_by_l(hook.end, hook.sub_state)
    }
  }

  fn o_possible(&self, hook: &Hook) -> bool {
    let Some(p) = self.possibles.as_ref() else {
      return true;
    };
    if hook.is_pre_hook() {
      p.o_possible_by_r(hook.end, hook.state)
    } else {
      p.o_possible_by_l(hook.start, hook.state)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::grammar::{BinaryGrammarBuilder, UnaryGrammarBuilder};
  use crate::lexicon::HashLexicon;
  use crate::rules::{BinaryRule, UnaryRule};

  /// A tiny fixture: states, words and tags for a toy English grammar.
  pub(crate) struct Fixture {
    pub states: Index,
    pub words: Index,
    pub tags: Index,
    pub bg: BinaryGrammar,
    pub ug: UnaryGrammar,
    pub lex: HashLexicon,
    pub state_to_tag: Vec<Option<u32>>,
    pub tag_to_state: Vec<u32>,
    pub goal: u32,
  }

  impl Fixture {
    pub fn parser(&self) -> ChartParser<'_> {
      ChartParser::new(
        &self.bg,
        &self.ug,
        &self.lex,
        &self.states,
        &self.words,
        &self.state_to_tag,
        &self.tag_to_state,
        self.goal,
      )
    }

    pub fn word_ids(&self, sentence: &[&str]) -> Vec<u32> {
      sentence
        .iter()
        .map(|w| self.words.id_of(w).expect("word in lexicon"))
        .collect()
    }
  }

  /// Grammar: S -> NP VP (-0.1); lexicon: John|NP (-0.05), ran|VP (-0.2),
  /// plus an ambiguous second tagging to exercise pruning.
  pub(crate) fn john_ran_fixture() -> Fixture {
    let mut states = Index::new();
    let s = states.intern("S");
    let np = states.intern("NP");
    let vp = states.intern("VP");

    let mut tags = Index::new();
    let np_t = tags.intern("NP");
    let vp_t = tags.intern("VP");

    let mut words = Index::new();
    let john = words.intern("John");
    let ran = words.intern("ran");

    let mut bb = BinaryGrammarBuilder::new();
    bb.add_rule(BinaryRule::new(s, np, vp, -0.1));
    let bg = bb.compile(&states);
    let ug = UnaryGrammarBuilder::new().compile(&states);

    let mut lex = HashLexicon::new();
    lex.add(john, np_t, -0.05);
    lex.add(ran, vp_t, -0.2);

    Fixture {
      state_to_tag: vec![None, Some(np_t), Some(vp_t)],
      tag_to_state: vec![np, vp],
      goal: s,
      states,
      words,
      tags,
      bg,
      ug,
      lex,
    }
  }

  #[test]
  fn test_john_ran_single_parse() {
    let fx = john_ran_fixture();
    let mut parser = fx.parser();
    let sentence = fx.word_ids(&["John", "ran"]);

    assert!(parser.parse(&sentence));
    assert!((parser.best_score() - (-0.35)).abs() < 1e-6);

    let (tree, score) = parser.best_parse().unwrap();
    assert_eq!(tree.bracketed(), "(S (NP John) (VP ran))");
    assert!((score - (-0.35)).abs() < 1e-6);
  }

  #[test]
  fn test_unparseable_sentence_reports_no_parse() {
    let fx = john_ran_fixture();
    let mut parser = fx.parser();
    // "ran John" cannot be S -> NP VP
    let sentence = fx.word_ids(&["ran", "John"]);
    assert!(!parser.parse(&sentence));
    assert!(parser.best_parse().is_none());
  }

  /// Larger fixture with unary chains and attachment ambiguity.
  pub(crate) fn saw_stars_fixture() -> Fixture {
    let mut states = Index::new();
    let root = states.intern("ROOT");
    let s = states.intern("S");
    let np = states.intern("NP");
    let vp = states.intern("VP");
    let v = states.intern("V");
    let n = states.intern("N");

    let mut tags = Index::new();
    let v_t = tags.intern("V");
    let n_t = tags.intern("N");

    let mut words = Index::new();
    for w in ["stars", "saw", "telescopes"] {
      words.intern(w);
    }

    let mut bb = BinaryGrammarBuilder::new();
    bb.add_rule(BinaryRule::new(s, np, vp, -0.5));
    bb.add_rule(BinaryRule::new(vp, v, np, -0.9));
    bb.add_rule(BinaryRule::new(np, np, np, -1.2));
    let bg = bb.compile(&states);

    let mut ub = UnaryGrammarBuilder::new();
    ub.add_rule(UnaryRule::new(root, s, -0.05));
    ub.add_rule(UnaryRule::new(np, n, -0.3));
    let ug = ub.compile(&states);

    let mut lex = HashLexicon::new();
    let stars = words.id_of("stars").unwrap();
    let saw = words.id_of("saw").unwrap();
    let telescopes = words.id_of("telescopes").unwrap();
    lex.add(stars, n_t, -0.4);
    lex.add(saw, v_t, -0.2);
    lex.add(saw, n_t, -2.5);
    lex.add(telescopes, n_t, -0.6);

    Fixture {
      state_to_tag: vec![None, None, None, None, Some(v_t), Some(n_t)],
      tag_to_state: vec![v, n],
      goal: root,
      states,
      words,
      tags,
      bg,
      ug,
      lex,
    }
  }

  #[test]
  fn test_unary_chain_parse() {
    let fx = saw_stars_fixture();
    let mut parser = fx.parser();
    let sentence = fx.word_ids(&["stars", "saw", "telescopes"]);

    assert!(parser.parse(&sentence));
    let (tree, score) = parser.best_parse().unwrap();
    assert_eq!(
      tree.bracketed(),
      "(ROOT (S (NP (N stars)) (VP (V saw) (NP (N telescopes)))))"
    );
    // -0.05 + -0.5 + (-0.3 + -0.4) + -0.9 + -0.2 + (-0.3 + -0.6)
    assert!((score - (-3.25)).abs() < 1e-5, "score was {}", score);
  }

  #[test]
  fn test_inside_scores_respect_recurrence() {
    // no cell may beat the best of its own decompositions
    let fx = saw_stars_fixture();
    let mut parser = fx.parser();
    let sentence = fx.word_ids(&["stars", "saw", "telescopes"]);
    assert!(parser.parse(&sentence));

    let n = sentence.len();
    for start in 0..n {
      for end in (start + 1)..=n {
        for state in 0..fx.bg.num_states() as u32 {
          let cell = parser.inside_score(start, end, state);
          if cell == f32::NEG_INFINITY {
            continue;
          }
          let mut best = f32::NEG_INFINITY;
          if end - start == 1 {
            if let Some(tag) = parser.tag_of_state(state) {
              let itw =
                crate::intern::IntTaggedWord::new(sentence[start] as i32, tag as i32);
              best = best.max(parser.lexicon().score(itw, start));
            }
          }
          for split in (start + 1)..end {
            for rule in fx.bg.rules_by_parent(state) {
              best = best.max(
                rule.score
                  + parser.inside_score(start, split, rule.left)
                  + parser.inside_score(split, end, rule.right),
              );
            }
          }
          for ur in fx.ug.closed_rules_by_parent(state) {
            best = best.max(ur.score + parser.inside_score(start, end, ur.child));
          }
          assert!(
            cell <= best + 1e-6,
            "invented score at [{start},{end}) {}: {} > {}",
            fx.states.resolve(state),
            cell,
            best
          );
        }
      }
    }
  }

  #[test]
  fn test_iterative_deepening_matches_exhaustive() {
    let fx = saw_stars_fixture();
    let sentence = fx.word_ids(&["stars", "saw", "telescopes"]);

    let mut exhaustive = fx.parser();
    assert!(exhaustive.parse(&sentence));

    let mut iterative = fx.parser();
    iterative.set_strategy(SearchStrategy::IterativeDeepening);
    assert!(iterative.parse(&sentence));

    assert!((exhaustive.best_score() - iterative.best_score()).abs() < 1e-6);
    assert_eq!(
      exhaustive.best_parse().unwrap().0,
      iterative.best_parse().unwrap().0
    );
  }

  #[test]
  fn test_iterative_deepening_no_parse_terminates() {
    let fx = john_ran_fixture();
    let mut parser = fx.parser();
    parser.set_strategy(SearchStrategy::IterativeDeepening);
    let sentence = fx.word_ids(&["ran", "John"]);
    assert!(!parser.parse(&sentence));
  }

  #[test]
  fn test_length_normalization_same_result_on_plain_sentence() {
    // with one token per position the normalizer is constant per span, so
    // the chosen tree must agree with the plain objective
    let fx = saw_stars_fixture();
    let sentence = fx.word_ids(&["stars", "saw", "telescopes"]);

    let mut plain = fx.parser();
    assert!(plain.parse(&sentence));

    let mut norm = fx.parser();
    norm.set_length_normalization(true);
    assert!(norm.parse(&sentence));
    assert_eq!(plain.best_parse().unwrap().0, norm.best_parse().unwrap().0);
  }

  #[test]
  fn test_constraint_rejects_span_label() {
    let fx = saw_stars_fixture();
    let sentence = fx.word_ids(&["stars", "saw", "telescopes"]);

    // an impossible demand: [1,3) must be labeled NP-ish
    let mut parser = fx.parser();
    parser.set_constraints(vec![ParserConstraint::new(1, 3, "NP.*").unwrap()]);
    assert!(!parser.parse(&sentence));

    // a satisfied demand: [1,3) is the VP
    let mut parser = fx.parser();
    parser.set_constraints(vec![ParserConstraint::new(1, 3, "VP").unwrap()]);
    assert!(parser.parse(&sentence));
  }

  #[test]
  fn test_outside_scores_at_goal_and_leaves() {
    let fx = saw_stars_fixture();
    let mut parser = fx.parser();
    let sentence = fx.word_ids(&["stars", "saw", "telescopes"]);
    assert!(parser.parse(&sentence));
    parser.compute_outside_scores();

    let n = sentence.len();
    assert_eq!(parser.outside_score(0, n, fx.goal), 0.0);

    // for any cell on the best parse, inside + outside == best score
    let np = fx.states.id_of("NP").unwrap();
    let total =
      parser.inside_score(0, 1, np) + parser.outside_score(0, 1, np);
    assert!((total - parser.best_score()).abs() < 1e-5);
  }
}
