//! The Eisner–Satta combined parser: joint PCFG + dependency search over
//! lexicalized edges and hooks in O(n^4).
//!
//! The search is a best-first agenda over `Edge` and `Hook` items, with the
//! finished PCFG chart supplying admissible outside estimates. Hooks carry a
//! state still missing one child; indexing items by only one boundary plus
//! (head, tag) is what drops the fifth factor of n from the join. Dependency
//! scores are precomputed per sentence into flat caches so the inner loops
//! never call the grammar.
//!
//! A parse either reaches the goal edge or fails softly: emptying the
//! agenda, surfacing a `-inf` item, or exceeding the item ceiling all report
//! "no parse" and leave the caller to fall back to a cheaper model.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cky::Scorer;
use crate::dependency::{DependencyScorer, IntDependency};
use crate::grammar::{BinaryGrammar, UnaryGrammar};
use crate::hooks::{Edge, Hook, HookChart};
use crate::intern::{Index, IntTaggedWord};
use crate::lexicon::Lexicon;
use crate::syntree::{Constituent, SynTree, Word};
use crate::utils::better;

/// Per-sentence dependency score tables: every (head, tag bin) stop score at
/// every split, and every head-argument attachment at every distance bucket.
/// Built once before the agenda runs; the agenda only reads.
struct DepScoreCache {
  length: usize,
  num_tag_bins: usize,
  bin_distance: Vec<i16>,
  head_stop: Vec<f32>,
  head_score: FxHashMap<(i16, usize, i32, usize, i32), f32>,
}

impl DepScoreCache {
  fn build(
    words: &[u32],
    taggings: &[Vec<u32>],
    dg: &dyn DependencyScorer,
  ) -> Self {
    let length = words.len();
    let num_tag_bins = dg.num_tag_bins();

    let raw = |head: usize, loc: usize| -> i16 {
      if head >= loc {
        (head - loc) as i16
      } else {
        (loc - head - 1) as i16
      }
    };

    let mut bin_distance = vec![0i16; length * (length + 1)];
    for head in 0..length {
      for loc in 0..=length {
        bin_distance[head * (length + 1) + loc] = dg.distance_bin(raw(head, loc));
      }
    }

    // which (position, tag bin) pairs are live at all
    let mut has_tag = vec![false; length * num_tag_bins];
    for (pos, tags) in taggings.iter().enumerate() {
      for &tag in tags {
        has_tag[pos * num_tag_bins + dg.tag_bin(tag as i32) as usize] = true;
      }
    }

    let mut head_stop = vec![f32::NEG_INFINITY; length * num_tag_bins * (length + 1)];
    let mut head_score = FxHashMap::default();

    for h_word in 0..length {
      for h_bin in 0..num_tag_bins {
        if !has_tag[h_word * num_tag_bins + h_bin] {
          continue;
        }
        let head = IntTaggedWord::new(words[h_word] as i32, h_bin as i32);

        for split in 0..=length {
          let (left_headed, dist) = if split <= h_word {
            (false, (h_word - split) as i16)
          } else {
            (true, (split - h_word - 1) as i16)
          };
          let stop = IntDependency::new(head, IntTaggedWord::stop(), left_headed, dist);
          head_stop[(h_word * num_tag_bins + h_bin) * (length + 1) + split] =
            dg.score_binned(&stop) as f32;
        }

        for a_word in 0..length {
          if a_word == h_word {
            continue;
          }
          let left_headed = h_word < a_word;
          let (lo, hi) = if left_headed {
            (h_word + 1, a_word + 1)
          } else {
            (a_word + 1, h_word + 1)
          };
          for a_bin in 0..num_tag_bins {
            if !has_tag[a_word * num_tag_bins + a_bin] {
              continue;
            }
            let arg = IntTaggedWord::new(words[a_word] as i32, a_bin as i32);
            let mut split = lo;
            while split < hi {
              let bin = bin_distance[h_word * (length + 1) + split];
              let dep = IntDependency::new(head, arg, left_headed, raw(h_word, split));
              head_score.insert(
                (bin, h_word, h_bin as i32, a_word, a_bin as i32),
                dg.score_binned(&dep) as f32,
              );
              // one entry per distance bucket is enough
              while split + 1 < hi && bin_distance[h_word * (length + 1) + split + 1] == bin {
                split += 1;
              }
              split += 1;
            }
          }
        }
      }
    }

    Self {
      length,
      num_tag_bins,
      bin_distance,
      head_stop,
      head_score,
    }
  }

  #[inline]
  fn bin_dist(&self, head: usize, loc: usize) -> i16 {
    self.bin_distance[head * (self.length + 1) + loc]
  }

  #[inline]
  fn stop(&self, head: usize, bin: i32, split: usize) -> f64 {
    self.head_stop[(head * self.num_tag_bins + bin as usize) * (self.length + 1) + split] as f64
  }

  #[inline]
  fn attach(&self, dist: i16, head: usize, h_bin: i32, arg: usize, a_bin: i32) -> f64 {
    self
      .head_score
      .get(&(dist, head, h_bin, arg, a_bin))
      .copied()
      .unwrap_or(f32::NEG_INFINITY) as f64
  }
}

#[derive(Debug)]
enum EdgeBack {
  Leaf,
  Unary(usize),
  Binary { hook: usize, edge: usize },
}

struct EdgeEntry {
  edge: Edge,
  iscore: f64,
  oscore: f64,
  back: EdgeBack,
  processed: bool,
}

struct HookEntry {
  hook: Hook,
  iscore: f64,
  oscore: f64,
  back_edge: usize,
  processed: bool,
}

#[derive(Debug, Copy, Clone)]
enum AgendaRef {
  Edge(usize),
  Hook(usize),
}

/// Max-heap entry: priority is iscore + outside estimate. The iscore is
/// snapshotted so improved items can be re-pushed and stale entries skipped
/// on pop, standing in for decrease-key.
struct AgendaEntry {
  score: f64,
  iscore: f64,
  seq: usize,
  item: AgendaRef,
}

impl PartialEq for AgendaEntry {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for AgendaEntry {}

impl PartialOrd for AgendaEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for AgendaEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .score
      .total_cmp(&other.score)
      .then(other.seq.cmp(&self.seq))
  }
}

/// One combined-parse query. Borrows the compiled grammars, lexicon,
/// dependency scorer and a finished PCFG chart (for outside estimates and
/// the possible-item masks); owns everything per-sentence.
pub struct BiLexParser<'a> {
  scorer: &'a dyn Scorer,
  bg: &'a BinaryGrammar,
  ug: &'a UnaryGrammar,
  lex: &'a dyn Lexicon,
  dg: &'a dyn DependencyScorer,
  states: &'a Index,
  word_index: &'a Index,
  tag_to_state: &'a [u32],
  goal_state: u32,
  boundary_tag: u32,
  /// soft ceiling on built items; 0 disables
  max_items: usize,

  length: usize,
  words: Vec<u32>,
  taggings: Vec<Vec<u32>>,
  cache: Option<DepScoreCache>,
  chart: HookChart,
  edges: Vec<EdgeEntry>,
  hooks: Vec<HookEntry>,
  edge_ids: FxHashMap<Edge, usize>,
  hook_ids: FxHashMap<Hook, usize>,
  agenda: BinaryHeap<AgendaEntry>,
  seq: usize,
  goal_id: Option<usize>,
}

impl<'a> BiLexParser<'a> {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    scorer: &'a dyn Scorer,
    bg: &'a BinaryGrammar,
    ug: &'a UnaryGrammar,
    lex: &'a dyn Lexicon,
    dg: &'a dyn DependencyScorer,
    states: &'a Index,
    word_index: &'a Index,
    tag_to_state: &'a [u32],
    goal_state: u32,
    boundary_tag: u32,
  ) -> Self {
    Self {
      scorer,
      bg,
      ug,
      lex,
      dg,
      states,
      word_index,
      tag_to_state,
      goal_state,
      boundary_tag,
      max_items: 0,
      length: 0,
      words: Vec::new(),
      taggings: Vec::new(),
      cache: None,
      chart: HookChart::new(),
      edges: Vec::new(),
      hooks: Vec::new(),
      edge_ids: FxHashMap::default(),
      hook_ids: FxHashMap::default(),
      agenda: BinaryHeap::new(),
      seq: 0,
      goal_id: None,
    }
  }

  pub fn set_max_items(&mut self, max_items: usize) {
    self.max_items = max_items;
  }

  /// Run the combined search over a sentence of interned word ids. The
  /// caller must have PCFG-parsed the same word sequence (with the boundary
  /// word appended, so the last position carries the boundary tag) and
  /// computed outside scores on the scorer it passed in.
  pub fn parse(&mut self, words: &[u32]) -> bool {
    let length = words.len();
    self.length = length;
    self.words = words.to_vec();
    self.chart = HookChart::new();
    self.edges.clear();
    self.hooks.clear();
    self.edge_ids.clear();
    self.hook_ids.clear();
    self.agenda = BinaryHeap::new();
    self.seq = 0;
    self.goal_id = None;

    self.taggings = (0..length)
      .map(|i| {
        self
          .lex
          .taggings(self.words[i], i)
          .iter()
          .filter(|t| self.lex.score(**t, i) > f32::NEG_INFINITY)
          .map(|t| t.tag as u32)
          .collect()
      })
      .collect();
    self.cache = Some(DepScoreCache::build(&self.words, &self.taggings, self.dg));

    let goal = Edge::new(self.goal_state, 0, length, length - 1, self.boundary_tag);

    // initial items: one edge per allowed tagging, scored from the chart
    for pos in 0..length {
      for ti in 0..self.taggings[pos].len() {
        let tag = self.taggings[pos][ti];
        let state = self.tag_to_state[tag as usize];
        let iscore = self.scorer.i_score(pos, pos + 1, state);
        if iscore == f64::NEG_INFINITY {
          continue;
        }
        let edge = Edge::new(state, pos, pos + 1, pos, tag);
        self.relax_edge(edge, iscore, EdgeBack::Leaf);
      }
    }

    while let Some(entry) = self.agenda.pop() {
      let (current_iscore, is_processed) = match entry.item {
        AgendaRef::Edge(id) => (self.edges[id].iscore, self.edges[id].processed),
        AgendaRef::Hook(id) => (self.hooks[id].iscore, self.hooks[id].processed),
      };
      if is_processed || entry.iscore != current_iscore {
        continue;
      }

      if let AgendaRef::Edge(id) = entry.item {
        if self.edges[id].edge == goal {
          self.goal_id = Some(id);
          debug!(
            edges = self.edges.len(),
            hooks = self.hooks.len(),
            score = self.edges[id].iscore,
            "combined parse found goal"
          );
          return true;
        }
      }

      if entry.score == f64::NEG_INFINITY {
        debug!("combined parse hit blocked items, no consistent parse");
        return false;
      }
      if self.max_items > 0 && self.edges.len() + self.hooks.len() >= self.max_items {
        debug!(
          max_items = self.max_items,
          "combined parse exceeded item ceiling"
        );
        return false;
      }

      match entry.item {
        AgendaRef::Edge(id) => self.process_edge(id),
        AgendaRef::Hook(id) => self.process_hook(id),
      }
    }

    debug!("combined parse emptied agenda without reaching the goal");
    false
  }

  pub fn has_parse(&self) -> bool {
    self
      .goal_id
      .map_or(false, |id| self.edges[id].iscore > f64::NEG_INFINITY)
  }

  pub fn best_score(&self) -> f64 {
    self
      .goal_id
      .map_or(f64::NEG_INFINITY, |id| self.edges[id].iscore)
  }

  pub fn best_parse(&self) -> Option<(SynTree<String, String>, f64)> {
    if !self.has_parse() {
      return None;
    }
    let id = self.goal_id.unwrap();
    Some((self.extract_parse(id), self.edges[id].iscore))
  }

  fn extract_parse(&self, id: usize) -> SynTree<String, String> {
    let entry = &self.edges[id];
    let edge = entry.edge;
    let label = self.states.resolve(edge.state).to_string();
    let cons = Constituent {
      value: label,
      span: (edge.start, edge.end),
    };
    match entry.back {
      EdgeBack::Leaf => {
        let word = self.word_index.resolve(self.words[edge.head]).to_string();
        SynTree::Branch(
          cons,
          vec![SynTree::Leaf(Word {
            value: word,
            span: (edge.start, edge.end),
          })],
        )
      }
      EdgeBack::Unary(child) => SynTree::Branch(cons, vec![self.extract_parse(child)]),
      EdgeBack::Binary { hook, edge: completing } => {
        let hook_entry = &self.hooks[hook];
        let own = self.extract_parse(hook_entry.back_edge);
        let other = self.extract_parse(completing);
        let children = if hook_entry.hook.is_pre_hook() {
          vec![other, own]
        } else {
          vec![own, other]
        };
        SynTree::Branch(cons, children)
      }
    }
  }

  /// Dependency contribution of attaching the completed `arg` edge under a
  /// new head at `head`/`tag`: the attachment itself, plus the argument
  /// head's stop events at both of its boundaries.
  fn attach_score(&self, head: usize, tag: u32, arg: &Edge) -> f64 {
    let cache = self.cache.as_ref().expect("cache built by parse()");
    let loc = if head < arg.start { arg.start } else { arg.end };
    let h_bin = self.dg.tag_bin(tag as i32);
    let a_bin = self.dg.tag_bin(arg.tag as i32);
    cache.attach(cache.bin_dist(head, loc), head, h_bin, arg.head, a_bin)
      + cache.stop(arg.head, a_bin, arg.start)
      + cache.stop(arg.head, a_bin, arg.end)
  }

  /// Record an edge candidate: fresh edges get an outside estimate and an
  /// agenda slot; known edges keep the better derivation.
  fn relax_edge(&mut self, edge: Edge, iscore: f64, back: EdgeBack) {
    match self.edge_ids.get(&edge) {
      None => {
        let oscore = self.scorer.o_score(edge.start, edge.end, edge.state);
        let id = self.edges.len();
        self.edges.push(EdgeEntry {
          edge,
          iscore,
          oscore,
          back,
          processed: false,
        });
        self.edge_ids.insert(edge, id);
        self.push_agenda(AgendaRef::Edge(id), iscore, iscore + oscore);
      }
      Some(&id) => {
        let entry = &mut self.edges[id];
        if better(iscore, entry.iscore) && entry.oscore > f64::NEG_INFINITY {
          entry.iscore = iscore;
          entry.back = back;
          if !entry.processed {
            let oscore = entry.oscore;
            self.push_agenda(AgendaRef::Edge(id), iscore, iscore + oscore);
          }
        }
      }
    }
  }

  fn relax_hook(&mut self, hook: Hook, iscore: f64, back_edge: usize) {
    if !self.scorer.o_possible(&hook) || !self.scorer.i_possible(&hook) {
      return;
    }
    match self.hook_ids.get(&hook) {
      None => {
        let oscore = self.hook_oscore(&hook);
        let id = self.hooks.len();
        self.hooks.push(HookEntry {
          hook,
          iscore,
          oscore,
          back_edge,
          processed: false,
        });
        self.hook_ids.insert(hook, id);
        self.push_agenda(AgendaRef::Hook(id), iscore, iscore + oscore);
      }
      Some(&id) => {
        let entry = &mut self.hooks[id];
        if better(iscore, entry.iscore) {
          entry.iscore = iscore;
          entry.back_edge = back_edge;
          if !entry.processed {
            let oscore = entry.oscore;
            self.push_agenda(AgendaRef::Hook(id), iscore, iscore + oscore);
          }
        }
      }
    }
  }

  fn push_agenda(&mut self, item: AgendaRef, iscore: f64, score: f64) {
    let seq = self.seq;
    self.seq += 1;
    self.agenda.push(AgendaEntry {
      score,
      iscore,
      seq,
      item,
    });
  }

  /// Best outside estimate for a hook: the best way of pairing the parent
  /// state's outside span with the missing sub-state's inside span, over
  /// every extension on the head's side.
  fn hook_oscore(&self, hook: &Hook) -> f64 {
    let mut best = f64::NEG_INFINITY;
    if hook.is_pre_hook() {
      for start in 0..=hook.head {
        let o = self.scorer.o_score(start, hook.end, hook.state)
          + self.scorer.i_score(start, hook.start, hook.sub_state);
        best = best.max(o);
      }
    } else {
      for end in (hook.head + 1)..=self.length {
        let o = self.scorer.o_score(hook.start, end, hook.state)
          + self.scorer.i_score(hook.end, end, hook.sub_state);
        best = best.max(o);
      }
    }
    best
  }

  fn process_edge(&mut self, id: usize) {
    self.edges[id].processed = true;
    let edge = self.edges[id].edge;
    let iscore = self.edges[id].iscore;
    self.chart.add_edge(edge);

    for hook in self.chart.pre_hooks_for(&edge).to_vec() {
      self.combine(id, self.hook_ids[&hook]);
    }
    for hook in self.chart.post_hooks_for(&edge).to_vec() {
      self.combine(id, self.hook_ids[&hook]);
    }

    self.project_unaries(id, edge, iscore);
    if !self.bg.is_synthetic(edge.state) {
      self.project_hooks(id, edge, iscore);
      self.chart.register_real_edge(edge);
    }
    self.trigger_hooks(edge);
  }

  fn process_hook(&mut self, id: usize) {
    self.hooks[id].processed = true;
    let hook = self.hooks[id].hook;
    self.chart.add_hook(hook);
    for edge in self.chart.edges_for(&hook).to_vec() {
      self.combine(self.edge_ids[&edge], id);
    }
  }

  /// Complete a hook with a matching edge, forming the larger edge.
  fn combine(&mut self, edge_id: usize, hook_id: usize) {
    let edge = self.edges[edge_id].edge;
    let edge_iscore = self.edges[edge_id].iscore;
    let hook = self.hooks[hook_id].hook;
    let hook_iscore = self.hooks[hook_id].iscore;

    let (start, end) = if hook.is_pre_hook() {
      (edge.start, hook.end)
    } else {
      (hook.start, edge.end)
    };
    let result = Edge::new(hook.state, start, end, hook.head, hook.tag);
    self.relax_edge(
      result,
      hook_iscore + edge_iscore,
      EdgeBack::Binary {
        hook: hook_id,
        edge: edge_id,
      },
    );
  }

  fn project_unaries(&mut self, id: usize, edge: Edge, iscore: f64) {
    let ug = self.ug;
    for ur in ug.rules_by_child(edge.state) {
      if ur.child == ur.parent {
        continue;
      }
      let parent = Edge::new(ur.parent, edge.start, edge.end, edge.head, edge.tag);
      self.relax_edge(parent, iscore + ur.score as f64, EdgeBack::Unary(id));
    }
  }

  /// Propose hooks with this edge as the argument: a head word on either
  /// side, for every rule that could join them, provided the head-side
  /// constituent has already been built.
  fn project_hooks(&mut self, id: usize, edge: Edge, iscore: f64) {
    let bg = self.bg;

    // post-hooks: head material comes later, to the right
    for rule in bg.rules_by_left_child(edge.state) {
      for head in edge.end..self.length {
        for ti in 0..self.taggings[head].len() {
          let tag = self.taggings[head][ti];
          if !self.chart.is_built_l(rule.right, edge.end, head, tag) {
            continue;
          }
          let hook = Hook::new(rule.parent, rule.right, edge.start, edge.end, head, tag);
          let score = iscore + rule.score as f64 + self.attach_score(head, tag, &edge);
          self.relax_hook(hook, score, id);
        }
      }
    }

    // pre-hooks: head material comes earlier, to the left
    for rule in bg.rules_by_right_child(edge.state) {
      for head in 0..edge.start {
        for ti in 0..self.taggings[head].len() {
          let tag = self.taggings[head][ti];
          if !self.chart.is_built_r(rule.left, edge.start, head, tag) {
            continue;
          }
          let hook = Hook::new(rule.parent, rule.left, edge.start, edge.end, head, tag);
          let score = iscore + rule.score as f64 + self.attach_score(head, tag, &edge);
          self.relax_hook(hook, score, id);
        }
      }
    }
  }

  /// The mirror image of `project_hooks`: this edge just became available as
  /// head-side material, so previously registered real edges adjacent to it
  /// can now project hooks headed here.
  fn trigger_hooks(&mut self, edge: Edge) {
    let bg = self.bg;
    let new_l = !self.chart.is_built_l(edge.state, edge.start, edge.head, edge.tag);
    let new_r = !self.chart.is_built_r(edge.state, edge.end, edge.head, edge.tag);
    self.chart.register_edge_indexes(&edge);

    if new_r {
      // this edge can be the left child; arguments start where it ends
      for rule in bg.split_rules_with_lc(edge.state) {
        for real in self.chart.real_edges_with_start(rule.right, edge.end).to_vec() {
          let rid = self.edge_ids[&real];
          let hook = Hook::new(rule.parent, rule.left, real.start, real.end, edge.head, edge.tag);
          let score = self.edges[rid].iscore
            + rule.score as f64
            + self.attach_score(edge.head, edge.tag, &real);
          self.relax_hook(hook, score, rid);
        }
      }
    }
    if new_l {
      // this edge can be the right child; arguments end where it starts
      for rule in bg.split_rules_with_rc(edge.state) {
        for real in self.chart.real_edges_with_end(rule.left, edge.start).to_vec() {
          let rid = self.edge_ids[&real];
          let hook = Hook::new(rule.parent, rule.right, real.start, real.end, edge.head, edge.tag);
          let score = self.edges[rid].iscore
            + rule.score as f64
            + self.attach_score(edge.head, edge.tag, &real);
          self.relax_hook(hook, score, rid);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cky::ChartParser;
  use crate::dependency::{IdentityProjection, MleDependencyGrammar, TagBinner};
  use crate::grammar::{BinaryGrammarBuilder, UnaryGrammarBuilder};
  use crate::intern::{BOUNDARY_TAG, BOUNDARY_WORD};
  use crate::lexicon::HashLexicon;
  use crate::rules::BinaryRule;

  struct Fixture {
    states: Index,
    words: Index,
    tags: Index,
    bg: BinaryGrammar,
    ug: UnaryGrammar,
    lex: HashLexicon,
    dg: MleDependencyGrammar,
    state_to_tag: Vec<Option<u32>>,
    tag_to_state: Vec<u32>,
    goal: u32,
    boundary_word: u32,
    boundary_tag: u32,
  }

  /// "John ran" with the boundary word appended: GOAL -> S .$$., S -> NNP
  /// VBD, and a dependency grammar trained on exactly the one analysis.
  fn john_ran_fixture() -> Fixture {
    let mut states = Index::new();
    let goal = states.intern("GOAL");
    let s = states.intern("S");
    let nnp_s = states.intern("NNP");
    let vbd_s = states.intern("VBD");
    let b_s = states.intern(BOUNDARY_TAG);

    let mut tags = Index::new();
    let nnp_t = tags.intern("NNP");
    let vbd_t = tags.intern("VBD");
    let b_t = tags.intern(BOUNDARY_TAG);

    let mut words = Index::new();
    let john = words.intern("John");
    let ran = words.intern("ran");
    let boundary = words.intern(BOUNDARY_WORD);

    let mut bb = BinaryGrammarBuilder::new();
    bb.add_rule(BinaryRule::new(s, nnp_s, vbd_s, -0.1));
    bb.add_rule(BinaryRule::new(goal, s, b_s, 0.0));
    let bg = bb.compile(&states);
    let ug = UnaryGrammarBuilder::new().compile(&states);

    let mut lex = HashLexicon::new();
    lex.add(john, nnp_t, -0.05);
    lex.add(ran, vbd_t, -0.2);
    lex.add(boundary, b_t, 0.0);

    let binner = TagBinner::new(&tags, &IdentityProjection);
    let mut dg = MleDependencyGrammar::new(binner, true, true, true);
    let head = IntTaggedWord::new(ran as i32, vbd_t as i32);
    let arg = IntTaggedWord::new(john as i32, nnp_t as i32);
    let root = IntTaggedWord::new(boundary as i32, b_t as i32);
    dg.add_dependency(IntDependency::new(head, arg, false, 0), 1.0);
    dg.add_dependency(IntDependency::new(arg, IntTaggedWord::stop(), false, 0), 1.0);
    dg.add_dependency(IntDependency::new(arg, IntTaggedWord::stop(), true, 0), 1.0);
    dg.add_dependency(IntDependency::new(head, IntTaggedWord::stop(), false, 1), 1.0);
    dg.add_dependency(IntDependency::new(head, IntTaggedWord::stop(), true, 0), 1.0);
    dg.add_dependency(IntDependency::new(root, head, false, 0), 1.0);

    Fixture {
      state_to_tag: vec![None, None, Some(nnp_t), Some(vbd_t), Some(b_t)],
      tag_to_state: vec![nnp_s, vbd_s, b_s],
      goal,
      boundary_word: boundary,
      boundary_tag: b_t,
      states,
      words,
      tags,
      bg,
      ug,
      lex,
      dg,
    }
  }

  fn pcfg_parser(fx: &Fixture) -> ChartParser<'_> {
    let mut parser = ChartParser::new(
      &fx.bg,
      &fx.ug,
      &fx.lex,
      &fx.states,
      &fx.words,
      &fx.state_to_tag,
      &fx.tag_to_state,
      fx.goal,
    );
    parser.set_boundary_word(Some(fx.boundary_word));
    parser
  }

  fn sentence(fx: &Fixture) -> Vec<u32> {
    ["John", "ran", BOUNDARY_WORD]
      .iter()
      .map(|w| fx.words.id_of(w).unwrap())
      .collect()
  }

  #[test]
  fn test_combined_parse_finds_goal() {
    let fx = john_ran_fixture();
    let words = sentence(&fx);

    let mut pcfg = pcfg_parser(&fx);
    assert!(pcfg.parse(&words));
    pcfg.compute_outside_scores();

    let mut bilex = BiLexParser::new(
      &pcfg,
      &fx.bg,
      &fx.ug,
      &fx.lex,
      &fx.dg,
      &fx.states,
      &fx.words,
      &fx.tag_to_state,
      fx.goal,
      fx.boundary_tag,
    );
    assert!(bilex.parse(&words));
    assert!(bilex.has_parse());

    let (tree, score) = bilex.best_parse().unwrap();
    assert_eq!(
      tree.bracketed(),
      format!("(GOAL (S (NNP John) (VBD ran)) ({} {}))", BOUNDARY_TAG, BOUNDARY_WORD)
    );

    // combined score = PCFG score + dependency scores of the one analysis
    let john = fx.words.id_of("John").unwrap() as i32;
    let ran = fx.words.id_of("ran").unwrap() as i32;
    let boundary = fx.words.id_of(BOUNDARY_WORD).unwrap() as i32;
    let nnp = fx.tags.id_of("NNP").unwrap() as i32;
    let vbd = fx.tags.id_of("VBD").unwrap() as i32;
    let b_t = fx.tags.id_of(BOUNDARY_TAG).unwrap() as i32;
    use crate::dependency::DependencyScorer as _;
    let head = IntTaggedWord::new(ran, vbd);
    let arg = IntTaggedWord::new(john, nnp);
    let root = IntTaggedWord::new(boundary, b_t);
    let dep_total: f64 = [
      IntDependency::new(head, arg, false, 0),
      IntDependency::new(arg, IntTaggedWord::stop(), false, 0),
      IntDependency::new(arg, IntTaggedWord::stop(), true, 0),
      IntDependency::new(root, head, false, 0),
      IntDependency::new(head, IntTaggedWord::stop(), false, 1),
      IntDependency::new(head, IntTaggedWord::stop(), true, 0),
    ]
    .iter()
    .map(|d| fx.dg.score(d))
    .sum();
    assert!(dep_total.is_finite());

    let expected = pcfg.best_score() as f64 + dep_total;
    assert!(
      (score - expected).abs() < 1e-4,
      "combined score {} but PCFG {} + deps {} = {}",
      score,
      pcfg.best_score(),
      dep_total,
      expected
    );
  }

  #[test]
  fn test_item_ceiling_fails_softly() {
    let fx = john_ran_fixture();
    let words = sentence(&fx);

    let mut pcfg = pcfg_parser(&fx);
    assert!(pcfg.parse(&words));
    pcfg.compute_outside_scores();

    let mut bilex = BiLexParser::new(
      &pcfg,
      &fx.bg,
      &fx.ug,
      &fx.lex,
      &fx.dg,
      &fx.states,
      &fx.words,
      &fx.tag_to_state,
      fx.goal,
      fx.boundary_tag,
    );
    bilex.set_max_items(1);
    assert!(!bilex.parse(&words));
    assert!(!bilex.has_parse());
    assert!(bilex.best_parse().is_none());
  }
}
