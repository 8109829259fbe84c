//! Exact k-best derivation enumeration over a finished inside chart, after
//! Huang & Chiang's "Better k-best Parsing" (2005).
//!
//! The extractor is a read-only pass: it never touches the shared score
//! arrays, only memoizes candidate heaps and ranked derivation lists per
//! (state, span) vertex. Derivations come out sorted non-increasing by
//! score, ties broken by discovery order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::Err;
use crate::cky::ChartParser;
use crate::intern::IntTaggedWord;
use crate::syntree::{Constituent, SynTree, Word};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct Vertex {
  state: u32,
  start: usize,
  end: usize,
}

/// One way of building a vertex: the child vertices and the rule score that
/// joins them. Empty tails mean a preterminal tagging.
#[derive(Debug, Clone)]
struct Arc {
  tails: Vec<Vertex>,
  rule_score: f64,
}

/// An arc plus a rank choice for each tail (1-based, per Huang & Chiang).
#[derive(Debug, Clone)]
struct Derivation {
  arc: usize,
  ranks: Vec<usize>,
  score: f64,
  child_scores: Vec<f64>,
}

/// Max-heap entry ordered by score; insertion order breaks ties.
struct CandEntry {
  derivation: Derivation,
  seq: usize,
}

impl PartialEq for CandEntry {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for CandEntry {}

impl PartialOrd for CandEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for CandEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .derivation
      .score
      .total_cmp(&other.derivation.score)
      .then(other.seq.cmp(&self.seq))
  }
}

/// Lazy k-best lists over one parsed sentence. Holds the parser immutably;
/// all mutable state is the extractor's own memoization.
pub struct KBestExtractor<'a, 'g> {
  parser: &'a ChartParser<'g>,
  arcs: FxHashMap<Vertex, Vec<Arc>>,
  cand: FxHashMap<Vertex, BinaryHeap<CandEntry>>,
  seen: FxHashMap<Vertex, FxHashSet<(usize, Vec<usize>)>>,
  dhat: FxHashMap<Vertex, Vec<Derivation>>,
  seq: usize,
}

impl<'a, 'g> KBestExtractor<'a, 'g> {
  pub fn new(parser: &'a ChartParser<'g>) -> Self {
    Self {
      parser,
      arcs: FxHashMap::default(),
      cand: FxHashMap::default(),
      seen: FxHashMap::default(),
      dhat: FxHashMap::default(),
      seq: 0,
    }
  }

  /// The k best parses of the whole sentence, sorted non-increasing by
  /// score. Asking for more parses than the chart contains is an error.
  pub fn k_best_parses(&mut self, k: usize) -> Result<Vec<(SynTree<String, String>, f64)>, Err> {
    let parses = self.k_best_up_to(k);
    if parses.len() < k {
      return Err(
        format!(
          "requested {} best parses but the chart only contains {}",
          k,
          parses.len()
        )
        .into(),
      );
    }
    Ok(parses)
  }

  /// Like `k_best_parses`, but returns however many parses exist up to `k`.
  pub fn k_best_up_to(&mut self, k: usize) -> Vec<(SynTree<String, String>, f64)> {
    if !self.parser.has_parse() || k == 0 {
      return Vec::new();
    }
    let root = Vertex {
      state: self.parser.goal(),
      start: 0,
      end: self.parser.length(),
    };
    self.lazy_kth_best(root, k, k);

    let found = self.dhat[&root].len().min(k);
    (1..=found)
      .map(|rank| {
        let score = self.dhat[&root][rank - 1].score;
        (self.build_tree(root, rank), score)
      })
      .collect()
  }

  /// Every way of decomposing a vertex: a preterminal tagging when the span
  /// is one word wide, each binary rule at each split, each raw unary rule.
  fn backward_star(&mut self, v: Vertex) -> &[Arc] {
    if !self.arcs.contains_key(&v) {
      let mut arcs = Vec::new();

      if v.end - v.start == 1 && self.parser.is_tag_state(v.state) {
        let score = self.parser.inside_score(v.start, v.end, v.state) as f64;
        arcs.push(Arc {
          tails: Vec::new(),
          rule_score: score,
        });
      }

      let bg = self.parser.binary_grammar();
      for split in (v.start + 1)..v.end {
        for rule in bg.rules_by_parent(v.state) {
          arcs.push(Arc {
            tails: vec![
              Vertex {
                state: rule.left,
                start: v.start,
                end: split,
              },
              Vertex {
                state: rule.right,
                start: split,
                end: v.end,
              },
            ],
            rule_score: rule.score as f64,
          });
        }
      }

      for ur in self.parser.unary_grammar().rules_by_parent(v.state) {
        if ur.child == ur.parent {
          continue;
        }
        arcs.push(Arc {
          tails: vec![Vertex {
            state: ur.child,
            start: v.start,
            end: v.end,
          }],
          rule_score: ur.score as f64,
        });
      }

      self.arcs.insert(v, arcs);
    }
    &self.arcs[&v]
  }

  fn push_candidate(&mut self, v: Vertex, d: Derivation) {
    let key = (d.arc, d.ranks.clone());
    if !self.seen.entry(v).or_default().insert(key) {
      return;
    }
    let seq = self.seq;
    self.seq += 1;
    self
      .cand
      .get_mut(&v)
      .expect("candidate heap initialized")
      .push(CandEntry { derivation: d, seq });
  }

  /// Seed the candidate heap for a vertex with the best derivation of each
  /// arc, keeping only the `k_prime` best candidates.
  fn init_candidates(&mut self, v: Vertex, k_prime: usize) {
    if self.cand.contains_key(&v) {
      return;
    }
    let arcs: Vec<(usize, Arc)> = self
      .backward_star(v)
      .iter()
      .cloned()
      .enumerate()
      .collect();

    self.cand.insert(v, BinaryHeap::new());
    for (i, arc) in arcs {
      let mut score = arc.rule_score;
      let mut child_scores = Vec::with_capacity(arc.tails.len());
      for tail in &arc.tails {
        let s = self.parser.inside_score(tail.start, tail.end, tail.state) as f64;
        child_scores.push(s);
        score += s;
      }
      if score == f64::NEG_INFINITY {
        continue;
      }
      let ranks = vec![1; child_scores.len()];
      self.push_candidate(
        v,
        Derivation {
          arc: i,
          ranks,
          score,
          child_scores,
        },
      );
    }

    // bound the frontier: only the k' best seeds can ever be used
    let heap = self.cand.get_mut(&v).unwrap();
    if heap.len() > k_prime {
      let mut kept = BinaryHeap::with_capacity(k_prime);
      for _ in 0..k_prime {
        kept.push(heap.pop().unwrap());
      }
      *heap = kept;
    }
  }

  /// Extend dhat(v) to `k` entries if that many derivations exist.
  fn lazy_kth_best(&mut self, v: Vertex, k: usize, k_prime: usize) {
    self.init_candidates(v, k_prime);
    self.dhat.entry(v).or_default();

    while self.dhat[&v].len() < k {
      if let Some(last) = self.dhat[&v].last().cloned() {
        self.lazy_next(v, &last, k_prime);
      }
      match self.cand.get_mut(&v).unwrap().pop() {
        Some(entry) => self.dhat.get_mut(&v).unwrap().push(entry.derivation),
        None => break,
      }
    }
  }

  /// Push the successors of a just-consumed derivation: bump each tail's
  /// rank by one, holding the others fixed.
  fn lazy_next(&mut self, v: Vertex, derivation: &Derivation, k_prime: usize) {
    let tails = self.arcs[&v][derivation.arc].tails.clone();
    for i in 0..tails.len() {
      let mut ranks = derivation.ranks.clone();
      ranks[i] += 1;
      let tail = tails[i];
      self.lazy_kth_best(tail, ranks[i], k_prime);
      let dhat_tail = &self.dhat[&tail];
      if ranks[i] - 1 >= dhat_tail.len() {
        continue;
      }
      let next_child = &dhat_tail[ranks[i] - 1];
      let new_score = derivation.score - derivation.child_scores[i] + next_child.score;
      if new_score == f64::NEG_INFINITY {
        continue;
      }
      let mut child_scores = derivation.child_scores.clone();
      child_scores[i] = next_child.score;
      self.push_candidate(
        v,
        Derivation {
          arc: derivation.arc,
          ranks,
          score: new_score,
          child_scores,
        },
      );
    }
  }

  /// Materialize the tree for dhat(v)[rank - 1]. Every rank referenced by a
  /// stored derivation was filled by `lazy_kth_best` before it was stored.
  fn build_tree(&self, v: Vertex, rank: usize) -> SynTree<String, String> {
    let label = self.parser.states().resolve(v.state).to_string();
    let d = &self.dhat[&v][rank - 1];
    let arc = &self.arcs[&v][d.arc];

    if arc.tails.is_empty() {
      let word = self
        .parser
        .word_index()
        .resolve(self.parser.words()[v.start])
        .to_string();
      return SynTree::Branch(
        Constituent {
          value: label,
          span: (v.start, v.end),
        },
        vec![SynTree::Leaf(Word {
          value: word,
          span: (v.start, v.end),
        })],
      );
    }

    let children = arc
      .tails
      .iter()
      .zip(&d.ranks)
      .map(|(tail, &r)| self.build_tree(*tail, r))
      .collect();
    SynTree::Branch(
      Constituent {
        value: label,
        span: (v.start, v.end),
      },
      children,
    )
  }
}

/// A convenience check used by tree-level scoring: re-derive a tree's chart
/// score by summing its rule and tagging scores.
pub fn tree_score(parser: &ChartParser<'_>, tree: &SynTree<String, String>) -> f64 {
  fn walk(parser: &ChartParser<'_>, tree: &SynTree<String, String>) -> f64 {
    let Some((cons, children)) = tree.get_branch() else {
      return 0.0;
    };
    let states = parser.states();
    let this = states.id_of(&cons.value);

    if children.len() == 1 && children[0].is_leaf() {
      let (start, _) = cons.span;
      let Some(tag) = this.and_then(|s| parser.tag_of_state(s)) else {
        return f64::NEG_INFINITY;
      };
      let tagging = IntTaggedWord::new(parser.words()[start] as i32, tag as i32);
      return parser.lexicon().score(tagging, start) as f64;
    }

    let child_sum: f64 = children.iter().map(|c| walk(parser, c)).sum();
    let rule_score = match (this, children.len()) {
      (Some(p), 1) => {
        let child = children[0]
          .get_branch()
          .and_then(|(c, _)| states.id_of(&c.value));
        child
          .and_then(|c| {
            parser
              .unary_grammar()
              .rules_by_parent(p)
              .iter()
              .find(|u| u.child == c)
              .map(|u| u.score as f64)
          })
          .unwrap_or(f64::NEG_INFINITY)
      }
      (Some(p), 2) => {
        let l = children[0]
          .get_branch()
          .and_then(|(c, _)| states.id_of(&c.value));
        let r = children[1]
          .get_branch()
          .and_then(|(c, _)| states.id_of(&c.value));
        match (l, r) {
          (Some(l), Some(r)) => parser
            .binary_grammar()
            .score_of(p, l, r)
            .map(|s| s as f64)
            .unwrap_or(f64::NEG_INFINITY),
          _ => f64::NEG_INFINITY,
        }
      }
      _ => f64::NEG_INFINITY,
    };
    rule_score + child_sum
  }
  walk(parser, tree)
}
