//! Factored rescoring: approximate joint parsing by reranking a PCFG k-best
//! list with the dependency grammar.
//!
//! No search of its own happens here. The PCFG stage supplies candidates,
//! each candidate's implied dependency set is read off by percolating heads
//! through the binarized tree, and the candidates are reranked by the sum of
//! both scores. Exact joint search over the hook chart is exponentially more
//! sensitive to grammar size; this stage is the cheap alternative.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::debug;

use crate::cky::ChartParser;
use crate::dependency::{DependencyScorer, HeadFinder, tree_to_dependencies};
use crate::intern::Index;
use crate::kbest::KBestExtractor;
use crate::syntree::SynTree;

/// How many extra PCFG candidates to harvest per requested parse.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 3;
/// Flat bonus on top of the multiplied candidate count.
pub const DEFAULT_CANDIDATE_ADDEND: usize = 50;

/// Min-heap entry over combined score, so the worst kept candidate sits on
/// top of the bounded structure.
struct Kept {
  tree: SynTree<String, String>,
  score: f64,
  seq: usize,
}

impl PartialEq for Kept {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Kept {}

impl PartialOrd for Kept {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Kept {
  fn cmp(&self, other: &Self) -> Ordering {
    other
      .score
      .total_cmp(&self.score)
      .then(self.seq.cmp(&other.seq))
  }
}

/// Reranks PCFG candidates by combined PCFG + dependency score.
pub struct FactoredRescorer<'a> {
  dg: &'a dyn DependencyScorer,
  head_finder: &'a dyn HeadFinder,
  tags: &'a Index,
  num_to_find: usize,
  multiplier: usize,
  addend: usize,

  results: Vec<(SynTree<String, String>, f64)>,
  pcfg_parsed: bool,
}

impl<'a> FactoredRescorer<'a> {
  pub fn new(
    dg: &'a dyn DependencyScorer,
    head_finder: &'a dyn HeadFinder,
    tags: &'a Index,
    num_to_find: usize,
  ) -> Self {
    Self {
      dg,
      head_finder,
      tags,
      num_to_find,
      multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
      addend: DEFAULT_CANDIDATE_ADDEND,
      results: Vec::new(),
      pcfg_parsed: false,
    }
  }

  pub fn set_candidate_budget(&mut self, multiplier: usize, addend: usize) {
    self.multiplier = multiplier;
    self.addend = addend;
  }

  /// Rerank the candidates of an already-parsed PCFG query. Returns whether
  /// any candidate survived rescoring.
  pub fn rescore(&mut self, pcfg: &ChartParser<'_>) -> bool {
    self.results.clear();
    self.pcfg_parsed = pcfg.has_parse();
    if !self.pcfg_parsed {
      return false;
    }

    let budget = self.num_to_find * self.multiplier + self.addend;
    let mut extractor = KBestExtractor::new(pcfg);
    let candidates = extractor.k_best_up_to(budget);
    debug!(
      requested = budget,
      found = candidates.len(),
      "rescoring PCFG candidates"
    );

    // bounded best list: only the num_to_find best survive, never a full
    // sort of every candidate
    let mut kept: BinaryHeap<Kept> = BinaryHeap::with_capacity(self.num_to_find + 1);
    for (seq, (tree, pcfg_score)) in candidates.into_iter().enumerate() {
      let deps = match tree_to_dependencies(&tree, pcfg.word_index(), self.tags, self.head_finder)
      {
        Ok(deps) => deps,
        Err(e) => {
          debug!(error = %e, "skipping candidate with no dependency reading");
          continue;
        }
      };
      let dep_score: f64 = deps
        .iter()
        .map(|d| self.dg.score(d))
        .filter(|s| *s > f64::NEG_INFINITY)
        .sum();
      kept.push(Kept {
        tree,
        score: pcfg_score + dep_score,
        seq,
      });
      if kept.len() > self.num_to_find {
        kept.pop();
      }
    }

    let mut results: Vec<(SynTree<String, String>, f64)> = kept
      .into_iter()
      .map(|k| (k.tree, k.score))
      .collect();
    results.sort_by(|a, b| b.1.total_cmp(&a.1));
    self.results = results;
    !self.results.is_empty()
  }

  /// Whether the underlying PCFG stage produced anything at all.
  pub fn has_parse(&self) -> bool {
    self.pcfg_parsed
  }

  pub fn best_parse(&self) -> Option<&(SynTree<String, String>, f64)> {
    self.results.first()
  }

  /// The reranked candidates, best first, at most `num_to_find` of them.
  pub fn best_parses(&self) -> &[(SynTree<String, String>, f64)] {
    &self.results
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dependency::{
    IdentityProjection, IntDependency, MleDependencyGrammar, RightHeadFinder, TagBinner,
  };
  use crate::grammar::{BinaryGrammarBuilder, UnaryGrammarBuilder};
  use crate::intern::IntTaggedWord;
  use crate::lexicon::HashLexicon;
  use crate::rules::BinaryRule;

  struct Fixture {
    states: Index,
    words: Index,
    tags: Index,
    bg: crate::grammar::BinaryGrammar,
    ug: crate::grammar::UnaryGrammar,
    lex: HashLexicon,
    state_to_tag: Vec<Option<u32>>,
    tag_to_state: Vec<u32>,
    goal: u32,
  }

  impl Fixture {
    fn parser(&self) -> ChartParser<'_> {
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
  }

  /// "fish fish fish" is ambiguous: the middle word is either the verb
  /// (N V N reading, preferred by the PCFG) or part of a compound subject
  /// (N N V reading). Preterminal states double as the dependency tags.
  fn fish_fixture() -> Fixture {
    let mut states = Index::new();
    let s = states.intern("S");
    let np = states.intern("NP");
    let n = states.intern("N");
    let v = states.intern("V");

    let mut tags = Index::new();
    let n_t = tags.intern("N");
    let v_t = tags.intern("V");

    let mut words = Index::new();
    let fish = words.intern("fish");

    let mut bb = BinaryGrammarBuilder::new();
    bb.add_rule(BinaryRule::new(s, n, np, -0.4));
    bb.add_rule(BinaryRule::new(np, v, n, -0.5));
    bb.add_rule(BinaryRule::new(np, n, n, -1.0));
    bb.add_rule(BinaryRule::new(s, np, v, -0.6));
    let bg = bb.compile(&states);
    let ug = UnaryGrammarBuilder::new().compile(&states);

    let mut lex = HashLexicon::new();
    lex.add(fish, n_t, -0.3);
    lex.add(fish, v_t, -0.7);

    Fixture {
      state_to_tag: vec![None, None, Some(n_t), Some(v_t)],
      tag_to_state: vec![n, v],
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
  fn test_rescoring_can_overturn_pcfg_order() {
    let fx = fish_fixture();
    let mut parser = fx.parser();
    let fish = fx.words.id_of("fish").unwrap();
    assert!(parser.parse(&[fish, fish, fish]));

    // PCFG alone prefers the N V N reading
    let mut extractor = KBestExtractor::new(&parser);
    let pcfg_best = extractor.k_best_up_to(2);
    assert_eq!(pcfg_best.len(), 2);
    assert_eq!(
      pcfg_best[0].0.bracketed(),
      "(S (N fish) (NP (V fish) (N fish)))"
    );

    // a dependency grammar that strongly prefers noun-noun attachments to
    // a noun taking a verb argument
    let binner = TagBinner::new(&fx.tags, &IdentityProjection);
    let mut dg = MleDependencyGrammar::new(binner, true, true, true);
    dg.smooth_a_t = 1.0;
    dg.smooth_a_tw = 1.0;
    dg.smooth_stop = 1.0;
    let fish_i = fish as i32;
    let n_t = fx.tags.id_of("N").unwrap() as i32;
    let v_t = fx.tags.id_of("V").unwrap() as i32;
    let head = IntTaggedWord::new(fish_i, n_t);
    let verb_arg = IntTaggedWord::new(fish_i, v_t);
    dg.add_dependency(IntDependency::new(head, head, false, 0), 8.0);
    dg.add_dependency(IntDependency::new(head, verb_arg, false, 0), 1.0);
    dg.add_dependency(
      IntDependency::new(head, IntTaggedWord::stop(), false, 0),
      2.0,
    );
    dg.add_dependency(
      IntDependency::new(head, IntTaggedWord::stop(), true, 0),
      1.0,
    );

    let hf = RightHeadFinder;
    let mut rescorer = FactoredRescorer::new(&dg, &hf, &fx.tags, 2);
    assert!(rescorer.rescore(&parser));
    assert!(rescorer.has_parse());

    let results = rescorer.best_parses();
    assert_eq!(results.len(), 2);
    assert!(results[0].1 >= results[1].1);
    // the compound reading wins once dependencies weigh in
    assert_eq!(
      results[0].0.bracketed(),
      "(S (NP (N fish) (N fish)) (V fish))"
    );
  }

  #[test]
  fn test_bounded_result_list() {
    let fx = fish_fixture();
    let mut parser = fx.parser();
    let fish = fx.words.id_of("fish").unwrap();
    assert!(parser.parse(&[fish, fish, fish]));

    let binner = TagBinner::new(&fx.tags, &IdentityProjection);
    let dg = MleDependencyGrammar::new(binner, true, true, true);
    let hf = RightHeadFinder;
    let mut rescorer = FactoredRescorer::new(&dg, &hf, &fx.tags, 1);
    assert!(rescorer.rescore(&parser));
    assert_eq!(rescorer.best_parses().len(), 1);

    // a starved candidate budget still returns the PCFG 1-best
    let mut rescorer = FactoredRescorer::new(&dg, &hf, &fx.tags, 1);
    rescorer.set_candidate_budget(1, 0);
    assert!(rescorer.rescore(&parser));
    assert_eq!(rescorer.best_parses().len(), 1);
  }

  #[test]
  fn test_no_pcfg_parse_propagates() {
    let fx = fish_fixture();
    let mut parser = fx.parser();
    let fish = fx.words.id_of("fish").unwrap();
    assert!(!parser.parse(&[fish]));

    let binner = TagBinner::new(&fx.tags, &IdentityProjection);
    let dg = MleDependencyGrammar::new(binner, true, true, true);
    let hf = RightHeadFinder;
    let mut rescorer = FactoredRescorer::new(&dg, &hf, &fx.tags, 2);
    assert!(!rescorer.rescore(&parser));
    assert!(!rescorer.has_parse());
    assert!(rescorer.best_parse().is_none());
  }
}
