//! A factored statistical parser: exhaustive and iterative-deepening CKY
//! over a binarized PCFG, an Eisner–Satta combined PCFG + dependency search,
//! and a k-best dependency rescorer as its cheap approximation.
//!
//! `LexParser` holds the compiled, immutable model; `ParserQuery` owns the
//! per-sentence chart state, so one `LexParser` can serve many queries (or
//! threads) at once.

#[macro_use]
extern crate lazy_static;

pub mod bilex;
pub mod chart;
pub mod cky;
pub mod dependency;
pub mod factored;
pub mod grammar;
pub mod hooks;
pub mod intern;
pub mod kbest;
pub mod lexicon;
pub mod parse_grammar;
pub mod rules;
pub mod syntree;
pub mod utils;

use tracing::debug;

use crate::bilex::BiLexParser;
use crate::cky::{ChartParser, ParserConstraint, SearchStrategy};
use crate::dependency::{DependencyScorer, HeadFinder};
use crate::factored::FactoredRescorer;
use crate::grammar::{BinaryGrammar, BinaryGrammarBuilder, UnaryGrammar, UnaryGrammarBuilder};
use crate::intern::{BOUNDARY_TAG, BOUNDARY_WORD, Index};
use crate::kbest::KBestExtractor;
use crate::lexicon::Lexicon;
use crate::syntree::SynTree;
pub use crate::utils::Err;

/// Parser-wide switches, fixed when the model is assembled.
#[derive(Debug, Clone)]
pub struct Options {
  /// Combine with the dependency grammar when one is present.
  pub do_dep: bool,
  /// Rescore a PCFG k-best list instead of running the exact combined
  /// search.
  pub use_fast_factored: bool,
  pub strategy: SearchStrategy,
  pub length_normalization: bool,
  /// Item ceiling for the combined search; exceeding it is a soft failure.
  pub max_items: usize,
  /// How many parses the factored rescorer should return.
  pub num_to_find: usize,
}

impl Default for Options {
  fn default() -> Self {
    Self {
      do_dep: true,
      use_fast_factored: false,
      strategy: SearchStrategy::Exhaustive,
      length_normalization: false,
      max_items: 200_000,
      num_to_find: 1,
    }
  }
}

/// The compiled model: grammars, lexicon, optional dependency grammar, and
/// the interned symbol spaces they agree on. Immutable once constructed;
/// `new` is the single finalize step that materializes every derived index.
pub struct LexParser {
  options: Options,
  states: Index,
  words: Index,
  tags: Index,
  bg: BinaryGrammar,
  ug: UnaryGrammar,
  lexicon: Box<dyn Lexicon>,
  dg: Option<Box<dyn DependencyScorer>>,
  head_finder: Box<dyn HeadFinder>,
  state_to_tag: Vec<Option<u32>>,
  tag_to_state: Vec<u32>,
  goal: u32,
  boundary_word: u32,
  boundary_tag: u32,
}

impl LexParser {
  /// Assemble a parser from rule builders and symbol tables. Every tag gets
  /// a preterminal state, the boundary symbols are interned, and both
  /// grammars are compiled with their derived tables; after this nothing can
  /// be added.
  ///
  /// Queries append the boundary word to every sentence, so the grammar must
  /// derive the goal over a final boundary constituent and the lexicon must
  /// tag `BOUNDARY_WORD` as `BOUNDARY_TAG`.
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    mut states: Index,
    mut words: Index,
    mut tags: Index,
    binary: BinaryGrammarBuilder,
    unary: UnaryGrammarBuilder,
    lexicon: Box<dyn Lexicon>,
    head_finder: Box<dyn HeadFinder>,
    goal: &str,
    options: Options,
  ) -> Self {
    let boundary_word = words.intern(BOUNDARY_WORD);
    let boundary_tag = tags.intern(BOUNDARY_TAG);
    let goal = states.intern(goal);

    let tag_names: Vec<String> = tags.iter().map(String::from).collect();
    for name in &tag_names {
      states.intern(name);
    }

    let bg = binary.compile(&states);
    let ug = unary.compile(&states);

    let mut state_to_tag = vec![None; states.len()];
    let mut tag_to_state = vec![0u32; tag_names.len()];
    for (tag, name) in tag_names.iter().enumerate() {
      let state = states.id_of(name).expect("tag states interned above");
      tag_to_state[tag] = state;
      state_to_tag[state as usize] = Some(tag as u32);
    }

    debug!(
      states = states.len(),
      binary_rules = bg.num_rules(),
      unary_rules = ug.num_rules(),
      tags = tag_names.len(),
      "parser assembled"
    );

    Self {
      options,
      states,
      words,
      tags,
      bg,
      ug,
      lexicon,
      dg: None,
      head_finder,
      state_to_tag,
      tag_to_state,
      goal,
      boundary_word,
      boundary_tag,
    }
  }

  /// Attach a dependency grammar (an MLE grammar or a combination of two).
  /// Its tag bins must come from this parser's tag inventory.
  pub fn set_dependency_grammar(&mut self, dg: Box<dyn DependencyScorer>) {
    self.dg = Some(dg);
  }

  pub fn options(&self) -> &Options {
    &self.options
  }

  pub fn states(&self) -> &Index {
    &self.states
  }

  pub fn words(&self) -> &Index {
    &self.words
  }

  pub fn tags(&self) -> &Index {
    &self.tags
  }

  /// A fresh per-sentence query. Queries borrow the model read-only, so
  /// several can be live at once (one per worker).
  pub fn parser_query(&self) -> ParserQuery<'_> {
    let mut pcfg = ChartParser::new(
      &self.bg,
      &self.ug,
      self.lexicon.as_ref(),
      &self.states,
      &self.words,
      &self.state_to_tag,
      &self.tag_to_state,
      self.goal,
    );
    pcfg.set_strategy(self.options.strategy);
    pcfg.set_length_normalization(self.options.length_normalization);
    ParserQuery {
      lp: self,
      pcfg,
      combined: Vec::new(),
      succeeded: false,
      fallback: false,
    }
  }

  /// One-shot convenience: parse a sentence and return the best analysis.
  pub fn parse(&self, sentence: &[&str]) -> Option<(SynTree<String, String>, f64)> {
    let mut query = self.parser_query();
    if query.parse(sentence) {
      query.best_parse()
    } else {
      None
    }
  }
}

/// Per-sentence parsing state: the PCFG chart plus whatever the combined
/// stage produced. A failed combined stage falls back to the PCFG parse
/// rather than failing the sentence.
pub struct ParserQuery<'a> {
  lp: &'a LexParser,
  pcfg: ChartParser<'a>,
  combined: Vec<(SynTree<String, String>, f64)>,
  succeeded: bool,
  fallback: bool,
}

impl ParserQuery<'_> {
  pub fn set_constraints(&mut self, constraints: Vec<ParserConstraint>) {
    self.pcfg.set_constraints(constraints);
  }

  /// Parse one sentence. Returns whether any stage produced an analysis; a
  /// sentence with out-of-vocabulary words simply has no parse.
  pub fn parse(&mut self, sentence: &[&str]) -> bool {
    self.combined.clear();
    self.succeeded = false;
    self.fallback = false;
    if sentence.is_empty() {
      return false;
    }

    let Some(mut ids) = sentence
      .iter()
      .map(|w| self.lp.words.id_of(w))
      .collect::<Option<Vec<u32>>>()
    else {
      debug!("sentence contains words outside the lexicon index");
      return false;
    };

    // the goal always derives a final boundary constituent
    ids.push(self.lp.boundary_word);
    self.pcfg.set_boundary_word(Some(self.lp.boundary_word));

    if !self.pcfg.parse(&ids) {
      return false;
    }

    let use_dep = self.lp.options.do_dep && self.lp.dg.is_some();
    if !use_dep {
      self.succeeded = true;
      return true;
    }

    let dg = self.lp.dg.as_deref().expect("checked above");
    if self.lp.options.use_fast_factored {
      let mut rescorer = FactoredRescorer::new(
        dg,
        self.lp.head_finder.as_ref(),
        &self.lp.tags,
        self.lp.options.num_to_find,
      );
      if rescorer.rescore(&self.pcfg) {
        self.combined = rescorer
          .best_parses()
          .iter()
          .map(|(t, s)| (strip_boundary(t.clone()), *s))
          .collect();
      } else {
        self.fallback = true;
      }
    } else {
      self.pcfg.compute_outside_scores();
      let mut bilex = BiLexParser::new(
        &self.pcfg,
        &self.lp.bg,
        &self.lp.ug,
        self.lp.lexicon.as_ref(),
        dg,
        &self.lp.states,
        &self.lp.words,
        &self.lp.tag_to_state,
        self.lp.goal,
        self.lp.boundary_tag,
      );
      bilex.set_max_items(self.lp.options.max_items);
      if bilex.parse(&ids) {
        self
          .combined
          .extend(bilex.best_parse().map(|(t, s)| (strip_boundary(t), s)));
      } else {
        debug!("combined search failed, falling back to the PCFG parse");
        self.fallback = true;
      }
    }

    self.succeeded = true;
    true
  }

  /// Whether the last `parse` call found an analysis in any stage.
  pub fn parse_succeeded(&self) -> bool {
    self.succeeded
  }

  /// Whether the analysis came from the PCFG fallback rather than the
  /// combined stage.
  pub fn parse_fallback(&self) -> bool {
    self.fallback
  }

  pub fn has_parse(&self) -> bool {
    !self.combined.is_empty() || self.pcfg.has_parse()
  }

  /// The best analysis: the combined stage's if it succeeded, otherwise the
  /// PCFG's. The boundary word never appears in returned trees.
  pub fn best_parse(&self) -> Option<(SynTree<String, String>, f64)> {
    if let Some((tree, score)) = self.combined.first() {
      return Some((tree.clone(), *score));
    }
    let (tree, score) = self.pcfg.best_parse()?;
    Some((strip_boundary(tree), score))
  }

  /// Every analysis the combined stage kept, best first.
  pub fn best_parses(&self) -> &[(SynTree<String, String>, f64)] {
    &self.combined
  }

  /// Exact k-best parses from the PCFG chart. Asking for more parses than
  /// exist is an error, not a truncation.
  pub fn k_best_pcfg_parses(
    &self,
    k: usize,
  ) -> Result<Vec<(SynTree<String, String>, f64)>, Err> {
    let mut extractor = KBestExtractor::new(&self.pcfg);
    let parses = extractor.k_best_parses(k)?;
    Ok(
      parses
        .into_iter()
        .map(|(t, s)| (strip_boundary(t), s))
        .collect(),
    )
  }

  pub fn pcfg_parser(&self) -> &ChartParser<'_> {
    &self.pcfg
  }
}

/// Drop a trailing boundary constituent from a tree root, if present.
fn strip_boundary(tree: SynTree<String, String>) -> SynTree<String, String> {
  match tree {
    SynTree::Branch(mut cons, mut children) => {
      let ends_in_boundary = children.last().map_or(false, |c| {
        c.get_branch()
          .and_then(|(_, gc)| gc.first())
          .and_then(|l| l.get_leaf())
          .map_or(false, |w| w.value == BOUNDARY_WORD)
      });
      if ends_in_boundary && children.len() > 1 {
        children.pop();
        cons.span.1 -= 1;
      }
      SynTree::Branch(cons, children)
    }
    leaf => leaf,
  }
}
