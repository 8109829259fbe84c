//! Head–argument dependency scoring.
//!
//! The model is a maximum-likelihood dependency grammar over (word, tag)
//! pairs in a projected tag space, with valence/distance bucketing and
//! Witten–Bell-style additive smoothing between a fully lexicalized estimate
//! and its tag-level backoff, times a per-head STOP/continue model. Two
//! grammars can be combined linearly with a history-count-driven weight.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::Err;
use crate::intern::{ANY, ANY_DISTANCE, BOUNDARY_TAG, Index, IntTaggedWord, STOP};
use crate::parse_grammar::{parse_arrow, parse_quoted, skip_spaces};
use crate::syntree::SynTree;
use crate::utils::log_add;

/// Probabilities below this floor count as impossible.
const MIN_PROBABILITY: f64 = 1e-40;
/// Log scores below this floor are numerically broken; collapse them.
const SCORE_FLOOR: f64 = -100.0;

/// A head -> argument attachment. `distance` is a bucketed (or raw, during
/// extraction) signed distance, with `ANY_DISTANCE` as the wildcard.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IntDependency {
  pub head: IntTaggedWord,
  pub arg: IntTaggedWord,
  pub left_headed: bool,
  pub distance: i16,
}

impl IntDependency {
  pub fn new(head: IntTaggedWord, arg: IntTaggedWord, left_headed: bool, distance: i16) -> Self {
    Self {
      head,
      arg,
      left_headed,
      distance,
    }
  }
}

/// A coarsening map over tag names, used to control sparsity.
pub trait TagProjection {
  fn project<'a>(&self, tag: &'a str) -> &'a str;
}

/// Keep the full tag set.
#[derive(Debug, Default)]
pub struct IdentityProjection;

impl TagProjection for IdentityProjection {
  fn project<'a>(&self, tag: &'a str) -> &'a str {
    tag
  }
}

/// Strip functional annotation: everything from the first `-`, `=` or `^` on,
/// so `NN-TMP` and `NN` fall into the same bin. A tag that *begins* with an
/// annotation character keeps it, and keeps the matching closer too: `-NONE-`
/// and `-LRB-` are whole categories, not prefixes.
#[derive(Debug, Default)]
pub struct BasicCategoryProjection;

fn is_annotation_char(ch: char) -> bool {
  ch == '-' || ch == '=' || ch == '^'
}

impl TagProjection for BasicCategoryProjection {
  fn project<'a>(&self, tag: &'a str) -> &'a str {
    let mut seen_at_zero = None;
    for (i, ch) in tag.char_indices() {
      if is_annotation_char(ch) {
        if i == 0 {
          seen_at_zero = Some(ch);
        } else if seen_at_zero == Some(ch) {
          seen_at_zero = None;
        } else {
          return &tag[..i];
        }
      }
    }
    tag
  }
}

/// The projected tag space: tag id -> bin id, densely interned. Sentinel ids
/// (negative) map to themselves.
#[derive(Debug, Clone)]
pub struct TagBinner {
  bins: Vec<i32>,
  names: Index,
  boundary_bin: Option<i32>,
}

impl TagBinner {
  pub fn new(tags: &Index, projection: &dyn TagProjection) -> Self {
    let mut names = Index::new();
    let bins: Vec<i32> = tags
      .iter()
      .map(|t| names.intern(projection.project(t)) as i32)
      .collect();
    let boundary_bin = tags.id_of(BOUNDARY_TAG).map(|id| bins[id as usize]);
    Self {
      bins,
      names,
      boundary_bin,
    }
  }

  pub fn bin(&self, tag: i32) -> i32 {
    if tag < 0 {
      tag
    } else {
      self.bins[tag as usize]
    }
  }

  pub fn num_bins(&self) -> usize {
    self.names.len()
  }

  pub fn bin_name(&self, bin: i32) -> &str {
    self.names.resolve(bin as u32)
  }

  pub fn bin_of_name(&self, name: &str) -> Option<i32> {
    self.names.id_of(name).map(|id| id as i32)
  }

  pub fn boundary_bin(&self) -> Option<i32> {
    self.boundary_bin
  }
}

/// The scoring capability the parsers consume. Implementations must agree
/// with their own `tag_bin` projection.
pub trait DependencyScorer {
  /// Log-probability of a dependency in the full tag space; `-inf` means
  /// impossible under this grammar.
  fn score(&self, dep: &IntDependency) -> f64;

  /// Log-probability of a dependency whose tags are already bin ids, with a
  /// raw (unbucketed) distance. The combined parser's score cache works in
  /// this space.
  fn score_binned(&self, dep: &IntDependency) -> f64;

  /// Project a full-space tag id into the scoring bin space.
  fn tag_bin(&self, tag: i32) -> i32;

  fn num_tag_bins(&self) -> usize;

  /// Bucket a raw head-argument distance.
  fn distance_bin(&self, distance: i16) -> i16;

  fn num_distance_bins(&self) -> usize;
}

/// MLE dependency grammar with count tables in the binned tag space.
#[derive(Debug)]
pub struct MleDependencyGrammar {
  binner: TagBinner,
  directional: bool,
  use_distance: bool,
  use_coarse_distance: bool,

  /// m-estimate prior for arg tag given lexical head context
  pub smooth_a_t: f64,
  /// m-estimate prior for arg word+tag given lexical head context
  pub smooth_a_tw: f64,
  pub smooth_stop: f64,
  /// share of mass on the direct word+tag model vs tag-then-word backoff
  pub interp: f64,
  /// scale applied to the final log score
  pub dep_weight: f64,

  arg_counter: FxHashMap<IntDependency, f64>,
  stop_counter: FxHashMap<IntDependency, f64>,
  punct_bins: FxHashSet<i32>,
}

impl MleDependencyGrammar {
  pub fn new(
    binner: TagBinner,
    directional: bool,
    use_distance: bool,
    use_coarse_distance: bool,
  ) -> Self {
    Self {
      binner,
      directional,
      use_distance,
      use_coarse_distance,
      smooth_a_t: 32.0,
      smooth_a_tw: 16.0,
      smooth_stop: 4.0,
      interp: 0.6,
      dep_weight: 1.0,
      arg_counter: FxHashMap::default(),
      stop_counter: FxHashMap::default(),
      punct_bins: FxHashSet::default(),
    }
  }

  /// Arguments carrying these tags score as certain (their attachments are
  /// ignored). Treebank-specific; empty by default.
  pub fn set_punctuation_tags(&mut self, tags: &[i32]) {
    self.punct_bins = tags.iter().map(|&t| self.binner.bin(t)).collect();
  }

  pub fn binner(&self) -> &TagBinner {
    &self.binner
  }

  /// Valence bucket: sign three-way, collapsed when distance is off.
  pub fn valence_bin(&self, distance: i16) -> i16 {
    if !self.use_distance {
      0
    } else if distance < 0 {
      -1
    } else if distance == 0 {
      0
    } else {
      1
    }
  }

  /// Distance bucket over a monotone cut-point table: coarse {0,2,5} or
  /// fine {0,1,5,10}.
  pub fn distance_bin(&self, distance: i16) -> i16 {
    if !self.use_distance {
      0
    } else if self.use_coarse_distance {
      match distance {
        d if d <= 0 => 0,
        d if d <= 2 => 1,
        d if d <= 5 => 2,
        _ => 3,
      }
    } else {
      match distance {
        d if d <= 0 => 0,
        d if d <= 1 => 1,
        d if d <= 5 => 2,
        d if d <= 10 => 3,
        _ => 4,
      }
    }
  }

  fn arg_count(&self, head: IntTaggedWord, arg: IntTaggedWord, lh: bool, dist: i16) -> f64 {
    self
      .arg_counter
      .get(&IntDependency::new(head, arg, lh, dist))
      .copied()
      .unwrap_or(0.0)
  }

  fn stop_count(&self, head: IntTaggedWord, arg: IntTaggedWord, lh: bool, dist: i16) -> f64 {
    self
      .stop_counter
      .get(&IntDependency::new(head, arg, lh, dist))
      .copied()
      .unwrap_or(0.0)
  }

  fn inc_arg(&mut self, head: IntTaggedWord, arg: IntTaggedWord, lh: bool, dist: i16, count: f64) {
    *self
      .arg_counter
      .entry(IntDependency::new(head, arg, lh, dist))
      .or_insert(0.0) += count;
  }

  fn inc_stop(&mut self, head: IntTaggedWord, arg: IntTaggedWord, lh: bool, dist: i16, count: f64) {
    *self
      .stop_counter
      .entry(IntDependency::new(head, arg, lh, dist))
      .or_insert(0.0) += count;
  }

  /// Train from binarized trees: percolate heads through each tree and
  /// observe every implied dependency, STOP events included.
  pub fn train(
    &mut self,
    trees: &[SynTree<String, String>],
    words: &Index,
    tags: &Index,
    head_finder: &dyn HeadFinder,
  ) -> Result<(), Err> {
    for tree in trees {
      for dep in tree_to_dependencies(tree, words, tags, head_finder)? {
        self.add_dependency(dep, 1.0);
      }
    }
    Ok(())
  }

  /// Observe a dependency in the full tag space. STOP arguments feed only
  /// the stop model.
  pub fn add_dependency(&mut self, dep: IntDependency, count: f64) {
    let left_headed = dep.left_headed && self.directional;
    let binned = IntDependency::new(
      IntTaggedWord::new(dep.head.word, self.binner.bin(dep.head.tag)),
      IntTaggedWord::new(dep.arg.word, self.binner.bin(dep.arg.tag)),
      left_headed,
      dep.distance,
    );
    if binned.arg.word != STOP {
      self.expand_arg(&binned, self.valence_bin(dep.distance), count);
    }
    self.expand_stop(&binned, self.distance_bin(dep.distance), count, true);
  }

  /// Spread one argument observation across every backoff row it supports.
  /// `dep` is already tag-binned.
  fn expand_arg(&mut self, dep: &IntDependency, val_bin: i16, count: f64) {
    let head = dep.head;
    let head_t = IntTaggedWord::new(ANY, head.tag);
    let arg = dep.arg;
    let arg_t = IntTaggedWord::new(ANY, arg.tag);
    let wild = IntTaggedWord::any();
    let lh = dep.left_headed;

    self.inc_arg(head, arg, lh, val_bin, count);
    self.inc_arg(head_t, arg, lh, val_bin, count);
    self.inc_arg(head, arg_t, lh, val_bin, count);
    self.inc_arg(head_t, arg_t, lh, val_bin, count);

    self.inc_arg(head, wild, lh, val_bin, count);
    self.inc_arg(head_t, wild, lh, val_bin, count);

    // wild-head rows are directionless and distance-free
    self.inc_arg(wild, arg, false, ANY_DISTANCE, count);
    self.inc_arg(wild, arg_t, false, ANY_DISTANCE, count);
  }

  /// `dep` is already tag-binned.
  fn expand_stop(&mut self, dep: &IntDependency, dist_bin: i16, count: f64, wild_for_stop: bool) {
    let head = dep.head;
    let head_t = IntTaggedWord::new(ANY, head.tag);
    let wild = IntTaggedWord::any();
    let stop = IntTaggedWord::stop();
    let lh = dep.left_headed;

    if dep.arg.word == STOP {
      self.inc_stop(head, stop, lh, dist_bin, count);
      self.inc_stop(head_t, stop, lh, dist_bin, count);
    }
    if wild_for_stop || dep.arg.word != STOP {
      self.inc_stop(head, wild, lh, dist_bin, count);
      self.inc_stop(head_t, wild, lh, dist_bin, count);
    }
  }

  /// How much lexical history the grammar has for this head context; drives
  /// the combination weight when two grammars are mixed.
  pub fn count_history(&self, dep: &IntDependency) -> f64 {
    let head = IntTaggedWord::new(dep.head.word, self.binner.bin(dep.head.tag));
    self.count_history_tb(&IntDependency::new(
      head,
      dep.arg,
      dep.left_headed,
      dep.distance,
    ))
  }

  /// `count_history` for a dependency whose head tag is already a bin id.
  pub fn count_history_tb(&self, dep: &IntDependency) -> f64 {
    self.arg_count(
      dep.head,
      IntTaggedWord::any(),
      dep.left_headed,
      self.valence_bin(dep.distance),
    )
  }

  pub fn num_distance_bins(&self) -> usize {
    if !self.use_distance {
      1
    } else if self.use_coarse_distance {
      4
    } else {
      5
    }
  }

  fn root_head(&self, head: IntTaggedWord) -> bool {
    self.binner.boundary_bin() == Some(head.tag)
  }

  /// Probability of stopping rather than generating another argument, for a
  /// tag-binned head context.
  fn stop_prob(&self, dep: &IntDependency) -> f64 {
    let dist = self.distance_bin(dep.distance);
    let any_head = IntTaggedWord::new(ANY, dep.head.tag);
    let stop = IntTaggedWord::stop();
    let wild = IntTaggedWord::any();

    let c_stop_htwds = self.stop_count(dep.head, stop, dep.left_headed, dist);
    let c_stop_htds = self.stop_count(any_head, stop, dep.left_headed, dist);
    let c_htwds = self.stop_count(dep.head, wild, dep.left_headed, dist);
    let c_htds = self.stop_count(any_head, wild, dep.left_headed, dist);

    let p_stop_htds = if c_htds > 0.0 {
      c_stop_htds / c_htds
    } else {
      1.0
    };
    (c_stop_htwds + self.smooth_stop * p_stop_htds) / (c_htwds + self.smooth_stop)
  }

  /// Probability of a tag-binned dependency as a real number in [0, 1].
  fn prob_tb(&self, dep: &IntDependency) -> f64 {
    let left_headed = dep.left_headed && self.directional;

    let pb_stop = if self.root_head(dep.head) {
      // the root generates exactly one argument and never stops early
      0.0
    } else {
      self.stop_prob(dep)
    };

    if dep.arg.word == STOP {
      return pb_stop;
    }
    let pb_go = 1.0 - pb_stop;

    if self.punct_bins.contains(&dep.arg.tag) {
      return 1.0;
    }

    let bin_distance = self.valence_bin(dep.distance);
    let any_head = IntTaggedWord::new(ANY, dep.head.tag);
    let any_arg = IntTaggedWord::new(ANY, dep.arg.tag);
    let wild = IntTaggedWord::any();

    let c_atw_htwd = self.arg_count(dep.head, dep.arg, left_headed, bin_distance);
    let c_at_htwd = self.arg_count(dep.head, any_arg, left_headed, bin_distance);
    let c_htwd = self.arg_count(dep.head, wild, left_headed, bin_distance);

    let c_atw_htd = self.arg_count(any_head, dep.arg, left_headed, bin_distance);
    let c_at_htd = self.arg_count(any_head, any_arg, left_headed, bin_distance);
    let c_htd = self.arg_count(any_head, wild, left_headed, bin_distance);

    let c_atw = self.arg_count(wild, dep.arg, false, ANY_DISTANCE);
    let c_at = self.arg_count(wild, any_arg, false, ANY_DISTANCE);

    // the 1.0 keeps unseen words generable from their tag
    let p_atw_at = if c_atw > 0.0 { c_atw / c_at } else { 1.0 };
    let p_atw_htd = if c_htd > 0.0 { c_atw_htd / c_htd } else { 0.0 };
    let p_at_htd = if c_htd > 0.0 { c_at_htd / c_htd } else { 0.0 };

    let pb_atw_htwd = (c_atw_htwd + self.smooth_a_tw * p_atw_htd) / (c_htwd + self.smooth_a_tw);
    let pb_at_htwd = (c_at_htwd + self.smooth_a_t * p_at_htd) / (c_htwd + self.smooth_a_t);

    let score =
      (self.interp * pb_atw_htwd + (1.0 - self.interp) * p_atw_at * pb_at_htwd) * pb_go;

    if score.is_nan() || score < MIN_PROBABILITY {
      0.0
    } else {
      score
    }
  }

  /// Score a dependency already projected into the bin space.
  pub fn score_tb(&self, dep: &IntDependency) -> f64 {
    let prob = self.prob_tb(dep);
    if prob <= 0.0 {
      return f64::NEG_INFINITY;
    }
    let score = self.dep_weight * prob.ln();
    if score.is_nan() || score < SCORE_FLOOR {
      f64::NEG_INFINITY
    } else {
      score
    }
  }

  /// Sum of scores over a dependency set, skipping impossible ones.
  pub fn score_all(&self, deps: &[IntDependency]) -> f64 {
    deps
      .iter()
      .map(|d| self.score(d))
      .filter(|s| *s > f64::NEG_INFINITY)
      .sum()
  }

  pub fn num_arg_rows(&self) -> usize {
    self.arg_counter.len()
  }

  pub fn num_stop_rows(&self) -> usize {
    self.stop_counter.len()
  }

  /// Serialize the core count tables. Only fully lexical rows are written;
  /// every derived backoff row is regenerated on read.
  pub fn write_model(&self, words: &Index) -> String {
    let mut out = String::new();
    let fmt = |itw: &IntTaggedWord| -> String {
      let word = match itw.word {
        ANY => "*".to_string(),
        STOP => "STOP".to_string(),
        w => words.resolve(w as u32).to_string(),
      };
      let tag = match itw.tag {
        ANY => "*".to_string(),
        STOP => "STOP".to_string(),
        t => self.binner.bin_name(t).to_string(),
      };
      crate::rules::quote_symbol(&format!("{}/{}", word, tag))
    };

    let mut arg_rows: Vec<(&IntDependency, &f64)> = self
      .arg_counter
      .iter()
      .filter(|(d, _)| d.head.word >= 0 && d.arg.word >= 0)
      .collect();
    arg_rows.sort_by_key(|(d, _)| {
      (d.head.word, d.head.tag, d.arg.word, d.arg.tag, d.left_headed, d.distance)
    });
    for (dep, count) in arg_rows {
      out.push_str(&format!(
        "{} -> {} {} {} {}\n",
        fmt(&dep.head),
        fmt(&dep.arg),
        if dep.left_headed { "left" } else { "right" },
        dep.distance,
        count
      ));
    }

    out.push_str("BEGIN_STOP\n");

    let mut stop_rows: Vec<(&IntDependency, &f64)> = self
      .stop_counter
      .iter()
      .filter(|(d, _)| d.head.word >= 0)
      .collect();
    stop_rows.sort_by_key(|(d, _)| {
      (d.head.word, d.head.tag, d.arg.word, d.left_headed, d.distance)
    });
    for (dep, count) in stop_rows {
      out.push_str(&format!(
        "{} -> {} {} {} {}\n",
        fmt(&dep.head),
        fmt(&dep.arg),
        if dep.left_headed { "left" } else { "right" },
        dep.distance,
        count
      ));
    }
    out
  }

  /// Re-populate the count tables from `write_model` output. Distances in
  /// the file are already bucketed, so rows re-expand directly.
  pub fn read_model(&mut self, text: &str, words: &mut Index) -> Result<(), Err> {
    let mut doing_stop = false;
    for (num, line) in text.lines().enumerate() {
      if line.trim().is_empty() {
        break;
      }
      if line.trim() == "BEGIN_STOP" {
        doing_stop = true;
        continue;
      }
      self
        .read_model_line(line, doing_stop, words)
        .map_err(|e| -> Err { format!("line {}: {}", num + 1, e).into() })?;
    }
    debug!(
      arg_rows = self.arg_counter.len(),
      stop_rows = self.stop_counter.len(),
      "dependency model loaded"
    );
    Ok(())
  }

  fn parse_tagged_word(&self, token: &str, words: &mut Index) -> Result<IntTaggedWord, Err> {
    let (word_str, tag_str) = token
      .rsplit_once('/')
      .ok_or_else(|| -> Err { format!("missing /tag in {:?}", token).into() })?;
    let word = match word_str {
      "*" => ANY,
      "STOP" => STOP,
      w => words.intern(w) as i32,
    };
    let tag = match tag_str {
      "*" => ANY,
      "STOP" => STOP,
      t => self
        .binner
        .bin_of_name(t)
        .ok_or_else(|| -> Err { format!("unknown tag bin {:?}", t).into() })?,
    };
    Ok(IntTaggedWord::new(word, tag))
  }

  fn read_model_line(
    &mut self,
    line: &str,
    doing_stop: bool,
    words: &mut Index,
  ) -> Result<(), Err> {
    let s = skip_spaces(line);
    let (head_tok, s) = parse_quoted(s)?;
    let s = skip_spaces(s);
    let ((), s) = parse_arrow(s)?;
    let s = skip_spaces(s);
    let (arg_tok, s) = parse_quoted(s)?;

    let mut fields = s.split_whitespace();
    let dir = fields
      .next()
      .ok_or_else(|| -> Err { "missing direction".into() })?;
    let left_headed = match dir {
      "left" => true,
      "right" => false,
      other => return Err(format!("bad direction {:?}", other).into()),
    };
    let distance: i16 = fields
      .next()
      .ok_or_else(|| -> Err { "missing distance".into() })?
      .parse()?;
    let count: f64 = fields
      .next()
      .ok_or_else(|| -> Err { "missing count".into() })?
      .parse()?;
    if fields.next().is_some() {
      return Err("trailing junk after count".into());
    }

    let head = self.parse_tagged_word(&head_tok, words)?;
    let arg = self.parse_tagged_word(&arg_tok, words)?;
    // rows in the file are already tag-binned and distance-bucketed, so they
    // feed the expansion helpers directly
    let dep = IntDependency::new(head, arg, left_headed, distance);
    if doing_stop {
      self.expand_stop(&dep, distance, count, false);
    } else {
      self.expand_arg(&dep, distance, count);
    }
    Ok(())
  }
}

impl DependencyScorer for MleDependencyGrammar {
  fn score(&self, dep: &IntDependency) -> f64 {
    let binned = IntDependency::new(
      IntTaggedWord::new(dep.head.word, self.binner.bin(dep.head.tag)),
      IntTaggedWord::new(dep.arg.word, self.binner.bin(dep.arg.tag)),
      dep.left_headed,
      dep.distance,
    );
    self.score_tb(&binned)
  }

  fn score_binned(&self, dep: &IntDependency) -> f64 {
    self.score_tb(dep)
  }

  fn tag_bin(&self, tag: i32) -> i32 {
    self.binner.bin(tag)
  }

  fn num_tag_bins(&self) -> usize {
    self.binner.num_bins()
  }

  fn distance_bin(&self, distance: i16) -> i16 {
    MleDependencyGrammar::distance_bin(self, distance)
  }

  fn num_distance_bins(&self) -> usize {
    MleDependencyGrammar::num_distance_bins(self)
  }
}

/// Linear combination of two dependency grammars, for backing a specialized
/// grammar off to a general one. The first grammar's weight grows with how
/// much history it has for the dependency's head context:
/// `alpha = (count + 1) / (count + secondary_weight)`.
///
/// Both grammars must share the primary's tag projection; tag binning
/// delegates to the primary to enforce that.
#[derive(Debug)]
pub struct CombinedDependencyGrammar {
  pub primary: MleDependencyGrammar,
  pub secondary: MleDependencyGrammar,
  pub secondary_weight: f64,
}

impl CombinedDependencyGrammar {
  pub fn new(
    primary: MleDependencyGrammar,
    secondary: MleDependencyGrammar,
    secondary_weight: f64,
  ) -> Self {
    Self {
      primary,
      secondary,
      secondary_weight,
    }
  }

  pub fn alpha(&self, dep: &IntDependency) -> f64 {
    let count = self.primary.count_history(dep);
    (count + 1.0) / (count + self.secondary_weight)
  }
}

impl DependencyScorer for CombinedDependencyGrammar {
  fn score(&self, dep: &IntDependency) -> f64 {
    let alpha = self.alpha(dep);
    let s1 = self.primary.score(dep);
    let s2 = self.secondary.score(dep);
    log_add(alpha.ln() + s1, (1.0 - alpha).ln() + s2)
  }

  fn score_binned(&self, dep: &IntDependency) -> f64 {
    let count = self.primary.count_history_tb(dep);
    let alpha = (count + 1.0) / (count + self.secondary_weight);
    log_add(
      alpha.ln() + self.primary.score_tb(dep),
      (1.0 - alpha).ln() + self.secondary.score_tb(dep),
    )
  }

  fn tag_bin(&self, tag: i32) -> i32 {
    self.primary.tag_bin(tag)
  }

  fn num_tag_bins(&self) -> usize {
    self.primary.num_tag_bins()
  }

  fn distance_bin(&self, distance: i16) -> i16 {
    self.primary.distance_bin(distance)
  }

  fn num_distance_bins(&self) -> usize {
    self.primary.num_distance_bins()
  }
}

/// Chooses the head child of a binary node. Head-finding rules are treebank
/// business; the core only needs this one decision.
pub trait HeadFinder {
  /// 0 if the left child carries the head, 1 for the right.
  fn head_child(&self, parent: &str, left: &str, right: &str) -> usize;
}

/// Heads always percolate from the left child.
#[derive(Debug, Default)]
pub struct LeftHeadFinder;

impl HeadFinder for LeftHeadFinder {
  fn head_child(&self, _parent: &str, _left: &str, _right: &str) -> usize {
    0
  }
}

/// Heads always percolate from the right child.
#[derive(Debug, Default)]
pub struct RightHeadFinder;

impl HeadFinder for RightHeadFinder {
  fn head_child(&self, _parent: &str, _left: &str, _right: &str) -> usize {
    1
  }
}

/// The dependency set implied by a binarized tree: percolate heads upward,
/// emitting one argument dependency per binary node plus the STOP events on
/// both sides of each argument. Dependencies come out in the full tag space.
pub fn tree_to_dependencies(
  tree: &SynTree<String, String>,
  words: &Index,
  tags: &Index,
  head_finder: &dyn HeadFinder,
) -> Result<Vec<IntDependency>, Err> {
  let mut deps = Vec::new();
  let loc = tree.span().0;
  dependency_helper(tree, &mut deps, loc, words, tags, head_finder)?;
  Ok(deps)
}

struct HeadInfo {
  end: usize,
  head_pos: usize,
  word: i32,
  tag: i32,
}

fn dependency_helper(
  tree: &SynTree<String, String>,
  deps: &mut Vec<IntDependency>,
  loc: usize,
  words: &Index,
  tags: &Index,
  hf: &dyn HeadFinder,
) -> Result<HeadInfo, Err> {
  let (cons, children) = tree
    .get_branch()
    .ok_or_else(|| -> Err { "bare leaf outside a preterminal".into() })?;

  // preterminal: tag over a single word
  if children.len() == 1 && children[0].is_leaf() {
    let word_str = &children[0].get_leaf().unwrap().value;
    let word = words
      .id_of(word_str)
      .ok_or_else(|| -> Err { format!("word {:?} not in index", word_str).into() })? as i32;
    let tag = tags
      .id_of(&cons.value)
      .ok_or_else(|| -> Err { format!("tag {:?} not in index", cons.value).into() })?
      as i32;
    return Ok(HeadInfo {
      end: loc + 1,
      head_pos: loc,
      word,
      tag,
    });
  }

  if children.len() == 1 {
    return dependency_helper(&children[0], deps, loc, words, tags, hf);
  }
  if children.len() != 2 {
    return Err(format!("non-binarized node with {} children", children.len()).into());
  }

  let left = dependency_helper(&children[0], deps, loc, words, tags, hf)?;
  let split = left.end;
  let right = dependency_helper(&children[1], deps, split, words, tags, hf)?;
  let end = right.end;

  let left_label = branch_label(&children[0]);
  let right_label = branch_label(&children[1]);
  let left_headed = hf.head_child(&cons.value, left_label, right_label) == 0;

  let (head, arg) = if left_headed {
    (&left, &right)
  } else {
    (&right, &left)
  };

  let distance = if left_headed {
    (split - head.head_pos - 1) as i16
  } else {
    (head.head_pos - split) as i16
  };
  deps.push(IntDependency::new(
    IntTaggedWord::new(head.word, head.tag),
    IntTaggedWord::new(arg.word, arg.tag),
    left_headed,
    distance,
  ));

  // the argument is now closed off on both sides
  let arg_pos = arg.head_pos;
  let stop_l_dist = if left_headed {
    (arg_pos - split) as i16
  } else {
    (arg_pos - loc) as i16
  };
  let stop_r_dist = if left_headed {
    (end - arg_pos - 1) as i16
  } else {
    (split - arg_pos - 1) as i16
  };
  let arg_itw = IntTaggedWord::new(arg.word, arg.tag);
  deps.push(IntDependency::new(
    arg_itw,
    IntTaggedWord::stop(),
    false,
    stop_l_dist,
  ));
  deps.push(IntDependency::new(
    arg_itw,
    IntTaggedWord::stop(),
    true,
    stop_r_dist,
  ));

  Ok(HeadInfo {
    end,
    head_pos: head.head_pos,
    word: head.word,
    tag: head.tag,
  })
}

fn branch_label(tree: &SynTree<String, String>) -> &str {
  tree
    .get_branch()
    .map(|(c, _)| c.value.as_str())
    .unwrap_or("")
}
