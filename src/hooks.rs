//! Chart items for the Eisner–Satta combined parse: lexicalized edges, the
//! partially-completed hooks that await material on one side, and the
//! `HookChart` index structures that let edges and hooks find each other.
//!
//! Keys are plain value tuples with derived hashing; the reference-interned
//! index objects of the classic formulation buy nothing here.

use rustc_hash::{FxHashMap, FxHashSet};

static NO_EDGES: &[Edge] = &[];
static NO_HOOKS: &[Hook] = &[];

/// A completed lexicalized constituent: `state` spanning `[start, end)`,
/// headed by the word at `head` carrying `tag`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
  pub state: u32,
  pub start: usize,
  pub end: usize,
  pub head: usize,
  pub tag: u32,
}

impl Edge {
  pub fn new(state: u32, start: usize, end: usize, head: usize, tag: u32) -> Self {
    assert!(
      head >= start && head < end,
      "edge head must lie inside its span"
    );
    Self {
      state,
      start,
      end,
      head,
      tag,
    }
  }
}

/// A `state` waiting for a `sub_state` constituent on one side. The span is
/// the material already present; the head lies strictly outside it, on the
/// side the missing constituent will come from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Hook {
  pub state: u32,
  pub sub_state: u32,
  pub start: usize,
  pub end: usize,
  pub head: usize,
  pub tag: u32,
}

impl Hook {
  pub fn new(state: u32, sub_state: u32, start: usize, end: usize, head: usize, tag: u32) -> Self {
    assert!(
      head < start || head >= end,
      "hook head must lie outside its span"
    );
    Self {
      state,
      sub_state,
      start,
      end,
      head,
      tag,
    }
  }

  /// Awaits its head-side constituent to the left.
  pub fn is_pre_hook(&self) -> bool {
    self.head < self.start
  }

  /// Awaits its head-side constituent to the right.
  pub fn is_post_hook(&self) -> bool {
    self.head >= self.end
  }
}

type ChartKey = (u32, usize, usize, u32); // (state, boundary, head, tag)

/// Index structures over discovered edges and hooks, keyed so each side can
/// enumerate exactly the items it can combine with.
#[derive(Debug, Default)]
pub struct HookChart {
  edges_by_start: FxHashMap<ChartKey, Vec<Edge>>,
  edges_by_end: FxHashMap<ChartKey, Vec<Edge>>,
  pre_hooks_by_start: FxHashMap<ChartKey, Vec<Hook>>,
  post_hooks_by_end: FxHashMap<ChartKey, Vec<Hook>>,
  built_l: FxHashSet<ChartKey>,
  built_r: FxHashSet<ChartKey>,
  real_by_start: FxHashMap<(u32, usize), Vec<Edge>>,
  real_by_end: FxHashMap<(u32, usize), Vec<Edge>>,
}

impl HookChart {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn add_edge(&mut self, edge: Edge) {
    self
      .edges_by_start
      .entry((edge.state, edge.start, edge.head, edge.tag))
      .or_default()
      .push(edge);
    self
      .edges_by_end
      .entry((edge.state, edge.end, edge.head, edge.tag))
      .or_default()
      .push(edge);
  }

  pub fn add_hook(&mut self, hook: Hook) {
    if hook.is_pre_hook() {
      self
        .pre_hooks_by_start
        .entry((hook.sub_state, hook.start, hook.head, hook.tag))
        .or_default()
        .push(hook);
    } else {
      self
        .post_hooks_by_end
        .entry((hook.sub_state, hook.end, hook.head, hook.tag))
        .or_default()
        .push(hook);
    }
  }

  /// Record that a constituent with this signature exists at each boundary,
  /// for the `is_built` existence checks.
  pub fn register_edge_indexes(&mut self, edge: &Edge) {
    self
      .built_l
      .insert((edge.state, edge.start, edge.head, edge.tag));
    self
      .built_r
      .insert((edge.state, edge.end, edge.head, edge.tag));
  }

  /// Has a (state, head, tag) constituent been built starting at `start`?
  pub fn is_built_l(&self, state: u32, start: usize, head: usize, tag: u32) -> bool {
    self.built_l.contains(&(state, start, head, tag))
  }

  /// Has a (state, head, tag) constituent been built ending at `end`?
  pub fn is_built_r(&self, state: u32, end: usize, head: usize, tag: u32) -> bool {
    self.built_r.contains(&(state, end, head, tag))
  }

  /// Real (non-synthetic) edges eligible to seed hooks, by left boundary.
  pub fn register_real_edge(&mut self, edge: Edge) {
    self
      .real_by_start
      .entry((edge.state, edge.start))
      .or_default()
      .push(edge);
    self
      .real_by_end
      .entry((edge.state, edge.end))
      .or_default()
      .push(edge);
  }

  pub fn real_edges_with_start(&self, state: u32, start: usize) -> &[Edge] {
    self
      .real_by_start
      .get(&(state, start))
      .map_or(NO_EDGES, Vec::as_slice)
  }

  pub fn real_edges_with_end(&self, state: u32, end: usize) -> &[Edge] {
    self
      .real_by_end
      .get(&(state, end))
      .map_or(NO_EDGES, Vec::as_slice)
  }

  /// Hooks this completed edge can fill from the left (the hook's missing
  /// constituent ends where the hook starts).
  pub fn pre_hooks_for(&self, edge: &Edge) -> &[Hook] {
    self
      .pre_hooks_by_start
      .get(&(edge.state, edge.end, edge.head, edge.tag))
      .map_or(NO_HOOKS, Vec::as_slice)
  }

  /// Hooks this completed edge can fill from the right.
  pub fn post_hooks_for(&self, edge: &Edge) -> &[Hook] {
    self
      .post_hooks_by_end
      .get(&(edge.state, edge.start, edge.head, edge.tag))
      .map_or(NO_HOOKS, Vec::as_slice)
  }

  /// Edges that can complete this hook.
  pub fn edges_for(&self, hook: &Hook) -> &[Edge] {
    if hook.is_pre_hook() {
      self
        .edges_by_end
        .get(&(hook.sub_state, hook.start, hook.head, hook.tag))
        .map_or(NO_EDGES, Vec::as_slice)
    } else {
      self
        .edges_by_start
        .get(&(hook.sub_state, hook.end, hook.head, hook.tag))
        .map_or(NO_EDGES, Vec::as_slice)
    }
  }
}
