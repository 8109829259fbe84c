//! Reading and writing the rule text format.
//!
//! One rule per line: `"parent" -> "left" "right" score` for binary rules and
//! `"parent" -> "child" score` for unary rules, with `"` and `\` inside
//! symbols escaped by backslash. A blank line terminates a rule block; a
//! grammar file is a binary block followed by a unary block. Any malformed
//! line fails the whole read with a line-numbered error, so a partial grammar
//! is never usable.

use regex::Regex;

use crate::Err;
use crate::grammar::{BinaryGrammarBuilder, UnaryGrammarBuilder};
use crate::intern::Index;
use crate::rules::{BinaryRule, RuleDisplay, UnaryRule};

type ParseResult<'a, T> = Result<(T, &'a str), Err>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex at the start of the input, returning None otherwise
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> (Option<&'a str>, &'a str) {
  if let Some(m) = re.find(s) {
    if m.start() > 0 {
      return (None, s);
    }
    let (_, rest) = s.split_at(m.end());
    (Some(m.as_str()), rest)
  } else {
    (None, s)
  }
}

/// Consume a regex at the start of the input, failing if it doesn't match
fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  if let (Some(c), rest) = optional_re(re, s) {
    Ok((c, rest))
  } else {
    Err(format!("couldn't match {} at {:?}", re, s).into())
  }
}

pub(crate) fn skip_spaces(s: &str) -> &str {
  regex_static!(SPACES, r"[ \t]+");
  optional_re(&*SPACES, s).1
}

/// Parses a `"..."`-quoted symbol, undoing backslash escapes.
pub(crate) fn parse_quoted(s: &str) -> ParseResult<String> {
  regex_static!(QUOTED, r#""(?:[^"\\]|\\.)*""#);
  let (raw, rest) = needed_re(&*QUOTED, s).map_err(|e| -> Err {
    format!("quoted symbol: {}", e).into()
  })?;

  let inner = &raw[1..raw.len() - 1];
  let mut out = String::with_capacity(inner.len());
  let mut chars = inner.chars();
  while let Some(c) = chars.next() {
    if c == '\\' {
      match chars.next() {
        Some(esc) => out.push(esc),
        None => return Err("dangling escape in symbol".into()),
      }
    } else {
      out.push(c);
    }
  }
  Ok((out, rest))
}

pub(crate) fn parse_arrow(s: &str) -> ParseResult<()> {
  regex_static!(ARROW, "->");
  let (_, rest) = needed_re(&*ARROW, s).map_err(|e| -> Err {
    format!("rule arrow: {}", e).into()
  })?;
  Ok(((), rest))
}

fn parse_score(s: &str) -> ParseResult<f32> {
  regex_static!(SCORE, r"[+-]?(?:inf|[0-9]+(?:\.[0-9]*)?(?:[eE][+-]?[0-9]+)?)");
  let (raw, rest) = needed_re(&*SCORE, s).map_err(|e| -> Err {
    format!("rule score: {}", e).into()
  })?;
  let score = raw.parse::<f32>().map_err(|e| -> Err {
    format!("rule score {:?}: {}", raw, e).into()
  })?;
  Ok((score, rest))
}

enum RuleLine {
  Binary(String, String, String, f32),
  Unary(String, String, f32),
}

/// A rule line is `"parent" -> "child" ["child2"] score`.
fn parse_rule_line(line: &str) -> Result<RuleLine, Err> {
  let s = skip_spaces(line);
  let (parent, s) = parse_quoted(s)?;
  let s = skip_spaces(s);
  let ((), s) = parse_arrow(s)?;
  let s = skip_spaces(s);
  let (first, s) = parse_quoted(s)?;
  let s = skip_spaces(s);

  let (second, s) = if s.starts_with('"') {
    let (second, s) = parse_quoted(s)?;
    (Some(second), skip_spaces(s))
  } else {
    (None, s)
  };

  let (score, s) = parse_score(s)?;
  if !skip_spaces(s).is_empty() {
    return Err(format!("trailing junk after rule: {:?}", s).into());
  }

  Ok(match second {
    Some(second) => RuleLine::Binary(parent, first, second, score),
    None => RuleLine::Unary(parent, first, score),
  })
}

/// Reads a grammar file: a block of binary rules, a blank line, then a block
/// of unary rules. Returns the state inventory and both builders; the caller
/// must `compile()` them before parsing (derived indexes are never stored in
/// the text format).
pub fn read_grammar(text: &str) -> Result<(Index, BinaryGrammarBuilder, UnaryGrammarBuilder), Err> {
  let mut states = Index::new();
  let mut binary = BinaryGrammarBuilder::new();
  let mut unary = UnaryGrammarBuilder::new();

  let mut in_unary_block = false;
  for (num, line) in text.lines().enumerate() {
    if line.trim().is_empty() {
      if in_unary_block {
        break;
      }
      in_unary_block = true;
      continue;
    }

    let parsed =
      parse_rule_line(line).map_err(|e| -> Err { format!("line {}: {}", num + 1, e).into() })?;

    match (parsed, in_unary_block) {
      (RuleLine::Binary(p, l, r, score), false) => {
        let rule = BinaryRule::new(
          states.intern(&p),
          states.intern(&l),
          states.intern(&r),
          score,
        );
        binary.add_rule(rule);
      }
      (RuleLine::Unary(p, c, score), true) => {
        let rule = UnaryRule::new(states.intern(&p), states.intern(&c), score);
        unary.add_rule(rule);
      }
      (RuleLine::Binary(..), true) => {
        return Err(format!("line {}: binary rule in unary block", num + 1).into());
      }
      (RuleLine::Unary(..), false) => {
        return Err(format!("line {}: unary rule in binary block", num + 1).into());
      }
    }
  }

  Ok((states, binary, unary))
}

/// Writes a grammar in the same format `read_grammar` accepts.
pub fn write_grammar(
  states: &Index,
  binary: &crate::grammar::BinaryGrammar,
  unary: &crate::grammar::UnaryGrammar,
) -> String {
  let disp = RuleDisplay { states };
  let mut out = String::new();
  for rule in binary.all_rules() {
    out.push_str(&disp.binary(rule));
    out.push('\n');
  }
  out.push('\n');
  for rule in unary.all_rules() {
    out.push_str(&disp.unary(rule));
    out.push('\n');
  }
  out
}
