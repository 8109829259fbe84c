use criterion::{black_box, criterion_group, criterion_main, Criterion};

use treefactor::dependency::{
  IdentityProjection, IntDependency, MleDependencyGrammar, RightHeadFinder, TagBinner,
};
use treefactor::intern::{BOUNDARY_TAG, BOUNDARY_WORD, Index, IntTaggedWord};
use treefactor::lexicon::HashLexicon;
use treefactor::parse_grammar::read_grammar;
use treefactor::{LexParser, Options};

const GRAMMAR_SRC: &str = r#""GOAL" -> "S" ".$$." 0
"S" -> "NP" "VP" -0.2
"VP" -> "V" "NP" -0.8
"VP" -> "VP" "PP" -1.0
"NP" -> "NP" "PP" -1.4
"PP" -> "P" "NP" -0.3

"NP" -> "N" -0.4
"#;

fn build_parser(options: Options) -> LexParser {
  let (states, binary, unary) = read_grammar(GRAMMAR_SRC).unwrap();

  let mut tags = Index::new();
  let v_t = tags.intern("V");
  let n_t = tags.intern("N");
  let p_t = tags.intern("P");
  let b_t = tags.intern(BOUNDARY_TAG);

  let mut words = Index::new();
  let mut lex = HashLexicon::new();
  for (word, tag, score) in [
    ("they", n_t, -0.3),
    ("saw", v_t, -0.2),
    ("stars", n_t, -0.5),
    ("with", p_t, -0.1),
    ("telescopes", n_t, -0.6),
  ] {
    lex.add(words.intern(word), tag, score);
  }
  let b_w = words.intern(BOUNDARY_WORD);
  lex.add(b_w, b_t, 0.0);

  let binner = TagBinner::new(&tags, &IdentityProjection);
  let mut dg = MleDependencyGrammar::new(binner, true, true, true);
  let saw = words.id_of("saw").unwrap() as i32;
  let stars = words.id_of("stars").unwrap() as i32;
  let head = IntTaggedWord::new(saw, v_t as i32);
  let arg = IntTaggedWord::new(stars, n_t as i32);
  let root = IntTaggedWord::new(b_w as i32, b_t as i32);
  dg.add_dependency(IntDependency::new(head, arg, true, 0), 2.0);
  dg.add_dependency(IntDependency::new(arg, IntTaggedWord::stop(), false, 0), 1.0);
  dg.add_dependency(IntDependency::new(arg, IntTaggedWord::stop(), true, 0), 1.0);
  dg.add_dependency(IntDependency::new(head, IntTaggedWord::stop(), false, 0), 1.0);
  dg.add_dependency(IntDependency::new(head, IntTaggedWord::stop(), true, 1), 1.0);
  dg.add_dependency(IntDependency::new(root, head, false, 0), 1.0);

  let mut parser = LexParser::new(
    states,
    words,
    tags,
    binary,
    unary,
    Box::new(lex),
    Box::new(RightHeadFinder),
    "GOAL",
    options,
  );
  parser.set_dependency_grammar(Box::new(dg));
  parser
}

fn parse(parser: &LexParser, input: &[&str]) -> bool {
  let mut query = parser.parser_query();
  query.parse(input)
}

fn criterion_benchmark(c: &mut Criterion) {
  let pcfg_only = build_parser(Options {
    do_dep: false,
    ..Default::default()
  });
  let factored = build_parser(Options {
    use_fast_factored: true,
    num_to_find: 4,
    ..Default::default()
  });
  let input = "they saw stars with telescopes".split(' ').collect::<Vec<_>>();

  c.bench_function("parse pcfg", |b| {
    b.iter(|| parse(black_box(&pcfg_only), black_box(&input)))
  });

  c.bench_function("parse factored rescoring", |b| {
    b.iter(|| parse(black_box(&factored), black_box(&input)))
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
