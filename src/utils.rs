use std::error::Error;

/// Boxed static error type
pub type Err = Box<dyn Error + 'static>;

/// Adds two log-space values: `ln(e^a + e^b)`, stable for widely separated
/// magnitudes. Either argument may be `-inf`.
pub fn log_add(a: f64, b: f64) -> f64 {
  let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
  if hi == f64::NEG_INFINITY {
    f64::NEG_INFINITY
  } else {
    hi + (lo - hi).exp().ln_1p()
  }
}

/// Relative-tolerance score comparison: is `x` meaningfully better than `y`?
/// Plain `>` misfires once scores come out of long float sums.
pub fn better(x: f64, y: f64) -> bool {
  (x - y) / (x.abs() + y.abs() + 1e-100) > 1e-10
}

/// Do two derivation scores count as the same score during tree recovery?
pub fn matches(x: f64, y: f64) -> bool {
  (x - y).abs() <= 1e-5
}
