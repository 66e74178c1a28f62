use minos_common::types::ScoringMode;

/// Fold per-case scoring rates into a subtask ratio.
///
/// - Minimum: the weakest case decides (callers guarantee a non-empty list)
/// - Multiple: product of all rates
/// - Summation: arithmetic mean
pub fn combine_ratios(mode: ScoringMode, ratios: &[f64]) -> f64 {
    match mode {
        ScoringMode::Minimum => ratios.iter().copied().fold(f64::INFINITY, f64::min),
        ScoringMode::Multiple => ratios.iter().product(),
        ScoringMode::Summation => ratios.iter().sum::<f64>() / ratios.len() as f64,
    }
}

/// `Math.min` semantics: NaN is contagious, unlike `f64::min`
pub fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}
