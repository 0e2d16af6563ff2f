use rand::distributions::WeightedIndex;
use rand::prelude::*;

/// Draw one index proportionally to `weights`. `WeightedIndex` divides
/// by the running total, which is exactly the renormalization the cache
/// needs after floating-point drift. Returns `None` when the weights
/// carry no mass (all zero, negative, or non-finite entries).
pub fn weighted_choice<R: Rng + ?Sized>(weights: &[f32], rng: &mut R) -> Option<usize> {
    if weights.iter().any(|w| !w.is_finite()) {
        return None;
    }
    let dist = WeightedIndex::new(weights).ok()?;
    Some(dist.sample(rng))
}
