//! Mixture sampler — draws `count` items from the three tagged pools using
//! radius-dependent mixture weights, fixed-order fallback, and a
//! cross-chunk deduplication set.

use std::collections::HashSet;

use serde::Serialize;

use crate::numeric::{hash32, fold_i32, Mulberry32};
use crate::store::{CandidatePool, PoolItem, Source};

/// Normalized mixture weights for a given temperature `t`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weights {
    pub sim: f64,
    pub drift: f64,
    pub rand: f64,
}

impl Weights {
    /// `w_sim = (1-t)^2`, `w_drift = 2t(1-t)`, `w_rand = t^2`, normalized by
    /// `W = w_sim + w_drift + w_rand` (treated as 1 if `W == 0`, which in
    /// practice cannot happen since the three terms sum to 1 already for any
    /// real `t`; the zero case is handled defensively anyway).
    pub fn for_temperature(t: f64) -> Self {
        let w_sim = (1.0 - t).powi(2);
        let w_drift = 2.0 * t * (1.0 - t);
        let w_rand = t * t;
        let w = w_sim + w_drift + w_rand;
        let w = if w == 0.0 { 1.0 } else { w };
        Weights {
            sim: w_sim / w,
            drift: w_drift / w,
            rand: w_rand / w,
        }
    }
}

/// Spatial-offset rotation mode. Single-chunk mode folds `hash32` over 2
/// arguments, multi-chunk mode over 4; this asymmetry is deliberate and
/// carried forward intact rather than unified.
pub enum OffsetMode {
    Single,
    Multi { chunk_index: usize, global_seed: u32 },
}

/// Computes the rotation offset for the tight/drift pools at chunk `(x, y)`:
///
/// - `r < 2` (single) / `r < 3` (multi): `hash32(x+100, y+100[, globalSeed,
///   chunkIndex]) mod 50` (single) or `mod 100` (multi).
/// - otherwise: `chunkIndex * 25` in multi-chunk mode, `0` in single-chunk.
pub fn spatial_offset(x: i32, y: i32, mode: &OffsetMode) -> usize {
    let r = (x as f64).hypot(y as f64);
    match mode {
        OffsetMode::Single => {
            if r < 2.0 {
                let h = hash32(&[fold_i32(x + 100), fold_i32(y + 100)]);
                (h % 50) as usize
            } else {
                0
            }
        }
        OffsetMode::Multi {
            chunk_index,
            global_seed,
        } => {
            if r < 3.0 {
                let h = hash32(&[
                    fold_i32(x + 100),
                    fold_i32(y + 100),
                    *global_seed,
                    *chunk_index as u32,
                ]);
                (h % 100) as usize
            } else {
                chunk_index * 25
            }
        }
    }
}

/// Result of one mixture-sampler pass: the picked items, in order.
#[derive(Debug, Clone)]
pub struct PickedItem {
    pub item: PoolItem,
    pub source: Source,
}

/// Primary pool choice for a single draw `u`, per the documented thresholds.
fn primary_choice(u: f64, w: &Weights) -> Source {
    if u < w.sim {
        Source::Sim
    } else if u < w.sim + w.drift {
        Source::Drift
    } else {
        Source::Rand
    }
}

/// Fixed fallback order when the primary pool is exhausted:
/// `sim -> [drift, rand]`, `drift -> [sim, rand]`, `rand -> [drift, sim]`.
fn fallback_order(primary: Source) -> [Source; 2] {
    match primary {
        Source::Sim => [Source::Drift, Source::Rand],
        Source::Drift => [Source::Sim, Source::Rand],
        Source::Rand => [Source::Drift, Source::Sim],
    }
}

/// One pool plus a cursor into its rotated traversal order, so repeated
/// "take the next unused element" calls advance monotonically without
/// rescanning from the start each time.
struct Cursor<'a> {
    pool: &'a CandidatePool,
    order: Vec<usize>,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(pool: &'a CandidatePool, offset: usize) -> Self {
        Self {
            order: pool.rotated_order(offset),
            pool,
            pos: 0,
        }
    }

    /// Advances past `used` ids and returns the next unused item, if any.
    fn next_unused(&mut self, used: &HashSet<i32>) -> Option<&'a PoolItem> {
        while self.pos < self.order.len() {
            let idx = self.order[self.pos];
            self.pos += 1;
            let item = &self.pool.items[idx];
            if !used.contains(&item.id) {
                return Some(item);
            }
        }
        None
    }
}

/// Draws up to `count` items from `(sim, drift, rand)` using the mixture
/// weights for `t`, the spatial-offset rotation for `(x, y, mode)`, and the
/// chunk PRNG. `used` starts as the union of hard excludes and any
/// cross-chunk used set, and grows with every pick.
///
/// Terminates early (returning fewer than `count` items) once all three
/// pools are exhausted — never an error; the sampler cannot fail beyond
/// early termination.
#[allow(clippy::too_many_arguments)]
pub fn sample(
    sim: &CandidatePool,
    drift: &CandidatePool,
    rand: &CandidatePool,
    count: usize,
    weights: Weights,
    x: i32,
    y: i32,
    mode: &OffsetMode,
    rng: &mut Mulberry32,
    used: &mut HashSet<i32>,
) -> Vec<PickedItem> {
    let offset = spatial_offset(x, y, mode);
    // The random pool is never rotated.
    let mut sim_cursor = Cursor::new(sim, offset);
    let mut drift_cursor = Cursor::new(drift, offset);
    let mut rand_cursor = Cursor::new(rand, 0);

    let mut out = Vec::with_capacity(count);

    for _ in 0..count {
        let u = rng.next_f64();
        let primary = primary_choice(u, &weights);

        let mut picked: Option<(Source, &PoolItem)> = None;
        for candidate_source in std::iter::once(primary).chain(fallback_order(primary)) {
            let next = match candidate_source {
                Source::Sim => sim_cursor.next_unused(used),
                Source::Drift => drift_cursor.next_unused(used),
                Source::Rand => rand_cursor.next_unused(used),
            };
            if let Some(item) = next {
                picked = Some((candidate_source, item));
                break;
            }
        }

        match picked {
            Some((source, item)) => {
                used.insert(item.id);
                out.push(PickedItem {
                    item: item.clone(),
                    source,
                });
            }
            None => break, // all three pools exhausted
        }
    }

    out
}
