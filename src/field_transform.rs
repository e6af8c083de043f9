//! Field transform — maps a chunk's polar coordinates `(theta, t)` to a
//! directional bias vector using the PCA basis, then composes the
//! direction-biased query vector `v'` the drift pool is retrieved around.

use crate::numeric::{gaussian_vector, lerp, vec_add, vec_normalize, vec_scale, Mulberry32};
use crate::pca::PcaBasis;

/// `bias(theta, t)`: `d = cos(theta)*u1 + sin(theta)*u2`, normalized and
/// scaled by `alpha(t) = lerp(0, 0.35, t)`.
pub fn bias(basis: &PcaBasis, theta: f64, t: f64) -> Vec<f32> {
    let (u1, u2) = basis.first_two();
    let ct = theta.cos() as f32;
    let st = theta.sin() as f32;
    let d = vec_add(&vec_scale(u1, ct), &vec_scale(u2, st));
    let d = vec_normalize(&d);
    let alpha = lerp(0.0, 0.35, t) as f32;
    vec_scale(&d, alpha)
}

/// `queryVector(v, theta, t, rng)`: `sigma = lerp(0.05, 0.35, t)`,
/// `eps = gaussianVector(dim(v), rng)`, returns
/// `normalize(v + bias(theta, t) + sigma*eps)`.
pub fn query_vector(
    basis: &PcaBasis,
    v: &[f32],
    theta: f64,
    t: f64,
    rng: &mut Mulberry32,
) -> Vec<f32> {
    let b = bias(basis, theta, t);
    let sigma = lerp(0.05, 0.35, t) as f32;
    let eps = gaussian_vector(v.len(), rng);
    let noisy = vec_add(&vec_add(v, &b), &vec_scale(&eps, sigma));
    vec_normalize(&noisy)
}
