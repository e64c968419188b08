use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;

/// Samples a single value from N(0, 1) using the Box-Muller transform.
fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    // Both uniforms in (0, 1] to avoid log(0).
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = 1.0 - rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// He initialization: `len` samples from N(0, sqrt(2 / fan_in)).
///
/// Used for every weighted layer; the network is always followed by ReLU-like
/// nonlinearities in the shipped presets.
pub fn he_normal(len: usize, fan_in: usize, rng: &mut StdRng) -> Vec<f64> {
    let std_dev = (2.0 / fan_in.max(1) as f64).sqrt();
    (0..len).map(|_| sample_standard_normal(rng) * std_dev).collect()
}

/// Small uniform biases in [-0.1, 0.1).
pub fn small_uniform(len: usize, rng: &mut StdRng) -> Vec<f64> {
    (0..len).map(|_| rng.gen::<f64>() * 0.2 - 0.1).collect()
}
