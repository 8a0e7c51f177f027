//! Synthetic telemetry: a deterministic CSV of a low-orbit vehicle's
//! altitude, velocity, acceleration, temperature and bus voltage, used as a
//! realistic compressible input for the pipeline.

use std::fmt::Write;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

pub const HEADER: &str = "time,altitude,velocity,accel_x,accel_y,accel_z,temperature,voltage";

const NOISE_SIGMA: f64 = 0.02;

/// Generate `rows` samples. The same seed always yields the same bytes.
pub fn generate(rows: usize, seed: u64) -> Bytes {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut noise = move || rng.sample::<f64, _>(StandardNormal) * NOISE_SIGMA;

    let mut altitude = 400_000.0_f64;
    let mut velocity = 7_777.0_f64;
    let mut temperature = 22.0_f64;
    let mut voltage = 3.7_f64;

    let mut out = String::with_capacity(HEADER.len() + 1 + rows * 80);
    out.push_str(HEADER);
    out.push('\n');

    for i in 0..rows {
        altitude += velocity * 0.01 + noise();
        velocity += noise();
        temperature += noise();
        voltage += noise() * 0.001;

        let t = i as f64 * 0.01;
        let ax = t.sin() + noise();
        let ay = t.cos() + noise();
        let az = -9.81 + noise();

        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{i},{altitude:.3},{velocity:.4},{ax:.5},{ay:.5},{az:.5},{temperature:.4},{voltage:.5}"
        );
    }

    Bytes::from(out)
}
