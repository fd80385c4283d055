//! Klein-Nishina angular sampling via the Kahn rejection algorithm.
//!
//! Draws Compton scattering angles from the Klein-Nishina distribution
//! without numerically inverting the CDF. The generator is a seeded
//! counter-based ChaCha stream so draws are reproducible across hosts
//! and can be partitioned per primary ray for parallel runs.
//!
//! All energies in keV, angles in radian.

use crate::compton::scattered_energy_from_xi;
use colli_types::constants::ELECTRON_MASS_KEV;
use colli_types::units::{KeV, Radian};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// One sampled Compton event.
///
/// Energy conservation E' + T = E₀ holds to floating-point precision
/// for every draw: T is defined as the difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComptonSample {
    /// Polar scattering angle [radian, 0..π].
    pub theta_rad: Radian,
    /// Azimuthal angle [radian, 0..2π), isotropic.
    pub phi_rad: Radian,
    /// Scattered photon energy [keV].
    pub scattered_energy_kev: KeV,
    /// Recoil electron energy E₀ − E' [keV].
    pub recoil_energy_kev: KeV,
}

/// Kahn rejection sampler over the Klein-Nishina distribution.
pub struct KleinNishinaSampler {
    rng: ChaCha8Rng,
}

impl KleinNishinaSampler {
    /// Sampler seeded for the simulation-global stream.
    pub fn new(seed: u64) -> Self {
        KleinNishinaSampler {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Sampler on the deterministic sub-stream of one primary ray, so
    /// parallel execution order cannot change the draw sequence.
    pub fn for_ray(seed: u64, ray_index: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(ray_index);
        KleinNishinaSampler { rng }
    }

    /// Draw U(0,1).
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Sample one Compton event at the given incident energy.
    ///
    /// Kahn branches:
    /// - with probability (1+2α)/(9+2α): ξ = 1 + 2αr₂,
    ///   accept when r₃ ≤ 4(1/ξ − 1/ξ²)
    /// - otherwise: ξ = (1+2α)/(1+2αr₂),
    ///   accept when r₃ ≤ ½(cos²θ + 1/ξ)
    ///
    /// ξ = E₀/E' in both branches.
    pub fn sample(&mut self, energy_kev: KeV) -> ComptonSample {
        let alpha = energy_kev / ELECTRON_MASS_KEV;
        let branch_threshold = (1.0 + 2.0 * alpha) / (9.0 + 2.0 * alpha);

        let xi = loop {
            let r1 = self.rng.gen::<f64>();
            let r2 = self.rng.gen::<f64>();
            let r3 = self.rng.gen::<f64>();

            if r1 <= branch_threshold {
                let xi = 1.0 + 2.0 * alpha * r2;
                if r3 <= 4.0 * (1.0 / xi - 1.0 / (xi * xi)) {
                    break xi;
                }
            } else {
                let xi = (1.0 + 2.0 * alpha) / (1.0 + 2.0 * alpha * r2);
                let cos_theta = 1.0 - (xi - 1.0) / alpha;
                if r3 <= 0.5 * (cos_theta * cos_theta + 1.0 / xi) {
                    break xi;
                }
            }
        };

        let cos_theta = (1.0 - (xi - 1.0) / alpha).clamp(-1.0, 1.0);
        let scattered = scattered_energy_from_xi(energy_kev, xi);
        ComptonSample {
            theta_rad: cos_theta.acos(),
            phi_rad: 2.0 * PI * self.rng.gen::<f64>(),
            scattered_energy_kev: scattered,
            recoil_energy_kev: energy_kev - scattered,
        }
    }

    /// Sample `n` events; used for statistical validation.
    pub fn sample_batch(&mut self, energy_kev: KeV, n: usize) -> Vec<ComptonSample> {
        (0..n).map(|_| self.sample(energy_kev)).collect()
    }
}
