// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Compton Kernel
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Compton scattering kinematics and Klein-Nishina cross-sections.
//!
//! All energies in keV, angles in radian, cross-sections in cm².

use colli_types::constants::{
    CLASSICAL_ELECTRON_RADIUS_CM, COMPTON_WAVELENGTH_ANGSTROM, ELECTRON_MASS_KEV,
    THOMSON_CROSS_SECTION_CM2,
};
use colli_types::units::{KeV, Radian};
use ndarray::Array1;
use std::f64::consts::PI;

/// Below this α the closed form loses precision; Thomson applies.
const THOMSON_ALPHA_LIMIT: f64 = 1e-6;

/// Scattered photon energy E' = E₀ / [1 + α(1 − cos θ)] [keV].
pub fn scattered_energy(e0_kev: KeV, theta_rad: Radian) -> KeV {
    let alpha = e0_kev / ELECTRON_MASS_KEV;
    e0_kev / (1.0 + alpha * (1.0 - theta_rad.cos()))
}

/// Recoil electron kinetic energy T = E₀ − E' [keV].
pub fn recoil_energy(e0_kev: KeV, theta_rad: Radian) -> KeV {
    e0_kev - scattered_energy(e0_kev, theta_rad)
}

/// Scattered energy from the inverse energy ratio ξ = E₀/E' used by
/// the Kahn sampler [keV].
pub fn scattered_energy_from_xi(e0_kev: KeV, xi: f64) -> KeV {
    e0_kev / xi
}

/// Compton edge: (E'_min, T_max) at θ = 180° [keV].
pub fn compton_edge(e0_kev: KeV) -> (KeV, KeV) {
    let alpha = e0_kev / ELECTRON_MASS_KEV;
    let e_min = e0_kev / (1.0 + 2.0 * alpha);
    let t_max = e0_kev * 2.0 * alpha / (1.0 + 2.0 * alpha);
    (e_min, t_max)
}

/// Compton wavelength shift Δλ = λ_C (1 − cos θ) [Angstrom].
pub fn wavelength_shift(theta_rad: Radian) -> f64 {
    COMPTON_WAVELENGTH_ANGSTROM * (1.0 - theta_rad.cos())
}

/// Klein-Nishina differential cross-section [cm²/sr per electron]:
///
/// dσ/dΩ = (r₀²/2)(E'/E₀)² (E'/E₀ + E₀/E' − sin²θ)
pub fn klein_nishina_differential(e0_kev: KeV, theta_rad: Radian) -> f64 {
    let r0 = CLASSICAL_ELECTRON_RADIUS_CM;
    let ratio = scattered_energy(e0_kev, theta_rad) / e0_kev;
    let sin2 = theta_rad.sin().powi(2);
    (r0 * r0 / 2.0) * ratio * ratio * (ratio + 1.0 / ratio - sin2)
}

/// Total Klein-Nishina cross-section [cm² per electron], closed form:
///
/// σ = 2πr₀² { (1+α)/α² [2(1+α)/(1+2α) − ln(1+2α)/α]
///             + ln(1+2α)/(2α) − (1+3α)/(1+2α)² }
///
/// Reproduces the Thomson cross-section as α → 0.
pub fn total_cross_section(e0_kev: KeV) -> f64 {
    let r0 = CLASSICAL_ELECTRON_RADIUS_CM;
    let a = e0_kev / ELECTRON_MASS_KEV;
    if a < THOMSON_ALPHA_LIMIT {
        return THOMSON_CROSS_SECTION_CM2;
    }
    let ln_term = (1.0 + 2.0 * a).ln();
    let term1 = ((1.0 + a) / (a * a)) * (2.0 * (1.0 + a) / (1.0 + 2.0 * a) - ln_term / a);
    let term2 = ln_term / (2.0 * a);
    let term3 = (1.0 + 3.0 * a) / (1.0 + 2.0 * a).powi(2);
    2.0 * PI * r0 * r0 * (term1 + term2 - term3)
}

/// Klein-Nishina angular distribution over [0, π].
#[derive(Debug, Clone, PartialEq)]
pub struct KleinNishinaDistribution {
    pub angles_rad: Vec<f64>,
    pub dsigma_domega: Vec<f64>,
    pub scattered_energies_kev: Vec<f64>,
}

/// dσ/dΩ and E'(θ) over `angular_bins + 1` angles in [0, π].
pub fn klein_nishina_distribution(e0_kev: KeV, angular_bins: usize) -> KleinNishinaDistribution {
    let n = angular_bins + 1;
    let angles: Vec<f64> = (0..n)
        .map(|i| PI * i as f64 / angular_bins.max(1) as f64)
        .collect();
    let dsigma = angles
        .iter()
        .map(|&t| klein_nishina_differential(e0_kev, t))
        .collect();
    let energies = angles.iter().map(|&t| scattered_energy(e0_kev, t)).collect();
    KleinNishinaDistribution {
        angles_rad: angles,
        dsigma_domega: dsigma,
        scattered_energies_kev: energies,
    }
}

/// KN-weighted scattered photon spectrum, normalized to unit sum.
#[derive(Debug, Clone, PartialEq)]
pub struct ComptonSpectrum {
    pub energy_bins_kev: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Spectrum of scattered photon energies between the Compton edge and
/// E₀, weighted by the differential cross-section at the angle that
/// produces each energy.
pub fn scattered_energy_spectrum(e0_kev: KeV, num_bins: usize) -> ComptonSpectrum {
    let (e_min, _) = compton_edge(e0_kev);
    let alpha = e0_kev / ELECTRON_MASS_KEV;
    let n = num_bins.max(2);

    let bins: Vec<f64> = (0..n)
        .map(|i| e_min + (e0_kev - e_min) * i as f64 / (n - 1) as f64)
        .collect();

    let mut weights: Vec<f64> = bins
        .iter()
        .map(|&e| {
            // Invert E'(θ) for the angle producing this energy
            let cos_theta = (1.0 - (e0_kev / e - 1.0) / alpha).clamp(-1.0, 1.0);
            klein_nishina_differential(e0_kev, cos_theta.acos())
        })
        .collect();

    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in &mut weights {
            *w /= total;
        }
    }
    ComptonSpectrum {
        energy_bins_kev: bins,
        weights,
    }
}

/// E', T and Δλ tabulated against the scattering angle.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleEnergyMap {
    pub angles_rad: Vec<f64>,
    pub scattered_energies_kev: Vec<f64>,
    pub recoil_energies_kev: Vec<f64>,
    pub wavelength_shifts_angstrom: Vec<f64>,
}

pub fn angle_energy_map(e0_kev: KeV, angular_steps: usize) -> AngleEnergyMap {
    let n = angular_steps.max(2);
    let angles: Vec<f64> = (0..n).map(|i| PI * i as f64 / (n - 1) as f64).collect();
    AngleEnergyMap {
        scattered_energies_kev: angles.iter().map(|&t| scattered_energy(e0_kev, t)).collect(),
        recoil_energies_kev: angles.iter().map(|&t| recoil_energy(e0_kev, t)).collect(),
        wavelength_shifts_angstrom: angles.iter().map(|&t| wavelength_shift(t)).collect(),
        angles_rad: angles,
    }
}

/// Total KN cross-section over a log-spaced energy grid.
pub fn cross_section_vs_energy(min_kev: KeV, max_kev: KeV, steps: usize) -> (Array1<f64>, Array1<f64>) {
    let n = steps.max(2);
    let energies = Array1::from_shape_fn(n, |i| {
        let t = i as f64 / (n - 1) as f64;
        (min_kev.ln() + t * (max_kev.ln() - min_kev.ln())).exp()
    });
    let sigmas = energies.mapv(total_cross_section);
    (energies, sigmas)
}
