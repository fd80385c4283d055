// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Simulation Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Simulation request configuration and validation.

use crate::error::{ColliError, ColliResult};
use crate::units::{Degree, KeV, Mm};
use serde::{Deserialize, Serialize};

pub const MIN_RAY_COUNT: usize = 100;
pub const MAX_RAY_COUNT: usize = 10_000;

/// Multi-stage build-up composition method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildUpMethod {
    /// Sequential (Kalos-like) product of per-stage GP factors. Default
    /// whenever stages differ in material and τ.
    #[default]
    GpSequential,
    /// GP factor of the final dominant material at the total τ.
    /// Conservative fallback.
    GpLastMaterial,
    /// Sequential product of Taylor two-term factors.
    Taylor,
}

/// Compton scatter simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComptonConfig {
    pub enabled: bool,
    /// 1 = single scatter, 2 = double scatter.
    pub max_scatter_order: u8,
    /// Secondary photons below this energy are dropped [keV].
    #[serde(rename = "min_energy_cutoff_keV")]
    pub min_energy_cutoff_kev: KeV,
    /// Angular bins for the Klein-Nishina analysis products.
    pub angular_bins: usize,
    /// Step length for the in-layer interaction walk [mm].
    pub step_size_mm: Mm,
}

impl Default for ComptonConfig {
    fn default() -> Self {
        ComptonConfig {
            enabled: false,
            max_scatter_order: 1,
            min_energy_cutoff_kev: 10.0,
            angular_bins: 180,
            step_size_mm: 1.0,
        }
    }
}

/// Ray-tracing simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Photon energies [keV]. The first entry is the reference energy
    /// for the detector profile; the full list feeds the energy table.
    #[serde(rename = "energies_keV")]
    pub energies_kev: Vec<KeV>,
    pub ray_count: usize,
    pub include_buildup: bool,
    pub include_scatter: bool,
    /// Angular step between detector bins [degree].
    pub angular_resolution_deg: Degree,
    #[serde(default)]
    pub compton: ComptonConfig,
    #[serde(default)]
    pub buildup_method: BuildUpMethod,
    /// Seed for the scatter RNG. Part of the request so results are
    /// reproducible across hosts.
    #[serde(default)]
    pub seed: u64,
    /// Disable the data-parallel ray loop (reproducibility tests).
    #[serde(default)]
    pub single_threaded: bool,
    /// Attenuate along the unobstructed air path.
    #[serde(default)]
    pub include_air: bool,
    /// Apply 1/r² geometric divergence.
    #[serde(default)]
    pub include_inverse_square: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            energies_kev: vec![1000.0],
            ray_count: 5000,
            include_buildup: true,
            include_scatter: false,
            angular_resolution_deg: 0.1,
            compton: ComptonConfig::default(),
            buildup_method: BuildUpMethod::default(),
            seed: 0,
            single_threaded: false,
            include_air: false,
            include_inverse_square: false,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> ColliResult<()> {
        if self.ray_count < MIN_RAY_COUNT || self.ray_count > MAX_RAY_COUNT {
            return Err(ColliError::InvalidConfig(format!(
                "ray count {} outside [{MIN_RAY_COUNT}, {MAX_RAY_COUNT}]",
                self.ray_count
            )));
        }
        if !self.angular_resolution_deg.is_finite() || self.angular_resolution_deg <= 0.0 {
            return Err(ColliError::InvalidConfig(format!(
                "angular resolution must be positive, got {}",
                self.angular_resolution_deg
            )));
        }
        if self.energies_kev.is_empty() {
            return Err(ColliError::InvalidConfig("energy list is empty".into()));
        }
        for &e in &self.energies_kev {
            if !e.is_finite() || e <= 0.0 {
                return Err(ColliError::InvalidConfig(format!(
                    "energies must be positive, got {e} keV"
                )));
            }
        }
        if self.compton.max_scatter_order == 0 || self.compton.max_scatter_order > 2 {
            return Err(ColliError::InvalidConfig(format!(
                "max scatter order must be 1 or 2, got {}",
                self.compton.max_scatter_order
            )));
        }
        if !self.compton.step_size_mm.is_finite() || self.compton.step_size_mm <= 0.0 {
            return Err(ColliError::InvalidConfig(format!(
                "scatter step size must be positive, got {} mm",
                self.compton.step_size_mm
            )));
        }
        if self.compton.min_energy_cutoff_kev < 0.0 {
            return Err(ColliError::InvalidConfig(format!(
                "scatter energy cutoff must be ≥ 0, got {} keV",
                self.compton.min_energy_cutoff_kev
            )));
        }
        Ok(())
    }
}
