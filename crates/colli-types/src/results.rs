// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Result Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Immutable simulation result documents.

use crate::units::{KeV, Mfp, Mm};
use serde::{Deserialize, Serialize};

/// One detector bin of the beam profile.
///
/// `primary` and `scatter` are per-ray intensities (bin sums divided by
/// the total ray count); `transmission` is the mean transmission of the
/// rays landing in the bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorBin {
    pub bin_index: usize,
    pub position_mm: Mm,
    pub primary: f64,
    pub scatter: f64,
    pub total: f64,
    pub transmission: f64,
    pub buildup_factor: f64,
}

/// Per-layer contribution to a slab attenuation computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerContribution {
    pub material_id: String,
    pub thickness_mm: Mm,
    pub mu_per_cm: f64,
    pub tau: Mfp,
    pub transmission: f64,
}

/// Attenuation of the full layer stack at one energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAnalysisRow {
    #[serde(rename = "energy_keV")]
    pub energy_kev: KeV,
    pub total_tau: Mfp,
    pub transmission: f64,
    pub transmission_with_buildup: f64,
    pub buildup_factor: f64,
    pub attenuation_db: f64,
    pub layers: Vec<LayerContribution>,
}

/// Penumbra widths between two intensity fractions on each side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PenumbraMetric {
    pub left_mm: Mm,
    pub right_mm: Mm,
    /// max(left, right).
    pub general_mm: Mm,
    pub lower_fraction: f64,
    pub upper_fraction: f64,
}

/// Aggregate beam quality metrics. Ratios are fractions (0-1), not %.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub penumbra: PenumbraMetric,
    pub fwhm_mm: Mm,
    /// (I_max − I_min)/(I_max + I_min) over the central 80% of FWHM.
    pub flatness: f64,
    pub leakage_mean: f64,
    pub leakage_max: f64,
    /// Leakage recomputed from the build-up-free profile, reported side
    /// by side with the build-up-included values.
    pub leakage_mean_no_buildup: f64,
    pub leakage_max_no_buildup: f64,
    pub collimation_ratio: f64,
    pub collimation_ratio_db: f64,
    pub spr_mean: f64,
    pub spr_max: f64,
}

/// A single Compton interaction generated by the scatter tracer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterInteractionRecord {
    pub x_cm: f64,
    pub z_cm: f64,
    pub stage_index: usize,
    pub material_id: String,
    #[serde(rename = "incident_energy_keV")]
    pub incident_energy_kev: KeV,
    #[serde(rename = "scattered_energy_keV")]
    pub scattered_energy_kev: KeV,
    pub scatter_angle_rad: f64,
    /// 1 = first-order scatter, 2 = second-order.
    pub order: u8,
    /// Detector landing position, None when the photon never arrives.
    pub detector_x_mm: Option<Mm>,
    /// Surviving intensity at the detector (0 when it never arrives).
    pub weight: f64,
}

/// Outcome counters for the scatter state machine. Only
/// `reached_detector` events contribute to the output profile.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScatterAccounting {
    pub interactions: usize,
    pub reached_detector: usize,
    pub escaped: usize,
    pub below_cutoff: usize,
    pub escaped_fraction: f64,
    #[serde(rename = "mean_scattered_energy_keV")]
    pub mean_scattered_energy_kev: KeV,
}

/// Optional Compton analysis attached to a simulation result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComptonAnalysis {
    /// Klein-Nishina angular distribution at the reference energy.
    pub angles_rad: Vec<f64>,
    pub dsigma_domega: Vec<f64>,
    #[serde(rename = "scattered_energies_keV")]
    pub scattered_energies_kev: Vec<f64>,
    /// KN-weighted scattered photon spectrum, normalized.
    #[serde(rename = "spectrum_energies_keV")]
    pub spectrum_energies_kev: Vec<f64>,
    pub spectrum_weights: Vec<f64>,
    pub interactions: Vec<ScatterInteractionRecord>,
    /// Scatter intensity per detector bin (per primary ray).
    pub scatter_profile: Vec<f64>,
    pub spr_profile: Vec<f64>,
    pub accounting: ScatterAccounting,
}

/// Non-failing advisories attached to a result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    GpTaylorDisagreement {
        material: String,
        #[serde(rename = "energy_keV")]
        energy_kev: KeV,
        tau: Mfp,
        relative_difference: f64,
    },
    MonoenergeticMevApproximation {
        #[serde(rename = "energy_keV")]
        energy_kev: KeV,
    },
    SingleScatterOnly,
    BuildupTauClamped {
        material: String,
        tau: Mfp,
    },
    DominantMaterialTie {
        first: String,
        second: String,
    },
}

/// Complete simulation result. Immutable once produced; the persistence
/// layer copies it out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Monotone id assigned at construction.
    pub result_id: u64,
    /// Seconds since the Unix epoch at construction.
    pub created_at_unix_s: f64,
    /// Reference energy of the detector profile [keV].
    #[serde(rename = "energy_keV")]
    pub energy_kev: KeV,
    pub ray_count: usize,
    pub include_buildup: bool,
    pub profile: Vec<DetectorBin>,
    pub energy_analysis: Vec<EnergyAnalysisRow>,
    pub quality: QualityMetrics,
    pub compton: Option<ComptonAnalysis>,
    pub warnings: Vec<Warning>,
    pub elapsed_seconds: f64,
}
