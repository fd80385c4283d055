// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Attenuation Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Analytical photon attenuation engine.
//!
//! Beer-Lambert multi-layer attenuation with per-layer breakdown,
//! HVL/TVL/MFP, and pure sweep functions. All internal computation in
//! core units (cm, keV); layer thicknesses arrive in mm and are
//! converted at this boundary.

use colli_materials::{BuildUpFactors, MaterialService};
use colli_types::config::BuildUpMethod;
use colli_types::constants::TAU_OVERFLOW;
use colli_types::error::{ColliError, ColliResult};
use colli_types::geometry::Layer;
use colli_types::results::{LayerContribution, Warning};
use colli_types::units::{
    mm_to_cm, thickness_to_mfp, transmission_to_db, Cm, KeV, Mfp, Mm,
};
use ndarray::Array1;

/// Two largest per-layer τ values within this relative margin raise a
/// dominant-material tie warning. Shared with the per-ray beam loop so
/// both channels apply the same rule.
pub const DOMINANT_TIE_MARGIN: f64 = 0.10;

/// Multi-layer attenuation result at one energy.
#[derive(Debug, Clone)]
pub struct AttenuationBreakdown {
    /// Transmission including build-up when requested.
    pub transmission: f64,
    /// Plain Beer-Lambert transmission, exp(−τ).
    pub transmission_no_buildup: f64,
    pub attenuation_db: f64,
    pub total_tau: Mfp,
    pub buildup_factor: f64,
    /// Layer with the largest partial optical depth.
    pub dominant_material: Option<String>,
    pub layers: Vec<LayerContribution>,
    pub warnings: Vec<Warning>,
}

/// Half-value / tenth-value layer result, all in cm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HvlTvlResult {
    pub hvl_cm: Cm,
    pub tvl_cm: Cm,
    pub mfp_cm: Cm,
    pub mu_per_cm: f64,
}

/// One point of a thickness sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThicknessSweepPoint {
    pub thickness_cm: Cm,
    pub transmission: f64,
    pub attenuation_db: f64,
}

/// Analytical attenuation engine.
///
/// Holds shared references to the read-only material and build-up
/// stores; per-call state is local, so one engine may serve many
/// threads.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsEngine<'a> {
    materials: &'a MaterialService,
    buildup: Option<&'a BuildUpFactors>,
}

impl<'a> PhysicsEngine<'a> {
    pub fn new(materials: &'a MaterialService, buildup: Option<&'a BuildUpFactors>) -> Self {
        PhysicsEngine { materials, buildup }
    }

    pub fn materials(&self) -> &'a MaterialService {
        self.materials
    }

    pub fn buildup(&self) -> Option<&'a BuildUpFactors> {
        self.buildup
    }

    /// Linear attenuation coefficient μ = (μ/ρ)·ρ [cm⁻¹].
    pub fn linear_mu(&self, material_id: &str, energy_kev: KeV) -> ColliResult<f64> {
        let mu_rho = self.materials.mu_over_rho(material_id, energy_kev)?;
        let density = self.materials.material(material_id)?.density;
        Ok(mu_rho * density)
    }

    /// Compton component of the linear attenuation [cm⁻¹].
    pub fn compton_linear_mu(&self, material_id: &str, energy_kev: KeV) -> ColliResult<f64> {
        let mu_rho = self.materials.compton_mu_over_rho(material_id, energy_kev)?;
        let density = self.materials.material(material_id)?.density;
        Ok(mu_rho * density)
    }

    /// Multi-layer Beer-Lambert attenuation:
    ///
    /// I/I₀ = B(E, τ, dominant) × exp(−Σ μᵢ·xᵢ)
    ///
    /// Layer thicknesses in mm. Zero-thickness layers contribute
    /// nothing; an empty stack transmits exactly 1.
    pub fn transmission(
        &self,
        layers: &[Layer],
        energy_kev: KeV,
        include_buildup: bool,
        method: BuildUpMethod,
    ) -> ColliResult<AttenuationBreakdown> {
        let mut contributions: Vec<LayerContribution> = Vec::with_capacity(layers.len());
        let mut total_tau: Mfp = 0.0;

        for layer in layers {
            if !layer.thickness.is_finite() || layer.thickness < 0.0 {
                return Err(ColliError::InvalidUnit {
                    quantity: "layer_thickness_mm",
                    value: layer.thickness,
                });
            }
            if layer.material_id.is_empty() || layer.thickness == 0.0 {
                continue;
            }
            let thickness_cm = mm_to_cm(layer.thickness);
            let mu = self.linear_mu(&layer.material_id, energy_kev)?;
            let tau = thickness_to_mfp(thickness_cm, mu);
            total_tau += tau;
            contributions.push(LayerContribution {
                material_id: layer.material_id.clone(),
                thickness_mm: layer.thickness,
                mu_per_cm: mu,
                tau,
                transmission: beer_lambert(tau),
            });
        }

        let t0 = beer_lambert(total_tau);
        let mut warnings = Vec::new();
        let dominant = dominant_material(&contributions, &mut warnings);

        let mut buildup_factor = 1.0;
        if include_buildup && total_tau > 0.0 {
            if let (Some(bf), Some(dom)) = (self.buildup, dominant.as_deref()) {
                let eval = match method {
                    BuildUpMethod::GpLastMaterial => bf.gp(dom, energy_kev, total_tau)?,
                    BuildUpMethod::GpSequential => bf.gp(dom, energy_kev, total_tau)?,
                    BuildUpMethod::Taylor => bf.taylor(dom, energy_kev, total_tau)?,
                };
                buildup_factor = eval.factor;
                if eval.tau_clamped {
                    warnings.push(Warning::BuildupTauClamped {
                        material: dom.to_string(),
                        tau: total_tau,
                    });
                }
                let disagreement = bf.cross_check(dom, energy_kev, total_tau.min(40.0))?;
                if disagreement > 0.15 {
                    warnings.push(Warning::GpTaylorDisagreement {
                        material: dom.to_string(),
                        energy_kev,
                        tau: total_tau,
                        relative_difference: disagreement,
                    });
                }
            }
        }

        let transmission = (buildup_factor * t0).min(1.0);
        Ok(AttenuationBreakdown {
            transmission,
            transmission_no_buildup: t0,
            attenuation_db: transmission_to_db(transmission),
            total_tau,
            buildup_factor,
            dominant_material: dominant,
            layers: contributions,
            warnings,
        })
    }

    /// HVL = ln2/μ, TVL = ln10/μ, MFP = 1/μ [cm].
    pub fn hvl_tvl(&self, material_id: &str, energy_kev: KeV) -> ColliResult<HvlTvlResult> {
        let mu = self.linear_mu(material_id, energy_kev)?;
        if mu <= 0.0 {
            return Err(ColliError::NumericalDegeneracy {
                context: "linear attenuation is zero".into(),
                material: material_id.to_string(),
                energy_kev,
            });
        }
        Ok(HvlTvlResult {
            hvl_cm: std::f64::consts::LN_2 / mu,
            tvl_cm: std::f64::consts::LN_10 / mu,
            mfp_cm: 1.0 / mu,
            mu_per_cm: mu,
        })
    }

    /// Transmission of the layer stack at each listed energy [keV].
    /// Pure and side-effect-free.
    pub fn energy_sweep(
        &self,
        layers: &[Layer],
        energies_kev: &[KeV],
        include_buildup: bool,
        method: BuildUpMethod,
    ) -> ColliResult<Vec<AttenuationBreakdown>> {
        energies_kev
            .iter()
            .map(|&e| self.transmission(layers, e, include_buildup, method))
            .collect()
    }

    /// Log-spaced energy grid helper for sweep plots.
    pub fn log_energy_grid(min_kev: KeV, max_kev: KeV, steps: usize) -> Array1<f64> {
        let ln_min = min_kev.ln();
        let ln_max = max_kev.ln();
        Array1::from_shape_fn(steps, |i| {
            let t = if steps > 1 {
                i as f64 / (steps - 1) as f64
            } else {
                0.0
            };
            (ln_min + t * (ln_max - ln_min)).exp()
        })
    }

    /// Transmission vs thickness for a single material at one energy.
    /// Thicknesses in mm.
    pub fn thickness_sweep(
        &self,
        material_id: &str,
        energy_kev: KeV,
        thicknesses_mm: &[Mm],
    ) -> ColliResult<Vec<ThicknessSweepPoint>> {
        let mu = self.linear_mu(material_id, energy_kev)?;
        Ok(thicknesses_mm
            .iter()
            .map(|&t_mm| {
                let t_cm = mm_to_cm(t_mm);
                let transmission = beer_lambert(mu * t_cm);
                ThicknessSweepPoint {
                    thickness_cm: t_cm,
                    transmission,
                    attenuation_db: transmission_to_db(transmission),
                }
            })
            .collect())
    }
}

/// exp(−τ) with the overflow guard: τ beyond the representable range
/// is exactly zero transmission, never a panic or subnormal noise.
pub fn beer_lambert(tau: Mfp) -> f64 {
    if tau <= 0.0 {
        1.0
    } else if tau > TAU_OVERFLOW {
        0.0
    } else {
        (-tau).exp()
    }
}

/// Largest-τ layer wins; a runner-up within 10% raises a tie warning.
fn dominant_material(
    contributions: &[LayerContribution],
    warnings: &mut Vec<Warning>,
) -> Option<String> {
    let best = contributions
        .iter()
        .max_by(|a, b| a.tau.total_cmp(&b.tau))?;
    let runner_up = contributions
        .iter()
        .filter(|c| c.material_id != best.material_id)
        .max_by(|a, b| a.tau.total_cmp(&b.tau));
    if let Some(second) = runner_up {
        if best.tau > 0.0 && (best.tau - second.tau) / best.tau < DOMINANT_TIE_MARGIN {
            warnings.push(Warning::DominantMaterialTie {
                first: best.material_id.clone(),
                second: second.material_id.clone(),
            });
        }
    }
    Some(best.material_id.clone())
}
