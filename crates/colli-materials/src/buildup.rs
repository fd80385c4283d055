// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Build-Up Factors
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Build-up factor service - GP and Taylor fitting formulas.
//!
//! Evaluates Geometric Progression (primary) and Taylor two-term
//! exponential (secondary) build-up factors from a fit-parameter table
//! keyed by (material, energy). Energies in keV at the API, MeV in the
//! table; penetration depth in mfp, used directly.
//!
//! Reference: ANSI/ANS-6.4.3-1991, Harima (1983), Taylor (1954).

use crate::interp::logenergy_interp;
use colli_types::config::BuildUpMethod;
use colli_types::constants::BUILDUP_TAU_MAX;
use colli_types::error::{ColliError, ColliResult};
use colli_types::units::{KeV, Mfp};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Alloys/compounds without dedicated build-up data resolve to the
/// nearest tabulated parent element. SS304/SS316 are iron-based,
/// Bronze is copper-based, Be has no published GP data (Al is the
/// closest low-Z surrogate), Bi sits next to Pb.
const FALLBACK: [(&str, &str); 5] = [
    ("SS304", "Fe"),
    ("SS316", "Fe"),
    ("Bronze", "Cu"),
    ("Be", "Al"),
    ("Bi", "Pb"),
];

/// GP K(τ) is treated as linear-in-τ when |K − 1| falls below this.
const K_UNITY_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GpRow {
    #[serde(rename = "energy_MeV")]
    pub energy_mev: f64,
    pub b: f64,
    pub c: f64,
    pub a: f64,
    #[serde(rename = "Xk")]
    pub xk: f64,
    pub d: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaylorRow {
    #[serde(rename = "energy_MeV")]
    pub energy_mev: f64,
    #[serde(rename = "A1")]
    pub a1: f64,
    pub alpha1: f64,
    pub alpha2: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialBuildUp {
    pub gp: Vec<GpRow>,
    pub taylor: Vec<TaylorRow>,
}

/// On-disk aggregate document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildUpFile {
    #[serde(default)]
    pub source: String,
    pub tau_range: [f64; 2],
    pub materials: BTreeMap<String, MaterialBuildUp>,
}

/// A build-up factor together with the τ-domain flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildUpEvaluation {
    /// B ≥ 1, dimensionless.
    pub factor: f64,
    /// True when τ exceeded the parametrization domain and was clamped.
    pub tau_clamped: bool,
}

impl BuildUpEvaluation {
    fn unity() -> Self {
        BuildUpEvaluation {
            factor: 1.0,
            tau_clamped: false,
        }
    }
}

/// Build-up factor service. Read-only after construction.
#[derive(Debug)]
pub struct BuildUpFactors {
    materials: BTreeMap<String, MaterialBuildUp>,
    tau_max: f64,
}

impl BuildUpFactors {
    pub fn load_from_file(path: &Path) -> ColliResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let doc: BuildUpFile = serde_json::from_str(&contents)?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: BuildUpFile) -> Self {
        BuildUpFactors {
            materials: doc.materials,
            tau_max: doc.tau_range[1].min(BUILDUP_TAU_MAX),
        }
    }

    /// True when GP parameters exist for the material (incl. fallback).
    pub fn has_data(&self, material_id: &str) -> bool {
        self.resolve(material_id).is_ok()
    }

    /// Geometric Progression build-up factor.
    ///
    /// B(τ) = 1 + (b−1)(Kᵗ−1)/(K−1)   for K ≠ 1
    /// B(τ) = 1 + (b−1)τ              for K ≈ 1
    /// K(τ) = c·τᵃ + d·[tanh(τ/Xk − 2) − tanh(−2)] / [1 − tanh(−2)]
    pub fn gp(&self, material_id: &str, energy_kev: KeV, tau: Mfp) -> ColliResult<BuildUpEvaluation> {
        let (tau, clamped) = self.domain_check(tau)?;
        if tau == 0.0 {
            return Ok(BuildUpEvaluation::unity());
        }
        let params = self.gp_params(material_id, energy_kev)?;

        let tanh_neg2 = (-2.0_f64).tanh();
        let denom_tanh = 1.0 - tanh_neg2;

        let tau_pow_a = if params.a != 0.0 { tau.powf(params.a) } else { 1.0 };
        let k = params.c * tau_pow_a
            + params.d * ((tau / params.xk.max(1e-10) - 2.0).tanh() - tanh_neg2) / denom_tanh;

        let b = params.b;
        let factor = if (k - 1.0).abs() < K_UNITY_EPS {
            1.0 + (b - 1.0) * tau
        } else {
            1.0 + (b - 1.0) * (k.powf(tau) - 1.0) / (k - 1.0)
        };

        Ok(BuildUpEvaluation {
            factor: factor.max(1.0),
            tau_clamped: clamped,
        })
    }

    /// Taylor two-term exponential build-up factor.
    ///
    /// B(τ) = A₁·exp(−α₁τ) + (1 − A₁)·exp(−α₂τ)
    pub fn taylor(
        &self,
        material_id: &str,
        energy_kev: KeV,
        tau: Mfp,
    ) -> ColliResult<BuildUpEvaluation> {
        let (tau, clamped) = self.domain_check(tau)?;
        if tau == 0.0 {
            return Ok(BuildUpEvaluation::unity());
        }
        let params = self.taylor_params(material_id, energy_kev)?;
        let factor = params.a1 * (-params.alpha1 * tau).exp()
            + (1.0 - params.a1) * (-params.alpha2 * tau).exp();

        Ok(BuildUpEvaluation {
            factor: factor.max(1.0),
            tau_clamped: clamped,
        })
    }

    /// Relative GP/Taylor disagreement |B_gp − B_taylor| / B_gp.
    ///
    /// The formulas are independent fits, so a large disagreement is a
    /// data-quality signal the host surfaces as a warning.
    pub fn cross_check(&self, material_id: &str, energy_kev: KeV, tau: Mfp) -> ColliResult<f64> {
        let gp = self.gp(material_id, energy_kev, tau)?.factor;
        let taylor = self.taylor(material_id, energy_kev, tau)?.factor;
        Ok((gp - taylor).abs() / gp)
    }

    /// Multi-stage composite build-up factor from per-stage
    /// (material, τ) pairs.
    pub fn multilayer(
        &self,
        stages: &[(String, Mfp)],
        energy_kev: KeV,
        method: BuildUpMethod,
    ) -> ColliResult<BuildUpEvaluation> {
        let total_tau: f64 = stages.iter().map(|(_, t)| t).sum();
        if stages.is_empty() || total_tau <= 0.0 {
            return Ok(BuildUpEvaluation::unity());
        }

        match method {
            BuildUpMethod::GpLastMaterial => {
                let last = &stages[stages.len() - 1].0;
                self.gp(last, energy_kev, total_tau)
            }
            BuildUpMethod::GpSequential => {
                let mut factor = 1.0;
                let mut clamped = false;
                for (mat, tau) in stages {
                    if *tau > 0.0 {
                        let eval = self.gp(mat, energy_kev, *tau)?;
                        factor *= eval.factor;
                        clamped |= eval.tau_clamped;
                    }
                }
                Ok(BuildUpEvaluation {
                    factor: factor.max(1.0),
                    tau_clamped: clamped,
                })
            }
            BuildUpMethod::Taylor => {
                let mut factor = 1.0;
                let mut clamped = false;
                for (mat, tau) in stages {
                    if *tau > 0.0 {
                        let eval = self.taylor(mat, energy_kev, *tau)?;
                        factor *= eval.factor;
                        clamped |= eval.tau_clamped;
                    }
                }
                Ok(BuildUpEvaluation {
                    factor: factor.max(1.0),
                    tau_clamped: clamped,
                })
            }
        }
    }

    // ── Internal ──

    /// τ < 0 is a unit error; τ above the domain clamps with a flag.
    fn domain_check(&self, tau: Mfp) -> ColliResult<(f64, bool)> {
        if !tau.is_finite() || tau < 0.0 {
            return Err(ColliError::InvalidUnit {
                quantity: "tau_mfp",
                value: tau,
            });
        }
        if tau > self.tau_max {
            Ok((self.tau_max, true))
        } else {
            Ok((tau, false))
        }
    }

    fn resolve<'a>(&self, material_id: &'a str) -> ColliResult<&'a str> {
        if self.materials.contains_key(material_id) {
            return Ok(material_id);
        }
        if let Some((_, parent)) = FALLBACK.iter().find(|(id, _)| *id == material_id) {
            if self.materials.contains_key(*parent) {
                debug!("build-up fallback: {material_id} → {parent}");
                return Ok(parent);
            }
        }
        Err(ColliError::NumericalDegeneracy {
            context: "no build-up data for material".into(),
            material: material_id.to_string(),
            energy_kev: 0.0,
        })
    }

    fn gp_params(&self, material_id: &str, energy_kev: KeV) -> ColliResult<GpRow> {
        let resolved = self.resolve(material_id)?;
        let rows = &self.materials[resolved].gp;
        if rows.is_empty() {
            return Err(ColliError::NumericalDegeneracy {
                context: "empty GP parameter table".into(),
                material: material_id.to_string(),
                energy_kev,
            });
        }
        let energies: Vec<f64> = rows.iter().map(|r| r.energy_mev).collect();
        let energy_mev = energy_kev / 1000.0;
        let pick = |f: fn(&GpRow) -> f64| {
            let values: Vec<f64> = rows.iter().map(f).collect();
            logenergy_interp(&energies, &values, energy_mev)
        };
        Ok(GpRow {
            energy_mev,
            b: pick(|r| r.b),
            c: pick(|r| r.c),
            a: pick(|r| r.a),
            xk: pick(|r| r.xk),
            d: pick(|r| r.d),
        })
    }

    fn taylor_params(&self, material_id: &str, energy_kev: KeV) -> ColliResult<TaylorRow> {
        let resolved = self.resolve(material_id)?;
        let rows = &self.materials[resolved].taylor;
        if rows.is_empty() {
            return Err(ColliError::NumericalDegeneracy {
                context: "empty Taylor parameter table".into(),
                material: material_id.to_string(),
                energy_kev,
            });
        }
        let energies: Vec<f64> = rows.iter().map(|r| r.energy_mev).collect();
        let energy_mev = energy_kev / 1000.0;
        let pick = |f: fn(&TaylorRow) -> f64| {
            let values: Vec<f64> = rows.iter().map(f).collect();
            logenergy_interp(&energies, &values, energy_mev)
        };
        Ok(TaylorRow {
            energy_mev,
            a1: pick(|r| r.a1),
            alpha1: pick(|r| r.alpha1),
            alpha2: pick(|r| r.alpha2),
        })
    }
}
