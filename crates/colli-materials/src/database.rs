// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Material Database
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Material database service - NIST XCOM data loading and μ/ρ lookup.
//!
//! Loads one JSON document per material from a host-supplied directory,
//! then answers mass-attenuation queries by log-log interpolation.
//! Energy inputs in keV, all returned coefficients in cm²/g.

use crate::interp::loglog_interp;
use colli_types::error::{ColliError, ColliResult};
use colli_types::material::{AttenuationDataPoint, Composition, Material, MaterialFile};
use colli_types::units::KeV;
use log::warn;
use std::collections::BTreeMap;
use std::path::Path;

/// Tolerance on alloy weight-fraction sums.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Component values below this are reported as exactly zero.
const COMPONENT_ZERO_FLOOR: f64 = 1e-20;

/// Attenuation coefficient column selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Total,
    Photoelectric,
    Compton,
    Pair,
    EnergyAbsorption,
}

/// Service for material property lookup and attenuation queries.
///
/// Read-only after construction; safe to share across parallel ray
/// workers without synchronization.
#[derive(Debug)]
pub struct MaterialService {
    materials: BTreeMap<String, Material>,
}

impl MaterialService {
    /// Load every `*.json` material document in `dir`.
    ///
    /// A malformed document is a hard error; an unreadable directory
    /// entry is skipped with a warning.
    pub fn load_from_dir(dir: &Path) -> ColliResult<Self> {
        let mut materials = BTreeMap::new();
        let mut entries: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|x| x == "json").unwrap_or(false))
            .collect();
        entries.sort();

        for path in entries {
            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(err) => {
                    warn!("skipping unreadable material file {}: {err}", path.display());
                    continue;
                }
            };
            let doc: MaterialFile = serde_json::from_str(&contents)?;
            let material = Material::from_document(doc)?;
            materials.insert(material.id.clone(), material);
        }

        if materials.is_empty() {
            return Err(ColliError::NotFound(format!(
                "no material files found in {}",
                dir.display()
            )));
        }
        Ok(MaterialService { materials })
    }

    /// Build a service from already-validated materials (test fixtures).
    pub fn from_materials(materials: Vec<Material>) -> Self {
        MaterialService {
            materials: materials.into_iter().map(|m| (m.id.clone(), m)).collect(),
        }
    }

    /// All known materials, ordered by id.
    pub fn materials(&self) -> Vec<&Material> {
        self.materials.values().collect()
    }

    /// Single material by id.
    pub fn material(&self, material_id: &str) -> ColliResult<&Material> {
        self.materials
            .get(material_id)
            .ok_or_else(|| ColliError::NotFound(material_id.to_string()))
    }

    /// Attenuation data points within an energy window [keV].
    pub fn attenuation_data(
        &self,
        material_id: &str,
        min_kev: KeV,
        max_kev: KeV,
    ) -> ColliResult<Vec<AttenuationDataPoint>> {
        let mat = self.material(material_id)?;
        Ok(mat
            .attenuation_data
            .iter()
            .copied()
            .filter(|dp| dp.energy_kev >= min_kev && dp.energy_kev <= max_kev)
            .collect())
    }

    /// Total mass attenuation coefficient μ/ρ [cm²/g].
    pub fn mu_over_rho(&self, material_id: &str, energy_kev: KeV) -> ColliResult<f64> {
        self.query(material_id, energy_kev, Column::Total)
    }

    /// Photoelectric component of μ/ρ [cm²/g].
    pub fn photoelectric_mu_over_rho(
        &self,
        material_id: &str,
        energy_kev: KeV,
    ) -> ColliResult<f64> {
        self.query(material_id, energy_kev, Column::Photoelectric)
    }

    /// Compton (incoherent) component of μ/ρ [cm²/g].
    pub fn compton_mu_over_rho(&self, material_id: &str, energy_kev: KeV) -> ColliResult<f64> {
        self.query(material_id, energy_kev, Column::Compton)
    }

    /// Pair-production component of μ/ρ [cm²/g]. Zero below threshold.
    pub fn pair_mu_over_rho(&self, material_id: &str, energy_kev: KeV) -> ColliResult<f64> {
        let mat = self.material(material_id)?;
        // Whole column zero ⇒ below threshold everywhere on the grid
        if mat.attenuation_data.iter().all(|dp| dp.pair < 1e-30) {
            self.check_range(mat, energy_kev)?;
            return Ok(0.0);
        }
        let v = self.query(material_id, energy_kev, Column::Pair)?;
        Ok(if v < COMPONENT_ZERO_FLOOR { 0.0 } else { v })
    }

    /// Mass energy-absorption coefficient μ_en/ρ [cm²/g].
    pub fn energy_absorption_mu_over_rho(
        &self,
        material_id: &str,
        energy_kev: KeV,
    ) -> ColliResult<f64> {
        self.query(material_id, energy_kev, Column::EnergyAbsorption)
    }

    /// Alloy mixture rule: (μ/ρ)_alloy = Σ wᵢ (μ/ρ)ᵢ [cm²/g].
    ///
    /// Every `element` must itself be a database material id. Weights
    /// must sum to 1 ± 1e-6.
    pub fn mu_over_rho_alloy(
        &self,
        composition: &[Composition],
        energy_kev: KeV,
    ) -> ColliResult<f64> {
        let sum: f64 = composition.iter().map(|c| c.weight_fraction).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ColliError::InvalidComposition { sum });
        }
        let mut total = 0.0;
        for comp in composition {
            total += comp.weight_fraction * self.mu_over_rho(&comp.element, energy_kev)?;
        }
        Ok(total)
    }

    /// Compton branch fraction μ_Compton/μ_total, used by the scatter
    /// tracer. Dimensionless, in [0, 1].
    pub fn compton_fraction(&self, material_id: &str, energy_kev: KeV) -> ColliResult<f64> {
        let total = self.mu_over_rho(material_id, energy_kev)?;
        if total <= 0.0 {
            return Err(ColliError::NumericalDegeneracy {
                context: "total attenuation is zero".into(),
                material: material_id.to_string(),
                energy_kev,
            });
        }
        let compton = self.compton_mu_over_rho(material_id, energy_kev)?;
        Ok((compton / total).clamp(0.0, 1.0))
    }

    fn check_range(&self, mat: &Material, energy_kev: KeV) -> ColliResult<()> {
        let (min_kev, max_kev) = mat.energy_range();
        if energy_kev < min_kev || energy_kev > max_kev {
            return Err(ColliError::OutOfRange {
                material: mat.id.clone(),
                energy_kev,
                min_kev,
                max_kev,
            });
        }
        Ok(())
    }

    fn query(&self, material_id: &str, energy_kev: KeV, column: Column) -> ColliResult<f64> {
        let mat = self.material(material_id)?;
        self.check_range(mat, energy_kev)?;

        let energies: Vec<f64> = mat.attenuation_data.iter().map(|d| d.energy_kev).collect();
        let values: Vec<f64> = mat
            .attenuation_data
            .iter()
            .map(|d| match column {
                Column::Total => d.mass_attenuation,
                Column::Photoelectric => d.photoelectric,
                Column::Compton => d.compton,
                Column::Pair => d.pair,
                Column::EnergyAbsorption => d.mass_energy_absorption,
            })
            .collect();

        Ok(loglog_interp(&energies, &values, energy_kev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Data directory at the workspace root; CARGO_MANIFEST_DIR points
    /// to crates/colli-materials/ at compile time.
    fn data_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("data")
            .join("nist_xcom")
    }

    fn service() -> MaterialService {
        MaterialService::load_from_dir(&data_dir()).unwrap()
    }

    #[test]
    fn test_loads_all_materials() {
        let svc = service();
        let ids: Vec<&str> = svc.materials().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), 11);
        for id in ["Pb", "W", "Fe", "Al", "Cu", "Bi", "Be", "SS304", "SS316", "Bronze", "Air"] {
            assert!(ids.contains(&id), "missing material {id}");
        }
    }

    #[test]
    fn test_lead_metadata() {
        let svc = service();
        let pb = svc.material("Pb").unwrap();
        assert_eq!(pb.name, "Lead");
        assert!((pb.density - 11.34).abs() < 1e-9);
        assert!((pb.atomic_number - 82.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_material() {
        let svc = service();
        assert!(matches!(
            svc.mu_over_rho("Unobtainium", 500.0),
            Err(ColliError::NotFound(_))
        ));
    }

    #[test]
    fn test_mu_rho_at_grid_points() {
        let svc = service();
        // NIST XCOM values embedded in the data files
        let cases = [
            ("Pb", 60.0, 5.021),
            ("Pb", 100.0, 5.549),
            ("Pb", 200.0, 0.9985),
            ("Pb", 500.0, 0.1614),
            ("Pb", 1000.0, 0.0708),
            ("W", 100.0, 2.271),
            ("W", 200.0, 0.4438),
            ("W", 1000.0, 0.0596),
            ("Fe", 1000.0, 0.0600),
            ("Al", 200.0, 0.1121),
            ("Cu", 100.0, 0.3811),
            ("Bi", 1000.0, 0.0718),
            ("SS304", 200.0, 0.1389),
        ];
        for (id, e, expected) in cases {
            let got = svc.mu_over_rho(id, e).unwrap();
            assert!(
                (got - expected).abs() / expected < 1e-3,
                "{id} @ {e} keV: got {got}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_interpolation_between_points() {
        let svc = service();
        // Pb between 600 (0.1248) and 800 (0.0887) keV
        let got = svc.mu_over_rho("Pb", 662.0).unwrap();
        assert!(got < 0.1248 && got > 0.0887, "Pb @ 662 keV: {got}");
    }

    #[test]
    fn test_kedge_jump() {
        let svc = service();
        let below = svc.mu_over_rho("Pb", 88.0).unwrap();
        let above = svc.mu_over_rho("Pb", 88.005).unwrap();
        assert!(
            above > below * 3.0,
            "K-edge jump factor too small: {below} → {above}"
        );
    }

    #[test]
    fn test_kedge_interpolation_stays_on_one_side() {
        let svc = service();
        // 84 keV lies between the 80 keV point and the below-edge point;
        // interpolation must not see the above-edge jump.
        let v = svc.mu_over_rho("Pb", 84.0).unwrap();
        assert!(v < 2.419 && v > 1.525, "Pb @ 84 keV bridged the K-edge: {v}");
        // 95 keV interpolates the above-edge region only.
        let v = svc.mu_over_rho("Pb", 95.0).unwrap();
        assert!(v < 7.841 && v > 5.549, "Pb @ 95 keV bridged the K-edge: {v}");
    }

    #[test]
    fn test_out_of_range_is_error() {
        let svc = service();
        assert!(matches!(
            svc.mu_over_rho("Pb", 5.0),
            Err(ColliError::OutOfRange { .. })
        ));
        assert!(matches!(
            svc.mu_over_rho("Pb", 50_000.0),
            Err(ColliError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_component_sum_near_total() {
        let svc = service();
        for (id, e) in [("Pb", 200.0), ("Pb", 1000.0), ("W", 1000.0), ("Cu", 200.0)] {
            let total = svc.mu_over_rho(id, e).unwrap();
            let pe = svc.photoelectric_mu_over_rho(id, e).unwrap();
            let c = svc.compton_mu_over_rho(id, e).unwrap();
            let pp = svc.pair_mu_over_rho(id, e).unwrap();
            let sum = pe + c + pp;
            assert!(
                (sum - total).abs() / total < 0.05,
                "{id} @ {e} keV component sum {sum} vs total {total}"
            );
        }
    }

    #[test]
    fn test_pair_production_zero_below_threshold() {
        let svc = service();
        for (id, e) in [("Pb", 200.0), ("Pb", 500.0), ("W", 600.0), ("Al", 500.0)] {
            let pp = svc.pair_mu_over_rho(id, e).unwrap();
            assert_eq!(pp, 0.0, "{id} @ {e} keV should have zero pair production");
        }
    }

    #[test]
    fn test_pair_production_positive_above_threshold() {
        let svc = service();
        assert!(svc.pair_mu_over_rho("Pb", 2000.0).unwrap() > 0.0);
    }

    #[test]
    fn test_alloy_mixture_rule() {
        let svc = service();
        // Pure composition reproduces the element exactly
        let comp = vec![Composition {
            element: "Pb".into(),
            weight_fraction: 1.0,
        }];
        let pure = svc.mu_over_rho("Pb", 500.0).unwrap();
        let mixed = svc.mu_over_rho_alloy(&comp, 500.0).unwrap();
        assert!((mixed - pure).abs() / pure < 1e-9);

        // Two-component mixture is the weighted sum
        let comp = vec![
            Composition {
                element: "Fe".into(),
                weight_fraction: 0.7,
            },
            Composition {
                element: "Cu".into(),
                weight_fraction: 0.3,
            },
        ];
        let expected = 0.7 * svc.mu_over_rho("Fe", 500.0).unwrap()
            + 0.3 * svc.mu_over_rho("Cu", 500.0).unwrap();
        let got = svc.mu_over_rho_alloy(&comp, 500.0).unwrap();
        assert!((got - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_alloy_bad_weights_rejected() {
        let svc = service();
        let comp = vec![
            Composition {
                element: "Fe".into(),
                weight_fraction: 0.7,
            },
            Composition {
                element: "Cu".into(),
                weight_fraction: 0.2,
            },
        ];
        assert!(matches!(
            svc.mu_over_rho_alloy(&comp, 500.0),
            Err(ColliError::InvalidComposition { .. })
        ));
    }

    #[test]
    fn test_compton_fraction_bounds() {
        let svc = service();
        for id in ["Pb", "Fe", "Al"] {
            for e in [200.0, 500.0, 1000.0, 2000.0] {
                let f = svc.compton_fraction(id, e).unwrap();
                assert!((0.0..=1.0).contains(&f), "{id} @ {e}: fraction {f}");
            }
        }
        // Compton dominates iron at 1 MeV
        assert!(svc.compton_fraction("Fe", 1000.0).unwrap() > 0.9);
        // Photoelectric dominates lead at 100 keV
        assert!(svc.compton_fraction("Pb", 100.0).unwrap() < 0.5);
        assert!(
            svc.compton_fraction("Pb", 1000.0).unwrap()
                > svc.compton_fraction("Pb", 100.0).unwrap()
        );
    }

    #[test]
    fn test_attenuation_data_window() {
        let svc = service();
        let window = svc.attenuation_data("Pb", 100.0, 1000.0).unwrap();
        assert!(!window.is_empty());
        assert!(window
            .iter()
            .all(|dp| (100.0..=1000.0).contains(&dp.energy_kev)));
    }
}
