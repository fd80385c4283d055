// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Material Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Material data model and the on-disk NIST XCOM file schema.

use crate::error::{ColliError, ColliResult};
use crate::units::KeV;
use serde::{Deserialize, Serialize};

/// Tolerance on alloy weight-fraction sums.
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialCategory {
    PureElement,
    Alloy,
}

/// Single element of an alloy composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub element: String,
    pub weight_fraction: f64,
}

/// One row of a material data file.
///
/// Column layout follows the NIST XCOM export: total cross-sections with
/// and without coherent scattering, the photoelectric / Compton / pair
/// components, and the optional mass energy-absorption coefficient.
/// All coefficients in cm²/g.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttenuationRow {
    #[serde(rename = "energy_keV")]
    pub energy_kev: f64,
    pub total_with_coherent: f64,
    pub total_without_coherent: f64,
    #[serde(default)]
    pub mass_energy_absorption: f64,
    pub photoelectric: f64,
    pub compton: f64,
    pub pair_nuclear: f64,
    pub pair_electron: f64,
}

/// In-memory attenuation point. All coefficients in cm²/g.
#[derive(Debug, Clone, Copy)]
pub struct AttenuationDataPoint {
    pub energy_kev: KeV,
    /// Total mass attenuation (coherent included).
    pub mass_attenuation: f64,
    pub mass_energy_absorption: f64,
    pub photoelectric: f64,
    pub compton: f64,
    /// Pair production, nuclear + electron field combined.
    pub pair: f64,
}

impl From<AttenuationRow> for AttenuationDataPoint {
    fn from(row: AttenuationRow) -> Self {
        AttenuationDataPoint {
            energy_kev: row.energy_kev,
            mass_attenuation: row.total_with_coherent,
            mass_energy_absorption: row.mass_energy_absorption,
            photoelectric: row.photoelectric,
            compton: row.compton,
            pair: row.pair_nuclear + row.pair_electron,
        }
    }
}

/// On-disk material document (one file per material).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialFile {
    pub material_id: String,
    pub name: String,
    pub symbol: String,
    pub atomic_number: f64,
    pub density_g_cm3: f64,
    #[serde(default)]
    pub color: String,
    pub category: MaterialCategory,
    #[serde(default)]
    pub source: String,
    #[serde(rename = "valid_range_keV")]
    pub valid_range_kev: [f64; 2],
    #[serde(default)]
    pub composition: Vec<Composition>,
    pub data_points: Vec<AttenuationRow>,
}

/// Material definition with physical properties.
#[derive(Debug, Clone)]
pub struct Material {
    pub id: String,
    pub name: String,
    pub symbol: String,
    /// Effective Z for alloys.
    pub atomic_number: f64,
    /// Mass density [g/cm³].
    pub density: f64,
    /// Presentation color, opaque to the core.
    pub color: String,
    pub category: MaterialCategory,
    pub composition: Vec<Composition>,
    /// Sorted by energy, strictly increasing. K-edges appear as two
    /// adjacent points a fraction of a keV apart.
    pub attenuation_data: Vec<AttenuationDataPoint>,
}

impl Material {
    /// Build and validate a material from its on-disk document.
    pub fn from_document(doc: MaterialFile) -> ColliResult<Self> {
        if doc.data_points.is_empty() {
            return Err(ColliError::NumericalDegeneracy {
                context: "material has no attenuation data".into(),
                material: doc.material_id,
                energy_kev: 0.0,
            });
        }
        for pair in doc.data_points.windows(2) {
            if pair[1].energy_kev <= pair[0].energy_kev {
                return Err(ColliError::NumericalDegeneracy {
                    context: "attenuation grid not strictly increasing".into(),
                    material: doc.material_id,
                    energy_kev: pair[1].energy_kev,
                });
            }
        }
        if doc.category == MaterialCategory::Alloy && !doc.composition.is_empty() {
            let sum: f64 = doc.composition.iter().map(|c| c.weight_fraction).sum();
            if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                return Err(ColliError::InvalidComposition { sum });
            }
        }
        if !doc.density_g_cm3.is_finite() || doc.density_g_cm3 <= 0.0 {
            return Err(ColliError::InvalidUnit {
                quantity: "density_g_cm3",
                value: doc.density_g_cm3,
            });
        }

        Ok(Material {
            id: doc.material_id,
            name: doc.name,
            symbol: doc.symbol,
            atomic_number: doc.atomic_number,
            density: doc.density_g_cm3,
            color: doc.color,
            category: doc.category,
            composition: doc.composition,
            attenuation_data: doc.data_points.into_iter().map(Into::into).collect(),
        })
    }

    /// Tabulated energy range [keV].
    pub fn energy_range(&self) -> (KeV, KeV) {
        (
            self.attenuation_data[0].energy_kev,
            self.attenuation_data[self.attenuation_data.len() - 1].energy_kev,
        )
    }
}
