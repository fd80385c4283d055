// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Geometry Model
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Collimator geometry data model.
//!
//! A design is an ordered sequence of stages along the beam axis (Z),
//! each a solid body with a single aperture and a stack of material
//! layers dividing its depth. Gaps between stages are air/vacuum.
//!
//! All document dimensions are in mm, angles in degrees. The tracer
//! converts to core units (cm, radian) at its boundary.

use crate::error::{ColliError, ColliResult};
use crate::units::{MeV, Mm};
use serde::{Deserialize, Serialize};

/// Tolerance on layer-thickness sums vs stage depth [mm].
const LAYER_SUM_TOLERANCE_MM: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollimatorType {
    FanBeam,
    PencilBeam,
    Slit,
}

/// Spatial intensity distribution across the focal spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocalSpotDistribution {
    #[default]
    Uniform,
    Gaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerPurpose {
    #[default]
    PrimaryShielding,
    SecondaryShielding,
    Structural,
    Filter,
}

/// Stage aperture. Entry/exit dimensions may differ (tapered bore);
/// the silhouette is linearly interpolated through the stage depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Aperture {
    Slit {
        entry_width: Mm,
        exit_width: Mm,
        #[serde(default)]
        height: Mm,
    },
    Pinhole {
        entry_diameter: Mm,
        exit_diameter: Mm,
    },
    Open,
}

impl Aperture {
    /// True for the pass-through variant with no silhouette.
    pub fn is_open(&self) -> bool {
        matches!(self, Aperture::Open)
    }

    /// Aperture half-width [mm] at fraction `t` ∈ [0, 1] of the stage
    /// depth (0 = entry face, 1 = exit face).
    pub fn half_width_at(&self, t: f64) -> Mm {
        match *self {
            Aperture::Slit {
                entry_width,
                exit_width,
                ..
            } => 0.5 * (entry_width + t * (exit_width - entry_width)),
            Aperture::Pinhole {
                entry_diameter,
                exit_diameter,
            } => 0.5 * (entry_diameter + t * (exit_diameter - entry_diameter)),
            Aperture::Open => f64::INFINITY,
        }
    }

    /// Largest lateral opening [mm] over the stage depth.
    pub fn max_width(&self) -> Mm {
        match *self {
            Aperture::Slit {
                entry_width,
                exit_width,
                ..
            } => entry_width.max(exit_width),
            Aperture::Pinhole {
                entry_diameter,
                exit_diameter,
            } => entry_diameter.max(exit_diameter),
            Aperture::Open => f64::INFINITY,
        }
    }
}

/// Single material layer within a stage, stacked along the beam axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub material_id: String,
    /// Thickness along the beam axis [mm].
    pub thickness: Mm,
    #[serde(default)]
    pub purpose: LayerPurpose,
}

/// One rigid collimator block along the beam axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default)]
    pub name: String,
    /// Front (entry) face position along the beam axis [mm].
    pub z_position: Mm,
    /// Extent along the beam axis [mm].
    pub depth: Mm,
    /// Total lateral width of the body [mm].
    pub outer_width: Mm,
    pub aperture: Aperture,
    /// Layers dividing `depth`, ordered entry → exit.
    pub layers: Vec<Layer>,
}

impl Stage {
    /// Exit (back) face position along the beam axis [mm].
    pub fn exit_z(&self) -> Mm {
        self.z_position + self.depth
    }
}

/// X-ray source configuration. Position Z is 0 by convention; the
/// energy fields are carried verbatim for downstream dose conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Lateral offset from the beam axis [mm].
    #[serde(default)]
    pub x: Mm,
    /// Position along the beam axis [mm]. Must be 0.
    #[serde(default)]
    pub z: Mm,
    #[serde(default, rename = "energy_kVp")]
    pub energy_kvp: Option<f64>,
    #[serde(default, rename = "energy_MeV")]
    pub energy_mev: Option<MeV>,
    /// Focal spot diameter [mm].
    #[serde(default = "default_focal_spot")]
    pub focal_spot_size: Mm,
    #[serde(default)]
    pub focal_spot_distribution: FocalSpotDistribution,
}

fn default_focal_spot() -> f64 {
    1.0
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            x: 0.0,
            z: 0.0,
            energy_kvp: None,
            energy_mev: None,
            focal_spot_size: 1.0,
            focal_spot_distribution: FocalSpotDistribution::Uniform,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Detector plane position along the beam axis [mm].
    pub z_position: Mm,
    /// Active width [mm], centered on the beam axis.
    pub width: Mm,
}

/// Complete collimator design geometry. Constructed by the host editor
/// and passed by value into simulations; the core never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollimatorGeometry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CollimatorType,
    #[serde(default)]
    pub source: SourceConfig,
    pub stages: Vec<Stage>,
    pub detector: DetectorConfig,
}

impl CollimatorGeometry {
    /// Validate the structural invariants. Material id *resolution* is
    /// left to the engine, which holds the database.
    pub fn validate(&self) -> ColliResult<()> {
        if self.stages.is_empty() {
            return Err(ColliError::InvalidGeometry("empty stage list".into()));
        }
        if self.source.z.abs() > 1e-9 {
            return Err(ColliError::InvalidGeometry(format!(
                "source Z must be 0 by convention, got {} mm",
                self.source.z
            )));
        }

        let mut prev_exit = f64::NEG_INFINITY;
        let mut prev_z = f64::NEG_INFINITY;
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.z_position <= prev_z {
                return Err(ColliError::InvalidGeometry(format!(
                    "stage {i}: Z positions must be strictly increasing"
                )));
            }
            if stage.z_position + 1e-9 < prev_exit {
                return Err(ColliError::InvalidGeometry(format!(
                    "stage {i}: overlaps previous stage (front {} mm < previous exit {} mm)",
                    stage.z_position, prev_exit
                )));
            }
            if !stage.depth.is_finite() || stage.depth <= 0.0 {
                return Err(ColliError::InvalidGeometry(format!(
                    "stage {i}: depth must be positive, got {} mm",
                    stage.depth
                )));
            }
            if !stage.outer_width.is_finite() || stage.outer_width <= 0.0 {
                return Err(ColliError::InvalidGeometry(format!(
                    "stage {i}: outer width must be positive, got {} mm",
                    stage.outer_width
                )));
            }
            if !stage.aperture.is_open() {
                if stage.aperture.half_width_at(0.0) < 0.0 || stage.aperture.half_width_at(1.0) < 0.0
                {
                    return Err(ColliError::InvalidGeometry(format!(
                        "stage {i}: negative aperture width"
                    )));
                }
                let widest = stage.aperture.max_width();
                if widest > stage.outer_width {
                    return Err(ColliError::InvalidGeometry(format!(
                        "stage {i}: aperture ({widest} mm) wider than outer width ({} mm)",
                        stage.outer_width
                    )));
                }
            }

            let mut thickness_sum = 0.0;
            for (j, layer) in stage.layers.iter().enumerate() {
                if !layer.thickness.is_finite() || layer.thickness < 0.0 {
                    return Err(ColliError::InvalidGeometry(format!(
                        "stage {i} layer {j}: thickness must be ≥ 0, got {} mm",
                        layer.thickness
                    )));
                }
                if layer.material_id.is_empty() {
                    return Err(ColliError::InvalidGeometry(format!(
                        "stage {i} layer {j}: empty material id"
                    )));
                }
                thickness_sum += layer.thickness;
            }
            if !stage.layers.is_empty()
                && (thickness_sum - stage.depth).abs() > LAYER_SUM_TOLERANCE_MM
            {
                return Err(ColliError::InvalidGeometry(format!(
                    "stage {i}: layer thicknesses sum to {thickness_sum} mm, stage depth is {} mm",
                    stage.depth
                )));
            }

            prev_z = stage.z_position;
            prev_exit = stage.exit_z();
        }

        if self.detector.z_position <= prev_exit {
            return Err(ColliError::InvalidGeometry(format!(
                "detector at {} mm must lie beyond the last stage exit at {} mm",
                self.detector.z_position, prev_exit
            )));
        }
        if !self.detector.width.is_finite() || self.detector.width <= 0.0 {
            return Err(ColliError::InvalidGeometry(format!(
                "detector width must be positive, got {} mm",
                self.detector.width
            )));
        }
        Ok(())
    }

    /// Exit face of the last stage [mm].
    pub fn last_exit_z(&self) -> Mm {
        self.stages.last().map(Stage::exit_z).unwrap_or(0.0)
    }

    /// Every material id referenced by any layer, in stage order.
    pub fn referenced_materials(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for stage in &self.stages {
            for layer in &stage.layers {
                if !ids.contains(&layer.material_id.as_str()) {
                    ids.push(&layer.material_id);
                }
            }
        }
        ids
    }
}
