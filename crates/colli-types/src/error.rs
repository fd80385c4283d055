// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Error
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ColliError {
    #[error("invalid unit value for {quantity}: {value}")]
    InvalidUnit { quantity: &'static str, value: f64 },

    #[error("energy {energy_kev} keV outside tabulated range [{min_kev}, {max_kev}] keV for {material}")]
    OutOfRange {
        material: String,
        energy_kev: f64,
        min_kev: f64,
        max_kev: f64,
    },

    #[error("unknown material: {0}")]
    NotFound(String),

    #[error("alloy weight fractions sum to {sum}, expected 1.0 ± 1e-6")]
    InvalidComposition { sum: f64 },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),

    #[error("simulation cancelled")]
    Cancelled,

    #[error("numerical degeneracy: {context} (material {material}, {energy_kev} keV)")]
    NumericalDegeneracy {
        context: String,
        material: String,
        energy_kev: f64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ColliResult<T> = Result<T, ColliError>;
