// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Units
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Unit conversions - the single bridge between external and core units.
//!
//! Core units:
//!   Length    : cm
//!   Energy    : keV
//!   Density   : g/cm³
//!   μ/ρ       : cm²/g
//!   μ         : cm⁻¹
//!   σ         : cm²
//!   Thickness : mfp (dimensionless)
//!   Angle     : radian
//!
//! External units:
//!   Length    : mm
//!   Energy    : keV or MeV
//!   Angle     : degree
//!
//! The aliases below appear in every public core signature so a call
//! site mixing mm with a cm parameter is visible in review.

use crate::error::{ColliError, ColliResult};
use std::f64::consts::PI;

pub type Cm = f64;
pub type Mm = f64;
pub type KeV = f64;
pub type MeV = f64;
pub type Mfp = f64;
pub type Radian = f64;
pub type Degree = f64;

/// Transmission floor for dB conversion, keeps log10 finite.
const TRANSMISSION_FLOOR: f64 = 1e-30;

// ── Length ──

/// External (mm) → core (cm).
pub fn mm_to_cm(mm: Mm) -> Cm {
    mm * 0.1
}

/// Core (cm) → external (mm).
pub fn cm_to_mm(cm: Cm) -> Mm {
    cm * 10.0
}

/// External (mm) → core (cm), rejecting negative or non-finite input.
pub fn checked_mm_to_cm(mm: Mm) -> ColliResult<Cm> {
    if !mm.is_finite() || mm < 0.0 {
        return Err(ColliError::InvalidUnit {
            quantity: "length_mm",
            value: mm,
        });
    }
    Ok(mm_to_cm(mm))
}

// ── Energy ──

pub fn mev_to_kev(mev: MeV) -> KeV {
    mev * 1000.0
}

pub fn kev_to_mev(kev: KeV) -> MeV {
    kev / 1000.0
}

/// Validate a photon energy (keV): finite and strictly positive.
pub fn checked_energy_kev(kev: KeV) -> ColliResult<KeV> {
    if !kev.is_finite() || kev <= 0.0 {
        return Err(ColliError::InvalidUnit {
            quantity: "energy_keV",
            value: kev,
        });
    }
    Ok(kev)
}

// ── Angle ──

pub fn deg_to_rad(deg: Degree) -> Radian {
    deg * (PI / 180.0)
}

pub fn rad_to_deg(rad: Radian) -> Degree {
    rad * (180.0 / PI)
}

// ── Optical thickness ──

/// Physical thickness [cm] × linear attenuation [cm⁻¹] → optical thickness [mfp].
pub fn thickness_to_mfp(thickness_cm: Cm, mu_per_cm: f64) -> Mfp {
    mu_per_cm * thickness_cm
}

/// Optical thickness [mfp] → physical thickness [cm].
pub fn mfp_to_thickness(mfp: Mfp, mu_per_cm: f64) -> ColliResult<Cm> {
    if !mu_per_cm.is_finite() || mu_per_cm <= 0.0 {
        return Err(ColliError::InvalidUnit {
            quantity: "mu_per_cm",
            value: mu_per_cm,
        });
    }
    Ok(mfp / mu_per_cm)
}

// ── Attenuation ──

/// Transmission ratio (0-1) → attenuation [dB, positive].
pub fn transmission_to_db(transmission: f64) -> f64 {
    -10.0 * transmission.max(TRANSMISSION_FLOOR).log10()
}

/// Attenuation [dB, positive] → transmission ratio.
pub fn db_to_transmission(db: f64) -> f64 {
    10.0_f64.powf(-db / 10.0)
}
