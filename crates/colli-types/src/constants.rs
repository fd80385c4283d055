// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Electron rest mass energy (keV).
pub const ELECTRON_MASS_KEV: f64 = 511.0;

/// Classical electron radius r₀ (cm).
pub const CLASSICAL_ELECTRON_RADIUS_CM: f64 = 2.818e-13;

/// Compton wavelength λ_C (Angstrom).
pub const COMPTON_WAVELENGTH_ANGSTROM: f64 = 0.02426;

/// Thomson cross-section σ_T (cm²) - the α → 0 limit of Klein-Nishina.
pub const THOMSON_CROSS_SECTION_CM2: f64 = 6.6524e-25;

/// Optical depth above which transmission is treated as exactly zero.
pub const TAU_OVERFLOW: f64 = 700.0;

/// Upper edge of the build-up parametrization domain (mean free paths).
pub const BUILDUP_TAU_MAX: f64 = 40.0;
