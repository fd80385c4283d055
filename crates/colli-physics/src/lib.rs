// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Colli Physics
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Closed-form photon physics.
//!
//! Beer-Lambert attenuation with per-layer breakdown, HVL/TVL/MFP,
//! energy and thickness sweeps, Compton kinematics, Klein-Nishina
//! cross-sections, and the Kahn rejection sampler.

pub mod attenuation;
pub mod compton;
pub mod sampler;

pub use attenuation::{AttenuationBreakdown, HvlTvlResult, PhysicsEngine};
pub use sampler::{ComptonSample, KleinNishinaSampler};
