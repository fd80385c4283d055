// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Colli Materials
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Material and build-up data services.
//!
//! Read-mostly stores loaded once at engine initialization and shared
//! immutably across parallel ray workers.

pub mod buildup;
pub mod database;
pub mod interp;

pub use buildup::{BuildUpEvaluation, BuildUpFactors};
pub use database::MaterialService;
