// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Colli Engine
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Beam transport engine.
//!
//! Deterministic 2-D ray tracing through multi-stage collimator
//! geometry, Beer-Lambert beam simulation with build-up composition and
//! quality metrics, the single/double Compton scatter tracer, and the
//! project container with version history.

pub mod beam;
pub mod project;
pub mod scatter;
pub mod tracer;

pub use beam::{BeamSimulation, SimulationContext};
pub use project::Project;
pub use scatter::ScatterTracer;
pub use tracer::{Ray, RayTracer, StageTraversal};
