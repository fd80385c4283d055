// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Scatter Tracer
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Stochastic Compton scatter tracer.
//!
//! Walks each primary ray's material segments in discrete steps,
//! samples Compton events against the local interaction probability,
//! and traces the scattered photons through the remaining geometry
//! with Beer-Lambert attenuation at their own energy. Second-order
//! scatter repeats the walk along the secondary's path.
//!
//! Each primary ray draws from its own counter-based RNG sub-stream
//! (seed + ray index), so a parallel schedule cannot reorder draws and
//! results depend only on (geometry, config, seed).

use crate::beam::{DetectorGrid, SimulationContext};
use crate::tracer::{Ray, RayTracer};
use colli_materials::MaterialService;
use colli_physics::attenuation::beer_lambert;
use colli_physics::{KleinNishinaSampler, PhysicsEngine};
use colli_types::config::SimulationConfig;
use colli_types::error::{ColliError, ColliResult};
use colli_types::geometry::CollimatorGeometry;
use colli_types::results::{ScatterAccounting, ScatterInteractionRecord};
use colli_types::units::{cm_to_mm, mm_to_cm};
use rayon::prelude::*;
use std::f64::consts::FRAC_PI_2;
use std::sync::atomic::Ordering;
use std::sync::atomic::AtomicUsize;

/// Segments shorter than this contribute no scatter [cm].
const MIN_SEGMENT_CM: f64 = 1e-8;

/// Linear attenuation below this is treated as vacuum [cm⁻¹].
const MIN_MU: f64 = 1e-12;

/// Scatter contribution of the rays, accumulated on the detector grid.
#[derive(Debug, Clone)]
pub struct ScatterOutcome {
    /// Σ surviving weights per detector bin.
    pub bin_sums: Vec<f64>,
    pub interactions: Vec<ScatterInteractionRecord>,
    pub accounting: ScatterAccounting,
}

/// Per-ray scatter tally, merged in ray order.
#[derive(Debug, Clone, Default)]
struct RayTally {
    bin_sums: Vec<(usize, f64)>,
    interactions: Vec<ScatterInteractionRecord>,
    escaped: usize,
    below_cutoff: usize,
}

/// Single/double-scatter Compton tracer over primary ray fans.
pub struct ScatterTracer<'a> {
    materials: &'a MaterialService,
    tracer: RayTracer,
}

impl<'a> ScatterTracer<'a> {
    pub fn new(materials: &'a MaterialService) -> Self {
        ScatterTracer {
            materials,
            tracer: RayTracer::new(),
        }
    }

    /// Run the scatter pass over the primary fan.
    pub fn run(
        &self,
        geometry: &CollimatorGeometry,
        config: &SimulationConfig,
        angles: &[f64],
        grid: &DetectorGrid,
        ctx: &SimulationContext,
    ) -> ColliResult<ScatterOutcome> {
        let energy_kev = config.energies_kev[0];
        let src_x_cm = mm_to_cm(geometry.source.x);
        let n = angles.len();
        let chunk_size = (n / 100).max(1);
        let indexed: Vec<(usize, f64)> = angles.iter().copied().enumerate().collect();
        let chunks: Vec<&[(usize, f64)]> = indexed.chunks(chunk_size).collect();
        let done = AtomicUsize::new(0);

        let process_chunk = |chunk: &[(usize, f64)]| -> ColliResult<Vec<RayTally>> {
            if ctx.cancelled() {
                return Err(ColliError::Cancelled);
            }
            let tallies = chunk
                .iter()
                .map(|&(ray_index, angle)| {
                    let ray = Ray {
                        origin_x: src_x_cm,
                        origin_z: 0.0,
                        angle,
                        energy_kev,
                    };
                    let mut sampler =
                        KleinNishinaSampler::for_ray(config.seed, ray_index as u64);
                    let mut tally = RayTally::default();
                    self.walk_ray(
                        geometry,
                        config,
                        grid,
                        &ray,
                        config.compton.max_scatter_order,
                        &mut sampler,
                        &mut tally,
                    )?;
                    Ok(tally)
                })
                .collect::<ColliResult<Vec<_>>>()?;
            let so_far = done.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
            ctx.report(so_far, n);
            Ok(tallies)
        };

        let nested: Vec<Vec<RayTally>> = if config.single_threaded {
            chunks
                .iter()
                .map(|&c| process_chunk(c))
                .collect::<ColliResult<Vec<_>>>()?
        } else {
            chunks
                .par_iter()
                .map(|&c| process_chunk(c))
                .collect::<ColliResult<Vec<_>>>()?
        };

        // Ordered merge keeps the output independent of thread timing.
        let mut bin_sums = vec![0.0f64; grid.n_bins];
        let mut interactions = Vec::new();
        let mut escaped = 0usize;
        let mut below_cutoff = 0usize;
        for tally in nested.into_iter().flatten() {
            for (bin, w) in tally.bin_sums {
                bin_sums[bin] += w;
            }
            interactions.extend(tally.interactions);
            escaped += tally.escaped;
            below_cutoff += tally.below_cutoff;
        }

        let reached = interactions
            .iter()
            .filter(|i| i.detector_x_mm.is_some())
            .count();
        let total_events = interactions.len() + below_cutoff;
        let mean_energy = if reached > 0 {
            interactions
                .iter()
                .filter(|i| i.detector_x_mm.is_some())
                .map(|i| i.scattered_energy_kev)
                .sum::<f64>()
                / reached as f64
        } else {
            0.0
        };

        Ok(ScatterOutcome {
            bin_sums,
            accounting: ScatterAccounting {
                interactions: total_events,
                reached_detector: reached,
                escaped,
                below_cutoff,
                escaped_fraction: if total_events > 0 {
                    escaped as f64 / total_events as f64
                } else {
                    0.0
                },
                mean_scattered_energy_kev: mean_energy,
            },
            interactions,
        })
    }

    /// Walk a ray's material segments, sampling scatter events.
    /// `order` counts remaining scatter generations.
    #[allow(clippy::too_many_arguments)]
    fn walk_ray(
        &self,
        geometry: &CollimatorGeometry,
        config: &SimulationConfig,
        grid: &DetectorGrid,
        ray: &Ray,
        order: u8,
        sampler: &mut KleinNishinaSampler,
        tally: &mut RayTally,
    ) -> ColliResult<()> {
        if order == 0 {
            return Ok(());
        }
        let physics = PhysicsEngine::new(self.materials, None);
        let step_cm = mm_to_cm(config.compton.step_size_mm);
        let traversals = self.tracer.trace(ray, geometry);
        let slope = ray.angle.tan();

        for traversal in &traversals {
            if traversal.passes_aperture {
                continue;
            }
            for segment in &traversal.segments {
                if segment.path_length < MIN_SEGMENT_CM {
                    continue;
                }
                let mu_total = physics.linear_mu(&segment.material_id, ray.energy_kev)?;
                let mu_compton =
                    physics.compton_linear_mu(&segment.material_id, ray.energy_kev)?;
                if mu_total < MIN_MU {
                    continue;
                }

                let n_steps = ((segment.path_length / step_cm) as usize).max(1);
                let actual_step = segment.path_length / n_steps as f64;
                // Compton branch of the per-step interaction probability
                let p_compton =
                    (mu_compton / mu_total) * (1.0 - beer_lambert(mu_total * actual_step));

                for step in 0..n_steps {
                    if sampler.uniform() >= p_compton {
                        continue;
                    }

                    // Interaction point along the segment's Z extent
                    let frac = (step as f64 + 0.5) / n_steps as f64;
                    let iz = segment.z_from + frac * (segment.z_to - segment.z_from);
                    let ix = ray.origin_x + (iz - ray.origin_z) * slope;

                    let sample = sampler.sample(ray.energy_kev);
                    if sample.scattered_energy_kev < config.compton.min_energy_cutoff_kev {
                        tally.below_cutoff += 1;
                        continue;
                    }

                    // Project the 3-D scatter cone onto the tracing
                    // plane: cos φ picks the lateral component.
                    let scatter_angle =
                        ray.angle + sample.theta_rad * sample.phi_rad.cos();
                    let generation = config.compton.max_scatter_order - order + 1;

                    if scatter_angle.abs() >= FRAC_PI_2 {
                        // Sideways/backward: never reaches the detector
                        tally.escaped += 1;
                        tally.interactions.push(ScatterInteractionRecord {
                            x_cm: ix,
                            z_cm: iz,
                            stage_index: traversal.stage_index,
                            material_id: segment.material_id.clone(),
                            incident_energy_kev: ray.energy_kev,
                            scattered_energy_kev: sample.scattered_energy_kev,
                            scatter_angle_rad: sample.theta_rad,
                            order: generation,
                            detector_x_mm: None,
                            weight: 0.0,
                        });
                        continue;
                    }

                    let secondary = Ray {
                        origin_x: ix,
                        origin_z: iz,
                        angle: scatter_angle,
                        energy_kev: sample.scattered_energy_kev,
                    };

                    // Attenuate the secondary through the remaining
                    // geometry at its own energy.
                    let mut tau = 0.0;
                    for t in &self.tracer.trace(&secondary, geometry) {
                        for s in &t.segments {
                            let mu =
                                physics.linear_mu(&s.material_id, secondary.energy_kev)?;
                            tau += mu * s.path_length;
                        }
                    }
                    let weight = beer_lambert(tau);

                    let det_x_mm =
                        cm_to_mm(self.tracer.detector_position(&secondary, geometry));
                    let bin = grid.bin_of(det_x_mm);
                    let lands = bin.is_some();

                    tally.interactions.push(ScatterInteractionRecord {
                        x_cm: ix,
                        z_cm: iz,
                        stage_index: traversal.stage_index,
                        material_id: segment.material_id.clone(),
                        incident_energy_kev: ray.energy_kev,
                        scattered_energy_kev: sample.scattered_energy_kev,
                        scatter_angle_rad: sample.theta_rad,
                        order: generation,
                        detector_x_mm: if lands { Some(det_x_mm) } else { None },
                        weight: if lands { weight } else { 0.0 },
                    });

                    match bin {
                        Some(b) => tally.bin_sums.push((b, weight)),
                        None => tally.escaped += 1,
                    }

                    // Higher-order scatter along the secondary's path
                    if order > 1 {
                        self.walk_ray(
                            geometry,
                            config,
                            grid,
                            &secondary,
                            order - 1,
                            sampler,
                            tally,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}
