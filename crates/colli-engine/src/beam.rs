// ─────────────────────────────────────────────────────────────────────
// SCPN Collimator Core — Beam Simulation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Beam profile simulation.
//!
//! Orchestrates the ray tracer, the attenuation engine, and the
//! build-up composition into a per-bin detector profile with quality
//! metrics. The N-ray loop is an embarrassingly parallel reduction:
//! outcomes are collected in ray order and reduced sequentially, so
//! results are byte-identical regardless of thread count.

use crate::scatter::{ScatterOutcome, ScatterTracer};
use crate::tracer::{Ray, RayTracer, StageTraversal};
use colli_materials::{BuildUpFactors, MaterialService};
use colli_physics::attenuation::{beer_lambert, DOMINANT_TIE_MARGIN};
use colli_physics::{compton, PhysicsEngine};
use colli_types::config::{BuildUpMethod, SimulationConfig};
use colli_types::error::{ColliError, ColliResult};
use colli_types::geometry::{CollimatorGeometry, FocalSpotDistribution, Layer};
use colli_types::results::{
    ComptonAnalysis, DetectorBin, EnergyAnalysisRow, PenumbraMetric, QualityMetrics,
    SimulationResult, Warning,
};
use colli_types::units::{cm_to_mm, deg_to_rad, mev_to_kev, mm_to_cm, Mm};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotone result id counter, process-wide.
static NEXT_RESULT_ID: AtomicU64 = AtomicU64::new(1);

/// Detector bin count bounds.
const MIN_BINS: usize = 11;
const MAX_BINS: usize = 2001;

/// Primary intensity floor below which SPR is reported as zero.
const SPR_PRIMARY_FLOOR: f64 = 1e-12;

/// Progress/cancellation plumbing supplied by the host worker. The
/// callback fires roughly once per percent of rays, never per ray.
#[derive(Default, Clone, Copy)]
pub struct SimulationContext<'a> {
    pub progress: Option<&'a (dyn Fn(u8) + Sync)>,
    pub cancel: Option<&'a AtomicBool>,
}

impl<'a> SimulationContext<'a> {
    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.map(|c| c.load(Ordering::Relaxed)).unwrap_or(false)
    }

    pub(crate) fn report(&self, done: usize, total: usize) {
        if let Some(cb) = self.progress {
            cb(((done * 100) / total.max(1)).min(100) as u8);
        }
    }
}

/// Fixed detector bin grid. Bin width derives from the angular
/// resolution projected onto the detector plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorGrid {
    pub n_bins: usize,
    pub x_min_mm: Mm,
    pub bin_width_mm: Mm,
}

impl DetectorGrid {
    pub fn from_geometry(geometry: &CollimatorGeometry, angular_resolution_deg: f64) -> Self {
        let width = geometry.detector.width;
        let sdd = geometry.detector.z_position;
        let angular_step = sdd * deg_to_rad(angular_resolution_deg).tan();
        let bin_width = angular_step
            .max(width / MAX_BINS as f64)
            .min(width / MIN_BINS as f64);
        let n_bins = (width / bin_width).ceil() as usize;
        DetectorGrid {
            n_bins,
            x_min_mm: -width / 2.0,
            bin_width_mm: width / n_bins as f64,
        }
    }

    pub fn bin_of(&self, x_mm: Mm) -> Option<usize> {
        let offset = x_mm - self.x_min_mm;
        if offset < 0.0 {
            return None;
        }
        let bin = (offset / self.bin_width_mm) as usize;
        if bin < self.n_bins {
            Some(bin)
        } else if x_mm <= self.x_min_mm + self.bin_width_mm * self.n_bins as f64 {
            // Right edge lands in the last bin
            Some(self.n_bins - 1)
        } else {
            None
        }
    }

    pub fn center_of(&self, bin: usize) -> Mm {
        self.x_min_mm + (bin as f64 + 0.5) * self.bin_width_mm
    }
}

/// Per-ray reduction record, collected in ray order. Carries the
/// observability flags the result record must surface: the build-up
/// τ-domain clamp and the dominant-material tie seen on this ray's
/// actual clipped path.
#[derive(Debug, Clone)]
struct RayOutcome {
    detector_x_mm: Mm,
    transmission: f64,
    transmission_no_buildup: f64,
    buildup_factor: f64,
    /// (material, τ) of the stage that overran the build-up domain.
    tau_clamp: Option<(String, f64)>,
    /// (dominant, runner-up) materials within the tie margin.
    dominant_tie: Option<(String, String)>,
}

/// Full beam simulation over a collimator geometry.
pub struct BeamSimulation<'a> {
    materials: &'a MaterialService,
    buildup: Option<&'a BuildUpFactors>,
    tracer: RayTracer,
    penumbra_fractions: (f64, f64),
}

impl<'a> BeamSimulation<'a> {
    pub fn new(materials: &'a MaterialService, buildup: Option<&'a BuildUpFactors>) -> Self {
        BeamSimulation {
            materials,
            buildup,
            tracer: RayTracer::new(),
            penumbra_fractions: (0.2, 0.8),
        }
    }

    /// Penumbra edge fractions; (0.2, 0.8) by default, (0.1, 0.9) and
    /// (0.5, 0.5) are the common alternates.
    pub fn with_penumbra_fractions(mut self, lower: f64, upper: f64) -> Self {
        self.penumbra_fractions = (lower, upper);
        self
    }

    /// Run the simulation. Blocking; progress and cancellation ride on
    /// the context. Cancellation yields `ColliError::Cancelled` and no
    /// partial result.
    pub fn run(
        &self,
        geometry: &CollimatorGeometry,
        config: &SimulationConfig,
        ctx: &SimulationContext,
    ) -> ColliResult<SimulationResult> {
        let start = std::time::Instant::now();
        geometry.validate()?;
        config.validate()?;

        // Resolve every referenced material up front.
        for id in geometry.referenced_materials() {
            self.materials.material(id)?;
        }

        let energy_kev = config.energies_kev[0];
        let physics = PhysicsEngine::new(self.materials, self.buildup);

        // Per-(stage, layer) linear attenuation at the profile energy.
        let mu_table: Vec<Vec<f64>> = geometry
            .stages
            .iter()
            .map(|stage| {
                stage
                    .layers
                    .iter()
                    .map(|l| physics.linear_mu(&l.material_id, energy_kev))
                    .collect::<ColliResult<Vec<f64>>>()
            })
            .collect::<ColliResult<Vec<_>>>()?;

        let mu_air = if config.include_air {
            physics.linear_mu("Air", energy_kev)?
        } else {
            0.0
        };

        let angles = self.tracer.ray_angles(config.ray_count, geometry);
        let outcomes = self.trace_all(geometry, config, &angles, &mu_table, mu_air, ctx)?;

        // ── Ordered reduction into the detector grid ──
        let grid = DetectorGrid::from_geometry(geometry, config.angular_resolution_deg);
        let n = grid.n_bins;
        let mut sum_with = vec![0.0f64; n];
        let mut sum_without = vec![0.0f64; n];
        let mut sum_buildup = vec![0.0f64; n];
        let mut counts = vec![0usize; n];
        let mut warnings: Vec<Warning> = Vec::new();
        for outcome in &outcomes {
            if let Some(bin) = grid.bin_of(outcome.detector_x_mm) {
                sum_with[bin] += outcome.transmission;
                sum_without[bin] += outcome.transmission_no_buildup;
                sum_buildup[bin] += outcome.buildup_factor;
                counts[bin] += 1;
            }
            if let Some((material, tau)) = &outcome.tau_clamp {
                push_warning(
                    &mut warnings,
                    Warning::BuildupTauClamped {
                        material: material.clone(),
                        tau: *tau,
                    },
                );
            }
            if let Some((first, second)) = &outcome.dominant_tie {
                push_warning(
                    &mut warnings,
                    Warning::DominantMaterialTie {
                        first: first.clone(),
                        second: second.clone(),
                    },
                );
            }
        }

        let ray_total = config.ray_count as f64;
        let mut mean_with = vec![0.0f64; n];
        let mut mean_without = vec![0.0f64; n];
        let mut mean_buildup = vec![1.0f64; n];
        let mut primary_per_ray = vec![0.0f64; n];
        for i in 0..n {
            if counts[i] > 0 {
                mean_with[i] = sum_with[i] / counts[i] as f64;
                mean_without[i] = sum_without[i] / counts[i] as f64;
                mean_buildup[i] = sum_buildup[i] / counts[i] as f64;
                primary_per_ray[i] = if config.include_buildup {
                    sum_with[i] / ray_total
                } else {
                    sum_without[i] / ray_total
                };
            }
        }

        // ── Focal-spot blur ──
        if geometry.source.focal_spot_size > 0.01 {
            if let Some(kernel) = focal_blur_width_bins(geometry, &grid) {
                let smooth = |values: &mut Vec<f64>| match geometry.source.focal_spot_distribution {
                    FocalSpotDistribution::Gaussian => {
                        *values = gaussian_smooth(values, kernel / 2.355)
                    }
                    FocalSpotDistribution::Uniform => *values = uniform_smooth(values, kernel),
                };
                smooth(&mut mean_with);
                smooth(&mut mean_without);
                smooth(&mut primary_per_ray);
            }
        }

        let primary_profile = if config.include_buildup {
            &mean_with
        } else {
            &mean_without
        };

        // Metrics run on covered bins only, so empty fan edges do not
        // masquerade as leakage.
        let covered: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();
        let positions: Vec<f64> = covered.iter().map(|&i| grid.center_of(i)).collect();
        let primary_vals: Vec<f64> = covered.iter().map(|&i| primary_profile[i]).collect();
        let no_buildup_vals: Vec<f64> = covered.iter().map(|&i| mean_without[i]).collect();
        let mut quality =
            quality_metrics(&positions, &primary_vals, &no_buildup_vals, self.penumbra_fractions);

        // ── Energy analysis over the full layer stack ──
        let all_layers: Vec<Layer> = geometry
            .stages
            .iter()
            .flat_map(|s| s.layers.iter().cloned())
            .collect();
        let mut energy_analysis: Vec<EnergyAnalysisRow> = Vec::new();
        for &e in &config.energies_kev {
            let breakdown =
                physics.transmission(&all_layers, e, config.include_buildup, config.buildup_method)?;
            for w in &breakdown.warnings {
                push_warning(&mut warnings, w.clone());
            }
            energy_analysis.push(EnergyAnalysisRow {
                energy_kev: e,
                total_tau: breakdown.total_tau,
                transmission: breakdown.transmission_no_buildup,
                transmission_with_buildup: breakdown.transmission,
                buildup_factor: breakdown.buildup_factor,
                attenuation_db: breakdown.attenuation_db,
                layers: breakdown.layers,
            });
        }
        if let Some(mev) = geometry.source.energy_mev {
            push_warning(
                &mut warnings,
                Warning::MonoenergeticMevApproximation {
                    energy_kev: mev_to_kev(mev),
                },
            );
        }

        // ── Scatter channel ──
        let mut scatter_per_ray = vec![0.0f64; n];
        let mut compton_analysis: Option<ComptonAnalysis> = None;
        if config.include_scatter && config.compton.enabled {
            if ctx.cancelled() {
                return Err(ColliError::Cancelled);
            }
            let scatter_tracer = ScatterTracer::new(self.materials);
            let outcome: ScatterOutcome =
                scatter_tracer.run(geometry, config, &angles, &grid, ctx)?;
            for i in 0..n {
                scatter_per_ray[i] = outcome.bin_sums[i] / ray_total;
            }

            let mut spr_profile = vec![0.0f64; n];
            for i in 0..n {
                if primary_per_ray[i] > SPR_PRIMARY_FLOOR {
                    spr_profile[i] = scatter_per_ray[i] / primary_per_ray[i];
                }
            }
            let spr_covered: Vec<f64> = (0..n)
                .filter(|&i| primary_per_ray[i] > SPR_PRIMARY_FLOOR)
                .map(|i| spr_profile[i])
                .collect();
            if !spr_covered.is_empty() {
                quality.spr_mean = spr_covered.iter().sum::<f64>() / spr_covered.len() as f64;
                quality.spr_max = spr_covered.iter().cloned().fold(0.0, f64::max);
            }

            let dist = compton::klein_nishina_distribution(energy_kev, config.compton.angular_bins);
            let spectrum = compton::scattered_energy_spectrum(energy_kev, 100);
            compton_analysis = Some(ComptonAnalysis {
                angles_rad: dist.angles_rad,
                dsigma_domega: dist.dsigma_domega,
                scattered_energies_kev: dist.scattered_energies_kev,
                spectrum_energies_kev: spectrum.energy_bins_kev,
                spectrum_weights: spectrum.weights,
                interactions: outcome.interactions,
                scatter_profile: scatter_per_ray.clone(),
                spr_profile,
                accounting: outcome.accounting,
            });

            if config.compton.max_scatter_order == 1 {
                push_warning(&mut warnings, Warning::SingleScatterOnly);
            }
        }

        // ── Assemble the immutable result document ──
        let profile: Vec<DetectorBin> = (0..n)
            .map(|i| DetectorBin {
                bin_index: i,
                position_mm: grid.center_of(i),
                primary: primary_per_ray[i],
                scatter: scatter_per_ray[i],
                total: primary_per_ray[i] + scatter_per_ray[i],
                transmission: primary_profile[i],
                buildup_factor: mean_buildup[i],
            })
            .collect();

        Ok(SimulationResult {
            result_id: NEXT_RESULT_ID.fetch_add(1, Ordering::Relaxed),
            created_at_unix_s: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            energy_kev,
            ray_count: config.ray_count,
            include_buildup: config.include_buildup,
            profile,
            energy_analysis,
            quality,
            compton: compton_analysis,
            warnings,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Trace every ray, chunked for progress/cancellation at ~1%
    /// granularity. Outcome order is the ray order in both the serial
    /// and the rayon path.
    fn trace_all(
        &self,
        geometry: &CollimatorGeometry,
        config: &SimulationConfig,
        angles: &[f64],
        mu_table: &[Vec<f64>],
        mu_air: f64,
        ctx: &SimulationContext,
    ) -> ColliResult<Vec<RayOutcome>> {
        let n = angles.len();
        let chunk_size = (n / 100).max(1);
        let chunks: Vec<&[f64]> = angles.chunks(chunk_size).collect();
        let done = AtomicUsize::new(0);

        let process_chunk = |chunk: &[f64]| -> ColliResult<Vec<RayOutcome>> {
            if ctx.cancelled() {
                return Err(ColliError::Cancelled);
            }
            let outcomes = chunk
                .iter()
                .map(|&angle| self.trace_one(geometry, config, angle, mu_table, mu_air))
                .collect::<ColliResult<Vec<_>>>()?;
            let so_far = done.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
            ctx.report(so_far, n);
            Ok(outcomes)
        };

        let nested: Vec<Vec<RayOutcome>> = if config.single_threaded {
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

        Ok(nested.into_iter().flatten().collect())
    }

    fn trace_one(
        &self,
        geometry: &CollimatorGeometry,
        config: &SimulationConfig,
        angle: f64,
        mu_table: &[Vec<f64>],
        mu_air: f64,
    ) -> ColliResult<RayOutcome> {
        let energy_kev = config.energies_kev[0];
        let ray = Ray {
            origin_x: mm_to_cm(geometry.source.x),
            origin_z: 0.0,
            angle,
            energy_kev,
        };
        let traversals = self.tracer.trace(&ray, geometry);

        // Per-stage optical depth and dominant material.
        let mut total_tau = 0.0;
        let mut material_path_cm = 0.0;
        let mut stage_pairs: Vec<(String, f64)> = Vec::new();
        let mut dominant_tie: Option<(String, String)> = None;
        for traversal in &traversals {
            if traversal.passes_aperture {
                continue;
            }
            let (stage_tau, dominant, tie) = stage_tau_and_dominant(traversal, mu_table);
            total_tau += stage_tau;
            material_path_cm += traversal.total_path;
            if stage_tau > 0.0 {
                stage_pairs.push((dominant, stage_tau));
            }
            if dominant_tie.is_none() {
                dominant_tie = tie;
            }
        }

        let t0 = beer_lambert(total_tau);
        let mut buildup_factor = 1.0;
        let mut tau_clamp: Option<(String, f64)> = None;
        if config.include_buildup && total_tau > 0.0 {
            if let Some(bf) = self.buildup {
                let eval = bf.multilayer(&stage_pairs, energy_kev, config.buildup_method)?;
                buildup_factor = eval.factor;
                if eval.tau_clamped {
                    tau_clamp = clamped_stage(&stage_pairs, config.buildup_method, total_tau);
                }
            }
        }
        let mut t_with = (buildup_factor * t0).min(1.0);
        let mut t_without = t0;

        let det_z_cm = mm_to_cm(geometry.detector.z_position);
        let cos_angle = angle.cos();

        if config.include_air && mu_air > 1e-15 {
            let total_ray_path = if cos_angle.abs() > 1e-10 {
                det_z_cm / cos_angle
            } else {
                det_z_cm
            };
            let air_path = (total_ray_path - material_path_cm).max(0.0);
            let air_factor = beer_lambert(mu_air * air_path);
            t_with *= air_factor;
            t_without *= air_factor;
        }

        if config.include_inverse_square {
            let r_ref_cm = mm_to_cm(geometry.stages[0].z_position).max(0.1);
            let det_dx = det_z_cm * angle.tan();
            let r_sq = (det_dx * det_dx + det_z_cm * det_z_cm).max(0.01);
            let factor = (r_ref_cm * r_ref_cm) / r_sq;
            t_with *= factor;
            t_without *= factor;
        }

        Ok(RayOutcome {
            detector_x_mm: cm_to_mm(self.tracer.detector_position(&ray, geometry)),
            transmission: t_with,
            transmission_no_buildup: t_without,
            buildup_factor,
            tau_clamp,
            dominant_tie,
        })
    }
}

/// Stage optical depth, its dominant (largest-τ) material, and the
/// runner-up pair when a different material lands within the tie
/// margin. Same rule as the slab-stack dominant selection.
fn stage_tau_and_dominant(
    traversal: &StageTraversal,
    mu_table: &[Vec<f64>],
) -> (f64, String, Option<(String, String)>) {
    let mus = &mu_table[traversal.stage_index];
    let segment_taus: Vec<(&str, f64)> = traversal
        .segments
        .iter()
        .map(|s| (s.material_id.as_str(), mus[s.layer_index] * s.path_length))
        .collect();
    let stage_tau: f64 = segment_taus.iter().map(|(_, tau)| tau).sum();

    let best = match segment_taus.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
        Some(best) => best,
        None => return (stage_tau, String::new(), None),
    };
    let runner_up = segment_taus
        .iter()
        .filter(|(id, _)| *id != best.0)
        .max_by(|a, b| a.1.total_cmp(&b.1));

    let tie = runner_up.and_then(|second| {
        if best.1 > 0.0 && (best.1 - second.1) / best.1 < DOMINANT_TIE_MARGIN {
            Some((best.0.to_string(), second.0.to_string()))
        } else {
            None
        }
    });
    (stage_tau, best.0.to_string(), tie)
}

/// Payload for the τ-domain warning: the stage whose τ overran the
/// parametrization under the active composition method.
fn clamped_stage(
    stage_pairs: &[(String, f64)],
    method: BuildUpMethod,
    total_tau: f64,
) -> Option<(String, f64)> {
    match method {
        // Last-material evaluates the final stage at the total τ
        BuildUpMethod::GpLastMaterial => stage_pairs
            .last()
            .map(|(material, _)| (material.clone(), total_tau)),
        BuildUpMethod::GpSequential | BuildUpMethod::Taylor => stage_pairs
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(material, tau)| (material.clone(), *tau)),
    }
}

/// Append a warning unless one of the same kind is already recorded;
/// the result record carries one advisory per kind.
fn push_warning(warnings: &mut Vec<Warning>, warning: Warning) {
    let kind = std::mem::discriminant(&warning);
    if !warnings.iter().any(|w| std::mem::discriminant(w) == kind) {
        warnings.push(warning);
    }
}

/// Width of the focal-spot blur kernel in bins, from similar triangles:
/// ug = focal · ODD / SOD with the last stage midpoint as the object.
fn focal_blur_width_bins(geometry: &CollimatorGeometry, grid: &DetectorGrid) -> Option<f64> {
    let last = geometry.stages.last()?;
    let object_z = last.z_position + last.depth / 2.0;
    let sod = object_z.abs();
    let odd = (geometry.detector.z_position - object_z).abs();
    if sod < 1e-6 {
        return None;
    }
    let ug_mm = geometry.source.focal_spot_size * odd / sod;
    let bins = ug_mm / grid.bin_width_mm;
    if bins > 1.0 {
        Some(bins)
    } else {
        None
    }
}

/// Discrete Gaussian smoothing with reflective edges; σ in bins.
fn gaussian_smooth(values: &[f64], sigma_bins: f64) -> Vec<f64> {
    if sigma_bins <= 0.5 || values.len() < 3 {
        return values.to_vec();
    }
    let radius = (3.0 * sigma_bins).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i as f64).powi(2) / (2.0 * sigma_bins * sigma_bins)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();
    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let mut j = i + k as isize - radius;
                if j < 0 {
                    j = -j;
                }
                if j >= n {
                    j = 2 * n - 2 - j;
                }
                acc += w * values[j.clamp(0, n - 1) as usize];
            }
            acc / norm
        })
        .collect()
}

/// Moving-average smoothing with clamped edges; width in bins.
fn uniform_smooth(values: &[f64], width_bins: f64) -> Vec<f64> {
    let half = (width_bins / 2.0).round() as isize;
    if half < 1 || values.len() < 3 {
        return values.to_vec();
    }
    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            let lo = (i - half).max(0);
            let hi = (i + half).min(n - 1);
            let slice = &values[lo as usize..=hi as usize];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Left and right crossings of `level`, linearly interpolated.
fn find_edges(pos: &[f64], vals: &[f64], level: f64) -> (f64, f64) {
    let n = vals.len();
    let mut left = pos[0];
    for i in 1..n {
        if vals[i] >= level && vals[i - 1] < level {
            let denom = (vals[i] - vals[i - 1]).max(1e-30);
            left = pos[i - 1] + (level - vals[i - 1]) / denom * (pos[i] - pos[i - 1]);
            break;
        }
    }
    let mut right = pos[n - 1];
    for i in (1..n).rev() {
        if vals[i - 1] >= level && vals[i] < level {
            let denom = (vals[i - 1] - vals[i]).max(1e-30);
            right = pos[i] - (level - vals[i]) / denom * (pos[i] - pos[i - 1]);
            break;
        }
    }
    (left, right)
}

/// Quality metrics from a covered-bin intensity profile.
fn quality_metrics(
    pos: &[f64],
    primary: &[f64],
    no_buildup: &[f64],
    fractions: (f64, f64),
) -> QualityMetrics {
    let mut metrics = QualityMetrics::default();
    if pos.len() < 3 {
        return metrics;
    }
    let i_max = primary.iter().cloned().fold(f64::MIN, f64::max);
    if i_max < 1e-12 {
        return metrics;
    }

    // FWHM
    let (fwhm_left, fwhm_right) = find_edges(pos, primary, i_max / 2.0);
    let fwhm = fwhm_right - fwhm_left;
    metrics.fwhm_mm = fwhm;

    // Penumbra between the two fractions, per side
    let (lower, upper) = fractions;
    let (left_lo, right_lo) = find_edges(pos, primary, lower * i_max);
    let (left_hi, right_hi) = find_edges(pos, primary, upper * i_max);
    let penumbra_left = (left_hi - left_lo).abs();
    let penumbra_right = (right_lo - right_hi).abs();
    metrics.penumbra = PenumbraMetric {
        left_mm: penumbra_left,
        right_mm: penumbra_right,
        general_mm: penumbra_left.max(penumbra_right),
        lower_fraction: lower,
        upper_fraction: upper,
    };

    // Flatness over the central 80% of FWHM
    let trim = 0.1 * fwhm;
    let useful: Vec<f64> = pos
        .iter()
        .zip(primary)
        .filter(|(&p, _)| p >= fwhm_left + trim && p <= fwhm_right - trim)
        .map(|(_, &v)| v)
        .collect();
    if !useful.is_empty() {
        let max_u = useful.iter().cloned().fold(f64::MIN, f64::max);
        let min_u = useful.iter().cloned().fold(f64::MAX, f64::min);
        if max_u + min_u > 0.0 {
            metrics.flatness = (max_u - min_u) / (max_u + min_u);
        }
    }

    // Leakage outside the FWHM edge plus the penumbra transition
    let margin = metrics.penumbra.general_mm;
    let leak_of = |vals: &[f64]| -> Option<(f64, f64)> {
        let leak: Vec<f64> = pos
            .iter()
            .zip(vals)
            .filter(|(&p, _)| p < fwhm_left - margin || p > fwhm_right + margin)
            .map(|(_, &v)| v)
            .collect();
        let primary_region: Vec<f64> = pos
            .iter()
            .zip(vals)
            .filter(|(&p, _)| p >= fwhm_left && p <= fwhm_right)
            .map(|(_, &v)| v)
            .collect();
        if leak.is_empty() || primary_region.is_empty() {
            return None;
        }
        let primary_mean = primary_region.iter().sum::<f64>() / primary_region.len() as f64;
        if primary_mean < 1e-12 {
            return None;
        }
        let mean = leak.iter().sum::<f64>() / leak.len() as f64 / primary_mean;
        let max = leak.iter().cloned().fold(0.0, f64::max) / primary_mean;
        Some((mean, max))
    };

    match leak_of(primary) {
        Some((mean, max)) => {
            metrics.leakage_mean = mean;
            metrics.leakage_max = max;
            let cr = 1.0 / mean.max(1e-30);
            metrics.collimation_ratio = cr;
            metrics.collimation_ratio_db = 10.0 * cr.log10();
        }
        None => {
            // No shielded region within the sampled fan
            metrics.collimation_ratio = 1e6;
            metrics.collimation_ratio_db = 60.0;
        }
    }
    if let Some((mean, max)) = leak_of(no_buildup) {
        metrics.leakage_mean_no_buildup = mean;
        metrics.leakage_max_no_buildup = max;
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_binning() {
        let grid = DetectorGrid {
            n_bins: 10,
            x_min_mm: -50.0,
            bin_width_mm: 10.0,
        };
        assert_eq!(grid.bin_of(-50.0), Some(0));
        assert_eq!(grid.bin_of(-0.1), Some(4));
        assert_eq!(grid.bin_of(0.1), Some(5));
        assert_eq!(grid.bin_of(49.9), Some(9));
        assert_eq!(grid.bin_of(50.0), Some(9));
        assert_eq!(grid.bin_of(51.0), None);
        assert_eq!(grid.bin_of(-51.0), None);
        assert!((grid.center_of(0) - -45.0).abs() < 1e-12);
    }

    #[test]
    fn test_find_edges_interpolates() {
        let pos = [0.0, 1.0, 2.0, 3.0, 4.0];
        let vals = [0.0, 0.0, 1.0, 0.0, 0.0];
        let (left, right) = find_edges(&pos, &vals, 0.5);
        assert!((left - 1.5).abs() < 1e-12);
        assert!((right - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_quality_metrics_rect_profile() {
        // Ideal step beam: 1.0 inside ±10, 0.01 outside
        let pos: Vec<f64> = (0..101).map(|i| i as f64 - 50.0).collect();
        let vals: Vec<f64> = pos
            .iter()
            .map(|&p| if p.abs() <= 10.0 { 1.0 } else { 0.01 })
            .collect();
        let m = quality_metrics(&pos, &vals, &vals, (0.2, 0.8));
        assert!((m.fwhm_mm - 21.0).abs() < 1.5, "fwhm = {}", m.fwhm_mm);
        // Leakage ≈ 1%
        assert!((m.leakage_mean - 0.01).abs() < 0.003, "leak = {}", m.leakage_mean);
        assert!(m.collimation_ratio > 50.0);
        // Flat top
        assert!(m.flatness < 0.01);
        // Symmetric penumbra
        assert!((m.penumbra.left_mm - m.penumbra.right_mm).abs() < 1e-9);
    }

    #[test]
    fn test_uniform_smooth_preserves_mass() {
        let vals = vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let out = uniform_smooth(&vals, 3.0);
        assert_eq!(out.len(), vals.len());
        // Peak spread but bounded
        assert!(out[2] < 1.0 && out[2] > 0.2);
    }

    #[test]
    fn test_gaussian_smooth_identity_for_tiny_sigma() {
        let vals = vec![0.1, 0.9, 0.2, 0.8];
        assert_eq!(gaussian_smooth(&vals, 0.1), vals);
    }

    #[test]
    fn test_push_warning_dedups_by_kind() {
        let mut warnings = Vec::new();
        push_warning(
            &mut warnings,
            Warning::BuildupTauClamped {
                material: "Pb".into(),
                tau: 41.0,
            },
        );
        // Same kind with a different payload is dropped
        push_warning(
            &mut warnings,
            Warning::BuildupTauClamped {
                material: "W".into(),
                tau: 55.0,
            },
        );
        push_warning(&mut warnings, Warning::SingleScatterOnly);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(
            warnings[0],
            Warning::BuildupTauClamped { ref material, .. } if material == "Pb"
        ));
    }

    #[test]
    fn test_clamped_stage_payload_follows_method() {
        let pairs = vec![("Pb".to_string(), 30.0), ("W".to_string(), 12.0)];
        let (material, tau) =
            clamped_stage(&pairs, BuildUpMethod::GpSequential, 42.0).unwrap();
        assert_eq!(material, "Pb");
        assert!((tau - 30.0).abs() < 1e-12);
        let (material, tau) =
            clamped_stage(&pairs, BuildUpMethod::GpLastMaterial, 42.0).unwrap();
        assert_eq!(material, "W");
        assert!((tau - 42.0).abs() < 1e-12);
    }
}
