//! Geometric ray tracing through multi-stage collimator geometry.
//!
//! The geometry is 2-D in the beam-axis plane: Z along the beam,
//! X lateral. A ray leaves the source at an angle in (−π/2, π/2) from
//! the beam axis, so it always advances in Z.
//!
//! Per stage the tracer decides between three outcomes: the ray misses
//! the body, the ray clears the aperture silhouette at both faces, or
//! the ray crosses material. In the material case the in-stage segment
//! is cut at layer boundaries and clipped against the aperture
//! silhouette and the body edge exactly (both are linear in Z), giving
//! one (material, path length) segment per layer traversed.
//!
//! All internal computation in core units: cm, radian, keV.
//! Geometry documents arrive in mm and are converted here.

use colli_types::geometry::{CollimatorGeometry, CollimatorType, Stage};
use colli_types::units::{mm_to_cm, Cm, KeV, Radian};

/// Fraction of the widest body half-width added to the slit/pencil
/// angle span so the leakage region is always sampled.
const LEAKAGE_MARGIN_FRACTION: f64 = 0.2;

/// Aperture-subtence multiplier for slit/pencil ray fans.
const APERTURE_SPAN_FACTOR: f64 = 3.0;

/// A single ray in the beam-axis plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Origin X [cm].
    pub origin_x: Cm,
    /// Origin Z [cm]. 0 for primary rays, interaction point for
    /// secondaries.
    pub origin_z: Cm,
    /// Angle from the beam axis, positive toward +X [radian].
    pub angle: Radian,
    /// Photon energy [keV].
    pub energy_kev: KeV,
}

impl Ray {
    /// Lateral position where the ray crosses a given Z plane [cm].
    pub fn x_at(&self, z: Cm) -> Cm {
        self.origin_x + (z - self.origin_z) * self.angle.tan()
    }
}

/// Path through one material layer [cm].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSegment {
    pub material_id: String,
    pub layer_index: usize,
    /// Path length along the ray inside the layer material [cm].
    pub path_length: Cm,
    /// Z extent of the traversed material [cm].
    pub z_from: Cm,
    pub z_to: Cm,
}

/// Per-stage intersection result.
#[derive(Debug, Clone, PartialEq)]
pub struct StageTraversal {
    pub stage_index: usize,
    /// True when the ray crossed no material in this stage (aperture
    /// pass, body miss, or stage behind the ray origin).
    pub passes_aperture: bool,
    pub segments: Vec<LayerSegment>,
    /// Σ segment path lengths [cm].
    pub total_path: Cm,
}

/// Precomputed stage extents in core units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLayout {
    pub z_entry: Cm,
    pub z_exit: Cm,
    pub half_width: Cm,
}

/// Deterministic geometric ray tracer. Stateless; one instance may
/// serve any number of threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayTracer;

impl RayTracer {
    pub fn new() -> Self {
        RayTracer
    }

    /// Stage extents converted to core units [cm].
    pub fn stage_layouts(geometry: &CollimatorGeometry) -> Vec<StageLayout> {
        geometry
            .stages
            .iter()
            .map(|s| StageLayout {
                z_entry: mm_to_cm(s.z_position),
                z_exit: mm_to_cm(s.exit_z()),
                half_width: mm_to_cm(s.outer_width) / 2.0,
            })
            .collect()
    }

    /// Trace a ray through every stage in beam order.
    ///
    /// Stages fully behind the ray origin pass freely, so the same
    /// routine serves secondary rays launched from interaction points
    /// inside the geometry.
    pub fn trace(&self, ray: &Ray, geometry: &CollimatorGeometry) -> Vec<StageTraversal> {
        let layouts = Self::stage_layouts(geometry);
        geometry
            .stages
            .iter()
            .enumerate()
            .map(|(i, stage)| self.trace_stage(ray, stage, &layouts[i], i))
            .collect()
    }

    /// True when the ray crosses no material anywhere.
    pub fn passes_all(&self, ray: &Ray, geometry: &CollimatorGeometry) -> bool {
        self.trace(ray, geometry)
            .iter()
            .all(|t| t.passes_aperture)
    }

    /// Deterministic fan of `n` ray angles for the collimator type.
    ///
    /// Fan beam: uniform over the span of the widest body. Pencil and
    /// slit: uniform over the aperture subtence plus a leakage margin.
    pub fn ray_angles(&self, n: usize, geometry: &CollimatorGeometry) -> Vec<Radian> {
        let layouts = Self::stage_layouts(geometry);
        if layouts.is_empty() || n == 0 {
            return vec![0.0; n];
        }

        let src_x = mm_to_cm(geometry.source.x);
        let max_half_w = layouts
            .iter()
            .map(|l| l.half_width)
            .fold(f64::MIN, f64::max);
        // Farthest body extent, so edge rays still meet the last body.
        let dz_max = layouts
            .iter()
            .map(|l| l.z_exit)
            .fold(f64::MIN, f64::max)
            .max(1e-10);

        let lateral = match geometry.kind {
            CollimatorType::FanBeam => (max_half_w - src_x.abs()).max(1e-6),
            CollimatorType::Slit | CollimatorType::PencilBeam => {
                let ap_half = geometry
                    .stages
                    .iter()
                    .map(|s| {
                        if s.aperture.is_open() {
                            mm_to_cm(s.outer_width) / 2.0
                        } else {
                            mm_to_cm(s.aperture.max_width()) / 2.0
                        }
                    })
                    .fold(0.0, f64::max);
                (APERTURE_SPAN_FACTOR * ap_half + LEAKAGE_MARGIN_FRACTION * max_half_w)
                    .min(max_half_w)
            }
        };
        let half_angle = lateral.atan2(dz_max);

        if n == 1 {
            return vec![0.0];
        }
        (0..n)
            .map(|i| -half_angle + 2.0 * half_angle * i as f64 / (n - 1) as f64)
            .collect()
    }

    /// Signed lateral position on the detector plane [cm].
    pub fn detector_position(&self, ray: &Ray, geometry: &CollimatorGeometry) -> Cm {
        ray.x_at(mm_to_cm(geometry.detector.z_position))
    }

    fn trace_stage(
        &self,
        ray: &Ray,
        stage: &Stage,
        layout: &StageLayout,
        stage_index: usize,
    ) -> StageTraversal {
        let free = |idx| StageTraversal {
            stage_index: idx,
            passes_aperture: true,
            segments: Vec::new(),
            total_path: 0.0,
        };

        // Clip to the ray origin; a stage fully behind it is free.
        let z_start = layout.z_entry.max(ray.origin_z);
        if z_start >= layout.z_exit {
            return free(stage_index);
        }

        let x_in = ray.x_at(z_start);
        let x_out = ray.x_at(layout.z_exit);
        let hw = layout.half_width;

        // Same-side body miss: both endpoints beyond the same edge.
        if (x_in > hw && x_out > hw) || (x_in < -hw && x_out < -hw) {
            return free(stage_index);
        }

        // Full aperture pass. The silhouette and the ray are both
        // linear in Z, so checking the two faces suffices.
        if stage.aperture.is_open() {
            return free(stage_index);
        }
        let depth = layout.z_exit - layout.z_entry;
        let t_in = (z_start - layout.z_entry) / depth;
        let a_in = mm_to_cm(stage.aperture.half_width_at(t_in));
        let a_out = mm_to_cm(stage.aperture.half_width_at(1.0));
        // Strict: a zero-width aperture passes nothing, including the
        // axial ray.
        if x_in.abs() < a_in && x_out.abs() < a_out {
            return free(stage_index);
        }

        // Material crossing: clip each layer span against the aperture
        // silhouette and the body edge.
        let cos_angle = ray.angle.cos();
        let path_scale = if cos_angle.abs() > 1e-12 {
            1.0 / cos_angle
        } else {
            1.0
        };

        let mut segments = Vec::new();
        let mut z_a = layout.z_entry;
        for (layer_index, layer) in stage.layers.iter().enumerate() {
            let z_b = z_a + mm_to_cm(layer.thickness);
            let lo = z_a.max(z_start);
            let hi = z_b.min(layout.z_exit);
            if hi > lo && layer.thickness > 0.0 {
                let dz = self.material_extent(ray, stage, layout, lo, hi);
                if dz > 1e-12 {
                    segments.push(LayerSegment {
                        material_id: layer.material_id.clone(),
                        layer_index,
                        path_length: dz * path_scale,
                        z_from: lo,
                        z_to: hi,
                    });
                }
            }
            z_a = z_b;
        }

        let total_path: f64 = segments.iter().map(|s| s.path_length).sum();
        StageTraversal {
            stage_index,
            passes_aperture: segments.is_empty(),
            segments,
            total_path,
        }
    }

    /// Z extent within [lo, hi] where the ray lies in stage material:
    /// inside the body edge and outside the aperture silhouette.
    fn material_extent(
        &self,
        ray: &Ray,
        stage: &Stage,
        layout: &StageLayout,
        lo: Cm,
        hi: Cm,
    ) -> Cm {
        // Split at the X = 0 crossing so |x(z)| is linear per piece.
        let x_lo = ray.x_at(lo);
        let x_hi = ray.x_at(hi);
        let mut pieces: [(f64, f64); 2] = [(lo, hi), (0.0, -1.0)];
        if x_lo * x_hi < 0.0 {
            let z_zero = lo + (hi - lo) * (0.0 - x_lo) / (x_hi - x_lo);
            pieces = [(lo, z_zero), (z_zero, hi)];
        }

        let depth = layout.z_exit - layout.z_entry;
        let a_entry = mm_to_cm(stage.aperture.half_width_at(0.0));
        let a_exit = mm_to_cm(stage.aperture.half_width_at(1.0));
        let aperture_at = |z: f64| {
            let t = (z - layout.z_entry) / depth;
            a_entry + t * (a_exit - a_entry)
        };

        let mut total = 0.0;
        for &(p, q) in &pieces {
            if q <= p {
                continue;
            }
            let mid_sign = if ray.x_at(0.5 * (p + q)) >= 0.0 { 1.0 } else { -1.0 };
            let sx = |z: f64| mid_sign * ray.x_at(z);

            // Inside the body: hw − s·x(z) ≥ 0
            let body = interval_nonneg(p, q, layout.half_width - sx(p), layout.half_width - sx(q));
            // Outside the aperture: s·x(z) − a(z) ≥ 0
            let shield = interval_nonneg(p, q, sx(p) - aperture_at(p), sx(q) - aperture_at(q));

            if let (Some((b0, b1)), Some((s0, s1))) = (body, shield) {
                let from = b0.max(s0);
                let to = b1.min(s1);
                if to > from {
                    total += to - from;
                }
            }
        }
        total
    }
}

/// Sub-interval of [p, q] where a linear function with endpoint values
/// g_p, g_q is non-negative.
fn interval_nonneg(p: f64, q: f64, g_p: f64, g_q: f64) -> Option<(f64, f64)> {
    match (g_p >= 0.0, g_q >= 0.0) {
        (true, true) => Some((p, q)),
        (false, false) => None,
        (true, false) => {
            let r = p + (q - p) * g_p / (g_p - g_q);
            Some((p, r))
        }
        (false, true) => {
            let r = p + (q - p) * g_p / (g_p - g_q);
            Some((r, q))
        }
    }
}
