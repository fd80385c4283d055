//! Interpolation on energy grids.
//!
//! Attenuation coefficients follow power laws between tabulated points,
//! so μ/ρ queries interpolate linearly in (ln E, ln μ). Build-up fit
//! parameters interpolate linearly in ln E only.

/// Floor applied before taking logarithms of coefficient values.
const LOG_FLOOR: f64 = 1e-30;

/// Log-log linear interpolation on a strictly increasing grid.
///
/// `query` must lie within [energies[0], energies[last]]; the caller is
/// responsible for the range check. An exact grid hit returns the
/// tabulated value. K-edge pairs are stored as two adjacent points a
/// fraction of a keV apart, so a query strictly between two points on
/// the same side of an edge never bridges the discontinuity.
pub fn loglog_interp(energies: &[f64], values: &[f64], query: f64) -> f64 {
    debug_assert_eq!(energies.len(), values.len());
    debug_assert!(!energies.is_empty());

    let n = energies.len();
    if query <= energies[0] {
        return values[0];
    }
    if query >= energies[n - 1] {
        return values[n - 1];
    }

    // First index with energy > query; segment is [hi-1, hi].
    let hi = energies.partition_point(|&e| e <= query);
    if energies[hi - 1] == query {
        return values[hi - 1];
    }

    let (e0, e1) = (energies[hi - 1], energies[hi]);
    let (v0, v1) = (values[hi - 1].max(LOG_FLOOR), values[hi].max(LOG_FLOOR));

    let t = (query.ln() - e0.ln()) / (e1.ln() - e0.ln());
    (v0.ln() + t * (v1.ln() - v0.ln())).exp()
}

/// Linear-in-value interpolation over ln(energy), clamped at the grid
/// ends. Used for build-up fit parameters, which may be negative.
pub fn logenergy_interp(energies: &[f64], values: &[f64], query: f64) -> f64 {
    debug_assert_eq!(energies.len(), values.len());
    debug_assert!(!energies.is_empty());

    let n = energies.len();
    if query <= energies[0] {
        return values[0];
    }
    if query >= energies[n - 1] {
        return values[n - 1];
    }

    let hi = energies.partition_point(|&e| e <= query);
    if energies[hi - 1] == query {
        return values[hi - 1];
    }

    let (e0, e1) = (energies[hi - 1], energies[hi]);
    let t = (query.ln() - e0.ln()) / (e1.ln() - e0.ln());
    values[hi - 1] + t * (values[hi] - values[hi - 1])
}
