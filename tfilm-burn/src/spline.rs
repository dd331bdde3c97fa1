use crate::error::{Result, TfilmError};

/// Minimum number of control points required for a cubic fit.
pub const MIN_SPLINE_POINTS: usize = 4;

/// Upsample a low-resolution signal with an interpolating cubic spline.
///
/// The input samples are treated as control points placed every `ratio` positions on the
/// high-resolution axis. The spline is evaluated at every integer position
/// `0..samples.len() * ratio`; positions after the last control point are extrapolated
/// with the last cubic piece.
///
/// # Arguments
///
/// * `samples` - Low-resolution samples (at least [MIN_SPLINE_POINTS]).
/// * `ratio` - Upsampling ratio (at least 1).
///
/// # Returns
///
/// The dense high-resolution signal of length `samples.len() * ratio`.
pub fn spline_upsample(samples: &[f32], ratio: usize) -> Result<Vec<f32>> {
    if ratio == 0 {
        return Err(TfilmError::ConfigurationError(
            "upsampling ratio must be at least 1".into(),
        ));
    }
    if samples.len() < MIN_SPLINE_POINTS {
        return Err(TfilmError::InvalidInputLength(format!(
            "cubic spline needs at least {MIN_SPLINE_POINTS} samples, got {}",
            samples.len()
        )));
    }
    if ratio == 1 {
        return Ok(samples.to_vec());
    }

    let spline = CubicSpline::not_a_knot(samples);
    let step = ratio as f64;

    Ok((0..samples.len() * ratio)
        .map(|i| spline.eval(i as f64 / step) as f32)
        .collect())
}

/// Cubic spline over unit-spaced knots, stored as knot values and second derivatives.
struct CubicSpline {
    y: Vec<f64>,
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit with not-a-knot end conditions (third derivative continuous at the second and
    /// second-to-last knots). Requires at least 4 knots.
    fn not_a_knot(samples: &[f32]) -> Self {
        let y: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        let n = y.len();

        // Unknowns are M_1..M_{n-2}. Substituting the end conditions
        // M_0 = 2 M_1 - M_2 and M_{n-1} = 2 M_{n-2} - M_{n-3} into the first and last
        // continuity equations leaves a tridiagonal system.
        let size = n - 2;
        let rhs: Vec<f64> = (1..n - 1)
            .map(|i| 6.0 * (y[i + 1] - 2.0 * y[i] + y[i - 1]))
            .collect();
        let mut sub = vec![1.0; size];
        let mut diag = vec![4.0; size];
        let mut sup = vec![1.0; size];
        sub[0] = 0.0;
        diag[0] = 6.0;
        sup[0] = 0.0;
        sub[size - 1] = 0.0;
        diag[size - 1] = 6.0;
        sup[size - 1] = 0.0;

        let inner = solve_tridiagonal(&sub, &diag, &sup, &rhs);

        let mut m = Vec::with_capacity(n);
        m.push(2.0 * inner[0] - inner[1]);
        m.extend_from_slice(&inner);
        m.push(2.0 * inner[size - 1] - inner[size - 2]);

        Self { y, m }
    }

    fn eval(&self, u: f64) -> f64 {
        let last = self.y.len() - 2;
        let k = (u.floor().max(0.0) as usize).min(last);
        let t = u - k as f64;
        let s = 1.0 - t;
        let (m0, m1) = (self.m[k], self.m[k + 1]);

        m0 * s * s * s / 6.0
            + m1 * t * t * t / 6.0
            + (self.y[k] - m0 / 6.0) * s
            + (self.y[k + 1] - m1 / 6.0) * t
    }
}

/// Thomas algorithm. The systems built here are diagonally dominant.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut d = vec![0.0; n];

    c[0] = sup[0] / diag[0];
    d[0] = rhs[0] / diag[0];
    for i in 1..n {
        let denom = diag[i] - sub[i] * c[i - 1];
        c[i] = sup[i] / denom;
        d[i] = (rhs[i] - sub[i] * d[i - 1]) / denom;
    }

    let mut x = vec![0.0; n];
    x[n - 1] = d[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d[i] - c[i] * x[i + 1];
    }
    x
}
