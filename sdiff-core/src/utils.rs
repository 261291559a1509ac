//! Schedule math: pure numeric routines used to build noise schedules.

use crate::{Error, Result};

/// Returns `steps` values evenly spaced between `start` and `end`.
///
/// When `include_end` is set the last value is `end`, otherwise the spacing
/// is `(end - start) / steps` and the last value stops short of `end`. A
/// single step yields just `start`.
pub fn linspace(start: f32, end: f32, steps: usize, include_end: bool) -> Result<Vec<f32>> {
    if end <= start {
        return Err(Error::InvalidRange {
            op: "linspace",
            start,
            end,
        });
    }
    if steps == 0 {
        return Err(Error::InvalidStepCount {
            op: "linspace",
            steps,
        });
    }
    if steps == 1 {
        return Ok(vec![start]);
    }
    let divisor = if include_end { steps - 1 } else { steps };
    let step_size = (end - start) / divisor as f32;
    Ok((0..steps)
        .map(|step| start + step as f32 * step_size)
        .collect())
}

/// Returns values from `start` (inclusive) to `end` (exclusive) stepped by
/// `step_size`, `ceil((end - start) / step_size)` of them in total.
pub fn arange(start: f32, end: f32, step_size: f32) -> Result<Vec<f32>> {
    if end <= start {
        return Err(Error::InvalidRange {
            op: "arange",
            start,
            end,
        });
    }
    if step_size <= 1e-5 {
        return Err(Error::InvalidStepSize { step_size });
    }
    let steps = ((end - start) / step_size).ceil() as usize;
    Ok((0..steps)
        .map(|step| start + step as f32 * step_size)
        .collect())
}

/// Piecewise-linear interpolation of `values` over the sorted `range`,
/// evaluated at each query point.
///
/// Queries below `range[0]` clamp to `values[0]` and queries above the last
/// range entry clamp to the last value; an exact match returns the
/// corresponding value directly. This boundary policy governs how the noise
/// schedule is sampled at discretized timesteps and must not be altered.
pub fn interpolate(queries: &[f32], range: &[f32], values: &[f32]) -> Vec<f32> {
    queries
        .iter()
        .map(|&q| {
            match range.binary_search_by(|r| r.partial_cmp(&q).expect("NaN in interpolation")) {
                Ok(idx) => values[idx],
                Err(0) => values[0],
                Err(idx) if idx == range.len() => values[values.len() - 1],
                Err(idx) => {
                    let t = (q - range[idx - 1]) / (range[idx] - range[idx - 1]);
                    values[idx - 1] + t * (values[idx] - values[idx - 1])
                }
            }
        })
        .collect()
}

/// Definite integral of `f` over `[lower, upper]` by Romberg extrapolation
/// over iterated trapezoid refinement.
///
/// Converges to machine precision for the smooth polynomial integrands used
/// by the multistep scheduler coefficients.
pub fn integrate<F: Fn(f64) -> f64>(f: F, lower: f64, upper: f64) -> f64 {
    const MAX_DEPTH: usize = 12;
    const TOLERANCE: f64 = 1e-10;

    let h = upper - lower;
    let mut table = [[0f64; MAX_DEPTH]; MAX_DEPTH];
    table[0][0] = 0.5 * h * (f(lower) + f(upper));
    for i in 1..MAX_DEPTH {
        let points = 1usize << i;
        let h_i = h / points as f64;
        let mut sum = 0.0;
        for k in (1..points).step_by(2) {
            sum += f(lower + k as f64 * h_i);
        }
        table[i][0] = 0.5 * table[i - 1][0] + h_i * sum;
        for j in 1..=i {
            let factor = 4f64.powi(j as i32);
            table[i][j] = (factor * table[i][j - 1] - table[i - 1][j - 1]) / (factor - 1.0);
        }
        if (table[i][i] - table[i - 1][i - 1]).abs() < TOLERANCE {
            return table[i][i];
        }
    }
    table[MAX_DEPTH - 1][MAX_DEPTH - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_values() -> Result<()> {
        assert_eq!(
            linspace(0.0, 1.0, 5, true)?,
            [0.0, 0.25, 0.5, 0.75, 1.0]
        );
        let open = linspace(0.0, 1.0, 5, false)?;
        assert_eq!(open, [0.0, 0.2, 0.4, 0.6, 0.8]);
        assert!(open[4] < 1.0);
        assert_eq!(linspace(0.0, 1.0, 1, true)?, [0.0]);
        assert!(linspace(1.0, 1.0, 5, true).is_err());
        assert!(linspace(0.0, 1.0, 0, true).is_err());
        Ok(())
    }

    #[test]
    fn arange_values() -> Result<()> {
        assert_eq!(arange(0.0, 10.0, 2.5)?, [0.0, 2.5, 5.0, 7.5]);
        assert_eq!(arange(0.0, 3.0, 1.0)?.len(), 3);
        assert!(arange(5.0, 1.0, 1.0).is_err());
        assert!(arange(0.0, 1.0, 0.0).is_err());
        Ok(())
    }

    #[test]
    fn interpolate_clamps_and_matches() {
        let range = [0.0f32, 1.0, 2.0, 3.0];
        let values = [10.0f32, 20.0, 40.0, 80.0];
        let out = interpolate(&[-1.0, 0.0, 0.5, 2.0, 2.5, 9.0], &range, &values);
        assert_eq!(out, [10.0, 10.0, 15.0, 40.0, 60.0, 80.0]);
    }

    #[test]
    fn interpolate_continuous_at_knots() {
        let range = [0.0f32, 1.0, 2.0];
        let values = [0.0f32, 3.0, -1.0];
        let eps = 1e-4f32;
        let out = interpolate(&[1.0 - eps, 1.0, 1.0 + eps], &range, &values);
        assert!((out[0] - out[1]).abs() < 1e-3);
        assert!((out[2] - out[1]).abs() < 1e-3);
    }

    #[test]
    fn integrate_polynomials() {
        let int = integrate(|x| x * x, 0.0, 1.0);
        assert!((int - 1.0 / 3.0).abs() < 1e-9);
        let int = integrate(|x| 2.0 * x.powi(3) - x + 0.5, -1.0, 2.0);
        // Antiderivative: x^4 / 2 - x^2 / 2 + x / 2.
        assert!((int - 7.5).abs() < 1e-9);
        let int = integrate(|_| 1.0, 2.0, 5.0);
        assert!((int - 3.0).abs() < 1e-12);
    }
}
