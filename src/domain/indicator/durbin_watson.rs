//! Durbin-Watson serial-correlation statistic.
//!
//! Regresses the last `lag` percent changes on the `lag` values one step
//! earlier (ordinary least squares, explicit scalar sums), then compares
//! successive residual differences against the residual energy:
//!
//! DW = sum((e[i] - e[i-1])^2 for i in 1..lag) / sum(e[i]^2)
//!
//! Near 2: no serial correlation. Below 2: positive autocorrelation.
//! Returns 4.0 when the residuals are identically zero.

/// Statistic reported when the residual sum of squares is zero.
pub const ZERO_RESIDUAL_SENTINEL: f64 = 4.0;

/// y = slope * x + intercept
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub intercept: f64,
    pub slope: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Least-squares fit of `y` on `x`. A regressor with no variance yields a
/// zero line rather than a division by zero.
pub fn linear_fit(x: &[f64], y: &[f64]) -> LinearFit {
    let n = x.len().min(y.len());
    if n == 0 {
        return LinearFit {
            intercept: 0.0,
            slope: 0.0,
        };
    }
    let (x, y) = (&x[..n], &y[..n]);
    let nf = n as f64;

    let mean_x = x.iter().sum::<f64>() / nf;
    let mean_y = y.iter().sum::<f64>() / nf;

    let sum_xy: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let sum_xx: f64 = x.iter().map(|a| a * a).sum();

    let s_xy = sum_xy - nf * mean_x * mean_y;
    let s_xx = sum_xx - nf * mean_x * mean_x;

    if s_xx == 0.0 {
        return LinearFit {
            intercept: 0.0,
            slope: 0.0,
        };
    }

    let slope = s_xy / s_xx;
    LinearFit {
        intercept: mean_y - slope * mean_x,
        slope,
    }
}

/// Durbin-Watson over the most recent `lag` percent changes.
///
/// Needs `lag + 1` observations; returns `None` before that.
pub fn durbin_watson(changes: &[f64], lag: usize) -> Option<f64> {
    if lag == 0 || changes.len() < lag + 1 {
        return None;
    }

    let start = changes.len() - lag - 1;
    let lagged = &changes[start..start + lag];
    let live = &changes[start + 1..start + 1 + lag];

    let fit = linear_fit(lagged, live);

    let residuals: Vec<f64> = lagged
        .iter()
        .zip(live)
        .map(|(&x, &y)| y - fit.predict(x))
        .collect();

    let sum_sq_residuals: f64 = residuals.iter().map(|e| e * e).sum();
    if sum_sq_residuals == 0.0 {
        return Some(ZERO_RESIDUAL_SENTINEL);
    }

    let sum_sq_diffs: f64 = residuals
        .windows(2)
        .map(|w| {
            let d = w[1] - w[0];
            d * d
        })
        .sum();

    Some(sum_sq_diffs / sum_sq_residuals)
}
