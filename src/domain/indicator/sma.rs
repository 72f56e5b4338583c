//! Simple Moving Average.
//!
//! SMA(n) = sum of the last n values / n. Undefined until n values exist.

/// Arithmetic mean of the last `period` elements of `series`.
pub fn sma(series: &[f64], period: usize) -> Option<f64> {
    let window = tail(series, period)?;
    Some(window.iter().sum::<f64>() / period as f64)
}

/// The last `period` elements, or `None` if the series is shorter.
pub(crate) fn tail(series: &[f64], period: usize) -> Option<&[f64]> {
    if period == 0 || series.len() < period {
        return None;
    }
    Some(&series[series.len() - period..])
}
