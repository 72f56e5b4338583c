//! Population standard deviation.
//!
//! STDDEV(n) = sqrt(sum((x - mean)^2) / n) over the last n values.
//! Divides by N, not N-1.

use super::sma::tail;

pub fn population_stddev(series: &[f64], period: usize) -> Option<f64> {
    let window = tail(series, period)?;
    let mean = window.iter().sum::<f64>() / period as f64;

    let variance: f64 = window
        .iter()
        .map(|x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / period as f64;

    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stddev_constant_values() {
        let v = population_stddev(&[100.0, 100.0, 100.0, 100.0], 3).unwrap();
        assert!((v - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stddev_basic_calculation() {
        let v = population_stddev(&[10.0, 20.0, 30.0], 3).unwrap();
        let mean: f64 = 20.0;
        let expected: f64 =
            ((10.0 - mean).powi(2) + (20.0 - mean).powi(2) + (30.0 - mean).powi(2)) / 3.0;
        assert!((v - expected.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn stddev_known_values() {
        let v = population_stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8).unwrap();
        assert!((v - 2.0).abs() < 1e-10);
    }

    #[test]
    fn stddev_uses_only_tail() {
        let v = population_stddev(&[1e9, 2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8).unwrap();
        assert!((v - 2.0).abs() < 1e-10);
    }

    #[test]
    fn stddev_not_ready() {
        assert_eq!(population_stddev(&[1.0, 2.0], 3), None);
    }
}
