//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier x StdDev)
//! - Lower: Middle - (multiplier x StdDev)
//!
//! StdDev is the population standard deviation of the same n closes.

use super::sma::sma;
use super::stddev::population_stddev;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub lower: f64,
    pub middle: f64,
    pub upper: f64,
}

pub fn bollinger_bands(closes: &[f64], multiplier: f64, period: usize) -> Option<BollingerBands> {
    let middle = sma(closes, period)?;
    let stddev = population_stddev(closes, period)?;

    Some(BollingerBands {
        lower: middle - multiplier * stddev,
        middle,
        upper: middle + multiplier * stddev,
    })
}
