//! Statistic names shared by space reduction and zonal statistics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CubeError;

/// A reducer name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Min,
    Max,
    Mean,
    Median,
    Count,
    Var,
    Sd,
    Prod,
    Sum,
}

impl Statistic {
    pub const ALL: [Statistic; 9] = [
        Statistic::Min,
        Statistic::Max,
        Statistic::Mean,
        Statistic::Median,
        Statistic::Count,
        Statistic::Var,
        Statistic::Sd,
        Statistic::Prod,
        Statistic::Sum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Mean => "mean",
            Statistic::Median => "median",
            Statistic::Count => "count",
            Statistic::Var => "var",
            Statistic::Sd => "sd",
            Statistic::Prod => "prod",
            Statistic::Sum => "sum",
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Statistic {
    type Err = CubeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Statistic::ALL
            .iter()
            .copied()
            .find(|stat| stat.as_str() == s.trim())
            .ok_or_else(|| CubeError::invalid_argument(format!("unknown statistic '{}'", s)))
    }
}

/// Reduce a set of values with `stat`, ignoring non-finite inputs.
///
/// Returns NaN when no finite value is present, except for `count`,
/// which returns 0. `var` and `sd` are sample statistics (n - 1).
pub fn reduce(stat: Statistic, values: &mut Vec<f64>) -> f64 {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return if stat == Statistic::Count { 0.0 } else { f64::NAN };
    }

    match stat {
        Statistic::Count => values.len() as f64,
        Statistic::Sum => values.iter().sum(),
        Statistic::Prod => values.iter().product(),
        Statistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Statistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Statistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
        Statistic::Median => median_of(values),
        Statistic::Var | Statistic::Sd => {
            if values.len() < 2 {
                return f64::NAN;
            }
            // Welford
            let mut mean = 0.0;
            let mut m2 = 0.0;
            for (i, v) in values.iter().enumerate() {
                let delta = v - mean;
                mean += delta / (i + 1) as f64;
                m2 += delta * (v - mean);
            }
            let var = m2 / (values.len() - 1) as f64;
            if stat == Statistic::Sd {
                var.sqrt()
            } else {
                var
            }
        }
    }
}

/// Median of a non-empty slice of finite values; sorts in place.
pub fn median_of(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statistic() {
        assert_eq!("mean".parse::<Statistic>().unwrap(), Statistic::Mean);
        assert_eq!("sd".parse::<Statistic>().unwrap(), Statistic::Sd);
        assert!("average".parse::<Statistic>().is_err());
        assert!("MEAN".parse::<Statistic>().is_err());
    }

    #[test]
    fn test_reduce_ignores_non_finite() {
        let mut v = vec![1.0, f64::NAN, 3.0, f64::INFINITY];
        assert_eq!(reduce(Statistic::Mean, &mut v.clone()), 2.0);
        assert_eq!(reduce(Statistic::Count, &mut v.clone()), 2.0);
        assert_eq!(reduce(Statistic::Prod, &mut v), 3.0);
    }

    #[test]
    fn test_reduce_empty() {
        assert_eq!(reduce(Statistic::Count, &mut vec![]), 0.0);
        assert!(reduce(Statistic::Sum, &mut vec![f64::NAN]).is_nan());
        assert!(reduce(Statistic::Var, &mut vec![1.0]).is_nan());
    }

    #[test]
    fn test_variance() {
        let mut v = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let var = reduce(Statistic::Var, &mut v.clone());
        assert!((var - 32.0 / 7.0).abs() < 1e-12);
        let sd = reduce(Statistic::Sd, &mut v);
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_median() {
        assert_eq!(median_of(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_of(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median_of(&mut []).is_nan());
    }
}
