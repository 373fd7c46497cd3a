//! Streaming per-zone statistics.
//!
//! An [`Aggregator`] holds one cell per `(feature, local time)` pair,
//! addressed as `feature * nt + t`. Non-finite inputs are ignored.

use datacube::statistic::median_of;
use datacube::{CubeError, Result, Statistic};

#[derive(Debug, Clone)]
enum State {
    Count(Vec<f64>),
    /// NaN marks a cell without input.
    Sum(Vec<f64>),
    Prod(Vec<f64>),
    Mean { sum: Vec<f64>, n: Vec<u64> },
    Min(Vec<f64>),
    Max(Vec<f64>),
    Median(Vec<Vec<f64>>),
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    stat: Statistic,
    nt: usize,
    state: State,
}

impl Aggregator {
    /// Whether zonal aggregation implements `stat`.
    pub fn supports(stat: Statistic) -> bool {
        !matches!(stat, Statistic::Var | Statistic::Sd)
    }

    pub fn new(stat: Statistic, nfeatures: usize, nt: usize) -> Result<Self> {
        let cells = nfeatures * nt;
        let state = match stat {
            Statistic::Count => State::Count(vec![0.0; cells]),
            Statistic::Sum => State::Sum(vec![f64::NAN; cells]),
            Statistic::Prod => State::Prod(vec![f64::NAN; cells]),
            Statistic::Mean => State::Mean {
                sum: vec![0.0; cells],
                n: vec![0; cells],
            },
            Statistic::Min => State::Min(vec![f64::INFINITY; cells]),
            Statistic::Max => State::Max(vec![f64::NEG_INFINITY; cells]),
            Statistic::Median => State::Median(vec![Vec::new(); cells]),
            Statistic::Var | Statistic::Sd => {
                return Err(CubeError::invalid_argument(format!(
                    "statistic '{}' is not supported for zonal aggregation",
                    stat
                )))
            }
        };
        Ok(Self { stat, nt, state })
    }

    pub fn statistic(&self) -> Statistic {
        self.stat
    }

    /// Feed one value into cell `(feature, t)`.
    pub fn update(&mut self, value: f64, feature: usize, t: usize) {
        if !value.is_finite() || t >= self.nt {
            return;
        }
        let i = feature * self.nt + t;
        match &mut self.state {
            State::Count(c) => {
                if let Some(c) = c.get_mut(i) {
                    *c += 1.0;
                }
            }
            State::Sum(s) => {
                if let Some(s) = s.get_mut(i) {
                    *s = if s.is_nan() { value } else { *s + value };
                }
            }
            State::Prod(p) => {
                if let Some(p) = p.get_mut(i) {
                    *p = if p.is_nan() { value } else { *p * value };
                }
            }
            State::Mean { sum, n } => {
                if let (Some(s), Some(n)) = (sum.get_mut(i), n.get_mut(i)) {
                    *s += value;
                    *n += 1;
                }
            }
            State::Min(m) => {
                if let Some(m) = m.get_mut(i) {
                    *m = m.min(value);
                }
            }
            State::Max(m) => {
                if let Some(m) = m.get_mut(i) {
                    *m = m.max(value);
                }
            }
            State::Median(lists) => {
                if let Some(list) = lists.get_mut(i) {
                    list.push(value);
                }
            }
        }
    }

    /// One value per cell; cells without input are NaN (count: 0).
    pub fn finalize(self) -> Vec<f64> {
        match self.state {
            State::Count(c) => c,
            State::Sum(s) | State::Prod(s) => s,
            State::Mean { sum, n } => sum
                .into_iter()
                .zip(n)
                .map(|(s, n)| if n == 0 { f64::NAN } else { s / n as f64 })
                .collect(),
            State::Min(m) | State::Max(m) => m
                .into_iter()
                .map(|v| if v.is_infinite() { f64::NAN } else { v })
                .collect(),
            State::Median(lists) => lists
                .into_iter()
                .map(|mut list| median_of(&mut list))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(stat: Statistic, values: &[f64]) -> f64 {
        let mut agg = Aggregator::new(stat, 1, 1).unwrap();
        for &v in values {
            agg.update(v, 0, 0);
        }
        agg.finalize()[0]
    }

    #[test]
    fn test_single_value_roundtrip() {
        for stat in [
            Statistic::Min,
            Statistic::Max,
            Statistic::Mean,
            Statistic::Sum,
            Statistic::Prod,
            Statistic::Median,
        ] {
            assert_eq!(run(stat, &[-2.5]), -2.5, "{}", stat);
        }
        assert_eq!(run(Statistic::Count, &[-2.5]), 1.0);
    }

    #[test]
    fn test_no_values_is_missing() {
        for stat in [
            Statistic::Min,
            Statistic::Max,
            Statistic::Mean,
            Statistic::Sum,
            Statistic::Prod,
            Statistic::Median,
        ] {
            assert!(run(stat, &[]).is_nan(), "{}", stat);
            assert!(run(stat, &[f64::NAN, f64::INFINITY]).is_nan(), "{}", stat);
        }
        assert_eq!(run(Statistic::Count, &[]), 0.0);
        assert_eq!(run(Statistic::Count, &[f64::NAN]), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(run(Statistic::Median, &[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(run(Statistic::Median, &[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_statistics_over_several_values() {
        let values = [2.0, f64::NAN, 3.0, 5.0];
        assert_eq!(run(Statistic::Sum, &values), 10.0);
        assert_eq!(run(Statistic::Prod, &values), 30.0);
        assert_eq!(run(Statistic::Count, &values), 3.0);
        assert_eq!(run(Statistic::Min, &values), 2.0);
        assert_eq!(run(Statistic::Max, &values), 5.0);
        assert!((run(Statistic::Mean, &values) - 10.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_cells_are_independent() {
        let mut agg = Aggregator::new(Statistic::Sum, 2, 3).unwrap();
        agg.update(1.0, 0, 2);
        agg.update(4.0, 1, 0);
        agg.update(5.0, 1, 0);
        agg.update(9.0, 1, 3);
        let out = agg.finalize();
        assert_eq!(out.len(), 6);
        assert_eq!(out[2], 1.0);
        assert_eq!(out[3], 9.0);
        assert!(out[0].is_nan() && out[5].is_nan());
    }

    #[test]
    fn test_variance_unsupported() {
        assert!(!Aggregator::supports(Statistic::Var));
        assert!(!Aggregator::supports(Statistic::Sd));
        assert!(Aggregator::supports(Statistic::Median));
        assert!(Aggregator::new(Statistic::Sd, 1, 1).is_err());
    }
}
