//! Shared test utilities for the cube-query workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic cube generators with verifiable values
//! - GeoJSON zone fixtures
//! - Approximate float assertions that treat NaN as "missing"
//! - A cube wrapper that fails chosen chunk reads
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{ramp_cube, square_zone, zones_geojson};
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use faults::*;
pub use fixtures::*;
pub use generators::*;

/// Approximate floating-point equality. Two NaNs compare equal, so
/// expected "missing" values can be asserted directly.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(f64::NAN, f64::NAN, 0.0);        // passes
/// assert_approx_eq!(f64::NAN, 1.0, 0.1);             // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let both_missing = left.is_nan() && right.is_nan();
        if !both_missing && !((left - right).abs() <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n \
                 epsilon: `{:?}`",
                left, right, epsilon
            );
        }
    }};
}

/// Element-wise [`assert_approx_eq!`] over two slices of equal length.
#[macro_export]
macro_rules! assert_values_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: &[f64] = &$left;
        let right: &[f64] = &$right;
        assert_eq!(left.len(), right.len(), "length mismatch");
        for (l, r) in left.iter().zip(right.iter()) {
            $crate::assert_approx_eq!(*l, *r, $epsilon);
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(f64::NAN, f64::NAN, 0.0);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails_on_nan() {
        assert_approx_eq!(f64::NAN, 1.0, 0.1);
    }

    #[test]
    fn test_assert_values_approx_eq() {
        assert_values_approx_eq!(vec![1.0, f64::NAN], [1.0000001, f64::NAN], 1e-6);
    }
}
