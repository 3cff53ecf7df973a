//! Selecting the baselines that contribute to a flare spectrogram.
//!
//! Only cross-correlations on "medium length" baselines are used: short
//! baselines are dominated by the quiet Sun and long baselines resolve the
//! flaring source out. The length is measured at a single reference time
//! sample (usually the middle of the interval).
//!
//! # Examples
//!
//! ```rust
//! use flarespec::{
//!     ndarray::Array3,
//!     selection::{parse_ant_str, select_baselines, UpperTriangleOrder},
//! };
//!
//! let ants = parse_ant_str("ant1-3").unwrap();
//! assert_eq!(ants, vec![0, 1, 2]);
//!
//! // three baselines, one time sample, u = 500ns, 2000ns, 500ns
//! let mut uvw = Array3::<f64>::zeros((3, 1, 3));
//! uvw[(0, 0, 0)] = 500.0;
//! uvw[(1, 0, 0)] = 2000.0;
//! uvw[(2, 0, 0)] = 500.0;
//!
//! let order = UpperTriangleOrder::new(3);
//! let selected = select_baselines(uvw.view(), &ants, 0, 150.0, 1000.0, &order);
//! assert_eq!(selected, vec![0, 2]);
//! ```

use lazy_static::lazy_static;
use log::{trace, warn};
use regex::Regex;
use thiserror::Error;

use crate::{
    constants::EOVSA_NUM_ANTS,
    ndarray::{Array1, ArrayView3, Axis},
};

/// Errors when selecting baselines.
#[derive(Error, Debug)]
pub enum SelectionError {
    /// An antenna string token could not be understood.
    #[error("invalid antenna specifier {token:?} in {ant_str:?}. Expected e.g. \"ant1-13 ant15\"")]
    InvalidAntStr {
        /// The full antenna string
        ant_str: String,
        /// The offending token
        token: String,
    },
}

/// Maps an unordered antenna pair to a baseline index in the visibility
/// arrays.
pub trait BaselineOrder {
    /// The baseline index of the pair `(ant1, ant2)`, or `None` if the pair
    /// has no cross-correlation baseline.
    fn baseline_index(&self, ant1: usize, ant2: usize) -> Option<usize>;
}

/// The EOVSA correlator ordering: cross-correlations only, enumerated over
/// the upper triangle row by row. `(0, 1)` is baseline 0, `(0, 2)` is
/// baseline 1, ..., `(1, 2)` follows `(0, n-1)`.
#[derive(Debug, Clone, Copy)]
pub struct UpperTriangleOrder {
    /// Number of antennas in the array.
    pub num_ants: usize,
}

impl UpperTriangleOrder {
    /// Create an ordering for `num_ants` antennas.
    pub fn new(num_ants: usize) -> Self {
        Self { num_ants }
    }

    /// Number of cross-correlation baselines.
    pub fn num_baselines(&self) -> usize {
        self.num_ants * self.num_ants.saturating_sub(1) / 2
    }
}

impl Default for UpperTriangleOrder {
    fn default() -> Self {
        Self::new(EOVSA_NUM_ANTS)
    }
}

impl BaselineOrder for UpperTriangleOrder {
    fn baseline_index(&self, ant1: usize, ant2: usize) -> Option<usize> {
        let (i, j) = if ant1 < ant2 {
            (ant1, ant2)
        } else {
            (ant2, ant1)
        };
        if i == j || j >= self.num_ants {
            return None;
        }
        Some(i * (2 * self.num_ants - i - 1) / 2 + (j - i - 1))
    }
}

lazy_static! {
    static ref ANT_TOKEN_RE: Regex = Regex::new(r"^(?i:ant)?(\d+)(?:-(?i:ant)?(\d+))?$").unwrap();
}

/// Parse a standard antenna string, e.g. `"ant1-13"` or `"ant1-4 ant7,ant9"`,
/// into zero-based antenna indices.
///
/// Antenna numbers in the string are one-based. Tokens are separated by
/// whitespace or commas, and may be single antennas or inclusive ranges.
/// Duplicates are dropped, keeping the first occurrence.
///
/// # Errors
///
/// [`SelectionError::InvalidAntStr`] if a token is not a (range of) antenna
/// number(s), or refers to antenna 0.
pub fn parse_ant_str(ant_str: &str) -> Result<Vec<usize>, SelectionError> {
    let invalid = |token: &str| SelectionError::InvalidAntStr {
        ant_str: ant_str.to_string(),
        token: token.to_string(),
    };
    let mut ants: Vec<usize> = vec![];
    for token in ant_str
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let caps = ANT_TOKEN_RE.captures(token).ok_or_else(|| invalid(token))?;
        let first: usize = caps[1].parse().map_err(|_| invalid(token))?;
        let last: usize = match caps.get(2) {
            Some(m) => m.as_str().parse().map_err(|_| invalid(token))?,
            None => first,
        };
        if first == 0 || last < first {
            return Err(invalid(token));
        }
        for ant in (first - 1)..last {
            if !ants.contains(&ant) {
                ants.push(ant);
            }
        }
    }
    trace!("antenna string {:?} -> {:?}", ant_str, ants);
    Ok(ants)
}

/// Projected length `sqrt(u² + v²)` of every baseline at `time_index`.
///
/// Returns an empty array if `time_index` is out of range.
pub fn baseline_lengths(uvw: ArrayView3<f64>, time_index: usize) -> Array1<f64> {
    if time_index >= uvw.len_of(Axis(1)) || uvw.len_of(Axis(2)) < 2 {
        return Array1::zeros(0);
    }
    uvw.index_axis(Axis(1), time_index)
        .outer_iter()
        .map(|coords| coords[0].hypot(coords[1]))
        .collect()
}

/// Baseline indices between the antennas in `ant_list` whose length at
/// `mid_time_index` lies strictly between `min_len` and `max_len`.
///
/// Pairs are enumerated as `(ant_list[a], ant_list[b])` for `a < b`, and the
/// result keeps that order. Pairs which `order` can't map, or which map
/// outside of `uvw`, are skipped.
pub fn select_baselines(
    uvw: ArrayView3<f64>,
    ant_list: &[usize],
    mid_time_index: usize,
    min_len: f64,
    max_len: f64,
    order: &impl BaselineOrder,
) -> Vec<usize> {
    let lengths = baseline_lengths(uvw, mid_time_index);
    let mut selected = vec![];
    for (a, &ant1) in ant_list.iter().enumerate() {
        for &ant2 in &ant_list[(a + 1)..] {
            let bl_idx = match order.baseline_index(ant1, ant2) {
                Some(bl_idx) if bl_idx < lengths.len() => bl_idx,
                _ => {
                    warn!(
                        "no baseline for antenna pair ({}, {}), skipping",
                        ant1, ant2
                    );
                    continue;
                }
            };
            let length = lengths[bl_idx];
            if length > min_len && length < max_len {
                selected.push(bl_idx);
            }
        }
    }
    trace!("selected baselines {:?}", selected);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndarray::Array3;

    fn uvw_from_lengths(lengths: &[f64], num_times: usize) -> Array3<f64> {
        let mut uvw = Array3::zeros((lengths.len(), num_times, 3));
        for (bl_idx, &length) in lengths.iter().enumerate() {
            for t in 0..num_times {
                uvw[(bl_idx, t, 0)] = length;
                uvw[(bl_idx, t, 2)] = 1234.0;
            }
        }
        uvw
    }

    #[test]
    fn test_upper_triangle_order() {
        let order = UpperTriangleOrder::default();
        assert_eq!(order.num_baselines(), 120);
        assert_eq!(order.baseline_index(0, 1), Some(0));
        assert_eq!(order.baseline_index(0, 15), Some(14));
        assert_eq!(order.baseline_index(1, 2), Some(15));
        assert_eq!(order.baseline_index(14, 15), Some(119));
        // symmetric
        assert_eq!(order.baseline_index(2, 1), Some(15));
        // autos and unknown antennas
        assert_eq!(order.baseline_index(3, 3), None);
        assert_eq!(order.baseline_index(3, 16), None);
    }

    #[test]
    fn test_upper_triangle_order_is_dense() {
        let order = UpperTriangleOrder::new(5);
        let mut seen = vec![];
        for i in 0..5 {
            for j in (i + 1)..5 {
                seen.push(order.baseline_index(i, j).unwrap());
            }
        }
        assert_eq!(seen, (0..order.num_baselines()).collect::<Vec<_>>());
    }

    #[test]
    fn test_parse_ant_str() {
        assert_eq!(
            parse_ant_str("ant1-13").unwrap(),
            (0..13).collect::<Vec<_>>()
        );
        assert_eq!(parse_ant_str("ant1-3 ant7,ant5").unwrap(), vec![0, 1, 2, 6, 4]);
        assert_eq!(parse_ant_str("ant2 ant1-3").unwrap(), vec![1, 0, 2]);
        assert_eq!(parse_ant_str("4-5").unwrap(), vec![3, 4]);
        assert!(parse_ant_str("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_ant_str_invalid() {
        for bad in ["ant0", "ant3-1", "antx", "ant1-", "dish1"] {
            assert!(
                matches!(parse_ant_str(bad), Err(SelectionError::InvalidAntStr { .. })),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_baseline_lengths_ignore_w() {
        let mut uvw = Array3::zeros((1, 1, 3));
        uvw[(0, 0, 0)] = 300.0;
        uvw[(0, 0, 1)] = 400.0;
        uvw[(0, 0, 2)] = 9999.0;
        assert!((baseline_lengths(uvw.view(), 0)[0] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_baseline_lengths() {
        let uvw = uvw_from_lengths(&[100.0, 500.0], 3);
        let lengths = baseline_lengths(uvw.view(), 1);
        assert!((lengths[0] - 100.0).abs() < 1e-9);
        assert!((lengths[1] - 500.0).abs() < 1e-9);
        assert!(baseline_lengths(uvw.view(), 3).is_empty());
    }

    #[test]
    fn test_select_baselines_three_ants() {
        // (0,1) = 500, (0,2) = 500, (1,2) = 2000
        let uvw = uvw_from_lengths(&[500.0, 500.0, 2000.0], 4);
        let order = UpperTriangleOrder::new(3);
        let selected = select_baselines(uvw.view(), &[0, 1, 2], 2, 150.0, 1000.0, &order);
        assert_eq!(selected, vec![0, 1]);
    }

    #[test]
    fn test_select_baselines_bounds_are_strict() {
        let uvw = uvw_from_lengths(&[150.0, 1000.0, 150.5], 1);
        let order = UpperTriangleOrder::new(3);
        let selected = select_baselines(uvw.view(), &[0, 1, 2], 0, 150.0, 1000.0, &order);
        assert_eq!(selected, vec![2]);
    }

    #[test]
    fn test_select_baselines_too_few_ants() {
        let uvw = uvw_from_lengths(&[500.0, 500.0, 500.0], 1);
        let order = UpperTriangleOrder::new(3);
        assert!(select_baselines(uvw.view(), &[1], 0, 150.0, 1000.0, &order).is_empty());
        assert!(select_baselines(uvw.view(), &[], 0, 150.0, 1000.0, &order).is_empty());
    }

    #[test]
    fn test_select_baselines_follows_ant_list_order() {
        let uvw = uvw_from_lengths(&[500.0, 500.0, 500.0], 1);
        let order = UpperTriangleOrder::new(3);
        // pairs (2,0), (2,1), (0,1)
        let selected = select_baselines(uvw.view(), &[2, 0, 1], 0, 150.0, 1000.0, &order);
        assert_eq!(selected, vec![1, 2, 0]);
    }

    #[test]
    fn test_select_baselines_skips_unknown_pairs() {
        let uvw = uvw_from_lengths(&[500.0, 500.0, 500.0], 1);
        let order = UpperTriangleOrder::new(3);
        // antenna 5 doesn't exist
        let selected = select_baselines(uvw.view(), &[0, 5, 1], 0, 150.0, 1000.0, &order);
        assert_eq!(selected, vec![0]);
        // a repeated antenna is an auto
        assert!(select_baselines(uvw.view(), &[1, 1], 0, 150.0, 1000.0, &order).is_empty());
    }
}
