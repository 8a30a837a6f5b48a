//! Setup stage: validate raw fields and precompute lookup data.
//!
//! The state machine is:
//!
//! - `Unset` → validate, compute, become `Set` (or stay `Unset` on failure)
//! - `Set` → no-op
//! - `Bypass` → no-op once derived data exists; a table put into bypass
//!   before its first derive is computed once and stays in bypass
//!
//! Derivation mutates the table and so takes `&mut self`. Tables shared
//! across threads are only ever read, which is what makes bypass safe.

use ndarray::{s, Array3, ArrayView3, Axis};
use crate::error::{TabError, TabResult};
use crate::table::{TabState, TableTransform};

/// Axis limit for the `2^M` vertex interpolation
pub const MAX_AXES: usize = 16;

/// Lookup data derived from a table's raw fields
#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    pub(crate) nc: usize,
    pub(crate) sense: Vec<i8>,
    pub(crate) offset: Vec<usize>,
    pub(crate) delta: Vec<f64>,
    pub(crate) extrema: Array3<f64>,
}

impl Derived {
    /// Validate `table` and compute its derived data without touching it.
    pub fn compute(table: &TableTransform) -> TabResult<Self> {
        let m_count = table.axis_count();
        if m_count > MAX_AXES {
            return Err(TabError::validation(format!(
                "{} axes exceeds the limit of {}",
                m_count, MAX_AXES
            )));
        }

        let mut sense = Vec::with_capacity(m_count);
        for m in 0..m_count {
            let k = table.k[m];
            let index = &table.index[m];
            if k < 1 {
                return Err(TabError::validation(format!(
                    "table length of axis {} must be positive, got {}",
                    m, k
                )));
            }
            if index.len() != k {
                return Err(TabError::validation(format!(
                    "index vector {} has {} entries, table length is {}",
                    m,
                    index.len(),
                    k
                )));
            }
            sense.push(index_sense(m, index)?);
        }

        for (m, &i) in table.map.iter().enumerate() {
            if table.map[..m].contains(&i) {
                return Err(TabError::validation(format!(
                    "axis {} reuses intermediate element {}",
                    m, i
                )));
            }
        }

        let nc = table
            .k
            .iter()
            .try_fold(1usize, |acc, &k| acc.checked_mul(k))
            .ok_or_else(|| TabError::validation("table size overflows"))?;
        let expected = nc * m_count;
        if table.coord.len() != expected {
            return Err(TabError::validation(format!(
                "coordinate array has {} elements, expected {} ({} x {})",
                table.coord.len(),
                expected,
                m_count,
                nc
            )));
        }

        Ok(Self {
            nc,
            sense,
            offset: vec![0; m_count],
            delta: vec![0.0; m_count],
            extrema: extrema(&table.k, &table.coord)?,
        })
    }

    /// Product of all table lengths
    pub fn element_count(&self) -> usize {
        self.nc
    }

    /// Direction of each index vector, `+1` or `-1`
    pub fn sense(&self) -> &[i8] {
        &self.sense
    }

    /// Base vertex of each axis; a batch's first forward search tries this
    /// cell before bisecting
    pub fn offset(&self) -> &[usize] {
        &self.offset
    }

    /// Initial interpolation fractions; lookups start from these
    pub fn delta(&self) -> &[f64] {
        &self.delta
    }

    /// Min/max table, shape `(outer rows, 2, M)`
    pub fn extrema(&self) -> &Array3<f64> {
        &self.extrema
    }

    pub(crate) fn heap_bytes(&self) -> usize {
        use std::mem::size_of;
        self.sense.len() * size_of::<i8>()
            + self.offset.len() * size_of::<usize>()
            + self.delta.len() * size_of::<f64>()
            + self.extrema.len() * size_of::<f64>()
    }
}

/// Direction of a strictly monotonic index vector
fn index_sense(axis: usize, index: &[f64]) -> TabResult<i8> {
    if let Some(k) = index.iter().position(|v| !v.is_finite()) {
        return Err(TabError::validation(format!(
            "index vector {} has a non-finite entry at {}",
            axis, k
        )));
    }
    if index.len() < 2 {
        return Ok(1);
    }

    let sense: i8 = if index[1] > index[0] { 1 } else { -1 };
    for (k, pair) in index.windows(2).enumerate() {
        let step = pair[1] - pair[0];
        let ok = if sense > 0 { step > 0.0 } else { step < 0.0 };
        if !ok {
            return Err(TabError::validation(format!(
                "index vector {} is not strictly monotonic at entries {} and {}",
                axis,
                k,
                k + 1
            )));
        }
    }
    Ok(sense)
}

/// Per-element min and max over the innermost axis, for every combination
/// of the outer axes.
fn extrema(k: &[usize], coord: &[f64]) -> TabResult<Array3<f64>> {
    let m_count = k.len();
    if m_count == 0 {
        return Ok(Array3::zeros((1, 2, 0)));
    }

    let inner = k[0];
    let outer: usize = k[1..].iter().product();
    let view = ArrayView3::from_shape((outer, inner, m_count), coord)
        .map_err(|e| TabError::validation(format!("coordinate array: {}", e)))?;

    let mut extrema = Array3::zeros((outer, 2, m_count));
    for (row, lane) in view.axis_iter(Axis(0)).enumerate() {
        let min = lane.fold_axis(Axis(0), f64::INFINITY, |&a, &b| a.min(b));
        let max = lane.fold_axis(Axis(0), f64::NEG_INFINITY, |&a, &b| a.max(b));
        extrema.slice_mut(s![row, 0, ..]).assign(&min);
        extrema.slice_mut(s![row, 1, ..]).assign(&max);
    }
    Ok(extrema)
}

impl TableTransform {
    /// Validate raw fields and compute derived data.
    ///
    /// No-op when already set or in bypass with derived data. On failure
    /// the table keeps its state and no derived field is touched.
    pub fn derive(&mut self) -> TabResult<()> {
        if self.derived.is_some() && self.state != TabState::Unset {
            return Ok(());
        }

        match Derived::compute(self) {
            Ok(derived) => {
                tracing::debug!(
                    "derived table: {} axes, {} coordinate vectors",
                    self.axis_count(),
                    derived.nc
                );
                self.derived = Some(derived);
                if self.state != TabState::Bypass {
                    self.state = TabState::Set;
                }
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("table derive failed: {}", err);
                self.fail(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ramp(k: &[usize]) -> TableTransform {
        let mut tab = TableTransform::initialize(k.len(), k).unwrap();
        let n = tab.coordinate_array().len();
        tab.set_coordinate_array((0..n).map(|v| v as f64).collect());
        tab
    }

    #[test]
    fn test_derive_sets_state() {
        let mut tab = ramp(&[3, 2]);
        tab.derive().unwrap();
        assert!(tab.is_set());

        let derived = tab.derived().unwrap();
        assert_eq!(derived.element_count(), 6);
        assert_eq!(derived.sense(), &[1, 1]);
        assert_eq!(derived.offset(), &[0, 0]);
        assert_eq!(derived.delta(), &[0.0, 0.0]);
    }

    #[test]
    fn test_decreasing_sense() {
        let mut tab = ramp(&[3, 2]);
        tab.set_index_vector(0, vec![5.0, 3.0, -1.0]).unwrap();
        tab.derive().unwrap();
        assert_eq!(tab.derived().unwrap().sense(), &[-1, 1]);
    }

    #[test]
    fn test_extrema_layout() {
        // coord[(k1*3 + k0)*2 + m] = that linear index
        let mut tab = ramp(&[3, 2]);
        tab.derive().unwrap();
        let extrema = tab.derived().unwrap().extrema();
        assert_eq!(extrema.shape(), &[2, 2, 2]);

        // Outer row k1 = 0 covers elements 0..6
        assert_eq!(extrema[[0, 0, 0]], 0.0);
        assert_eq!(extrema[[0, 1, 0]], 4.0);
        assert_eq!(extrema[[0, 0, 1]], 1.0);
        assert_eq!(extrema[[0, 1, 1]], 5.0);
        // Outer row k1 = 1 covers elements 6..12
        assert_eq!(extrema[[1, 0, 0]], 6.0);
        assert_eq!(extrema[[1, 1, 1]], 11.0);
    }

    #[test]
    fn test_non_monotonic_index() {
        let mut tab = ramp(&[4]);
        tab.set_index_vector(0, vec![1.0, 3.0, 2.0, 4.0]).unwrap();
        let err = tab.derive().unwrap_err();
        assert!(matches!(err, TabError::Validation { .. }));
        assert_eq!(tab.state(), TabState::Unset);
        assert!(tab.derived().is_none());
        assert_eq!(tab.last_error().unwrap().kind, ErrorKind::Validation);
    }

    #[test]
    fn test_repeated_index_rejected() {
        let mut tab = ramp(&[3]);
        tab.set_index_vector(0, vec![1.0, 1.0, 2.0]).unwrap();
        assert!(tab.derive().is_err());
    }

    #[test]
    fn test_coordinate_size_mismatch() {
        let mut tab = ramp(&[2, 2]);
        tab.set_coordinate_array(vec![0.0; 7]);
        let err = tab.derive().unwrap_err();
        assert!(err.to_string().contains("expected 8"));
    }

    #[test]
    fn test_duplicate_assignment() {
        let mut tab = ramp(&[2, 2]);
        tab.set_index_assignment(1, 0).unwrap();
        assert!(tab.derive().is_err());

        tab.set_index_assignment(0, 5).unwrap();
        tab.set_index_assignment(1, 5).unwrap();
        assert!(tab.derive().is_err());

        tab.set_index_assignment(1, 3).unwrap();
        assert!(tab.derive().is_ok());
    }

    #[test]
    fn test_derive_clears_error() {
        let mut tab = ramp(&[2]);
        tab.set_coordinate_array(vec![1.0]);
        assert!(tab.derive().is_err());
        assert!(tab.last_error().is_some());

        tab.set_coordinate_array(vec![1.0, 2.0]);
        tab.derive().unwrap();
        assert!(tab.last_error().is_none());
    }

    #[test]
    fn test_bypass_before_first_derive() {
        let mut tab = ramp(&[3]);
        tab.enter_bypass();
        tab.derive().unwrap();
        assert!(tab.is_bypass());
        assert!(tab.derived().is_some());
    }

    #[test]
    fn test_bypass_derive_is_noop() {
        let mut tab = ramp(&[3]);
        tab.derive().unwrap();
        tab.enter_bypass();
        let before = tab.derived().cloned();

        // Not re-derived even though the coordinates changed.
        tab.set_coordinate_value(0, -100.0).unwrap();
        tab.derive().unwrap();
        assert_eq!(tab.derived().cloned(), before);
    }

    #[test]
    fn test_zero_axes() {
        let mut tab = TableTransform::initialize(0, &[]).unwrap();
        tab.derive().unwrap();
        assert_eq!(tab.derived().unwrap().element_count(), 1);
    }
}
