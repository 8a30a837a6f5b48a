//! The table-transform object
//!
//! A [`TableTransform`] holds one group of tabulated axes: per-axis index
//! vectors, the coordinate array they index, and the derived data that
//! [`TableTransform::derive`] computes from them.
//!
//! Raw fields are private. Every write goes through a setter that performs
//! the state transition, so derived data can never silently go stale.

use serde::{Deserialize, Serialize};

use crate::config::LookupConfig;
use crate::derive::{Derived, MAX_AXES};
use crate::error::{ErrorRecord, TabError, TabResult};

/// Derivation state of a table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum TabState {
    /// Raw fields may have changed; derived data is untrustworthy
    #[default]
    Unset,
    /// Derived data matches the raw fields
    Set,
    /// Derived data is assumed valid and derive is a no-op
    Bypass,
}

impl TabState {
    /// Integer code used by the state field
    pub fn code(&self) -> i64 {
        match self {
            TabState::Unset => 0,
            TabState::Set => 1,
            TabState::Bypass => -1,
        }
    }
}

/// Equality mode for [`compare`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum CompareMode {
    /// Bit-for-bit equality of raw fields
    Strict,
    /// Real-valued raw fields equal within a tolerance
    Tolerant,
}

/// Memory footprint of a table, for diagnostics
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct TableSize {
    /// Size of the struct itself
    pub fixed_bytes: u64,
    /// Heap storage owned by the struct
    pub variable_bytes: u64,
}

/// A multi-dimensional coordinate lookup table.
///
/// Only raw fields are serialized. A deserialized table starts unset and is
/// validated by its first derive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableTransform {
    pub(crate) k: Vec<usize>,
    pub(crate) map: Vec<usize>,
    pub(crate) crval: Vec<f64>,
    pub(crate) index: Vec<Vec<f64>>,
    pub(crate) coord: Vec<f64>,
    #[serde(skip)]
    pub(crate) state: TabState,
    #[serde(skip)]
    pub(crate) derived: Option<Derived>,
    pub(crate) last_error: Option<ErrorRecord>,
    pub(crate) config: LookupConfig,
}

/// 1-relative default indexing, used until an index vector is supplied
fn default_index(len: usize) -> Vec<f64> {
    (1..=len).map(|i| i as f64).collect()
}

impl TableTransform {
    /// Allocate a table with `axis_count` axes of the given lengths.
    ///
    /// Index vectors start as the default indexing `1, 2, ..., K[m]`, the
    /// index assignment is the identity, reference values are zero and the
    /// coordinate array is zero-filled.
    pub fn initialize(axis_count: usize, table_length: &[usize]) -> TabResult<Self> {
        if table_length.len() != axis_count {
            return Err(TabError::allocation(format!(
                "{} table lengths given for {} axes",
                table_length.len(),
                axis_count
            )));
        }

        if let Some(m) = table_length.iter().position(|&k| k < 1) {
            return Err(TabError::allocation(format!(
                "table length of axis {} must be positive, got {}",
                m, table_length[m]
            )));
        }

        let count = table_length
            .iter()
            .try_fold(axis_count, |acc, &k| acc.checked_mul(k))
            .ok_or_else(|| TabError::allocation("coordinate array size overflows"))?;

        let mut coord = Vec::new();
        coord
            .try_reserve_exact(count)
            .map_err(|e| TabError::allocation(format!("coordinate array: {}", e)))?;
        coord.resize(count, 0.0);

        Ok(Self {
            k: table_length.to_vec(),
            map: (0..axis_count).collect(),
            crval: vec![0.0; axis_count],
            index: table_length.iter().map(|&k| default_index(k)).collect(),
            coord,
            state: TabState::Unset,
            derived: None,
            last_error: None,
            config: LookupConfig::default(),
        })
    }

    /// Deep copy of raw and derived storage.
    ///
    /// Storage is reserved fallibly so exhaustion surfaces as an
    /// allocation error. The source need not be derived.
    pub fn copy(&self) -> TabResult<Self> {
        fn copy_vec<T: Clone>(src: &[T], what: &str) -> TabResult<Vec<T>> {
            let mut dst = Vec::new();
            dst.try_reserve_exact(src.len())
                .map_err(|e| TabError::allocation(format!("{}: {}", what, e)))?;
            dst.extend_from_slice(src);
            Ok(dst)
        }

        let index = self
            .index
            .iter()
            .map(|vector| copy_vec(vector, "index vector"))
            .collect::<TabResult<Vec<_>>>()?;

        Ok(Self {
            k: self.k.clone(),
            map: self.map.clone(),
            crval: self.crval.clone(),
            index,
            coord: copy_vec(&self.coord, "coordinate array")?,
            state: self.state,
            derived: self.derived.clone(),
            last_error: self.last_error.clone(),
            config: self.config,
        })
    }

    // --- Enquiry ---

    /// Number of table axes
    pub fn axis_count(&self) -> usize {
        self.k.len()
    }

    /// Per-axis table lengths
    pub fn table_length(&self) -> &[usize] {
        &self.k
    }

    /// Which intermediate-coordinate element indexes each axis
    pub fn index_assignment(&self) -> &[usize] {
        &self.map
    }

    /// Per-axis reference values
    pub fn reference_value(&self) -> &[f64] {
        &self.crval
    }

    /// Index vector of one axis
    pub fn index_vector(&self, axis: usize) -> Option<&[f64]> {
        self.index.get(axis).map(|v| v.as_slice())
    }

    /// Flattened coordinate array
    pub fn coordinate_array(&self) -> &[f64] {
        &self.coord
    }

    pub fn state(&self) -> TabState {
        self.state
    }

    /// Derived data is present and valid for lookups
    pub fn is_ready(&self) -> bool {
        self.state != TabState::Unset && self.derived.is_some()
    }

    pub fn is_set(&self) -> bool {
        self.state == TabState::Set
    }

    pub fn is_bypass(&self) -> bool {
        self.state == TabState::Bypass
    }

    /// Derived data, if derive has run since the last invalidation
    pub fn derived(&self) -> Option<&Derived> {
        if self.state == TabState::Unset {
            None
        } else {
            self.derived.as_ref()
        }
    }

    /// Record of the last failing operation
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Replace the lookup configuration; derived data is unaffected
    pub fn set_config(&mut self, config: LookupConfig) {
        self.config = config;
    }

    // --- State transitions ---

    /// Suppress re-derivation.
    ///
    /// If the table has never been derived, the next [`derive`](Self::derive)
    /// computes once and the table stays in bypass.
    pub fn enter_bypass(&mut self) {
        tracing::debug!("entering bypass mode (derived: {})", self.derived.is_some());
        self.state = TabState::Bypass;
    }

    /// Leave bypass, keeping derived data if there is any
    pub fn leave_bypass(&mut self) {
        if self.state == TabState::Bypass {
            self.state = if self.derived.is_some() {
                TabState::Set
            } else {
                TabState::Unset
            };
        }
    }

    /// Discard derived data and leave bypass
    pub fn invalidate(&mut self) {
        self.state = TabState::Unset;
        self.derived = None;
    }

    /// Apply a state code as written through the state field
    pub fn set_state_code(&mut self, code: i64) -> TabResult<()> {
        match code {
            0 => {
                self.invalidate();
                Ok(())
            }
            -1 => {
                self.enter_bypass();
                Ok(())
            }
            1 => self.fail(TabError::validation(
                "state SET is only reachable through derive",
            )),
            other => self.fail(TabError::validation(format!(
                "unknown state code {}",
                other
            ))),
        }
    }

    /// Transition after a raw-field write.
    ///
    /// Bypass survives raw writes. Writes that change storage shape still
    /// drop the derived snapshot so it is recomputed before next use.
    fn touch_raw(&mut self, structural: bool) {
        match self.state {
            TabState::Bypass => {
                if structural {
                    self.derived = None;
                }
            }
            _ => self.invalidate(),
        }
    }

    pub(crate) fn fail<T>(&mut self, err: TabError) -> TabResult<T> {
        self.last_error = Some(ErrorRecord::from(&err));
        Err(err)
    }

    fn check_axis(&mut self, field: &'static str, axis: usize) -> TabResult<()> {
        if axis >= self.axis_count() {
            let m = self.axis_count();
            return self.fail(TabError::shape(
                field,
                format!("axis {} out of range for {} axes", axis, m),
            ));
        }
        Ok(())
    }

    // --- Raw setters ---

    /// Change the number of axes.
    ///
    /// New axes get length 1, identity assignment, zero reference value and
    /// the default index. The coordinate array is left alone; its size is
    /// checked by derive.
    pub fn set_axis_count(&mut self, axis_count: usize) -> TabResult<()> {
        if axis_count > MAX_AXES {
            return self.fail(TabError::validation(format!(
                "{} axes exceeds the limit of {}",
                axis_count, MAX_AXES
            )));
        }
        let old = self.axis_count();
        self.k.resize(axis_count, 1);
        self.crval.resize(axis_count, 0.0);
        self.index.resize_with(axis_count, || default_index(1));
        self.map.truncate(axis_count);
        self.map.extend(old.min(axis_count)..axis_count);
        self.touch_raw(true);
        Ok(())
    }

    /// Change one axis's table length; its index vector is resized and any
    /// new entries are zero until written.
    pub fn set_table_length(&mut self, axis: usize, length: usize) -> TabResult<()> {
        self.check_axis("table_length", axis)?;
        if length < 1 {
            return self.fail(TabError::validation(format!(
                "table length of axis {} must be positive, got {}",
                axis, length
            )));
        }
        let grow = length.saturating_sub(self.index[axis].len());
        if let Err(e) = self.index[axis].try_reserve_exact(grow) {
            return self.fail(TabError::allocation(format!(
                "index vector of axis {}: {}",
                axis, e
            )));
        }
        self.k[axis] = length;
        self.index[axis].resize(length, 0.0);
        self.touch_raw(true);
        Ok(())
    }

    pub fn set_index_assignment(&mut self, axis: usize, element: usize) -> TabResult<()> {
        self.check_axis("index_assignment", axis)?;
        self.map[axis] = element;
        self.touch_raw(false);
        Ok(())
    }

    pub fn set_reference_value(&mut self, axis: usize, value: f64) -> TabResult<()> {
        self.check_axis("reference_value", axis)?;
        self.crval[axis] = value;
        self.touch_raw(false);
        Ok(())
    }

    /// Replace one axis's whole index vector; its length must equal `K[axis]`
    pub fn set_index_vector(&mut self, axis: usize, values: Vec<f64>) -> TabResult<()> {
        self.check_axis("index_vectors", axis)?;
        if values.len() != self.k[axis] {
            let expected = self.k[axis];
            return self.fail(TabError::shape(
                "index_vectors",
                format!(
                    "axis {} needs {} values, got {}",
                    axis,
                    expected,
                    values.len()
                ),
            ));
        }
        self.index[axis] = values;
        self.touch_raw(false);
        Ok(())
    }

    pub fn set_index_value(&mut self, axis: usize, k: usize, value: f64) -> TabResult<()> {
        self.check_axis("index_vectors", axis)?;
        if k >= self.k[axis] {
            let len = self.k[axis];
            return self.fail(TabError::shape(
                "index_vectors",
                format!("entry {} out of range for axis {} of length {}", k, axis, len),
            ));
        }
        self.index[axis][k] = value;
        self.touch_raw(false);
        Ok(())
    }

    /// Replace the coordinate array; its size is checked by derive
    pub fn set_coordinate_array(&mut self, values: Vec<f64>) {
        self.coord = values;
        self.touch_raw(true);
    }

    pub fn set_coordinate_value(&mut self, i: usize, value: f64) -> TabResult<()> {
        if i >= self.coord.len() {
            let len = self.coord.len();
            return self.fail(TabError::shape(
                "coordinate_array",
                format!("element {} out of range for {} elements", i, len),
            ));
        }
        self.coord[i] = value;
        self.touch_raw(false);
        Ok(())
    }

    /// Memory footprint split between the struct and its heap storage
    pub fn size_of(&self) -> TableSize {
        use std::mem::size_of_val;

        let mut variable = size_of_val(self.k.as_slice())
            + size_of_val(self.map.as_slice())
            + size_of_val(self.crval.as_slice())
            + size_of_val(self.index.as_slice())
            + size_of_val(self.coord.as_slice());
        variable += self
            .index
            .iter()
            .map(|v| size_of_val(v.as_slice()))
            .sum::<usize>();
        if let Some(derived) = &self.derived {
            variable += derived.heap_bytes();
        }
        if let Some(err) = &self.last_error {
            variable += err.message.len();
        }

        TableSize {
            fixed_bytes: std::mem::size_of::<Self>() as u64,
            variable_bytes: variable as u64,
        }
    }
}

/// Compare the raw fields of two tables.
///
/// Derived fields are excluded since they are reproducible from raw fields.
/// Tables of different shape compare unequal.
pub fn compare(mode: CompareMode, tolerance: f64, a: &TableTransform, b: &TableTransform) -> bool {
    let reals_equal = |x: &[f64], y: &[f64]| {
        x.len() == y.len()
            && x.iter().zip(y).all(|(p, q)| match mode {
                CompareMode::Strict => p.to_bits() == q.to_bits(),
                CompareMode::Tolerant => (p - q).abs() <= tolerance,
            })
    };

    a.k == b.k
        && a.map == b.map
        && reals_equal(&a.crval, &b.crval)
        && a.index.len() == b.index.len()
        && a.index.iter().zip(&b.index).all(|(x, y)| reals_equal(x, y))
        && reals_equal(&a.coord, &b.coord)
}
