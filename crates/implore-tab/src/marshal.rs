//! Field-code access to a table
//!
//! Callers that cannot see the native layout read and write a table through
//! integer field codes. All values cross by value as a [`FieldValue`];
//! the registry in [`crate::field`] decides type, shape and access.
//!
//! Index conventions (all 0-relative):
//!
//! | Shape | `axis` | `table` | value |
//! |---|---|---|---|
//! | scalar | `None` | `None` | scalar |
//! | per-axis | `Some(m)` / `None` | `None` | scalar / length `M` |
//! | ragged | `Some(m)` | `Some(k)` / `None` | scalar / length `K[m]` |
//! | ragged | `None` | `None` | all axes concatenated |
//! | flat | `None` | `Some(i)` / `None` | scalar / any length |

use crate::error::{TabError, TabResult};
use crate::field::{Access, FieldCode, FieldShape, FieldSpec, FieldValue};
use crate::table::TableTransform;

fn to_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn ints(values: &[usize]) -> FieldValue {
    FieldValue::Ints(values.iter().map(|&v| to_i64(v)).collect())
}

/// Pair each addressed position with its new value.
///
/// `at = Some(i)` addresses one element and wants a scalar; `at = None`
/// addresses all `len` elements and wants a vector of that length.
fn addressed<T: Copy>(
    spec: &FieldSpec,
    scalar: Option<T>,
    vector: Option<&[T]>,
    at: Option<usize>,
    len: usize,
) -> TabResult<Vec<(usize, T)>> {
    match at {
        Some(i) => {
            if i >= len {
                return Err(TabError::shape(
                    spec.name,
                    format!("index {} out of range for length {}", i, len),
                ));
            }
            let v = scalar.ok_or_else(|| {
                TabError::shape(spec.name, "a single element takes a scalar value")
            })?;
            Ok(vec![(i, v)])
        }
        None => {
            let values = vector.ok_or_else(|| {
                TabError::shape(spec.name, "the whole field takes a vector value")
            })?;
            if values.len() != len {
                return Err(TabError::shape(
                    spec.name,
                    format!("expected {} values, got {}", len, values.len()),
                ));
            }
            Ok(values.iter().copied().enumerate().collect())
        }
    }
}

fn unused(spec: &FieldSpec, name: &str, index: Option<usize>) -> TabResult<()> {
    match index {
        Some(i) => Err(TabError::shape(
            spec.name,
            format!("takes no {} index, got {}", name, i),
        )),
        None => Ok(()),
    }
}

fn non_negative(spec: &FieldSpec, v: i64) -> TabResult<usize> {
    usize::try_from(v).map_err(|_| {
        TabError::validation(format!("{} must be non-negative, got {}", spec.name, v))
    })
}

impl TableTransform {
    /// Read a whole field by wire code.
    ///
    /// Derived fields fail with `NotReady` until the table is derived. Reads
    /// leave the error record alone.
    pub fn get(&self, code: i32) -> TabResult<FieldValue> {
        self.get_field(FieldCode::try_from(code)?)
    }

    pub fn get_field(&self, code: FieldCode) -> TabResult<FieldValue> {
        let spec = code.spec();
        let value = match (code, self.derived()) {
            (FieldCode::State, _) => FieldValue::Int(self.state().code()),
            (FieldCode::AxisCount, _) => FieldValue::Int(to_i64(self.axis_count())),
            (FieldCode::TableLength, _) => ints(&self.k),
            (FieldCode::IndexAssignment, _) => ints(&self.map),
            (FieldCode::ReferenceValue, _) => FieldValue::Reals(self.crval.clone()),
            (FieldCode::IndexVectors, _) => FieldValue::Reals(self.index.concat()),
            (FieldCode::CoordinateArray, _) => FieldValue::Reals(self.coord.clone()),
            (FieldCode::ErrorRecord, _) => FieldValue::Error(self.last_error.clone()),
            (FieldCode::ElementCount, Some(d)) => FieldValue::Int(to_i64(d.element_count())),
            (FieldCode::Sense, Some(d)) => {
                FieldValue::Ints(d.sense().iter().map(|&s| i64::from(s)).collect())
            }
            (FieldCode::Offset, Some(d)) => ints(d.offset()),
            (FieldCode::Delta, Some(d)) => FieldValue::Reals(d.delta().to_vec()),
            (FieldCode::Extrema, Some(d)) => {
                FieldValue::Reals(d.extrema().iter().copied().collect())
            }
            (_, None) => {
                debug_assert!(spec.requires_derive());
                return Err(TabError::NotReady { field: spec.name });
            }
        };
        Ok(value)
    }

    /// Write a field, or one element of it, by wire code.
    ///
    /// Raw writes invalidate derived data unless the table is in bypass.
    /// Failures are recorded on the table.
    pub fn put(
        &mut self,
        code: i32,
        value: FieldValue,
        axis: Option<usize>,
        table: Option<usize>,
    ) -> TabResult<()> {
        match FieldCode::try_from(code) {
            Ok(code) => self.put_field(code, value, axis, table),
            Err(err) => self.fail(err),
        }
    }

    pub fn put_field(
        &mut self,
        code: FieldCode,
        value: FieldValue,
        axis: Option<usize>,
        table: Option<usize>,
    ) -> TabResult<()> {
        match self.apply(code, value, axis, table) {
            Ok(()) => {
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                tracing::debug!("put {} failed: {}", code.spec().name, err);
                self.fail(err)
            }
        }
    }

    fn apply(
        &mut self,
        code: FieldCode,
        value: FieldValue,
        axis: Option<usize>,
        table: Option<usize>,
    ) -> TabResult<()> {
        let spec = code.spec();
        match spec.access {
            Access::Derived if !self.is_ready() => {
                return Err(TabError::NotReady { field: spec.name })
            }
            Access::Derived | Access::Diagnostic => {
                return Err(TabError::ReadOnlyField { field: spec.name })
            }
            Access::Raw | Access::Control => {}
        }
        if !spec.accepts(&value) {
            return Err(TabError::shape(
                spec.name,
                format!("expected {:?} values", spec.element),
            ));
        }

        let m_count = self.axis_count();
        match spec.shape {
            FieldShape::Scalar => {
                unused(spec, "axis", axis)?;
                unused(spec, "table", table)?;
            }
            FieldShape::PerAxis => unused(spec, "table", table)?,
            FieldShape::Flat => unused(spec, "axis", axis)?,
            FieldShape::Ragged => {}
        }

        match code {
            FieldCode::State => {
                let v = value
                    .as_int()
                    .ok_or_else(|| TabError::shape(spec.name, "expected a scalar"))?;
                self.set_state_code(v)
            }
            FieldCode::AxisCount => {
                let v = value
                    .as_int()
                    .ok_or_else(|| TabError::shape(spec.name, "expected a scalar"))?;
                let n = non_negative(spec, v)?;
                self.set_axis_count(n)
            }
            FieldCode::TableLength => {
                let entries = addressed(spec, value.as_int(), value.as_ints(), axis, m_count)?;
                let lengths = entries
                    .into_iter()
                    .map(|(m, v)| match non_negative(spec, v)? {
                        0 => Err(TabError::validation(format!(
                            "table length of axis {} must be positive",
                            m
                        ))),
                        len => Ok((m, len)),
                    })
                    .collect::<TabResult<Vec<_>>>()?;
                for (m, len) in lengths {
                    self.set_table_length(m, len)?;
                }
                Ok(())
            }
            FieldCode::IndexAssignment => {
                let entries = addressed(spec, value.as_int(), value.as_ints(), axis, m_count)?;
                let elements = entries
                    .into_iter()
                    .map(|(m, v)| Ok((m, non_negative(spec, v)?)))
                    .collect::<TabResult<Vec<_>>>()?;
                for (m, i) in elements {
                    self.set_index_assignment(m, i)?;
                }
                Ok(())
            }
            FieldCode::ReferenceValue => {
                let entries =
                    addressed(spec, value.as_real(), value.as_reals(), axis, m_count)?;
                for (m, v) in entries {
                    self.set_reference_value(m, v)?;
                }
                Ok(())
            }
            FieldCode::IndexVectors => self.put_index_vectors(spec, &value, axis, table),
            FieldCode::CoordinateArray => match (table, value) {
                (None, FieldValue::Reals(values)) => {
                    self.set_coordinate_array(values);
                    Ok(())
                }
                (Some(i), FieldValue::Real(v)) => self.set_coordinate_value(i, v),
                (Some(_), _) => Err(TabError::shape(
                    spec.name,
                    "a single element takes a scalar value",
                )),
                (None, _) => Err(TabError::shape(
                    spec.name,
                    "the whole field takes a vector value",
                )),
            },
            FieldCode::ElementCount
            | FieldCode::Sense
            | FieldCode::Offset
            | FieldCode::Delta
            | FieldCode::Extrema
            | FieldCode::ErrorRecord => Err(TabError::ReadOnlyField { field: spec.name }),
        }
    }

    fn put_index_vectors(
        &mut self,
        spec: &FieldSpec,
        value: &FieldValue,
        axis: Option<usize>,
        table: Option<usize>,
    ) -> TabResult<()> {
        let Some(m) = axis else {
            // Every axis at once, concatenated in axis order.
            unused(spec, "table", table)?;
            let total: usize = self.k.iter().sum();
            let entries = addressed(spec, None, value.as_reals(), None, total)?;
            let values: Vec<f64> = entries.into_iter().map(|(_, v)| v).collect();
            let mut start = 0;
            let lengths = self.k.clone();
            for (m, len) in lengths.into_iter().enumerate() {
                self.set_index_vector(m, values[start..start + len].to_vec())?;
                start += len;
            }
            return Ok(());
        };

        let len = self.k.get(m).copied().ok_or_else(|| {
            TabError::shape(
                spec.name,
                format!("axis {} out of range for {} axes", m, self.axis_count()),
            )
        })?;
        let entries = addressed(spec, value.as_real(), value.as_reals(), table, len)?;
        match table {
            Some(_) => {
                for (k, v) in entries {
                    self.set_index_value(m, k, v)?;
                }
                Ok(())
            }
            None => self.set_index_vector(m, entries.into_iter().map(|(_, v)| v).collect()),
        }
    }
}
