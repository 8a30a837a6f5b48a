//! FFI bindings for table transforms.
//!
//! UniFFI-compatible wrapper around [`TableTransform`] for use from Swift.
//! Everything crosses by value. Lookups on a ready table share the read
//! lock, so any number of host threads can transform batches at once; only
//! the first lookup on an unset table takes the write lock to derive.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::LookupConfig;
use crate::error::{ErrorRecord, TabError, TabResult};
use crate::field::FieldValue;
use crate::lookup::{BatchSummary, Lookup, RowStatus};
use crate::table::{self, CompareMode, TabState, TableSize, TableTransform};

/// Output of one batch transform
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Record))]
pub struct BatchResult {
    /// Transformed rows; elements past `count * stride` are the input's
    pub output: Vec<f64>,

    /// One status per row
    pub status: Vec<RowStatus>,

    /// Rows that did not come back `Ok`
    pub failed: u64,
}

/// FFI-safe error type for table operations.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Error))]
pub enum TabErrorFfi {
    Allocation { message: String },
    Validation { message: String },
    NotReady { field: String },
    UnknownField { code: i32 },
    Shape { field: String, message: String },
    ReadOnlyField { field: String },

    /// Internal lock error (table was poisoned)
    Lock { message: String },
}

impl std::fmt::Display for TabErrorFfi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TabErrorFfi::Allocation { message } => write!(f, "Allocation failed: {}", message),
            TabErrorFfi::Validation { message } => {
                write!(f, "Invalid table parameters: {}", message)
            }
            TabErrorFfi::NotReady { field } => {
                write!(f, "Field {} is not available until the table is derived", field)
            }
            TabErrorFfi::UnknownField { code } => write!(f, "Unknown field code: {}", code),
            TabErrorFfi::Shape { field, message } => {
                write!(f, "Shape mismatch for {}: {}", field, message)
            }
            TabErrorFfi::ReadOnlyField { field } => write!(f, "Field {} is read-only", field),
            TabErrorFfi::Lock { message } => write!(f, "Lock error: {}", message),
        }
    }
}

impl std::error::Error for TabErrorFfi {}

impl From<TabError> for TabErrorFfi {
    fn from(err: TabError) -> Self {
        match err {
            TabError::Allocation { message } => TabErrorFfi::Allocation { message },
            TabError::Validation { message } => TabErrorFfi::Validation { message },
            TabError::NotReady { field } => TabErrorFfi::NotReady {
                field: field.to_string(),
            },
            TabError::UnknownField { code } => TabErrorFfi::UnknownField { code },
            TabError::Shape { field, message } => TabErrorFfi::Shape {
                field: field.to_string(),
                message,
            },
            TabError::ReadOnlyField { field } => TabErrorFfi::ReadOnlyField {
                field: field.to_string(),
            },
        }
    }
}

fn to_index(index: Option<u32>) -> Option<usize> {
    index.map(|i| i as usize)
}

fn kernel(
    lookup: &Lookup<'_>,
    inverse: bool,
    count: usize,
    stride: usize,
    input: &[f64],
    output: &mut [f64],
    status: &mut [RowStatus],
) -> TabResult<BatchSummary> {
    #[cfg(feature = "parallel")]
    {
        if inverse {
            lookup.par_inverse(count, stride, input, output, status)
        } else {
            lookup.par_forward(count, stride, input, output, status)
        }
    }

    #[cfg(not(feature = "parallel"))]
    {
        if inverse {
            lookup.inverse(count, stride, input, output, status)
        } else {
            lookup.forward(count, stride, input, output, status)
        }
    }
}

/// Thread-safe handle to one table transform.
#[cfg_attr(feature = "uniffi", derive(uniffi::Object))]
pub struct TableTransformHandle {
    table: RwLock<TableTransform>,
}

impl TableTransformHandle {
    fn read(&self) -> Result<RwLockReadGuard<'_, TableTransform>, TabErrorFfi> {
        self.table.read().map_err(|e| TabErrorFfi::Lock {
            message: format!("Failed to acquire table lock: {}", e),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, TableTransform>, TabErrorFfi> {
        self.table.write().map_err(|e| TabErrorFfi::Lock {
            message: format!("Failed to acquire table lock: {}", e),
        })
    }

    /// Wrap an existing table
    pub fn from_table(table: TableTransform) -> Self {
        Self {
            table: RwLock::new(table),
        }
    }

    fn batch(
        &self,
        inverse: bool,
        count: u32,
        stride: u32,
        input: Vec<f64>,
    ) -> Result<BatchResult, TabErrorFfi> {
        let (count, stride) = (count as usize, stride as usize);
        let mut output = input.clone();
        let mut status = vec![RowStatus::Ok; count];

        let summary = {
            let table = self.read()?;
            if table.is_ready() {
                let lookup = table.lookup()?;
                Some(kernel(&lookup, inverse, count, stride, &input, &mut output, &mut status)?)
            } else {
                None
            }
        };

        let summary = match summary {
            Some(summary) => summary,
            None => {
                // Another caller may have derived while we waited; derive
                // is then a no-op.
                let mut table = self.write()?;
                table.derive()?;
                let result = table.lookup().and_then(|lookup| {
                    kernel(&lookup, inverse, count, stride, &input, &mut output, &mut status)
                });
                result.or_else(|err| table.fail(err))?
            }
        };

        Ok(BatchResult {
            output,
            status,
            failed: summary.failed() as u64,
        })
    }
}

#[cfg_attr(feature = "uniffi", uniffi::export)]
impl TableTransformHandle {
    /// Allocate a table with the given per-axis lengths.
    #[cfg_attr(feature = "uniffi", uniffi::constructor)]
    pub fn new(axis_count: u32, table_length: Vec<u32>) -> Result<Self, TabErrorFfi> {
        let lengths: Vec<usize> = table_length.into_iter().map(|k| k as usize).collect();
        let table = TableTransform::initialize(axis_count as usize, &lengths)?;
        Ok(Self::from_table(table))
    }

    /// Deep copy into an independent handle.
    pub fn copy(&self) -> Result<Arc<Self>, TabErrorFfi> {
        let table = self.read()?.copy()?;
        Ok(Arc::new(Self::from_table(table)))
    }

    /// Read a field by code.
    pub fn get(&self, code: i32) -> Result<FieldValue, TabErrorFfi> {
        Ok(self.read()?.get(code)?)
    }

    /// Write a field, or one element of it, by code.
    pub fn put(
        &self,
        code: i32,
        value: FieldValue,
        axis: Option<u32>,
        table: Option<u32>,
    ) -> Result<(), TabErrorFfi> {
        Ok(self
            .write()?
            .put(code, value, to_index(axis), to_index(table))?)
    }

    /// Validate and compute derived data; no-op when already derived.
    pub fn derive(&self) -> Result<(), TabErrorFfi> {
        Ok(self.write()?.derive()?)
    }

    /// Suppress re-derivation for the lifetime of concurrent lookups.
    pub fn enter_bypass(&self) -> Result<(), TabErrorFfi> {
        self.write()?.enter_bypass();
        Ok(())
    }

    /// Resume derive-on-demand; derived data is kept if present.
    pub fn leave_bypass(&self) -> Result<(), TabErrorFfi> {
        self.write()?.leave_bypass();
        Ok(())
    }

    pub fn state(&self) -> Result<TabState, TabErrorFfi> {
        Ok(self.read()?.state())
    }

    pub fn is_ready(&self) -> Result<bool, TabErrorFfi> {
        Ok(self.read()?.is_ready())
    }

    pub fn last_error(&self) -> Result<Option<ErrorRecord>, TabErrorFfi> {
        Ok(self.read()?.last_error().cloned())
    }

    pub fn config(&self) -> Result<LookupConfig, TabErrorFfi> {
        Ok(*self.read()?.config())
    }

    pub fn set_config(&self, config: LookupConfig) -> Result<(), TabErrorFfi> {
        self.write()?.set_config(config);
        Ok(())
    }

    /// Intermediate → world for `count` rows of `stride` values.
    pub fn forward(
        &self,
        count: u32,
        stride: u32,
        input: Vec<f64>,
    ) -> Result<BatchResult, TabErrorFfi> {
        self.batch(false, count, stride, input)
    }

    /// World → intermediate for `count` rows of `stride` values.
    pub fn inverse(
        &self,
        count: u32,
        stride: u32,
        world: Vec<f64>,
    ) -> Result<BatchResult, TabErrorFfi> {
        self.batch(true, count, stride, world)
    }

    /// Compare raw fields with another table.
    pub fn compare(
        &self,
        other: Arc<TableTransformHandle>,
        mode: CompareMode,
        tolerance: f64,
    ) -> Result<bool, TabErrorFfi> {
        if std::ptr::eq(self, Arc::as_ptr(&other)) {
            return Ok(true);
        }
        let a = self.read()?;
        let b = other.read()?;
        Ok(table::compare(mode, tolerance, &a, &b))
    }

    /// Memory footprint of the table.
    pub fn size(&self) -> Result<TableSize, TabErrorFfi> {
        Ok(self.read()?.size_of())
    }
}
