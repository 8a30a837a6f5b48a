//! implore-tab - Tabular coordinate lookup for scientific visualization
//!
//! This crate implements FITS `-TAB` style coordinate tables: an axis group
//! whose world coordinates are read from an N-dimensional array indexed by
//! per-axis index vectors, with multilinear interpolation between entries.
//!
//! - **TableTransform**: raw table definition plus its derived lookup data
//! - **Derive**: validation and precomputation, run lazily before lookups
//! - **Lookup**: read-only forward/inverse batch transforms
//! - **Marshal**: get/put by integer field code for out-of-layout callers
//!
//! # Lifecycle
//!
//! Populate raw fields, then transform. The first lookup derives the table;
//! any later raw write invalidates it again. Tables shared across threads
//! are put in bypass mode first, after which derive is a no-op and lookups
//! only ever read:
//!
//! ```
//! use implore_tab::{RowStatus, TableTransform};
//!
//! let mut tab = TableTransform::initialize(1, &[4]).unwrap();
//! tab.set_coordinate_array(vec![10.0, 20.0, 30.0, 40.0]);
//! tab.enter_bypass();
//! tab.derive().unwrap();
//!
//! let lookup = tab.lookup().unwrap();
//! let mut world = [0.0];
//! let mut status = [RowStatus::Ok];
//! lookup.forward(1, 1, &[2.5], &mut world, &mut status).unwrap();
//! assert_eq!(world[0], 25.0);
//! ```

pub mod config;
pub mod derive;
pub mod error;
pub mod ffi;
pub mod field;
pub mod lookup;
pub mod marshal;
pub mod table;

pub use config::LookupConfig;
pub use derive::{Derived, MAX_AXES};
pub use error::{ErrorKind, ErrorRecord, TabError, TabResult};
pub use ffi::{BatchResult, TabErrorFfi, TableTransformHandle};
pub use field::{Access, ElementType, FieldCode, FieldShape, FieldSpec, FieldValue, FIELD_REGISTRY};
pub use lookup::{BatchSummary, Lookup, RowStatus};
pub use table::{compare, CompareMode, TabState, TableSize, TableTransform};

// Setup UniFFI when the feature is enabled
#[cfg(feature = "uniffi")]
uniffi::setup_scaffolding!();
