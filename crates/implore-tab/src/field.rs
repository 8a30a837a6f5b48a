//! Field registry for the table-transform object.
//!
//! Every addressable attribute of a [`crate::TableTransform`] has a stable
//! integer code, an element type, a shape and an access mode. The
//! marshalling layer consults [`FIELD_REGISTRY`] only; adding a field means
//! adding one entry here.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorRecord, TabError, TabResult};

/// Stable field codes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum FieldCode {
    State,
    AxisCount,
    TableLength,
    IndexAssignment,
    ReferenceValue,
    IndexVectors,
    CoordinateArray,
    ElementCount,
    Sense,
    Offset,
    Delta,
    Extrema,
    ErrorRecord,
}

impl FieldCode {
    /// Integer code used on the wire
    pub fn code(&self) -> i32 {
        match self {
            FieldCode::State => 100,
            FieldCode::AxisCount => 101,
            FieldCode::TableLength => 102,
            FieldCode::IndexAssignment => 103,
            FieldCode::ReferenceValue => 104,
            FieldCode::IndexVectors => 105,
            FieldCode::CoordinateArray => 106,
            FieldCode::ElementCount => 200,
            FieldCode::Sense => 201,
            FieldCode::Offset => 202,
            FieldCode::Delta => 203,
            FieldCode::Extrema => 204,
            FieldCode::ErrorRecord => 205,
        }
    }

    /// Registry entry for this code
    pub fn spec(&self) -> &'static FieldSpec {
        // Registry entries are listed in declaration order.
        &FIELD_REGISTRY[*self as usize]
    }
}

impl TryFrom<i32> for FieldCode {
    type Error = TabError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        FIELD_REGISTRY
            .iter()
            .find(|spec| spec.code.code() == code)
            .map(|spec| spec.code)
            .ok_or(TabError::UnknownField { code })
    }
}

/// Element type of a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementType {
    Int,
    Real,
    Record,
}

/// Declared shape of a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldShape {
    /// A single value
    Scalar,
    /// One value per table axis (length `M`)
    PerAxis,
    /// One vector per axis, of length `K[m]`
    Ragged,
    /// A flattened multi-dimensional array
    Flat,
}

/// Who may write a field
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Raw input, writable; writes invalidate derived state
    Raw,
    /// Writable control field (the state flag)
    Control,
    /// Produced by derive, read-only
    Derived,
    /// Readable in any state, never written through the protocol
    Diagnostic,
}

/// One registry entry
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldSpec {
    pub code: FieldCode,
    pub name: &'static str,
    pub element: ElementType,
    pub shape: FieldShape,
    pub access: Access,
}

impl FieldSpec {
    const fn new(
        code: FieldCode,
        name: &'static str,
        element: ElementType,
        shape: FieldShape,
        access: Access,
    ) -> Self {
        Self {
            code,
            name,
            element,
            shape,
            access,
        }
    }

    /// Look up a registry entry by wire code
    pub fn lookup(code: i32) -> TabResult<&'static FieldSpec> {
        FieldCode::try_from(code).map(|code| code.spec())
    }

    /// Whether reading requires the table to be derived
    pub fn requires_derive(&self) -> bool {
        self.access == Access::Derived
    }

    /// Check a value's variant against this entry's element type
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self.element, value) {
            (ElementType::Int, FieldValue::Int(_) | FieldValue::Ints(_)) => true,
            (ElementType::Real, FieldValue::Real(_) | FieldValue::Reals(_)) => true,
            (ElementType::Record, FieldValue::Error(_)) => true,
            _ => false,
        }
    }
}

/// The single source of truth for field metadata
pub static FIELD_REGISTRY: [FieldSpec; 13] = [
    FieldSpec::new(FieldCode::State, "state", ElementType::Int, FieldShape::Scalar, Access::Control),
    FieldSpec::new(FieldCode::AxisCount, "axis_count", ElementType::Int, FieldShape::Scalar, Access::Raw),
    FieldSpec::new(FieldCode::TableLength, "table_length", ElementType::Int, FieldShape::PerAxis, Access::Raw),
    FieldSpec::new(FieldCode::IndexAssignment, "index_assignment", ElementType::Int, FieldShape::PerAxis, Access::Raw),
    FieldSpec::new(FieldCode::ReferenceValue, "reference_value", ElementType::Real, FieldShape::PerAxis, Access::Raw),
    FieldSpec::new(FieldCode::IndexVectors, "index_vectors", ElementType::Real, FieldShape::Ragged, Access::Raw),
    FieldSpec::new(FieldCode::CoordinateArray, "coordinate_array", ElementType::Real, FieldShape::Flat, Access::Raw),
    FieldSpec::new(FieldCode::ElementCount, "element_count", ElementType::Int, FieldShape::Scalar, Access::Derived),
    FieldSpec::new(FieldCode::Sense, "sense", ElementType::Int, FieldShape::PerAxis, Access::Derived),
    FieldSpec::new(FieldCode::Offset, "offset", ElementType::Int, FieldShape::PerAxis, Access::Derived),
    FieldSpec::new(FieldCode::Delta, "delta", ElementType::Real, FieldShape::PerAxis, Access::Derived),
    FieldSpec::new(FieldCode::Extrema, "extrema", ElementType::Real, FieldShape::Flat, Access::Derived),
    FieldSpec::new(FieldCode::ErrorRecord, "error_record", ElementType::Record, FieldShape::Scalar, Access::Diagnostic),
];

/// A field value crossing the marshalling boundary
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum FieldValue {
    Int(i64),
    Real(f64),
    Ints(Vec<i64>),
    Reals(Vec<f64>),
    Error(Option<ErrorRecord>),
}

impl FieldValue {
    /// Try to extract as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to extract as f64
    pub fn as_real(&self) -> Option<f64> {
        match self {
            FieldValue::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to extract as an integer vector
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            FieldValue::Ints(v) => Some(v),
            _ => None,
        }
    }

    /// Try to extract as a real vector
    pub fn as_reals(&self) -> Option<&[f64]> {
        match self {
            FieldValue::Reals(v) => Some(v),
            _ => None,
        }
    }

    /// Number of elements carried
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Int(_) | FieldValue::Real(_) | FieldValue::Error(_) => 1,
            FieldValue::Ints(v) => v.len(),
            FieldValue::Reals(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
