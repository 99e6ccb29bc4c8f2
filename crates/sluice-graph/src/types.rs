//! Value type descriptors.
//!
//! Every node output carries one [`ValueType`]. The set is closed: scalars,
//! vectors, strings, tabular frames, column sets, sparse matrices and opaque
//! handles.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, IntoStaticStr};

use crate::error::{GraphError, GraphResult};

/// Element kinds for scalar values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScalarKind {
    /// 64-bit float.
    Double,
    /// 64-bit signed integer.
    Long,
    /// 32-bit signed integer.
    Int,
    /// 8-bit character.
    Char,
    /// Boolean flag.
    Bool,
}

/// Shape descriptor for a node output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueType {
    /// A single scalar.
    Scalar {
        /// Scalar element kind.
        kind: ScalarKind,
    },
    /// A vector of values of one type.
    Vector {
        /// Element type.
        elem: Box<ValueType>,
    },
    /// A string.
    Str,
    /// A tabular frame with named, typed columns.
    Frame(FrameType),
    /// An ordered list of named same-length columns sharing an element type.
    ColumnSet(ColumnSetType),
    /// A sparse matrix in compressed-row form.
    SparseMatrix,
    /// An opaque handle, such as a trained model.
    Handle,
}

impl ValueType {
    /// Creates a scalar type.
    pub const fn scalar(kind: ScalarKind) -> Self {
        Self::Scalar { kind }
    }

    /// Creates a vector type over `elem`.
    pub fn vector(elem: ValueType) -> Self {
        Self::Vector {
            elem: Box::new(elem),
        }
    }

    /// A vector of doubles.
    pub fn doubles() -> Self {
        Self::vector(Self::scalar(ScalarKind::Double))
    }

    /// A vector of booleans.
    pub fn mask() -> Self {
        Self::vector(Self::scalar(ScalarKind::Bool))
    }

    /// A dense row-major matrix of doubles.
    pub fn dense_matrix() -> Self {
        Self::vector(Self::doubles())
    }

    /// Returns the frame type, if this is a frame.
    pub fn as_frame(&self) -> Option<&FrameType> {
        match self {
            Self::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// Returns the column set type, if this is a column set.
    pub fn as_column_set(&self) -> Option<&ColumnSetType> {
        match self {
            Self::ColumnSet(columns) => Some(columns),
            _ => None,
        }
    }

    /// Column names of a frame or column set; empty for every other type.
    pub fn column_names(&self) -> Vec<&str> {
        match self {
            Self::Frame(frame) => frame.column_names().collect(),
            Self::ColumnSet(columns) => columns.columns.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether this is a vector of vectors (a dense matrix).
    pub fn is_dense_matrix(&self) -> bool {
        matches!(self, Self::Vector { elem } if matches!(elem.as_ref(), Self::Vector { .. }))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar { kind } => f.write_str(kind.as_ref()),
            Self::Vector { elem } => write!(f, "vec[{elem}]"),
            Self::Str => f.write_str("str"),
            Self::Frame(frame) => {
                f.write_str("frame{")?;
                for (i, column) in frame.columns.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", column.name, column.ty)?;
                }
                f.write_str("}")
            }
            Self::ColumnSet(columns) => {
                write!(f, "columns[{}]{{{}}}", columns.elem, columns.columns.join(", "))
            }
            Self::SparseMatrix => f.write_str("csr"),
            Self::Handle => f.write_str("handle"),
        }
    }
}

/// A named, typed frame column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its frame.
    pub name: String,
    /// Column element type.
    pub ty: ValueType,
}

impl Column {
    /// Creates a new column.
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered mapping of column name to column type. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameType {
    columns: Vec<Column>,
}

impl FrameType {
    /// Creates a frame type, rejecting duplicate column names.
    pub fn new(columns: Vec<Column>) -> GraphResult<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(GraphError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self { columns })
    }

    /// Creates a frame of double columns with the given names.
    pub fn doubles<I, S>(names: I) -> GraphResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| Column::new(name, ValueType::scalar(ScalarKind::Double)))
                .collect(),
        )
    }

    /// Returns the columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Returns the column types in order.
    pub fn field_types(&self) -> impl Iterator<Item = &ValueType> {
        self.columns.iter().map(|c| &c.ty)
    }

    /// Returns the type of a named column.
    pub fn column_type(&self, name: &str) -> Option<&ValueType> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.ty)
    }

    /// Whether the frame has a column with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the frame has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Projects the frame onto `names`, in the order given.
    ///
    /// Names that are not columns of this frame are skipped.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let columns = names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                self.column_type(name).map(|ty| Column::new(name, ty.clone()))
            })
            .collect();
        Self { columns }
    }

    /// Appends the columns of `other` after the columns of `self`.
    pub fn concat(&self, other: &FrameType) -> GraphResult<Self> {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Self::new(columns)
    }
}

/// An ordered list of named same-length columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSetType {
    /// Element type shared by every column.
    pub elem: Box<ValueType>,
    /// Column names, in order.
    pub columns: Vec<String>,
}

impl ColumnSetType {
    /// Creates a column set type.
    pub fn new<I, S>(elem: ValueType, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elem: Box::new(elem),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns a column set with the same element type and new columns.
    pub fn with_columns(&self, columns: Vec<String>) -> Self {
        Self {
            elem: self.elem.clone(),
            columns,
        }
    }
}
