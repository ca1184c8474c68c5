//! Postgres row operation.
//!
//! - [`Row`]
//! - [`Field`]
//! - [`Index`]
//! - [`DecodeError`]
use std::{borrow::Cow, collections::HashMap, fmt, sync::Arc};

use crate::{
    coerce::{CoerceError, FromText},
    common::{ByteStr, unit_error},
    postgres::{
        ProtocolError,
        backend::{DataRow, RowDescription},
    },
};

/// Column names of one result, shared by every row of that result.
pub(crate) type Schema = Arc<[ByteStr]>;

pub(crate) fn schema(desc: RowDescription) -> Schema {
    desc.fields.into_iter().map(|e| e.name).collect()
}

/// Postgres row in text format.
///
/// Field order follows the `RowDescription` of the result. Lookup by name
/// resolves to the last column with that name, lookup by index always reaches
/// every column.
#[derive(Clone)]
pub struct Row {
    columns: Schema,
    values: Vec<Option<ByteStr>>,
}

impl Row {
    /// Zip `DataRow` against the schema.
    pub(crate) fn new(columns: Schema, datarow: DataRow) -> Result<Self, ProtocolError> {
        if datarow.values.len() != columns.len() {
            return Err(ProtocolError::ColumnCount {
                expect: columns.len(),
                found: datarow.values.len(),
            });
        }

        let values = datarow
            .values
            .into_iter()
            .map(|e| e.map(ByteStr::from_utf8).transpose())
            .collect::<Result<_, _>>()?;

        Ok(Self { columns, values })
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns column names in order.
    pub fn columns(&self) -> &[ByteStr] {
        &self.columns
    }

    /// Get column text value.
    ///
    /// `NULL` is returned as empty string, use [`Row::is_null`] to tell them apart.
    ///
    /// Returns [`None`] if column not found.
    pub fn get<I: Index>(&self, idx: I) -> Option<&str> {
        let i = idx.position(&self.columns)?;
        Some(self.values[i].as_deref().unwrap_or_default())
    }

    /// Get column text value by position.
    pub fn get_index(&self, i: usize) -> Option<&str> {
        self.get(i)
    }

    /// Returns `true` if column is `NULL`, or not found.
    pub fn is_null<I: Index>(&self, idx: I) -> bool {
        match idx.position(&self.columns) {
            Some(i) => self.values[i].is_none(),
            None => true,
        }
    }

    /// Try get and coerce column.
    ///
    /// `NULL` is coerced from empty string.
    pub fn try_get<I: Index, T: FromText>(&self, idx: I) -> Result<T, DecodeError> {
        let Some(i) = idx.position(&self.columns) else {
            return Err(DecodeError::ColumnNotFound(idx.into_name()));
        };
        Ok(T::from_text(self.values[i].as_deref().unwrap_or_default())?)
    }

    /// Iterate over fields in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Field<'_>> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(name, value)| Field { name: name.as_str(), value: value.as_deref() })
    }

    /// Collect into map of column name to text value.
    ///
    /// Duplicate column name is overwritten by the later column, `NULL` becomes empty string.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.iter()
            .map(|e| (e.name.to_owned(), e.text().to_owned()))
            .collect()
    }

    pub(crate) fn into_values(self) -> Vec<Option<ByteStr>> {
        self.values
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for field in self.iter() {
            dbg.key(&field.name);
            match field.value {
                Some(value) => dbg.value(&value),
                None => dbg.value(&format_args!("NULL")),
            };
        }
        dbg.finish()
    }
}

/// A single column of [`Row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub name: &'a str,
    /// [`None`] if value is `NULL`.
    pub value: Option<&'a str>,
}

impl<'a> Field<'a> {
    /// Text value, `NULL` as empty string.
    pub fn text(&self) -> &'a str {
        self.value.unwrap_or_default()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns the column position.
    fn position(&self, columns: &[ByteStr]) -> Option<usize>;

    fn into_name(self) -> Cow<'static, str>;
}

impl Index for usize {
    fn position(&self, columns: &[ByteStr]) -> Option<usize> {
        (*self < columns.len()).then_some(*self)
    }

    fn into_name(self) -> Cow<'static, str> {
        String::from(itoa::Buffer::new().format(self)).into()
    }
}

impl Index for &str {
    fn position(&self, columns: &[ByteStr]) -> Option<usize> {
        columns.iter().rposition(|e| e == self)
    }

    fn into_name(self) -> Cow<'static, str> {
        String::from(self).into()
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when selecting a single value and the query returns no row.
    pub struct RowNotFound("row not found");
}

/// An error when selecting a single value and the query does not return exactly one row with one column.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShapeError {
    pub rows: usize,
    pub columns: usize,
}

impl std::error::Error for ShapeError { }

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected exactly one row with one column, found {} rows with {} columns",
            self.rows, self.columns,
        )
    }
}

impl fmt::Debug for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Column requested not found.
    ColumnNotFound(Cow<'static, str>),
    /// Column text cannot be coerced.
    Coerce(CoerceError),
}

impl From<CoerceError> for DecodeError {
    fn from(value: CoerceError) -> Self {
        Self::Coerce(value)
    }
}

impl std::error::Error for DecodeError { }

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::Coerce(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
