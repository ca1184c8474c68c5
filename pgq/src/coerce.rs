//! Textual value coercion.
//!
//! Simple query returns every value in text format, [`FromText`] turns the text
//! into a bounded rust type.
//!
//! Integer is parsed with arbitrary precision first, then range checked against
//! the target type, so a value wider than 64 bit is reported as out of range
//! instead of wrapping.
use num_bigint::BigInt;
use std::fmt;

use crate::common::ByteStr;

/// A type that can be parsed from postgres text format.
pub trait FromText: Sized {
    /// Type name used in error message.
    const TYPE_NAME: &'static str;

    fn from_text(text: &str) -> Result<Self, CoerceError>;
}

/// Parse arbitrary precision integer.
///
/// Accept optional sign, ascii digits, and optional fraction consisting only
/// of zeros, as in `numeric` output like `1.00`.
fn parse_integer(text: &str) -> Option<BigInt> {
    let (int, fraction) = match text.split_once('.') {
        Some((int, fraction)) => (int, Some(fraction)),
        None => (text, None),
    };

    if let Some(fraction) = fraction {
        if !fraction.bytes().all(|e| e == b'0') {
            return None;
        }
    }

    let digits = int.strip_prefix(['+', '-']).unwrap_or(int);
    if digits.is_empty() || !digits.bytes().all(|e| e.is_ascii_digit()) {
        return None;
    }

    BigInt::parse_bytes(int.as_bytes(), 10)
}

macro_rules! integer {
    ($ty:ty, $name:literal) => {
        impl FromText for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_text(text: &str) -> Result<Self, CoerceError> {
                let Some(value) = parse_integer(text) else {
                    return Err(CoerceError::format(Self::TYPE_NAME, text));
                };
                <$ty>::try_from(&value).map_err(|_| CoerceError::out_of_range(Self::TYPE_NAME, text))
            }
        }
    };
}

integer!(i16, "int16");
integer!(i32, "int32");
integer!(i64, "int64");

fn is_infinity(text: &str) -> bool {
    let text = text.strip_prefix(['+', '-']).unwrap_or(text);
    text.eq_ignore_ascii_case("infinity") || text.eq_ignore_ascii_case("inf")
}

macro_rules! float {
    ($ty:ty, $name:literal) => {
        impl FromText for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_text(text: &str) -> Result<Self, CoerceError> {
                let Ok(value) = text.parse::<$ty>() else {
                    return Err(CoerceError::format(Self::TYPE_NAME, text));
                };
                // finite text which overflow the target width
                if value.is_infinite() && !is_infinity(text) {
                    return Err(CoerceError::out_of_range(Self::TYPE_NAME, text));
                }
                Ok(value)
            }
        }
    };
}

float!(f32, "float32");
float!(f64, "float64");

impl FromText for String {
    const TYPE_NAME: &'static str = "string";

    fn from_text(text: &str) -> Result<Self, CoerceError> {
        Ok(text.to_owned())
    }
}

impl FromText for ByteStr {
    const TYPE_NAME: &'static str = "string";

    fn from_text(text: &str) -> Result<Self, CoerceError> {
        Ok(ByteStr::copy_from_str(text))
    }
}

/// An error when coercing textual value.
#[derive(Clone, PartialEq, Eq)]
pub enum CoerceError {
    /// Value is a valid number, but does not fit in the target type.
    OutOfRange {
        target: &'static str,
        value: String,
    },
    /// Value is not a valid number.
    Format {
        target: &'static str,
        value: String,
    },
}

impl CoerceError {
    fn out_of_range(target: &'static str, value: &str) -> Self {
        Self::OutOfRange { target, value: value.into() }
    }

    fn format(target: &'static str, value: &str) -> Self {
        Self::Format { target, value: value.into() }
    }

    /// Type name of the target.
    pub fn target(&self) -> &'static str {
        match self {
            Self::OutOfRange { target, .. } | Self::Format { target, .. } => target,
        }
    }

    /// The text that failed to coerce.
    pub fn value(&self) -> &str {
        match self {
            Self::OutOfRange { value, .. } | Self::Format { value, .. } => value,
        }
    }
}

impl std::error::Error for CoerceError { }

impl fmt::Display for CoerceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { target, value } => write!(f, "value out of range for {target}: {value}"),
            Self::Format { target, value } => write!(f, "invalid input syntax for {target}: {value:?}"),
        }
    }
}

impl fmt::Debug for CoerceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
