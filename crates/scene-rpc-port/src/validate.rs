// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Array predicates and structured validation diagnostics.
//!
//! Checks never panic. Each returns `Err(Mismatch)` describing the first
//! violated constraint; message level checks attach the field name and
//! collect failures into a [`ValidationReport`]. Presentation is left to the
//! `Display` impls.

use std::fmt;

use crate::array::{byte_len, Array, ArrayError, Shape};
use crate::dtype::element_width;

/// Constraint an array or scalar was checked against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expected {
    /// Rank must be one of these.
    Rank(Vec<usize>),
    /// Exact shape; `-1` is a wildcard for any non-negative dimension.
    Shape(Vec<i64>),
    /// At least one element.
    NonEmpty,
    /// Type tag must equal one of these.
    DType(Vec<String>),
    /// Rank-2 rows must have at least this many columns.
    MinColumns(i64),
    /// Payload must hold exactly this many bytes.
    ByteLength(usize),
    /// Leading dimension must equal the owner's element count.
    LeadingDim(i64),
    /// Value or every dimension must be non-negative.
    NonNegative,
    /// Shape must describe an addressable number of bytes.
    Addressable,
}

/// What was actually found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Actual {
    /// The array's shape.
    Shape(Vec<i64>),
    /// The array's type tag.
    DType(String),
    /// The payload length in bytes.
    ByteLength(usize),
    /// A scalar field value.
    Value(i64),
}

/// A single violated constraint, without the field it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    /// The constraint.
    pub expected: Expected,
    /// The offending value.
    pub actual: Actual,
}

impl Mismatch {
    fn new(expected: Expected, actual: Actual) -> Self {
        Self { expected, actual }
    }

    /// Attach the name of the field that failed.
    pub fn at(self, field: impl Into<String>) -> ValidationFailure {
        ValidationFailure {
            field: field.into(),
            expected: self.expected,
            actual: self.actual,
        }
    }
}

struct Masked<'s>(&'s [i64]);

impl fmt::Display for Masked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if *d == -1 {
                f.write_str("?")?;
            } else {
                write!(f, "{d}")?;
            }
        }
        f.write_str("]")
    }
}

struct List<'s, T>(&'s [T]);

impl<T: fmt::Display> fmt::Display for List<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{item}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Actual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shape(shape) => write!(f, "{}", Shape(shape)),
            Self::DType(tag) => f.write_str(tag),
            Self::ByteLength(n) => write!(f, "{n}"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actual = &self.actual;
        match &self.expected {
            Expected::Rank(ranks) => {
                write!(f, "expected rank to be in {} but got shape {actual}", List(ranks))
            }
            Expected::Shape(shape) => {
                write!(f, "expected shape {} but got {actual}", Masked(shape))
            }
            Expected::NonEmpty => {
                write!(f, "expected non empty array but got array with shape {actual}")
            }
            Expected::DType(tags) => write!(
                f,
                "expected array type to be one of {} but got {actual}",
                List(tags)
            ),
            Expected::MinColumns(min) => {
                write!(f, "expected shape [?, >{}] but got {actual}", min - 1)
            }
            Expected::ByteLength(n) => {
                write!(f, "expected {n} bytes of data but got {actual}")
            }
            Expected::LeadingDim(n) => {
                write!(f, "expected leading dimension {n} but got shape {actual}")
            }
            Expected::NonNegative => match actual {
                Actual::Shape(_) => {
                    write!(f, "expected non-negative dimensions but got shape {actual}")
                }
                _ => write!(f, "expected non-negative value but got {actual}"),
            },
            Expected::Addressable => {
                write!(f, "expected an addressable shape but got {actual}")
            }
        }
    }
}

/// A violated constraint on a named field: `{field, expected, actual}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Field path, e.g. `faces` or `vertex_attributes[normals]`.
    pub field: String,
    /// The constraint.
    pub expected: Expected,
    /// The offending value.
    pub actual: Actual,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mismatch = Mismatch::new(self.expected.clone(), self.actual.clone());
        write!(f, "invalid {}: {mismatch}", self.field)
    }
}

/// Ordered list of failures collected while validating one message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    /// Empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a field check. Returns whether it passed.
    pub fn record(&mut self, field: impl Into<String>, outcome: Result<(), Mismatch>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(mismatch) => {
                self.failures.push(mismatch.at(field));
                false
            }
        }
    }

    /// Append an already-attributed failure.
    pub fn push(&mut self, failure: ValidationFailure) {
        self.failures.push(failure);
    }

    /// Append every failure of `other`, keeping order.
    pub fn extend(&mut self, other: ValidationReport) {
        self.failures.extend(other.failures);
    }

    /// `true` when nothing failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures in the order they were recorded.
    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    /// `Ok(())` for an empty report, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationReport> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationFailure> for ValidationReport {
    fn from(failure: ValidationFailure) -> Self {
        Self {
            failures: vec![failure],
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

/// Optional checks applied on top of the mandatory mesh checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ValidationPolicy {
    /// Validate `lines` with the same rank/type rules as `faces` (rows of at
    /// least two indices).
    pub validate_lines: bool,
    /// Require `len(data) == width(type) * product(shape)` for every array.
    pub check_byte_lengths: bool,
    /// Require attribute arrays to have one row per vertex, face or line.
    pub check_attribute_counts: bool,
}

impl ValidationPolicy {
    /// Only the mandatory vertex and face checks.
    pub const PERMISSIVE: Self = Self {
        validate_lines: false,
        check_byte_lengths: false,
        check_attribute_counts: false,
    };
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            validate_lines: true,
            check_byte_lengths: true,
            check_attribute_counts: false,
        }
    }
}

impl Array<'_> {
    fn actual_shape(&self) -> Actual {
        Actual::Shape(self.shape.clone())
    }

    /// Passes iff the rank is one of `allowed`.
    pub fn check_rank(&self, allowed: &[usize]) -> Result<(), Mismatch> {
        if allowed.contains(&self.rank()) {
            Ok(())
        } else {
            Err(Mismatch::new(
                Expected::Rank(allowed.to_vec()),
                self.actual_shape(),
            ))
        }
    }

    /// Passes iff the shape matches `expected`, where `-1` accepts any
    /// non-negative dimension.
    pub fn check_shape(&self, expected: &[i64]) -> Result<(), Mismatch> {
        self.check_rank(&[expected.len()])?;
        let matches = expected
            .iter()
            .zip(&self.shape)
            .all(|(&want, &got)| got >= 0 && (want == -1 || want == got));
        if matches {
            Ok(())
        } else {
            Err(Mismatch::new(
                Expected::Shape(expected.to_vec()),
                self.actual_shape(),
            ))
        }
    }

    /// Fails for an empty shape or a shape with a zero dimension.
    pub fn check_non_empty(&self) -> Result<(), Mismatch> {
        if self.shape.is_empty() || self.shape.contains(&0) {
            Err(Mismatch::new(Expected::NonEmpty, self.actual_shape()))
        } else {
            Ok(())
        }
    }

    /// Passes iff the tag equals one of `allowed` exactly.
    pub fn check_type(&self, allowed: &[&str]) -> Result<(), Mismatch> {
        if allowed.iter().any(|tag| *tag == self.dtype) {
            Ok(())
        } else {
            Err(Mismatch::new(
                Expected::DType(allowed.iter().map(|t| (*t).to_owned()).collect()),
                Actual::DType(self.dtype.clone().into_owned()),
            ))
        }
    }

    /// Rank-2 arrays must have at least `min` columns; other ranks pass.
    pub fn check_min_columns(&self, min: i64) -> Result<(), Mismatch> {
        match self.shape.as_slice() {
            [_, cols] if *cols < min => Err(Mismatch::new(
                Expected::MinColumns(min),
                self.actual_shape(),
            )),
            _ => Ok(()),
        }
    }

    /// Payload length must equal `width(type) * product(shape)`.
    ///
    /// Unsupplied arrays and tags without a parseable width pass; the type
    /// checks of the owning field decide whether such tags are acceptable.
    pub fn check_byte_length(&self) -> Result<(), Mismatch> {
        if !self.is_supplied() {
            return Ok(());
        }
        let Some(width) = element_width(&self.dtype) else {
            return Ok(());
        };
        let expected = match byte_len(width, &self.shape) {
            Ok(n) => n,
            Err(ArrayError::NegativeDimension { .. }) => {
                return Err(Mismatch::new(Expected::NonNegative, self.actual_shape()));
            }
            Err(_) => return Err(Mismatch::new(Expected::Addressable, self.actual_shape())),
        };
        if expected == self.data.len() {
            Ok(())
        } else {
            Err(Mismatch::new(
                Expected::ByteLength(expected),
                Actual::ByteLength(self.data.len()),
            ))
        }
    }

    /// Leading dimension must equal `count`; unsupplied arrays pass.
    pub fn check_leading_dim(&self, count: i64) -> Result<(), Mismatch> {
        match self.shape.first() {
            Some(&d) if d != count => Err(Mismatch::new(
                Expected::LeadingDim(count),
                self.actual_shape(),
            )),
            _ => Ok(()),
        }
    }
}

/// A scalar that must not be negative (image sizes and similar).
pub fn check_non_negative(value: i64) -> Result<(), Mismatch> {
    if value < 0 {
        Err(Mismatch::new(Expected::NonNegative, Actual::Value(value)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ElementType;
    use std::borrow::Cow;

    fn shaped(shape: &[i64]) -> Array<'static> {
        Array {
            dtype: Cow::Borrowed(ElementType::F32.tag()),
            shape: shape.to_vec(),
            data: Cow::Borrowed(&[]),
        }
    }

    #[test]
    fn check_shape_wildcard() {
        assert!(shaped(&[5, 3]).check_shape(&[-1, 3]).is_ok());
        assert!(shaped(&[0, 3]).check_shape(&[-1, 3]).is_ok());
        assert!(shaped(&[5, 4]).check_shape(&[-1, 3]).is_err());
        assert!(shaped(&[5]).check_shape(&[-1, 3]).is_err());
    }

    #[test]
    fn check_shape_rejects_negative_dimensions() {
        let err = shaped(&[-5, 3]).check_shape(&[-1, 3]).unwrap_err();
        assert_eq!(err.expected, Expected::Shape(vec![-1, 3]));
        assert_eq!(err.to_string(), "expected shape [?, 3] but got [-5, 3]");
    }

    #[test]
    fn check_shape_reports_rank_first() {
        let err = shaped(&[5]).check_shape(&[-1, 3]).unwrap_err();
        assert_eq!(err.expected, Expected::Rank(vec![2]));
        assert_eq!(err.to_string(), "expected rank to be in (2) but got shape [5]");
    }

    #[test]
    fn check_non_empty() {
        assert!(shaped(&[5, 3]).check_non_empty().is_ok());
        let err = shaped(&[0, 3]).check_non_empty().unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected non empty array but got array with shape [0, 3]"
        );
        assert!(shaped(&[]).check_non_empty().is_err());
    }

    #[test]
    fn check_rank_lists_allowed_ranks() {
        let err = shaped(&[1, 2, 3]).check_rank(&[1, 2]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected rank to be in (1, 2) but got shape [1, 2, 3]"
        );
    }

    #[test]
    fn check_type_is_exact() {
        let arr = shaped(&[4]);
        assert!(arr.check_type(&[ElementType::F32.tag()]).is_ok());
        let err = arr.check_type(&["<i4", "<i8"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "expected array type to be one of (<i4, <i8) but got {}",
                ElementType::F32.tag()
            )
        );
    }

    #[test]
    fn check_min_columns_only_applies_to_rank_two() {
        assert!(shaped(&[4, 3]).check_min_columns(3).is_ok());
        assert!(shaped(&[4]).check_min_columns(3).is_ok());
        let err = shaped(&[4, 2]).check_min_columns(3).unwrap_err();
        assert_eq!(err.to_string(), "expected shape [?, >2] but got [4, 2]");
    }

    #[test]
    fn check_byte_length() {
        let values = [1.0f32, 2.0, 3.0];
        let good = Array::from_slice(&values, vec![3]).unwrap();
        assert!(good.check_byte_length().is_ok());

        let mut short = good.clone();
        short.shape = vec![4];
        assert_eq!(
            short.check_byte_length().unwrap_err().to_string(),
            "expected 16 bytes of data but got 12"
        );

        let mut negative = good.clone();
        negative.shape = vec![-3];
        assert_eq!(
            negative.check_byte_length().unwrap_err().expected,
            Expected::NonNegative
        );

        let mut huge = good;
        huge.shape = vec![i64::MAX, i64::MAX];
        assert_eq!(
            huge.check_byte_length().unwrap_err().expected,
            Expected::Addressable
        );

        let mut unknown = shaped(&[2]);
        unknown.dtype = Cow::Borrowed("garbage");
        assert!(unknown.check_byte_length().is_ok());
        assert!(Array::default().check_byte_length().is_ok());
    }

    #[test]
    fn report_accumulates_in_order() {
        let mut report = ValidationReport::new();
        assert!(report.record("vertices", Ok(())));
        assert!(!report.record("faces", shaped(&[4, 2]).check_min_columns(3)));
        assert!(!report.record("width", check_non_negative(-1)));
        assert_eq!(report.failures().len(), 2);
        assert_eq!(report.failures()[0].field, "faces");
        assert_eq!(
            report.to_string(),
            "invalid faces: expected shape [?, >2] but got [4, 2]; \
             invalid width: expected non-negative value but got -1"
        );
        assert!(report.into_result().is_err());
        assert!(ValidationReport::new().into_result().is_ok());
    }

    #[test]
    fn default_policy_checks_lengths_and_lines() {
        let policy = ValidationPolicy::default();
        assert!(policy.validate_lines);
        assert!(policy.check_byte_lengths);
        assert!(!policy.check_attribute_counts);
        assert_ne!(policy, ValidationPolicy::PERMISSIVE);
    }
}
