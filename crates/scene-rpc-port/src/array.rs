// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Typed, shaped view over a contiguous byte buffer.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

use crate::dtype::{element_width, Element, ElementType};

/// Errors raised while building an [`Array`] or reading it back as typed data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    /// A dimension in the requested shape is negative.
    #[error("negative dimension in shape {}", Shape(.shape))]
    NegativeDimension {
        /// The rejected shape.
        shape: Vec<i64>,
    },
    /// The element count or byte length of the shape does not fit in memory.
    #[error("shape {} overflows the addressable size", Shape(.shape))]
    ShapeOverflow {
        /// The rejected shape.
        shape: Vec<i64>,
    },
    /// The source buffer holds fewer bytes than the shape requires.
    #[error("buffer too short: need {needed} bytes, got {available}")]
    BufferTooShort {
        /// Bytes required by `element size * product(shape)`.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// The payload length is not a whole number of elements.
    #[error("payload of {len} bytes is not a multiple of the element size {size}")]
    LengthNotMultiple {
        /// Payload length in bytes.
        len: usize,
        /// Requested element size in bytes.
        size: usize,
    },
    /// The payload cannot be reinterpreted in place (alignment or size).
    #[error("cannot view payload as {ty}: {reason:?}")]
    Cast {
        /// Name of the requested element type.
        ty: &'static str,
        /// Reason reported by `bytemuck`.
        reason: bytemuck::PodCastError,
    },
}

/// A typed, shaped, non-owning view over a contiguous byte buffer.
///
/// The wire form is the map `{type, shape, data}`; `type` is a numpy style
/// tag such as `<f4` (see [`ElementType::tag`]). Arrays built from a slice or
/// decoded from a message borrow their bytes, so they cannot outlive the
/// buffer they were built from. [`into_owned`](Self::into_owned) is the only
/// way to detach them.
///
/// An array with an empty shape stands for "not supplied".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Array<'a> {
    /// Type tag, e.g. `<f4`. Not validated on construction from the wire.
    pub dtype: Cow<'a, str>,
    /// Dimensions, outermost first.
    pub shape: Vec<i64>,
    /// Raw payload bytes in the byte order named by `dtype`.
    pub data: Cow<'a, [u8]>,
}

impl<'a> Array<'a> {
    /// Message identifier of a standalone array.
    pub const MSG_ID: &'static str = "array";

    /// Build a view of `element_type` values with the given shape over the
    /// start of `bytes`.
    ///
    /// The view covers exactly `element size * product(shape)` bytes; trailing
    /// bytes of `bytes` are not part of the array.
    pub fn from_bytes(
        bytes: &'a [u8],
        element_type: ElementType,
        shape: Vec<i64>,
    ) -> Result<Self, ArrayError> {
        let needed = byte_len(element_type.size(), &shape)?;
        let data = bytes.get(..needed).ok_or(ArrayError::BufferTooShort {
            needed,
            available: bytes.len(),
        })?;
        Ok(Self {
            dtype: Cow::Borrowed(element_type.tag()),
            shape,
            data: Cow::Borrowed(data),
        })
    }

    /// Build a view over a typed slice.
    pub fn from_slice<T: Element>(values: &'a [T], shape: Vec<i64>) -> Result<Self, ArrayError> {
        Self::from_bytes(bytemuck::cast_slice(values), T::TYPE, shape)
    }

    /// Shape rank (number of dimensions).
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// `false` for the empty-shape placeholder meaning "not supplied".
    pub fn is_supplied(&self) -> bool {
        !self.shape.is_empty()
    }

    /// Host element kind named by the tag, if it is one of the canonical tags.
    pub fn element_type(&self) -> Option<ElementType> {
        ElementType::from_tag(&self.dtype)
    }

    /// `product(shape)`, or `None` for negative dimensions or overflow.
    pub fn element_count(&self) -> Option<usize> {
        element_count(&self.shape).ok()
    }

    /// Bytes the payload should hold according to tag width and shape.
    pub fn expected_byte_len(&self) -> Option<usize> {
        let width = element_width(&self.dtype)?;
        byte_len(width, &self.shape).ok()
    }

    /// Reinterpret the payload in place.
    ///
    /// The tag is not consulted: callers must have matched `T` against the
    /// tag (e.g. with [`check_type`](Self::check_type)) first. Fails when the
    /// payload is misaligned for `T`, which is common for decoded buffers; use
    /// [`to_vec`](Self::to_vec) there.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], ArrayError> {
        bytemuck::try_cast_slice(&self.data).map_err(|reason| ArrayError::Cast {
            ty: std::any::type_name::<T>(),
            reason,
        })
    }

    /// Copy the payload out as `T` values. Works on unaligned payloads.
    ///
    /// Like [`as_slice`](Self::as_slice), the tag is trusted.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, ArrayError> {
        let size = std::mem::size_of::<T>();
        if self.data.len() % size != 0 {
            return Err(ArrayError::LengthNotMultiple {
                len: self.data.len(),
                size,
            });
        }
        Ok(self
            .data
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect())
    }

    /// Deep copy that no longer borrows the source buffer.
    pub fn into_owned(self) -> Array<'static> {
        Array {
            dtype: Cow::Owned(self.dtype.into_owned()),
            shape: self.shape,
            data: Cow::Owned(self.data.into_owned()),
        }
    }
}

impl Array<'static> {
    /// Build an owning array from typed values.
    pub fn from_vec<T: Element>(values: &[T], shape: Vec<i64>) -> Result<Self, ArrayError> {
        Array::from_slice(values, shape).map(Array::into_owned)
    }
}

fn element_count(shape: &[i64]) -> Result<usize, ArrayError> {
    shape.iter().try_fold(1usize, |acc, &d| {
        let d = usize::try_from(d).map_err(|_| ArrayError::NegativeDimension {
            shape: shape.to_vec(),
        })?;
        acc.checked_mul(d).ok_or_else(|| ArrayError::ShapeOverflow {
            shape: shape.to_vec(),
        })
    })
}

pub(crate) fn byte_len(width: usize, shape: &[i64]) -> Result<usize, ArrayError> {
    element_count(shape)?
        .checked_mul(width)
        .ok_or_else(|| ArrayError::ShapeOverflow {
            shape: shape.to_vec(),
        })
}

/// Renders a shape as `[4, 3]`.
pub(crate) struct Shape<'s>(pub(crate) &'s [i64]);

impl fmt::Display for Shape<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn from_slice_sets_tag_shape_and_length() {
        let verts = [0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0];
        let arr = Array::from_slice(&verts, vec![2, 3]).unwrap();
        assert_eq!(arr.dtype, ElementType::F32.tag());
        assert_eq!(arr.shape, vec![2, 3]);
        assert_eq!(arr.data.len(), 24);
        assert_eq!(arr.element_count(), Some(6));
        assert_eq!(arr.expected_byte_len(), Some(24));
    }

    #[test]
    fn from_bytes_views_only_the_shaped_prefix() {
        let bytes = [1u8, 2, 3, 4, 5, 6, 7];
        let arr = Array::from_bytes(&bytes, ElementType::U8, vec![2, 2]).unwrap();
        assert_eq!(arr.data.as_ref(), &[1, 2, 3, 4]);
        assert!(matches!(arr.data, Cow::Borrowed(_)));
    }

    #[test]
    fn from_bytes_rejects_short_buffers_and_bad_shapes() {
        let bytes = [0u8; 8];
        assert_eq!(
            Array::from_bytes(&bytes, ElementType::F32, vec![3]),
            Err(ArrayError::BufferTooShort {
                needed: 12,
                available: 8
            })
        );
        assert!(matches!(
            Array::from_bytes(&bytes, ElementType::F32, vec![-1, 2]),
            Err(ArrayError::NegativeDimension { .. })
        ));
        assert!(matches!(
            Array::from_bytes(&bytes, ElementType::F64, vec![i64::MAX, i64::MAX]),
            Err(ArrayError::ShapeOverflow { .. })
        ));
    }

    #[test]
    fn zero_sized_shape_is_an_empty_view() {
        let arr = Array::from_slice::<f32>(&[], vec![0, 3]).unwrap();
        assert!(arr.is_supplied());
        assert!(arr.data.is_empty());
    }

    #[test]
    fn default_array_is_not_supplied() {
        let arr = Array::default();
        assert!(!arr.is_supplied());
        assert_eq!(arr.rank(), 0);
    }

    #[test]
    fn to_vec_reads_unaligned_payloads() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&7i32.to_ne_bytes());
        bytes.extend_from_slice(&(-2i32).to_ne_bytes());
        let arr = Array::from_bytes(&bytes[1..], ElementType::I32, vec![2]).unwrap();
        assert_eq!(arr.to_vec::<i32>().unwrap(), vec![7, -2]);
    }

    #[test]
    fn to_vec_rejects_partial_elements() {
        let arr = Array {
            dtype: Cow::Borrowed("<i4"),
            shape: vec![1],
            data: Cow::Borrowed(&[1, 2, 3]),
        };
        assert_eq!(
            arr.to_vec::<i32>(),
            Err(ArrayError::LengthNotMultiple { len: 3, size: 4 })
        );
    }

    #[test]
    fn into_owned_detaches_from_source() {
        let owned = {
            let values = vec![1u16, 2, 3];
            Array::from_slice(&values, vec![3]).unwrap().into_owned()
        };
        assert_eq!(owned.to_vec::<u16>().unwrap(), vec![1, 2, 3]);
        assert!(matches!(owned.data, Cow::Owned(_)));
    }

    #[test]
    fn shape_display() {
        assert_eq!(Shape(&[0, 3]).to_string(), "[0, 3]");
        assert_eq!(Shape(&[]).to_string(), "[]");
    }

    fn round_trip<T: Element + PartialEq + std::fmt::Debug>(values: &[T], shape: Vec<i64>) {
        let arr = Array::from_slice(values, shape.clone()).unwrap();
        assert_eq!(arr.dtype, T::TYPE.tag());
        assert_eq!(arr.shape, shape);
        assert_eq!(arr.data.as_ref(), bytemuck::cast_slice::<T, u8>(values));
        assert_eq!(arr.to_vec::<T>().unwrap(), values);
    }

    proptest! {
        #[test]
        fn typed_views_round_trip(rows in 0usize..6, cols in 1usize..5, seed in any::<u64>()) {
            let n = rows * cols;
            let shape = vec![rows as i64, cols as i64];
            let base: Vec<u64> = (0..n as u64).map(|i| seed.wrapping_mul(i + 1)).collect();
            round_trip(&base.iter().map(|v| *v as f32).collect::<Vec<_>>(), shape.clone());
            let finite = |v: &u64| f64::from_bits(*v & 0x7fef_ffff_ffff_ffff);
            round_trip(&base.iter().map(finite).collect::<Vec<_>>(), shape.clone());
            round_trip(&base.iter().map(|v| *v as i8).collect::<Vec<_>>(), shape.clone());
            round_trip(&base.iter().map(|v| *v as i16).collect::<Vec<_>>(), shape.clone());
            round_trip(&base.iter().map(|v| *v as i32).collect::<Vec<_>>(), shape.clone());
            round_trip(&base.iter().map(|v| *v as i64).collect::<Vec<_>>(), shape.clone());
            round_trip(&base.iter().map(|v| *v as u8).collect::<Vec<_>>(), shape.clone());
            round_trip(&base.iter().map(|v| *v as u16).collect::<Vec<_>>(), shape.clone());
            round_trip(&base.iter().map(|v| *v as u32).collect::<Vec<_>>(), shape.clone());
            round_trip(&base, shape);
        }
    }
}
