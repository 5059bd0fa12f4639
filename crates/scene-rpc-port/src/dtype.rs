// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Element kinds and their canonical type tags.
//!
//! A type tag is the three character string `<byte-order><kind><width>` used
//! by numpy's `dtype.str`: `<f4` is a little-endian `f32`, `|u1` a byte.
//! Single-byte kinds always use `|`; every other kind uses the byte order of
//! the host that produced the buffer.

use core::fmt;

const LITTLE_ENDIAN: bool = cfg!(target_endian = "little");

/// Closed set of element kinds an [`Array`](crate::Array) can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// 32-bit IEEE float.
    F32,
    /// 64-bit IEEE float.
    F64,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 8-bit integer.
    U8,
    /// Unsigned 16-bit integer.
    U16,
    /// Unsigned 32-bit integer.
    U32,
    /// Unsigned 64-bit integer.
    U64,
}

impl ElementType {
    /// Every supported element kind, in tag-table order.
    pub const ALL: [ElementType; 10] = [
        Self::F32,
        Self::F64,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
    ];

    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::F32 | Self::I32 | Self::U32 => 4,
            Self::F64 | Self::I64 | Self::U64 => 8,
        }
    }

    /// Canonical type tag for this element kind in host byte order.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::F32 => host_order("<f4", ">f4"),
            Self::F64 => host_order("<f8", ">f8"),
            Self::I8 => "|i1",
            Self::I16 => host_order("<i2", ">i2"),
            Self::I32 => host_order("<i4", ">i4"),
            Self::I64 => host_order("<i8", ">i8"),
            Self::U8 => "|u1",
            Self::U16 => host_order("<u2", ">u2"),
            Self::U32 => host_order("<u4", ">u4"),
            Self::U64 => host_order("<u8", ">u8"),
        }
    }

    /// Inverse of [`tag`](Self::tag). Tags in the foreign byte order are not
    /// host-readable and return `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.tag() == tag)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

const fn host_order(little: &'static str, big: &'static str) -> &'static str {
    if LITTLE_ENDIAN {
        little
    } else {
        big
    }
}

/// Width in bytes encoded in any well-formed tag, regardless of byte order.
///
/// Returns `None` unless the tag is `[<>|=][a-zA-Z]<digits>` with a positive
/// width.
pub fn element_width(tag: &str) -> Option<usize> {
    let mut chars = tag.chars();
    let order = chars.next()?;
    let kind = chars.next()?;
    if !matches!(order, '<' | '>' | '|' | '=') || !kind.is_ascii_alphabetic() {
        return None;
    }
    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<usize>().ok().filter(|w| *w > 0)
}

/// Plain-old-data element that maps to exactly one [`ElementType`].
pub trait Element: bytemuck::Pod {
    /// The element kind describing `Self`.
    const TYPE: ElementType;
}

impl Element for f32 {
    const TYPE: ElementType = ElementType::F32;
}
impl Element for f64 {
    const TYPE: ElementType = ElementType::F64;
}
impl Element for i8 {
    const TYPE: ElementType = ElementType::I8;
}
impl Element for i16 {
    const TYPE: ElementType = ElementType::I16;
}
impl Element for i32 {
    const TYPE: ElementType = ElementType::I32;
}
impl Element for i64 {
    const TYPE: ElementType = ElementType::I64;
}
impl Element for u8 {
    const TYPE: ElementType = ElementType::U8;
}
impl Element for u16 {
    const TYPE: ElementType = ElementType::U16;
}
impl Element for u32 {
    const TYPE: ElementType = ElementType::U32;
}
impl Element for u64 {
    const TYPE: ElementType = ElementType::U64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_endian = "little")]
    fn little_endian_tag_table() {
        assert_eq!(ElementType::F32.tag(), "<f4");
        assert_eq!(ElementType::F64.tag(), "<f8");
        assert_eq!(ElementType::I16.tag(), "<i2");
        assert_eq!(ElementType::I32.tag(), "<i4");
        assert_eq!(ElementType::I64.tag(), "<i8");
        assert_eq!(ElementType::U16.tag(), "<u2");
        assert_eq!(ElementType::U32.tag(), "<u4");
        assert_eq!(ElementType::U64.tag(), "<u8");
    }

    #[test]
    fn single_byte_kinds_have_no_byte_order() {
        assert_eq!(ElementType::I8.tag(), "|i1");
        assert_eq!(ElementType::U8.tag(), "|u1");
    }

    #[test]
    fn tag_width_matches_size() {
        for ty in ElementType::ALL {
            assert_eq!(element_width(ty.tag()), Some(ty.size()), "{ty}");
            assert_eq!(ElementType::from_tag(ty.tag()), Some(ty));
        }
    }

    #[test]
    fn element_width_parses_foreign_tags() {
        assert_eq!(element_width(">f8"), Some(8));
        assert_eq!(element_width("<c16"), Some(16));
        assert_eq!(element_width("|b1"), Some(1));
        assert_eq!(element_width("f4"), None);
        assert_eq!(element_width("<f"), None);
        assert_eq!(element_width("<f0"), None);
        assert_eq!(element_width("<fx"), None);
        assert_eq!(element_width(""), None);
    }

    #[test]
    fn unknown_tags_have_no_element_type() {
        assert_eq!(ElementType::from_tag("<f2"), None);
        assert_eq!(ElementType::from_tag("f4"), None);
        #[cfg(target_endian = "little")]
        assert_eq!(ElementType::from_tag(">f4"), None);
    }

    #[test]
    fn element_trait_maps_primitives() {
        assert_eq!(<f32 as Element>::TYPE, ElementType::F32);
        assert_eq!(<i8 as Element>::TYPE, ElementType::I8);
        assert_eq!(<u64 as Element>::TYPE, ElementType::U64);
        assert_eq!(core::mem::size_of::<u16>(), <u16 as Element>::TYPE.size());
    }
}
