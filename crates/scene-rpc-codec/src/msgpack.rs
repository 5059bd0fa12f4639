// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! MessagePack encoding and decoding for scene RPC bodies.
//!
//! Every body is a MessagePack map keyed by field name. Decoders look fields
//! up by name, skip keys they do not know and leave missing fields at their
//! defaults, so peers may add fields or reorder them. Decoded arrays borrow
//! their type tag and payload from the input buffer.

use std::borrow::Cow;

use rmp::encode::{self, ValueWriteError};
use rmp::Marker;
use scene_rpc_port::{
    Array, ArrayMap, CameraData, GetMeshData, MeshData, Reply, Request, SceneMeta,
    SetActiveCamera, SetCameraData, SetMeshData, SetProperties, SetTime, Status,
};
use thiserror::Error;

/// Largest array rank accepted on the wire.
pub const MAX_RANK: usize = 32;

/// Largest entry count of any map or sequence accepted on the wire.
pub const MAX_CONTAINER_LEN: usize = 4096;

/// Deepest container nesting walked when skipping an unknown value.
const MAX_SKIP_DEPTH: usize = 64;

/// Failure to encode a body.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying writer failed.
    #[error("msgpack encoding failed: {0}")]
    Write(#[from] ValueWriteError<std::io::Error>),
    /// A map or sequence is longer than [`MAX_CONTAINER_LEN`].
    #[error("{what} has {len} entries, limit is {MAX_CONTAINER_LEN}")]
    TooLong {
        /// Field or schema being written.
        what: &'static str,
        /// Entry count.
        len: usize,
    },
    /// An array shape is longer than [`MAX_RANK`].
    #[error("array rank {0} exceeds {MAX_RANK}")]
    RankTooLarge(usize),
}

/// Failure to decode a body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended inside a value.
    #[error("unexpected end of input at offset {0}")]
    EndOfInput(usize),
    /// A value of the wrong MessagePack type.
    #[error("expected {expected}, found {found} at offset {pos}")]
    Mismatch {
        /// Offset of the offending marker.
        pos: usize,
        /// Type the schema requires.
        expected: &'static str,
        /// Type on the wire.
        found: &'static str,
    },
    /// An integer that does not fit the field.
    #[error("integer at offset {pos} does not fit {expected}")]
    OutOfRange {
        /// Offset of the integer.
        pos: usize,
        /// Target type.
        expected: &'static str,
    },
    /// A string that is not UTF-8.
    #[error("invalid utf-8 in string at offset {0}")]
    InvalidUtf8(usize),
    /// A container declares more entries than [`MAX_CONTAINER_LEN`].
    #[error("{what} has {len} entries, limit is {MAX_CONTAINER_LEN}")]
    TooLong {
        /// Field or schema being read.
        what: &'static str,
        /// Declared entry count.
        len: usize,
    },
    /// A shape declares more dimensions than [`MAX_RANK`].
    #[error("shape rank {0} exceeds {MAX_RANK}")]
    RankTooLarge(usize),
    /// A fixed-size float sequence has the wrong length.
    #[error("{what} expected {expected} elements, got {found}")]
    WrongLength {
        /// Field being read.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Length on the wire.
        found: usize,
    },
    /// An unknown value nests deeper than the skip limit.
    #[error("value at offset {0} nests too deeply to skip")]
    TooDeep(usize),
    /// Bytes remain after a complete body.
    #[error("trailing bytes in {0}")]
    TrailingBytes(&'static str),
}

const fn kind_of(marker: Marker) -> &'static str {
    match marker {
        Marker::FixPos(_)
        | Marker::FixNeg(_)
        | Marker::U8
        | Marker::U16
        | Marker::U32
        | Marker::U64
        | Marker::I8
        | Marker::I16
        | Marker::I32
        | Marker::I64 => "integer",
        Marker::Null => "nil",
        Marker::True | Marker::False => "bool",
        Marker::F32 | Marker::F64 => "float",
        Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => "str",
        Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => "bin",
        Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => "array",
        Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => "map",
        Marker::FixExt1
        | Marker::FixExt2
        | Marker::FixExt4
        | Marker::FixExt8
        | Marker::FixExt16
        | Marker::Ext8
        | Marker::Ext16
        | Marker::Ext32 => "ext",
        Marker::Reserved => "reserved marker",
    }
}

const fn mismatch(pos: usize, expected: &'static str, found: Marker) -> DecodeError {
    DecodeError::Mismatch {
        pos,
        expected,
        found: kind_of(found),
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Read cursor over one MessagePack buffer.
///
/// Strings and byte strings are returned as slices of the input, so decoded
/// bodies can borrow their payloads.
#[derive(Debug, Clone)]
pub struct Decoder<'b> {
    input: &'b [u8],
    pos: usize,
}

impl<'b> Decoder<'b> {
    /// Start reading at the beginning of `input`.
    pub const fn new(input: &'b [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Offset of the next unread byte.
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub const fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&'b [u8], DecodeError> {
        let (input, start) = (self.input, self.pos);
        let bytes = start
            .checked_add(len)
            .and_then(|end| input.get(start..end))
            .ok_or(DecodeError::EndOfInput(start))?;
        self.pos = start + len;
        Ok(bytes)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let pos = self.pos;
        let bytes = self.take(N)?;
        <[u8; N]>::try_from(bytes).map_err(|_| DecodeError::EndOfInput(pos))
    }

    fn len8(&mut self) -> Result<usize, DecodeError> {
        let [len] = self.fixed()?;
        Ok(usize::from(len))
    }

    fn len16(&mut self) -> Result<usize, DecodeError> {
        Ok(usize::from(u16::from_be_bytes(self.fixed()?)))
    }

    fn len32(&mut self) -> Result<usize, DecodeError> {
        // An unrepresentable length can only run past the end of the input.
        let len = u32::from_be_bytes(self.fixed()?);
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }

    fn marker(&mut self) -> Result<(usize, Marker), DecodeError> {
        let pos = self.pos;
        let [byte] = self.fixed()?;
        Ok((pos, Marker::from_u8(byte)))
    }

    /// Read a map header and return its entry count.
    pub fn map(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        let (pos, marker) = self.marker()?;
        let len = match marker {
            Marker::FixMap(n) => usize::from(n),
            Marker::Map16 => self.len16()?,
            Marker::Map32 => self.len32()?,
            _ => return Err(mismatch(pos, "map", marker)),
        };
        checked_len(len, what)
    }

    /// Read an array header and return its element count.
    pub fn array(&mut self, what: &'static str) -> Result<usize, DecodeError> {
        let len = self.array_header()?;
        checked_len(len, what)
    }

    fn array_header(&mut self) -> Result<usize, DecodeError> {
        let (pos, marker) = self.marker()?;
        match marker {
            Marker::FixArray(n) => Ok(usize::from(n)),
            Marker::Array16 => self.len16(),
            Marker::Array32 => self.len32(),
            _ => Err(mismatch(pos, "array", marker)),
        }
    }

    /// Read a UTF-8 string borrowed from the input.
    pub fn str(&mut self) -> Result<&'b str, DecodeError> {
        let (pos, marker) = self.marker()?;
        let len = match marker {
            Marker::FixStr(n) => usize::from(n),
            Marker::Str8 => self.len8()?,
            Marker::Str16 => self.len16()?,
            Marker::Str32 => self.len32()?,
            _ => return Err(mismatch(pos, "str", marker)),
        };
        std::str::from_utf8(self.take(len)?)
            .map_err(|_| DecodeError::InvalidUtf8(pos))
    }

    /// Read a byte string borrowed from the input.
    ///
    /// Raw bytes written with a str marker, as pre-bin producers do, are
    /// accepted too.
    pub fn bytes(&mut self) -> Result<&'b [u8], DecodeError> {
        let (pos, marker) = self.marker()?;
        let len = match marker {
            Marker::FixStr(n) => usize::from(n),
            Marker::Bin8 | Marker::Str8 => self.len8()?,
            Marker::Bin16 | Marker::Str16 => self.len16()?,
            Marker::Bin32 | Marker::Str32 => self.len32()?,
            _ => return Err(mismatch(pos, "bin", marker)),
        };
        self.take(len)
    }

    // Payload of an integer marker, or `None` if `marker` is not one.
    fn integer(&mut self, marker: Marker) -> Result<Option<i128>, DecodeError> {
        let value = match marker {
            Marker::FixPos(n) => i128::from(n),
            Marker::FixNeg(n) => i128::from(n),
            Marker::U8 => i128::from(u8::from_be_bytes(self.fixed()?)),
            Marker::U16 => i128::from(u16::from_be_bytes(self.fixed()?)),
            Marker::U32 => i128::from(u32::from_be_bytes(self.fixed()?)),
            Marker::U64 => i128::from(u64::from_be_bytes(self.fixed()?)),
            Marker::I8 => i128::from(i8::from_be_bytes(self.fixed()?)),
            Marker::I16 => i128::from(i16::from_be_bytes(self.fixed()?)),
            Marker::I32 => i128::from(i32::from_be_bytes(self.fixed()?)),
            Marker::I64 => i128::from(i64::from_be_bytes(self.fixed()?)),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn int_as<T: TryFrom<i128>>(&mut self, expected: &'static str) -> Result<T, DecodeError> {
        let (pos, marker) = self.marker()?;
        let value = self
            .integer(marker)?
            .ok_or_else(|| mismatch(pos, "integer", marker))?;
        T::try_from(value).map_err(|_| DecodeError::OutOfRange { pos, expected })
    }

    /// Read any integer encoding that fits an `i64`.
    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        self.int_as("i64")
    }

    /// Read any integer encoding that fits an `i32`.
    pub fn i32(&mut self) -> Result<i32, DecodeError> {
        self.int_as("i32")
    }

    /// Read a float.
    ///
    /// float32, float64 and integers are all accepted; packers emit whole
    /// numbers as integers.
    // Integers beyond 2^53 round to the nearest double.
    #[allow(clippy::cast_precision_loss)]
    pub fn f64(&mut self) -> Result<f64, DecodeError> {
        let (pos, marker) = self.marker()?;
        match marker {
            Marker::F32 => Ok(f64::from(f32::from_be_bytes(self.fixed()?))),
            Marker::F64 => Ok(f64::from_be_bytes(self.fixed()?)),
            _ => self
                .integer(marker)?
                .map(|value| value as f64)
                .ok_or_else(|| mismatch(pos, "float", marker)),
        }
    }

    /// Skip one complete value of any type.
    pub fn skip(&mut self) -> Result<(), DecodeError> {
        self.skip_nested(0)
    }

    fn skip_nested(&mut self, depth: usize) -> Result<(), DecodeError> {
        let (pos, marker) = self.marker()?;
        let (payload, items) = match marker {
            Marker::FixPos(_)
            | Marker::FixNeg(_)
            | Marker::Null
            | Marker::True
            | Marker::False => (0, 0),
            Marker::U8 | Marker::I8 => (1, 0),
            Marker::U16 | Marker::I16 => (2, 0),
            Marker::U32 | Marker::I32 | Marker::F32 => (4, 0),
            Marker::U64 | Marker::I64 | Marker::F64 => (8, 0),
            Marker::FixStr(n) => (usize::from(n), 0),
            Marker::Str8 | Marker::Bin8 => (self.len8()?, 0),
            Marker::Str16 | Marker::Bin16 => (self.len16()?, 0),
            Marker::Str32 | Marker::Bin32 => (self.len32()?, 0),
            // ext payloads carry one type byte before the data
            Marker::FixExt1 => (2, 0),
            Marker::FixExt2 => (3, 0),
            Marker::FixExt4 => (5, 0),
            Marker::FixExt8 => (9, 0),
            Marker::FixExt16 => (17, 0),
            Marker::Ext8 => (self.len8()?.saturating_add(1), 0),
            Marker::Ext16 => (self.len16()?.saturating_add(1), 0),
            Marker::Ext32 => (self.len32()?.saturating_add(1), 0),
            Marker::FixArray(n) => (0, usize::from(n)),
            Marker::Array16 => (0, self.len16()?),
            Marker::Array32 => (0, self.len32()?),
            Marker::FixMap(n) => (0, usize::from(n) * 2),
            Marker::Map16 => (0, self.len16()? * 2),
            Marker::Map32 => (0, self.len32()?.saturating_mul(2)),
            Marker::Reserved => return Err(mismatch(pos, "value", marker)),
        };
        self.take(payload)?;
        if items > 0 && depth >= MAX_SKIP_DEPTH {
            return Err(DecodeError::TooDeep(pos));
        }
        // Every item consumes at least one byte, so a lying count runs out
        // of input quickly.
        for _ in 0..items {
            self.skip_nested(depth + 1)?;
        }
        Ok(())
    }
}

// ============================================================================
// Shared helpers
// ============================================================================

type Encoded = Result<(), CodecError>;

pub(crate) fn to_vec(encode: impl FnOnce(&mut Vec<u8>) -> Encoded) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    encode(&mut buf)?;
    Ok(buf)
}

fn from_slice<'b, T>(
    bytes: &'b [u8],
    what: &'static str,
    decode: impl FnOnce(&mut Decoder<'b>) -> Result<T, DecodeError>,
) -> Result<T, DecodeError> {
    let mut decoder = Decoder::new(bytes);
    let value = decode(&mut decoder)?;
    if decoder.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(what));
    }
    Ok(value)
}

fn container_len(len: usize, what: &'static str) -> Result<u32, CodecError> {
    u32::try_from(len)
        .ok()
        .filter(|_| len <= MAX_CONTAINER_LEN)
        .ok_or(CodecError::TooLong { what, len })
}

const fn checked_len(len: usize, what: &'static str) -> Result<usize, DecodeError> {
    if len > MAX_CONTAINER_LEN {
        return Err(DecodeError::TooLong { what, len });
    }
    Ok(len)
}

fn write_map(buf: &mut Vec<u8>, len: usize, what: &'static str) -> Encoded {
    encode::write_map_len(buf, container_len(len, what)?)?;
    Ok(())
}

fn write_str_entry(buf: &mut Vec<u8>, key: &str, value: &str) -> Encoded {
    encode::write_str(buf, key)?;
    encode::write_str(buf, value)?;
    Ok(())
}

fn write_int_entry(buf: &mut Vec<u8>, key: &str, value: i32) -> Encoded {
    encode::write_str(buf, key)?;
    encode::write_sint(buf, i64::from(value))?;
    Ok(())
}

fn encode_f64_seq(buf: &mut Vec<u8>, values: &[f64], what: &'static str) -> Encoded {
    encode::write_array_len(buf, container_len(values.len(), what)?)?;
    for &value in values {
        encode::write_f64(buf, value)?;
    }
    Ok(())
}

fn decode_f64_seq(d: &mut Decoder<'_>, what: &'static str) -> Result<Vec<f64>, DecodeError> {
    let len = d.array(what)?;
    (0..len).map(|_| d.f64()).collect()
}

fn decode_f64_fixed<const N: usize>(
    d: &mut Decoder<'_>,
    what: &'static str,
) -> Result<[f64; N], DecodeError> {
    let values = decode_f64_seq(d, what)?;
    <[f64; N]>::try_from(values).map_err(|values| DecodeError::WrongLength {
        what,
        expected: N,
        found: values.len(),
    })
}

// ============================================================================
// Array
// ============================================================================

pub(crate) fn encode_array_inner(buf: &mut Vec<u8>, array: &Array<'_>) -> Encoded {
    if array.rank() > MAX_RANK {
        return Err(CodecError::RankTooLarge(array.rank()));
    }
    encode::write_map_len(buf, 3)?;
    write_str_entry(buf, "type", &array.dtype)?;
    encode::write_str(buf, "shape")?;
    encode::write_array_len(buf, container_len(array.shape.len(), "shape")?)?;
    for &dim in &array.shape {
        encode::write_sint(buf, dim)?;
    }
    encode::write_str(buf, "data")?;
    encode::write_bin(buf, &array.data)?;
    Ok(())
}

pub(crate) fn decode_array_inner<'b>(d: &mut Decoder<'b>) -> Result<Array<'b>, DecodeError> {
    let mut array = Array::default();
    for _ in 0..d.map("Array")? {
        match d.str()? {
            "type" => array.dtype = Cow::Borrowed(d.str()?),
            "shape" => array.shape = decode_shape(d)?,
            "data" => array.data = Cow::Borrowed(d.bytes()?),
            _ => d.skip()?,
        }
    }
    Ok(array)
}

fn decode_shape(d: &mut Decoder<'_>) -> Result<Vec<i64>, DecodeError> {
    let rank = d.array_header()?;
    if rank > MAX_RANK {
        return Err(DecodeError::RankTooLarge(rank));
    }
    (0..rank).map(|_| d.i64()).collect()
}

fn encode_array_map(buf: &mut Vec<u8>, map: &ArrayMap<'_>, what: &'static str) -> Encoded {
    write_map(buf, map.len(), what)?;
    for (name, array) in map {
        encode::write_str(buf, name)?;
        encode_array_inner(buf, array)?;
    }
    Ok(())
}

fn decode_array_map<'b>(
    d: &mut Decoder<'b>,
    what: &'static str,
) -> Result<ArrayMap<'b>, DecodeError> {
    let mut map = ArrayMap::new();
    for _ in 0..d.map(what)? {
        let name = d.str()?.to_owned();
        let array = decode_array_inner(d)?;
        map.insert(name, array);
    }
    Ok(map)
}

// ============================================================================
// MeshData
// ============================================================================

pub(crate) fn encode_mesh_data_inner(buf: &mut Vec<u8>, mesh: &MeshData<'_>) -> Encoded {
    encode::write_map_len(buf, 7)?;
    encode::write_str(buf, "vertices")?;
    encode_array_inner(buf, &mesh.vertices)?;
    encode::write_str(buf, "vertex_attributes")?;
    encode_array_map(buf, &mesh.vertex_attributes, "vertex_attributes")?;
    encode::write_str(buf, "faces")?;
    encode_array_inner(buf, &mesh.faces)?;
    encode::write_str(buf, "face_attributes")?;
    encode_array_map(buf, &mesh.face_attributes, "face_attributes")?;
    encode::write_str(buf, "lines")?;
    encode_array_inner(buf, &mesh.lines)?;
    encode::write_str(buf, "line_attributes")?;
    encode_array_map(buf, &mesh.line_attributes, "line_attributes")?;
    encode::write_str(buf, "textures")?;
    encode_array_map(buf, &mesh.textures, "textures")
}

pub(crate) fn decode_mesh_data_inner<'b>(d: &mut Decoder<'b>) -> Result<MeshData<'b>, DecodeError> {
    let mut mesh = MeshData::default();
    for _ in 0..d.map("MeshData")? {
        match d.str()? {
            "vertices" => mesh.vertices = decode_array_inner(d)?,
            "vertex_attributes" => {
                mesh.vertex_attributes = decode_array_map(d, "vertex_attributes")?;
            }
            "faces" => mesh.faces = decode_array_inner(d)?,
            "face_attributes" => mesh.face_attributes = decode_array_map(d, "face_attributes")?,
            "lines" => mesh.lines = decode_array_inner(d)?,
            "line_attributes" => mesh.line_attributes = decode_array_map(d, "line_attributes")?,
            "textures" => mesh.textures = decode_array_map(d, "textures")?,
            _ => d.skip()?,
        }
    }
    Ok(mesh)
}

// ============================================================================
// CameraData
// ============================================================================

pub(crate) fn encode_camera_data_inner(buf: &mut Vec<u8>, camera: &CameraData<'_>) -> Encoded {
    encode::write_map_len(buf, 7)?;
    encode::write_str(buf, "R")?;
    encode_f64_seq(buf, &camera.rotation, "R")?;
    encode::write_str(buf, "t")?;
    encode_f64_seq(buf, &camera.translation, "t")?;
    write_str_entry(buf, "intrinsic_model", &camera.intrinsic_model)?;
    encode::write_str(buf, "intrinsic_parameters")?;
    encode_f64_seq(buf, &camera.intrinsic_parameters, "intrinsic_parameters")?;
    write_int_entry(buf, "width", camera.width)?;
    write_int_entry(buf, "height", camera.height)?;
    encode::write_str(buf, "images")?;
    encode_array_map(buf, &camera.images, "images")
}

pub(crate) fn decode_camera_data_inner<'b>(
    d: &mut Decoder<'b>,
) -> Result<CameraData<'b>, DecodeError> {
    let mut camera = CameraData::default();
    for _ in 0..d.map("CameraData")? {
        match d.str()? {
            "R" => camera.rotation = decode_f64_fixed(d, "R")?,
            "t" => camera.translation = decode_f64_fixed(d, "t")?,
            "intrinsic_model" => camera.intrinsic_model = d.str()?.to_owned(),
            "intrinsic_parameters" => {
                camera.intrinsic_parameters = decode_f64_seq(d, "intrinsic_parameters")?;
            }
            "width" => camera.width = d.i32()?,
            "height" => camera.height = d.i32()?,
            "images" => camera.images = decode_array_map(d, "images")?,
            _ => d.skip()?,
        }
    }
    Ok(camera)
}

// ============================================================================
// Scene addressing
// ============================================================================

// Writes the three metadata entries into a map the caller has opened.
fn encode_meta_entries(buf: &mut Vec<u8>, meta: &SceneMeta) -> Encoded {
    write_str_entry(buf, "path", &meta.path)?;
    write_int_entry(buf, "time", meta.time)?;
    write_str_entry(buf, "layer", &meta.layer)
}

fn decode_meta_entry(
    d: &mut Decoder<'_>,
    key: &str,
    meta: &mut SceneMeta,
) -> Result<bool, DecodeError> {
    match key {
        "path" => meta.path = d.str()?.to_owned(),
        "time" => meta.time = d.i32()?,
        "layer" => meta.layer = d.str()?.to_owned(),
        _ => return Ok(false),
    }
    Ok(true)
}

pub(crate) fn encode_set_mesh_data_inner(buf: &mut Vec<u8>, msg: &SetMeshData<'_>) -> Encoded {
    encode::write_map_len(buf, 4)?;
    encode_meta_entries(buf, &msg.meta)?;
    encode::write_str(buf, "data")?;
    encode_mesh_data_inner(buf, &msg.data)
}

pub(crate) fn decode_set_mesh_data_inner<'b>(
    d: &mut Decoder<'b>,
) -> Result<SetMeshData<'b>, DecodeError> {
    let mut msg = SetMeshData::default();
    for _ in 0..d.map("SetMeshData")? {
        let key = d.str()?;
        if key == "data" {
            msg.data = decode_mesh_data_inner(d)?;
        } else if !decode_meta_entry(d, key, &mut msg.meta)? {
            d.skip()?;
        }
    }
    Ok(msg)
}

pub(crate) fn encode_get_mesh_data_inner(buf: &mut Vec<u8>, msg: &GetMeshData) -> Encoded {
    encode::write_map_len(buf, 3)?;
    encode_meta_entries(buf, &msg.meta)
}

pub(crate) fn decode_get_mesh_data_inner(d: &mut Decoder<'_>) -> Result<GetMeshData, DecodeError> {
    let mut msg = GetMeshData::default();
    for _ in 0..d.map("GetMeshData")? {
        let key = d.str()?;
        if !decode_meta_entry(d, key, &mut msg.meta)? {
            d.skip()?;
        }
    }
    Ok(msg)
}

pub(crate) fn encode_set_camera_data_inner(buf: &mut Vec<u8>, msg: &SetCameraData<'_>) -> Encoded {
    encode::write_map_len(buf, 4)?;
    encode_meta_entries(buf, &msg.meta)?;
    encode::write_str(buf, "data")?;
    encode_camera_data_inner(buf, &msg.data)
}

pub(crate) fn decode_set_camera_data_inner<'b>(
    d: &mut Decoder<'b>,
) -> Result<SetCameraData<'b>, DecodeError> {
    let mut msg = SetCameraData::default();
    for _ in 0..d.map("SetCameraData")? {
        let key = d.str()?;
        if key == "data" {
            msg.data = decode_camera_data_inner(d)?;
        } else if !decode_meta_entry(d, key, &mut msg.meta)? {
            d.skip()?;
        }
    }
    Ok(msg)
}

// ============================================================================
// Small messages
// ============================================================================

pub(crate) fn encode_set_time_inner(buf: &mut Vec<u8>, msg: &SetTime) -> Encoded {
    encode::write_map_len(buf, 1)?;
    write_int_entry(buf, "time", msg.time)
}

pub(crate) fn decode_set_time_inner(d: &mut Decoder<'_>) -> Result<SetTime, DecodeError> {
    let mut msg = SetTime::default();
    for _ in 0..d.map("SetTime")? {
        match d.str()? {
            "time" => msg.time = d.i32()?,
            _ => d.skip()?,
        }
    }
    Ok(msg)
}

fn encode_single_str(buf: &mut Vec<u8>, key: &str, value: &str) -> Encoded {
    encode::write_map_len(buf, 1)?;
    write_str_entry(buf, key, value)
}

fn decode_single_str(
    d: &mut Decoder<'_>,
    key: &str,
    what: &'static str,
) -> Result<String, DecodeError> {
    let mut value = String::new();
    for _ in 0..d.map(what)? {
        if d.str()? == key {
            value = d.str()?.to_owned();
        } else {
            d.skip()?;
        }
    }
    Ok(value)
}

pub(crate) fn encode_set_active_camera_inner(buf: &mut Vec<u8>, msg: &SetActiveCamera) -> Encoded {
    encode_single_str(buf, "path", &msg.path)
}

pub(crate) fn decode_set_active_camera_inner(
    d: &mut Decoder<'_>,
) -> Result<SetActiveCamera, DecodeError> {
    Ok(SetActiveCamera {
        path: decode_single_str(d, "path", "SetActiveCamera")?,
    })
}

pub(crate) fn encode_set_properties_inner(buf: &mut Vec<u8>, msg: &SetProperties) -> Encoded {
    encode_single_str(buf, "path", &msg.path)
}

pub(crate) fn decode_set_properties_inner(
    d: &mut Decoder<'_>,
) -> Result<SetProperties, DecodeError> {
    Ok(SetProperties {
        path: decode_single_str(d, "path", "SetProperties")?,
    })
}

pub(crate) fn encode_request_inner(buf: &mut Vec<u8>, header: &Request) -> Encoded {
    encode_single_str(buf, "msg_id", &header.msg_id)
}

pub(crate) fn decode_request_inner(d: &mut Decoder<'_>) -> Result<Request, DecodeError> {
    Ok(Request {
        msg_id: decode_single_str(d, "msg_id", "Request")?,
    })
}

pub(crate) fn encode_reply_inner(buf: &mut Vec<u8>, header: &Reply) -> Encoded {
    encode_single_str(buf, "msg_id", &header.msg_id)
}

pub(crate) fn decode_reply_inner(d: &mut Decoder<'_>) -> Result<Reply, DecodeError> {
    Ok(Reply {
        msg_id: decode_single_str(d, "msg_id", "Reply")?,
    })
}

// ============================================================================
// Status
// ============================================================================

pub(crate) fn encode_status_inner(buf: &mut Vec<u8>, status: &Status) -> Encoded {
    encode::write_map_len(buf, 2)?;
    write_int_entry(buf, "code", status.code)?;
    write_str_entry(buf, "str", &status.message)
}

pub(crate) fn decode_status_inner(d: &mut Decoder<'_>) -> Result<Status, DecodeError> {
    let mut status = Status::default();
    for _ in 0..d.map("Status")? {
        match d.str()? {
            "code" => status.code = d.i32()?,
            "str" => status.message = d.str()?.to_owned(),
            _ => d.skip()?,
        }
    }
    Ok(status)
}

// ============================================================================
// Public encode/decode functions
// ============================================================================

/// Encode a bare [`Array`] body.
pub fn encode_array(array: &Array<'_>) -> Result<Vec<u8>, CodecError> {
    to_vec(|buf| encode_array_inner(buf, array))
}

/// Decode a bare [`Array`] body. The result borrows `bytes`.
pub fn decode_array(bytes: &[u8]) -> Result<Array<'_>, DecodeError> {
    from_slice(bytes, "Array", decode_array_inner)
}

/// Encode a bare [`MeshData`] body.
pub fn encode_mesh_data(mesh: &MeshData<'_>) -> Result<Vec<u8>, CodecError> {
    to_vec(|buf| encode_mesh_data_inner(buf, mesh))
}

/// Decode a bare [`MeshData`] body. The result borrows `bytes`.
pub fn decode_mesh_data(bytes: &[u8]) -> Result<MeshData<'_>, DecodeError> {
    from_slice(bytes, "MeshData", decode_mesh_data_inner)
}

/// Encode a bare [`CameraData`] body.
pub fn encode_camera_data(camera: &CameraData<'_>) -> Result<Vec<u8>, CodecError> {
    to_vec(|buf| encode_camera_data_inner(buf, camera))
}

/// Decode a bare [`CameraData`] body. The result borrows `bytes`.
pub fn decode_camera_data(bytes: &[u8]) -> Result<CameraData<'_>, DecodeError> {
    from_slice(bytes, "CameraData", decode_camera_data_inner)
}

/// Encode a [`Status`] body.
pub fn encode_status(status: &Status) -> Result<Vec<u8>, CodecError> {
    to_vec(|buf| encode_status_inner(buf, status))
}

/// Decode a [`Status`] body.
pub fn decode_status(bytes: &[u8]) -> Result<Status, DecodeError> {
    from_slice(bytes, "Status", decode_status_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rmpv::Value;
    use scene_rpc_port::ElementType;

    fn triangle() -> MeshData<'static> {
        let mut mesh = MeshData::with_vertices(
            Array::from_vec(&[0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], vec![3, 3])
                .unwrap(),
        );
        mesh.faces = Array::from_vec(&[0i32, 1, 2], vec![1, 3]).unwrap();
        mesh.vertex_attributes.insert(
            "normals".into(),
            Array::from_vec(&[0.0f32, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0], vec![3, 3])
                .unwrap(),
        );
        mesh
    }

    fn pack(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, value).unwrap();
        buf
    }

    fn map(entries: Vec<(&str, Value)>) -> Value {
        let pairs = entries.into_iter().map(|(k, v)| (Value::from(k), v));
        Value::Map(pairs.collect())
    }

    #[test]
    fn array_wire_layout_is_stable() {
        let array = Array::from_vec(&[1u8, 2], vec![2]).unwrap();
        let bytes = encode_array(&array).unwrap();
        // {"type": "|u1", "shape": [2], "data": bin 0102}
        assert_eq!(
            hex::encode(&bytes),
            "83a474797065a37c7531a5736861706591\
             02a464617461c4020102"
        );
    }

    #[test]
    fn decoded_array_borrows_input() {
        let array = Array::from_vec(&[1.5f64, -2.0], vec![2]).unwrap();
        let bytes = encode_array(&array).unwrap();
        let decoded = decode_array(&bytes).unwrap();
        assert!(matches!(decoded.data, Cow::Borrowed(_)));
        assert!(matches!(decoded.dtype, Cow::Borrowed(_)));
        assert_eq!(decoded, array);
        assert_eq!(decoded.to_vec::<f64>().unwrap(), vec![1.5, -2.0]);
    }

    proptest! {
        #[test]
        fn array_bytes_survive_the_wire(
            kind in 0..ElementType::ALL.len(),
            shape in prop::collection::vec(0i64..4, 0..4),
            seed in any::<u8>(),
        ) {
            let ty = ElementType::ALL[kind];
            let count: i64 = shape.iter().product();
            let len = ty.size() * count as usize;
            let data: Vec<u8> = (0..len).map(|i| seed.wrapping_add(i as u8)).collect();
            let array = Array::from_bytes(&data, ty, shape.clone()).unwrap();
            let bytes = encode_array(&array).unwrap();
            let decoded = decode_array(&bytes).unwrap();
            prop_assert_eq!(decoded.dtype.as_ref(), ty.tag());
            prop_assert_eq!(&decoded.shape, &shape);
            prop_assert_eq!(decoded.data.as_ref(), data.as_slice());
        }
    }

    #[test]
    fn mesh_round_trip_keeps_attributes() {
        let mesh = triangle();
        let bytes = encode_mesh_data(&mesh).unwrap();
        let decoded = decode_mesh_data(&bytes).unwrap();
        assert_eq!(decoded, mesh);
        assert!(!decoded.lines.is_supplied());
    }

    #[test]
    fn camera_round_trip() {
        let mut camera = CameraData {
            rotation: [0.0, 0.0, 0.0, 1.0],
            translation: [1.0, 2.0, 3.0],
            intrinsic_model: "PINHOLE".into(),
            intrinsic_parameters: vec![500.0, 500.0, 320.0, 240.0],
            width: 640,
            height: 480,
            ..CameraData::default()
        };
        camera
            .images
            .insert("depth".into(), Array::from_vec(&[1.0f32; 4], vec![2, 2]).unwrap());
        let bytes = encode_camera_data(&camera).unwrap();
        assert_eq!(decode_camera_data(&bytes).unwrap(), camera);
    }

    #[test]
    fn status_uses_str_key() {
        let bytes = encode_status(&Status::unsupported_msg_id()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("str"));
        assert!(text.contains("unsupported msg_id"));
        assert_eq!(decode_status(&bytes).unwrap(), Status::unsupported_msg_id());
    }

    #[test]
    fn key_order_is_irrelevant() {
        let buf = pack(&map(vec![
            ("data", Value::Binary(vec![7, 0, 0, 0])),
            ("shape", Value::Array(vec![Value::from(1)])),
            ("type", Value::from(ElementType::I32.tag())),
        ]));
        let decoded = decode_array(&buf).unwrap();
        assert_eq!(decoded.element_type(), Some(ElementType::I32));
        assert_eq!(decoded.shape, vec![1]);
        assert_eq!(decoded.data.as_ref(), &[7, 0, 0, 0]);
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let rgb = Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let color = map(vec![("rgb", rgb)]);
        let buf = pack(&map(vec![
            ("color", color),
            ("scale", Value::F64(0.5)),
            ("tag", Value::Ext(7, vec![1, 2, 3])),
            ("code", Value::from(3)),
            ("str", Value::from("boom")),
        ]));
        let status = decode_status(&buf).unwrap();
        assert_eq!(status, Status::new(3, "boom"));
    }

    #[test]
    fn missing_keys_decode_to_defaults() {
        let buf = pack(&map(vec![]));
        assert_eq!(decode_mesh_data(&buf).unwrap(), MeshData::default());
        assert_eq!(decode_camera_data(&buf).unwrap(), CameraData::default());
        assert_eq!(decode_status(&buf).unwrap(), Status::ok());
    }

    #[test]
    fn reject_non_string_key() {
        // {1: 2}
        let bytes = hex::decode("810102").unwrap();
        let err = decode_array(&bytes).unwrap_err().to_string();
        assert!(err.contains("expected str, found integer"));
    }

    #[test]
    fn reject_rank_over_limit() {
        let shape = vec![Value::from(1); MAX_RANK + 1];
        let buf = pack(&map(vec![("shape", Value::Array(shape))]));
        let err = decode_array(&buf).unwrap_err().to_string();
        assert!(err.contains("exceeds"));

        let array = Array {
            shape: vec![1; MAX_RANK + 1],
            ..Array::default()
        };
        assert!(matches!(encode_array(&array), Err(CodecError::RankTooLarge(33))));
    }

    #[test]
    fn reject_oversize_container_declaration() {
        // map16 header announcing 5000 entries and nothing else
        let bytes = hex::decode("de1388").unwrap();
        let err = decode_mesh_data(&bytes).unwrap_err().to_string();
        assert!(err.contains("limit"));
    }

    #[test]
    fn reject_wrong_rotation_length() {
        let rotation = Value::Array(vec![Value::F64(0.0), Value::F64(0.0), Value::F64(1.0)]);
        let buf = pack(&map(vec![("R", rotation)]));
        let err = decode_camera_data(&buf).unwrap_err().to_string();
        assert!(err.contains("expected 4 elements"));
    }

    #[test]
    fn camera_floats_accept_f32() {
        let translation = Value::Array(vec![Value::F32(1.0), Value::F32(2.5), Value::F32(-3.0)]);
        let buf = pack(&map(vec![("t", translation)]));
        let camera = decode_camera_data(&buf).unwrap();
        assert_eq!(camera.translation, [1.0, 2.5, -3.0]);
    }

    #[test]
    fn camera_floats_accept_integers() {
        let ints = |values: &[i64]| Value::Array(values.iter().copied().map(Value::from).collect());
        let buf = pack(&map(vec![
            ("R", ints(&[0, 0, 0, 1])),
            ("t", ints(&[-2, 300, 70_000])),
            ("intrinsic_parameters", ints(&[500, 500, 320, 240])),
        ]));
        let camera = decode_camera_data(&buf).unwrap();
        assert_eq!(camera.rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(camera.translation, [-2.0, 300.0, 70_000.0]);
        assert_eq!(
            camera.intrinsic_parameters,
            vec![500.0, 500.0, 320.0, 240.0]
        );
    }

    #[test]
    fn integers_reject_other_types() {
        let buf = pack(&map(vec![("code", Value::F64(3.0))]));
        let err = decode_status(&buf).unwrap_err();
        assert!(matches!(err, DecodeError::Mismatch { expected: "integer", found: "float", .. }));

        let buf = pack(&map(vec![("code", Value::from(u64::MAX))]));
        let err = decode_status(&buf).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { expected: "i32", .. }));
    }

    #[test]
    fn deeply_nested_unknown_value_is_rejected() {
        let mut value = Value::Nil;
        for _ in 0..=MAX_SKIP_DEPTH {
            value = Value::Array(vec![value]);
        }
        let buf = pack(&map(vec![("extra", value)]));
        assert!(matches!(decode_status(&buf), Err(DecodeError::TooDeep(_))));
    }

    #[test]
    fn reject_trailing_garbage() {
        let mut bytes = encode_mesh_data(&triangle()).unwrap();
        bytes.push(0xc0);
        assert_eq!(
            decode_mesh_data(&bytes).unwrap_err(),
            DecodeError::TrailingBytes("MeshData")
        );
    }

    #[test]
    fn drill_truncated_msgpack() {
        let bytes = encode_mesh_data(&triangle()).unwrap();
        for len in 0..bytes.len() {
            assert!(
                decode_mesh_data(&bytes[..len]).is_err(),
                "decoding should fail for truncated input of length {len}"
            );
        }
    }

    #[test]
    fn stress_concurrent_decode() {
        use std::sync::Arc;
        use std::thread;

        let bytes = Arc::new(encode_mesh_data(&triangle()).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bytes = Arc::clone(&bytes);
                thread::spawn(move || decode_mesh_data(&bytes).unwrap().into_owned())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), triangle());
        }
    }
}
