// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mesh payload: point clouds, triangle meshes, line sets.

use std::collections::BTreeMap;

use crate::array::Array;
use crate::dtype::ElementType;
use crate::validate::{Mismatch, ValidationFailure, ValidationPolicy, ValidationReport};

/// Named arrays attached to a mesh or camera.
pub type ArrayMap<'a> = BTreeMap<String, Array<'a>>;

/// Mesh geometry with free-form per-element attributes.
///
/// `faces` and `lines` hold vertex indices as `int32` or `int64`. A rank-2
/// array `[n, k]` stores `n` rows of `k` indices. A rank-1 array stores rows of
/// varying length back to back as `k i1 i2 .. ik`. Faces need `k >= 3`, lines
/// `k >= 2`. Either array may be left unsupplied (empty shape).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshData<'a> {
    /// Vertex positions, shape `[num_vertices, 3]`.
    pub vertices: Array<'a>,
    /// Per-vertex attributes such as normals or colors.
    pub vertex_attributes: ArrayMap<'a>,
    /// Polygon vertex indices.
    pub faces: Array<'a>,
    /// Per-face attributes.
    pub face_attributes: ArrayMap<'a>,
    /// Line strip vertex indices.
    pub lines: Array<'a>,
    /// Per-line attributes.
    pub line_attributes: ArrayMap<'a>,
    /// Arrays to be interpreted as textures.
    pub textures: ArrayMap<'a>,
}

/// Minimum row length of a rank-2 `faces` array.
pub const MIN_FACE_VERTICES: i64 = 3;
/// Minimum row length of a rank-2 `lines` array.
pub const MIN_LINE_VERTICES: i64 = 2;

fn index_types() -> [&'static str; 2] {
    [ElementType::I32.tag(), ElementType::I64.tag()]
}

fn check_indices(indices: &Array<'_>, min_columns: i64) -> Result<(), Mismatch> {
    if !indices.is_supplied() {
        return Ok(());
    }
    indices.check_rank(&[1, 2])?;
    indices.check_type(&index_types())?;
    indices.check_non_empty()?;
    indices.check_min_columns(min_columns)
}

/// Row count of a fixed-width index array, if it has one.
fn row_count(indices: &Array<'_>) -> Option<i64> {
    match indices.shape.as_slice() {
        [rows, _] => Some(*rows),
        _ => None,
    }
}

impl<'a> MeshData<'a> {
    /// Message identifier of a bare mesh payload.
    pub const MSG_ID: &'static str = "mesh_data";

    /// Mesh with vertices only.
    pub fn with_vertices(vertices: Array<'a>) -> Self {
        Self {
            vertices,
            ..Self::default()
        }
    }

    /// Vertices must be a non-empty `[n, 3]` array.
    pub fn check_vertices(&self) -> Result<(), ValidationFailure> {
        self.vertices
            .check_non_empty()
            .and_then(|()| self.vertices.check_shape(&[-1, 3]))
            .map_err(|m| m.at("vertices"))
    }

    /// Faces are optional; if supplied they must be rank 1 or 2, `int32` or
    /// `int64`, non-empty, and rank-2 rows must hold at least 3 indices.
    pub fn check_faces(&self) -> Result<(), ValidationFailure> {
        check_indices(&self.faces, MIN_FACE_VERTICES).map_err(|m| m.at("faces"))
    }

    /// Same rules as [`check_faces`](Self::check_faces) with rows of at least
    /// 2 indices.
    pub fn check_lines(&self) -> Result<(), ValidationFailure> {
        check_indices(&self.lines, MIN_LINE_VERTICES).map_err(|m| m.at("lines"))
    }

    /// Every array in the message with its field path.
    pub fn arrays<'s>(&'s self) -> impl Iterator<Item = (String, &'s Array<'a>)> + 's {
        let named = |group: &'static str, map: &'s ArrayMap<'a>| {
            map.iter()
                .map(move |(name, arr)| (format!("{group}[{name}]"), arr))
        };
        [
            ("vertices", &self.vertices),
            ("faces", &self.faces),
            ("lines", &self.lines),
        ]
        .into_iter()
        .map(|(field, arr)| (field.to_owned(), arr))
        .chain(named("vertex_attributes", &self.vertex_attributes))
        .chain(named("face_attributes", &self.face_attributes))
        .chain(named("line_attributes", &self.line_attributes))
        .chain(named("textures", &self.textures))
    }

    fn check_attribute_counts(&self, report: &mut ValidationReport) {
        let vertex_rows = self.vertices.shape.first().copied();
        let face_rows = row_count(&self.faces);
        let line_rows = row_count(&self.lines);
        let owners = [
            ("vertex_attributes", &self.vertex_attributes, vertex_rows),
            ("face_attributes", &self.face_attributes, face_rows),
            ("line_attributes", &self.line_attributes, line_rows),
        ];
        for (group, attributes, count) in owners {
            let Some(count) = count else { continue };
            for (name, arr) in attributes {
                report.record(format!("{group}[{name}]"), arr.check_leading_dim(count));
            }
        }
    }

    /// Validate the whole payload. Vertex and face checks always run; the
    /// rest follow `policy`. All failing fields are reported, each with its
    /// first violated constraint.
    pub fn check_message(&self, policy: &ValidationPolicy) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();
        if let Err(failure) = self.check_vertices() {
            report.push(failure);
        }
        if let Err(failure) = self.check_faces() {
            report.push(failure);
        }
        if policy.validate_lines {
            if let Err(failure) = self.check_lines() {
                report.push(failure);
            }
        }
        if policy.check_byte_lengths {
            for (field, arr) in self.arrays() {
                report.record(field, arr.check_byte_length());
            }
        }
        if policy.check_attribute_counts {
            self.check_attribute_counts(&mut report);
        }
        report.into_result()
    }

    /// Deep copy detached from the decode buffer.
    pub fn into_owned(self) -> MeshData<'static> {
        MeshData {
            vertices: self.vertices.into_owned(),
            vertex_attributes: owned_map(self.vertex_attributes),
            faces: self.faces.into_owned(),
            face_attributes: owned_map(self.face_attributes),
            lines: self.lines.into_owned(),
            line_attributes: owned_map(self.line_attributes),
            textures: owned_map(self.textures),
        }
    }
}

pub(crate) fn owned_map(map: ArrayMap<'_>) -> ArrayMap<'static> {
    map.into_iter()
        .map(|(name, arr)| (name, arr.into_owned()))
        .collect()
}
