// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene update messages and the request/reply headers that announce them.

use crate::camera::CameraData;
use crate::mesh::MeshData;
use crate::validate::{ValidationPolicy, ValidationReport};

/// Largest request a receiver accepts when nothing else is configured (64 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

/// Every schema that can follow a request or reply header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Bare [`Array`](crate::Array).
    Array,
    /// Bare [`MeshData`].
    MeshData,
    /// [`SetMeshData`].
    SetMeshData,
    /// [`GetMeshData`].
    GetMeshData,
    /// Bare [`CameraData`].
    CameraData,
    /// [`SetCameraData`].
    SetCameraData,
    /// [`SetTime`].
    SetTime,
    /// [`SetActiveCamera`].
    SetActiveCamera,
    /// [`SetProperties`].
    SetProperties,
    /// [`Status`](crate::Status).
    Status,
}

impl MessageKind {
    /// All kinds, in declaration order.
    pub const ALL: [MessageKind; 10] = [
        Self::Array,
        Self::MeshData,
        Self::SetMeshData,
        Self::GetMeshData,
        Self::CameraData,
        Self::SetCameraData,
        Self::SetTime,
        Self::SetActiveCamera,
        Self::SetProperties,
        Self::Status,
    ];

    /// Wire identifier carried in `msg_id`.
    pub const fn msg_id(self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::MeshData => "mesh_data",
            Self::SetMeshData => "set_mesh_data",
            Self::GetMeshData => "get_mesh_data",
            Self::CameraData => "camera_data",
            Self::SetCameraData => "set_camera_data",
            Self::SetTime => "set_time",
            Self::SetActiveCamera => "set_active_camera",
            Self::SetProperties => "set_properties",
            Self::Status => "status",
        }
    }

    /// Look up a wire identifier. Matching is exact.
    pub fn from_msg_id(msg_id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.msg_id() == msg_id)
    }
}

/// Where in the scene tree a message applies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneMeta {
    /// Hierarchical scene tree path, e.g. `reconstruction/points`.
    pub path: String,
    /// Time step the data belongs to.
    pub time: i32,
    /// Layer used to group objects.
    pub layer: String,
}

impl SceneMeta {
    /// Metadata for `path` at time 0 on the default layer.
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Adds or replaces the mesh at `meta`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetMeshData<'a> {
    /// Target location.
    pub meta: SceneMeta,
    /// The mesh to store.
    pub data: MeshData<'a>,
}

impl SetMeshData<'_> {
    /// Deep copy detached from the decode buffer.
    pub fn into_owned(self) -> SetMeshData<'static> {
        SetMeshData {
            meta: self.meta,
            data: self.data.into_owned(),
        }
    }
}

/// Requests the mesh stored at `meta`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GetMeshData {
    /// Location to read.
    pub meta: SceneMeta,
}

/// Adds or replaces the camera at `meta`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SetCameraData<'a> {
    /// Target location.
    pub meta: SceneMeta,
    /// The camera to store.
    pub data: CameraData<'a>,
}

impl SetCameraData<'_> {
    /// Deep copy detached from the decode buffer.
    pub fn into_owned(self) -> SetCameraData<'static> {
        SetCameraData {
            meta: self.meta,
            data: self.data.into_owned(),
        }
    }
}

/// Sets the current time of the scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetTime {
    /// New current time.
    pub time: i32,
}

/// Makes the camera at `path` the active one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetActiveCamera {
    /// Scene tree path of a camera.
    pub path: String,
}

/// Sets properties of the object at `path`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetProperties {
    /// Scene tree path of the object.
    pub path: String,
}

/// Header announcing the body that follows it in a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    /// Identifier of the body schema.
    pub msg_id: String,
}

/// Header announcing the body that follows it in a reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    /// Identifier of the body schema.
    pub msg_id: String,
}

impl Request {
    /// Header for `kind`.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            msg_id: kind.msg_id().to_owned(),
        }
    }
}

impl Reply {
    /// Header for `kind`.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            msg_id: kind.msg_id().to_owned(),
        }
    }
}

/// A decoded request body a receiver acts upon.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneMessage<'a> {
    /// `set_mesh_data`.
    SetMeshData(SetMeshData<'a>),
    /// `get_mesh_data`.
    GetMeshData(GetMeshData),
    /// `set_camera_data`.
    SetCameraData(SetCameraData<'a>),
    /// `set_time`.
    SetTime(SetTime),
    /// `set_active_camera`.
    SetActiveCamera(SetActiveCamera),
    /// `set_properties`.
    SetProperties(SetProperties),
}

impl SceneMessage<'_> {
    /// Schema of this body.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::SetMeshData(_) => MessageKind::SetMeshData,
            Self::GetMeshData(_) => MessageKind::GetMeshData,
            Self::SetCameraData(_) => MessageKind::SetCameraData,
            Self::SetTime(_) => MessageKind::SetTime,
            Self::SetActiveCamera(_) => MessageKind::SetActiveCamera,
            Self::SetProperties(_) => MessageKind::SetProperties,
        }
    }

    /// Semantic validation of the payload. Messages without arrays pass.
    pub fn check(&self, policy: &ValidationPolicy) -> Result<(), ValidationReport> {
        match self {
            Self::SetMeshData(msg) => msg.data.check_message(policy),
            Self::SetCameraData(msg) => msg.data.check_message(policy),
            Self::GetMeshData(_)
            | Self::SetTime(_)
            | Self::SetActiveCamera(_)
            | Self::SetProperties(_) => Ok(()),
        }
    }
}
