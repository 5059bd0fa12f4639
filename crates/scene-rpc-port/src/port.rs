// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Receiver-side port: what a scene graph implements to accept messages.

use thiserror::Error;

use crate::mesh::MeshData;
use crate::messages::{
    GetMeshData, MessageKind, SetActiveCamera, SetCameraData, SetMeshData, SetProperties, SetTime,
};

/// Failure reported by a [`SceneHandler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler does not implement this message kind.
    #[error("{} is not supported by this receiver", .0.msg_id())]
    Unsupported(MessageKind),
    /// Nothing stored at the requested location.
    #[error("nothing stored at {0}")]
    NotFound(String),
    /// The handler refused an otherwise valid message.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The backing scene graph failed.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Scene graph port.
///
/// Receives messages that already decoded and passed validation. Bodies are
/// handed over by value and may still borrow the request buffer; call
/// `into_owned` on anything that must be kept.
///
/// Every method defaults to [`HandlerError::Unsupported`], so implementors
/// only override the kinds they handle.
pub trait SceneHandler {
    /// Add or replace a mesh.
    fn set_mesh_data(&mut self, msg: SetMeshData<'_>) -> Result<(), HandlerError> {
        let _ = msg;
        Err(HandlerError::Unsupported(MessageKind::SetMeshData))
    }

    /// Return a copy of a stored mesh.
    fn get_mesh_data(&mut self, msg: GetMeshData) -> Result<MeshData<'static>, HandlerError> {
        let _ = msg;
        Err(HandlerError::Unsupported(MessageKind::GetMeshData))
    }

    /// Add or replace a camera.
    fn set_camera_data(&mut self, msg: SetCameraData<'_>) -> Result<(), HandlerError> {
        let _ = msg;
        Err(HandlerError::Unsupported(MessageKind::SetCameraData))
    }

    /// Change the current time.
    fn set_time(&mut self, msg: SetTime) -> Result<(), HandlerError> {
        let _ = msg;
        Err(HandlerError::Unsupported(MessageKind::SetTime))
    }

    /// Change the active camera.
    fn set_active_camera(&mut self, msg: SetActiveCamera) -> Result<(), HandlerError> {
        let _ = msg;
        Err(HandlerError::Unsupported(MessageKind::SetActiveCamera))
    }

    /// Update object properties.
    fn set_properties(&mut self, msg: SetProperties) -> Result<(), HandlerError> {
        let _ = msg;
        Err(HandlerError::Unsupported(MessageKind::SetProperties))
    }
}
