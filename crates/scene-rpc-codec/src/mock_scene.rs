// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mock scene for headless testing of the receive path.
//!
//! MockScene keeps accepted meshes and cameras in maps without any
//! rendering. Use it to verify dispatch, validation outcomes and the
//! addressing of set/get messages.

use std::collections::BTreeMap;

use scene_rpc_port::{
    CameraData, GetMeshData, HandlerError, MeshData, SceneHandler, SceneMeta, SetActiveCamera,
    SetCameraData, SetMeshData, SetProperties, SetTime,
};

/// In-memory scene graph.
///
/// Objects are keyed by the full `(path, time, layer)` triple, so the same
/// path may hold different data per time step.
#[derive(Debug, Default)]
pub struct MockScene {
    /// Stored meshes.
    pub meshes: BTreeMap<SceneMeta, MeshData<'static>>,
    /// Stored cameras.
    pub cameras: BTreeMap<SceneMeta, CameraData<'static>>,
    /// Current time set by `set_time`.
    pub time: i32,
    /// Path of the active camera.
    pub active_camera: Option<String>,
    /// Paths passed to `set_properties`, in arrival order.
    pub property_updates: Vec<String>,
    /// Number of messages applied successfully.
    pub applied: u32,
}

impl MockScene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Number of stored cameras.
    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Mesh stored at `meta`.
    pub fn mesh(&self, meta: &SceneMeta) -> Option<&MeshData<'static>> {
        self.meshes.get(meta)
    }

    /// Camera stored at `meta`.
    pub fn camera(&self, meta: &SceneMeta) -> Option<&CameraData<'static>> {
        self.cameras.get(meta)
    }

    fn has_camera_at(&self, path: &str) -> bool {
        self.cameras.keys().any(|meta| meta.path == path)
    }

    fn has_object_at(&self, path: &str) -> bool {
        self.has_camera_at(path) || self.meshes.keys().any(|meta| meta.path == path)
    }
}

impl SceneHandler for MockScene {
    fn set_mesh_data(&mut self, msg: SetMeshData<'_>) -> Result<(), HandlerError> {
        let msg = msg.into_owned();
        self.meshes.insert(msg.meta, msg.data);
        self.applied += 1;
        Ok(())
    }

    fn get_mesh_data(&mut self, msg: GetMeshData) -> Result<MeshData<'static>, HandlerError> {
        let mesh = self
            .meshes
            .get(&msg.meta)
            .cloned()
            .ok_or(HandlerError::NotFound(msg.meta.path))?;
        self.applied += 1;
        Ok(mesh)
    }

    fn set_camera_data(&mut self, msg: SetCameraData<'_>) -> Result<(), HandlerError> {
        let msg = msg.into_owned();
        self.cameras.insert(msg.meta, msg.data);
        self.applied += 1;
        Ok(())
    }

    fn set_time(&mut self, msg: SetTime) -> Result<(), HandlerError> {
        self.time = msg.time;
        self.applied += 1;
        Ok(())
    }

    fn set_active_camera(&mut self, msg: SetActiveCamera) -> Result<(), HandlerError> {
        if !self.has_camera_at(&msg.path) {
            return Err(HandlerError::NotFound(msg.path));
        }
        self.active_camera = Some(msg.path);
        self.applied += 1;
        Ok(())
    }

    fn set_properties(&mut self, msg: SetProperties) -> Result<(), HandlerError> {
        if !self.has_object_at(&msg.path) {
            return Err(HandlerError::NotFound(msg.path));
        }
        self.property_updates.push(msg.path);
        self.applied += 1;
        Ok(())
    }
}
