// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema layer of the scene RPC protocol.
//!
//! This crate defines what a producer can send to a scene receiver: typed
//! arrays, mesh and camera payloads, the set/get messages that address them
//! in the scene tree, and the status body every reply carries. It contains
//! NO serialization logic; that lives in scene-rpc-codec.
//!
//! # Design Principles
//!
//! - **Views, not copies.** [`Array`] borrows the bytes it describes. Decoded
//!   messages borrow the receive buffer; `into_owned` is the explicit copy.
//! - **Validation is data.** Checks return [`ValidationReport`]s of
//!   `{field, expected, actual}` records instead of writing into strings.
//! - **Closed sets.** Element kinds and message kinds are enums; dispatch is a
//!   `match`, not a registry.
//!
//! # Crate Features
//!
//! - `serde`: derives `Serialize`/`Deserialize` for [`ValidationPolicy`].

mod array;
mod camera;
mod dtype;
mod mesh;
mod messages;
mod port;
mod status;
mod validate;

pub use array::{Array, ArrayError};
pub use camera::CameraData;
pub use dtype::{element_width, Element, ElementType};
pub use mesh::{ArrayMap, MeshData, MIN_FACE_VERTICES, MIN_LINE_VERTICES};
pub use messages::{
    GetMeshData, MessageKind, Reply, Request, SceneMessage, SceneMeta, SetActiveCamera,
    SetCameraData, SetMeshData, SetProperties, SetTime, DEFAULT_MAX_MESSAGE_BYTES,
};
pub use port::{HandlerError, SceneHandler};
pub use status::{Status, StatusCode};
pub use validate::{
    check_non_negative, Actual, Expected, Mismatch, ValidationFailure, ValidationPolicy,
    ValidationReport,
};
