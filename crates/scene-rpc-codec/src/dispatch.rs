// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Receiver loop body: one request in, exactly one reply out.

use scene_rpc_port::{
    HandlerError, SceneHandler, SceneMessage, Status, StatusCode, ValidationPolicy,
    DEFAULT_MAX_MESSAGE_BYTES,
};
use tracing::{debug, warn};

use crate::msgpack::CodecError;
use crate::envelope::{decode_request, encode_reply, EnvelopeError, ReplyBody};

/// Decodes, validates and applies requests against a [`SceneHandler`].
///
/// Every failure becomes a status reply; nothing a peer sends can make
/// [`Dispatcher::process`] fail. Size limit and unreadable bytes map to code 2,
/// unknown schemas to code 1, validation and handler failures to code 3.
#[derive(Debug)]
pub struct Dispatcher<H> {
    handler: H,
    policy: ValidationPolicy,
    max_message_bytes: usize,
}

impl<H: SceneHandler> Dispatcher<H> {
    /// Dispatcher with the default policy and size limit.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            policy: ValidationPolicy::default(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Requests larger than this are answered with code 2 before decoding.
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Replace the validation policy.
    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the request size limit.
    pub fn with_max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = limit;
        self
    }

    /// Active validation policy.
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// The wrapped handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The wrapped handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Unwrap the handler.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Run one request and return the reply body.
    pub fn process(&mut self, request: &[u8]) -> ReplyBody<'static> {
        if request.len() > self.max_message_bytes {
            let err = EnvelopeError::TooLarge {
                len: request.len(),
                limit: self.max_message_bytes,
            };
            return reject(None, err.status());
        }
        let msg = match decode_request(request) {
            Ok(msg) => msg,
            Err(err) => return reject(None, err.status()),
        };
        let msg_id = msg.kind().msg_id();
        debug!(msg_id, bytes = request.len(), "dispatching request");
        if let Err(report) = msg.check(&self.policy) {
            return reject(
                Some(msg_id),
                Status::with_detail(StatusCode::ProcessingFailed, report),
            );
        }
        match self.apply(msg) {
            Ok(reply) => reply,
            Err(err) => reject(Some(msg_id), handler_status(&err)),
        }
    }

    /// Run one request and return the encoded reply.
    pub fn handle(&mut self, request: &[u8]) -> Result<Vec<u8>, CodecError> {
        encode_reply(&self.process(request))
    }

    fn apply(&mut self, msg: SceneMessage<'_>) -> Result<ReplyBody<'static>, HandlerError> {
        match msg {
            SceneMessage::SetMeshData(m) => self.handler.set_mesh_data(m)?,
            SceneMessage::GetMeshData(m) => {
                return self.handler.get_mesh_data(m).map(ReplyBody::MeshData);
            }
            SceneMessage::SetCameraData(m) => self.handler.set_camera_data(m)?,
            SceneMessage::SetTime(m) => self.handler.set_time(m)?,
            SceneMessage::SetActiveCamera(m) => self.handler.set_active_camera(m)?,
            SceneMessage::SetProperties(m) => self.handler.set_properties(m)?,
        }
        Ok(ReplyBody::Status(Status::ok()))
    }
}

fn handler_status(err: &HandlerError) -> Status {
    match err {
        HandlerError::Unsupported(_) => Status::with_detail(StatusCode::UnsupportedMsgId, err),
        HandlerError::NotFound(_) | HandlerError::Rejected(_) | HandlerError::Backend(_) => {
            Status::with_detail(StatusCode::ProcessingFailed, err)
        }
    }
}

fn reject(msg_id: Option<&'static str>, status: Status) -> ReplyBody<'static> {
    warn!(msg_id, code = status.code, detail = %status.message, "request rejected");
    ReplyBody::Status(status)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::envelope::{decode_reply, encode_request};
    use crate::MockScene;
    use scene_rpc_port::{
        Array, GetMeshData, MeshData, SceneMeta, SetMeshData, SetProperties, SetTime,
    };

    fn set_mesh(path: &str, faces: Array<'static>) -> Vec<u8> {
        let mut data = MeshData::with_vertices(Array::from_vec(&[0.0f32; 9], vec![3, 3]).unwrap());
        data.faces = faces;
        encode_request(&SceneMessage::SetMeshData(SetMeshData {
            meta: SceneMeta::at(path),
            data,
        }))
        .unwrap()
    }

    #[test]
    fn valid_mesh_is_stored_and_returned() {
        let mut dispatcher = Dispatcher::new(MockScene::new());
        let faces = Array::from_vec(&[0i32, 1, 2], vec![1, 3]).unwrap();
        assert_eq!(
            dispatcher.process(&set_mesh("a/tri", faces.clone())),
            ReplyBody::Status(Status::ok())
        );

        let get = encode_request(&SceneMessage::GetMeshData(GetMeshData {
            meta: SceneMeta::at("a/tri"),
        }))
        .unwrap();
        let reply = dispatcher.handle(&get).unwrap();
        match decode_reply(&reply).unwrap() {
            ReplyBody::MeshData(mesh) => assert_eq!(mesh.faces, faces),
            ReplyBody::Status(status) => panic!("unexpected status {status}"),
        }
    }

    #[test]
    fn invalid_faces_are_code_three_with_diagnostic() {
        let mut dispatcher = Dispatcher::new(MockScene::new());
        let faces = Array::from_vec(&[0i32, 1, 1, 2], vec![2, 2]).unwrap();
        let status = dispatcher.process(&set_mesh("a/bad", faces)).status();
        assert_eq!(status.code, 3);
        assert_eq!(
            status.message,
            "error while processing message: invalid faces: expected shape [?, >2] but got [2, 2]"
        );
        assert_eq!(dispatcher.handler().mesh_count(), 0);
    }

    #[test]
    fn missing_mesh_is_code_three() {
        let mut dispatcher = Dispatcher::new(MockScene::new());
        let get = encode_request(&SceneMessage::GetMeshData(GetMeshData {
            meta: SceneMeta::at("nowhere"),
        }))
        .unwrap();
        let status = dispatcher.process(&get).status();
        assert_eq!(status.code, 3);
        assert!(status.message.contains("nowhere"));
    }

    #[test]
    fn oversize_request_is_code_two() {
        let mut dispatcher = Dispatcher::new(MockScene::new()).with_max_message_bytes(8);
        let request = encode_request(&SceneMessage::SetTime(SetTime { time: 1 })).unwrap();
        assert!(request.len() > 8);
        let status = dispatcher.process(&request).status();
        assert_eq!(status.code, 2);
        assert!(status.message.contains("exceeds the limit"));
        assert_eq!(dispatcher.handler().time, 0);
    }

    #[test]
    fn hand_packed_set_time_is_applied() {
        // {"msg_id": "set_time"} {"time": 3}, as a plain msgpack packer writes it
        let request = hex::decode("81a66d73675f6964a87365745f74696d6581a474696d6503").unwrap();
        let mut dispatcher = Dispatcher::new(MockScene::new());
        assert_eq!(dispatcher.max_message_bytes(), DEFAULT_MAX_MESSAGE_BYTES);
        assert_eq!(
            dispatcher.process(&request),
            ReplyBody::Status(Status::ok())
        );
        assert_eq!(dispatcher.handler().time, 3);
    }

    #[test]
    fn garbage_is_code_two() {
        let mut dispatcher = Dispatcher::new(MockScene::new());
        assert_eq!(dispatcher.process(&[0xff, 0x00]).status().code, 2);
    }

    #[test]
    fn unimplemented_handler_kind_is_code_one() {
        struct TimeOnly(i32);
        impl SceneHandler for TimeOnly {
            fn set_time(&mut self, msg: SetTime) -> Result<(), HandlerError> {
                self.0 = msg.time;
                Ok(())
            }
        }

        let mut dispatcher = Dispatcher::new(TimeOnly(0));
        let set_time = encode_request(&SceneMessage::SetTime(SetTime { time: 12 })).unwrap();
        assert!(dispatcher.process(&set_time).status().is_ok());
        assert_eq!(dispatcher.handler().0, 12);

        let props = encode_request(&SceneMessage::SetProperties(SetProperties {
            path: "x".into(),
        }))
        .unwrap();
        let status = dispatcher.process(&props).status();
        assert_eq!(status.code, 1);
        assert!(status.message.contains("set_properties"));
    }

    #[test]
    fn permissive_policy_skips_line_checks() {
        let mut data = MeshData::with_vertices(Array::from_vec(&[0.0f32; 9], vec![3, 3]).unwrap());
        data.lines = Array::from_vec(&[0.5f32, 1.0], vec![2]).unwrap();
        let request = encode_request(&SceneMessage::SetMeshData(SetMeshData {
            meta: SceneMeta::at("lines"),
            data,
        }))
        .unwrap();

        let mut strict = Dispatcher::new(MockScene::new());
        assert_eq!(strict.process(&request).status().code, 3);

        let mut lenient =
            Dispatcher::new(MockScene::new()).with_policy(ValidationPolicy::PERMISSIVE);
        assert!(lenient.process(&request).status().is_ok());
        assert_eq!(lenient.into_handler().mesh_count(), 1);
    }
}
