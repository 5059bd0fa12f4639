// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Two-phase envelope framing.
//!
//! A request is a `Request{msg_id}` header immediately followed by the body
//! that `msg_id` names; both are top-level MessagePack maps in one buffer.
//! Replies use a `Reply{msg_id}` header the same way. Decoding reads the
//! header first, selects the body schema from it and then requires the body
//! to end exactly at the end of the buffer.

use scene_rpc_port::{MeshData, MessageKind, Reply, Request, SceneMessage, Status, StatusCode};
use thiserror::Error;

use crate::msgpack::{
    decode_get_mesh_data_inner, decode_mesh_data_inner, decode_reply_inner,
    decode_request_inner, decode_set_active_camera_inner, decode_set_camera_data_inner,
    decode_set_mesh_data_inner, decode_set_properties_inner, decode_set_time_inner,
    decode_status_inner, encode_get_mesh_data_inner, encode_mesh_data_inner, encode_reply_inner,
    encode_request_inner, encode_set_active_camera_inner, encode_set_camera_data_inner,
    encode_set_mesh_data_inner, encode_set_properties_inner, encode_set_time_inner,
    encode_status_inner, to_vec, CodecError, DecodeError, Decoder,
};

/// Why an inbound envelope could not be turned into a message.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The buffer is larger than the receiver accepts.
    #[error("message of {len} bytes exceeds the limit of {limit} bytes")]
    TooLarge {
        /// Size of the rejected buffer.
        len: usize,
        /// Configured limit.
        limit: usize,
    },
    /// The header did not decode.
    #[error("malformed header: {0}")]
    Header(#[source] DecodeError),
    /// The header names a schema this side does not accept here.
    #[error("unsupported msg_id {0:?}")]
    UnsupportedMsgId(String),
    /// The body did not decode as the announced schema.
    #[error("malformed {msg_id} body: {source}")]
    Body {
        /// Announced schema.
        msg_id: &'static str,
        /// Decoder failure.
        #[source]
        source: DecodeError,
    },
    /// Bytes remain after the body.
    #[error("{count} trailing bytes after {msg_id} body")]
    TrailingBytes {
        /// Announced schema.
        msg_id: &'static str,
        /// Number of unread bytes.
        count: usize,
    },
}

impl EnvelopeError {
    /// Status reply for this failure: code 1 for an unsupported `msg_id`,
    /// code 2 for everything else.
    pub fn status(&self) -> Status {
        match self {
            Self::UnsupportedMsgId(msg_id) => {
                Status::with_detail(StatusCode::UnsupportedMsgId, format_args!("{msg_id:?}"))
            }
            _ => Status::with_detail(StatusCode::UnpackingFailed, self),
        }
    }
}

/// Body that can follow a `Reply` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyBody<'a> {
    /// Outcome of a request.
    Status(Status),
    /// Mesh returned for `get_mesh_data`.
    MeshData(MeshData<'a>),
}

impl ReplyBody<'_> {
    /// Schema announced in the reply header.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Status(_) => MessageKind::Status,
            Self::MeshData(_) => MessageKind::MeshData,
        }
    }

    /// The status carried by this reply. A mesh reply counts as success.
    pub fn status(&self) -> Status {
        match self {
            Self::Status(status) => status.clone(),
            Self::MeshData(_) => Status::ok(),
        }
    }

    /// Deep copy detached from the decode buffer.
    pub fn into_owned(self) -> ReplyBody<'static> {
        match self {
            Self::Status(status) => ReplyBody::Status(status),
            Self::MeshData(mesh) => ReplyBody::MeshData(mesh.into_owned()),
        }
    }
}

impl From<Status> for ReplyBody<'_> {
    fn from(status: Status) -> Self {
        Self::Status(status)
    }
}

fn finish(decoder: &Decoder<'_>, kind: MessageKind) -> Result<(), EnvelopeError> {
    let count = decoder.remaining();
    if count > 0 {
        return Err(EnvelopeError::TrailingBytes {
            msg_id: kind.msg_id(),
            count,
        });
    }
    Ok(())
}

/// Encode a request: header followed by body.
pub fn encode_request(msg: &SceneMessage<'_>) -> Result<Vec<u8>, CodecError> {
    to_vec(|buf| {
        encode_request_inner(buf, &Request::new(msg.kind()))?;
        match msg {
            SceneMessage::SetMeshData(m) => encode_set_mesh_data_inner(buf, m),
            SceneMessage::GetMeshData(m) => encode_get_mesh_data_inner(buf, m),
            SceneMessage::SetCameraData(m) => encode_set_camera_data_inner(buf, m),
            SceneMessage::SetTime(m) => encode_set_time_inner(buf, m),
            SceneMessage::SetActiveCamera(m) => encode_set_active_camera_inner(buf, m),
            SceneMessage::SetProperties(m) => encode_set_properties_inner(buf, m),
        }
    })
}

/// Decode only the request header, leaving `decoder` at the body.
pub fn decode_request_header(decoder: &mut Decoder<'_>) -> Result<Request, EnvelopeError> {
    decode_request_inner(decoder).map_err(EnvelopeError::Header)
}

/// Decode a complete request. Array payloads borrow `bytes`.
pub fn decode_request(bytes: &[u8]) -> Result<SceneMessage<'_>, EnvelopeError> {
    let mut d = Decoder::new(bytes);
    let header = decode_request_header(&mut d)?;
    let Some(kind) = MessageKind::from_msg_id(&header.msg_id) else {
        return Err(EnvelopeError::UnsupportedMsgId(header.msg_id));
    };
    let body = match kind {
        MessageKind::SetMeshData => {
            decode_set_mesh_data_inner(&mut d).map(SceneMessage::SetMeshData)
        }
        MessageKind::GetMeshData => {
            decode_get_mesh_data_inner(&mut d).map(SceneMessage::GetMeshData)
        }
        MessageKind::SetCameraData => {
            decode_set_camera_data_inner(&mut d).map(SceneMessage::SetCameraData)
        }
        MessageKind::SetTime => decode_set_time_inner(&mut d).map(SceneMessage::SetTime),
        MessageKind::SetActiveCamera => {
            decode_set_active_camera_inner(&mut d).map(SceneMessage::SetActiveCamera)
        }
        MessageKind::SetProperties => {
            decode_set_properties_inner(&mut d).map(SceneMessage::SetProperties)
        }
        // Payload schemas are not requests on their own.
        MessageKind::Array
        | MessageKind::MeshData
        | MessageKind::CameraData
        | MessageKind::Status => return Err(EnvelopeError::UnsupportedMsgId(header.msg_id)),
    };
    let msg = body.map_err(|source| EnvelopeError::Body {
        msg_id: kind.msg_id(),
        source,
    })?;
    finish(&d, kind)?;
    Ok(msg)
}

/// Encode a reply: header followed by body.
pub fn encode_reply(body: &ReplyBody<'_>) -> Result<Vec<u8>, CodecError> {
    to_vec(|buf| {
        encode_reply_inner(buf, &Reply::new(body.kind()))?;
        match body {
            ReplyBody::Status(status) => encode_status_inner(buf, status),
            ReplyBody::MeshData(mesh) => encode_mesh_data_inner(buf, mesh),
        }
    })
}

/// Decode a complete reply. Mesh payloads borrow `bytes`.
pub fn decode_reply(bytes: &[u8]) -> Result<ReplyBody<'_>, EnvelopeError> {
    let mut d = Decoder::new(bytes);
    let header = decode_reply_inner(&mut d).map_err(EnvelopeError::Header)?;
    let kind = match MessageKind::from_msg_id(&header.msg_id) {
        Some(kind @ (MessageKind::Status | MessageKind::MeshData)) => kind,
        _ => return Err(EnvelopeError::UnsupportedMsgId(header.msg_id)),
    };
    let body = if kind == MessageKind::Status {
        decode_status_inner(&mut d).map(ReplyBody::Status)
    } else {
        decode_mesh_data_inner(&mut d).map(ReplyBody::MeshData)
    };
    let body = body.map_err(|source| EnvelopeError::Body {
        msg_id: kind.msg_id(),
        source,
    })?;
    finish(&d, kind)?;
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use scene_rpc_port::{Array, GetMeshData, SceneMeta, SetActiveCamera, SetMeshData, SetTime};

    fn triangle() -> MeshData<'static> {
        let mut data = MeshData::with_vertices(Array::from_vec(&[0.0f32; 9], vec![3, 3]).unwrap());
        data.faces = Array::from_vec(&[0i32, 1, 2], vec![1, 3]).unwrap();
        data
    }

    fn set_triangle() -> SceneMessage<'static> {
        SceneMessage::SetMeshData(SetMeshData {
            meta: SceneMeta {
                path: "mesh/triangle".into(),
                time: 4,
                layer: "geometry".into(),
            },
            data: triangle(),
        })
    }

    fn header_only(msg_id: &str) -> Vec<u8> {
        let header = Request {
            msg_id: msg_id.into(),
        };
        to_vec(|buf| encode_request_inner(buf, &header)).unwrap()
    }

    #[test]
    fn request_round_trip() {
        let msg = set_triangle();
        let bytes = encode_request(&msg).unwrap();
        assert_eq!(decode_request(&bytes).unwrap(), msg);

        let get = SceneMessage::GetMeshData(GetMeshData {
            meta: SceneMeta::at("mesh/triangle"),
        });
        let bytes = encode_request(&get).unwrap();
        assert_eq!(decode_request(&bytes).unwrap(), get);
    }

    #[test]
    fn set_time_wire_bytes_are_stable() {
        // {"msg_id": "set_time"} {"time": 3}
        let wire = "81a66d73675f6964a87365745f74696d6581a474696d6503";
        let bytes = hex::decode(wire).unwrap();
        let msg = decode_request(&bytes).unwrap();
        assert_eq!(msg, SceneMessage::SetTime(SetTime { time: 3 }));
        assert_eq!(hex::encode(encode_request(&msg).unwrap()), wire);
    }

    #[test]
    fn header_and_body_are_consecutive() {
        let msg = SceneMessage::SetTime(SetTime { time: 9 });
        let bytes = encode_request(&msg).unwrap();
        let mut d = Decoder::new(&bytes);
        let header = decode_request_header(&mut d).unwrap();
        assert_eq!(header.msg_id, "set_time");
        // The body is a separate top-level map, not nested in the header.
        assert_eq!(d.map("SetTime").unwrap(), 1);
    }

    #[test]
    fn unknown_msg_id_is_code_one() {
        let err = decode_request(&header_only("set_lights")).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnsupportedMsgId(ref id) if id == "set_lights"));
        let status = err.status();
        assert_eq!(status.code, 1);
        assert!(status.message.starts_with("unsupported msg_id"));
    }

    #[test]
    fn payload_ids_are_not_requests() {
        for msg_id in ["array", "mesh_data", "camera_data", "status"] {
            let err = decode_request(&header_only(msg_id)).unwrap_err();
            assert_eq!(err.status().code, 1, "{msg_id}");
        }
    }

    #[test]
    fn malformed_body_is_code_two() {
        // header, then a body that is an integer instead of a map
        let mut bytes = header_only("set_active_camera");
        rmp::encode::write_uint(&mut bytes, 5).unwrap();
        let err = decode_request(&bytes).unwrap_err();
        assert!(matches!(err, EnvelopeError::Body { msg_id: "set_active_camera", .. }));
        assert_eq!(err.status().code, 2);
        assert!(err.status().message.starts_with("error during unpacking: "));
    }

    #[test]
    fn missing_body_is_code_two() {
        let err = decode_request(&header_only("set_time")).unwrap_err();
        assert_eq!(err.status().code, 2);
        let err = decode_request(&[]).unwrap_err();
        assert!(matches!(err, EnvelopeError::Header(_)));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_request(&SceneMessage::SetActiveCamera(SetActiveCamera {
            path: "cams/main".into(),
        }))
        .unwrap();
        // two empty fixstr values
        bytes.extend_from_slice(&[0xa0, 0xa0]);
        let err = decode_request(&bytes).unwrap_err();
        assert!(matches!(err, EnvelopeError::TrailingBytes { count: 2, .. }));
    }

    #[test]
    fn drill_truncated_request() {
        let bytes = encode_request(&set_triangle()).unwrap();
        for len in 0..bytes.len() {
            let err = decode_request(&bytes[..len]).unwrap_err();
            assert_ne!(err.status().code, 0);
        }
    }

    #[test]
    fn reply_round_trip() {
        let status = ReplyBody::Status(Status::processing_failed());
        let bytes = encode_reply(&status).unwrap();
        assert_eq!(decode_reply(&bytes).unwrap(), status);

        let mesh = ReplyBody::MeshData(triangle());
        let bytes = encode_reply(&mesh).unwrap();
        let decoded = decode_reply(&bytes).unwrap();
        assert_eq!(decoded.kind(), MessageKind::MeshData);
        assert!(decoded.status().is_ok());
        assert_eq!(decoded, mesh);
    }

    #[test]
    fn random_bytes_never_panic() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        for _ in 0..2000 {
            let len = rng.gen_range(0..64);
            let mut buf = vec![0u8; len];
            rng.fill(&mut buf[..]);
            if let Err(err) = decode_request(&buf) {
                assert!(matches!(err.status().code, 1 | 2));
            }
        }
    }
}
