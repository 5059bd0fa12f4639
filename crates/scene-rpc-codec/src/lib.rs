// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! MessagePack wire codec and receive path for scene-rpc-port.
//!
//! This crate provides:
//! - field-name-keyed MessagePack encode/decode for every body schema
//! - two-phase request/reply envelope framing
//! - `Dispatcher`, which turns request bytes into exactly one reply
//! - `MockScene` for headless testing of `SceneHandler` flows
//!
//! # Design
//!
//! Serialization is kept out of the port crate so the schema types stay
//! free of wire concerns.

mod dispatch;
mod envelope;
mod mock_scene;
mod msgpack;

pub use dispatch::*;
pub use envelope::*;
pub use mock_scene::*;
pub use msgpack::*;
