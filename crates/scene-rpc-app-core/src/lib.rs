// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared application services for scene RPC tools (config, prefs).
//! Keeps receivers and the CLI free of storage details.

pub mod config;
pub mod prefs;
