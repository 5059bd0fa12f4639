// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Uniform success/error reply body.

use core::fmt;

/// Reserved status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    /// Success.
    Ok = 0,
    /// The request named a `msg_id` the receiver does not handle.
    UnsupportedMsgId = 1,
    /// The body did not decode as the announced schema.
    UnpackingFailed = 2,
    /// The body decoded but failed validation or could not be applied.
    ProcessingFailed = 3,
}

impl StatusCode {
    /// Raw wire value.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Reserved code for a wire value, if any.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::UnsupportedMsgId),
            2 => Some(Self::UnpackingFailed),
            3 => Some(Self::ProcessingFailed),
            _ => None,
        }
    }

    /// Fixed text sent with this code.
    pub const fn text(self) -> &'static str {
        match self {
            Self::Ok => "",
            Self::UnsupportedMsgId => "unsupported msg_id",
            Self::UnpackingFailed => "error during unpacking",
            Self::ProcessingFailed => "error while processing message",
        }
    }
}

/// Reply body reporting the outcome of a request. Code 0 means success.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Status {
    /// Status code; see [`StatusCode`] for reserved values.
    pub code: i32,
    /// Human readable description (wire key `str`).
    pub message: String,
}

impl Status {
    /// Message identifier of a status body.
    pub const MSG_ID: &'static str = "status";

    /// Status with an arbitrary code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Success.
    pub fn ok() -> Self {
        Self::from(StatusCode::Ok)
    }

    /// Code 1.
    pub fn unsupported_msg_id() -> Self {
        Self::from(StatusCode::UnsupportedMsgId)
    }

    /// Code 2.
    pub fn unpacking_failed() -> Self {
        Self::from(StatusCode::UnpackingFailed)
    }

    /// Code 3.
    pub fn processing_failed() -> Self {
        Self::from(StatusCode::ProcessingFailed)
    }

    /// Reserved status with `detail` appended to its fixed text.
    pub fn with_detail(code: StatusCode, detail: impl fmt::Display) -> Self {
        Self::new(code.code(), format!("{}: {detail}", code.text()))
    }

    /// `true` for code 0.
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok.code()
    }

    /// Reserved code, if the code is one.
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_code(self.code)
    }
}

impl From<StatusCode> for Status {
    fn from(code: StatusCode) -> Self {
        Self::new(code.code(), code.text())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "status {}", self.code)
        } else {
            write!(f, "status {}: {}", self.code, self.message)
        }
    }
}
