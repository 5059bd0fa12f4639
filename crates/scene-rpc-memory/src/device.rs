// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Device identifiers.

use std::fmt;
use std::str::FromStr;

use crate::MemoryError;

/// Kind of memory a buffer lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceType {
    /// Host memory.
    Cpu,
    /// CUDA device memory.
    Cuda,
    /// SYCL device memory. Recognized by name; no manager slot exists.
    Sycl,
}

impl DeviceType {
    /// Name used in device strings.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::Cuda => "CUDA",
            Self::Sycl => "SYCL",
        }
    }
}

/// A device kind plus its ordinal, written `CPU:0`, `CUDA:1` and so on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Device {
    /// Device kind.
    pub kind: DeviceType,
    /// Ordinal among devices of the same kind.
    pub id: u32,
}

impl Device {
    /// The default host device, `CPU:0`.
    pub const HOST: Self = Self::cpu(0);

    /// Host device `id`.
    pub const fn cpu(id: u32) -> Self {
        Self {
            kind: DeviceType::Cpu,
            id,
        }
    }

    /// CUDA device `id`.
    pub const fn cuda(id: u32) -> Self {
        Self {
            kind: DeviceType::Cuda,
            id,
        }
    }

    /// `true` for host memory.
    pub const fn is_host(self) -> bool {
        matches!(self.kind, DeviceType::Cpu)
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::HOST
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.id)
    }
}

impl FromStr for Device {
    type Err = MemoryError;

    /// Parses `KIND:ID`. Kind matching ignores ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MemoryError::InvalidDevice(s.to_owned());
        let (kind, id) = s.split_once(':').ok_or_else(invalid)?;
        let kind = [DeviceType::Cpu, DeviceType::Cuda, DeviceType::Sycl]
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(kind))
            .ok_or_else(invalid)?;
        let id = id.parse().map_err(|_| invalid())?;
        Ok(Self { kind, id })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let device: Device = "CUDA:1".parse().unwrap();
        assert_eq!(device, Device::cuda(1));
        assert_eq!(device.to_string(), "CUDA:1");
        assert_eq!("cpu:0".parse::<Device>().unwrap(), Device::HOST);
        assert!(Device::HOST.is_host());
        assert!(!device.is_host());
    }

    #[test]
    fn rejects_malformed_strings() {
        for bad in ["", "CPU", "GPU:0", "CPU:-1", "CUDA:x", ":0"] {
            assert!(
                matches!(bad.parse::<Device>(), Err(MemoryError::InvalidDevice(_))),
                "{bad}"
            );
        }
    }
}
