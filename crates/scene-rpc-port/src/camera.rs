// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Camera payload: extrinsics, intrinsics and attached images.

use crate::mesh::{owned_map, ArrayMap};
use crate::validate::{check_non_negative, ValidationPolicy, ValidationReport};

/// Camera description.
///
/// The extrinsics define the world to camera transform
/// `X_cam = X_world * R + t`. Intrinsics follow COLMAP naming, e.g. model
/// `SIMPLE_RADIAL` with parameters `[f, cx, cy, k]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CameraData<'a> {
    /// Rotation `R` as a quaternion `[x, y, z, w]`.
    pub rotation: [f64; 4],
    /// Translation `t`.
    pub translation: [f64; 3],
    /// Intrinsic camera model name.
    pub intrinsic_model: String,
    /// Parameters of the intrinsic model, in model order.
    pub intrinsic_parameters: Vec<f64>,
    /// Image width in pixels.
    pub width: i32,
    /// Image height in pixels.
    pub height: i32,
    /// Arrays to be interpreted as camera images.
    pub images: ArrayMap<'a>,
}

impl CameraData<'_> {
    /// Message identifier of a bare camera payload.
    pub const MSG_ID: &'static str = "camera_data";

    /// Image dimensions must be non-negative; images follow the byte-length
    /// policy.
    pub fn check_message(&self, policy: &ValidationPolicy) -> Result<(), ValidationReport> {
        let mut report = ValidationReport::new();
        report.record("width", check_non_negative(i64::from(self.width)));
        report.record("height", check_non_negative(i64::from(self.height)));
        if policy.check_byte_lengths {
            for (name, image) in &self.images {
                report.record(format!("images[{name}]"), image.check_byte_length());
            }
        }
        report.into_result()
    }

    /// Deep copy detached from the decode buffer.
    pub fn into_owned(self) -> CameraData<'static> {
        CameraData {
            rotation: self.rotation,
            translation: self.translation,
            intrinsic_model: self.intrinsic_model,
            intrinsic_parameters: self.intrinsic_parameters,
            width: self.width,
            height: self.height,
            images: owned_map(self.images),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Array;

    fn camera() -> CameraData<'static> {
        CameraData {
            rotation: [0.0, 0.0, 0.0, 1.0],
            translation: [0.0, 0.0, -5.0],
            intrinsic_model: "SIMPLE_RADIAL".into(),
            intrinsic_parameters: vec![500.0, 320.0, 240.0, 0.01],
            width: 2,
            height: 1,
            ..CameraData::default()
        }
    }

    #[test]
    fn valid_camera_passes() {
        let mut cam = camera();
        cam.images.insert(
            "rgb".into(),
            Array::from_vec(&[0u8; 6], vec![1, 2, 3]).unwrap(),
        );
        assert!(cam.check_message(&ValidationPolicy::default()).is_ok());
    }

    #[test]
    fn negative_dimensions_fail() {
        let mut cam = camera();
        cam.height = -1;
        let report = cam.check_message(&ValidationPolicy::PERMISSIVE).unwrap_err();
        assert_eq!(report.failures()[0].field, "height");
    }

    #[test]
    fn truncated_images_fail_by_default() {
        let mut cam = camera();
        let mut image = Array::from_vec(&[0u8; 6], vec![1, 2, 3]).unwrap();
        image.shape = vec![2, 2, 3];
        cam.images.insert("rgb".into(), image);
        let report = cam.check_message(&ValidationPolicy::default()).unwrap_err();
        assert_eq!(
            report.to_string(),
            "invalid images[rgb]: expected 12 bytes of data but got 6"
        );
        assert!(cam.check_message(&ValidationPolicy::PERMISSIVE).is_ok());
    }
}
