use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion};

use crate::device::Marker;

/// Rigid transform applied to host objects. Translation is in metres.
pub type Transform = Isometry3<f64>;

/// Converts a raw marker reading into the transform from the tracker to the
/// marker.
pub trait PoseMapper: Send {
    fn marker_to_transform(&self, marker: &Marker) -> Transform;
}

/// Default mapper: millimetres to metres, rotation taken as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerPoseMapper;

impl PoseMapper for MarkerPoseMapper {
    fn marker_to_transform(&self, marker: &Marker) -> Transform {
        let [x, y, z] = marker.translation_mm;
        let r = &marker.rotation;
        let matrix = Matrix3::new(
            r[0][0], r[0][1], r[0][2], //
            r[1][0], r[1][1], r[1][2], //
            r[2][0], r[2][1], r[2][2],
        );
        // Device rotations are only orthonormal up to sensor noise.
        let rotation = Rotation3::from_matrix(&matrix);

        Isometry3::from_parts(
            Translation3::new(x / 1000.0, y / 1000.0, z / 1000.0),
            UnitQuaternion::from_rotation_matrix(&rotation),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn converts_millimetres_to_metres() {
        let transform = MarkerPoseMapper.marker_to_transform(&Marker::at(1, [1000.0, -250.0, 40.0]));

        let t = transform.translation.vector;
        assert!((t - Vector3::new(1.0, -0.25, 0.04)).norm() < 1e-12);
        assert!(transform.rotation.angle() < 1e-9);
    }

    #[test]
    fn keeps_marker_rotation() {
        let quarter_turn = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let transform = MarkerPoseMapper.marker_to_transform(&Marker::new(1, [0.0; 3], quarter_turn));

        let rotated = transform.rotation * Vector3::x();
        assert!((rotated - Vector3::y()).norm() < 1e-9);
    }
}
