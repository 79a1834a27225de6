//! Routes the markers of one frame to the host.

use crate::{
    device::{Frame, GeometryId},
    host::{ObjectHandle, TargetSink},
    motion::{MotionConfig, MotionConfigTable},
    pose::{PoseMapper, Transform},
    Result, TrackerError,
};

/// Picks the transform to hand to the host for one configured marker.
///
/// `measured` is the tracker-to-marker transform. Moving the tracker base in
/// the measured object's frame needs its inverse; moving anything within the
/// tracker base uses it unchanged. Every other combination is rejected.
pub fn transform_to_apply(
    geometry_id: GeometryId,
    config: &MotionConfig,
    tracker_base: ObjectHandle,
    measured: Transform,
) -> Result<Transform> {
    if config.object_to_move == tracker_base
        && config.frame_in_which_to_move_object == config.object_being_measured
    {
        Ok(measured.inverse())
    } else if config.frame_in_which_to_move_object != tracker_base {
        Err(TrackerError::UnsupportedConfiguration { geometry_id })
    } else {
        Ok(measured)
    }
}

/// Sends one transform per configured marker in `frame` to `sink`, in frame
/// order. Markers without a config are skipped. Returns the number of sink
/// calls made.
pub fn dispatch_frame<M, S>(
    frame: &Frame,
    table: &MotionConfigTable,
    tracker_base: ObjectHandle,
    mapper: &M,
    sink: &mut S,
) -> Result<usize>
where
    M: PoseMapper + ?Sized,
    S: TargetSink + ?Sized,
{
    let mut applied = 0;
    for marker in &frame.markers {
        let Some(config) = table.get(marker.geometry_id) else {
            continue;
        };

        let measured = mapper.marker_to_transform(marker);
        let transform = transform_to_apply(marker.geometry_id, config, tracker_base, measured)?;
        sink.set_transform(
            config.object_to_move,
            config.frame_in_which_to_move_object,
            &transform,
        )?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use nalgebra::{Isometry3, Vector3};

    use super::*;
    use crate::{device::Marker, host::InMemoryScene, pose::MarkerPoseMapper};

    const BASE: ObjectHandle = 1;
    const FIDUCIAL_22: ObjectHandle = 2;
    const FIDUCIAL_55: ObjectHandle = 3;
    const OTHER: ObjectHandle = 4;

    fn scene() -> InMemoryScene {
        InMemoryScene::with_objects(["OpticalTrackerBase#0", "Fiducial#22", "Fiducial#55", "Other#0"])
    }

    fn move_bone() -> MotionConfig {
        MotionConfig {
            object_to_move: BASE,
            frame_in_which_to_move_object: FIDUCIAL_55,
            object_being_measured: FIDUCIAL_55,
        }
    }

    fn move_tracker() -> MotionConfig {
        MotionConfig {
            object_to_move: FIDUCIAL_22,
            frame_in_which_to_move_object: BASE,
            object_being_measured: FIDUCIAL_22,
        }
    }

    fn sample() -> Transform {
        Isometry3::new(Vector3::new(0.1, -0.2, 1.3), Vector3::new(0.0, 0.3, 0.7))
    }

    #[test]
    fn base_moved_in_measured_frame_is_inverted() {
        let applied = transform_to_apply(55, &move_bone(), BASE, sample()).unwrap();
        assert!((applied * sample()).translation.vector.norm() < 1e-12);
        assert!((applied * sample()).rotation.angle() < 1e-9);
    }

    #[test]
    fn measured_object_moved_in_base_is_unmodified() {
        let applied = transform_to_apply(22, &move_tracker(), BASE, sample()).unwrap();
        assert_eq!(applied, sample());
    }

    #[test]
    fn other_reference_frames_are_unsupported() {
        let config = MotionConfig {
            object_to_move: FIDUCIAL_22,
            frame_in_which_to_move_object: OTHER,
            object_being_measured: FIDUCIAL_22,
        };
        let err = transform_to_apply(22, &config, BASE, sample()).unwrap_err();
        assert!(matches!(err, TrackerError::UnsupportedConfiguration { geometry_id: 22 }));
    }

    #[test]
    fn skips_unconfigured_geometries_and_keeps_frame_order() {
        let mut table = MotionConfigTable::new();
        table.insert(55, move_bone());
        table.insert(22, move_tracker());
        let frame = Frame::new(
            0,
            0,
            vec![
                Marker::at(22, [0.0, 0.0, 1000.0]),
                Marker::at(99, [0.0, 0.0, 500.0]),
                Marker::at(55, [0.0, 0.0, 2000.0]),
            ],
        );
        let mut sink = scene();

        let applied = dispatch_frame(&frame, &table, BASE, &MarkerPoseMapper, &mut sink).unwrap();

        assert_eq!(applied, 2);
        let calls = sink.applied();
        assert_eq!(calls[0].object, FIDUCIAL_22);
        assert_eq!(calls[0].reference_frame, BASE);
        assert!((calls[0].transform.translation.z - 1.0).abs() < 1e-12);
        assert_eq!(calls[1].object, BASE);
        assert_eq!(calls[1].reference_frame, FIDUCIAL_55);
        assert!((calls[1].transform.translation.z + 2.0).abs() < 1e-12);
    }

    #[test]
    fn unsupported_marker_gets_no_sink_call() {
        let mut table = MotionConfigTable::new();
        table.insert(22, move_tracker());
        table.insert(
            55,
            MotionConfig {
                object_to_move: FIDUCIAL_55,
                frame_in_which_to_move_object: OTHER,
                object_being_measured: FIDUCIAL_55,
            },
        );
        let frame = Frame::new(0, 0, vec![Marker::at(22, [0.0; 3]), Marker::at(55, [0.0; 3])]);
        let mut sink = scene();

        let err = dispatch_frame(&frame, &table, BASE, &MarkerPoseMapper, &mut sink).unwrap_err();

        assert!(matches!(err, TrackerError::UnsupportedConfiguration { geometry_id: 55 }));
        assert_eq!(sink.applied().len(), 1);
        assert!(sink.latest_for(FIDUCIAL_55).is_none());
    }
}
