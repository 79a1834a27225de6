//! Core library for the tracker bridge.
//!
//! An acquisition thread reads marker frames from an optical tracker and
//! double-buffers them behind a single frame lock. The host drives
//! [`FusionTracker::run_one`] at its own rate to apply the latest frame to its
//! scene, and can record the frame stream and save it to disk in the
//! background without pausing acquisition.

pub mod acquisition;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod motion;
pub mod pose;
pub mod record;
pub mod tracker;

pub use acquisition::ConnectionState;
pub use config::{PresetFile, TrackerParams, DEFAULT_TRACKER_BASE, PRESET_NAMES};
pub use device::{
    channel_device, ChannelDriver, DeviceDriver, DeviceParams, DeviceSession, DeviceStatus,
    Frame, FrameFeeder, GeometryId, Marker, SimulatedDriver,
};
pub use error::{Result, TrackerError};
pub use host::{AppliedTransform, HandleResolver, InMemoryScene, ObjectHandle, SceneHost, TargetSink};
pub use motion::{GeometryRef, MotionConfig, MotionConfigParams, MotionConfigTable};
pub use pose::{MarkerPoseMapper, PoseMapper, Transform};
pub use record::{
    read_log_file, LogReader, PoseMessage, Recorder, RecordingBuffer, RecordingSettings,
    SaveReport,
};
pub use tracker::FusionTracker;
