//! Device session boundary.
//!
//! The tracker talks to hardware only through [`DeviceDriver`] and
//! [`DeviceSession`]. Two drivers ship with the crate: [`SimulatedDriver`]
//! produces synthetic moving markers and [`ChannelDriver`] receives frames that
//! another thread pushes through a [`FrameFeeder`].

mod channel;
mod simulated;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Result;

pub use channel::{channel_device, ChannelDriver, FrameFeeder};
pub use simulated::SimulatedDriver;

/// Identifier of a physical tracked geometry.
pub type GeometryId = u32;

/// Raw reading of one detected geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub geometry_id: GeometryId,
    /// Position of the geometry in the tracker frame, millimetres.
    pub translation_mm: [f64; 3],
    /// Row-major rotation of the geometry in the tracker frame.
    pub rotation: [[f64; 3]; 3],
    #[serde(default)]
    pub registration_error_mm: f64,
}

impl Marker {
    pub fn new(geometry_id: GeometryId, translation_mm: [f64; 3], rotation: [[f64; 3]; 3]) -> Self {
        Self {
            geometry_id,
            translation_mm,
            rotation,
            registration_error_mm: 0.0,
        }
    }

    /// Marker at `translation_mm` with no rotation.
    pub fn at(geometry_id: GeometryId, translation_mm: [f64; 3]) -> Self {
        Self::new(
            geometry_id,
            translation_mm,
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        )
    }
}

/// One snapshot of every marker the device detected at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_index: u64,
    /// Device clock, microseconds.
    pub timestamp_us: u64,
    pub markers: Vec<Marker>,
}

impl Frame {
    pub fn new(frame_index: u64, timestamp_us: u64, markers: Vec<Marker>) -> Self {
        Self {
            frame_index,
            timestamp_us,
            markers,
        }
    }

    /// Empties the frame while keeping its marker allocation.
    pub fn clear(&mut self) {
        self.frame_index = 0;
        self.timestamp_us = 0;
        self.markers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Parameters used to open a device session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceParams {
    /// Open only the device with this serial number, if set.
    pub serial_number: Option<u64>,
    /// Geometry definition files the device should load.
    pub geometry_files: Vec<PathBuf>,
    /// Upper bound on a single `receive` call.
    pub receive_timeout_ms: u64,
    /// Acquisition rate of simulated devices.
    pub frame_rate_hz: f64,
}

impl Default for DeviceParams {
    fn default() -> Self {
        Self {
            serial_number: None,
            geometry_files: Vec::new(),
            receive_timeout_ms: 100,
            frame_rate_hz: 300.0,
        }
    }
}

/// Snapshot of device state stored alongside each recorded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub serial_number: u64,
    pub name: String,
    /// Geometry files loaded when the session was opened.
    #[serde(default)]
    pub geometry_files: Vec<PathBuf>,
}

/// An open connection to a tracking device.
///
/// Sessions are moved onto the acquisition thread and used only there.
pub trait DeviceSession: Send {
    /// Blocks until the next frame is available and overwrites `frame` with it.
    ///
    /// Returns [`TrackerError::ReceiveTimeout`](crate::TrackerError::ReceiveTimeout)
    /// when nothing arrived in time; any other error is fatal to acquisition.
    fn receive(&mut self, frame: &mut Frame) -> Result<()>;

    fn make_frame(&self) -> Frame {
        Frame::default()
    }

    fn status(&self) -> DeviceStatus;
}

/// Opens device sessions.
pub trait DeviceDriver: Send + 'static {
    fn open(&self, params: &DeviceParams) -> Result<Box<dyn DeviceSession>>;
}

impl<F> DeviceDriver for F
where
    F: Fn(&DeviceParams) -> Result<Box<dyn DeviceSession>> + Send + 'static,
{
    fn open(&self, params: &DeviceParams) -> Result<Box<dyn DeviceSession>> {
        self(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearing_a_frame_keeps_capacity() {
        let mut frame = Frame::new(4, 120, vec![Marker::at(1, [0.0; 3]); 8]);
        let capacity = frame.markers.capacity();
        frame.clear();

        assert!(frame.is_empty());
        assert_eq!(frame.frame_index, 0);
        assert_eq!(frame.markers.capacity(), capacity);
    }

    #[test]
    fn device_params_fill_missing_fields_from_defaults() {
        let params: DeviceParams = serde_json::from_str(r#"{ "serial_number": 7 }"#).unwrap();
        assert_eq!(params.serial_number, Some(7));
        assert_eq!(params.receive_timeout_ms, DeviceParams::default().receive_timeout_ms);
    }
}
