use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use nalgebra::{Rotation3, Vector3};

use super::{DeviceDriver, DeviceParams, DeviceSession, DeviceStatus, Frame, GeometryId, Marker};
use crate::{Result, TrackerError};

const ORBIT_RADIUS_MM: f64 = 150.0;
const BASE_DEPTH_MM: f64 = 1200.0;
const ORBIT_PERIOD_S: f64 = 4.0;

/// Driver for a fake tracker whose geometries orbit in front of the camera.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    serial_number: u64,
    geometry_ids: Vec<GeometryId>,
}

impl SimulatedDriver {
    pub fn new(geometry_ids: impl IntoIterator<Item = GeometryId>) -> Self {
        Self {
            serial_number: 0x5151_0001,
            geometry_ids: geometry_ids.into_iter().collect(),
        }
    }

    pub fn with_serial_number(mut self, serial_number: u64) -> Self {
        self.serial_number = serial_number;
        self
    }
}

impl DeviceDriver for SimulatedDriver {
    fn open(&self, params: &DeviceParams) -> Result<Box<dyn DeviceSession>> {
        if let Some(wanted) = params.serial_number {
            if wanted != self.serial_number {
                return Err(TrackerError::DeviceOpen(format!(
                    "no simulated device with serial number {wanted:#x}"
                )));
            }
        }
        if params.frame_rate_hz <= 0.0 || !params.frame_rate_hz.is_finite() {
            return Err(TrackerError::DeviceOpen(format!(
                "invalid frame rate {}",
                params.frame_rate_hz
            )));
        }

        tracing::info!(
            serial = self.serial_number,
            geometries = ?self.geometry_ids,
            geometry_files = ?params.geometry_files,
            "opened simulated tracking device"
        );

        Ok(Box::new(SimulatedSession {
            serial_number: self.serial_number,
            geometry_ids: self.geometry_ids.clone(),
            period: Duration::from_secs_f64(1.0 / params.frame_rate_hz),
            started: Instant::now(),
            next_index: 0,
            geometry_files: params.geometry_files.clone(),
        }))
    }
}

struct SimulatedSession {
    serial_number: u64,
    geometry_ids: Vec<GeometryId>,
    period: Duration,
    started: Instant,
    next_index: u64,
    geometry_files: Vec<PathBuf>,
}

impl DeviceSession for SimulatedSession {
    fn receive(&mut self, frame: &mut Frame) -> Result<()> {
        thread::sleep(self.period);

        let elapsed = self.started.elapsed();
        let phase = elapsed.as_secs_f64() * std::f64::consts::TAU / ORBIT_PERIOD_S;

        frame.clear();
        frame.frame_index = self.next_index;
        frame.timestamp_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.next_index += 1;

        for (slot, &geometry_id) in self.geometry_ids.iter().enumerate() {
            let angle = phase + slot as f64 * 0.5;
            let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
            let m = rotation.matrix();
            frame.markers.push(Marker {
                geometry_id,
                translation_mm: [
                    ORBIT_RADIUS_MM * angle.cos(),
                    ORBIT_RADIUS_MM * angle.sin(),
                    BASE_DEPTH_MM + 50.0 * slot as f64,
                ],
                rotation: [
                    [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                    [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                    [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
                ],
                registration_error_mm: 0.1,
            });
        }

        Ok(())
    }

    fn status(&self) -> DeviceStatus {
        DeviceStatus {
            serial_number: self.serial_number,
            name: "simulated".to_string(),
            geometry_files: self.geometry_files.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> DeviceParams {
        DeviceParams {
            frame_rate_hz: 1000.0,
            ..Default::default()
        }
    }

    #[test]
    fn produces_one_marker_per_geometry() {
        let driver = SimulatedDriver::new([22, 55]);
        let mut session = driver.open(&fast_params()).unwrap();
        let mut frame = session.make_frame();

        session.receive(&mut frame).unwrap();
        session.receive(&mut frame).unwrap();

        assert_eq!(frame.frame_index, 1);
        let ids: Vec<_> = frame.markers.iter().map(|m| m.geometry_id).collect();
        assert_eq!(ids, vec![22, 55]);
    }

    #[test]
    fn refuses_unknown_serial_number() {
        let driver = SimulatedDriver::new([22]).with_serial_number(1);
        let params = DeviceParams {
            serial_number: Some(2),
            ..fast_params()
        };

        let err = driver.open(&params).err().expect("open should fail");
        assert!(matches!(err, TrackerError::DeviceOpen(_)));
    }

    #[test]
    fn reports_loaded_geometry_files() {
        let params = DeviceParams {
            geometry_files: vec![PathBuf::from("geometry055.ini")],
            ..fast_params()
        };
        let session = SimulatedDriver::new([55]).open(&params).unwrap();

        assert_eq!(session.status().geometry_files, params.geometry_files);
    }
}
