use std::{path::PathBuf, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::{DeviceDriver, DeviceParams, DeviceSession, DeviceStatus, Frame};
use crate::{Result, TrackerError};

/// Creates a driver whose frames are pushed in through the returned feeder.
///
/// `capacity` bounds how many frames may be queued before [`FrameFeeder::send`]
/// blocks.
pub fn channel_device(capacity: usize) -> (FrameFeeder, ChannelDriver) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity);
    (
        FrameFeeder { sender },
        ChannelDriver {
            receiver,
            serial_number: 0,
        },
    )
}

/// Sending half of a [`ChannelDriver`].
#[derive(Debug, Clone)]
pub struct FrameFeeder {
    sender: Sender<Frame>,
}

impl FrameFeeder {
    pub fn send(&self, frame: Frame) -> Result<()> {
        self.sender
            .send(frame)
            .map_err(|_| TrackerError::msg("channel device has been closed"))
    }

    /// Number of frames queued but not yet received.
    pub fn queued(&self) -> usize {
        self.sender.len()
    }
}

/// Driver that replays frames supplied by a [`FrameFeeder`].
#[derive(Debug, Clone)]
pub struct ChannelDriver {
    receiver: Receiver<Frame>,
    serial_number: u64,
}

impl ChannelDriver {
    pub fn with_serial_number(mut self, serial_number: u64) -> Self {
        self.serial_number = serial_number;
        self
    }
}

impl DeviceDriver for ChannelDriver {
    fn open(&self, params: &DeviceParams) -> Result<Box<dyn DeviceSession>> {
        Ok(Box::new(ChannelSession {
            receiver: self.receiver.clone(),
            serial_number: self.serial_number,
            timeout: Duration::from_millis(params.receive_timeout_ms.max(1)),
            geometry_files: params.geometry_files.clone(),
        }))
    }
}

struct ChannelSession {
    receiver: Receiver<Frame>,
    serial_number: u64,
    timeout: Duration,
    geometry_files: Vec<PathBuf>,
}

impl DeviceSession for ChannelSession {
    fn receive(&mut self, frame: &mut Frame) -> Result<()> {
        match self.receiver.recv_timeout(self.timeout) {
            Ok(incoming) => {
                frame.clone_from(&incoming);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(TrackerError::ReceiveTimeout),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TrackerError::Receive("frame feed disconnected".to_string()))
            }
        }
    }

    fn status(&self) -> DeviceStatus {
        DeviceStatus {
            serial_number: self.serial_number,
            name: "channel".to_string(),
            geometry_files: self.geometry_files.clone(),
        }
    }
}
