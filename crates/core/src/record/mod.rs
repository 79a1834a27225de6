//! In-memory recording of acquired frames and their persistence to disk.

mod container;
mod worker;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    device::{DeviceStatus, Frame, GeometryId, Marker},
    Result, TrackerError,
};

pub use container::{read_log_file, LogReader, LOG_MAGIC, LOG_VERSION};
pub use worker::{SaveCallback, SaveReport, SaveWorkers};

/// Extension appended to generated recording file names.
pub const RECORDING_EXTENSION: &str = "flik";

/// Configuration options for the recording subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory relative file names are saved into.
    pub output_dir: PathBuf,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl RecordingSettings {
    /// Where a save named `filename` ends up. An empty name gets a timestamped
    /// default.
    pub fn resolve_path(&self, filename: &str) -> PathBuf {
        if filename.is_empty() {
            self.output_dir.join(default_filename())
        } else {
            self.output_dir.join(filename)
        }
    }
}

/// `2024_03_01_14_05_09_FusionTrack.flik`, in local time.
pub fn default_filename() -> String {
    format!(
        "{}_FusionTrack.{RECORDING_EXTENSION}",
        chrono::Local::now().format("%Y_%m_%d_%H_%M_%S")
    )
}

/// One recorded marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub geometry_id: GeometryId,
    pub translation_mm: [f64; 3],
    pub rotation: [[f64; 3]; 3],
    pub registration_error_mm: f64,
}

impl From<&Marker> for MarkerRecord {
    fn from(marker: &Marker) -> Self {
        Self {
            geometry_id: marker.geometry_id,
            translation_mm: marker.translation_mm,
            rotation: marker.rotation,
            registration_error_mm: marker.registration_error_mm,
        }
    }
}

impl From<&MarkerRecord> for Marker {
    fn from(record: &MarkerRecord) -> Self {
        Self {
            geometry_id: record.geometry_id,
            translation_mm: record.translation_mm,
            rotation: record.rotation,
            registration_error_mm: record.registration_error_mm,
        }
    }
}

/// One timestamped frame as stored in a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseMessage {
    /// Host wall clock, microseconds since the Unix epoch.
    pub host_time_us: i64,
    pub device_time_us: u64,
    pub frame_index: u64,
    pub serial_number: u64,
    pub markers: Vec<MarkerRecord>,
}

impl PoseMessage {
    pub fn from_frame(status: &DeviceStatus, frame: &Frame) -> Self {
        Self {
            host_time_us: chrono::Utc::now().timestamp_micros(),
            device_time_us: frame.timestamp_us,
            frame_index: frame.frame_index,
            serial_number: status.serial_number,
            markers: frame.markers.iter().map(MarkerRecord::from).collect(),
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame {
            frame_index: self.frame_index,
            timestamp_us: self.device_time_us,
            markers: self.markers.iter().map(Marker::from).collect(),
        }
    }
}

/// Location of one encoded message inside a buffer's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MessageSpan {
    pub(crate) offset: u32,
    pub(crate) len: u32,
}

/// Appendable log of encoded pose messages awaiting a save.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    payload: Vec<u8>,
    spans: Vec<MessageSpan>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: &PoseMessage) -> Result<()> {
        let start = self.payload.len();
        let offset = u32::try_from(start)
            .map_err(|_| TrackerError::container("recording buffer is full"))?;

        if let Err(err) = serde_json::to_writer(&mut self.payload, message) {
            self.payload.truncate(start);
            return Err(err.into());
        }

        let Ok(len) = u32::try_from(self.payload.len() - start) else {
            self.payload.truncate(start);
            return Err(TrackerError::container("pose message is too large"));
        };
        self.spans.push(MessageSpan { offset, len });
        Ok(())
    }

    /// Number of messages appended so far.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Encodes the buffer as a finalized, checksummed log container.
    pub fn finish(self) -> Vec<u8> {
        container::finish(&self.payload, &self.spans)
    }
}

/// Recording state machine guarded by the tracker's frame lock.
#[derive(Debug, Default)]
pub struct Recorder {
    settings: RecordingSettings,
    is_recording: bool,
    buffer: Option<RecordingBuffer>,
}

impl Recorder {
    pub fn new(settings: RecordingSettings) -> Self {
        Self {
            settings,
            is_recording: false,
            buffer: None,
        }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.settings
    }

    pub fn start(&mut self) {
        self.is_recording = true;
    }

    pub fn stop(&mut self) {
        self.is_recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Appends `frame`, creating the buffer if a save or clear removed it.
    pub fn append(&mut self, status: &DeviceStatus, frame: &Frame) -> Result<()> {
        self.buffer
            .get_or_insert_with(RecordingBuffer::new)
            .append(&PoseMessage::from_frame(status, frame))
    }

    /// Detaches the current buffer so recording can continue into a new one.
    pub fn take_buffer(&mut self) -> RecordingBuffer {
        self.buffer.take().unwrap_or_default()
    }

    /// Drops everything recorded since the last save.
    pub fn clear(&mut self) {
        self.buffer = None;
    }

    pub fn pending_messages(&self) -> usize {
        self.buffer.as_ref().map_or(0, RecordingBuffer::len)
    }
}

/// Verifies `bytes` and writes them to `path`, creating parent directories.
pub(crate) fn write_verified(path: &Path, bytes: &[u8]) -> Result<usize> {
    let messages = LogReader::new(bytes)?.len();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> DeviceStatus {
        DeviceStatus {
            serial_number: 42,
            name: "test".to_string(),
            geometry_files: Vec::new(),
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::new(index, index * 1000, vec![Marker::at(55, [1.0, 2.0, 3.0])])
    }

    #[test]
    fn recorder_flags_are_idempotent() {
        let mut recorder = Recorder::default();
        recorder.start();
        recorder.start();
        assert!(recorder.is_recording());
        recorder.stop();
        recorder.stop();
        assert!(!recorder.is_recording());
    }

    #[test]
    fn taking_the_buffer_starts_a_fresh_one() {
        let mut recorder = Recorder::default();
        recorder.append(&status(), &frame(0)).unwrap();
        recorder.append(&status(), &frame(1)).unwrap();

        let taken = recorder.take_buffer();
        assert_eq!(taken.len(), 2);
        assert_eq!(recorder.pending_messages(), 0);

        recorder.append(&status(), &frame(2)).unwrap();
        assert_eq!(recorder.pending_messages(), 1);
    }

    #[test]
    fn clearing_discards_pending_messages() {
        let mut recorder = Recorder::default();
        recorder.append(&status(), &frame(0)).unwrap();
        recorder.clear();

        assert_eq!(recorder.pending_messages(), 0);
        assert!(recorder.take_buffer().is_empty());
    }

    #[test]
    fn messages_round_trip_to_frames() {
        let original = frame(3);
        let message = PoseMessage::from_frame(&status(), &original);

        assert_eq!(message.serial_number, 42);
        assert_eq!(message.to_frame(), original);
    }

    #[test]
    fn empty_filenames_get_a_timestamped_default() {
        let settings = RecordingSettings {
            output_dir: PathBuf::from("logs"),
        };

        let path = settings.resolve_path("");
        assert!(path.starts_with("logs"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_FusionTrack.flik"));

        assert_eq!(settings.resolve_path("x.log"), PathBuf::from("logs/x.log"));
    }
}
