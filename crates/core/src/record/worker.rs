use std::{
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
};

use super::{write_verified, RecordingBuffer};
use crate::Result;

/// Outcome of a successful save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub path: PathBuf,
    pub messages: usize,
    pub bytes: usize,
}

/// Invoked on the save thread once a save finishes, successfully or not.
pub type SaveCallback = Arc<dyn Fn(&Result<SaveReport>) + Send + Sync>;

/// Background saves that have been started but not yet joined.
#[derive(Default)]
pub struct SaveWorkers {
    in_flight: Vec<JoinHandle<Result<SaveReport>>>,
    on_complete: Option<SaveCallback>,
}

impl SaveWorkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_callback(&mut self, callback: SaveCallback) {
        self.on_complete = Some(callback);
    }

    /// Serializes, verifies and writes `buffer` to `path` on a new thread.
    ///
    /// Errors from the save itself never come back through this call; only a
    /// failure to start the thread does.
    pub fn spawn(&mut self, buffer: RecordingBuffer, path: PathBuf) -> Result<()> {
        self.reap_finished();

        let on_complete = self.on_complete.clone();
        let handle = thread::Builder::new()
            .name("recording-save".to_string())
            .spawn(move || {
                let outcome = save(buffer, path);
                match &outcome {
                    Ok(report) => tracing::info!(
                        path = ?report.path,
                        messages = report.messages,
                        bytes = report.bytes,
                        "recording saved"
                    ),
                    Err(err) => tracing::error!(error = %err, "failed to save recording"),
                }
                if let Some(callback) = on_complete {
                    callback(&outcome);
                }
                outcome
            })?;

        self.in_flight.push(handle);
        Ok(())
    }

    /// Joins saves that have already finished.
    pub fn reap_finished(&mut self) -> usize {
        let (done, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.in_flight = running;
        let reaped = done.len();
        for handle in done {
            join(handle);
        }
        reaped
    }

    /// Blocks until every outstanding save has finished.
    pub fn join_all(&mut self) -> Vec<Result<SaveReport>> {
        self.in_flight.drain(..).filter_map(join).collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl std::fmt::Debug for SaveWorkers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveWorkers")
            .field("in_flight", &self.in_flight.len())
            .field("has_callback", &self.on_complete.is_some())
            .finish()
    }
}

fn save(buffer: RecordingBuffer, path: PathBuf) -> Result<SaveReport> {
    tracing::debug!(?path, messages = buffer.len(), "finalizing recording");
    let bytes = buffer.finish();
    let messages = write_verified(&path, &bytes)?;
    Ok(SaveReport {
        path,
        messages,
        bytes: bytes.len(),
    })
}

fn join(handle: JoinHandle<Result<SaveReport>>) -> Option<Result<SaveReport>> {
    match handle.join() {
        Ok(outcome) => Some(outcome),
        Err(_) => {
            tracing::error!("recording save thread panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        device::{DeviceStatus, Frame, Marker},
        record::{read_log_file, PoseMessage},
    };

    fn buffer(count: u64) -> RecordingBuffer {
        let status = DeviceStatus {
            serial_number: 1,
            name: "test".to_string(),
            geometry_files: Vec::new(),
        };
        let mut buffer = RecordingBuffer::new();
        for index in 0..count {
            let frame = Frame::new(index, 0, vec![Marker::at(55, [0.0; 3])]);
            buffer.append(&PoseMessage::from_frame(&status, &frame)).unwrap();
        }
        buffer
    }

    #[test]
    fn join_all_waits_for_every_save() {
        let dir = tempfile::tempdir().unwrap();
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);
        let mut workers = SaveWorkers::new();
        workers.set_callback(Arc::new(move |outcome: &Result<SaveReport>| {
            assert!(outcome.is_ok());
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for index in 0..3u64 {
            let path = dir.path().join(format!("save-{index}.flik"));
            workers.spawn(buffer(index + 1), path).unwrap();
        }
        let outcomes = workers.join_all();

        assert_eq!(completed.load(Ordering::SeqCst), 3);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(workers.in_flight(), 0);
        let messages = read_log_file(dir.path().join("save-2.flik")).unwrap();
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn failed_saves_are_reported_only_through_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let mut workers = SaveWorkers::new();

        workers
            .spawn(buffer(1), blocker.join("x.flik"))
            .expect("starting the save succeeds");

        let outcomes = workers.join_all();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_err());
    }
}
