//! Producer side of the frame pipeline.
//!
//! The acquisition thread owns the device session and the "next" frame. It
//! fills "next" without holding any lock, then takes the frame lock just long
//! enough to record the frame and swap it with "current".

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
};

use crate::{
    device::{DeviceDriver, DeviceParams, DeviceSession, Frame},
    motion::MotionConfigTable,
    record::Recorder,
    Result, TrackerError,
};

/// Whether the dispatcher may read frames yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotStarted,
    Connecting,
    Established,
    Failed,
}

/// Everything guarded by the frame lock.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) connection: ConnectionState,
    /// Most recently completed frame. `None` until the device is open.
    pub(crate) current: Option<Frame>,
    /// Frames swapped into `current` since the device opened.
    pub(crate) frames_acquired: u64,
    pub(crate) table: MotionConfigTable,
    pub(crate) recorder: Recorder,
    pub(crate) failure: Option<Arc<TrackerError>>,
}

impl SharedState {
    pub(crate) fn new(recorder: Recorder) -> Self {
        Self {
            connection: ConnectionState::NotStarted,
            current: None,
            frames_acquired: 0,
            table: MotionConfigTable::new(),
            recorder,
            failure: None,
        }
    }
}

pub(crate) type Shared = Arc<Mutex<SharedState>>;

pub(crate) fn lock_shared(shared: &Shared) -> Result<MutexGuard<'_, SharedState>> {
    shared
        .lock()
        .map_err(|_| TrackerError::Poisoned("frame access lock"))
}

pub(crate) struct AcquisitionLoop {
    driver: Box<dyn DeviceDriver>,
    params: DeviceParams,
    shared: Shared,
    stop: Arc<AtomicBool>,
}

impl AcquisitionLoop {
    pub(crate) fn new(
        driver: Box<dyn DeviceDriver>,
        params: DeviceParams,
        shared: Shared,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            driver,
            params,
            shared,
            stop,
        }
    }

    pub(crate) fn spawn(self) -> Result<JoinHandle<()>> {
        Ok(thread::Builder::new()
            .name("tracker-acquisition".to_string())
            .spawn(move || self.run())?)
    }

    fn run(self) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.acquire())) {
            self.capture(TrackerError::msg(format!(
                "acquisition thread panicked: {}",
                panic_message(payload.as_ref())
            )));
        }

        tracing::info!("acquisition stopped");
    }

    fn acquire(&self) {
        let (mut session, mut next) = match self.start() {
            Ok(started) => started,
            Err(err) => {
                self.capture(err);
                return;
            }
        };

        while !self.stop.load(Ordering::Acquire) {
            match session.receive(&mut next) {
                Ok(()) => {}
                Err(TrackerError::ReceiveTimeout) => continue,
                Err(err) => {
                    self.capture(err);
                    break;
                }
            }

            if let Err(err) = self.commit(&*session, &mut next) {
                tracing::error!(error = %err, "stopping acquisition");
                self.stop.store(true, Ordering::Release);
            }
        }
    }

    /// Opens the session and publishes an empty current frame.
    fn start(&self) -> Result<(Box<dyn DeviceSession>, Frame)> {
        // Opening may block on hardware, so it happens outside the lock.
        let session = self.driver.open(&self.params)?;
        let next = session.make_frame();

        let mut state = lock_shared(&self.shared)?;
        state.current = Some(session.make_frame());
        state.connection = ConnectionState::Established;
        drop(state);

        let status = session.status();
        tracing::info!(
            device = %status.name,
            serial = status.serial_number,
            geometry_files = ?status.geometry_files,
            "tracking device connected"
        );
        Ok((session, next))
    }

    /// Records `next` if enabled, then makes it the current frame.
    fn commit(&self, session: &dyn DeviceSession, next: &mut Frame) -> Result<()> {
        let mut state = lock_shared(&self.shared)?;

        if state.recorder.is_recording() {
            if let Err(err) = state.recorder.append(&session.status(), next) {
                tracing::warn!(error = %err, frame = next.frame_index, "dropped frame from recording");
            }
        }

        if let Some(current) = state.current.as_mut() {
            std::mem::swap(current, next);
            state.frames_acquired += 1;
        }
        Ok(())
    }

    fn capture(&self, err: TrackerError) {
        tracing::error!(error = %err, "acquisition failed");
        let mut state = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if state.failure.is_none() {
            state.failure = Some(Arc::new(err));
        }
        state.connection = ConnectionState::Failed;
        drop(state);
        // The failure is recorded, so the host can keep reading it.
        self.shared.clear_poison();
        self.stop.store(true, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::device::{channel_device, DeviceStatus, Marker};

    fn wait_for(shared: &Shared, condition: impl Fn(&SharedState) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            let state = lock_shared(shared).unwrap();
            if condition(&*state) {
                return true;
            }
            drop(state);
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn start(driver: Box<dyn DeviceDriver>) -> (Shared, Arc<AtomicBool>, JoinHandle<()>) {
        let shared = Arc::new(Mutex::new(SharedState::new(Recorder::default())));
        let stop = Arc::new(AtomicBool::new(false));
        let params = DeviceParams {
            receive_timeout_ms: 5,
            ..Default::default()
        };
        let handle = AcquisitionLoop::new(driver, params, Arc::clone(&shared), Arc::clone(&stop))
            .spawn()
            .unwrap();
        (shared, stop, handle)
    }

    #[test]
    fn publishes_received_frames_and_records_them() {
        let (feeder, driver) = channel_device(8);
        let (shared, stop, handle) = start(Box::new(driver));
        assert!(wait_for(&shared, |s| s.connection == ConnectionState::Established));

        lock_shared(&shared).unwrap().recorder.start();
        for index in 1..=3 {
            feeder.send(Frame::new(index, 0, vec![Marker::at(5, [0.0; 3])])).unwrap();
        }

        assert!(wait_for(&shared, |s| s.recorder.pending_messages() == 3));
        assert!(wait_for(&shared, |s| s.frames_acquired == 3));
        assert!(wait_for(&shared, |s| {
            s.current.as_ref().map(|f| f.frame_index) == Some(3)
        }));

        stop.store(true, Ordering::Release);
        handle.join().unwrap();
        assert!(lock_shared(&shared).unwrap().failure.is_none());
    }

    #[test]
    fn startup_failures_are_captured() {
        let driver = |_: &DeviceParams| -> Result<Box<dyn DeviceSession>> {
            Err(TrackerError::DeviceOpen("no device attached".to_string()))
        };
        let (shared, stop, handle) = start(Box::new(driver));
        handle.join().unwrap();

        let state = lock_shared(&shared).unwrap();
        assert_eq!(state.connection, ConnectionState::Failed);
        assert!(matches!(
            state.failure.as_deref(),
            Some(TrackerError::DeviceOpen(_))
        ));
        assert!(stop.load(Ordering::Acquire));
    }

    struct FailingSession {
        remaining: u32,
    }

    impl DeviceSession for FailingSession {
        fn receive(&mut self, frame: &mut Frame) -> Result<()> {
            if self.remaining == 0 {
                panic!("device driver fault");
            }
            self.remaining -= 1;
            frame.frame_index += 1;
            Ok(())
        }

        fn status(&self) -> DeviceStatus {
            DeviceStatus {
                serial_number: 9,
                name: "failing".to_string(),
                geometry_files: Vec::new(),
            }
        }
    }

    #[test]
    fn a_panicking_device_is_captured_as_a_failure() {
        let driver = |_: &DeviceParams| -> Result<Box<dyn DeviceSession>> {
            Ok(Box::new(FailingSession { remaining: 2 }))
        };
        let (shared, stop, handle) = start(Box::new(driver));
        handle.join().unwrap();

        let state = lock_shared(&shared).unwrap();
        assert_eq!(state.connection, ConnectionState::Failed);
        assert_eq!(state.frames_acquired, 2);
        let failure = state.failure.as_deref().map(ToString::to_string);
        assert!(failure.unwrap_or_default().contains("device driver fault"));
        assert!(stop.load(Ordering::Acquire));
    }

    #[test]
    fn a_closed_device_ends_acquisition() {
        let (feeder, driver) = channel_device(1);
        let (shared, _stop, handle) = start(Box::new(driver));
        assert!(wait_for(&shared, |s| s.connection == ConnectionState::Established));

        drop(feeder);
        handle.join().unwrap();

        let state = lock_shared(&shared).unwrap();
        assert_eq!(state.connection, ConnectionState::Failed);
        assert!(matches!(state.failure.as_deref(), Some(TrackerError::Receive(_))));
    }
}
