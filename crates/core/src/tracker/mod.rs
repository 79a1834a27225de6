use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use crate::{
    acquisition::{lock_shared, AcquisitionLoop, ConnectionState, Shared, SharedState},
    device::DeviceDriver,
    dispatch::dispatch_frame,
    host::{ObjectHandle, SceneHost},
    motion::{GeometryRef, MotionConfigParams},
    pose::{MarkerPoseMapper, PoseMapper},
    record::{Recorder, SaveCallback, SaveReport, SaveWorkers},
    Result, TrackerError, TrackerParams,
};

/// Streams tracker poses into a host scene.
///
/// ```no_run
/// use tracker_bridge_core::{FusionTracker, InMemoryScene, SimulatedDriver, TrackerParams};
///
/// let params = TrackerParams::move_bone();
/// let scene = InMemoryScene::with_objects(params.object_names());
/// let mut tracker = FusionTracker::new(params, SimulatedDriver::new([55]), scene);
/// tracker.construct()?;
/// loop {
///     tracker.run_one()?;
/// #   break;
/// }
/// # Ok::<(), tracker_bridge_core::TrackerError>(())
/// ```
///
/// All methods are meant to be called from one host thread. Acquisition runs
/// on its own thread between [`construct`](Self::construct) and
/// [`destruct`](Self::destruct); each save runs on a short-lived thread of its
/// own.
pub struct FusionTracker<H: SceneHost, M: PoseMapper = MarkerPoseMapper> {
    params: TrackerParams,
    driver: Option<Box<dyn DeviceDriver>>,
    host: H,
    mapper: M,
    shared: Shared,
    stop: Arc<AtomicBool>,
    acquisition: Option<JoinHandle<()>>,
    saves: SaveWorkers,
    /// Set once every configured name resolved to a handle.
    tracker_base: Option<ObjectHandle>,
}

impl<H: SceneHost> FusionTracker<H> {
    pub fn new(params: TrackerParams, driver: impl DeviceDriver, host: H) -> Self {
        Self::with_mapper(params, driver, host, MarkerPoseMapper)
    }
}

impl<H: SceneHost, M: PoseMapper> FusionTracker<H, M> {
    pub fn with_mapper(params: TrackerParams, driver: impl DeviceDriver, host: H, mapper: M) -> Self {
        let recorder = Recorder::new(params.recording.clone());
        Self {
            params,
            driver: Some(Box::new(driver)),
            host,
            mapper,
            shared: Arc::new(Mutex::new(SharedState::new(recorder))),
            stop: Arc::new(AtomicBool::new(false)),
            acquisition: None,
            saves: SaveWorkers::new(),
            tracker_base: None,
        }
    }

    /// Called on the save thread with the outcome of every save.
    pub fn on_save_complete(&mut self, callback: impl Fn(&Result<SaveReport>) + Send + Sync + 'static) {
        let callback: SaveCallback = Arc::new(callback);
        self.saves.set_callback(callback);
    }

    /// Resolves configured host objects and starts acquisition.
    ///
    /// Device failures surface later through [`run_one`](Self::run_one); only
    /// handle resolution and thread creation fail here.
    pub fn construct(&mut self) -> Result<()> {
        if self.driver.is_none() {
            return Err(TrackerError::AlreadyConstructed);
        }

        let tracker_base = self.host.resolve_name(&self.params.optical_tracker_base)?;
        let resolved = self
            .params
            .motion_configs
            .iter()
            .map(|config| config.resolve(&self.host))
            .collect::<Result<Vec<_>>>()?;

        let driver = self.driver.take().ok_or(TrackerError::AlreadyConstructed)?;
        {
            let mut state = lock_shared(&self.shared)?;
            for (geometry_id, config) in resolved {
                state.table.insert(geometry_id, config);
            }
            state.connection = ConnectionState::Connecting;
        }
        self.tracker_base = Some(tracker_base);

        let acquisition = AcquisitionLoop::new(
            driver,
            self.params.device.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.stop),
        );
        self.acquisition = Some(acquisition.spawn()?);

        tracing::info!(
            tracker_base = %self.params.optical_tracker_base,
            geometries = self.params.motion_configs.len(),
            "tracker constructed"
        );
        Ok(())
    }

    /// Stops acquisition and waits for it and every outstanding save.
    pub fn destruct(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.acquisition.take() {
            if handle.join().is_err() {
                tracing::error!("acquisition thread panicked");
            }
        }

        let outcomes = self.saves.join_all();
        if !outcomes.is_empty() {
            let failed = outcomes.iter().filter(|outcome| outcome.is_err()).count();
            tracing::info!(saves = outcomes.len(), failed, "joined recording saves");
        }
    }

    /// Applies the latest frame to the host.
    ///
    /// Returns the number of transforms applied. Fails with
    /// [`TrackerError::AcquisitionFailed`] for good once acquisition has failed.
    pub fn run_one(&mut self) -> Result<usize> {
        let state = lock_shared(&self.shared)?;

        if let Some(failure) = &state.failure {
            return Err(TrackerError::AcquisitionFailed(Arc::clone(failure)));
        }
        let Some(tracker_base) = self.tracker_base else {
            return Ok(0);
        };
        if state.connection != ConnectionState::Established {
            return Ok(0);
        }
        let Some(frame) = state.current.as_ref() else {
            return Ok(0);
        };

        dispatch_frame(frame, &state.table, tracker_base, &self.mapper, &mut self.host)
    }

    /// True while the device is connected, handles are resolved and nothing
    /// has failed.
    pub fn is_active(&self) -> bool {
        if self.tracker_base.is_none() {
            return false;
        }
        lock_shared(&self.shared)
            .map(|state| state.failure.is_none() && state.connection == ConnectionState::Established)
            .unwrap_or(false)
    }

    pub fn is_recording(&self) -> bool {
        self.is_active()
            && lock_shared(&self.shared)
                .map(|state| state.recorder.is_recording())
                .unwrap_or(false)
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock_shared(&self.shared)
            .map(|state| state.connection)
            .unwrap_or(ConnectionState::Failed)
    }

    /// Tracks a geometry, replacing any config with the same geometry id.
    pub fn add_object(&mut self, config: &MotionConfigParams) -> Result<()> {
        let (geometry_id, resolved) = config.resolve(&self.host)?;
        let replaced = lock_shared(&self.shared)?.table.insert(geometry_id, resolved);
        tracing::debug!(geometry_id, replaced = replaced.is_some(), "added tracked object");
        Ok(())
    }

    /// Stops tracking every geometry. Device parameters are untouched.
    pub fn clear_objects(&mut self) -> Result<()> {
        lock_shared(&self.shared)?.table.clear();
        Ok(())
    }

    /// Stops tracking one geometry, given as an id or its text form.
    pub fn remove_geometry(&mut self, geometry: impl Into<GeometryRef>) -> Result<()> {
        let geometry_id = geometry.into().id()?;
        lock_shared(&self.shared)?.table.remove(geometry_id);
        Ok(())
    }

    pub fn start_recording(&self) -> Result<()> {
        lock_shared(&self.shared)?.recorder.start();
        Ok(())
    }

    pub fn stop_recording(&self) -> Result<()> {
        lock_shared(&self.shared)?.recorder.stop();
        Ok(())
    }

    /// Hands everything recorded so far to a background save and returns the
    /// path it will be written to. Recording carries on into a new buffer.
    ///
    /// An empty `filename` picks a timestamped name in the recording
    /// directory. The outcome of the save itself is only logged and passed to
    /// the [`on_save_complete`](Self::on_save_complete) callback.
    pub fn save_recording(&mut self, filename: &str) -> Result<PathBuf> {
        let (buffer, path) = {
            let mut state = lock_shared(&self.shared)?;
            let path = state.recorder.settings().resolve_path(filename);
            (state.recorder.take_buffer(), path)
        };

        tracing::info!(?path, messages = buffer.len(), "saving recording");
        self.saves.spawn(buffer, path.clone())?;
        Ok(path)
    }

    /// Discards everything recorded since the last save.
    pub fn clear_recording(&self) -> Result<()> {
        lock_shared(&self.shared)?.recorder.clear();
        Ok(())
    }

    /// Frames published by the acquisition thread so far.
    pub fn frames_acquired(&self) -> u64 {
        lock_shared(&self.shared)
            .map(|state| state.frames_acquired)
            .unwrap_or(0)
    }

    /// Messages recorded and not yet handed to a save.
    pub fn pending_recording_messages(&self) -> usize {
        lock_shared(&self.shared)
            .map(|state| state.recorder.pending_messages())
            .unwrap_or(0)
    }

    pub fn saves_in_flight(&self) -> usize {
        self.saves.in_flight()
    }

    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

impl<H: SceneHost, M: PoseMapper> Drop for FusionTracker<H, M> {
    fn drop(&mut self) {
        self.destruct();
    }
}
