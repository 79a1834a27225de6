use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    device::DeviceParams, motion::MotionConfigParams, record::RecordingSettings, Result,
    TrackerError,
};

/// Name of the tracker base object in the built-in presets.
pub const DEFAULT_TRACKER_BASE: &str = "OpticalTrackerBase#0";

/// Names accepted by [`TrackerParams::preset`].
pub const PRESET_NAMES: [&str; 3] = ["empty", "move-tracker", "move-bone"];

/// Top-level configuration structure for a tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerParams {
    #[serde(default)]
    pub device: DeviceParams,
    /// Host object the device measures from.
    pub optical_tracker_base: String,
    #[serde(default)]
    pub motion_configs: Vec<MotionConfigParams>,
    #[serde(default)]
    pub recording: RecordingSettings,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self::move_bone()
    }
}

impl TrackerParams {
    /// No tracked objects; geometries can be added later.
    pub fn empty_defaults() -> Self {
        Self {
            device: DeviceParams::default(),
            optical_tracker_base: DEFAULT_TRACKER_BASE.to_string(),
            motion_configs: Vec::new(),
            recording: RecordingSettings::default(),
        }
    }

    /// Moves fiducial 22 within the tracker base frame.
    pub fn move_tracker() -> Self {
        Self {
            device: with_geometry("geometry022.ini"),
            motion_configs: vec![MotionConfigParams::new(
                "Fiducial#22",
                DEFAULT_TRACKER_BASE,
                "Fiducial#22",
                "22",
            )],
            ..Self::empty_defaults()
        }
    }

    /// Moves the tracker base within the frame of fiducial 55, which stays put.
    pub fn move_bone() -> Self {
        Self {
            device: with_geometry("geometry055.ini"),
            motion_configs: vec![MotionConfigParams::new(
                DEFAULT_TRACKER_BASE,
                "Fiducial#55",
                "Fiducial#55",
                "55",
            )],
            ..Self::empty_defaults()
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "empty" => Some(Self::empty_defaults()),
            "move-tracker" => Some(Self::move_tracker()),
            "move-bone" => Some(Self::move_bone()),
            _ => None,
        }
    }

    /// Every host object name these params refer to, base first.
    pub fn object_names(&self) -> Vec<&str> {
        let mut names = vec![self.optical_tracker_base.as_str()];
        for config in &self.motion_configs {
            for name in [
                config.object_to_move.as_str(),
                config.frame_in_which_to_move_object.as_str(),
                config.object_being_measured.as_str(),
            ] {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

fn with_geometry(file: &str) -> DeviceParams {
    DeviceParams {
        geometry_files: vec![file.into()],
        ..DeviceParams::default()
    }
}

/// Named presets, as stored in a JSON configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresetFile {
    pub presets: BTreeMap<String, TrackerParams>,
}

impl PresetFile {
    pub fn builtin() -> Self {
        let presets = PRESET_NAMES
            .iter()
            .filter_map(|&name| TrackerParams::preset(name).map(|p| (name.to_string(), p)))
            .collect();
        Self { presets }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn get(&self, name: &str) -> Result<&TrackerParams> {
        self.presets
            .get(name)
            .ok_or_else(|| TrackerError::msg(format!("unknown preset `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_move_bone() {
        let params = TrackerParams::default();
        assert_eq!(params.motion_configs.len(), 1);
        assert_eq!(params.motion_configs[0].object_to_move, DEFAULT_TRACKER_BASE);
        assert_eq!(params.motion_configs[0].geometry_id, "55");
    }

    #[test]
    fn object_names_are_unique_and_start_with_base() {
        let params = TrackerParams::move_bone();
        let names = params.object_names();
        assert_eq!(names, vec![DEFAULT_TRACKER_BASE, "Fiducial#55"]);
    }

    #[test]
    fn preset_files_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        let builtin = PresetFile::builtin();
        std::fs::write(&path, serde_json::to_string_pretty(&builtin).unwrap()).unwrap();

        let loaded = PresetFile::load(&path).unwrap();
        assert_eq!(loaded, builtin);
        assert!(loaded.get("move-tracker").is_ok());
        assert!(loaded.get("missing").is_err());
    }

    #[test]
    fn minimal_preset_uses_defaults() {
        let params: TrackerParams =
            serde_json::from_str(r#"{ "optical_tracker_base": "Base#1" }"#).unwrap();
        assert!(params.motion_configs.is_empty());
        assert_eq!(params.device, DeviceParams::default());
    }
}
