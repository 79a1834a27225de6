use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    device::GeometryId,
    host::{HandleResolver, ObjectHandle},
    Result, TrackerError,
};

/// Which host object a tracked geometry drives, named as the host knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionConfigParams {
    pub object_to_move: String,
    pub frame_in_which_to_move_object: String,
    pub object_being_measured: String,
    /// Kept as text so preset files can carry it verbatim.
    pub geometry_id: String,
}

impl MotionConfigParams {
    pub fn new(
        object_to_move: impl Into<String>,
        frame_in_which_to_move_object: impl Into<String>,
        object_being_measured: impl Into<String>,
        geometry_id: impl Into<String>,
    ) -> Self {
        Self {
            object_to_move: object_to_move.into(),
            frame_in_which_to_move_object: frame_in_which_to_move_object.into(),
            object_being_measured: object_being_measured.into(),
            geometry_id: geometry_id.into(),
        }
    }

    /// Parses the geometry id and resolves the three object names.
    pub fn resolve<R>(&self, resolver: &R) -> Result<(GeometryId, MotionConfig)>
    where
        R: HandleResolver + ?Sized,
    {
        let geometry_id = parse_geometry_id(&self.geometry_id)?;
        let config = MotionConfig {
            object_to_move: resolver.resolve_name(&self.object_to_move)?,
            frame_in_which_to_move_object: resolver
                .resolve_name(&self.frame_in_which_to_move_object)?,
            object_being_measured: resolver.resolve_name(&self.object_being_measured)?,
        };
        Ok((geometry_id, config))
    }
}

/// [`MotionConfigParams`] with every name resolved to a host handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionConfig {
    pub object_to_move: ObjectHandle,
    pub frame_in_which_to_move_object: ObjectHandle,
    pub object_being_measured: ObjectHandle,
}

/// Geometry id given either natively or as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryRef {
    Id(GeometryId),
    Text(String),
}

impl GeometryRef {
    pub fn id(&self) -> Result<GeometryId> {
        match self {
            Self::Id(id) => Ok(*id),
            Self::Text(text) => parse_geometry_id(text),
        }
    }
}

impl From<GeometryId> for GeometryRef {
    fn from(value: GeometryId) -> Self {
        Self::Id(value)
    }
}

impl From<&str> for GeometryRef {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for GeometryRef {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

pub fn parse_geometry_id(text: &str) -> Result<GeometryId> {
    text.parse::<GeometryId>()
        .map_err(|source| TrackerError::InvalidGeometryId {
            text: text.to_string(),
            source,
        })
}

/// Geometry id to motion config lookup. One entry per geometry.
#[derive(Debug, Clone, Default)]
pub struct MotionConfigTable {
    entries: BTreeMap<GeometryId, MotionConfig>,
}

impl MotionConfigTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `config`, returning the entry it replaced.
    pub fn insert(&mut self, geometry_id: GeometryId, config: MotionConfig) -> Option<MotionConfig> {
        self.entries.insert(geometry_id, config)
    }

    pub fn remove(&mut self, geometry_id: GeometryId) -> Option<MotionConfig> {
        self.entries.remove(&geometry_id)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, geometry_id: GeometryId) -> Option<&MotionConfig> {
        self.entries.get(&geometry_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
