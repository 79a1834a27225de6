use std::collections::HashMap;

use crate::{pose::Transform, Result, TrackerError};

/// Integer handle the host uses to address one of its objects.
pub type ObjectHandle = i32;

/// Looks up host objects by name.
pub trait HandleResolver {
    fn resolve_name(&self, name: &str) -> Result<ObjectHandle>;
}

/// Receives the transforms computed by the dispatcher.
pub trait TargetSink {
    /// Sets the pose of `object` relative to `reference_frame`.
    fn set_transform(
        &mut self,
        object: ObjectHandle,
        reference_frame: ObjectHandle,
        transform: &Transform,
    ) -> Result<()>;
}

/// Everything the tracker needs from its host.
pub trait SceneHost: HandleResolver + TargetSink {}

impl<T: HandleResolver + TargetSink> SceneHost for T {}

/// A single `set_transform` call observed by [`InMemoryScene`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransform {
    pub object: ObjectHandle,
    pub reference_frame: ObjectHandle,
    pub transform: Transform,
}

/// Host stand-in with a fixed set of named objects.
///
/// Handles are assigned from 1 in registration order. Every applied transform
/// is kept so callers can inspect what the dispatcher did.
#[derive(Debug, Default)]
pub struct InMemoryScene {
    handles: HashMap<String, ObjectHandle>,
    names: Vec<String>,
    applied: Vec<AppliedTransform>,
}

impl InMemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scene = Self::new();
        for name in names {
            scene.register(name);
        }
        scene
    }

    /// Adds an object, returning its handle. Re-registering a name is a no-op.
    pub fn register(&mut self, name: impl Into<String>) -> ObjectHandle {
        let name = name.into();
        if let Some(&handle) = self.handles.get(&name) {
            return handle;
        }
        self.names.push(name.clone());
        let handle = self.names.len() as ObjectHandle;
        self.handles.insert(name, handle);
        handle
    }

    pub fn name_of(&self, handle: ObjectHandle) -> Option<&str> {
        usize::try_from(handle)
            .ok()
            .and_then(|h| h.checked_sub(1))
            .and_then(|index| self.names.get(index))
            .map(String::as_str)
    }

    pub fn applied(&self) -> &[AppliedTransform] {
        &self.applied
    }

    pub fn take_applied(&mut self) -> Vec<AppliedTransform> {
        std::mem::take(&mut self.applied)
    }

    /// Most recent transform applied to `object`, if any.
    pub fn latest_for(&self, object: ObjectHandle) -> Option<&AppliedTransform> {
        self.applied.iter().rev().find(|applied| applied.object == object)
    }
}

impl HandleResolver for InMemoryScene {
    fn resolve_name(&self, name: &str) -> Result<ObjectHandle> {
        self.handles
            .get(name)
            .copied()
            .ok_or_else(|| TrackerError::UnknownObject(name.to_string()))
    }
}

impl TargetSink for InMemoryScene {
    fn set_transform(
        &mut self,
        object: ObjectHandle,
        reference_frame: ObjectHandle,
        transform: &Transform,
    ) -> Result<()> {
        self.applied.push(AppliedTransform {
            object,
            reference_frame,
            transform: *transform,
        });
        Ok(())
    }
}
