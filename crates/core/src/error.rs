use std::{num::ParseIntError, sync::Arc};

/// Result alias that carries the custom [`TrackerError`] type.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Free-form failure raised by collaborators that have no better variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The device session could not be opened.
    #[error("failed to open tracking device: {0}")]
    DeviceOpen(String),
    /// The device session failed while reading a frame.
    #[error("failed to receive frame from tracking device: {0}")]
    Receive(String),
    /// No frame arrived within the device timeout. Not fatal to acquisition.
    #[error("timed out waiting for a frame from the tracking device")]
    ReceiveTimeout,
    /// The host does not know an object by this name.
    #[error("unknown host object `{0}`")]
    UnknownObject(String),
    /// A geometry id given as text did not parse as an integer.
    #[error("invalid geometry id `{text}`: {source}")]
    InvalidGeometryId {
        text: String,
        #[source]
        source: ParseIntError,
    },
    /// Only moving the tracked object within the tracker base, or moving the
    /// tracker base within the tracked object, is supported.
    #[error(
        "geometry {geometry_id}: moving objects other than those being measured and the \
         tracker base itself is not supported"
    )]
    UnsupportedConfiguration { geometry_id: u32 },
    /// Failure captured on the acquisition thread, re-raised to the caller.
    #[error("acquisition thread failed: {0}")]
    AcquisitionFailed(#[source] Arc<TrackerError>),
    /// Pose message (de)serialization failure.
    #[error("pose message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The log container is malformed or failed its integrity check.
    #[error("invalid log container: {0}")]
    Container(String),
    /// A lock was poisoned by a panicking thread.
    #[error("{0} has been poisoned")]
    Poisoned(&'static str),
    /// `construct()` was called on a tracker that already ran.
    #[error("tracker has already been constructed")]
    AlreadyConstructed,
}

impl TrackerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn container<T: Into<String>>(msg: T) -> Self {
        Self::Container(msg.into())
    }
}

impl From<&str> for TrackerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for TrackerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
