//! Error taxonomy shared by the player, controller and control surface.

use thiserror::Error;

/// Everything the core can fail with.
///
/// `InvalidArgument`, `ResourceNotFound`, `UnsupportedFormat` and
/// `DeviceUnavailable` are configuration errors: they surface synchronously
/// and are never retried here. `NotReady` is a sequencing error and only
/// fails the operation that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FalcoError {
    #[error("{0} called before the instance is started up; make sure to call startup()")]
    NotReady(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("'{0}' not found")]
    ResourceNotFound(String),

    #[error("unsupported format for '{name}': {reason}")]
    UnsupportedFormat { name: String, reason: String },

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl FalcoError {
    /// Stable machine-readable name, used by transports.
    pub fn kind(&self) -> &'static str {
        match self {
            FalcoError::NotReady(_) => "not_ready",
            FalcoError::InvalidArgument(_) => "invalid_argument",
            FalcoError::ResourceNotFound(_) => "resource_not_found",
            FalcoError::UnsupportedFormat { .. } => "unsupported_format",
            FalcoError::DeviceUnavailable(_) => "device_unavailable",
        }
    }
}

pub type Result<T, E = FalcoError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_message_names_the_operation() {
        let err = FalcoError::NotReady("moved()");
        assert_eq!(
            err.to_string(),
            "moved() called before the instance is started up; make sure to call startup()"
        );
        assert_eq!(err.kind(), "not_ready");
    }
}
