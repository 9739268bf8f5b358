//! Error kinds for KMS discovery
//!
//! Whole-device failures (open, capability check, global catalog read) are
//! fatal. Everything else is scoped to a single connector and only causes
//! that connector to be skipped.

use std::io;

use super::types::{ConnectorId, CrtcId};

/// Errors raised while discovering and provisioning display pipelines
#[derive(Debug, thiserror::Error)]
pub enum ModesetError {
    #[error("DRM device {path} unavailable: {source}")]
    DeviceUnavailable {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read DRM resource catalog: {0}")]
    CatalogUnavailable(#[source] Box<ModesetError>),

    #[error("Failed to query {what}: {source}")]
    DeviceQuery {
        what: String,
        #[source]
        source: io::Error,
    },

    #[error("Connector {connector} unusable: {reason}")]
    ConnectorUnusable {
        connector: ConnectorId,
        reason: &'static str,
    },

    #[error("Cannot find suitable CRTC for connector {connector}")]
    NoSuitableCrtc { connector: ConnectorId },

    #[error("Buffer allocation failed ({stage}): {source}")]
    BufferAllocation {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("CRTC {0} is already claimed by another display")]
    DuplicateCrtc(CrtcId),

    #[error("Display on connector {0} was already released")]
    AlreadyReleased(ConnectorId),
}

pub type ModesetResult<T> = Result<T, ModesetError>;

impl ModesetError {
    pub fn unavailable(path: impl Into<String>, source: io::Error) -> Self {
        Self::DeviceUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Mark a failure of the global catalog read
    pub fn catalog(inner: ModesetError) -> Self {
        Self::CatalogUnavailable(Box::new(inner))
    }

    pub fn query(what: impl Into<String>, source: io::Error) -> Self {
        Self::DeviceQuery {
            what: what.into(),
            source,
        }
    }

    pub fn buffer(stage: &'static str, source: io::Error) -> Self {
        Self::BufferAllocation { stage, source }
    }

    /// Whether the whole device is unusable, as opposed to one connector
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DeviceUnavailable { .. } | Self::CatalogUnavailable(_)
        )
    }

    /// Underlying system error code, when the kernel reported one
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::DeviceUnavailable { source, .. }
            | Self::DeviceQuery { source, .. }
            | Self::BufferAllocation { source, .. } => source.raw_os_error(),
            Self::CatalogUnavailable(inner) => inner.raw_os_error(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_scoped_errors_are_not_fatal() {
        let err = ModesetError::query("connector 31", io::Error::from_raw_os_error(libc::ENODEV));
        assert_eq!(err.raw_os_error(), Some(libc::ENODEV));
        assert!(!err.is_fatal());

        let err = ModesetError::NoSuitableCrtc {
            connector: ConnectorId(40),
        };
        assert_eq!(err.raw_os_error(), None);
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Cannot find suitable CRTC for connector 40");
    }

    #[test]
    fn test_catalog_failure_is_fatal_and_keeps_errno() {
        let err = ModesetError::catalog(ModesetError::query(
            "resources",
            io::Error::from_raw_os_error(libc::ENODEV),
        ));
        assert!(err.is_fatal());
        assert_eq!(err.raw_os_error(), Some(libc::ENODEV));
        assert!(err.to_string().starts_with("Cannot read DRM resource catalog"));
    }

    #[test]
    fn test_open_failure_is_fatal() {
        let err =
            ModesetError::unavailable("/dev/dri/card0", io::Error::from_raw_os_error(libc::EACCES));
        assert!(err.is_fatal());
        assert_eq!(err.raw_os_error(), Some(libc::EACCES));
    }
}
