use serde::Serialize;
use thiserror::Error;

/// Classified HID failure, used to drive the retry/fix actions of the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HidErrorKind {
    /// A character or key has no scan-code mapping
    UnsupportedInput,
    /// The target character device does not exist
    DeviceMissing,
    /// Host unplugged or gadget disabled (ESHUTDOWN, ENODEV, ETIMEDOUT, ...)
    DeviceDisconnected,
    /// Ownership or SELinux label mismatch on the device node
    PermissionDenied,
    /// A single ConfigFS write/symlink/delete failed
    GadgetStepFailed,
    /// Privileged command execution is not available
    RootUnavailable,
    /// A device node did not appear in time
    Timeout,
    /// Any other I/O failure
    Io,
}

impl HidErrorKind {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedInput => "unsupported_input",
            Self::DeviceMissing => "device_missing",
            Self::DeviceDisconnected => "device_disconnected",
            Self::PermissionDenied => "permission_denied",
            Self::GadgetStepFailed => "gadget_step_failed",
            Self::RootUnavailable => "root_unavailable",
            Self::Timeout => "timeout",
            Self::Io => "io_error",
        }
    }
}

impl std::fmt::Display for HidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("HID error [{device}]: {reason} (code: {kind})")]
    Hid {
        device: String,
        reason: String,
        kind: HidErrorKind,
    },

    #[error("Gadget step failed: {0}")]
    GadgetStep(String),

    #[error("Root access unavailable: {0}")]
    RootUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Build a classified HID error for a device
    pub fn hid(device: impl Into<String>, reason: impl Into<String>, kind: HidErrorKind) -> Self {
        Self::Hid {
            device: device.into(),
            reason: reason.into(),
            kind,
        }
    }

    /// Classification of this error
    pub fn kind(&self) -> HidErrorKind {
        match self {
            Self::Hid { kind, .. } => *kind,
            Self::GadgetStep(_) => HidErrorKind::GadgetStepFailed,
            Self::RootUnavailable(_) => HidErrorKind::RootUnavailable,
            Self::Timeout(_) => HidErrorKind::Timeout,
            _ => HidErrorKind::Io,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        let e = AppError::hid("/dev/hidg0", "gone", HidErrorKind::DeviceMissing);
        assert_eq!(e.kind(), HidErrorKind::DeviceMissing);
        assert!(e.to_string().contains("device_missing"));

        assert_eq!(
            AppError::RootUnavailable("su".into()).kind(),
            HidErrorKind::RootUnavailable
        );
        assert_eq!(AppError::Timeout("x".into()).kind(), HidErrorKind::Timeout);
        assert_eq!(AppError::Internal("x".into()).kind(), HidErrorKind::Io);
    }
}
