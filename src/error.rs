//! Crate-wide error type.
//!
//! Every fallible public operation returns [`Result<T>`], a thin alias over
//! [`Error`]. Transport failures convert in via `#[from] io::Error` so the
//! line discipline and REPL engine can keep using `?` without manual mapping.

use std::path::PathBuf;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong driving a device over the link.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The byte stream is broken or could not be opened. Not recoverable for
    /// the current session; the caller may retry by reconnecting.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A deadline expired waiting for an expected delimiter.
    #[error("timed out waiting for {expected}")]
    ProtocolTimeout {
        /// What the engine was waiting for (a prompt, a banner, a `Ctrl-D`).
        expected: &'static str,
    },

    /// Bytes read from the device did not match any expected banner, even
    /// after the bounded resync retries.
    #[error("lost sync with device: {detail}")]
    ProtocolDesync {
        /// Free-form diagnostic, not matched on by callers.
        detail: String,
    },

    /// The device raised while executing a host-submitted code unit.
    #[error("command failed: {cmd}")]
    CmdError {
        /// The code unit that was submitted.
        cmd: String,
        /// Whatever stdout had been produced before the exception.
        partial_stdout: Vec<u8>,
        /// The raw stderr text (a Python traceback, verbatim).
        stderr_text: String,
    },

    /// `path` does not exist on the device.
    #[error("path not found: {path}")]
    PathNotFound {
        /// The device-side path that was missing.
        path: String,
    },

    /// `path` does not exist, or is a directory, where a file was expected.
    #[error("file not found: {path}")]
    FileNotFound {
        /// The device-side path that was missing.
        path: String,
    },

    /// `path` does not exist, or is a file, where a directory was expected.
    #[error("directory not found: {path}")]
    DirNotFound {
        /// The device-side path that was missing.
        path: String,
    },

    /// A mutating request against a read-only mount, or a path that resolved
    /// outside the mount's local root.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path (device-side or host-side, depending on caller) that was rejected.
        path: PathBuf,
    },

    /// The caller forced compression but the device lacks `deflate`.
    #[error("compression unavailable on this device")]
    CompressionUnavailable,

    /// The request needs a device feature that is not present.
    #[error("capability unavailable: {feature}")]
    CapabilityUnavailable {
        /// Name of the missing capability, e.g. `"raw-paste"`.
        feature: &'static str,
    },

    /// A session-configuration value was out of the recognised set.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn desync(detail: impl Into<String>) -> Self {
        Error::ProtocolDesync {
            detail: detail.into(),
        }
    }
}
