/*!
# Session Configuration

This module provides the [`SessionBuilder`] struct for assembling a
[`SessionConfig`] before opening a [`crate::session::Session`], generalizing
the teacher crate's device-configuration builder pattern to the "Recognised
session configuration" table.

## Basic usage

```no_run
use boardlink::config::SessionBuilder;

let config = SessionBuilder::new()
    .serial("/dev/ttyACM0", 115200)
    .timeout(std::time::Duration::from_secs(10))
    .force(false)
    .build()?;
# Ok::<(), boardlink::Error>(())
```
*/

use crate::error::{Error, Result};
use crate::transport::serial::{DEFAULT_BAUD_RATE, RECOGNISED_BAUD_RATES};
use crate::transport::tcp::DEFAULT_PORT;
use std::time::Duration;

/// Where the session's transport should be opened.
#[derive(Clone, Debug)]
pub enum Endpoint {
    /// A serial port at `path`, baud `baud_rate`.
    Serial { path: String, baud_rate: u32 },
    /// A TCP tunnel at `address` (`host:port`).
    Tcp { address: String },
}

/// Tri-state compression policy: force on, force off, or auto-decide from
/// the device's platform probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressPolicy {
    #[default]
    Auto,
    ForceOn,
    ForceOff,
}

impl CompressPolicy {
    pub(crate) fn resolved(self) -> Option<bool> {
        match self {
            CompressPolicy::Auto => None,
            CompressPolicy::ForceOn => Some(true),
            CompressPolicy::ForceOff => Some(false),
        }
    }
}

/// Resolved, validated session configuration. Immutable once built.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub chunk_size: Option<usize>,
    pub compress: CompressPolicy,
    pub force: bool,
    pub exec_timeout: Duration,
    pub reconnect_timeout: Duration,
}

/// Builds a [`SessionConfig`], matching the teacher crate's builder style:
/// every setter takes and returns `Self` by value.
#[derive(Clone, Debug, Default)]
pub struct SessionBuilder {
    endpoint: Option<Endpoint>,
    chunk_size: Option<usize>,
    compress: CompressPolicy,
    force: bool,
    exec_timeout: Option<Duration>,
    reconnect_timeout: Option<Duration>,
}

impl SessionBuilder {
    /// Start with nothing configured.
    pub fn new() -> Self {
        SessionBuilder::default()
    }

    /// Use a serial port at `path`, `baud_rate` bit rate.
    pub fn serial(mut self, path: impl Into<String>, baud_rate: u32) -> Self {
        self.endpoint = Some(Endpoint::Serial {
            path: path.into(),
            baud_rate,
        });
        self
    }

    /// Use a TCP tunnel at `address` (`host:port`; if no port is given,
    /// [`DEFAULT_PORT`] is appended).
    pub fn tcp(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        let address = if address.contains(':') {
            address
        } else {
            format!("{address}:{DEFAULT_PORT}")
        };
        self.endpoint = Some(Endpoint::Tcp { address });
        self
    }

    /// Override chunk-size auto-sizing in the transfer pipeline.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Force on/off, or leave on auto (the default).
    pub fn compress(mut self, policy: CompressPolicy) -> Self {
        self.compress = policy;
        self
    }

    /// Bypass the transfer pipeline's skip-unchanged phase.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Per-code-unit deadline used unless a caller overrides it for one call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = Some(timeout);
        self
    }

    /// How long `machine_reset` waits for the device to reconnect.
    pub fn reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = Some(timeout);
        self
    }

    /// Validate and produce the final configuration.
    pub fn build(self) -> Result<SessionConfig> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::InvalidConfig("no port or address configured".into()))?;
        if let Endpoint::Serial { baud_rate, .. } = &endpoint {
            if !RECOGNISED_BAUD_RATES.contains(baud_rate) {
                return Err(Error::InvalidConfig(format!(
                    "baud rate {baud_rate} is not in the recognised set {RECOGNISED_BAUD_RATES:?}"
                )));
            }
        }
        if let Some(size) = self.chunk_size {
            if size == 0 {
                return Err(Error::InvalidConfig("chunk_size must be nonzero".into()));
            }
        }
        Ok(SessionConfig {
            endpoint,
            chunk_size: self.chunk_size,
            compress: self.compress,
            force: self.force,
            exec_timeout: self.exec_timeout.unwrap_or(Duration::from_secs(10)),
            reconnect_timeout: self.reconnect_timeout.unwrap_or(Duration::from_secs(15)),
        })
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Serial {
            path: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}
