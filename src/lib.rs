/*!
# boardlink

Host-side driver for a microcontroller running a small interactive
interpreter over a byte-oriented link (serial UART/USB-CDC, or a TCP tunnel
exposing the same byte stream): enter/exit its raw REPL, submit code units
and capture their output, transfer files with hashing and optional
compression, and mount a host directory so the device can import files from
it on demand.

```no_run
use boardlink::config::SessionBuilder;
use boardlink::session::Session;

let config = SessionBuilder::new().serial("/dev/ttyACM0", 115200).build()?;
let mut session = Session::open(config)?;
let entries = session.ls("/")?;
# Ok::<(), boardlink::Error>(())
```
*/

pub mod commands;
pub mod config;
pub mod error;
pub mod line;
pub mod mount;
pub mod probe;
pub mod repl;
pub mod session;
pub mod transfer;
pub mod transport;

pub use config::{SessionBuilder, SessionConfig};
pub use error::{Error, Result};
pub use session::Session;
