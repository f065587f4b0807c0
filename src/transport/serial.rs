//! Serial (UART / USB-CDC) transport.

use super::Transport;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Baud rates the session builder recognises. Any other value is rejected at
/// build time rather than silently passed through to the OS driver.
pub const RECOGNISED_BAUD_RATES: [u32; 8] = [
    9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// The default serial bit rate, 115200 8-N-1.
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// A serial link to the device, opened 8-N-1 at a recognised baud rate.
///
/// Bytes are never translated in transit: no CR/LF mapping, no XON/XOFF
/// interpretation. `set_dtr`/`set_rts` expose the control lines some boards
/// use to force a bootloader-select or reset line before entering raw REPL.
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    inner: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate`.
    pub fn open(port_name: &str, baud_rate: u32) -> io::Result<Self> {
        let inner = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(to_io_error)?;
        Ok(SerialTransport {
            port_name: port_name.to_string(),
            baud_rate,
            inner,
        })
    }
}

fn to_io_error(err: serialport::Error) -> io::Error {
    match err.kind {
        serialport::ErrorKind::NoDevice => {
            io::Error::new(io::ErrorKind::NotFound, err.description)
        }
        serialport::ErrorKind::InvalidInput => {
            io::Error::new(io::ErrorKind::InvalidInput, err.description)
        }
        serialport::ErrorKind::Io(kind) => io::Error::new(kind, err.description),
        serialport::ErrorKind::Unknown => io::Error::other(err.description),
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
        self.inner.set_timeout(timeout).ok();
        let mut buf = [0u8; 4096];
        match self.inner.read(&mut buf) {
            Ok(0) => Ok(Vec::new()),
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.inner.write_all(buf)?;
        self.inner.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        // `serialport` closes the handle on drop; nothing eager to release.
        Ok(())
    }

    fn set_dtr(&mut self, on: bool) -> io::Result<()> {
        self.inner.write_data_terminal_ready(on).map_err(to_io_error)
    }

    fn set_rts(&mut self, on: bool) -> io::Result<()> {
        self.inner.write_request_to_send(on).map_err(to_io_error)
    }

    fn reconnect(&mut self, timeout: Duration) -> io::Result<()> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            match SerialTransport::open(&self.port_name, self.baud_rate) {
                Ok(reopened) => {
                    self.inner = reopened.inner;
                    return Ok(());
                }
                Err(e) if std::time::Instant::now() >= deadline => return Err(e),
                Err(_) => std::thread::sleep(Duration::from_millis(100)),
            }
        }
    }
}
