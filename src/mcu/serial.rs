use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};

use super::McuLink;
use crate::error::{ConnectionError, Result};

/// Serial port link to the MCU.
///
/// The port handle is dropped as soon as the OS reports the device gone, after
/// which every operation fails with `NotOpen` until the process restarts.
pub struct SerialLink {
    path: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialLink {
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| ConnectionError::Open {
                port: path.to_string(),
                reason: e.to_string(),
            })?;
        log::info!(
            "opened serial port {} at {} baud (timeout {:.1}s)",
            path,
            baud_rate,
            timeout.as_secs_f64()
        );
        Ok(Self {
            path: path.to_string(),
            port: Some(port),
        })
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port is closed"))
    }

    fn check<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if is_disconnect(e) {
                log::error!("serial port {} disconnected: {}", self.path, e);
                self.port = None;
            }
        }
        result
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.port().and_then(|port| port.read(buf));
        self.check(result)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.port().and_then(|port| port.write(buf));
        self.check(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.port().and_then(|port| port.flush());
        self.check(result)
    }
}

impl McuLink for SerialLink {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let result = self
            .port()
            .and_then(|port| port.clear(ClearBuffer::Input).map_err(io::Error::from));
        self.check(result)
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if self.port.take().is_some() {
            log::info!("released serial port {}", self.path);
        }
    }
}
