use std::io;
use std::time::Duration;

use log::{debug, info};

use crate::error::{LinkError, Result};

use super::Transport;

/// Default serial port settings.
const DATA_BITS: serialport::DataBits = serialport::DataBits::Eight;
const STOP_BITS: serialport::StopBits = serialport::StopBits::One;
const PARITY: serialport::Parity = serialport::Parity::None;

/// A transport backed by a native serial port.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }

    /// Discard anything sitting in the OS buffers.
    pub fn clear(&self) -> Result<()> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(LinkError::Serial)
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.port)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.port, buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn try_clone_box(&self) -> io::Result<Box<dyn Transport>> {
        let port = self.port.try_clone().map_err(io::Error::other)?;
        Ok(Box::new(SerialTransport::new(port)))
    }
}

/// List the names of all serial ports on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(LinkError::Serial)?;
    for port in &ports {
        debug!("found port: {} ({:?})", port.port_name, port.port_type);
    }
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Open a serial port (8N1) at the given baud rate.
pub fn open_port(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<SerialTransport> {
    let port = serialport::new(port_name, baud_rate)
        .data_bits(DATA_BITS)
        .stop_bits(STOP_BITS)
        .parity(PARITY)
        .timeout(timeout)
        .open()
        .map_err(LinkError::Serial)?;

    info!("opened {} at {} baud", port_name, baud_rate);
    Ok(SerialTransport::new(port))
}
