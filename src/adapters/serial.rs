//! USB CDC serial link to the microcontroller.

use std::io;
use std::time::Duration;

use log::{debug, info, warn};
use serialport::SerialPort;

use crate::protocol::{DeviceOpener, SerialDevice};

impl SerialDevice for Box<dyn SerialPort> {
    fn bytes_waiting(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read()? as usize)
    }
}

/// Where to find the microcontroller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DevicePath {
    Fixed(String),
    /// First `ttyACM*` port, looked up again on every open so a replugged
    /// board that comes back under a new number is still found.
    Detect,
}

/// Opens the device at `baud_rate`, 8N1, with a blocking read timeout.
#[derive(Debug, Clone)]
pub struct SerialOpener {
    pub path: DevicePath,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl SerialOpener {
    pub fn new(path: DevicePath, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            path,
            baud_rate,
            read_timeout,
        }
    }
}

impl DeviceOpener for SerialOpener {
    type Device = Box<dyn SerialPort>;

    fn open(&mut self) -> io::Result<Self::Device> {
        let path = match &self.path {
            DevicePath::Fixed(path) => path.clone(),
            DevicePath::Detect => detect_device().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no ttyACM device present")
            })?,
        };
        let mut port = serialport::new(&path, self.baud_rate)
            .timeout(self.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()?;
        // Stale bytes from before the reset would corrupt the first reply.
        port.clear(serialport::ClearBuffer::All)?;
        debug!("Opened {path} at {} baud", self.baud_rate);
        Ok(port)
    }

    fn describe(&self) -> String {
        match &self.path {
            DevicePath::Fixed(path) => path.clone(),
            DevicePath::Detect => "auto (ttyACM*)".into(),
        }
    }
}

/// First `ttyACM*` port on the system, if any.
pub fn detect_device() -> Option<String> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Could not enumerate serial ports: {e}");
            return None;
        }
    };
    let found = ports
        .into_iter()
        .map(|p| p.port_name)
        .find(|name| name.contains("ttyACM"));
    if let Some(name) = &found {
        info!("Detected microcontroller on {name}");
    }
    found
}
