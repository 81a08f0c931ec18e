//! The byte stream the controller talks over.
//!
//! [`Transport`] is the seam between the protocol logic and the physical
//! link. With the `serial` feature, [`SerialTransport`] implements it on top
//! of a `tokio-serial` port using blocking I/O.

use crate::error::Result;
use std::time::Duration;

/// A duplex byte channel to a single device.
///
/// Implementations are used by exactly one controller at a time and are not
/// expected to be shared between threads without external locking.
pub trait Transport {
    /// Writes the whole frame.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Fills `buf` completely, waiting at most `timeout` for the bytes to arrive.
    ///
    /// # Errors
    ///
    /// [`crate::error::Error::ProtocolTimeout`] if fewer than `buf.len()`
    /// bytes arrived before the timeout elapsed.
    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()>;

    /// Number of received bytes that have not been read yet.
    fn bytes_pending(&mut self) -> Result<usize>;

    /// Releases the underlying channel. Further calls fail or do nothing.
    fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_all(bytes)
    }

    fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        (**self).read_exact(buf, timeout)
    }

    fn bytes_pending(&mut self) -> Result<usize> {
        (**self).bytes_pending()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[cfg(feature = "serial")]
pub use self::serial::*;

#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
#[cfg(feature = "serial")]
mod serial {
    use super::Transport;
    use crate::error::{Error, Result};
    use std::io::{Read, Write};
    use std::time::{Duration, Instant};

    /// The baud rate of the Spectra X serial interface.
    pub const BAUD_RATE: u32 = 9600;
    /// The parity used for serial communication.
    pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
    /// The number of stop bits used for serial communication.
    pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
    /// The number of data bits used for serial communication.
    pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;

    /// Creates a `tokio_serial::SerialPortBuilder` with the line settings of the light engine.
    ///
    /// # Arguments
    ///
    /// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
    /// * `baud_rate` - The baud rate for the serial communication.
    /// * `timeout` - Read timeout of the port.
    pub fn serial_port_builder(
        device: &str,
        baud_rate: u32,
        timeout: Duration,
    ) -> tokio_serial::SerialPortBuilder {
        tokio_serial::new(device, baud_rate)
            .parity(*PARITY)
            .stop_bits(*STOP_BITS)
            .data_bits(*DATA_BITS)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
    }

    /// A blocking serial port.
    pub struct SerialTransport {
        device: String,
        port: Option<Box<dyn tokio_serial::SerialPort>>,
    }

    impl SerialTransport {
        /// Opens `device` at [`BAUD_RATE`].
        ///
        /// # Errors
        ///
        /// [`Error::Connection`] if the port does not exist or is busy.
        pub fn open(device: &str, timeout: Duration) -> Result<Self> {
            Self::open_with_baud_rate(device, BAUD_RATE, timeout)
        }

        /// Opens `device` with a non-default baud rate.
        pub fn open_with_baud_rate(device: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
            let port = serial_port_builder(device, baud_rate, timeout)
                .open()
                .map_err(|err| Error::Connection {
                    address: device.to_string(),
                    reason: err.to_string(),
                })?;
            log::debug!("Serial port {device} opened at {baud_rate} baud");
            Ok(Self {
                device: device.to_string(),
                port: Some(port),
            })
        }

        /// The path the port was opened with.
        pub fn device(&self) -> &str {
            &self.device
        }

        fn port(&mut self) -> Result<&mut Box<dyn tokio_serial::SerialPort>> {
            self.port.as_mut().ok_or(Error::Closed)
        }
    }

    /// Calls `read` with the unfilled tail of `buf` and the time left until
    /// `buf` is full or `timeout` has elapsed.
    ///
    /// `TimedOut` and `Interrupted` are retried while time remains.
    fn fill_before_deadline<F>(buf: &mut [u8], timeout: Duration, mut read: F) -> Result<()>
    where
        F: FnMut(&mut [u8], Duration) -> std::io::Result<usize>,
    {
        let deadline = Instant::now() + timeout;
        let mut received = 0;
        while received < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ProtocolTimeout {
                    expected: buf.len(),
                    received,
                });
            }
            match read(&mut buf[received..], remaining) {
                Ok(n) => received += n,
                Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {}
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    impl std::fmt::Debug for SerialTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SerialTransport")
                .field("device", &self.device)
                .field("open", &self.port.is_some())
                .finish()
        }
    }

    impl Transport for SerialTransport {
        fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
            let port = self.port()?;
            port.write_all(bytes)?;
            port.flush()?;
            Ok(())
        }

        fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
            let port = self.port()?;
            fill_before_deadline(buf, timeout, |chunk, remaining| {
                port.set_timeout(remaining).map_err(std::io::Error::from)?;
                port.read(chunk)
            })
        }

        fn bytes_pending(&mut self) -> Result<usize> {
            let pending = self
                .port()?
                .bytes_to_read()
                .map_err(std::io::Error::from)?;
            Ok(pending as usize)
        }

        fn close(&mut self) -> Result<()> {
            if self.port.take().is_some() {
                log::debug!("Serial port {} closed", self.device);
            }
            Ok(())
        }
    }

}
