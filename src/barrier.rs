//! Forced-response synchronization.
//!
//! The Spectra X never acknowledges power or enable commands. The only frame
//! it answers is the temperature query, so after every state-changing write
//! the [`ResponseSynchronizer`] sends that query and blocks until its reply
//! arrives. A reply proves the device is alive and has read everything sent
//! before the query. It does **not** prove that a preceding command was
//! understood or applied: this is an ordering barrier, not an acknowledgement.

use crate::error::{Error, Result};
use crate::protocol as proto;
use crate::transport::Transport;
use std::time::Duration;

/// Default per-read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);

/// Sends frames and enforces the barrier discipline on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSynchronizer {
    timeout: Duration,
}

impl Default for ResponseSynchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ResponseSynchronizer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The timeout applied to every single read.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Writes `cmd` and reads exactly `N` response bytes.
    ///
    /// After the exchange the line must be quiet; stray bytes mean the
    /// request/response pairing is lost.
    ///
    /// # Errors
    ///
    /// * [`Error::ProtocolTimeout`] if fewer than `N` bytes arrive in time.
    /// * [`Error::UnexpectedData`] if bytes are still pending afterwards.
    pub fn exchange<T: Transport + ?Sized, const N: usize>(
        &self,
        transport: &mut T,
        cmd: &[u8],
    ) -> Result<[u8; N]> {
        log::trace!("sending cmd = {cmd:02X?}");
        transport.write_all(cmd)?;
        let mut response = [0u8; N];
        if N > 0 {
            transport.read_exact(&mut response, self.timeout)?;
            log::trace!("-> response = {response:02X?}");
        }
        self.expect_quiet(transport)?;
        Ok(response)
    }

    /// Writes a frame the device does not answer.
    pub fn send<T: Transport + ?Sized>(&self, transport: &mut T, cmd: &[u8]) -> Result<()> {
        self.exchange::<T, 0>(transport, cmd).map(|_| ())
    }

    /// Blocks until the device has answered a temperature query.
    ///
    /// Returns the raw reply so callers may decode it.
    pub fn barrier<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
    ) -> Result<[u8; proto::TEMPERATURE_RESPONSE_LEN]> {
        log::trace!("force response...");
        let response = self.exchange(transport, &proto::temperature_query())?;
        log::trace!("response received");
        Ok(response)
    }

    /// Sends a state-changing frame followed by a barrier.
    pub fn send_with_barrier<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        cmd: &[u8],
    ) -> Result<()> {
        self.send(transport, cmd)?;
        self.barrier(transport).map(|_| ())
    }

    fn expect_quiet<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        match transport.bytes_pending()? {
            0 => Ok(()),
            pending => Err(Error::UnexpectedData { pending }),
        }
    }
}
