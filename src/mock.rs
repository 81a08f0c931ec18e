//! A scripted in-memory light engine for the unit tests.
//!
//! The mock answers temperature queries, records every frame and decodes
//! power and enable frames into an emulated hardware state. Faults (silence,
//! short replies, stray bytes, failing writes) can be switched on per test.

use crate::error::{Error, Result};
use crate::protocol::{self as proto, Slot, NUMBER_OF_SLOTS};
use crate::transport::Transport;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
struct Inner {
    frames: Vec<Vec<u8>>,
    rx: VecDeque<u8>,
    temperature_reply: [u8; 2],
    muted: bool,
    truncate_to: Option<usize>,
    inject_after_reply: Option<Vec<u8>>,
    writes_until_failure: Option<usize>,
    dac: [Option<u8>; NUMBER_OF_SLOTS],
    enable_code: Option<u8>,
    close_count: usize,
}

/// Handle to the emulated device. Clones share the same device.
#[derive(Debug, Clone)]
pub(crate) struct MockDevice {
    inner: Arc<Mutex<Inner>>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                frames: Vec::new(),
                rx: VecDeque::new(),
                // 25.0 °C
                temperature_reply: [0x19, 0x00],
                muted: false,
                truncate_to: None,
                inject_after_reply: None,
                writes_until_failure: None,
                dac: [None; NUMBER_OF_SLOTS],
                enable_code: None,
                close_count: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub(crate) fn with_temperature_reply(self, reply: [u8; 2]) -> Self {
        self.lock().temperature_reply = reply;
        self
    }

    pub(crate) fn transport(&self) -> MockTransport {
        MockTransport {
            device: self.clone(),
            open: true,
        }
    }

    /// All frames written so far, in order.
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Written frames without the temperature queries.
    pub(crate) fn commands(&self) -> Vec<Vec<u8>> {
        self.frames()
            .into_iter()
            .filter(|frame| frame[..] != proto::TEMPERATURE_QUERY)
            .collect()
    }

    pub(crate) fn clear_frames(&self) {
        self.lock().frames.clear();
    }

    /// DAC value last written to a slot, `None` if never written.
    pub(crate) fn dac(&self, slot: Slot) -> Option<u8> {
        self.lock().dac[slot.index()]
    }

    /// Enable register last written, `None` if never written.
    pub(crate) fn enable_code(&self) -> Option<u8> {
        self.lock().enable_code
    }

    pub(crate) fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Stop answering temperature queries.
    pub(crate) fn mute(&self) {
        self.lock().muted = true;
    }

    pub(crate) fn unmute(&self) {
        self.lock().muted = false;
    }

    /// Answer temperature queries with only the first `len` bytes.
    pub(crate) fn truncate_replies(&self, len: usize) {
        self.lock().truncate_to = Some(len);
    }

    /// Put bytes on the line right now.
    pub(crate) fn inject(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
    }

    /// Append stray bytes to the next temperature reply.
    pub(crate) fn inject_after_next_reply(&self, bytes: &[u8]) {
        self.lock().inject_after_reply = Some(bytes.to_vec());
    }

    /// Let `count` more writes succeed, then fail every write.
    pub(crate) fn fail_writes_after(&self, count: usize) {
        self.lock().writes_until_failure = Some(count);
    }

    pub(crate) fn heal(&self) {
        let mut inner = self.lock();
        inner.writes_until_failure = None;
        inner.muted = false;
        inner.truncate_to = None;
        inner.inject_after_reply = None;
        inner.rx.clear();
    }
}

impl Inner {
    fn receive(&mut self, frame: &[u8]) {
        self.frames.push(frame.to_vec());
        if frame == proto::TEMPERATURE_QUERY {
            if !self.muted {
                let len = self.truncate_to.unwrap_or(2).min(2);
                let reply = self.temperature_reply;
                self.rx.extend(&reply[..len]);
                if let Some(stray) = self.inject_after_reply.take() {
                    self.rx.extend(stray);
                }
            }
        } else if let [0x4F, code, 0x50] = frame {
            self.enable_code = Some(*code);
        } else if frame.len() == proto::POWER_COMMAND_LEN {
            if let Some(slot) = Slot::ALL
                .into_iter()
                .find(|slot| slot.power_select_prefix() == frame[..4])
            {
                let word = u32::from_be_bytes([0, frame[4], frame[5], frame[6]]);
                assert_eq!(word & 0xFFF, 80, "malformed power frame {frame:02X?}");
                let dac = 4095 - (word >> 12);
                self.dac[slot.index()] = Some(u8::try_from(dac).unwrap());
            }
        }
    }
}

/// The transport end of a [`MockDevice`].
#[derive(Debug)]
pub(crate) struct MockTransport {
    device: MockDevice,
    open: bool,
}

impl Transport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.open {
            return Err(Error::Closed);
        }
        let mut inner = self.device.lock();
        if let Some(remaining) = inner.writes_until_failure.as_mut() {
            if *remaining == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged").into());
            }
            *remaining -= 1;
        }
        inner.receive(bytes);
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<()> {
        let mut inner = self.device.lock();
        let mut received = 0;
        while received < buf.len() {
            match inner.rx.pop_front() {
                Some(byte) => {
                    buf[received] = byte;
                    received += 1;
                }
                None => {
                    return Err(Error::ProtocolTimeout {
                        expected: buf.len(),
                        received,
                    })
                }
            }
        }
        Ok(())
    }

    fn bytes_pending(&mut self) -> Result<usize> {
        Ok(self.device.lock().rx.len())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        self.device.lock().close_count += 1;
        Ok(())
    }
}
