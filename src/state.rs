//! In-memory mirror of what has been sent to the light engine.

use crate::protocol::{EnableRegister, PowerLevel, Slot, NUMBER_OF_SLOTS};
use std::fmt;

/// Mirrored state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    /// The level last confirmed sent.
    pub power: PowerLevel,
    /// Whether the output is switched on regardless of the TTL input.
    pub enabled: bool,
}

impl ChannelState {
    /// The re-quantized power in percent.
    pub fn power_pct(&self) -> f64 {
        self.power.percent()
    }

    /// Powered and enabled, i.e. emitting.
    pub fn is_emitting(&self) -> bool {
        self.enabled && self.power != PowerLevel::OFF
    }
}

/// Power and enable state of all six channels, indexed by slot.
///
/// Only the controller mutates this, and only after the matching command
/// went through its barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    channels: [ChannelState; NUMBER_OF_SLOTS],
}

impl DeviceState {
    pub fn channel(&self, slot: Slot) -> &ChannelState {
        &self.channels[slot.index()]
    }

    pub fn power(&self, slot: Slot) -> PowerLevel {
        self.channels[slot.index()].power
    }

    pub fn enabled(&self, slot: Slot) -> bool {
        self.channels[slot.index()].enabled
    }

    /// The enable flags of all slots.
    pub fn enable_flags(&self) -> [bool; NUMBER_OF_SLOTS] {
        self.channels.map(|channel| channel.enabled)
    }

    /// The enable register as derived from the complete set of flags.
    pub fn enable_register(&self) -> EnableRegister {
        EnableRegister::from_flags(&self.enable_flags())
    }

    /// True if every channel is at zero power and disabled.
    pub fn is_all_off(&self) -> bool {
        self.channels
            .iter()
            .all(|channel| channel.power == PowerLevel::OFF && !channel.enabled)
    }

    /// Iterates over `(slot, state)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &ChannelState)> {
        Slot::ALL.into_iter().zip(self.channels.iter())
    }

    pub(crate) fn set_power(&mut self, slot: Slot, power: PowerLevel) {
        self.channels[slot.index()].power = power;
    }

    pub(crate) fn set_enable_flags(&mut self, flags: [bool; NUMBER_OF_SLOTS]) {
        for (channel, enabled) in self.channels.iter_mut().zip(flags) {
            channel.enabled = enabled;
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (slot, channel)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{slot}: {} {}",
                channel.power,
                if channel.enabled { "on" } else { "off" }
            )?;
        }
        Ok(())
    }
}
