//! Defines data structures and wire encodings for the Lumencor Spectra X serial protocol.
//!
//! The light engine speaks a fixed binary protocol over a 9600 baud serial line.
//! Only the temperature query is answered by the device; power and enable
//! commands are accepted silently. Everything in this module is pure: no I/O,
//! same input always yields the same bytes.
//!
//! | Command           | Bytes                          | Response |
//! |-------------------|--------------------------------|----------|
//! | Init 1            | `57 02 FF 50`                  | none     |
//! | Init 2            | `57 03 AB 50`                  | none     |
//! | Temperature query | `53 91 02 50`                  | 2 bytes  |
//! | Power select      | slot prefix + 3 byte value     | none     |
//! | Enable            | `4F <code> 50`                 | none     |

use std::fmt;

/// Argument validation errors. All of them are raised before anything is written to the device.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The power percentage is outside `0..=100` or not a number.
    #[error("Power of {0} % is outside the valid range 0..=100")]
    PowerOutOfRange(f64),

    /// No channel with this name is registered.
    #[error("Unknown channel name '{0}'")]
    UnknownChannel(String),

    /// An explicit name list must name every slot exactly once.
    #[error("Expected {expected} channel names, got {actual}")]
    ChannelNameCount { expected: usize, actual: usize },

    /// Two slots were given the same name.
    #[error("Duplicate channel name '{0}'")]
    DuplicateChannelName(String),
}

/// Number of LED slots in a Spectra X.
pub const NUMBER_OF_SLOTS: usize = 6;

/// One of the six fixed LED/filter positions inside the light engine.
///
/// The declaration order is the canonical slot order used for explicit name
/// lists and for indexing per-slot arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Slot {
    /// Violet, `V`.
    Violet,
    /// Blue, `B`.
    Blue,
    /// Cyan, `C`.
    Cyan,
    /// Teal, `TN`. Factory option: near infrared.
    Teal,
    /// Green or yellow depending on the installed filter, `GY`.
    GreenYellow,
    /// Red, `R`. Factory option: near infrared.
    Red,
}

impl Slot {
    /// All slots in canonical order.
    pub const ALL: [Slot; NUMBER_OF_SLOTS] = [
        Slot::Violet,
        Slot::Blue,
        Slot::Cyan,
        Slot::Teal,
        Slot::GreenYellow,
        Slot::Red,
    ];

    /// Position of the slot in [`Slot::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The short label printed on the device and in its manual.
    pub const fn label(self) -> &'static str {
        match self {
            Slot::Violet => "V",
            Slot::Blue => "B",
            Slot::Cyan => "C",
            Slot::Teal => "TN",
            Slot::GreenYellow => "GY",
            Slot::Red => "R",
        }
    }

    /// Pin of the DB15HD TTL connector that gates this slot.
    ///
    /// Ground is on pins 6, 7, 8 and 10. Pins 4, 9 and 14 are not connected.
    pub const fn ttl_pin(self) -> u8 {
        match self {
            Slot::Violet => 13,
            Slot::Blue => 12,
            Slot::Cyan => 3,
            Slot::Teal => 11,
            Slot::GreenYellow => 2,
            Slot::Red => 1,
        }
    }

    /// The 4 byte channel-select prefix of a power command.
    pub const fn power_select_prefix(self) -> [u8; 4] {
        match self {
            Slot::Blue => [0x53, 0x1A, 0x03, 0x01],
            Slot::Teal => [0x53, 0x1A, 0x03, 0x02],
            Slot::Violet => [0x53, 0x18, 0x03, 0x01],
            Slot::Cyan => [0x53, 0x18, 0x03, 0x02],
            Slot::GreenYellow => [0x53, 0x18, 0x03, 0x04],
            Slot::Red => [0x53, 0x18, 0x03, 0x08],
        }
    }

    /// Bit of the enable register that belongs to this slot.
    ///
    /// Green and yellow share one output on the Spectra X, so there is no
    /// separate yellow bit here (see [`EnableRegister::RESERVED_BIT`]).
    pub const fn enable_weight(self) -> u8 {
        match self {
            Slot::Red => 1,
            Slot::GreenYellow => 2,
            Slot::Cyan => 4,
            Slot::Violet => 8,
            Slot::Blue => 32,
            Slot::Teal => 64,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Frame length of every command except enable and power.
pub const FRAME_LEN: usize = 4;

/// The two mandatory initialization frames, sent once and in order after opening the port.
pub const INIT_SEQUENCE: [[u8; FRAME_LEN]; 2] =
    [[0x57, 0x02, 0xFF, 0x50], [0x57, 0x03, 0xAB, 0x50]];

/// Asks the device for its temperature. This is the only frame the device answers.
pub const TEMPERATURE_QUERY: [u8; FRAME_LEN] = [0x53, 0x91, 0x02, 0x50];

/// Number of bytes the device sends in reply to [`TEMPERATURE_QUERY`].
pub const TEMPERATURE_RESPONSE_LEN: usize = 2;

/// Length of a power command: 4 byte prefix and 3 byte value.
pub const POWER_COMMAND_LEN: usize = 7;

/// Length of an enable command.
pub const ENABLE_COMMAND_LEN: usize = 3;

/// Returns the initialization frames, see [`INIT_SEQUENCE`].
pub fn init_sequence() -> [[u8; FRAME_LEN]; 2] {
    INIT_SEQUENCE
}

/// Returns the temperature query frame, see [`TEMPERATURE_QUERY`].
pub fn temperature_query() -> [u8; FRAME_LEN] {
    TEMPERATURE_QUERY
}

/// Decodes the reply to a temperature query into degrees Celsius (°C).
///
/// The reply is a big-endian `u16`; the upper 11 bits count in 1/8 °C steps.
pub fn decode_temperature(response: [u8; TEMPERATURE_RESPONSE_LEN]) -> f32 {
    0.125 * (u16::from_be_bytes(response) >> 5) as f32
}

/// Optical power of one channel at the 8 bit resolution of the device DAC.
///
/// A `PowerLevel` is created from a percentage and remembers only the DAC
/// value, so [`PowerLevel::percent`] returns what the hardware actually
/// received (`100 * dac / 255`), not the requested input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PowerLevel(u8);

impl PowerLevel {
    /// The level used by the safety pass.
    pub const OFF: PowerLevel = PowerLevel(0);
    /// Full rated power.
    pub const FULL: PowerLevel = PowerLevel(u8::MAX);
    /// Lowest accepted percentage.
    pub const PERCENT_MIN: f64 = 0.0;
    /// Highest accepted percentage.
    pub const PERCENT_MAX: f64 = 100.0;
    /// One DAC step expressed in percent.
    pub const PERCENT_STEP: f64 = 100.0 / 255.0;

    /// Creates a level from a raw DAC value.
    pub const fn from_dac(dac: u8) -> Self {
        Self(dac)
    }

    /// The raw 8 bit DAC value.
    pub const fn dac(&self) -> u8 {
        self.0
    }

    /// The re-quantized percentage, `100 * dac / 255`.
    pub fn percent(&self) -> f64 {
        100.0 * self.0 as f64 / 255.0
    }

    /// The device takes the inverted 12 bit value shifted into the upper bits
    /// of a 24 bit word, with a constant `0x50` trailer in the low byte.
    fn encode_for_wire(&self) -> [u8; 3] {
        let word = ((4095 - self.0 as u32) << 12) + 80;
        let [_, hi, mid, lo] = word.to_be_bytes();
        [hi, mid, lo]
    }
}

impl TryFrom<f64> for PowerLevel {
    type Error = Error;

    /// Quantizes a percentage to the nearest DAC step.
    ///
    /// Values outside `0..=100` and NaN are rejected, never clamped.
    fn try_from(percent: f64) -> Result<Self, Self::Error> {
        if !(Self::PERCENT_MIN..=Self::PERCENT_MAX).contains(&percent) {
            return Err(Error::PowerOutOfRange(percent));
        }
        let dac = (255.0 * percent / 100.0).round().clamp(0.0, 255.0);
        Ok(Self(dac as u8))
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.percent())
    }
}

/// Builds the power command for one slot.
pub fn power_command(slot: Slot, level: PowerLevel) -> [u8; POWER_COMMAND_LEN] {
    let [p0, p1, p2, p3] = slot.power_select_prefix();
    let [v0, v1, v2] = level.encode_for_wire();
    [p0, p1, p2, p3, v0, v1, v2]
}

/// The single device register that holds the enable state of all channels.
///
/// A set bit means "off". The register can only be built from the complete
/// set of six flags, so a command never carries a partially updated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnableRegister(u8);

impl EnableRegister {
    /// Every output disabled.
    pub const ALL_OFF: EnableRegister = EnableRegister(127);

    /// Weight of the yellow output of the 7 channel Spectra. It does not exist
    /// on the Spectra X and [`Slot`] has no variant for it, so this bit is
    /// always set (off) in every register built here.
    pub const RESERVED_BIT: u8 = 16;

    /// Computes the register from the enable flags of all slots, indexed by [`Slot::index`].
    pub fn from_flags(enabled: &[bool; NUMBER_OF_SLOTS]) -> Self {
        let asserted: u8 = Slot::ALL
            .iter()
            .filter(|slot| enabled[slot.index()])
            .map(|slot| slot.enable_weight())
            .sum();
        Self(Self::ALL_OFF.0 - asserted)
    }

    /// The raw register value, always within `0..=127`.
    pub const fn code(&self) -> u8 {
        self.0
    }

    /// Whether the register enables the given slot.
    pub const fn is_enabled(&self, slot: Slot) -> bool {
        self.0 & slot.enable_weight() == 0
    }

    /// The enable command carrying this register.
    pub const fn command(&self) -> [u8; ENABLE_COMMAND_LEN] {
        [0x4F, self.0, 0x50]
    }
}

impl Default for EnableRegister {
    fn default() -> Self {
        Self::ALL_OFF
    }
}

impl fmt::Display for EnableRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Builds the enable command from the enable flags of all slots.
pub fn enable_command(enabled: &[bool; NUMBER_OF_SLOTS]) -> [u8; ENABLE_COMMAND_LEN] {
    EnableRegister::from_flags(enabled).command()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn flags(slots: &[Slot]) -> [bool; NUMBER_OF_SLOTS] {
        let mut enabled = [false; NUMBER_OF_SLOTS];
        for slot in slots {
            enabled[slot.index()] = true;
        }
        enabled
    }

    #[test]
    fn fixed_frames() {
        assert_eq!(
            init_sequence(),
            [[0x57, 0x02, 0xFF, 0x50], [0x57, 0x03, 0xAB, 0x50]]
        );
        assert_eq!(temperature_query(), [0x53, 0x91, 0x02, 0x50]);
    }

    #[test]
    fn temperature() {
        assert_eq!(decode_temperature([0x19, 0x00]), 25.0);
        assert_eq!(decode_temperature([0x00, 0x00]), 0.0);
        // The low 5 bits carry no information.
        assert_eq!(decode_temperature([0x19, 0x1F]), 25.0);
        assert_eq!(decode_temperature([0x19, 0x20]), 25.125);
        assert_eq!(decode_temperature([0xFF, 0xFF]), 255.875);
    }

    #[test]
    fn power_level_quantization() {
        assert_eq!(PowerLevel::try_from(0.0).unwrap().dac(), 0);
        assert_eq!(PowerLevel::try_from(50.0).unwrap().dac(), 128);
        assert_eq!(PowerLevel::try_from(100.0).unwrap().dac(), 255);
        assert_eq!(PowerLevel::try_from(10.0).unwrap().dac(), 26);

        let level = PowerLevel::try_from(50.0).unwrap();
        assert_eq!(level.percent(), 100.0 * 128.0 / 255.0);
        assert_eq!(level.to_string(), "50.2%");
    }

    #[test]
    fn power_level_error_bounded_by_one_step() {
        for tenth in 0..=1000 {
            let percent = tenth as f64 / 10.0;
            let level = PowerLevel::try_from(percent).unwrap();
            assert!(
                (level.percent() - percent).abs() <= PowerLevel::PERCENT_STEP,
                "{percent} -> {}",
                level.percent()
            );
        }
    }

    #[test]
    fn power_level_rejects_out_of_range() {
        assert_matches!(PowerLevel::try_from(-1.0), Err(Error::PowerOutOfRange(..)));
        assert_matches!(PowerLevel::try_from(101.0), Err(Error::PowerOutOfRange(..)));
        assert_matches!(
            PowerLevel::try_from(100.000_1),
            Err(Error::PowerOutOfRange(..))
        );
        assert_matches!(
            PowerLevel::try_from(f64::NAN),
            Err(Error::PowerOutOfRange(..))
        );
        assert_matches!(
            PowerLevel::try_from(f64::INFINITY),
            Err(Error::PowerOutOfRange(..))
        );
    }

    #[test]
    fn power_command_half_power_violet() {
        let level = PowerLevel::try_from(50.0).unwrap();
        // ((4095 - 128) << 12) + 80 == 0xF7F050
        assert_eq!(
            power_command(Slot::Violet, level),
            [0x53, 0x18, 0x03, 0x01, 0xF7, 0xF0, 0x50]
        );
    }

    #[test]
    fn power_command_extremes() {
        assert_eq!(
            power_command(Slot::Blue, PowerLevel::OFF),
            [0x53, 0x1A, 0x03, 0x01, 0xFF, 0xF0, 0x50]
        );
        assert_eq!(
            power_command(Slot::Red, PowerLevel::FULL),
            [0x53, 0x18, 0x03, 0x08, 0xF0, 0x00, 0x50]
        );
    }

    #[test]
    fn power_command_is_deterministic() {
        for slot in Slot::ALL {
            let level = PowerLevel::try_from(37.3).unwrap();
            assert_eq!(power_command(slot, level), power_command(slot, level));
        }
    }

    #[test]
    fn power_select_prefixes_are_distinct() {
        for a in Slot::ALL {
            for b in Slot::ALL {
                if a != b {
                    assert_ne!(a.power_select_prefix(), b.power_select_prefix());
                }
            }
        }
    }

    #[test]
    fn enable_single_blue() {
        let register = EnableRegister::from_flags(&flags(&[Slot::Blue]));
        assert_eq!(register.code(), 95);
        assert_eq!(register.command(), [0x4F, 0x5F, 0x50]);
        assert!(register.is_enabled(Slot::Blue));
        assert!(!register.is_enabled(Slot::Violet));
    }

    #[test]
    fn enable_all_and_none() {
        assert_eq!(
            enable_command(&[false; NUMBER_OF_SLOTS]),
            [0x4F, 0x7F, 0x50]
        );
        // 127 - (1 + 2 + 4 + 8 + 32 + 64)
        assert_eq!(enable_command(&[true; NUMBER_OF_SLOTS]), [0x4F, 0x10, 0x50]);
        assert_eq!(EnableRegister::default(), EnableRegister::ALL_OFF);
    }

    #[test]
    fn enable_register_never_asserts_reserved_bit() {
        for mask in 0u8..64 {
            let mut enabled = [false; NUMBER_OF_SLOTS];
            for (i, flag) in enabled.iter_mut().enumerate() {
                *flag = mask & (1 << i) != 0;
            }
            let register = EnableRegister::from_flags(&enabled);
            assert!(register.code() <= 127);
            assert_ne!(register.code() & EnableRegister::RESERVED_BIT, 0);
            assert_eq!(register, EnableRegister::from_flags(&enabled));
            for slot in Slot::ALL {
                assert_eq!(register.is_enabled(slot), enabled[slot.index()]);
            }
        }
    }

    #[test]
    fn slot_labels() {
        let labels: Vec<_> = Slot::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(labels, ["V", "B", "C", "TN", "GY", "R"]);
        for (i, slot) in Slot::ALL.iter().enumerate() {
            assert_eq!(slot.index(), i);
        }
    }
}
