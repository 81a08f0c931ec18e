//! The fixed set of LED channels of a Spectra X and the names they are addressed by.

use crate::protocol::{self as proto, Slot, NUMBER_OF_SLOTS};
use std::fmt;

/// Optical characteristics of the LED and filter installed in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelSpec {
    /// Center wavelength in nm.
    pub wavelength_nm: u16,
    /// Filter bandpass in nm.
    pub bandpass_nm: u16,
    /// Rated optical output in mW.
    pub rated_power_mw: u16,
}

impl ChannelSpec {
    pub const fn new(wavelength_nm: u16, bandpass_nm: u16, rated_power_mw: u16) -> Self {
        Self {
            wavelength_nm,
            bandpass_nm,
            rated_power_mw,
        }
    }

    /// The factory default for a slot.
    pub const fn default_for(slot: Slot) -> Self {
        match slot {
            Slot::Violet => Self::new(395, 25, 295),
            Slot::Blue => Self::new(440, 20, 256),
            Slot::Cyan => Self::new(470, 24, 196),
            Slot::Teal => Self::new(510, 25, 62),
            Slot::GreenYellow => Self::new(550, 15, 260),
            Slot::Red => Self::new(640, 30, 231),
        }
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} nm, {} mW",
            self.wavelength_nm, self.bandpass_nm, self.rated_power_mw
        )
    }
}

/// Hardware variants that change what a slot emits.
///
/// Check the actual hardware: the yellow filter is user swappable, the NIR
/// options are chosen when the unit is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct FilterOptions {
    /// `GY` carries the yellow filter instead of green.
    pub yellow_filter: bool,
    /// `TN` is fitted with a near infrared LED.
    pub teal_to_nir: bool,
    /// `R` is fitted with a near infrared LED.
    pub red_to_nir: bool,
}

impl FilterOptions {
    /// The spec of a slot with these options applied.
    pub const fn spec_for(&self, slot: Slot) -> ChannelSpec {
        match slot {
            Slot::GreenYellow if self.yellow_filter => ChannelSpec::new(575, 25, 310),
            Slot::Teal if self.teal_to_nir => ChannelSpec::new(730, 40, 123),
            Slot::Red if self.red_to_nir => ChannelSpec::new(740, 20, 65),
            _ => ChannelSpec::default_for(slot),
        }
    }
}

/// A slot together with its installed spec and display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    slot: Slot,
    spec: ChannelSpec,
    name: String,
}

impl Channel {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn spec(&self) -> &ChannelSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<2} {:<12} {}", self.slot, self.name, self.spec)
    }
}

/// Immutable mapping between the six slots and their user facing names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRegistry {
    channels: [Channel; NUMBER_OF_SLOTS],
}

impl ChannelRegistry {
    /// Builds the registry from the default specs, the filter options and optional names.
    ///
    /// `names`, if given, must hold exactly one unique name per slot in the
    /// order of [`Slot::ALL`]. Without names every channel is called by its
    /// wavelength, e.g. `"395"`.
    ///
    /// # Errors
    ///
    /// * [`proto::Error::ChannelNameCount`] if `names` does not have 6 entries.
    /// * [`proto::Error::DuplicateChannelName`] if a name is used twice.
    pub fn build<S: AsRef<str>>(
        options: &FilterOptions,
        names: Option<&[S]>,
    ) -> Result<Self, proto::Error> {
        if let Some(names) = names {
            if names.len() != NUMBER_OF_SLOTS {
                return Err(proto::Error::ChannelNameCount {
                    expected: NUMBER_OF_SLOTS,
                    actual: names.len(),
                });
            }
            for (i, name) in names.iter().enumerate() {
                if names[..i].iter().any(|n| n.as_ref() == name.as_ref()) {
                    return Err(proto::Error::DuplicateChannelName(
                        name.as_ref().to_string(),
                    ));
                }
            }
        }
        let channels = Slot::ALL.map(|slot| {
            let spec = options.spec_for(slot);
            let name = match names {
                Some(names) => names[slot.index()].as_ref().to_string(),
                None => spec.wavelength_nm.to_string(),
            };
            Channel { slot, spec, name }
        });
        Ok(Self { channels })
    }

    /// Looks up the slot addressed by a name.
    pub fn slot_of(&self, name: &str) -> Result<Slot, proto::Error> {
        self.channels
            .iter()
            .find(|channel| channel.name == name)
            .map(|channel| channel.slot)
            .ok_or_else(|| proto::Error::UnknownChannel(name.to_string()))
    }

    /// The display name of a slot.
    pub fn name_of(&self, slot: Slot) -> &str {
        &self.channels[slot.index()].name
    }

    /// The installed spec of a slot.
    pub fn spec_of(&self, slot: Slot) -> &ChannelSpec {
        &self.channels[slot.index()].spec
    }

    /// All channel names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|channel| channel.name.as_str())
    }

    /// Iterates over all channels in slot order.
    pub fn iter(&self) -> std::slice::Iter<'_, Channel> {
        self.channels.iter()
    }
}

impl<'a> IntoIterator for &'a ChannelRegistry {
    type Item = &'a Channel;
    type IntoIter = std::slice::Iter<'a, Channel>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
