//! Stateful controller for a Lumencor Spectra X light engine.
//!
//! **Warning:** the controller can fire LED emission. Shutter the LEDs first.
//!
//! To drive the LEDs from external TTL signals:
//!
//! 1. Keep every channel disabled (the state after [`Controller::new`]). While a
//!    channel is enabled its TTL input is ignored.
//! 2. Set the power of each channel with [`Controller::set_power`].
//! 3. Apply the TTL signals on the DB15HD connector (see [`Slot::ttl_pin`]).
//!
//! TTL polarity (active high or active low) is fixed when the unit is ordered.
//!
//! # Examples
//!
//! ```no_run
//! use spectra_x_lib::controller::{Controller, ControllerOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let names = ["395/25", "440/20", "470/24", "510/25", "550/15", "640/30"];
//!     let options = ControllerOptions::default().with_names(names);
//!     let mut spx = Controller::open("/dev/ttyUSB0", options)?;
//!
//!     spx.set_power(10.0, "440/20")?;
//!     spx.set_enable(true, "440/20")?;
//!     println!("Temperature: {} °C", spx.get_temperature()?);
//!
//!     // Switches every channel off before releasing the port.
//!     spx.close()?;
//!     Ok(())
//! }
//! ```

use crate::barrier::{ResponseSynchronizer, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::protocol::{self as proto, EnableRegister, PowerLevel, Slot, NUMBER_OF_SLOTS};
use crate::registry::{ChannelRegistry, FilterOptions};
use crate::state::DeviceState;
use crate::transport::Transport;
use std::time::Duration;

/// Logs at info level when the controller is verbose.
macro_rules! verbose {
    ($controller:expr, $($arg:tt)+) => {
        if $controller.verbose {
            log::info!($($arg)+);
        }
    };
}

/// Settings applied when a [`Controller`] is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Name used in diagnostics.
    pub name: String,
    /// One unique name per slot in [`Slot::ALL`] order. Defaults to wavelengths.
    pub led_names: Option<Vec<String>>,
    /// Installed hardware variants.
    pub filters: FilterOptions,
    /// Timeout of every single read.
    pub timeout: Duration,
    /// Log every operation at info level.
    pub verbose: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            name: String::from("Spectra_X"),
            led_names: None,
            filters: FilterOptions::default(),
            timeout: DEFAULT_TIMEOUT,
            verbose: false,
        }
    }
}

impl ControllerOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.led_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_filters(mut self, filters: FilterOptions) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Owns the connection to one light engine and mirrors its state.
///
/// Construction initializes the device and switches every channel off; the
/// controller is then ready until [`Controller::close`], which switches
/// every channel off again and releases the transport. `close` consumes the
/// controller, so a second close cannot be expressed. A controller that is
/// dropped without `close` runs the same shutdown on a best-effort basis.
///
/// Power and enable commands are never acknowledged by the device. Each one
/// is followed by a barrier (see [`crate::barrier`]): a successful return
/// means the device answered the following temperature query, not that it
/// confirmed the command.
pub struct Controller<T: Transport> {
    name: String,
    transport: T,
    sync: ResponseSynchronizer,
    registry: ChannelRegistry,
    state: DeviceState,
    verbose: bool,
    closed: bool,
}

#[cfg(feature = "serial")]
impl Controller<crate::transport::SerialTransport> {
    /// Opens the serial port `device` and initializes the light engine on it.
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] if the port cannot be opened, otherwise the
    /// errors of [`Controller::new`].
    pub fn open(device: &str, options: ControllerOptions) -> Result<Self> {
        if options.verbose {
            log::info!("{}: opening {device}...", options.name);
        }
        let transport = crate::transport::SerialTransport::open(device, options.timeout)?;
        Self::new(transport, options)
    }
}

impl<T: Transport> Controller<T> {
    /// Initializes the device behind `transport` and drives it to the all-off state.
    ///
    /// The sequence is: validate the channel names, send both init frames,
    /// barrier, read the temperature once, then for every channel set power
    /// to 0 followed by enable off.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] for a malformed name list. Nothing is sent.
    /// * [`Error::ProtocolTimeout`] or [`Error::UnexpectedData`] if the device
    ///   does not respond properly. The transport is closed in that case,
    ///   without another attempt to switch the channels off, so a device
    ///   that failed partway through the safety pass may remain energized.
    pub fn new(transport: T, options: ControllerOptions) -> Result<Self> {
        let registry = ChannelRegistry::build(&options.filters, options.led_names.as_deref())?;
        let mut controller = Self {
            name: options.name,
            transport,
            sync: ResponseSynchronizer::new(options.timeout),
            registry,
            state: DeviceState::default(),
            verbose: options.verbose,
            closed: false,
        };
        if let Err(err) = controller.initialize() {
            if let Err(close_err) = controller.release() {
                log::warn!("{}: cannot release transport: {close_err}", controller.name);
            }
            return Err(err);
        }
        Ok(controller)
    }

    fn initialize(&mut self) -> Result<()> {
        for frame in proto::init_sequence() {
            self.sync.send(&mut self.transport, &frame)?;
        }
        self.sync.barrier(&mut self.transport)?;
        verbose!(self, "{}: initialized", self.name);
        self.get_temperature()?;
        verbose!(
            self,
            "{}: led names = {:?}",
            self.name,
            self.registry.names().collect::<Vec<_>>()
        );
        self.safety_pass(false)
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The channels of this device.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// The mirrored device state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// The per-read timeout.
    pub fn timeout(&self) -> Duration {
        self.sync.timeout()
    }

    /// Logs every operation at info level.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// The re-quantized power of a channel in percent, as last sent.
    pub fn power(&self, name: &str) -> Result<f64> {
        let slot = self.registry.slot_of(name)?;
        Ok(self.state.power(slot).percent())
    }

    /// Whether a channel is enabled, as last sent.
    pub fn enabled(&self, name: &str) -> Result<bool> {
        let slot = self.registry.slot_of(name)?;
        Ok(self.state.enabled(slot))
    }

    /// Reads the device temperature in degrees Celsius (°C).
    ///
    /// Also serves as a cheap liveness check.
    pub fn get_temperature(&mut self) -> Result<f32> {
        self.ensure_ready()?;
        verbose!(self, "{}: getting temperature", self.name);
        let response = self.sync.barrier(&mut self.transport)?;
        let temperature = proto::decode_temperature(response);
        verbose!(self, "{}: -> temperature (°C) = {temperature}", self.name);
        Ok(temperature)
    }

    /// Sets the optical power of the channel called `name`.
    ///
    /// Returns the level actually sent. The mirror stores its re-quantized
    /// percentage, not `power_pct`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `power_pct` is outside `0..=100` or the
    ///   name is unknown. Nothing is sent.
    /// * Transport and barrier errors. The mirror keeps its previous value.
    pub fn set_power(&mut self, power_pct: f64, name: &str) -> Result<PowerLevel> {
        self.ensure_ready()?;
        verbose!(self, "{}({name}): setting power (%) = {power_pct}", self.name);
        let slot = self.registry.slot_of(name)?;
        let level = PowerLevel::try_from(power_pct)?;
        self.set_slot_power(slot, level)?;
        verbose!(self, "{}({name}): -> done setting power", self.name);
        Ok(level)
    }

    /// Enables or disables the channel called `name`.
    ///
    /// The device holds all enable flags in one register, so the command
    /// carries the complete register rebuilt from every channel's flag.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if the name is unknown. Nothing is sent.
    /// * Transport and barrier errors. The mirror keeps its previous value.
    pub fn set_enable(&mut self, enabled: bool, name: &str) -> Result<()> {
        self.ensure_ready()?;
        verbose!(self, "{}({name}): setting enable = {enabled}", self.name);
        let slot = self.registry.slot_of(name)?;
        self.set_slot_enable(slot, enabled)?;
        verbose!(self, "{}({name}): -> done setting enable", self.name);
        Ok(())
    }

    /// Sets the power of a slot.
    pub fn set_slot_power(&mut self, slot: Slot, level: PowerLevel) -> Result<()> {
        self.ensure_ready()?;
        self.write_power(slot, level)
    }

    /// Enables or disables a slot.
    pub fn set_slot_enable(&mut self, slot: Slot, enabled: bool) -> Result<()> {
        self.ensure_ready()?;
        let mut flags = self.state.enable_flags();
        flags[slot.index()] = enabled;
        self.write_enable(flags)
    }

    /// Sets every channel to zero power and disables it, one channel at a time.
    pub fn all_off(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.safety_pass(false)
    }

    /// Switches every channel off and releases the transport.
    ///
    /// Every step of the shutdown is attempted even if an earlier one fails;
    /// the first failure is returned after the transport has been released.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        verbose!(self, "{}: closing...", self.name);
        let verbose = std::mem::replace(&mut self.verbose, false);
        let safety = self.safety_pass(true);
        let released = self.release();
        self.verbose = verbose;
        if let Err(ref err) = safety {
            log::warn!("{}: safety shutdown incomplete: {err}", self.name);
        }
        verbose!(self, "{}: closed", self.name);
        safety.and(released)
    }

    fn release(&mut self) -> Result<()> {
        self.closed = true;
        self.transport.close()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Power to 0 then enable off, channel by channel.
    ///
    /// The enable flags accumulate locally: a failed enable write must not
    /// let a later channel's register re-enable an earlier one.
    fn safety_pass(&mut self, best_effort: bool) -> Result<()> {
        let mut flags = self.state.enable_flags();
        let mut first_error = None;
        for slot in Slot::ALL {
            flags[slot.index()] = false;
            let power = self.write_power(slot, PowerLevel::OFF);
            if power.is_err() && !best_effort {
                return power;
            }
            let enable = self.write_enable(flags);
            for step in [power, enable] {
                if let Err(err) = step {
                    if !best_effort {
                        return Err(err);
                    }
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn write_power(&mut self, slot: Slot, level: PowerLevel) -> Result<()> {
        let cmd = proto::power_command(slot, level);
        self.sync.send_with_barrier(&mut self.transport, &cmd)?;
        self.state.set_power(slot, level);
        Ok(())
    }

    fn write_enable(&mut self, flags: [bool; NUMBER_OF_SLOTS]) -> Result<()> {
        let register = EnableRegister::from_flags(&flags);
        log::debug!("{}: enable register = {register}", self.name);
        self.sync
            .send_with_barrier(&mut self.transport, &register.command())?;
        self.state.set_enable_flags(flags);
        Ok(())
    }
}

impl<T: Transport> Drop for Controller<T> {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "{}: dropped without close, switching all channels off",
                self.name
            );
            if let Err(err) = self.shutdown() {
                log::error!("{}: shutdown on drop failed: {err}", self.name);
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Controller<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("registry", &self.registry)
            .field("state", &self.state)
            .field("timeout", &self.sync.timeout())
            .field("closed", &self.closed)
            .finish()
    }
}
