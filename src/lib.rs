//! A library for controlling the Lumencor Spectra X LED light engine over its serial interface.
//!
//! **Warning:** this crate can fire LED emission. Shutter the LEDs first.
//!
//! The crate is layered the same way the device protocol is:
//!
//! 1.  **Protocol**: pure encoders for every frame the device understands and
//!     the decoder for its only reply, the temperature. See [`protocol`].
//! 2.  **Registry and state**: the six fixed slots with their names and specs
//!     ([`registry`]), and the in-memory mirror of power and enable flags ([`state`]).
//! 3.  **Barrier**: the device never acknowledges commands, so every state
//!     change is followed by a temperature query that it does answer. See [`barrier`].
//! 4.  **Controller**: owns the connection, enforces the all-off state at
//!     startup and shutdown. See [`controller::Controller`] and, for sharing
//!     between threads, [`safe_controller::SafeController`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use spectra_x_lib::controller::{Controller, ControllerOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut spx = Controller::open("/dev/ttyUSB0", ControllerOptions::default())?;
//!
//!     // Names default to the wavelength of each slot.
//!     spx.set_power(15.0, "470")?;
//!     println!("Temperature: {} °C", spx.get_temperature()?);
//!
//!     spx.close()?;
//!     Ok(())
//! }
//! ```
//!
//! Without the `serial` feature, any type implementing [`transport::Transport`]
//! can be passed to [`controller::Controller::new`].

pub mod barrier;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod transport;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-controller")))]
#[cfg(feature = "safe-controller")]
pub mod safe_controller;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};
