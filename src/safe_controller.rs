//! Thread-safe handle to a [`Controller`].
//!
//! The protocol has no request tagging, so two commands in flight at once
//! would steal each other's replies. `SafeController` serializes every
//! operation behind one mutex around the whole controller and can be cloned
//! freely between threads.
//!
//! ## Example
//!
//! ```no_run
//! use spectra_x_lib::{
//!     controller::{Controller, ControllerOptions},
//!     safe_controller::SafeController,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = Controller::open("/dev/ttyUSB0", ControllerOptions::default())?;
//!     let spx = SafeController::new(controller);
//!
//!     let worker = {
//!         let spx = spx.clone();
//!         std::thread::spawn(move || spx.get_temperature())
//!     };
//!     spx.set_power(25.0, "470")?;
//!     println!("Temperature: {} °C", worker.join().unwrap()?);
//!
//!     spx.close()?;
//!     Ok(())
//! }
//! ```

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::protocol::PowerLevel;
use crate::state::DeviceState;
use crate::transport::Transport;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, lockable controller. Becomes unusable after [`SafeController::close`].
#[derive(Debug)]
pub struct SafeController<T: Transport> {
    controller: Arc<Mutex<Option<Controller<T>>>>,
}

impl<T: Transport> Clone for SafeController<T> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
        }
    }
}

impl<T: Transport> SafeController<T> {
    /// Wraps a ready controller.
    pub fn new(controller: Controller<T>) -> Self {
        Self {
            controller: Arc::new(Mutex::new(Some(controller))),
        }
    }

    /// Creates a new `SafeController` from a shared controller slot.
    pub fn from_shared(controller: Arc<Mutex<Option<Controller<T>>>>) -> Self {
        Self { controller }
    }

    /// Clones the shared controller slot.
    pub fn clone_shared(&self) -> Arc<Mutex<Option<Controller<T>>>> {
        self.controller.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Controller<T>>> {
        // The mirror only changes after a completed exchange, so it is
        // consistent even when a holder panicked.
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn with<R>(&self, f: impl FnOnce(&mut Controller<T>) -> Result<R>) -> Result<R> {
        match self.lock().as_mut() {
            Some(controller) => f(controller),
            None => Err(Error::Closed),
        }
    }

    /// Reads the device temperature in degrees Celsius (°C).
    pub fn get_temperature(&self) -> Result<f32> {
        self.with(|controller| controller.get_temperature())
    }

    /// Sets the optical power of a channel, see [`Controller::set_power`].
    pub fn set_power(&self, power_pct: f64, name: &str) -> Result<PowerLevel> {
        self.with(|controller| controller.set_power(power_pct, name))
    }

    /// Enables or disables a channel, see [`Controller::set_enable`].
    pub fn set_enable(&self, enabled: bool, name: &str) -> Result<()> {
        self.with(|controller| controller.set_enable(enabled, name))
    }

    /// Sets every channel to zero power and disables it.
    pub fn all_off(&self) -> Result<()> {
        self.with(|controller| controller.all_off())
    }

    /// Snapshot of the mirrored state.
    pub fn state(&self) -> Result<DeviceState> {
        self.with(|controller| Ok(*controller.state()))
    }

    /// Channel names in slot order.
    pub fn names(&self) -> Result<Vec<String>> {
        self.with(|controller| Ok(controller.registry().names().map(String::from).collect()))
    }

    /// Closes the controller for every clone of this handle.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] if it was already closed, otherwise the result of
    /// [`Controller::close`].
    pub fn close(&self) -> Result<()> {
        let controller = self.lock().take().ok_or(Error::Closed)?;
        controller.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerOptions;
    use crate::mock::MockDevice;
    use crate::protocol::Slot;
    use assert_matches::assert_matches;

    fn connect(device: &MockDevice) -> SafeController<crate::mock::MockTransport> {
        let controller = Controller::new(device.transport(), ControllerOptions::default()).unwrap();
        SafeController::new(controller)
    }

    #[test]
    fn operations_from_several_threads() {
        let device = MockDevice::new();
        let spx = connect(&device);
        let names = spx.names().unwrap();

        let handles: Vec<_> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let spx = spx.clone();
                std::thread::spawn(move || {
                    spx.set_power(10.0 * i as f64, &name).unwrap();
                    spx.get_temperature().unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 25.0);
        }

        let state = spx.state().unwrap();
        for (i, slot) in Slot::ALL.iter().enumerate() {
            let expected = PowerLevel::try_from(10.0 * i as f64).unwrap();
            assert_eq!(state.power(*slot), expected);
            assert_eq!(device.dac(*slot), Some(expected.dac()));
        }
        spx.close().unwrap();
    }

    #[test]
    fn second_close_is_an_error() {
        let device = MockDevice::new();
        let spx = connect(&device);
        let other = SafeController::from_shared(spx.clone_shared());

        spx.set_enable(true, "395").unwrap();
        other.close().unwrap();
        assert_eq!(device.enable_code(), Some(127));
        assert_matches!(spx.close(), Err(Error::Closed));
        assert_matches!(spx.set_power(1.0, "395"), Err(Error::Closed));
        assert_matches!(spx.all_off(), Err(Error::Closed));
        assert_eq!(device.close_count(), 1);
    }
}
