use crate::clock::Clock;
use crate::error::{CaptureError, Result};
use log::{debug, error};
use rppal::gpio::{Gpio, OutputPin};
use std::time::Duration;

/// A single binary output line switching the light's power relay.
///
/// Control is open loop: nothing reports back whether the relay moved.
pub trait RelayLine {
    /// Drops any previous configuration of the line and sets it up as an
    /// output driven LOW.
    fn configure_low(&mut self) -> Result<()>;
    fn drive(&mut self, high: bool) -> Result<()>;
}

/// Relay wired to a Raspberry Pi GPIO pin, addressed by BCM number.
pub struct GpioRelay {
    bcm_pin: u8,
    pin: Option<OutputPin>,
}

impl GpioRelay {
    pub fn new(bcm_pin: u8) -> Self {
        Self { bcm_pin, pin: None }
    }
}

impl RelayLine for GpioRelay {
    fn configure_low(&mut self) -> Result<()> {
        // releasing the old handle resets the pin before it is claimed again
        self.pin = None;
        let gpio = Gpio::new().map_err(|e| CaptureError::Relay(e.to_string()))?;
        let mut pin = gpio
            .get(self.bcm_pin)
            .map_err(|e| CaptureError::Relay(format!("BCM pin {}: {}", self.bcm_pin, e)))?
            .into_output_low();
        // keep the line LOW after the process exits instead of floating
        pin.set_reset_on_drop(false);
        self.pin = Some(pin);
        Ok(())
    }

    fn drive(&mut self, high: bool) -> Result<()> {
        match self.pin.as_mut() {
            Some(pin) => {
                if high {
                    pin.set_high();
                } else {
                    pin.set_low();
                }
                Ok(())
            }
            None => Err(CaptureError::Relay(format!(
                "BCM pin {} driven before it was configured",
                self.bcm_pin
            ))),
        }
    }
}

/// Exclusive handle on the light.
///
/// Once initialized, dropping the handle drives the line LOW, so the light is
/// left off on every exit path of a run, unwinding included.
pub struct Light<R: RelayLine> {
    line: R,
    lit: bool,
    armed: bool,
}

impl<R: RelayLine> Light<R> {
    pub fn new(line: R) -> Self {
        Self {
            line,
            lit: false,
            armed: false,
        }
    }

    /// Resets the line to a LOW output and blocks for `settle` so the
    /// mechanical switch has finished moving before anything trusts it.
    pub fn initialize<K: Clock>(&mut self, clock: &K, settle: Duration) -> Result<()> {
        debug!("Initializing relay control...");
        self.line.configure_low()?;
        self.lit = false;
        self.armed = true;
        clock.sleep(settle);
        debug!("...relay initialized, light off");
        Ok(())
    }

    pub fn set_light(&mut self, on: bool) -> Result<()> {
        self.line.drive(on)?;
        self.lit = on;
        debug!("Light {}", if on { "on" } else { "off" });
        Ok(())
    }

    /// Drives the line LOW. Safe to call any number of times.
    pub fn force_off(&mut self) -> Result<()> {
        self.line.drive(false)?;
        self.lit = false;
        Ok(())
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    /// Whether the line has been initialized and is now owned by this handle.
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl<R: RelayLine> Drop for Light<R> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.force_off() {
                error!("Could not switch the light off during closeout: {}", e);
            }
        }
    }
}
