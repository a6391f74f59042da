//! Driver for the ams TSL2591 light-to-digital sensor.
//!
//! The driver talks to the chip through any [`embedded_hal::i2c::I2c`] bus and
//! converts the two photodiode channels (full spectrum and infrared) to lux.
//!
//! ```no_run
//! # fn demo<I: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs>(i2c: I, delay: D)
//! #     -> Result<(), tsl2591::Error<I::Error>> {
//! use tsl2591::{Gain, IntegrationTime, TSL2591};
//!
//! let mut tsl = TSL2591::new(i2c, delay, 0x29, IntegrationTime::_200ms, Gain::Medium)?;
//! let (full, ir) = tsl.get_full_luminosity()?;
//! let lux = tsl.calculate_lux(full, ir);
//! # let _ = lux;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), no_std)]

pub mod helpers;
pub mod tsl2591;

pub use tsl2591::{
    is_saturated, lux, Channel, Command, Config, Error, Gain, IntegrationTime, PowerState,
    Register, DEFAULT_ADDRESS, DEVICE_ID, OVERFLOW, TSL2591,
};
