mod device_impl;
pub mod lux;

pub use device_impl::{Command, Register};

/// All possible errors in this crate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error<E> {
    /// I²C bus error
    I2C(E),
    /// The ID register did not hold the TSL2591 part number
    UnexpectedDeviceId(u8),
}
impl<E> From<E> for Error<E> {
    fn from(other: E) -> Self {
        Error::I2C(other)
    }
}

/// Default 7-bit bus address of the TSL2591.
pub const DEFAULT_ADDRESS: u8 = 0x29;

/// Value of the ID register on a genuine TSL2591.
pub const DEVICE_ID: u8 = 0x50;

/// Sentinel value of a saturated channel.
pub const OVERFLOW: u16 = 0xFFFF;

/// TSL2591 device driver.
///
/// Every public operation leaves the chip powered off. The driver is not
/// reentrant: share it between threads behind a mutex.
#[derive(Debug)]
pub struct TSL2591<I2C, D> {
    /// The concrete I²C device implementation.
    i2c: I2C,
    delay: D,
    address: u8,
    integration_time: IntegrationTime,
    gain: Gain,
    power: PowerState,
}

/// Integration time
///
/// The discriminant is the value written to bits 0-2 of the CONTROL register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IntegrationTime {
    /// 100 ms (default)
    #[default]
    _100ms = 0x00,
    /// 200 ms
    _200ms = 0x01,
    /// 300 ms
    _300ms = 0x02,
    /// 400 ms
    _400ms = 0x03,
    /// 500 ms
    _500ms = 0x04,
    /// 600 ms
    _600ms = 0x05,
}

impl IntegrationTime {
    /// Return the integration time in milliseconds
    pub fn as_ms(&self) -> u16 {
        match self {
            IntegrationTime::_100ms => 100,
            IntegrationTime::_200ms => 200,
            IntegrationTime::_300ms => 300,
            IntegrationTime::_400ms => 400,
            IntegrationTime::_500ms => 500,
            IntegrationTime::_600ms => 600,
        }
    }

    /// Register encoding
    pub fn bits(&self) -> u8 {
        *self as u8
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(IntegrationTime::_100ms),
            0x01 => Some(IntegrationTime::_200ms),
            0x02 => Some(IntegrationTime::_300ms),
            0x03 => Some(IntegrationTime::_400ms),
            0x04 => Some(IntegrationTime::_500ms),
            0x05 => Some(IntegrationTime::_600ms),
            _ => None,
        }
    }

    pub fn from_ms(ms: u16) -> Option<Self> {
        match ms {
            100 => Some(IntegrationTime::_100ms),
            200 => Some(IntegrationTime::_200ms),
            300 => Some(IntegrationTime::_300ms),
            400 => Some(IntegrationTime::_400ms),
            500 => Some(IntegrationTime::_500ms),
            600 => Some(IntegrationTime::_600ms),
            _ => None,
        }
    }

    /// How long a measurement waits for the ADC before reading the channels.
    ///
    /// This is `120 ms * code + 1 s`, not the nominal integration time.
    pub fn measurement_delay_ms(&self) -> u32 {
        INTEGRATION_DELAY_STEP_MS * u32::from(self.bits()) + INTEGRATION_DELAY_BASE_MS
    }
}

const INTEGRATION_DELAY_STEP_MS: u32 = 120;
const INTEGRATION_DELAY_BASE_MS: u32 = 1000;

/// Gain
///
/// The discriminant is the value written to bits 4-5 of the CONTROL register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Gain {
    /// 1x (default)
    #[default]
    Low = 0x00,
    /// 25x
    Medium = 0x10,
    /// 428x
    High = 0x20,
    /// 9876x
    Maximum = 0x30,
}

impl Gain {
    /// Register encoding
    pub fn bits(&self) -> u8 {
        *self as u8
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0x00 => Some(Gain::Low),
            0x10 => Some(Gain::Medium),
            0x20 => Some(Gain::High),
            0x30 => Some(Gain::Maximum),
            _ => None,
        }
    }

    /// Parse the nominal amplification (1, 25, 428 or 9876)
    pub fn from_multiplier(multiplier: u16) -> Option<Self> {
        match multiplier {
            1 => Some(Gain::Low),
            25 => Some(Gain::Medium),
            428 => Some(Gain::High),
            9876 => Some(Gain::Maximum),
            _ => None,
        }
    }

    pub fn multiplier(&self) -> u16 {
        match self {
            Gain::Low => 1,
            Gain::Medium => 25,
            Gain::High => 428,
            Gain::Maximum => 9876,
        }
    }
}

/// Channel selector for [`TSL2591::get_luminosity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    /// Channel 0, visible + infrared
    FullSpectrum = 0,
    /// Channel 1, infrared only
    Infrared = 1,
    /// Channel 0 - channel 1
    Visible = 2,
}

impl Channel {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Channel::FullSpectrum),
            1 => Some(Channel::Infrared),
            2 => Some(Channel::Visible),
            _ => None,
        }
    }

    /// Pick this channel's value out of a `(full, ir)` reading.
    ///
    /// Visible saturates at 0 when the infrared count exceeds the full count.
    pub fn select(&self, full: u16, ir: u16) -> u16 {
        match self {
            Channel::FullSpectrum => full,
            Channel::Infrared => ir,
            Channel::Visible => full.saturating_sub(ir),
        }
    }
}

/// Power state of the chip as last commanded by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    #[default]
    Off,
    On,
}

/// Construction parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub address: u8,
    pub integration_time: IntegrationTime,
    pub gain: Gain,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            integration_time: IntegrationTime::default(),
            gain: Gain::default(),
        }
    }
}

impl Config {
    pub fn with_address(self, address: u8) -> Self {
        Config { address, ..self }
    }
    pub fn with_integration_time(self, integration_time: IntegrationTime) -> Self {
        Config {
            integration_time,
            ..self
        }
    }
    pub fn with_gain(self, gain: Gain) -> Self {
        Config { gain, ..self }
    }
}

/// Whether either channel hit the overflow sentinel
pub fn is_saturated(full: u16, ir: u16) -> bool {
    full == OVERFLOW || ir == OVERFLOW
}
