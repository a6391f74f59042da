use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{ErrorType, I2c, SevenBitAddress};
use log::{debug, trace, warn};

use crate::helpers::median_buffer::RunningMedianBuffer;
use crate::tsl2591::{
    is_saturated, lux, Channel, Config, Error, Gain, IntegrationTime, PowerState, DEVICE_ID,
    TSL2591,
};

/// Register offsets, OR'd with [`Command::NORMAL`] on the wire.
pub struct Register;
impl Register {
    pub const ENABLE: u8 = 0x00;
    pub const CONTROL: u8 = 0x01;
    pub const ID: u8 = 0x12;
    pub const CHAN0_LOW: u8 = 0x14;
    pub const CHAN1_LOW: u8 = 0x16;
}

/// Command byte bits and register values.
pub struct Command;
impl Command {
    /// bits 7 and 5 for 'command normal'
    pub const NORMAL: u8 = 0xA0;

    pub const ENABLE_POWERON: u8 = 0x01;
    pub const ENABLE_POWEROFF: u8 = 0x00;
    pub const ENABLE_AEN: u8 = 0x02;
    pub const ENABLE_AIEN: u8 = 0x10;

    pub const CONTROL_RESET: u8 = 0x80;
}

type Result<T, I2C> = core::result::Result<T, Error<<I2C as ErrorType>::Error>>;

impl<I2C, D> TSL2591<I2C, D>
where
    I2C: I2c<SevenBitAddress>,
    D: DelayNs,
{
    /// Bind the driver to a bus, write the configuration and power the chip off.
    pub fn new(
        i2c: I2C,
        delay: D,
        address: u8,
        integration_time: IntegrationTime,
        gain: Gain,
    ) -> Result<Self, I2C> {
        let mut tsl = TSL2591 {
            i2c,
            delay,
            address,
            integration_time,
            gain,
            power: PowerState::Off,
        };
        tsl.set_timing(integration_time)?;
        tsl.set_gain(gain)?;
        // to be sure
        tsl.disable()?;
        debug!(
            "TSL2591 at 0x{address:02X} ready: {} ms, {}x",
            integration_time.as_ms(),
            gain.multiplier()
        );
        Ok(tsl)
    }

    pub fn from_config(i2c: I2C, delay: D, config: Config) -> Result<Self, I2C> {
        Self::new(
            i2c,
            delay,
            config.address,
            config.integration_time,
            config.gain,
        )
    }

    /// Default address, 100 ms, low gain.
    pub fn with_defaults(i2c: I2C, delay: D) -> Result<Self, I2C> {
        Self::from_config(i2c, delay, Config::default())
    }

    /// Release the bus and delay provider.
    pub fn destroy(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn integration_time(&self) -> IntegrationTime {
        self.integration_time
    }

    pub fn gain(&self) -> Gain {
        self.gain
    }

    pub fn power_state(&self) -> PowerState {
        self.power
    }

    /// The stored value only changes once the chip accepted the CONTROL write.
    pub fn set_timing(&mut self, integration_time: IntegrationTime) -> Result<(), I2C> {
        self.powered(|tsl| {
            tsl.write_control(integration_time, tsl.gain)?;
            tsl.integration_time = integration_time;
            Ok(())
        })
    }

    pub fn set_gain(&mut self, gain: Gain) -> Result<(), I2C> {
        self.powered(|tsl| {
            tsl.write_control(tsl.integration_time, gain)?;
            tsl.gain = gain;
            Ok(())
        })
    }

    /// Power on with the ADC and its interrupt enabled.
    pub fn enable(&mut self) -> Result<(), I2C> {
        self.write_register(
            Register::ENABLE,
            Command::ENABLE_POWERON | Command::ENABLE_AEN | Command::ENABLE_AIEN,
        )?;
        self.power = PowerState::On;
        trace!("TSL2591 powered on");
        Ok(())
    }

    pub fn disable(&mut self) -> Result<(), I2C> {
        self.write_register(Register::ENABLE, Command::ENABLE_POWEROFF)?;
        self.power = PowerState::Off;
        trace!("TSL2591 powered off");
        Ok(())
    }

    /// Soft-reset the chip, then write the stored configuration back.
    pub fn reset(&mut self) -> Result<(), I2C> {
        self.powered(|tsl| tsl.write_register(Register::CONTROL, Command::CONTROL_RESET))?;
        debug!("TSL2591 reset, restoring configuration");
        self.set_timing(self.integration_time)
    }

    pub fn read_device_id(&mut self) -> Result<u8, I2C> {
        let mut data = [0; 1];
        self.i2c
            .write_read(self.address, &[Command::NORMAL | Register::ID], &mut data)?;
        Ok(data[0])
    }

    /// Fail with [`Error::UnexpectedDeviceId`] unless the ID register reads 0x50.
    pub fn check_device_id(&mut self) -> Result<(), I2C> {
        match self.read_device_id()? {
            DEVICE_ID => Ok(()),
            other => Err(Error::UnexpectedDeviceId(other)),
        }
    }

    /// Run one measurement cycle and return `(full, ir)`.
    ///
    /// Blocks for [`IntegrationTime::measurement_delay_ms`].
    pub fn get_full_luminosity(&mut self) -> Result<(u16, u16), I2C> {
        let (full, ir) = self.powered(|tsl| {
            // Wait for the ADC to complete
            tsl.delay.delay_ms(tsl.integration_time.measurement_delay_ms());
            let ir = tsl.read_word(Register::CHAN1_LOW)?;
            let full = tsl.read_word(Register::CHAN0_LOW)?;
            Ok((full, ir))
        })?;
        trace!("TSL2591 raw reading: full={full}, ir={ir}");
        Ok((full, ir))
    }

    pub fn get_luminosity(&mut self, channel: Channel) -> Result<u16, I2C> {
        let (full, ir) = self.get_full_luminosity()?;
        Ok(channel.select(full, ir))
    }

    /// Like [`Self::get_luminosity`] for a raw selector code; unknown codes give 0.
    pub fn get_luminosity_raw(&mut self, channel: u8) -> Result<u16, I2C> {
        let (full, ir) = self.get_full_luminosity()?;
        Ok(Channel::from_raw(channel).map_or(0, |c| c.select(full, ir)))
    }

    /// Convert counts to lux using the current gain and integration time.
    pub fn calculate_lux(&self, full: u16, ir: u16) -> f64 {
        lux::calculate(full, ir, self.integration_time.bits(), self.gain.bits())
    }

    /// Measure and convert. A saturated reading yields 0.
    pub fn read_lux(&mut self) -> Result<f64, I2C> {
        let (full, ir) = self.get_full_luminosity()?;
        if is_saturated(full, ir) {
            warn!(
                "TSL2591 saturated (full={full}, ir={ir}) at {}x gain",
                self.gain.multiplier()
            );
        }
        Ok(self.calculate_lux(full, ir))
    }

    /// Median of `N` consecutive lux readings, saturated ones skipped.
    ///
    /// Returns `None` when every reading saturated.
    pub fn sample_median_lux<const N: usize>(&mut self) -> Result<Option<f64>, I2C> {
        let mut buffer = RunningMedianBuffer::<N>::new();
        for i in 0..N {
            let (full, ir) = self.get_full_luminosity()?;
            if is_saturated(full, ir) {
                warn!("TSL2591 sample {} of {N} saturated, skipping", i + 1);
                continue;
            }
            buffer.push(self.calculate_lux(full, ir));
        }
        Ok(buffer.median())
    }

    /// Run `op` with the chip powered on and power it off afterwards, also
    /// when `op` failed. The error of `op` wins over a failed power-off.
    fn powered<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T, I2C>) -> Result<T, I2C> {
        self.enable()?;
        match op(self) {
            Ok(value) => {
                self.disable()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(off) = self.disable() {
                    warn!("TSL2591 power-off after failed operation also failed: {off:?}");
                }
                Err(e)
            }
        }
    }

    fn write_control(
        &mut self,
        integration_time: IntegrationTime,
        gain: Gain,
    ) -> Result<(), I2C> {
        let control = integration_time.bits() | gain.bits();
        debug!(
            "TSL2591 control=0x{control:02X} ({} ms, {}x)",
            integration_time.as_ms(),
            gain.multiplier()
        );
        self.write_register(Register::CONTROL, control)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), I2C> {
        trace!("TSL2591 write 0x{register:02X} <- 0x{value:02X}");
        self.i2c
            .write(self.address, &[Command::NORMAL | register, value])
            .map_err(Error::I2C)
    }

    fn read_word(&mut self, register: u8) -> Result<u16, I2C> {
        let mut data = [0; 2];
        self.i2c
            .write_read(self.address, &[Command::NORMAL | register], &mut data)
            .map_err(Error::I2C)
            .and(Ok(u16::from(data[0]) | u16::from(data[1]) << 8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tsl2591::DEFAULT_ADDRESS;
    use embedded_hal::i2c::ErrorKind;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction};

    const ADDR: u8 = DEFAULT_ADDRESS;
    const ENABLE: u8 = Command::NORMAL | Register::ENABLE;
    const CONTROL: u8 = Command::NORMAL | Register::CONTROL;
    const POWER_ON: u8 = 0x13;
    const POWER_OFF: u8 = 0x00;

    /// Records every requested delay instead of sleeping.
    #[derive(Debug, Default)]
    struct RecordingDelay {
        total_ns: u64,
        calls: usize,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
            self.calls += 1;
        }
    }

    fn on() -> Transaction {
        Transaction::write(ADDR, vec![ENABLE, POWER_ON])
    }

    fn off() -> Transaction {
        Transaction::write(ADDR, vec![ENABLE, POWER_OFF])
    }

    fn control(value: u8) -> Transaction {
        Transaction::write(ADDR, vec![CONTROL, value])
    }

    fn init_sequence(it: IntegrationTime, gain: Gain) -> Vec<Transaction> {
        vec![
            on(),
            control(it.bits() | gain.bits()),
            off(),
            on(),
            control(it.bits() | gain.bits()),
            off(),
            off(),
        ]
    }

    fn measurement(full: u16, ir: u16) -> Vec<Transaction> {
        vec![
            on(),
            Transaction::write_read(ADDR, vec![0xB6], ir.to_le_bytes().to_vec()),
            Transaction::write_read(ADDR, vec![0xB4], full.to_le_bytes().to_vec()),
            off(),
        ]
    }

    fn driver(extra: Vec<Transaction>) -> TSL2591<I2cMock, RecordingDelay> {
        let mut expectations = init_sequence(IntegrationTime::_100ms, Gain::Low);
        expectations.extend(extra);
        TSL2591::with_defaults(I2cMock::new(&expectations), RecordingDelay::default()).unwrap()
    }

    fn finish(tsl: TSL2591<I2cMock, RecordingDelay>) -> RecordingDelay {
        assert_eq!(tsl.power_state(), PowerState::Off);
        let (mut i2c, delay) = tsl.destroy();
        i2c.done();
        delay
    }

    #[test]
    fn construction_writes_config_and_powers_off() {
        let expectations = init_sequence(IntegrationTime::_300ms, Gain::High);
        let tsl = TSL2591::new(
            I2cMock::new(&expectations),
            RecordingDelay::default(),
            ADDR,
            IntegrationTime::_300ms,
            Gain::High,
        )
        .unwrap();
        assert_eq!(tsl.integration_time(), IntegrationTime::_300ms);
        assert_eq!(tsl.gain(), Gain::High);
        assert_eq!(tsl.address(), ADDR);
        let delay = finish(tsl);
        assert_eq!(delay.calls, 0);
    }

    #[test]
    fn custom_address_is_used_on_the_bus() {
        let expectations = [
            Transaction::write(0x39, vec![ENABLE, POWER_ON]),
            Transaction::write(0x39, vec![CONTROL, 0x00]),
            Transaction::write(0x39, vec![ENABLE, POWER_OFF]),
            Transaction::write(0x39, vec![ENABLE, POWER_ON]),
            Transaction::write(0x39, vec![CONTROL, 0x00]),
            Transaction::write(0x39, vec![ENABLE, POWER_OFF]),
            Transaction::write(0x39, vec![ENABLE, POWER_OFF]),
        ];
        let config = Config::default().with_address(0x39);
        let tsl = TSL2591::from_config(
            I2cMock::new(&expectations),
            RecordingDelay::default(),
            config,
        )
        .unwrap();
        finish(tsl);
    }

    #[test]
    fn set_timing_keeps_gain_and_powers_off() {
        let mut tsl = driver(vec![on(), control(0x05), off()]);
        tsl.set_timing(IntegrationTime::_600ms).unwrap();
        assert_eq!(tsl.integration_time(), IntegrationTime::_600ms);
        finish(tsl);
    }

    #[test]
    fn set_gain_keeps_timing_and_powers_off() {
        let mut tsl = driver(vec![
            on(),
            control(0x02),
            off(),
            on(),
            control(0x02 | 0x30),
            off(),
        ]);
        tsl.set_timing(IntegrationTime::_300ms).unwrap();
        tsl.set_gain(Gain::Maximum).unwrap();
        assert_eq!(tsl.gain(), Gain::Maximum);
        finish(tsl);
    }

    #[test]
    fn full_luminosity_reads_ir_first() {
        let mut tsl = driver(measurement(0x1234, 0x0102));
        assert_eq!(tsl.get_full_luminosity().unwrap(), (0x1234, 0x0102));
        let delay = finish(tsl);
        assert!(delay.calls >= 1);
        assert_eq!(delay.total_ns, 1_000 * 1_000_000);
    }

    #[test]
    fn measurement_delay_scales_with_code() {
        let mut expectations = vec![on(), control(0x04), off()];
        expectations.extend(measurement(10, 5));
        let mut tsl = driver(expectations);
        tsl.set_timing(IntegrationTime::_500ms).unwrap();
        tsl.get_full_luminosity().unwrap();
        let delay = finish(tsl);
        assert_eq!(delay.total_ns, (120 * 4 + 1_000) * 1_000_000);
    }

    #[test]
    fn luminosity_channels() {
        let mut expectations = measurement(900, 300);
        expectations.extend(measurement(900, 300));
        expectations.extend(measurement(900, 300));
        let mut tsl = driver(expectations);
        assert_eq!(tsl.get_luminosity(Channel::FullSpectrum).unwrap(), 900);
        assert_eq!(tsl.get_luminosity(Channel::Infrared).unwrap(), 300);
        assert_eq!(tsl.get_luminosity(Channel::Visible).unwrap(), 600);
        finish(tsl);
    }

    #[test]
    fn full_spectrum_is_not_zero() {
        let mut tsl = driver(measurement(4321, 1234));
        assert_eq!(tsl.get_luminosity_raw(0).unwrap(), 4321);
        finish(tsl);
    }

    #[test]
    fn unknown_channel_still_measures_and_returns_zero() {
        let mut tsl = driver(measurement(4321, 1234));
        assert_eq!(tsl.get_luminosity_raw(7).unwrap(), 0);
        finish(tsl);
    }

    #[test]
    fn visible_does_not_underflow() {
        let mut tsl = driver(measurement(10, 20));
        assert_eq!(tsl.get_luminosity(Channel::Visible).unwrap(), 0);
        finish(tsl);
    }

    #[test]
    fn lux_follows_stored_settings() {
        let mut tsl = driver(vec![
            on(),
            control(0x01),
            off(),
            on(),
            control(0x01 | 0x10),
            off(),
        ]);
        let before = tsl.calculate_lux(10_000, 5_000);
        tsl.set_timing(IntegrationTime::_200ms).unwrap();
        tsl.set_gain(Gain::Medium).unwrap();
        let after = tsl.calculate_lux(10_000, 5_000);
        assert!((before / after - 50.0).abs() < 1e-9);
        assert_eq!(after, lux::calculate(10_000, 5_000, 0x01, 0x10));
        finish(tsl);
    }

    #[test]
    fn read_lux_saturated_is_zero() {
        let mut tsl = driver(measurement(0xFFFF, 0x8000));
        assert_eq!(tsl.read_lux().unwrap(), 0.0);
        finish(tsl);
    }

    #[test]
    fn read_lux_converts() {
        let mut tsl = driver(measurement(10_000, 5_000));
        let lux = tsl.read_lux().unwrap();
        assert!((lux - 7_344.0).abs() < 1e-6, "got {lux}");
        finish(tsl);
    }

    #[test]
    fn median_skips_saturated_samples() {
        let mut expectations = measurement(1_000, 0);
        expectations.extend(measurement(0xFFFF, 0));
        expectations.extend(measurement(3_000, 0));
        let mut tsl = driver(expectations);
        let median = tsl.sample_median_lux::<3>().unwrap().unwrap();
        let expected = (tsl.calculate_lux(1_000, 0) + tsl.calculate_lux(3_000, 0)) / 2.0;
        assert!((median - expected).abs() < 1e-9);
        finish(tsl);
    }

    #[test]
    fn median_of_only_saturated_samples_is_none() {
        let mut tsl = driver(measurement(0xFFFF, 0xFFFF));
        assert_eq!(tsl.sample_median_lux::<1>().unwrap(), None);
        finish(tsl);
    }

    #[test]
    fn reset_restores_configuration() {
        let mut tsl = driver(vec![
            on(),
            control(Command::CONTROL_RESET),
            off(),
            on(),
            control(0x00),
            off(),
        ]);
        tsl.reset().unwrap();
        finish(tsl);
    }

    #[test]
    fn device_id_check() {
        let mut tsl = driver(vec![
            Transaction::write_read(ADDR, vec![0xB2], vec![0x50]),
            Transaction::write_read(ADDR, vec![0xB2], vec![0x28]),
        ]);
        assert_eq!(tsl.check_device_id(), Ok(()));
        assert_eq!(tsl.check_device_id(), Err(Error::UnexpectedDeviceId(0x28)));
        finish(tsl);
    }

    #[test]
    fn failed_read_still_powers_off() {
        let mut tsl = driver(vec![
            on(),
            Transaction::write_read(ADDR, vec![0xB6], vec![0, 0]).with_error(ErrorKind::Other),
            off(),
        ]);
        assert_eq!(
            tsl.get_full_luminosity(),
            Err(Error::I2C(ErrorKind::Other))
        );
        finish(tsl);
    }

    #[test]
    fn failed_power_off_keeps_the_read_error() {
        let mut tsl = driver(vec![
            on(),
            Transaction::write_read(ADDR, vec![0xB6], vec![0, 0]).with_error(ErrorKind::Other),
            off().with_error(ErrorKind::Bus),
        ]);
        assert_eq!(
            tsl.get_full_luminosity(),
            Err(Error::I2C(ErrorKind::Other))
        );
        assert_eq!(tsl.power_state(), PowerState::On);
        let (mut i2c, _) = tsl.destroy();
        i2c.done();
    }

    #[test]
    fn rejected_gain_write_keeps_old_gain() {
        let mut tsl = driver(vec![
            on(),
            control(0x30).with_error(ErrorKind::Other),
            off(),
        ]);
        let before = tsl.calculate_lux(10_000, 5_000);
        assert_eq!(
            tsl.set_gain(Gain::Maximum),
            Err(Error::I2C(ErrorKind::Other))
        );
        assert_eq!(tsl.gain(), Gain::Low);
        assert_eq!(tsl.calculate_lux(10_000, 5_000), before);
        assert!((before - 7_344.0).abs() < 1e-6);
        finish(tsl);
    }

    #[test]
    fn rejected_timing_write_keeps_old_timing() {
        let mut tsl = driver(vec![
            on(),
            control(0x05).with_error(ErrorKind::Other),
            off(),
        ]);
        assert!(tsl.set_timing(IntegrationTime::_600ms).is_err());
        assert_eq!(tsl.integration_time(), IntegrationTime::_100ms);
        finish(tsl);
    }
}
