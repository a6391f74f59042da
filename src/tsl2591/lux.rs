//! Counts-to-lux conversion.
//!
//! Coefficients are the vendor calibration used by the Adafruit TSL2591
//! library. The lookups take the raw CONTROL register codes so that a value
//! outside the known tables still produces a number.

use super::is_saturated;

/// Lux device factor
pub const LUX_DF: f64 = 408.0;
/// Channel 0 coefficient
pub const LUX_COEFB: f64 = 1.64;
/// Channel 1 coefficient A
pub const LUX_COEFC: f64 = 0.59;
/// Channel 1 coefficient B
pub const LUX_COEFD: f64 = 0.86;

/// ATIME for an integration time code, 100 for unknown codes.
pub fn atime(code: u8) -> f64 {
    match code {
        0x00 => 100.0,
        0x01 => 200.0,
        0x02 => 300.0,
        0x03 => 400.0,
        0x04 => 500.0,
        0x05 => 600.0,
        _ => 100.0,
    }
}

/// AGAIN for a gain code, 1 for unknown codes.
pub fn again(code: u8) -> f64 {
    match code {
        0x00 => 1.0,
        0x10 => 25.0,
        0x20 => 428.0,
        0x30 => 9876.0,
        _ => 1.0,
    }
}

/// Convert a raw `(full, ir)` pair to lux for the given register codes.
///
/// Returns 0 when either channel overflowed. The result is not clamped and
/// can be negative for noisy inputs.
pub fn calculate(full: u16, ir: u16, integration_code: u8, gain_code: u8) -> f64 {
    if is_saturated(full, ir) {
        return 0.0;
    }

    let cpl = (atime(integration_code) * again(gain_code)) / LUX_DF;
    let full = f64::from(full);
    let ir = f64::from(ir);

    let lux1 = (full - LUX_COEFB * ir) / cpl;
    let lux2 = (LUX_COEFC * full - LUX_COEFD * ir) / cpl;

    // The highest value is the approximate lux equivalent
    f64::max(lux1, lux2)
}
