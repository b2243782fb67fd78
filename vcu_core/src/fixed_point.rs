//! Fixed-point helpers for on-wire quantities.
//!
//! Torque travels in deci-newton-metres (`i16`, 1 dNm = 0.1 Nm); most MCU
//! telemetry is a big-endian `i16` scaled by 10.

/// Quantize newton-metres to deci-newton-metres, rounding to nearest and
/// clamping to the `i16` range. Non-finite values map to 0.
#[inline]
pub fn quantize_to_dnm_i16(nm: f32) -> i16 {
    if !nm.is_finite() {
        return 0;
    }
    let scaled = (nm * 10.0).round();
    if scaled >= f32::from(i16::MAX) {
        i16::MAX
    } else if scaled <= f32::from(i16::MIN) {
        i16::MIN
    } else {
        scaled as i16
    }
}

#[inline]
pub fn dnm_to_nm(dnm: i16) -> f32 {
    f32::from(dnm) / 10.0
}

/// Scale a wire value carried as tenths.
#[inline]
pub fn tenths(raw: i16) -> f32 {
    f32::from(raw) / 10.0
}

/// Big-endian `u16` at `at`; `None` when the payload stops short of it.
#[inline]
pub fn be_u16(d: &[u8], at: usize) -> Option<u16> {
    match d.get(at..at + 2)? {
        &[hi, lo] => Some(u16::from_be_bytes([hi, lo])),
        _ => None,
    }
}

#[inline]
pub fn be_i16(d: &[u8], at: usize) -> Option<i16> {
    be_u16(d, at).map(|v| i16::from_be_bytes(v.to_be_bytes()))
}

#[inline]
pub fn be_u32(d: &[u8], at: usize) -> Option<u32> {
    match d.get(at..at + 4)? {
        &[a, b, c, e] => Some(u32::from_be_bytes([a, b, c, e])),
        _ => None,
    }
}

#[inline]
pub fn byte(d: &[u8], at: usize) -> Option<u8> {
    d.get(at).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_rounds_and_saturates() {
        assert_eq!(quantize_to_dnm_i16(12.3), 123);
        assert_eq!(quantize_to_dnm_i16(-0.04), 0);
        assert_eq!(quantize_to_dnm_i16(-0.05), -1);
        assert_eq!(quantize_to_dnm_i16(1.0e9), i16::MAX);
        assert_eq!(quantize_to_dnm_i16(f32::NAN), 0);
    }

    #[test]
    fn be_readers_report_short_payloads() {
        let d = [0x01, 0x2C, 0xFF];
        assert_eq!(be_u16(&d, 0), Some(300));
        assert_eq!(be_u16(&d, 2), None);
        assert_eq!(be_i16(&[0xFF, 0x38], 0), Some(-200));
        assert_eq!(be_u32(&[0, 1, 0, 0], 0), Some(65_536));
        assert_eq!(be_u32(&d, 0), None);
        assert_eq!(byte(&d, 2), Some(0xFF));
        assert_eq!(byte(&d, 9), None);
    }
}
