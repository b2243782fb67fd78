//! CAN frame value type shared by the core and the IO driver.

use thiserror::Error;

/// Largest identifier representable in an 11-bit standard frame.
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Largest identifier representable in a 29-bit extended frame.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Classic CAN payload capacity.
pub const MAX_DLC: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameFormat {
    Standard,
    Extended,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("identifier {id:#x} does not fit a {format:?} frame")]
    IdOutOfRange { id: u32, format: FrameFormat },
    #[error("payload of {0} bytes exceeds 8")]
    PayloadTooLong(usize),
}

/// Immutable CAN 2.0 data frame.
///
/// Bytes past `len` are always zero so two frames with equal visible
/// payloads compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanFrame {
    id: u32,
    format: FrameFormat,
    len: u8,
    data: [u8; MAX_DLC],
}

impl CanFrame {
    pub fn new(id: u32, format: FrameFormat, payload: &[u8]) -> Result<Self, FrameError> {
        let max = match format {
            FrameFormat::Standard => MAX_STANDARD_ID,
            FrameFormat::Extended => MAX_EXTENDED_ID,
        };
        if id > max {
            return Err(FrameError::IdOutOfRange { id, format });
        }
        if payload.len() > MAX_DLC {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        let mut data = [0u8; MAX_DLC];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            format,
            len: payload.len() as u8,
            data,
        })
    }

    /// Standard (11-bit) frame.
    pub fn standard(id: u16, payload: &[u8]) -> Result<Self, FrameError> {
        Self::new(u32::from(id), FrameFormat::Standard, payload)
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    #[inline]
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Visible payload (`len` bytes).
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Full 8-byte buffer, zero padded.
    #[inline]
    pub fn raw_data(&self) -> &[u8; MAX_DLC] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_standard_id_above_11_bits() {
        let err = CanFrame::new(0x800, FrameFormat::Standard, &[]).unwrap_err();
        assert!(matches!(err, FrameError::IdOutOfRange { id: 0x800, .. }));
        assert!(CanFrame::new(0x800, FrameFormat::Extended, &[]).is_ok());
    }

    #[test]
    fn rejects_extended_id_above_29_bits() {
        assert!(CanFrame::new(0x2000_0000, FrameFormat::Extended, &[]).is_err());
    }

    #[test]
    fn rejects_oversized_payload() {
        let err = CanFrame::standard(0x10, &[0; 9]).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLong(9));
    }

    #[test]
    fn short_payload_is_zero_padded() {
        let f = CanFrame::standard(0x623, &[1, 2, 3]).unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f.data(), &[1, 2, 3]);
        assert_eq!(f.raw_data(), &[1, 2, 3, 0, 0, 0, 0, 0]);
    }
}
