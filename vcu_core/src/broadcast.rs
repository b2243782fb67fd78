//! Raw sensor broadcast on the logging channel, identifiers `base + 0..=0xA`.

use vcu_traits::CanFrame;

/// Number of broadcast frames (and identifiers) per cycle.
pub const BROADCAST_FRAMES: u16 = 11;

pub const OFFSET_PEDAL: u16 = 0x0;
pub const OFFSET_BRAKE: u16 = 0x1;
pub const OFFSET_WHEEL_SPEED: u16 = 0x2;
pub const OFFSET_SUSPENSION: u16 = 0x6;
pub const OFFSET_LV_BATTERY: u16 = 0xA;

/// Last raw readings of everything broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorSnapshot {
    pub tps: [u16; 2],
    pub bps: [u16; 2],
    pub wheel_speed: [u16; 4],
    pub suspension: [u16; 4],
    pub lv_battery_mv: u16,
}

fn le_pair(a: u16, b: u16) -> [u8; 4] {
    let (a, b) = (a.to_le_bytes(), b.to_le_bytes());
    [a[0], a[1], b[0], b[1]]
}

/// Frames in offset order. Identifiers that would not fit 11 bits are
/// skipped; the builder rejects such bases up front.
pub fn broadcast_frames(base_id: u16, s: &SensorSnapshot) -> Vec<CanFrame> {
    let mut out = Vec::with_capacity(usize::from(BROADCAST_FRAMES));
    let mut push = |offset: u16, payload: &[u8]| {
        if let Ok(f) = CanFrame::standard(base_id.saturating_add(offset), payload) {
            out.push(f);
        }
    };
    push(OFFSET_PEDAL, &le_pair(s.tps[0], s.tps[1]));
    push(OFFSET_BRAKE, &le_pair(s.bps[0], s.bps[1]));
    for (i, v) in s.wheel_speed.iter().enumerate() {
        push(OFFSET_WHEEL_SPEED + i as u16, &v.to_le_bytes());
    }
    for (i, v) in s.suspension.iter().enumerate() {
        push(OFFSET_SUSPENSION + i as u16, &v.to_le_bytes());
    }
    push(OFFSET_LV_BATTERY, &s.lv_battery_mv.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eleven_frames_little_endian() {
        let s = SensorSnapshot {
            tps: [0x0102, 0x0304],
            bps: [1, 2],
            wheel_speed: [10, 11, 12, 13],
            suspension: [20, 21, 22, 23],
            lv_battery_mv: 13_500,
        };
        let frames = broadcast_frames(0x500, &s);
        let ids: Vec<u32> = frames.iter().map(|f| f.id()).collect();
        assert_eq!(ids, (0x500..=0x50A).collect::<Vec<u32>>());
        assert_eq!(frames[0].data(), &[0x02, 0x01, 0x04, 0x03]);
        assert_eq!(frames[5].data(), &[13, 0]);
        assert_eq!(frames[10].data(), &13_500u16.to_le_bytes());
    }

    #[test]
    fn ids_past_eleven_bits_are_dropped() {
        let frames = broadcast_frames(0x7FE, &SensorSnapshot::default());
        assert_eq!(frames.len(), 2);
    }
}
