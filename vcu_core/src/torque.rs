//! Pedal → torque command → `0xC0` control frame.
//!
//! Layout (8 bytes): 0–1 torque dNm LE, 2–3 zero, 4 direction, 5 bit0
//! inverter enable / bit1 discharge enable, 6–7 zero.

use vcu_traits::{CanFrame, FrameError};

use crate::config::{Direction, TorqueCfg};
use crate::fixed_point::{dnm_to_nm, quantize_to_dnm_i16};
use crate::handshake::HandshakeStage;

pub const CONTROL_FRAME_ID: u16 = 0xC0;

const ENABLE_BIT: u8 = 0x01;
const DISCHARGE_BIT: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TorqueCommand {
    pub torque_dnm: i16,
    /// Configured ceiling; not carried on the wire.
    pub torque_limit_dnm: i16,
    pub direction: Direction,
    pub inverter_enable: bool,
    pub discharge_enable: bool,
    /// Commands computed since the last successful send.
    pub updates_since_send: u32,
}

impl TorqueCommand {
    pub fn torque_nm(&self) -> f32 {
        dnm_to_nm(self.torque_dnm)
    }

    pub fn payload(&self) -> [u8; 8] {
        let mut p = [0u8; 8];
        p[0..2].copy_from_slice(&self.torque_dnm.to_le_bytes());
        p[4] = self.direction.wire();
        p[5] = (if self.inverter_enable { ENABLE_BIT } else { 0 })
            | (if self.discharge_enable { DISCHARGE_BIT } else { 0 });
        p
    }

    pub fn encode(&self) -> Result<CanFrame, FrameError> {
        CanFrame::standard(CONTROL_FRAME_ID, &self.payload())
    }
}

/// Inverse of [`TorqueCommand::encode`]; `None` for any other identifier or a
/// short payload.
pub fn decode_control_frame(frame: &CanFrame) -> Option<TorqueCommand> {
    if frame.id() != u32::from(CONTROL_FRAME_ID) || frame.len() < 6 {
        return None;
    }
    let d = frame.data();
    Some(TorqueCommand {
        torque_dnm: i16::from_le_bytes([d[0], d[1]]),
        torque_limit_dnm: 0,
        direction: Direction::from_wire(d[4]),
        inverter_enable: d[5] & ENABLE_BIT != 0,
        discharge_enable: d[5] & DISCHARGE_BIT != 0,
        updates_since_send: 0,
    })
}

#[derive(Debug, Clone)]
pub struct TorqueCommandPipeline {
    cfg: TorqueCfg,
    current: TorqueCommand,
}

impl TorqueCommandPipeline {
    pub fn new(cfg: TorqueCfg) -> Self {
        Self {
            cfg,
            current: TorqueCommand {
                torque_limit_dnm: quantize_to_dnm_i16(cfg.max_torque_nm),
                direction: cfg.direction,
                ..TorqueCommand::default()
            },
        }
    }

    /// `clamp(pedal) × max torque × multiplier`, zero outside `Driving`.
    pub fn compute(&mut self, pedal: f32, multiplier: f32, stage: HandshakeStage) -> &TorqueCommand {
        let nm = if stage.torque_allowed() {
            let p = if pedal.is_nan() { 0.0 } else { pedal.clamp(0.0, 1.0) };
            let m = if multiplier.is_nan() { 0.0 } else { multiplier.clamp(0.0, 1.0) };
            p * self.cfg.max_torque_nm * m
        } else {
            0.0
        };
        let c = &mut self.current;
        c.torque_dnm = quantize_to_dnm_i16(nm);
        c.direction = self.cfg.direction;
        c.inverter_enable = stage.inverter_enable();
        c.discharge_enable = false;
        c.updates_since_send = c.updates_since_send.saturating_add(1);
        &self.current
    }

    pub fn current(&self) -> &TorqueCommand {
        &self.current
    }

    pub fn mark_sent(&mut self) {
        self.current.updates_since_send = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_bit_exact() {
        let cmd = TorqueCommand {
            torque_dnm: -2,
            direction: Direction::Reverse,
            inverter_enable: true,
            discharge_enable: true,
            ..Default::default()
        };
        assert_eq!(cmd.payload(), [0xFE, 0xFF, 0, 0, 0, 0x03, 0, 0]);
        let f = cmd.encode().unwrap();
        assert_eq!(f.id(), 0xC0);
        assert_eq!(f.len(), 8);
    }

    #[test]
    fn no_torque_outside_driving() {
        let mut p = TorqueCommandPipeline::new(TorqueCfg::default());
        for stage in [
            HandshakeStage::Idle,
            HandshakeStage::LockoutActive,
            HandshakeStage::WaitingForReadySignal,
            HandshakeStage::InverterEnabling,
            HandshakeStage::SoundPlaying,
        ] {
            assert_eq!(p.compute(1.0, 1.0, stage).torque_dnm, 0);
        }
        assert_eq!(p.compute(1.0, 1.0, HandshakeStage::Driving).torque_dnm, 1000);
    }

    #[test]
    fn pedal_and_multiplier_are_clamped() {
        let mut p = TorqueCommandPipeline::new(TorqueCfg::default());
        assert_eq!(p.compute(1.7, 0.5, HandshakeStage::Driving).torque_dnm, 500);
        assert_eq!(p.compute(-0.2, 1.0, HandshakeStage::Driving).torque_dnm, 0);
        assert_eq!(p.compute(0.5, f32::NAN, HandshakeStage::Driving).torque_dnm, 0);
    }

    #[test]
    fn update_counter_resets_on_send() {
        let mut p = TorqueCommandPipeline::new(TorqueCfg::default());
        p.compute(0.0, 1.0, HandshakeStage::Idle);
        p.compute(0.0, 1.0, HandshakeStage::Idle);
        assert_eq!(p.current().updates_since_send, 2);
        p.mark_sent();
        assert_eq!(p.current().updates_since_send, 0);
    }

    #[test]
    fn foreign_frames_do_not_decode() {
        assert!(decode_control_frame(&CanFrame::standard(0xC1, &[0; 8]).unwrap()).is_none());
        assert!(decode_control_frame(&CanFrame::standard(0xC0, &[0; 4]).unwrap()).is_none());
    }
}
