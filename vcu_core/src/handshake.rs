//! Motor controller start-up sequence gating all torque.

use crate::config::HandshakeCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandshakeStage {
    #[default]
    Idle,
    LockoutActive,
    WaitingForReadySignal,
    InverterEnabling,
    SoundPlaying,
    Driving,
}

impl HandshakeStage {
    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeStage::Idle => "idle",
            HandshakeStage::LockoutActive => "lockout_active",
            HandshakeStage::WaitingForReadySignal => "waiting_for_ready",
            HandshakeStage::InverterEnabling => "inverter_enabling",
            HandshakeStage::SoundPlaying => "sound_playing",
            HandshakeStage::Driving => "driving",
        }
    }

    /// Inverter-enable bit carried in the control frame for this stage.
    pub fn inverter_enable(self) -> bool {
        matches!(
            self,
            HandshakeStage::InverterEnabling | HandshakeStage::SoundPlaying | HandshakeStage::Driving
        )
    }

    pub fn motor_relay(self) -> bool {
        self != HandshakeStage::Idle
    }

    pub fn torque_allowed(self) -> bool {
        self == HandshakeStage::Driving
    }
}

impl std::fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the state machine looks at each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandshakeInputs {
    pub hvil: bool,
    pub lockout_disabled: bool,
    pub inverter_enabled: bool,
    pub ready_pressed: bool,
    pub throttle: f32,
}

/// Commands for this cycle after the transition (if any) was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOutput {
    pub stage: HandshakeStage,
    pub changed: bool,
    pub motor_relay: bool,
    pub inverter_enable: bool,
    /// Start the ready-to-drive sound this cycle.
    pub start_rtds: bool,
}

#[derive(Debug, Clone)]
pub struct HandshakeStateMachine {
    cfg: HandshakeCfg,
    stage: HandshakeStage,
}

impl HandshakeStateMachine {
    pub fn new(cfg: HandshakeCfg) -> Self {
        Self {
            cfg,
            stage: HandshakeStage::Idle,
        }
    }

    pub fn stage(&self) -> HandshakeStage {
        self.stage
    }

    pub fn cfg(&self) -> &HandshakeCfg {
        &self.cfg
    }

    /// Take at most one transition. Interlock loss beats everything.
    pub fn step(&mut self, i: &HandshakeInputs) -> HandshakeOutput {
        use HandshakeStage::*;
        let from = self.stage;
        let to = if !i.hvil {
            Idle
        } else {
            match from {
                Idle => LockoutActive,
                LockoutActive if i.lockout_disabled => WaitingForReadySignal,
                WaitingForReadySignal
                    if i.ready_pressed && i.throttle < self.cfg.ready_throttle_max =>
                {
                    InverterEnabling
                }
                InverterEnabling if i.inverter_enabled => SoundPlaying,
                SoundPlaying => Driving,
                s => s,
            }
        };
        self.stage = to;
        let changed = from != to;
        if changed {
            if to == Idle {
                tracing::warn!(from = %from, "interlock open, handshake reset");
            } else {
                tracing::info!(from = %from, to = %to, "handshake stage");
            }
        }
        HandshakeOutput {
            stage: to,
            changed,
            motor_relay: to.motor_relay(),
            inverter_enable: to.inverter_enable(),
            start_rtds: changed && to == SoundPlaying,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HandshakeStage::*;

    fn hv() -> HandshakeInputs {
        HandshakeInputs {
            hvil: true,
            ..Default::default()
        }
    }

    #[test]
    fn lockout_waits_for_confirmation() {
        let mut m = HandshakeStateMachine::new(HandshakeCfg::default());
        let o = m.step(&hv());
        assert_eq!(o.stage, LockoutActive);
        assert!(o.motor_relay && !o.inverter_enable);
        assert_eq!(m.step(&hv()).stage, LockoutActive);
    }

    #[test]
    fn ready_ignored_with_throttle_pressed() {
        let mut m = HandshakeStateMachine::new(HandshakeCfg::default());
        let i = HandshakeInputs {
            lockout_disabled: true,
            ready_pressed: true,
            throttle: 0.06,
            ..hv()
        };
        m.step(&i);
        assert_eq!(m.step(&i).stage, WaitingForReadySignal);
        assert_eq!(m.step(&i).stage, WaitingForReadySignal);
        let o = m.step(&HandshakeInputs { throttle: 0.0, ..i });
        assert_eq!(o.stage, InverterEnabling);
        assert!(o.inverter_enable);
    }

    #[test]
    fn one_transition_per_cycle_and_sound_once() {
        let mut m = HandshakeStateMachine::new(HandshakeCfg::default());
        let all = HandshakeInputs {
            hvil: true,
            lockout_disabled: true,
            inverter_enabled: true,
            ready_pressed: true,
            throttle: 0.0,
        };
        let stages: Vec<_> = (0..6).map(|_| m.step(&all)).collect();
        let seq: Vec<_> = stages.iter().map(|o| o.stage).collect();
        assert_eq!(
            seq,
            vec![LockoutActive, WaitingForReadySignal, InverterEnabling, SoundPlaying, Driving, Driving]
        );
        assert_eq!(stages.iter().filter(|o| o.start_rtds).count(), 1);
        assert!(stages[3].start_rtds);
    }
}
