//! `From` implementations bridging `vcu_config` types to `vcu_core` types.

use crate::config::{
    CycleCfg, Direction, HandshakeCfg, PedalSetup, SafetyCfg, SensorSetup, TorqueCfg, VcuSettings,
};
use crate::safety::{DeratePolicy, DischargeLimitDerate, PowerDerate};
use crate::scheduler::{MessageId, ScheduleRule};
use crate::sensor::{Calibration, SensorSpec};

// ── Sensors ──────────────────────────────────────────────────────────────────

impl From<&vcu_config::SensorCfg> for SensorSetup {
    fn from(c: &vcu_config::SensorCfg) -> Self {
        Self {
            spec: SensorSpec {
                spec_min: c.spec_min,
                spec_max: c.spec_max,
                reversed: c.reversed,
            },
            calibration: c.calibration.and_then(|[a, b]| Calibration::new(a, b)),
        }
    }
}

impl From<&vcu_config::SensorsCfg> for PedalSetup {
    fn from(c: &vcu_config::SensorsCfg) -> Self {
        Self {
            tps0: (&c.tps0).into(),
            tps1: (&c.tps1).into(),
            bps0: (&c.bps0).into(),
            bps1: (&c.bps1).into(),
        }
    }
}

// ── Torque ───────────────────────────────────────────────────────────────────

impl From<vcu_config::Direction> for Direction {
    fn from(d: vcu_config::Direction) -> Self {
        match d {
            vcu_config::Direction::Reverse => Direction::Reverse,
            vcu_config::Direction::Forward => Direction::Forward,
        }
    }
}

impl From<&vcu_config::TorqueCfg> for TorqueCfg {
    fn from(c: &vcu_config::TorqueCfg) -> Self {
        Self {
            max_torque_nm: c.max_torque_nm,
            direction: c.direction.into(),
        }
    }
}

// ── Safety ───────────────────────────────────────────────────────────────────

impl From<&vcu_config::Safety> for SafetyCfg {
    fn from(c: &vcu_config::Safety) -> Self {
        Self {
            tps_discrepancy: c.tps_discrepancy,
            implausible_brake: c.implausible_brake,
            implausible_throttle: c.implausible_throttle,
            implausible_clear_throttle: c.implausible_clear_throttle,
            lv_critical_v: c.lv_critical_v,
            lv_low_v: c.lv_low_v,
            lv_hysteresis_v: c.lv_hysteresis_v,
            power_notice_kw: c.power_notice_kw,
            brake_light: c.brake_light,
        }
    }
}

impl From<&vcu_config::DerateCfg> for Box<dyn DeratePolicy> {
    fn from(c: &vcu_config::DerateCfg) -> Self {
        match *c {
            vcu_config::DerateCfg::Power { start_kw, cap_kw } => {
                Box::new(PowerDerate { start_kw, cap_kw })
            }
            vcu_config::DerateCfg::DischargeLimit => Box::new(DischargeLimitDerate),
        }
    }
}

// ── Handshake ────────────────────────────────────────────────────────────────

impl From<&vcu_config::HandshakeCfg> for HandshakeCfg {
    fn from(c: &vcu_config::HandshakeCfg) -> Self {
        Self {
            ready_throttle_max: c.ready_throttle_max,
            rtds_amplitude_pct: c.rtds_amplitude_pct,
            rtds_duration_ms: c.rtds_duration_ms,
        }
    }
}

// ── Schedule ─────────────────────────────────────────────────────────────────

impl From<&vcu_config::ScheduleRuleCfg> for ScheduleRule {
    fn from(c: &vcu_config::ScheduleRuleCfg) -> Self {
        ScheduleRule::new(c.min_interval_ms, c.max_interval_ms, c.required)
    }
}

impl From<&vcu_config::ScheduleRuleCfg> for MessageId {
    fn from(c: &vcu_config::ScheduleRuleCfg) -> Self {
        if c.extended {
            MessageId::extended(c.id)
        } else {
            MessageId::standard(c.id)
        }
    }
}

// ── Whole file ───────────────────────────────────────────────────────────────

impl From<&vcu_config::Config> for VcuSettings {
    fn from(c: &vcu_config::Config) -> Self {
        Self {
            cycle: CycleCfg {
                period_ms: c.cycle.period_ms,
                max_frames_per_cycle: c.cycle.max_frames_per_cycle,
                // validated to fit 11 bits
                broadcast_base_id: u16::try_from(c.can.sensor_broadcast_base_id)
                    .unwrap_or(u16::MAX),
            },
            pedals: (&c.sensors).into(),
            torque: (&c.torque).into(),
            safety: (&c.safety).into(),
            handshake: (&c.handshake).into(),
            derate: c.safety.derate.iter().map(Into::into).collect(),
            schedule: c.schedule.iter().map(|r| (r.into(), r.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_maps_onto_settings() {
        let cfg = vcu_config::load_toml(
            r#"
            [cycle]
            period_ms = 10
            [can]
            sensor_broadcast_base_id = 0x600
            [sensors.tps0]
            spec_min = 100
            spec_max = 4900
            calibration = [4500, 500]
            [torque]
            max_torque_nm = 80.0
            direction = "reverse"
            [[safety.derate]]
            kind = "discharge_limit"
            [[schedule]]
            id = 0xC0
            min_interval_ms = 5
            max_interval_ms = 100
            required = true
            [[schedule]]
            id = 0xC0
            extended = true
            min_interval_ms = 0
            max_interval_ms = 50
            "#,
        )
        .unwrap();
        let s = VcuSettings::from(&cfg);
        assert_eq!(s.cycle.period_ms, 10);
        assert_eq!(s.cycle.broadcast_base_id, 0x600);
        assert_eq!(s.pedals.tps0.calibration, Calibration::new(500, 4500));
        assert_eq!(s.pedals.tps0.spec.spec_min, 100);
        assert!(s.pedals.tps1.spec.reversed);
        assert_eq!(s.torque.direction, Direction::Reverse);
        assert_eq!(s.derate.len(), 1);
        assert_eq!(s.derate[0].name(), "discharge_limit");
        assert_eq!(
            s.schedule,
            vec![
                (MessageId::standard(0xC0), ScheduleRule::new(5, 100, true)),
                (MessageId::extended(0xC0), ScheduleRule::new(0, 50, false)),
            ]
        );
    }
}
