//! Decoded views over inbound motor-controller and battery frames.
//!
//! Both structs are only ever written by [`crate::router::CanFrameRouter`],
//! which owns the [`DeviceState`] and hands out shared references.

use vcu_traits::{CanFrame, FrameFormat};

use crate::fixed_point::{be_i16, be_u16, be_u32, byte, tenths};

#[inline]
fn put<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

pub const MCU_TEMPS_1: u32 = 0xA0;
pub const MCU_TEMPS_2: u32 = 0xA1;
pub const MCU_TEMPS_3: u32 = 0xA2;
pub const MCU_ANALOG_IN: u32 = 0xA3;
pub const MCU_DIGITAL_IN: u32 = 0xA4;
pub const MCU_MOTOR_POS: u32 = 0xA5;
pub const MCU_CURRENTS: u32 = 0xA6;
pub const MCU_VOLTAGES: u32 = 0xA7;
pub const MCU_FLUX: u32 = 0xA8;
pub const MCU_INTERNAL_V: u32 = 0xA9;
pub const MCU_STATUS: u32 = 0xAA;
pub const MCU_FAULTS: u32 = 0xAB;
pub const MCU_TORQUE: u32 = 0xAC;

pub const BMS_STATUS: u32 = 0x622;
pub const BMS_VOLTAGES: u32 = 0x623;
pub const BMS_CURRENTS: u32 = 0x624;
pub const BMS_ENERGY: u32 = 0x625;
pub const BMS_CHARGE: u32 = 0x626;
pub const BMS_TEMPS: u32 = 0x627;
pub const BMS_RESISTANCE: u32 = 0x628;
pub const BMS_CELLS: u32 = 0x629;

/// Motor controller telemetry. Temperatures in °C, voltages in V, currents
/// in A, torques in Nm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotorControllerTelemetry {
    pub module_a_temp_c: f32,
    pub module_b_temp_c: f32,
    pub module_c_temp_c: f32,
    pub gate_driver_temp_c: f32,
    pub control_board_temp_c: f32,
    pub rtd_temps_c: [f32; 5],
    pub motor_temp_c: f32,
    pub torque_shudder_nm: f32,
    pub analog_inputs_v: [f32; 4],
    /// One bit per digital input, bit0 = input 1.
    pub digital_inputs: u8,
    pub motor_angle_deg: f32,
    pub motor_speed_rpm: i16,
    pub electrical_freq_hz: f32,
    pub phase_currents_a: [f32; 3],
    pub dc_bus_current_a: f32,
    pub dc_bus_voltage_v: f32,
    pub output_voltage_v: f32,
    pub id_current_a: f32,
    pub iq_current_a: f32,
    pub ref_1v5: f32,
    pub ref_2v5: f32,
    pub ref_5v: f32,
    pub system_12v: f32,
    pub vsm_state: u8,
    pub inverter_state: u8,
    pub inverter_enabled: bool,
    pub lockout_disabled: bool,
    /// Raw fault words from `0xAB`: POST lo/hi, run lo/hi.
    pub fault_words: [u16; 4],
    /// Times a new nonzero fault set was reported.
    pub fault_count: u32,
    pub commanded_torque_nm: f32,
    pub torque_feedback_nm: f32,
    /// Frames of any MCU identifier seen.
    pub frames_seen: u64,
}

impl MotorControllerTelemetry {
    /// Standard-format frames in `0xA0..=0xAC`.
    pub fn owns(frame: &CanFrame) -> bool {
        frame.format() == FrameFormat::Standard && (MCU_TEMPS_1..=MCU_TORQUE).contains(&frame.id())
    }

    /// DC power drawn by the inverter, kW.
    pub fn power_kw(&self) -> f32 {
        self.dc_bus_voltage_v * self.dc_bus_current_a / 1000.0
    }

    pub fn has_fault(&self) -> bool {
        self.fault_words.iter().any(|w| *w != 0)
    }

    /// Fields past the end of a short payload keep their previous value.
    pub(crate) fn apply(&mut self, frame: &CanFrame) -> bool {
        if !Self::owns(frame) {
            return false;
        }
        let d = frame.data();
        let t = |at| be_i16(d, at).map(tenths);
        match frame.id() {
            MCU_TEMPS_1 => {
                put(&mut self.module_a_temp_c, t(0));
                put(&mut self.module_b_temp_c, t(2));
                put(&mut self.module_c_temp_c, t(4));
                put(&mut self.gate_driver_temp_c, t(6));
            }
            MCU_TEMPS_2 => {
                put(&mut self.control_board_temp_c, t(0));
                put(&mut self.rtd_temps_c[0], t(2));
                put(&mut self.rtd_temps_c[1], t(4));
                put(&mut self.rtd_temps_c[2], t(6));
            }
            MCU_TEMPS_3 => {
                put(&mut self.rtd_temps_c[3], t(0));
                put(&mut self.rtd_temps_c[4], t(2));
                put(&mut self.motor_temp_c, t(4));
                put(&mut self.torque_shudder_nm, t(6));
            }
            MCU_ANALOG_IN => {
                for (i, v) in self.analog_inputs_v.iter_mut().enumerate() {
                    put(v, t(i * 2));
                }
            }
            MCU_DIGITAL_IN => {
                for (i, b) in d.iter().enumerate() {
                    let bit = 1u8 << i;
                    if *b == 0 {
                        self.digital_inputs &= !bit;
                    } else {
                        self.digital_inputs |= bit;
                    }
                }
            }
            MCU_MOTOR_POS => {
                put(&mut self.motor_angle_deg, t(0));
                put(&mut self.motor_speed_rpm, be_i16(d, 2));
                put(&mut self.electrical_freq_hz, t(4));
            }
            MCU_CURRENTS => {
                put(&mut self.phase_currents_a[0], t(0));
                put(&mut self.phase_currents_a[1], t(2));
                put(&mut self.phase_currents_a[2], t(4));
                put(&mut self.dc_bus_current_a, t(6));
            }
            MCU_VOLTAGES => {
                put(&mut self.dc_bus_voltage_v, t(0));
                put(&mut self.output_voltage_v, t(2));
            }
            MCU_FLUX => {
                put(&mut self.id_current_a, t(4));
                put(&mut self.iq_current_a, t(6));
            }
            MCU_INTERNAL_V => {
                put(&mut self.ref_1v5, t(0));
                put(&mut self.ref_2v5, t(2));
                put(&mut self.ref_5v, t(4));
                put(&mut self.system_12v, t(6));
            }
            MCU_STATUS => {
                // status bits are single bytes, no swap
                put(&mut self.vsm_state, byte(d, 0));
                put(&mut self.inverter_state, byte(d, 2));
                if let Some(flags) = byte(d, 6) {
                    self.inverter_enabled = flags & 0x01 != 0;
                    self.lockout_disabled = flags & 0x80 != 0;
                }
            }
            MCU_FAULTS => {
                let mut words = self.fault_words;
                for (i, w) in words.iter_mut().enumerate() {
                    put(w, be_u16(d, i * 2));
                }
                if words != self.fault_words && words.iter().any(|w| *w != 0) {
                    self.fault_count = self.fault_count.saturating_add(1);
                    tracing::warn!(?words, "motor controller reported faults");
                }
                self.fault_words = words;
            }
            MCU_TORQUE => {
                put(&mut self.commanded_torque_nm, t(0));
                put(&mut self.torque_feedback_nm, t(2));
            }
            _ => return false,
        }
        self.frames_seen += 1;
        true
    }
}

/// Battery management telemetry. Pack voltage in V, currents in A
/// (positive = discharge), cell voltages and resistances as raw BMS units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryTelemetry {
    pub state: u8,
    pub timer: u16,
    pub flags: u8,
    pub fault_code: u8,
    pub level_faults: u8,
    pub warnings: u8,
    pub pack_voltage_v: u16,
    pub min_cell_voltage: u8,
    pub min_cell_id: u8,
    pub max_cell_voltage: u8,
    pub max_cell_id: u8,
    pub pack_current_a: i16,
    pub charge_limit_a: u16,
    pub discharge_limit_a: u16,
    pub energy_in: u32,
    pub energy_out: u32,
    pub soc_pct: u8,
    pub dod: u16,
    pub capacity: u16,
    pub soh_pct: u8,
    pub pack_temp_c: i8,
    pub min_temp_c: i8,
    pub min_temp_id: u8,
    pub max_temp_c: i8,
    pub max_temp_id: u8,
    pub pack_resistance: u16,
    pub min_cell_resistance: u8,
    pub min_resistance_id: u8,
    pub max_cell_resistance: u8,
    pub max_resistance_id: u8,
    pub open_circuit_voltage_v: u16,
    pub populated_cells: u8,
    pub frames_seen: u64,
}

impl BatteryTelemetry {
    /// Standard-format frames in `0x622..=0x629`.
    pub fn owns(frame: &CanFrame) -> bool {
        frame.format() == FrameFormat::Standard && (BMS_STATUS..=BMS_CELLS).contains(&frame.id())
    }

    /// Instantaneous pack power, kW; negative while charging.
    pub fn power_kw(&self) -> f32 {
        f32::from(self.pack_voltage_v) * f32::from(self.pack_current_a) / 1000.0
    }

    /// Fields past the end of a short payload keep their previous value.
    pub(crate) fn apply(&mut self, frame: &CanFrame) -> bool {
        if !Self::owns(frame) {
            return false;
        }
        let d = frame.data();
        let signed = |at| byte(d, at).map(|b| i8::from_be_bytes([b]));
        match frame.id() {
            BMS_STATUS => {
                put(&mut self.state, byte(d, 0));
                put(&mut self.timer, be_u16(d, 1));
                put(&mut self.flags, byte(d, 3));
                put(&mut self.fault_code, byte(d, 4));
                put(&mut self.level_faults, byte(d, 5));
                put(&mut self.warnings, byte(d, 6));
            }
            BMS_VOLTAGES => {
                put(&mut self.pack_voltage_v, be_u16(d, 0));
                put(&mut self.min_cell_voltage, byte(d, 2));
                put(&mut self.min_cell_id, byte(d, 3));
                put(&mut self.max_cell_voltage, byte(d, 4));
                put(&mut self.max_cell_id, byte(d, 5));
            }
            BMS_CURRENTS => {
                put(&mut self.pack_current_a, be_i16(d, 0));
                put(&mut self.charge_limit_a, be_u16(d, 2));
                put(&mut self.discharge_limit_a, be_u16(d, 4));
            }
            BMS_ENERGY => {
                put(&mut self.energy_in, be_u32(d, 0));
                put(&mut self.energy_out, be_u32(d, 4));
            }
            BMS_CHARGE => {
                put(&mut self.soc_pct, byte(d, 0));
                put(&mut self.dod, be_u16(d, 1));
                put(&mut self.capacity, be_u16(d, 3));
                put(&mut self.soh_pct, byte(d, 6));
            }
            BMS_TEMPS => {
                put(&mut self.pack_temp_c, signed(0));
                put(&mut self.min_temp_c, signed(2));
                put(&mut self.min_temp_id, byte(d, 3));
                put(&mut self.max_temp_c, signed(4));
                put(&mut self.max_temp_id, byte(d, 5));
            }
            BMS_RESISTANCE => {
                put(&mut self.pack_resistance, be_u16(d, 0));
                put(&mut self.min_cell_resistance, byte(d, 2));
                put(&mut self.min_resistance_id, byte(d, 3));
                put(&mut self.max_cell_resistance, byte(d, 4));
                put(&mut self.max_resistance_id, byte(d, 5));
            }
            BMS_CELLS => {
                put(&mut self.open_circuit_voltage_v, be_u16(d, 0));
                put(&mut self.populated_cells, byte(d, 2));
            }
            _ => return false,
        }
        self.frames_seen += 1;
        true
    }
}

/// Everything the core knows about other nodes on the bus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    pub mcu: MotorControllerTelemetry,
    pub bms: BatteryTelemetry,
}
