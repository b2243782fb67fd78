//! Other nodes on the simulated high-priority bus.

use vcu_traits::CanFrame;

const CONTROL_ID: u32 = 0xC0;
const STATUS_ID: u16 = 0xAA;
const CURRENTS_ID: u16 = 0xA6;
const VOLTAGES_ID: u16 = 0xA7;
const BMS_VOLTAGES_ID: u16 = 0x623;
const BMS_CURRENTS_ID: u16 = 0x624;

/// Motor controller model.
///
/// Lockout clears once a control frame with the enable bit low is seen; a
/// later frame with the enable bit high enables the inverter. Silence longer
/// than `command_timeout_ms` faults it back into lockout.
#[derive(Debug, Clone)]
pub struct SimulatedInverter {
    command_timeout_ms: u64,
    lockout_disabled: bool,
    enabled: bool,
    last_command_ms: Option<u64>,
    commanded_dnm: i16,
    timeouts: u32,
    dc_bus_dv: i16,
    dc_current_da: i16,
}

impl Default for SimulatedInverter {
    fn default() -> Self {
        Self::new(500)
    }
}

impl SimulatedInverter {
    pub fn new(command_timeout_ms: u64) -> Self {
        Self {
            command_timeout_ms,
            lockout_disabled: false,
            enabled: false,
            last_command_ms: None,
            commanded_dnm: 0,
            timeouts: 0,
            dc_bus_dv: 3000,
            dc_current_da: 0,
        }
    }

    /// Feed frames that reached the wire.
    pub fn observe(&mut self, frames: &[CanFrame], now_ms: u64) {
        for f in frames.iter().filter(|f| f.id() == CONTROL_ID && f.len() >= 6) {
            let d = f.data();
            self.last_command_ms = Some(now_ms);
            self.commanded_dnm = i16::from_le_bytes([d[0], d[1]]);
            let enable = d[5] & 0x01 != 0;
            if !enable {
                self.enabled = false;
                self.lockout_disabled = true;
            } else if self.lockout_disabled {
                self.enabled = true;
            }
        }
    }

    /// Advance the model and produce this tick's status and telemetry frames.
    pub fn tick(&mut self, now_ms: u64) -> Vec<CanFrame> {
        if let Some(last) = self.last_command_ms
            && now_ms.saturating_sub(last) > self.command_timeout_ms
            && (self.enabled || self.lockout_disabled)
        {
            self.enabled = false;
            self.lockout_disabled = false;
            self.timeouts += 1;
            tracing::warn!(silence_ms = now_ms - last, "inverter command timeout (simulated)");
        }
        // crude load model: 1 A per 2 Nm commanded while enabled
        self.dc_current_da = if self.enabled {
            self.commanded_dnm / 2
        } else {
            0
        };

        let mut status = [0u8; 8];
        status[0] = if self.enabled { 6 } else if self.lockout_disabled { 4 } else { 0 };
        status[2] = u8::from(self.enabled);
        status[6] = u8::from(self.enabled) | (u8::from(self.lockout_disabled) << 7);

        let mut currents = [0u8; 8];
        currents[6..8].copy_from_slice(&self.dc_current_da.to_be_bytes());
        let mut voltages = [0u8; 8];
        voltages[0..2].copy_from_slice(&self.dc_bus_dv.to_be_bytes());

        [
            (STATUS_ID, status),
            (CURRENTS_ID, currents),
            (VOLTAGES_ID, voltages),
        ]
        .into_iter()
        .filter_map(|(id, payload)| CanFrame::standard(id, &payload).ok())
        .collect()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn lockout_disabled(&self) -> bool {
        self.lockout_disabled
    }

    pub fn commanded_nm(&self) -> f32 {
        f32::from(self.commanded_dnm) / 10.0
    }

    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    /// DC bus voltage reported in `0xA7`, volts.
    pub fn set_dc_bus_voltage(&mut self, volts: f32) {
        self.dc_bus_dv = (volts * 10.0).round() as i16;
    }
}

/// Battery management system model: pack voltage/current and limits.
#[derive(Debug, Clone)]
pub struct SimulatedBms {
    pub pack_voltage_v: u16,
    /// Whole amps, positive while discharging.
    pub pack_current_a: i16,
    pub charge_limit_a: u16,
    pub discharge_limit_a: u16,
    pub min_cell: (u8, u8),
    pub max_cell: (u8, u8),
}

impl Default for SimulatedBms {
    fn default() -> Self {
        Self {
            pack_voltage_v: 300,
            pack_current_a: 0,
            charge_limit_a: 50,
            discharge_limit_a: 200,
            min_cell: (0x32, 1),
            max_cell: (0x35, 2),
        }
    }
}

impl SimulatedBms {
    pub fn frames(&self) -> Vec<CanFrame> {
        let v = self.pack_voltage_v.to_be_bytes();
        let voltages = [v[0], v[1], self.min_cell.0, self.min_cell.1, self.max_cell.0, self.max_cell.1];
        let i = self.pack_current_a.to_be_bytes();
        let ccl = self.charge_limit_a.to_be_bytes();
        let dcl = self.discharge_limit_a.to_be_bytes();
        let currents = [i[0], i[1], ccl[0], ccl[1], dcl[0], dcl[1]];
        [(BMS_VOLTAGES_ID, voltages), (BMS_CURRENTS_ID, currents)]
            .into_iter()
            .filter_map(|(id, payload)| CanFrame::standard(id, &payload).ok())
            .collect()
    }
}
