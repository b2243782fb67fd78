//! Maps `Box<dyn Error>` from trait boundaries to typed `VcuError`.
//!
//! The seams in `vcu_traits` return `Box<dyn Error + Send + Sync>`; this
//! module recovers a typed error, downcasting `vcu_hardware::HwError` when the
//! `hardware-errors` feature is on and falling back to message heuristics.

use crate::error::{TransportFault, VcuError};

/// Map a trait-boundary error to a typed `VcuError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> VcuError {
    #[cfg(feature = "hardware-errors")]
    {
        use vcu_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Busy => VcuError::Transport(TransportFault::Busy),
                HwError::FifoFull => VcuError::Transport(TransportFault::FifoFull),
                HwError::StaleData => VcuError::Transport(TransportFault::StaleData),
                HwError::BusOff => VcuError::Transport(TransportFault::BusOff),
                HwError::SensorPower(ch) => VcuError::SensorPower(format!("{ch:?}")),
                HwError::SensorSignal(ch) => VcuError::SensorSignal(format!("{ch:?}")),
                HwError::SensorRead(ch) => VcuError::SensorRead(format!("{ch:?}")),
                HwError::Output(msg) => VcuError::Output(msg.clone()),
                other => VcuError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("bus-off") || lower.contains("bus off") {
        VcuError::Transport(TransportFault::BusOff)
    } else if lower.contains("fifo full") || lower.contains("queue full") {
        VcuError::Transport(TransportFault::FifoFull)
    } else if lower.contains("busy") {
        VcuError::Transport(TransportFault::Busy)
    } else if lower.contains("stale") {
        VcuError::Transport(TransportFault::StaleData)
    } else {
        VcuError::Hardware(s)
    }
}

/// Classify a transport error; anything unrecognised is `Other`.
pub fn transport_fault(e: &(dyn std::error::Error + 'static)) -> TransportFault {
    map_hw_error(e).transport().unwrap_or(TransportFault::Other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_classifies_transport_failures() {
        let e = std::io::Error::other("CAN node entered Bus-Off");
        assert_eq!(transport_fault(&e), TransportFault::BusOff);
        let e = std::io::Error::other("tx fifo full");
        assert_eq!(transport_fault(&e), TransportFault::FifoFull);
        let e = std::io::Error::other("wiring on fire");
        assert_eq!(transport_fault(&e), TransportFault::Other);
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_hardware_errors() {
        use vcu_hardware::error::HwError;
        let e: vcu_traits::BoxError = Box::new(HwError::StaleData);
        assert_eq!(
            map_hw_error(&*e),
            VcuError::Transport(TransportFault::StaleData)
        );
        let e: vcu_traits::BoxError =
            Box::new(HwError::SensorRead(vcu_traits::AnalogChannel::Tps1));
        assert_eq!(map_hw_error(&*e), VcuError::SensorRead("Tps1".into()));
    }
}
