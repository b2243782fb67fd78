use thiserror::Error;

use vcu_traits::AnalogChannel;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("can controller busy")]
    Busy,
    #[error("can fifo full")]
    FifoFull,
    #[error("can fifo returned stale data")]
    StaleData,
    #[error("can bus-off")]
    BusOff,
    #[error("sensor power init failed on {0:?}")]
    SensorPower(AnalogChannel),
    #[error("sensor signal init failed on {0:?}")]
    SensorSignal(AnalogChannel),
    #[error("sensor read failed on {0:?}")]
    SensorRead(AnalogChannel),
    #[error("output: {0}")]
    Output(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
