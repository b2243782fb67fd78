use thiserror::Error;

/// Collaborator failure classes. All are retried on the next cycle.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFault {
    #[error("controller busy")]
    Busy,
    #[error("fifo full")]
    FifoFull,
    #[error("stale data")]
    StaleData,
    #[error("bus-off")]
    BusOff,
    #[error("unclassified transport failure")]
    Other,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VcuError {
    #[error("transport: {0}")]
    Transport(TransportFault),
    #[error("sensor power init failed: {0}")]
    SensorPower(String),
    #[error("sensor signal init failed: {0}")]
    SensorSignal(String),
    #[error("sensor read failed: {0}")]
    SensorRead(String),
    #[error("output failed: {0}")]
    Output(String),
    #[error("hardware error: {0}")]
    Hardware(String),
}

impl VcuError {
    pub fn transport(&self) -> Option<TransportFault> {
        match self {
            VcuError::Transport(t) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing inputs")]
    MissingInputs,
    #[error("missing outputs")]
    MissingOutputs,
    #[error("missing high-priority CAN channel")]
    MissingHighChannel,
    #[error("missing low-priority CAN channel")]
    MissingLowChannel,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
