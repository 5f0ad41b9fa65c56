pub mod aht20;

pub use aht20::Aht20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// No device answered on the bus, or it was never initialised
    NotFound,
    /// The driver reported a failed measurement: bus error, stuck busy bit or
    /// bad checksum
    ReadFailed,
}

/// One temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// A temperature/humidity source polled on demand.
pub trait Sensor {
    /// Detects the device and prepares it for measurements.
    async fn init(&mut self) -> Result<(), SensorError>;

    /// Runs a fresh measurement; nothing is cached between calls.
    async fn read(&mut self) -> Result<Reading, SensorError>;
}
