use core::mem;

use aht20_async::Aht20 as Driver;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

use super::{Reading, Sensor, SensorError};

enum State<I2C, D> {
    /// Bus handed over, device not detected yet
    Detached(I2C, D),
    Ready(Driver<I2C, D>),
    /// A failed detection consumed the bus
    Lost,
}

/// AHT20 temperature and humidity sensor on an async I2C bus.
pub struct Aht20<I2C, D> {
    state: State<I2C, D>,
}

impl<I2C: I2c, D: DelayNs> Aht20<I2C, D> {
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            state: State::Detached(i2c, delay),
        }
    }
}

impl<I2C: I2c, D: DelayNs> Sensor for Aht20<I2C, D> {
    async fn init(&mut self) -> Result<(), SensorError> {
        let (i2c, delay) = match mem::replace(&mut self.state, State::Lost) {
            State::Detached(i2c, delay) => (i2c, delay),
            State::Ready(driver) => {
                self.state = State::Ready(driver);
                return Ok(());
            }
            State::Lost => return Err(SensorError::NotFound),
        };

        info!("Initialising AHT20...");
        let driver = Driver::new(i2c, delay)
            .await
            .map_err(|_| SensorError::NotFound)?;
        self.state = State::Ready(driver);
        info!("Initialised AHT20");
        Ok(())
    }

    async fn read(&mut self) -> Result<Reading, SensorError> {
        let State::Ready(driver) = &mut self.state else {
            return Err(SensorError::NotFound);
        };

        let (humidity, temperature) = driver.read().await.map_err(|_| {
            error!("AHT20 measurement failed");
            SensorError::ReadFailed
        })?;

        Ok(Reading {
            temperature_c: temperature.celsius() as f32,
            humidity_pct: humidity.rh() as f32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingDelay;
    use core::cell::Cell;
    use crc::{Crc, CRC_8_NRSC_5};
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    const ADDRESS: u8 = 0x38;
    const CMD_MEASURE: u8 = 0xAC;
    /// Idle and calibrated
    const STATUS_READY: u8 = 0x18;

    const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

    /// State shared between a test and the simulated device.
    #[derive(Default)]
    struct Bench {
        absent: Cell<bool>,
        unplugged: Cell<bool>,
        measurements: Cell<u32>,
    }

    /// Simulated AHT20 that always reports 25.00 °C and 50.00 %RH.
    struct FakeAht20<'a>(&'a Bench);

    impl FakeAht20<'_> {
        fn frame() -> [u8; 7] {
            let humidity: u32 = 0x80000;
            let temperature: u32 = 0x60000;
            let mut frame = [
                STATUS_READY,
                (humidity >> 12) as u8,
                (humidity >> 4) as u8,
                (((humidity & 0x0F) << 4) as u8) | ((temperature >> 16) as u8 & 0x0F),
                (temperature >> 8) as u8,
                temperature as u8,
                0,
            ];
            frame[6] = CRC8.checksum(&frame[..6]);
            frame
        }
    }

    impl ErrorType for FakeAht20<'_> {
        type Error = ErrorKind;
    }

    impl I2c for FakeAht20<'_> {
        async fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != ADDRESS || self.0.absent.get() || self.0.unplugged.get() {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => {
                        if bytes.first() == Some(&CMD_MEASURE) {
                            self.0.measurements.set(self.0.measurements.get() + 1);
                        }
                    }
                    Operation::Read(buf) => {
                        let frame = Self::frame();
                        let n = buf.len().min(frame.len());
                        buf[..n].copy_from_slice(&frame[..n]);
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn read_reports_physical_units() {
        let bench = Bench::default();
        let mut sensor = Aht20::new(FakeAht20(&bench), RecordingDelay::default());

        block_on(sensor.init()).unwrap();
        let reading = block_on(sensor.read()).unwrap();

        assert!((reading.temperature_c - 25.0).abs() < 0.01);
        assert!((reading.humidity_pct - 50.0).abs() < 0.01);
    }

    #[test]
    fn missing_sensor_is_not_found() {
        let bench = Bench::default();
        bench.absent.set(true);
        let mut sensor = Aht20::new(FakeAht20(&bench), RecordingDelay::default());

        assert_eq!(block_on(sensor.init()), Err(SensorError::NotFound));
        // the failed init does not leave a usable sensor behind
        assert_eq!(block_on(sensor.init()), Err(SensorError::NotFound));
        assert_eq!(block_on(sensor.read()), Err(SensorError::NotFound));
    }

    #[test]
    fn read_before_init_is_not_found() {
        let bench = Bench::default();
        let mut sensor = Aht20::new(FakeAht20(&bench), RecordingDelay::default());

        assert_eq!(block_on(sensor.read()), Err(SensorError::NotFound));
        assert_eq!(bench.measurements.get(), 0);
    }

    #[test]
    fn bus_failure_after_init_is_a_failed_read() {
        let bench = Bench::default();
        let mut sensor = Aht20::new(FakeAht20(&bench), RecordingDelay::default());
        block_on(sensor.init()).unwrap();

        bench.unplugged.set(true);

        assert_eq!(block_on(sensor.read()), Err(SensorError::ReadFailed));
    }

    #[test]
    fn every_read_is_a_fresh_measurement() {
        let bench = Bench::default();
        let mut sensor = Aht20::new(FakeAht20(&bench), RecordingDelay::default());
        block_on(sensor.init()).unwrap();
        let before = bench.measurements.get();

        block_on(sensor.read()).unwrap();
        block_on(sensor.read()).unwrap();

        assert_eq!(bench.measurements.get() - before, 2);
    }
}
