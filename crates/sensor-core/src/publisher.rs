use core::fmt::Debug;

use embedded_hal_async::delay::DelayNs;
use log::{error, info, warn};

use crate::config::DeviceConfig;
use crate::constants::LOOP_TICK_MS;
use crate::payload::format_payload;
use crate::schedule::{Clock, PublishTimer};
use crate::sensors::{Sensor, SensorError};

/// Opens MQTT sessions with the broker named in the device configuration.
pub trait Broker {
    type Error: Debug;
    type Session<'s>: Session<Error = Self::Error>
    where
        Self: 's;

    /// Connects using the configured server, client id and credentials.
    async fn connect<'s>(
        &'s mut self,
        config: &'s DeviceConfig,
    ) -> Result<Self::Session<'s>, Self::Error>;
}

/// A live broker connection.
pub trait Session {
    type Error: Debug;

    /// The client's own liveness check.
    fn is_connected(&self) -> bool;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Self::Error>;

    /// Services the connection, sending keep-alives when they are due.
    async fn poll(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// Result of one publish. Failures are logged and otherwise ignored: the
/// next liveness check decides whether to reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome<E> {
    Sent,
    Failed(E),
}

/// What one iteration of the connected loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<E> {
    /// Nothing was due
    Idle,
    Published(PublishOutcome<E>),
    /// The reading failed, nothing was published
    SensorFailed(SensorError),
    /// The session is gone and must be reopened
    Disconnected,
}

/// Reads the sensor and publishes on a fixed interval over a persistent
/// broker connection, reconnecting forever when it drops.
pub struct Publisher<'c, S, C, D> {
    config: &'c DeviceConfig,
    sensor: S,
    clock: C,
    delay: D,
    timer: PublishTimer,
    reconnect_delay_ms: u32,
    state: LinkState,
}

impl<'c, S, C, D> Publisher<'c, S, C, D>
where
    S: Sensor,
    C: Clock,
    D: DelayNs,
{
    pub fn new(
        config: &'c DeviceConfig,
        sensor: S,
        clock: C,
        delay: D,
        publish_interval_ms: u32,
        reconnect_delay_ms: u32,
    ) -> Self {
        Self {
            config,
            sensor,
            clock,
            delay,
            timer: PublishTimer::new(publish_interval_ms),
            reconnect_delay_ms,
            state: LinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// One connection attempt. On failure, waits the reconnect delay before
    /// returning.
    pub async fn connect_once<'b, B: Broker>(
        &mut self,
        broker: &'b mut B,
    ) -> Result<B::Session<'b>, B::Error>
    where
        'c: 'b,
    {
        info!("Connecting to MQTT...");
        match broker.connect(self.config).await {
            Ok(session) => {
                info!("Connected to MQTT.");
                self.state = LinkState::Connected;
                Ok(session)
            }
            Err(e) => {
                error!("Failed MQTT connection, rc={:?}", e);
                self.state = LinkState::Disconnected;
                self.delay.delay_ms(self.reconnect_delay_ms).await;
                Err(e)
            }
        }
    }

    /// One iteration of the connected loop: service the session, then read and
    /// publish once if the interval has elapsed.
    pub async fn service<Z: Session>(&mut self, session: &mut Z) -> Step<Z::Error> {
        if !session.is_connected() {
            warn!("MQTT connection lost");
            self.state = LinkState::Disconnected;
            return Step::Disconnected;
        }

        if let Err(e) = session.poll().await {
            warn!("MQTT keep-alive failed: {:?}", e);
        }

        if !self.timer.due(self.clock.now_ms()) {
            return Step::Idle;
        }

        let reading = match self.sensor.read().await {
            Ok(reading) => reading,
            Err(e) => {
                warn!("Failed to read AHT20, skipping publish: {:?}", e);
                return Step::SensorFailed(e);
            }
        };

        let payload = match format_payload(self.config.device_id(), &reading) {
            Ok(payload) => payload,
            Err(_) => {
                error!("Payload does not fit, skipping publish");
                return Step::Idle;
            }
        };

        info!("Publishing to MQTT: {}", payload);
        let outcome = match session
            .publish(self.config.mqtt_topic(), payload.as_bytes())
            .await
        {
            Ok(()) => PublishOutcome::Sent,
            Err(e) => {
                warn!("MQTT publish failed: {:?}", e);
                PublishOutcome::Failed(e)
            }
        };
        Step::Published(outcome)
    }

    /// Connects, then publishes forever. Connection attempts are retried
    /// without limit and a dropped session is reopened.
    pub async fn run<B: Broker>(&mut self, broker: &mut B) {
        loop {
            let Ok(mut session) = self.connect_once(broker).await else {
                continue;
            };
            while !matches!(self.service(&mut session).await, Step::Disconnected) {
                self.delay.delay_ms(LOOP_TICK_MS).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ManualClock, RecordingDelay};
    use crate::sensors::Reading;
    use embassy_futures::block_on;
    use std::string::String;
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Refused;

    #[derive(Default)]
    struct FakeBroker {
        refuse: u32,
        attempts: u32,
        connected: bool,
        fail_publish: bool,
        published: Vec<(String, String)>,
        client_ids: Vec<String>,
        polls: u32,
    }

    struct FakeSession<'s> {
        broker: &'s mut FakeBroker,
    }

    impl Broker for FakeBroker {
        type Error = Refused;
        type Session<'s> = FakeSession<'s>;

        async fn connect<'s>(
            &'s mut self,
            config: &'s DeviceConfig,
        ) -> Result<FakeSession<'s>, Refused> {
            self.attempts += 1;
            if self.refuse > 0 {
                self.refuse -= 1;
                return Err(Refused);
            }
            self.connected = true;
            self.client_ids.push(config.device_id().into());
            Ok(FakeSession { broker: self })
        }
    }

    impl Session for FakeSession<'_> {
        type Error = Refused;

        fn is_connected(&self) -> bool {
            self.broker.connected
        }

        async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Refused> {
            if self.broker.fail_publish {
                return Err(Refused);
            }
            let payload = String::from_utf8(payload.to_vec()).unwrap();
            self.broker.published.push((topic.into(), payload));
            Ok(())
        }

        async fn poll(&mut self) -> Result<(), Refused> {
            self.broker.polls += 1;
            Ok(())
        }
    }

    struct FakeSensor {
        result: Result<Reading, SensorError>,
        reads: u32,
    }

    impl FakeSensor {
        fn reading(temperature_c: f32, humidity_pct: f32) -> Self {
            Self {
                result: Ok(Reading {
                    temperature_c,
                    humidity_pct,
                }),
                reads: 0,
            }
        }
    }

    impl Sensor for FakeSensor {
        async fn init(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        async fn read(&mut self) -> Result<Reading, SensorError> {
            self.reads += 1;
            self.result
        }
    }

    fn config() -> DeviceConfig {
        DeviceConfig::new("broker.local", "u", "p", "sensor/aht20", "dev1")
    }

    #[test]
    fn publishes_scenario_reading() {
        let config = config();
        let clock = ManualClock::default();
        let mut broker = FakeBroker::default();
        let mut publisher = Publisher::new(
            &config,
            FakeSensor::reading(21.5, 55.25),
            &clock,
            RecordingDelay::default(),
            5000,
            5000,
        );

        let step = block_on(async {
            let mut session = publisher.connect_once(&mut broker).await.unwrap();
            publisher.service(&mut session).await
        });

        assert_eq!(step, Step::Published(PublishOutcome::Sent));
        assert_eq!(publisher.state(), LinkState::Connected);
        assert_eq!(broker.client_ids, ["dev1"]);
        assert_eq!(
            broker.published,
            [(
                String::from("sensor/aht20"),
                String::from(r#"{"device_id": "dev1", "temperature": 21.50, "humidity": 55.25}"#)
            )]
        );
    }

    #[test]
    fn refused_connection_waits_fixed_delay_and_retries() {
        let config = config();
        let clock = ManualClock::default();
        let mut broker = FakeBroker {
            refuse: 3,
            ..Default::default()
        };
        let mut publisher = Publisher::new(
            &config,
            FakeSensor::reading(20.0, 40.0),
            &clock,
            RecordingDelay::default(),
            5000,
            5000,
        );

        block_on(async {
            while publisher.connect_once(&mut broker).await.is_err() {
                assert_eq!(publisher.state(), LinkState::Disconnected);
            }
        });

        assert_eq!(broker.attempts, 4);
        assert_eq!(publisher.state(), LinkState::Connected);
        assert_eq!(publisher.delay.calls, [5000, 5000, 5000]);
    }

    fn count_publishes(start: u32) -> usize {
        let config = config();
        let clock = ManualClock::starting_at(start);
        let mut broker = FakeBroker::default();
        let mut publisher = Publisher::new(
            &config,
            FakeSensor::reading(20.0, 40.0),
            &clock,
            RecordingDelay::default(),
            5000,
            5000,
        );

        block_on(async {
            let mut session = publisher.connect_once(&mut broker).await.unwrap();
            // 60 s of loop ticks
            for _ in 0..600 {
                publisher.service(&mut session).await;
                clock.advance(LOOP_TICK_MS);
            }
        });

        assert_eq!(broker.polls, 600);
        broker.published.len()
    }

    #[test]
    fn one_publish_per_interval() {
        assert_eq!(count_publishes(0), 12);
    }

    #[test]
    fn interval_survives_tick_wraparound() {
        assert_eq!(count_publishes(u32::MAX - 30_000), 12);
    }

    #[test]
    fn failed_publish_is_reported_but_keeps_the_session() {
        let config = config();
        let clock = ManualClock::default();
        let mut broker = FakeBroker {
            fail_publish: true,
            ..Default::default()
        };
        let mut publisher = Publisher::new(
            &config,
            FakeSensor::reading(20.0, 40.0),
            &clock,
            RecordingDelay::default(),
            5000,
            5000,
        );

        let (first, second) = block_on(async {
            let mut session = publisher.connect_once(&mut broker).await.unwrap();
            let first = publisher.service(&mut session).await;
            clock.advance(100);
            let second = publisher.service(&mut session).await;
            (first, second)
        });

        assert_eq!(first, Step::Published(PublishOutcome::Failed(Refused)));
        assert_eq!(second, Step::Idle);
        assert_eq!(publisher.state(), LinkState::Connected);
    }

    #[test]
    fn sensor_failure_skips_the_publish() {
        let config = config();
        let clock = ManualClock::default();
        let mut broker = FakeBroker::default();
        let sensor = FakeSensor {
            result: Err(SensorError::ReadFailed),
            reads: 0,
        };
        let mut publisher = Publisher::new(&config, sensor, &clock, RecordingDelay::default(), 5000, 5000);

        let steps = block_on(async {
            let mut session = publisher.connect_once(&mut broker).await.unwrap();
            let mut steps = Vec::new();
            for _ in 0..3 {
                steps.push(publisher.service(&mut session).await);
                clock.advance(2500);
            }
            steps
        });

        assert_eq!(
            steps,
            [
                Step::SensorFailed(SensorError::ReadFailed),
                Step::Idle,
                Step::SensorFailed(SensorError::ReadFailed),
            ]
        );
        assert!(broker.published.is_empty());
        assert_eq!(publisher.sensor.reads, 2);
    }

    #[test]
    fn lost_session_is_reported() {
        let config = config();
        let clock = ManualClock::default();
        let mut broker = FakeBroker::default();
        let mut publisher = Publisher::new(
            &config,
            FakeSensor::reading(20.0, 40.0),
            &clock,
            RecordingDelay::default(),
            5000,
            5000,
        );

        let step = block_on(async {
            let mut session = publisher.connect_once(&mut broker).await.unwrap();
            session.broker.connected = false;
            publisher.service(&mut session).await
        });

        assert_eq!(step, Step::Disconnected);
        assert_eq!(publisher.state(), LinkState::Disconnected);
        assert!(broker.published.is_empty());
    }
}
