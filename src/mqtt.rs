use embassy_net::{tcp::TcpSocket, Stack};
use embassy_time::{Duration, Instant};
use rust_mqtt::{
    client::{
        client::MqttClient,
        client_config::{ClientConfig, MqttVersion},
    },
    packet::v5::{publish_packet::QualityOfService, reason_codes::ReasonCode},
    utils::rng_generator::CountingRng,
};
use sensor_core::publisher::{Broker, Session};
use sensor_core::DeviceConfig;

use crate::constants::*;
use crate::transport;

#[derive(Debug)]
pub enum Error {
    #[allow(dead_code)]
    Transport(transport::Error),
    #[allow(dead_code)]
    Mqtt(ReasonCode),
}

/// Socket and client buffers, reused by every connection.
pub struct Buffers {
    rx: [u8; RX_BUFFER_SIZE],
    tx: [u8; TX_BUFFER_SIZE],
    mqtt_rx: [u8; MQTT_RX_BUFFER_SIZE],
    mqtt_tx: [u8; MQTT_TX_BUFFER_SIZE],
}

impl Buffers {
    pub const fn new() -> Self {
        Self {
            rx: [0; RX_BUFFER_SIZE],
            tx: [0; TX_BUFFER_SIZE],
            mqtt_rx: [0; MQTT_RX_BUFFER_SIZE],
            mqtt_tx: [0; MQTT_TX_BUFFER_SIZE],
        }
    }
}

/// MQTT v5 over plain TCP.
pub struct MqttBroker {
    stack: Stack<'static>,
    port: u16,
    buffers: &'static mut Buffers,
}

impl MqttBroker {
    pub fn new(stack: Stack<'static>, port: u16, buffers: &'static mut Buffers) -> Self {
        Self {
            stack,
            port,
            buffers,
        }
    }
}

impl Broker for MqttBroker {
    type Error = Error;
    type Session<'s> = MqttSession<'s>;

    async fn connect<'s>(
        &'s mut self,
        config: &'s DeviceConfig,
    ) -> Result<MqttSession<'s>, Error> {
        let Buffers {
            rx,
            tx,
            mqtt_rx,
            mqtt_tx,
        } = &mut *self.buffers;

        let socket = transport::connect(self.stack, rx, tx, config.mqtt_server(), self.port)
            .await
            .map_err(Error::Transport)?;

        let mut client_config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
        client_config.add_client_id(config.device_id());
        if !config.mqtt_user().is_empty() {
            client_config.add_username(config.mqtt_user());
            client_config.add_password(config.mqtt_password());
        }
        client_config.keep_alive = MQTT_KEEP_ALIVE_SECS;
        client_config.max_packet_size = MQTT_TX_BUFFER_SIZE as u32;

        let mut client = MqttClient::<_, MQTT_MAX_PROPERTIES, _>::new(
            socket,
            mqtt_tx,
            MQTT_TX_BUFFER_SIZE,
            mqtt_rx,
            MQTT_RX_BUFFER_SIZE,
            client_config,
        );

        client.connect_to_broker().await.map_err(Error::Mqtt)?;

        Ok(MqttSession {
            client,
            connected: true,
            last_activity: Instant::now(),
        })
    }
}

pub struct MqttSession<'s> {
    client: MqttClient<'s, TcpSocket<'s>, MQTT_MAX_PROPERTIES, CountingRng>,
    connected: bool,
    last_activity: Instant,
}

impl MqttSession<'_> {
    /// A network error means the socket is gone; any other reason code is a
    /// per-packet refusal.
    fn track(&mut self, result: Result<(), ReasonCode>) -> Result<(), Error> {
        match result {
            Ok(()) => {
                self.last_activity = Instant::now();
                Ok(())
            }
            Err(ReasonCode::NetworkError) => {
                self.connected = false;
                Err(Error::Mqtt(ReasonCode::NetworkError))
            }
            Err(e) => Err(Error::Mqtt(e)),
        }
    }
}

impl Session for MqttSession<'_> {
    type Error = Error;

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), Error> {
        let result = self
            .client
            .send_message(topic, payload, QualityOfService::QoS0, false)
            .await;
        self.track(result)
    }

    async fn poll(&mut self) -> Result<(), Error> {
        let keep_alive = Duration::from_secs(u64::from(MQTT_KEEP_ALIVE_SECS) / 2);
        if self.last_activity.elapsed() < keep_alive {
            return Ok(());
        }
        log::debug!("Sending MQTT ping");
        let result = self.client.send_ping().await;
        if result.is_err() {
            // a missed ping response means the broker is gone
            self.connected = false;
        }
        self.track(result)
    }
}
