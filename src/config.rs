use sensor_core::DeviceConfig;

/// Factory settings baked in from `cfg.toml`.
pub struct Defaults {
    // MQTT broker hostname or IP address
    pub mqtt_server: &'static str,

    // MQTT port, plain TCP
    pub mqtt_port: u16,

    // MQTT username for authentication
    pub mqtt_user: &'static str,

    // MQTT password for authentication
    pub mqtt_password: &'static str,

    // MQTT topic to publish readings to
    pub mqtt_topic: &'static str,

    // Device ID (MQTT client id and DHCP hostname)
    pub device_id: &'static str,

    // Time between two published readings
    pub publish_interval_ms: u32,

    // Wait between two broker connection attempts
    pub reconnect_delay_ms: u32,

    // SSID of the configuration access point
    pub ap_ssid: &'static str,

    // How long the configuration portal waits for a submission, 0 = forever
    pub portal_timeout_seconds: u32,
}

impl Defaults {
    /// User-editable part of the defaults, the base the flash config is
    /// loaded on top of.
    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(
            self.mqtt_server,
            self.mqtt_user,
            self.mqtt_password,
            self.mqtt_topic,
            self.device_id,
        )
    }
}

// default values are generated at compile time
include!(concat!(env!("OUT_DIR"), "/defaults.rs"));
