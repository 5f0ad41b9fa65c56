use heapless::String;
use log::info;

use crate::constants::*;

/// One of the five user-editable configuration fields, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    MqttServer,
    MqttUser,
    MqttPassword,
    MqttTopic,
    DeviceId,
}

impl Field {
    /// Fields in the order they are stored on flash and shown in the portal.
    pub const ALL: [Field; 5] = [
        Field::MqttServer,
        Field::MqttUser,
        Field::MqttPassword,
        Field::MqttTopic,
        Field::DeviceId,
    ];

    /// Form input name used by the provisioning portal
    pub const fn id(self) -> &'static str {
        match self {
            Field::MqttServer => "server",
            Field::MqttUser => "user",
            Field::MqttPassword => "password",
            Field::MqttTopic => "topic",
            Field::DeviceId => "deviceid",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Field::MqttServer => "MQTT Server",
            Field::MqttUser => "MQTT Username",
            Field::MqttPassword => "MQTT Password",
            Field::MqttTopic => "MQTT Topic",
            Field::DeviceId => "Device ID",
        }
    }

    pub const fn max_len(self) -> usize {
        match self {
            Field::MqttServer => MQTT_SERVER_LEN,
            Field::MqttUser => MQTT_USER_LEN,
            Field::MqttPassword => MQTT_PASSWORD_LEN,
            Field::MqttTopic => MQTT_TOPIC_LEN,
            Field::DeviceId => DEVICE_ID_LEN,
        }
    }
}

/// Broker and device settings, editable through the provisioning portal and
/// persisted as `/config.txt`.
///
/// Every setter truncates to the field's maximum length in bytes (on a UTF-8
/// character boundary). Values are never validated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    mqtt_server: String<MQTT_SERVER_LEN>,
    mqtt_user: String<MQTT_USER_LEN>,
    mqtt_password: String<MQTT_PASSWORD_LEN>,
    mqtt_topic: String<MQTT_TOPIC_LEN>,
    device_id: String<DEVICE_ID_LEN>,
}

impl DeviceConfig {
    pub fn new(
        mqtt_server: &str,
        mqtt_user: &str,
        mqtt_password: &str,
        mqtt_topic: &str,
        device_id: &str,
    ) -> Self {
        let mut config = Self::default();
        config.set(Field::MqttServer, mqtt_server);
        config.set(Field::MqttUser, mqtt_user);
        config.set(Field::MqttPassword, mqtt_password);
        config.set(Field::MqttTopic, mqtt_topic);
        config.set(Field::DeviceId, device_id);
        config
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::MqttServer => &self.mqtt_server,
            Field::MqttUser => &self.mqtt_user,
            Field::MqttPassword => &self.mqtt_password,
            Field::MqttTopic => &self.mqtt_topic,
            Field::DeviceId => &self.device_id,
        }
    }

    pub fn set(&mut self, field: Field, value: &str) {
        match field {
            Field::MqttServer => assign(&mut self.mqtt_server, value),
            Field::MqttUser => assign(&mut self.mqtt_user, value),
            Field::MqttPassword => assign(&mut self.mqtt_password, value),
            Field::MqttTopic => assign(&mut self.mqtt_topic, value),
            Field::DeviceId => assign(&mut self.device_id, value),
        }
    }

    pub fn mqtt_server(&self) -> &str {
        &self.mqtt_server
    }

    pub fn mqtt_user(&self) -> &str {
        &self.mqtt_user
    }

    pub fn mqtt_password(&self) -> &str {
        &self.mqtt_password
    }

    pub fn mqtt_topic(&self) -> &str {
        &self.mqtt_topic
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Overwrites fields from newline-delimited text, in storage order.
    ///
    /// Lines beyond the fifth are ignored; fields without a line keep their
    /// current value.
    pub fn apply_lines(&mut self, text: &[u8]) {
        for (field, line) in Field::ALL.into_iter().zip(Lines::new(text)) {
            self.set(field, line);
        }
    }

    /// Appends the five fields, one per line, to `out`.
    pub fn write_lines<const N: usize>(
        &self,
        out: &mut heapless::Vec<u8, N>,
    ) -> Result<(), CapacityError> {
        for field in Field::ALL {
            push_line(out, self.get(field))?;
        }
        Ok(())
    }

    /// Dumps every value to the log, secrets included.
    pub fn log(&self) {
        info!("=== Current Configuration ===");
        for field in Field::ALL {
            info!("{}: {}", field.label(), self.get(field));
        }
        info!("=============================");
    }
}

/// Network credentials captured by the provisioning portal and persisted as
/// `/wifi.txt`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WifiCredentials {
    ssid: String<WIFI_SSID_LEN>,
    psk: String<WIFI_PSK_LEN>,
}

impl WifiCredentials {
    pub fn new(ssid: &str, psk: &str) -> Self {
        let mut credentials = Self::default();
        credentials.set_ssid(ssid);
        credentials.set_psk(psk);
        credentials
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn psk(&self) -> &str {
        &self.psk
    }

    pub fn set_ssid(&mut self, ssid: &str) {
        assign(&mut self.ssid, ssid);
    }

    pub fn set_psk(&mut self, psk: &str) {
        assign(&mut self.psk, psk);
    }

    pub fn is_empty(&self) -> bool {
        self.ssid.is_empty()
    }

    pub fn apply_lines(&mut self, text: &[u8]) {
        let mut lines = Lines::new(text);
        if let Some(ssid) = lines.next() {
            self.set_ssid(ssid);
        }
        if let Some(psk) = lines.next() {
            self.set_psk(psk);
        }
    }

    pub fn write_lines<const N: usize>(
        &self,
        out: &mut heapless::Vec<u8, N>,
    ) -> Result<(), CapacityError> {
        push_line(out, &self.ssid)?;
        push_line(out, &self.psk)
    }
}

/// The encoded text did not fit in the output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError;

/// Cuts `value` to at most `max` bytes without splitting a character.
pub fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn assign<const N: usize>(target: &mut String<N>, value: &str) {
    target.clear();
    // cannot overflow once truncated to N
    let _ = target.push_str(truncate(value, N));
}

fn push_line<const N: usize>(
    out: &mut heapless::Vec<u8, N>,
    value: &str,
) -> Result<(), CapacityError> {
    out.extend_from_slice(value.as_bytes())
        .map_err(|_| CapacityError)?;
    out.push(b'\n').map_err(|_| CapacityError)
}

/// Iterates over `\n`-terminated lines; a trailing `\r` is dropped and the
/// text after the last newline counts only when non-empty.
struct Lines<'a> {
    text: &'a [u8],
}

impl<'a> Lines<'a> {
    fn new(text: &'a [u8]) -> Self {
        Self { text }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.text.is_empty() {
            return None;
        }
        let (line, rest) = match self.text.iter().position(|b| *b == b'\n') {
            Some(end) => (&self.text[..end], &self.text[end + 1..]),
            None => (self.text, &[][..]),
        };
        self.text = rest;
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Some(utf8_prefix(line))
    }
}

/// Longest valid UTF-8 prefix of `bytes`.
pub fn utf8_prefix(bytes: &[u8]) -> &str {
    match core::str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
    }
}
