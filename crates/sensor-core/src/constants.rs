/// Maximum length in bytes of the MQTT broker address
pub const MQTT_SERVER_LEN: usize = 40;
/// Maximum length in bytes of the MQTT username
pub const MQTT_USER_LEN: usize = 40;
/// Maximum length in bytes of the MQTT password
pub const MQTT_PASSWORD_LEN: usize = 40;
/// Maximum length in bytes of the MQTT publish topic
pub const MQTT_TOPIC_LEN: usize = 64;
/// Maximum length in bytes of the device identifier (also the MQTT client id)
pub const DEVICE_ID_LEN: usize = 40;

/// Maximum length in bytes of a Wi-Fi SSID
pub const WIFI_SSID_LEN: usize = 32;
/// Maximum length in bytes of a WPA2 passphrase
pub const WIFI_PSK_LEN: usize = 64;

/// Name of the flat file holding the device configuration
pub const CONFIG_FILE_NAME: &str = "/config.txt";
/// Name of the flat file holding the Wi-Fi credentials
pub const WIFI_FILE_NAME: &str = "/wifi.txt";

/// Largest flat file record, header and checksum included
pub const MAX_FILE_SIZE: usize = 512;
/// Longest file name accepted by a flat file
pub const MAX_FILE_NAME_LEN: usize = 32;

/// Button debounce wait before entering forced provisioning
pub const TRIGGER_DEBOUNCE_MS: u32 = 500;

/// Pause between two iterations of the connected loop
pub const LOOP_TICK_MS: u32 = 100;

/// Widest `{:.2}` rendering of an `f32`: sign, 39 digits, point, 2 decimals
const MAX_VALUE_LEN: usize = 43;
/// Fixed JSON text around the device id and the two values
const PAYLOAD_FRAME_LEN: usize = 48;
/// Capacity of the formatted MQTT payload. Control characters in the device
/// id are escaped as `\u00XX`, six bytes each.
pub const PAYLOAD_MAX_LEN: usize = PAYLOAD_FRAME_LEN + DEVICE_ID_LEN * 6 + 2 * MAX_VALUE_LEN;
