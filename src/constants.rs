/// Current firmware version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size of the heap in DRAM, used by the Wi-Fi driver
pub const HEAP_SIZE: usize = 72 * 1024;

/// Flash offset of the device configuration file (the `nvs` partition)
pub const CONFIG_FLASH_OFFSET: u32 = 0x9000;
/// Flash offset of the Wi-Fi credentials file
pub const WIFI_FLASH_OFFSET: u32 = 0xA000;

/// I2C bus frequency of the AHT20
pub const I2C_FREQUENCY_KHZ: u32 = 100;

/// Size of the TCP socket receive buffer
pub const RX_BUFFER_SIZE: usize = 2048;
/// Size of the TCP socket transmit buffer
pub const TX_BUFFER_SIZE: usize = 2048;
/// Timeout of a TCP socket with no traffic
pub const SOCKET_TIMEOUT_SECS: u64 = 30;

/// Size of the MQTT client receive buffer
pub const MQTT_RX_BUFFER_SIZE: usize = 512;
/// Size of the MQTT client transmit buffer
pub const MQTT_TX_BUFFER_SIZE: usize = 512;
/// Maximum number of MQTT v5 properties per packet
pub const MQTT_MAX_PROPERTIES: usize = 5;
/// MQTT keep-alive advertised to the broker
pub const MQTT_KEEP_ALIVE_SECS: u16 = 60;

/// Time allowed for one station join attempt
pub const WIFI_CONNECT_TIMEOUT_SECS: u64 = 20;
/// Wait before rejoining after the station lost the network
pub const WIFI_RECONNECT_DELAY_MS: u64 = 5000;
/// Time allowed for DHCP to hand out an address after a join
pub const DHCP_TIMEOUT_SECS: u64 = 15;

/// Address of the configuration access point
pub const AP_ADDRESS: [u8; 4] = [192, 168, 4, 1];
/// Prefix length of the access point network
pub const AP_PREFIX_LEN: u8 = 24;
/// TCP port of the configuration portal
pub const PORTAL_PORT: u16 = 80;
/// Receive buffer of a portal HTTP request
pub const PORTAL_REQUEST_BUFFER_SIZE: usize = 1024;
/// Largest portal page
pub const PORTAL_PAGE_SIZE: usize = 4096;
