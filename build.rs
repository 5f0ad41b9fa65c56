use std::{env, error::Error, fs, path::Path};

use serde::Deserialize;

#[derive(Deserialize)]
struct RawDefaults {
    mqtt_server: String,
    mqtt_port: u16,
    mqtt_user: String,
    mqtt_password: String,
    mqtt_topic: String,
    device_id: String,
    publish_interval_ms: u32,
    reconnect_delay_ms: u32,
    ap_ssid: String,
    #[serde(default)]
    portal_timeout_seconds: u32,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Tell Cargo to rerun if toml changes
    println!("cargo:rerun-if-changed=cfg.toml");

    // Read and parse
    let toml_str = fs::read_to_string("cfg.toml")?;
    let raw: RawDefaults = toml::from_str(&toml_str)?;

    if raw.ap_ssid.len() > 32 {
        return Err("ap_ssid must be at most 32 bytes".into());
    }

    // Generate Rust code
    let out_dir = env::var("OUT_DIR")?;
    let dest_path = Path::new(&out_dir).join("defaults.rs");
    let code = format!(
        r#"
        pub const DEFAULTS: Defaults = Defaults {{
            mqtt_server: {server:?},
            mqtt_port: {port},
            mqtt_user: {user:?},
            mqtt_password: {password:?},
            mqtt_topic: {topic:?},
            device_id: {device_id:?},
            publish_interval_ms: {interval},
            reconnect_delay_ms: {reconnect},
            ap_ssid: {ap_ssid:?},
            portal_timeout_seconds: {portal_timeout},
        }};
    "#,
        server = raw.mqtt_server,
        port = raw.mqtt_port,
        user = raw.mqtt_user,
        password = raw.mqtt_password,
        topic = raw.mqtt_topic,
        device_id = raw.device_id,
        interval = raw.publish_interval_ms,
        reconnect = raw.reconnect_delay_ms,
        ap_ssid = raw.ap_ssid,
        portal_timeout = raw.portal_timeout_seconds,
    );

    fs::write(dest_path, code)?;
    Ok(())
}
