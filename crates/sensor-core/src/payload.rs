use core::fmt::{self, Write};

use heapless::String;

use crate::constants::PAYLOAD_MAX_LEN;
use crate::sensors::Reading;

/// Formats a reading as the JSON document published to the broker:
///
/// ```text
/// {"device_id": "dev1", "temperature": 21.50, "humidity": 55.25}
/// ```
pub fn format_payload(
    device_id: &str,
    reading: &Reading,
) -> Result<String<PAYLOAD_MAX_LEN>, fmt::Error> {
    let mut payload = String::new();
    payload.write_str("{\"device_id\": \"")?;
    write_escaped(&mut payload, device_id)?;
    write!(
        payload,
        "\", \"temperature\": {:.2}, \"humidity\": {:.2}}}",
        reading.temperature_c, reading.humidity_pct
    )?;
    Ok(payload)
}

fn write_escaped(out: &mut impl Write, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    Ok(())
}
