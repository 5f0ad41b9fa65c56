//! Provisioning portal: the capability trait the boot flow drives, plus the
//! HTML form and HTTP request handling served by the access point.

use core::fmt::{self, Write};

use heapless::Vec;

use crate::config::{utf8_prefix, DeviceConfig, Field, WifiCredentials};
use crate::constants::{WIFI_PSK_LEN, WIFI_SSID_LEN};

/// Form input name of the network SSID
pub const SSID_FIELD: &str = "ssid";
/// Form input name of the network passphrase
pub const PSK_FIELD: &str = "psk";

/// Values entered by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub config: DeviceConfig,
    pub credentials: WifiCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalError {
    /// Nobody submitted the form before the portal timeout
    TimedOut,
    /// The access point could not be started
    Radio,
    /// The portal server failed
    Network,
}

/// How long an open portal waits for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PortalTimeout {
    /// Wait until the form is submitted
    #[default]
    Unbounded,
    Seconds(u32),
}

impl PortalTimeout {
    /// `0` keeps the portal open until a submission arrives.
    pub const fn from_seconds(seconds: u32) -> Self {
        if seconds == 0 {
            Self::Unbounded
        } else {
            Self::Seconds(seconds)
        }
    }
}

/// Opens an access point serving the configuration form and waits for a
/// submission.
pub trait Portal {
    async fn run(
        &mut self,
        config: &DeviceConfig,
        credentials: &WifiCredentials,
    ) -> Result<Submission, PortalError>;
}

/// Writes the configuration page, pre-filled with the current values.
pub fn render_form(
    config: &DeviceConfig,
    credentials: &WifiCredentials,
    out: &mut impl Write,
) -> fmt::Result {
    out.write_str(PAGE_HEAD)?;
    out.write_str("<h1>Sensor setup</h1><form method=\"post\" action=\"/save\">")?;
    input(out, SSID_FIELD, "WiFi SSID", credentials.ssid(), WIFI_SSID_LEN, "text")?;
    input(out, PSK_FIELD, "WiFi Password", credentials.psk(), WIFI_PSK_LEN, "password")?;
    for field in Field::ALL {
        input(out, field.id(), field.label(), config.get(field), field.max_len(), "text")?;
    }
    out.write_str("<button type=\"submit\">Save</button></form></body></html>")
}

/// Writes the confirmation page shown after a submission.
pub fn render_saved(out: &mut impl Write) -> fmt::Result {
    out.write_str(PAGE_HEAD)?;
    out.write_str("<h1>Saved</h1><p>The sensor will now connect.</p></body></html>")
}

const PAGE_HEAD: &str = "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">\
<title>Sensor setup</title></head><body>";

fn input(
    out: &mut impl Write,
    id: &str,
    label: &str,
    value: &str,
    max_len: usize,
    kind: &str,
) -> fmt::Result {
    write!(
        out,
        "<label for=\"{id}\">{label}</label><br><input id=\"{id}\" name=\"{id}\" type=\"{kind}\" maxlength=\"{max_len}\" value=\""
    )?;
    escape_html(out, value)?;
    out.write_str("\"><br>")
}

fn escape_html(out: &mut impl Write, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' => out.write_str("&quot;")?,
            '\'' => out.write_str("&#39;")?,
            c => out.write_char(c)?,
        }
    }
    Ok(())
}

/// Decodes an `application/x-www-form-urlencoded` body on top of the current
/// values. Unknown keys are ignored, absent keys keep their current value and
/// every value is truncated to its field limit.
pub fn parse_submission(
    body: &[u8],
    config: &DeviceConfig,
    credentials: &WifiCredentials,
) -> Submission {
    let mut submission = Submission {
        config: config.clone(),
        credentials: credentials.clone(),
    };

    for pair in body.split(|b| *b == b'&') {
        let (key, value) = match pair.iter().position(|b| *b == b'=') {
            Some(eq) => (&pair[..eq], &pair[eq + 1..]),
            None => (pair, &[][..]),
        };
        let key: DecodeBuf = percent_decode(key);
        let value: DecodeBuf = percent_decode(value);
        let value = utf8_prefix(&value);

        match utf8_prefix(&key) {
            SSID_FIELD => submission.credentials.set_ssid(value),
            PSK_FIELD => submission.credentials.set_psk(value),
            key => {
                if let Some(field) = Field::ALL.into_iter().find(|f| f.id() == key) {
                    submission.config.set(field, value);
                }
            }
        }
    }

    submission
}

/// Longer than any field so truncation happens on whole characters.
type DecodeBuf = Vec<u8, 256>;

fn percent_decode<const N: usize>(input: &[u8]) -> Vec<u8, N> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < input.len() {
        let decoded = match input[i] {
            b'+' => b' ',
            b'%' => match (input.get(i + 1).and_then(hex), input.get(i + 2).and_then(hex)) {
                (Some(hi), Some(lo)) => {
                    i += 2;
                    hi << 4 | lo
                }
                _ => b'%',
            },
            other => other,
        };
        if out.push(decoded).is_err() {
            break;
        }
        i += 1;
    }
    out
}

fn hex(digit: &u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Other,
}

/// A complete HTTP/1.x request held in the receive buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// More bytes are needed
    Incomplete,
    Malformed,
}

/// What the portal answers to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Form,
    Save,
    /// Anything else is sent back to the form so captive-portal checks land on it
    Redirect,
}

impl Request<'_> {
    pub fn route(&self) -> Route {
        let path = self.path.split('?').next().unwrap_or_default();
        match (self.method, path) {
            (Method::Get, "/") => Route::Form,
            (Method::Post, "/save") => Route::Save,
            _ => Route::Redirect,
        }
    }
}

/// Parses the request line, headers and body out of `buf`.
pub fn parse_request(buf: &[u8]) -> Result<Request<'_>, RequestError> {
    let head_end = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or(RequestError::Incomplete)?;
    let head = core::str::from_utf8(&buf[..head_end]).map_err(|_| RequestError::Malformed)?;

    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = match request_line.next() {
        Some("GET") => Method::Get,
        Some("POST") => Method::Post,
        Some(m) if !m.is_empty() => Method::Other,
        _ => return Err(RequestError::Malformed),
    };
    let path = request_line.next().ok_or(RequestError::Malformed)?;

    let mut content_length = 0usize;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse()
                    .map_err(|_| RequestError::Malformed)?;
            }
        }
    }

    let body_start = head_end + 4;
    let body_end = body_start
        .checked_add(content_length)
        .ok_or(RequestError::Malformed)?;
    let body = buf
        .get(body_start..body_end)
        .ok_or(RequestError::Incomplete)?;

    Ok(Request { method, path, body })
}
