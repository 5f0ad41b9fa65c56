use core::fmt::Write as _;
use core::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use edge_dhcp::{
    io::{self, DEFAULT_SERVER_PORT},
    server::{Server, ServerOptions},
};
use edge_nal::UdpBind;
use edge_nal_embassy::{Udp, UdpBuffers};
use embassy_net::{tcp::TcpSocket, Stack};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use heapless::String;
use log::{info, warn};

use sensor_core::portal::{
    parse_request, parse_submission, render_form, render_saved, PortalError, RequestError, Route,
    Submission,
};
use sensor_core::{DeviceConfig, WifiCredentials};

use crate::constants::*;

#[derive(Debug)]
enum Error {
    #[allow(dead_code)]
    Socket(embassy_net::tcp::Error),
    Closed,
    RequestTooLarge,
    MalformedRequest,
    PageTooLarge,
}

/// Serves the configuration form on the access point until it is submitted.
pub async fn serve(
    stack: Stack<'static>,
    config: &DeviceConfig,
    credentials: &WifiCredentials,
) -> Result<Submission, PortalError> {
    let mut rx_buffer = [0u8; RX_BUFFER_SIZE];
    let mut tx_buffer = [0u8; TX_BUFFER_SIZE];
    let mut request = [0u8; PORTAL_REQUEST_BUFFER_SIZE];

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

        if let Err(e) = socket.accept(PORTAL_PORT).await {
            warn!("Portal accept failed: {:?}", e);
            return Err(PortalError::Network);
        }

        let outcome = handle(&mut socket, &mut request, config, credentials).await;
        socket.close();
        let _ = socket.flush().await;
        socket.abort();

        match outcome {
            Ok(Some(submission)) => {
                info!("Configuration submitted");
                return Ok(submission);
            }
            Ok(None) => {}
            Err(e) => warn!("Portal request failed: {:?}", e),
        }
    }
}

async fn handle(
    socket: &mut TcpSocket<'_>,
    buf: &mut [u8],
    config: &DeviceConfig,
    credentials: &WifiCredentials,
) -> Result<Option<Submission>, Error> {
    let mut len = 0;
    loop {
        if len == buf.len() {
            return Err(Error::RequestTooLarge);
        }
        let n = socket.read(&mut buf[len..]).await.map_err(Error::Socket)?;
        if n == 0 {
            return Err(Error::Closed);
        }
        len += n;
        match parse_request(&buf[..len]) {
            Ok(_) => break,
            Err(RequestError::Incomplete) => continue,
            Err(RequestError::Malformed) => return Err(Error::MalformedRequest),
        }
    }
    let request = parse_request(&buf[..len]).map_err(|_| Error::MalformedRequest)?;

    let mut page: String<PORTAL_PAGE_SIZE> = String::new();
    match request.route() {
        Route::Form => {
            render_form(config, credentials, &mut page).map_err(|_| Error::PageTooLarge)?;
            respond(socket, "200 OK", &page).await?;
            Ok(None)
        }
        Route::Save => {
            let submission = parse_submission(request.body, config, credentials);
            render_saved(&mut page).map_err(|_| Error::PageTooLarge)?;
            respond(socket, "200 OK", &page).await?;
            Ok(Some(submission))
        }
        Route::Redirect => {
            let mut head: String<128> = String::new();
            write!(
                head,
                "HTTP/1.1 302 Found\r\nLocation: http://{}/\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                Ipv4Addr::from(AP_ADDRESS)
            )
            .map_err(|_| Error::PageTooLarge)?;
            socket
                .write_all(head.as_bytes())
                .await
                .map_err(Error::Socket)?;
            Ok(None)
        }
    }
}

async fn respond(socket: &mut TcpSocket<'_>, status: &str, body: &str) -> Result<(), Error> {
    let mut head: String<128> = String::new();
    write!(
        head,
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    )
    .map_err(|_| Error::PageTooLarge)?;

    socket
        .write_all(head.as_bytes())
        .await
        .map_err(Error::Socket)?;
    socket
        .write_all(body.as_bytes())
        .await
        .map_err(Error::Socket)?;
    socket.flush().await.map_err(Error::Socket)
}

/// Hands out addresses on the access point network.
#[embassy_executor::task]
pub async fn dhcp_task(stack: Stack<'static>, ip: Ipv4Addr) {
    let mut buf = [0u8; 1500];
    let mut gw_buf = [Ipv4Addr::UNSPECIFIED];

    let buffers = UdpBuffers::<3, 1024, 1024, 10>::new();
    let unbound_socket = Udp::new(stack, &buffers);

    loop {
        let mut bound_socket = match unbound_socket
            .bind(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::UNSPECIFIED,
                DEFAULT_SERVER_PORT,
            )))
            .await
        {
            Ok(socket) => socket,
            Err(e) => {
                warn!("DHCP server bind failed: {:?}", e);
                Timer::after(Duration::from_millis(500)).await;
                continue;
            }
        };

        loop {
            let _ = io::server::run(
                &mut Server::<_, 64>::new_with_et(ip),
                &ServerOptions::new(ip, Some(&mut gw_buf)),
                &mut bound_socket,
                &mut buf,
            )
            .await
            .inspect_err(|e| warn!("DHCP server error: {:?}", e));
            Timer::after(Duration::from_millis(500)).await;
        }
    }
}
