use embassy_net::tcp::{ConnectError, TcpSocket};
use embassy_net::{
    dns::{DnsQueryType, Error as DNSError},
    Stack,
};
use embassy_time::Duration;

use crate::constants::SOCKET_TIMEOUT_SECS;

#[derive(Debug)]
pub enum Error {
    #[allow(dead_code)]
    DNSQueryFailed(DNSError),
    DNSLookupFailed,
    #[allow(dead_code)]
    SocketConnectionError(ConnectError),
}

/// Resolves `hostname` (an IPv4 literal resolves to itself) and opens a plain
/// TCP connection to it.
pub async fn connect<'a>(
    stack: Stack<'a>,
    rx_buffer: &'a mut [u8],
    tx_buffer: &'a mut [u8],
    hostname: &str,
    port: u16,
) -> Result<TcpSocket<'a>, Error> {
    let addr = stack
        .dns_query(hostname, DnsQueryType::A)
        .await
        .map_err(Error::DNSQueryFailed)?
        .first()
        .copied()
        .ok_or(Error::DNSLookupFailed)?;

    let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

    log::info!("Connecting TCP socket to {}:{}", hostname, port);
    socket
        .connect((addr, port))
        .await
        .map_err(Error::SocketConnectionError)?;
    log::info!("TCP connected");

    Ok(socket)
}
