//! WiFi station uplink and the single telemetry request
//!
//! Association and DHCP are bounded together by the timeout the wake cycle
//! passes in. The embassy-net runner must be polled concurrently for DHCP,
//! DNS, and TCP to make progress.

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, with_timeout};
use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController};
use log::{debug, error, info};
use tempnode_core::config::InternetConfig;
use tempnode_core::cycle::Uplink;
use tempnode_core::http::{self, HttpError};
use thiserror_no_std::Error;

/// Inactivity timeout for the telemetry connection.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
const SOCKET_BUFFER_SIZE: usize = 1024;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    #[error("WiFi driver error")]
    Wifi,
    #[error("no network link after {} s", .timeout.as_secs())]
    AssociationTimeout { timeout: Duration },
    #[error("DNS lookup of the telemetry host failed")]
    Dns,
    #[error("TCP connect failed")]
    Connect,
    #[error("TCP socket error")]
    Socket,
    #[error(transparent)]
    Http(#[from] HttpError),
}

impl embedded_io_async::Error for NetworkError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Socket | Self::Connect => ErrorKind::BrokenPipe,
            Self::AssociationTimeout { .. } => ErrorKind::TimedOut,
            _ => ErrorKind::Other,
        }
    }
}

/// `TcpSocket` behind the `embedded-io-async` traits the HTTP client uses.
pub struct TcpConnection<'a> {
    socket: TcpSocket<'a>,
}

impl<'a> TcpConnection<'a> {
    pub fn new(stack: Stack<'a>, rx_buffer: &'a mut [u8], tx_buffer: &'a mut [u8]) -> Self {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        Self { socket }
    }

    pub async fn connect(&mut self, endpoint: IpEndpoint) -> Result<(), NetworkError> {
        self.socket.connect(endpoint).await.map_err(|e| {
            error!("TCP connect to {} failed: {:?}", endpoint, e);
            NetworkError::Connect
        })
    }

    pub fn close(&mut self) {
        self.socket.close();
    }
}

impl ErrorType for TcpConnection<'_> {
    type Error = NetworkError;
}

impl Read for TcpConnection<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.socket
            .read(buf)
            .await
            .map_err(|_| NetworkError::Socket)
    }
}

impl Write for TcpConnection<'_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.socket
            .write(buf)
            .await
            .map_err(|_| NetworkError::Socket)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.socket
            .flush()
            .await
            .map_err(|_| NetworkError::Socket)
    }
}

pub struct WifiUplink<'a> {
    controller: WifiController<'a>,
    stack: Stack<'a>,
    credentials: InternetConfig<'a>,
}

impl<'a> WifiUplink<'a> {
    pub fn new(
        controller: WifiController<'a>,
        stack: Stack<'a>,
        credentials: InternetConfig<'a>,
    ) -> Self {
        Self {
            controller,
            stack,
            credentials,
        }
    }

    async fn join(&mut self) -> Result<(), NetworkError> {
        let config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(self.credentials.ssid.into())
                .with_password(self.credentials.password.into()),
        );
        self.controller.set_config(&config).map_err(|e| {
            error!("WiFi config rejected: {:?}", e);
            NetworkError::Wifi
        })?;
        self.controller.start_async().await.map_err(|e| {
            error!("WiFi start failed: {:?}", e);
            NetworkError::Wifi
        })?;
        self.controller.connect_async().await.map_err(|e| {
            error!("WiFi connect failed: {:?}", e);
            NetworkError::Wifi
        })?;

        debug!("Associated, waiting for DHCP");
        self.stack.wait_config_up().await;
        if let Some(config) = self.stack.config_v4() {
            info!("IP address {}", config.address);
        }
        Ok(())
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<IpEndpoint, NetworkError> {
        let address = self
            .stack
            .dns_query(host, DnsQueryType::A)
            .await
            .map_err(|e| {
                error!("DNS query for {} failed: {:?}", host, e);
                NetworkError::Dns
            })?
            .first()
            .copied()
            .ok_or(NetworkError::Dns)?;

        Ok(IpEndpoint::new(address, port))
    }
}

impl Uplink for WifiUplink<'_> {
    type Error = NetworkError;

    async fn associate(&mut self, timeout: Duration) -> Result<(), NetworkError> {
        with_timeout(timeout, self.join())
            .await
            .map_err(|_| NetworkError::AssociationTimeout { timeout })?
    }

    async fn get(&mut self, host: &str, port: u16, target: &str) -> Result<u16, NetworkError> {
        let endpoint = self.resolve(host, port).await?;
        debug!("Resolved {} to {}", host, endpoint);

        let mut rx_buffer = [0u8; SOCKET_BUFFER_SIZE];
        let mut tx_buffer = [0u8; SOCKET_BUFFER_SIZE];
        let mut conn = TcpConnection::new(self.stack, &mut rx_buffer, &mut tx_buffer);
        conn.connect(endpoint).await?;

        let status = http::get(&mut conn, host, target).await;
        conn.close();
        Ok(status?)
    }
}
