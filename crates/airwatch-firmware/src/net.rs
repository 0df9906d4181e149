//! WiFi station link, SNTP clock, UDP telemetry and the status server

use alloc::format;
use core::fmt::{Debug, Write as _};
use core::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use airwatch_core::app_state::Monitor;
use airwatch_core::config::WifiCredentials;
use airwatch_core::error::message;
use airwatch_core::network::{NetworkError, NetworkLink, NetworkPublisher, TimeSync};
use airwatch_core::tasks::serve_request;
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant, Timer, with_timeout};
use esp_radio::wifi::{ClientConfig, Config, WifiController, WifiStaState};
use log::{debug, info, warn};
use sntpc::{NtpContext, NtpTimestampGenerator, get_time};

const ASSOCIATE_TIMEOUT: Duration = Duration::from_secs(15);
const DHCP_TIMEOUT: Duration = Duration::from_secs(10);
/// Tried in order until one answers.
const NTP_SERVERS: [&str; 3] = ["pool.ntp.org", "time.google.com", "time.cloudflare.com"];
const NTP_PORT: u16 = 123;
const STATUS_PORT: u16 = 80;

fn connect_error(e: impl Debug) -> NetworkError {
    NetworkError::Connect(message(&format!("{:?}", e)))
}

fn sync_error(e: impl Debug) -> NetworkError {
    NetworkError::TimeSync(message(&format!("{:?}", e)))
}

fn publish_error(e: impl Debug) -> NetworkError {
    NetworkError::Publish(message(&format!("{:?}", e)))
}

/// Station-mode association plus DHCP on the embassy-net stack.
pub struct WifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
}

impl WifiLink {
    pub fn new(controller: WifiController<'static>, stack: Stack<'static>) -> Self {
        Self { controller, stack }
    }

    async fn wait_for_address(&self) -> Ipv4Addr {
        loop {
            if let Some(config) = self.stack.config_v4() {
                return config.address.address();
            }
            Timer::after(Duration::from_millis(500)).await;
        }
    }
}

impl NetworkLink for WifiLink {
    async fn connect(&mut self, credentials: &WifiCredentials) -> Result<Ipv4Addr, NetworkError> {
        if !matches!(self.controller.is_started(), Ok(true)) {
            let config = Config::Client(
                ClientConfig::default()
                    .with_ssid(credentials.ssid.as_str().into())
                    .with_password(credentials.password.as_str().into()),
            );
            self.controller.set_config(&config).map_err(connect_error)?;
            self.controller.start_async().await.map_err(connect_error)?;
            info!(" WiFi: radio started");
        }

        debug!(" WiFi: associating with {}", credentials.ssid);
        with_timeout(ASSOCIATE_TIMEOUT, self.controller.connect_async())
            .await
            .map_err(|_| NetworkError::Timeout {
                operation: "associate",
            })?
            .map_err(connect_error)?;

        with_timeout(DHCP_TIMEOUT, self.wait_for_address())
            .await
            .map_err(|_| NetworkError::Timeout { operation: "DHCP" })
    }

    fn is_connected(&self) -> bool {
        esp_radio::wifi::sta_state() == WifiStaState::Connected && self.stack.is_config_up()
    }
}

/// NTP timestamps from the monotonic clock; only the round-trip offset
/// matters to sntpc.
#[derive(Clone, Copy, Default)]
struct Uptime {
    micros: u64,
}

impl NtpTimestampGenerator for Uptime {
    fn init(&mut self) {
        self.micros = Instant::now().as_micros();
    }

    fn timestamp_sec(&self) -> u64 {
        self.micros / 1_000_000
    }

    fn timestamp_subsec_micros(&self) -> u32 {
        (self.micros % 1_000_000) as u32
    }
}

pub struct SntpClock {
    stack: Stack<'static>,
    rx_meta: [PacketMetadata; 4],
    rx_buffer: [u8; 128],
    tx_meta: [PacketMetadata; 4],
    tx_buffer: [u8; 128],
}

impl SntpClock {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            rx_meta: [PacketMetadata::EMPTY; 4],
            rx_buffer: [0; 128],
            tx_meta: [PacketMetadata::EMPTY; 4],
            tx_buffer: [0; 128],
        }
    }
}

impl SntpClock {
    async fn query(&mut self, server: &str) -> Result<u64, NetworkError> {
        let addrs = self
            .stack
            .dns_query(server, DnsQueryType::A)
            .await
            .map_err(sync_error)?;
        let Some(addr) = addrs.first() else {
            return Err(NetworkError::TimeSync(message("NTP server did not resolve")));
        };
        let addr: IpAddr = (*addr).into();

        let mut socket = UdpSocket::new(
            self.stack,
            &mut self.rx_meta,
            &mut self.rx_buffer,
            &mut self.tx_meta,
            &mut self.tx_buffer,
        );
        socket.bind(NTP_PORT).map_err(sync_error)?;

        let time = get_time(
            SocketAddr::new(addr, NTP_PORT),
            &socket,
            NtpContext::new(Uptime::default()),
        )
        .await
        .map_err(sync_error)?;
        Ok(time.sec() as u64)
    }
}

impl TimeSync for SntpClock {
    async fn sync(&mut self) -> Result<u64, NetworkError> {
        let mut last_error = NetworkError::TimeSync(message("no NTP servers"));
        for server in NTP_SERVERS {
            match self.query(server).await {
                Ok(unix) => {
                    debug!(" NTP: synced from {}", server);
                    return Ok(unix);
                }
                Err(e) => {
                    debug!(" NTP: {} failed: {}", server, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

/// Sends each point as one `"<topic> <value>\n"` datagram to a collector.
pub struct UdpPublisher {
    stack: Stack<'static>,
    collector: IpEndpoint,
    rx_meta: [PacketMetadata; 1],
    rx_buffer: [u8; 16],
    tx_meta: [PacketMetadata; 8],
    tx_buffer: [u8; 512],
}

impl UdpPublisher {
    pub fn new(stack: Stack<'static>, collector: SocketAddrV4) -> Self {
        info!(" Publish: collector at {}", collector);
        Self {
            stack,
            collector: IpEndpoint::new(IpAddress::Ipv4(*collector.ip()), collector.port()),
            rx_meta: [PacketMetadata::EMPTY; 1],
            rx_buffer: [0; 16],
            tx_meta: [PacketMetadata::EMPTY; 8],
            tx_buffer: [0; 512],
        }
    }
}

impl NetworkPublisher for UdpPublisher {
    async fn publish(&mut self, topic: &str, value: f32) -> Result<(), NetworkError> {
        let mut line: heapless::String<64> = heapless::String::new();
        writeln!(line, "{} {:.2}", topic, value)
            .map_err(|_| NetworkError::Publish(message("line too long")))?;

        let mut socket = UdpSocket::new(
            self.stack,
            &mut self.rx_meta,
            &mut self.rx_buffer,
            &mut self.tx_meta,
            &mut self.tx_buffer,
        );
        socket.bind(0).map_err(publish_error)?;
        socket
            .send_to(line.as_bytes(), self.collector)
            .await
            .map_err(publish_error)
    }
}

async fn write_all(socket: &mut TcpSocket<'_>, mut data: &[u8]) -> Result<(), embassy_net::tcp::Error> {
    while !data.is_empty() {
        let written = socket.write(data).await?;
        data = &data[written..];
    }
    Ok(())
}

/// Serve the status page and the JSON API on port 80, one client at a time.
///
/// Every request registers a network session, which holds both power
/// domains awake while someone is looking.
pub async fn serve_status(stack: Stack<'static>, monitor: &Monitor<CriticalSectionRawMutex>) {
    let mut rx_buffer = [0u8; 512];
    let mut tx_buffer = [0u8; 1024];
    info!(" Status: listening on port {}", STATUS_PORT);

    while monitor.is_running() {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(10)));

        if let Err(e) = socket.accept(STATUS_PORT).await {
            warn!(" Status: accept failed: {:?}", e);
            continue;
        }
        let client = match socket.remote_endpoint() {
            Some(IpEndpoint {
                addr: IpAddress::Ipv4(addr),
                ..
            }) => u32::from(addr),
            _ => 0,
        };

        // Only the request line matters; the rest of the request is ignored.
        let mut request = [0u8; 256];
        let len = match socket.read(&mut request).await {
            Ok(len) => len,
            Err(e) => {
                debug!(" Status: read failed: {:?}", e);
                0
            }
        };

        let response = serve_request(monitor, &request[..len], client, Instant::now());
        let result = match write_all(&mut socket, response.head().as_bytes()).await {
            Ok(()) => write_all(&mut socket, &response.body).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                if let Err(e) = socket.flush().await {
                    debug!(" Status: flush failed: {:?}", e);
                }
            }
            Err(e) => warn!(" Status: write failed: {:?}", e),
        }
        socket.close();
    }
}
