use embassy_executor::Spawner;
use embassy_net::{Ipv4Address, Ipv4Cidr, Runner, Stack, StackResources, StaticConfigV4};
use embassy_time::{with_timeout, Duration, Timer};

use esp_hal::rng::Rng;
use esp_wifi::{
    wifi::{
        AccessPointConfiguration, AuthMethod, ClientConfiguration, Configuration, WifiController,
        WifiDevice, WifiError, WifiEvent, WifiState,
    },
    EspWifiController,
};

use core::str::FromStr;
use heapless::String;
use log::{error, info, warn};
use static_cell::StaticCell;

use sensor_core::config::truncate;
use sensor_core::portal::{Portal, PortalError, PortalTimeout, Submission};
use sensor_core::provisioning::Network;
use sensor_core::{DeviceConfig, WifiCredentials};

use crate::constants::*;
use crate::portal;

static STA_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
static AP_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();

#[derive(Debug)]
pub enum Error {
    #[allow(dead_code)]
    WifiInitFailed(WifiError),
    HostnameTooLong,
    TaskSpawnFailed,
}

/// The radio with its two network stacks: the station (DHCP client) used to
/// reach the broker and the access point (static address) serving the
/// configuration portal.
pub struct Wifi {
    controller: WifiController<'static>,
    sta: Stack<'static>,
    ap: Stack<'static>,
    ap_ssid: &'static str,
    portal_timeout: PortalTimeout,
}

impl Wifi {
    pub fn new(
        init: &'static EspWifiController<'static>,
        wifi: esp_hal::peripherals::WIFI<'static>,
        mut rng: Rng,
        hostname: &str,
        ap_ssid: &'static str,
        portal_timeout_seconds: u32,
        spawner: Spawner,
    ) -> Result<Self, Error> {
        let (controller, interfaces) =
            esp_wifi::wifi::new(init, wifi).map_err(Error::WifiInitFailed)?;

        let mut dhcp_config = embassy_net::DhcpConfig::default();
        dhcp_config.hostname =
            Some(String::<32>::from_str(truncate(hostname, 32)).map_err(|_| Error::HostnameTooLong)?);

        let seed = (rng.random() as u64) << 32 | rng.random() as u64;

        let sta_config = embassy_net::Config::dhcpv4(dhcp_config);
        let (sta, sta_runner) = embassy_net::new(
            interfaces.sta,
            sta_config,
            STA_RESOURCES.init(StackResources::new()),
            seed,
        );

        let gateway = Ipv4Address::new(AP_ADDRESS[0], AP_ADDRESS[1], AP_ADDRESS[2], AP_ADDRESS[3]);
        let ap_config = embassy_net::Config::ipv4_static(StaticConfigV4 {
            address: Ipv4Cidr::new(gateway, AP_PREFIX_LEN),
            gateway: Some(gateway),
            dns_servers: Default::default(),
        });
        let (ap, ap_runner) = embassy_net::new(
            interfaces.ap,
            ap_config,
            AP_RESOURCES.init(StackResources::new()),
            seed.wrapping_add(1),
        );

        spawner
            .spawn(net_task(sta_runner))
            .map_err(|_| Error::TaskSpawnFailed)?;
        spawner
            .spawn(net_task(ap_runner))
            .map_err(|_| Error::TaskSpawnFailed)?;
        spawner
            .spawn(portal::dhcp_task(ap, gateway))
            .map_err(|_| Error::TaskSpawnFailed)?;

        Ok(Self {
            controller,
            sta,
            ap,
            ap_ssid,
            portal_timeout: PortalTimeout::from_seconds(portal_timeout_seconds),
        })
    }

    /// Hands the radio over to a background task that keeps the station
    /// joined, and returns the station stack.
    pub fn into_background(
        self,
        spawner: Spawner,
        credentials: WifiCredentials,
    ) -> Result<Stack<'static>, Error> {
        spawner
            .spawn(connection(self.controller, credentials))
            .map_err(|_| Error::TaskSpawnFailed)?;
        Ok(self.sta)
    }

    async fn reconfigure(&mut self, configuration: &Configuration) -> Result<(), WifiError> {
        if matches!(self.controller.is_started(), Ok(true)) {
            self.controller.stop_async().await?;
        }
        self.controller.set_configuration(configuration)?;
        self.controller.start_async().await
    }

    async fn wait_for_address(&self) -> bool {
        info!("Waiting to get IP address...");
        let lease = with_timeout(Duration::from_secs(DHCP_TIMEOUT_SECS), async {
            loop {
                if let Some(config) = self.sta.config_v4() {
                    return config.address;
                }
                Timer::after(Duration::from_millis(500)).await;
            }
        })
        .await;

        match lease {
            Ok(address) => {
                info!("Got IP: {}", address);
                true
            }
            Err(_) => {
                warn!("No address from DHCP");
                false
            }
        }
    }
}

fn client_configuration(credentials: &WifiCredentials) -> Configuration {
    let auth_method = if credentials.psk().is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPA2Personal
    };
    Configuration::Client(ClientConfiguration {
        ssid: credentials.ssid().into(),
        password: credentials.psk().into(),
        auth_method,
        ..Default::default()
    })
}

impl Network for Wifi {
    async fn join(&mut self, credentials: &WifiCredentials) -> bool {
        info!("Connecting to wifi with SSID: {:?}", credentials.ssid());
        if let Err(e) = self.reconfigure(&client_configuration(credentials)).await {
            error!("Failed to start WiFi: {:?}", e);
            return false;
        }

        match with_timeout(
            Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS),
            self.controller.connect_async(),
        )
        .await
        {
            Ok(Ok(())) => info!("Wifi connected!"),
            Ok(Err(e)) => {
                info!("Failed to connect to wifi: {e:?}");
                return false;
            }
            Err(_) => {
                info!("Wifi connection timed out");
                return false;
            }
        }

        self.wait_for_address().await
    }
}

impl Portal for Wifi {
    async fn run(
        &mut self,
        config: &DeviceConfig,
        credentials: &WifiCredentials,
    ) -> Result<Submission, PortalError> {
        let access_point = Configuration::AccessPoint(AccessPointConfiguration {
            ssid: self.ap_ssid.into(),
            auth_method: AuthMethod::None,
            ..Default::default()
        });
        self.reconfigure(&access_point).await.map_err(|e| {
            error!("Failed to start access point: {:?}", e);
            PortalError::Radio
        })?;

        info!("Entered config mode");
        info!(
            "AP IP address: {}.{}.{}.{}",
            AP_ADDRESS[0], AP_ADDRESS[1], AP_ADDRESS[2], AP_ADDRESS[3]
        );
        info!("Connect to AP: {}", self.ap_ssid);

        let session = portal::serve(self.ap, config, credentials);
        match self.portal_timeout {
            PortalTimeout::Seconds(seconds) => {
                with_timeout(Duration::from_secs(seconds.into()), session)
                    .await
                    .map_err(|_| {
                        warn!("Configuration portal timed out");
                        PortalError::TimedOut
                    })?
            }
            PortalTimeout::Unbounded => session.await,
        }
    }
}

#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>, credentials: WifiCredentials) {
    info!(
        "Start connection task, device capabilities: {:?}",
        controller.capabilities()
    );
    loop {
        if esp_wifi::wifi::wifi_state() == WifiState::StaConnected {
            // wait until we're no longer connected
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("Wifi disconnected");
            Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
        }

        if !matches!(controller.is_started(), Ok(true)) {
            if let Err(e) = controller.set_configuration(&client_configuration(&credentials)) {
                error!("Failed to set WiFi config: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Starting wifi");
            if let Err(e) = controller.start_async().await {
                error!("Failed to start WiFi: {:?}. Retrying...", e);
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await;
                continue;
            }
            info!("Wifi started!");
        }

        info!("About to connect to {:?}...", credentials.ssid());
        match with_timeout(
            Duration::from_secs(WIFI_CONNECT_TIMEOUT_SECS),
            controller.connect_async(),
        )
        .await
        {
            Ok(Ok(_)) => info!("Wifi connected!"),
            Ok(Err(e)) => {
                info!("Failed to connect to wifi: {e:?}");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
            Err(_) => {
                info!("Wifi connection timed out");
                Timer::after(Duration::from_millis(WIFI_RECONNECT_DELAY_MS)).await
            }
        }
    }
}

#[embassy_executor::task(pool_size = 2)]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
