#![no_std]
#![no_main]

use static_cell::StaticCell;

use embassy_executor::Spawner;
use embassy_time::{Delay, Duration, Instant, Timer};

use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{self as hal};
use esp_println::logger::init_logger;
use esp_storage::FlashStorage;
use esp_wifi::EspWifiController;

use hal::{
    gpio::{Input, InputConfig, Pull},
    i2c::master::{BusTimeout, I2c},
    rng::Rng,
    system::software_reset,
    time::Rate,
    timer::timg::TimerGroup,
    Async,
};
use log::{error, info};

use sensor_core::provisioning::sample_trigger;
use sensor_core::schedule::Clock;
use sensor_core::sensors::Aht20;
use sensor_core::{BootAction, ConfigStore, DeviceConfig, Provisioner, Publisher, Sensor};

extern crate alloc;

mod config;
mod constants;
mod mqtt;
mod portal;
mod transport;
mod wifi;

use config::DEFAULTS;
use constants::*;
use mqtt::{Buffers, MqttBroker};
use wifi::Wifi;

esp_bootloader_esp_idf::esp_app_desc!();

static WIFI_INIT: StaticCell<EspWifiController<'static>> = StaticCell::new();
static CONFIG: StaticCell<DeviceConfig> = StaticCell::new();
static MQTT_BUFFERS: StaticCell<Buffers> = StaticCell::new();

type Thermometer = Aht20<I2c<'static, Async>, Delay>;

/// Milliseconds since boot, wrapping like the publish schedule expects.
struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        Instant::now().as_millis() as u32
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    init_logger(log::LevelFilter::Info);
    info!("esp32_aht20_sensor v{}", VERSION);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let timg1 = TimerGroup::new(peripherals.TIMG1);

    esp_hal_embassy::init(timg0.timer0);

    let rng = Rng::new(peripherals.RNG);

    // GPIO16, held low at boot to force the configuration portal
    let mut trigger_pin = Input::new(
        peripherals.GPIO16,
        InputConfig::default().with_pull(Pull::Up),
    );

    let mut store = ConfigStore::new(FlashStorage::new(), CONFIG_FLASH_OFFSET, WIFI_FLASH_OFFSET);
    if let Err(e) = store.mount() {
        error!("Failed to mount config storage ({:?}). Formatting...", e);
        if let Err(e) = store.format() {
            error!("Failed to format config storage: {:?}", e);
        }
    }

    let (mut config, found) = store.load(DEFAULTS.device_config());
    if !found {
        info!("Using default configuration...");
    }
    let (mut credentials, _) = store.load_credentials();

    let i2c_config = hal::i2c::master::Config::default()
        .with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ))
        .with_timeout(BusTimeout::BusCycles(24));

    let i2c = I2c::new(peripherals.I2C0, i2c_config)
        .expect("I2C configuration is valid")
        .with_sda(peripherals.GPIO21)
        .with_scl(peripherals.GPIO22)
        .into_async();

    let mut sensor: Thermometer = Aht20::new(i2c, Delay);
    if sensor.init().await.is_err() {
        error!("Failed to find AHT20 sensor!");
        loop {
            Timer::after(Duration::from_millis(10)).await;
        }
    }
    info!("AHT20 sensor found.");

    let trigger = sample_trigger(&mut trigger_pin);

    let wifi_init = WIFI_INIT.init(
        esp_wifi::init(timg1.timer0, rng.clone()).expect("Failed to initialise the radio"),
    );
    let wifi = Wifi::new(
        wifi_init,
        peripherals.WIFI,
        rng,
        config.device_id(),
        DEFAULTS.ap_ssid,
        DEFAULTS.portal_timeout_seconds,
        spawner,
    )
    .expect("Failed to set up WiFi");

    let mut provisioner = Provisioner::new(wifi, Delay);
    if provisioner
        .run(trigger, &mut config, &mut credentials, &mut store)
        .await
        == BootAction::Restart
    {
        restart();
    }

    let stack = provisioner
        .into_inner()
        .into_background(spawner, credentials)
        .expect("Failed to spawn the WiFi connection task");

    let config: &'static DeviceConfig = CONFIG.init(config);
    let broker = MqttBroker::new(stack, DEFAULTS.mqtt_port, MQTT_BUFFERS.init(Buffers::new()));
    let publisher = Publisher::new(
        config,
        sensor,
        SystemClock,
        Delay,
        DEFAULTS.publish_interval_ms,
        DEFAULTS.reconnect_delay_ms,
    );

    spawner
        .spawn(main_task(publisher, broker))
        .expect("Failed to spawn the publisher task");
}

#[embassy_executor::task]
async fn main_task(
    mut publisher: Publisher<'static, Thermometer, SystemClock, Delay>,
    mut broker: MqttBroker,
) {
    publisher.run(&mut broker).await
}

/// Resets the chip.
fn restart() -> ! {
    info!("Restarting...");
    // let the log drain
    hal::delay::Delay::new().delay_millis(100);
    software_reset();
    #[allow(unreachable_code)]
    loop {}
}
