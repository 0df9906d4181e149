#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use core::cell::RefCell;
use core::fmt::Debug;
use core::net::SocketAddrV4;

use airwatch_core::app_state::{AppRunState, Monitor};
use airwatch_core::async_i2c_bus::SharedI2c;
use airwatch_core::cache::GroupUpdate;
use airwatch_core::config::{ConfigStore, SdCardStore, Settings, SharedStore};
use airwatch_core::display::BufferedDisplay;
use airwatch_core::input::SharedEncoder;
use airwatch_core::logging;
use airwatch_core::network::{NetworkSupervisor, SyncPolicy};
use airwatch_core::power::{GpioSwitch, PowerController, PowerDomain};
use airwatch_core::sensors::{Apc1Sensor, BatteryMonitor};
use airwatch_core::tasks::{
    self, ActionDispatcher, ParticulateOwner, Peripherals, Sampler, StationCycle, TaskPlan,
    WATCHDOG_FEED_INTERVAL,
};
use airwatch_firmware::hardware::{self, BatteryAdc, DisplayBacklight, FixedClock, SharedBus};
use airwatch_firmware::logger;
use airwatch_firmware::net::{self, SntpClock, UdpPublisher, WifiLink};
use airwatch_firmware::system::{EspSystem, RtcWatchdog};
use embassy_executor::{SpawnError, Spawner};
use embassy_net::{Runner, StackResources};
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};
use embedded_hal_bus::spi::{CriticalSectionDevice, NoDelay};
use esp_hal::Blocking;
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull};
use esp_hal::rng::Rng;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::WifiDevice;
use log::{error, info, warn};
use mipidsi::interface::SpiInterface;
use mipidsi::{Builder as MipidsiBuilder, NoResetPin, models::ILI9342CRgb565};
use static_cell::StaticCell;

#[cfg(feature = "sensor-sht40")]
use airwatch_core::sensors::SHT40Sensor;

const DISPLAY_WIDTH: u16 = 320;
const DISPLAY_HEIGHT: u16 = 240;
const BATTERY_DIVIDER: f32 = 2.0;
const ENCODER_STEPS_PER_DETENT: i32 = 4;
const PARTICULATE_RESET_PULSE: Duration = Duration::from_millis(20);

type SpiBus = Spi<'static, Blocking>;
type SpiDev = CriticalSectionDevice<'static, SpiBus, Output<'static>, NoDelay>;
type Panel = mipidsi::Display<SpiInterface<'static, SpiDev, Output<'static>>, ILI9342CRgb565, NoResetPin>;
type SdStore = SdCardStore<SpiDev, embassy_time::Delay, FixedClock>;
type Store = SharedStore<'static, CriticalSectionRawMutex, SdStore>;
type ParticulateSwitch = GpioSwitch<Output<'static>>;
type Particulate = Apc1Sensor<SharedBus>;
type Battery = BatteryMonitor<BatteryAdc>;
type AppMonitor = Monitor<CriticalSectionRawMutex>;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Unrecoverable bring-up failure: log and start over.
fn fatal(what: &str, e: impl Debug) -> ! {
    error!("{} failed: {:?}", what, e);
    esp_hal::system::software_reset()
}

fn spawned(name: &str, result: Result<(), SpawnError>) {
    match result {
        Ok(()) => info!(" Tasks: {} spawned", name),
        Err(e) => error!(" Tasks: {} not spawned: {:?}", name, e),
    }
}

#[cfg(feature = "sensor-sht40")]
#[embassy_executor::task]
async fn climate_task(
    monitor: &'static AppMonitor,
    sampler: Sampler<SHT40Sensor<SharedBus>>,
    interval: Duration,
) {
    tasks::run_sampler(monitor, sampler, interval).await
}

#[embassy_executor::task]
async fn particulate_task(
    monitor: &'static AppMonitor,
    sampler: Sampler<Particulate>,
    interval: Duration,
) {
    tasks::run_sampler(monitor, sampler, interval).await
}

#[embassy_executor::task]
async fn station_task(monitor: &'static AppMonitor, station: StationCycle<Particulate, ParticulateSwitch>) {
    tasks::run_duty_cycle(monitor, station).await
}

#[embassy_executor::task]
async fn battery_task(monitor: &'static AppMonitor, sampler: Sampler<Battery>, interval: Duration) {
    tasks::run_sampler(monitor, sampler, interval).await
}

#[embassy_executor::task]
async fn power_task(
    monitor: &'static AppMonitor,
    controller: PowerController<'static, CriticalSectionRawMutex, DisplayBacklight, ParticulateSwitch>,
) {
    tasks::run_power(monitor, controller).await
}

#[embassy_executor::task]
async fn display_task(monitor: &'static AppMonitor, mut display: BufferedDisplay<Panel>, settings: Settings) {
    tasks::run_display(monitor, &mut display, settings).await
}

#[embassy_executor::task]
async fn encoder_task(clk: Input<'static>, dt: Input<'static>, button: Input<'static>, encoder: &'static SharedEncoder) {
    hardware::decode_encoder(clk, dt, button, encoder, ENCODER_STEPS_PER_DETENT).await
}

#[embassy_executor::task]
async fn input_task(
    monitor: &'static AppMonitor,
    encoder: &'static SharedEncoder,
    mut dispatcher: ActionDispatcher<Store, EspSystem>,
    poll_interval: Duration,
    debounce: Duration,
) {
    tasks::run_input(monitor, encoder, &mut dispatcher, poll_interval, debounce).await
}

#[embassy_executor::task]
async fn log_task(monitor: &'static AppMonitor, store: Store) {
    logging::run_log_writer(monitor, &logger::FAULTS, store, logging::MAX_LOG_BYTES).await
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

#[embassy_executor::task]
async fn network_task(
    monitor: &'static AppMonitor,
    supervisor: NetworkSupervisor<'static, CriticalSectionRawMutex, WifiLink, SntpClock>,
) {
    tasks::run_network(monitor, supervisor).await
}

#[embassy_executor::task]
async fn publisher_task(monitor: &'static AppMonitor, mut publisher: UdpPublisher, interval: Duration) {
    tasks::run_publisher(monitor, &mut publisher, interval).await
}

#[embassy_executor::task]
async fn status_task(stack: embassy_net::Stack<'static>, monitor: &'static AppMonitor) {
    net::serve_status(stack, monitor).await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    logger::init(log::LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);
    // The framebuffer lives in PSRAM.
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);
    info!("Embassy initialized");

    // I2C: PMU first, since it powers the panel.
    let i2c_bus = hardware::create_i2c_bus(peripherals.I2C0, peripherals.GPIO12, peripherals.GPIO11)
        .unwrap_or_else(|e| fatal("I2C bus", e));
    let pmu = hardware::init_pmu(SharedI2c::new(i2c_bus)).await;

    // SPI is shared by the panel and the SD card.
    static SPI_BUS: StaticCell<critical_section::Mutex<RefCell<SpiBus>>> = StaticCell::new();
    let spi = Spi::new(peripherals.SPI2, SpiConfig::default())
        .unwrap_or_else(|e| fatal("SPI bus", e))
        .with_sck(peripherals.GPIO36)
        .with_mosi(peripherals.GPIO37)
        .with_miso(peripherals.GPIO35);
    let spi_bus = SPI_BUS.init(critical_section::Mutex::new(RefCell::new(spi)));

    let lcd_cs = Output::new(peripherals.GPIO3, Level::High, OutputConfig::default());
    let lcd_spi = CriticalSectionDevice::new_no_delay(spi_bus, lcd_cs)
        .unwrap_or_else(|e| fatal("display SPI device", e));
    let dc = Output::new(peripherals.GPIO34, Level::Low, OutputConfig::default());
    static SPI_BUFFER: StaticCell<[u8; 512]> = StaticCell::new();
    let di = SpiInterface::new(lcd_spi, dc, SPI_BUFFER.init([0; 512]));
    let panel = MipidsiBuilder::new(ILI9342CRgb565, di)
        .display_size(DISPLAY_WIDTH, DISPLAY_HEIGHT)
        .init(&mut embassy_time::Delay)
        .unwrap_or_else(|e| fatal("display init", e));
    let display = BufferedDisplay::new(panel);
    info!("Display initialized");

    // Configuration from the SD card; defaults when it is missing.
    let sd_cs = Output::new(peripherals.GPIO4, Level::High, OutputConfig::default());
    let sd_spi = CriticalSectionDevice::new_no_delay(spi_bus, sd_cs)
        .unwrap_or_else(|e| fatal("SD SPI device", e));
    let card = embedded_sdmmc::SdCard::new(sd_spi, embassy_time::Delay);
    static SD_CARD: StaticCell<BlockingMutex<CriticalSectionRawMutex, RefCell<SdStore>>> = StaticCell::new();
    let sd_card = SD_CARD.init(BlockingMutex::new(RefCell::new(SdCardStore::new(card, FixedClock))));
    let mut store = ConfigStore::new(SharedStore::new(sd_card));
    let mut config = store.load_all();

    config.wifi = store.seed_wifi(env!("WIFI_SSID"), env!("WIFI_PASSWORD"));
    let settings = config.settings;
    if settings.pins != Default::default() {
        warn!("Custom pin map in settings is ignored; this board uses fixed pins");
    }

    let mut watchdog = RtcWatchdog::new(Rtc::new(peripherals.LPWR), settings.watchdog_timeout_s);

    // Sensors.
    let sensor_timeout = settings.sensor_timeout();

    #[cfg(feature = "sensor-sht40")]
    let climate = {
        let mut sensor = SHT40Sensor::new(SharedI2c::new(i2c_bus));
        let present = airwatch_core::sensors::acquire(Some(&mut sensor), sensor_timeout)
            .await
            .is_ok();
        present.then_some(sensor)
    };
    #[cfg(not(feature = "sensor-sht40"))]
    let climate: Option<()> = None;

    let mut particulate_switch: ParticulateSwitch = GpioSwitch::new(
        PowerDomain::ParticulateSensor,
        Output::new(peripherals.GPIO18, Level::High, OutputConfig::default()),
        Some(Output::new(peripherals.GPIO7, Level::High, OutputConfig::default())),
        true,
    );
    if let Err(e) = particulate_switch.reset_pulse(PARTICULATE_RESET_PULSE).await {
        warn!("{}", e);
    }
    let particulate = {
        let mut sensor: Particulate = Apc1Sensor::new(SharedI2c::new(i2c_bus));
        match sensor.detect().await {
            Ok(()) => Some(sensor),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    };

    let battery = BatteryMonitor::new(BatteryAdc::new(peripherals.ADC1, peripherals.GPIO10), BATTERY_DIVIDER);

    let peripherals_found = Peripherals {
        climate: climate.is_some(),
        particulate: particulate.is_some(),
        battery: true,
    };
    let plan = TaskPlan::decide(
        &settings,
        config.runtime.mode,
        peripherals_found,
        config.wifi.is_configured(),
    );

    static MONITOR: StaticCell<AppMonitor> = StaticCell::new();
    let monitor: &'static AppMonitor = MONITOR.init(Monitor::new(&config.runtime, Instant::now()));
    spawned("log", spawner.spawn(log_task(monitor, SharedStore::new(sd_card))));

    // Power: the idle controller always owns the display; the particulate
    // switch goes to whichever state machine the mode selects.
    let (idle_particulate, station_switch) = match plan.particulate {
        ParticulateOwner::Sampler => (Some((particulate_switch, settings.particulate_policy())), None),
        ParticulateOwner::DutyCycle => (None, Some(particulate_switch)),
        ParticulateOwner::Absent => (None, None),
    };
    let controller = PowerController::new(
        &monitor.power,
        DisplayBacklight::new(pmu),
        config.runtime.display_policy(),
        idle_particulate,
    );
    spawned("power", spawner.spawn(power_task(monitor, controller)));

    #[cfg(feature = "sensor-sht40")]
    if plan.climate {
        let sampler = Sampler::new(climate, sensor_timeout, GroupUpdate::Climate);
        let interval = Duration::from_secs(settings.intervals.climate_s as u64);
        spawned("climate", spawner.spawn(climate_task(monitor, sampler, interval)));
    }

    match (plan.particulate, particulate, station_switch) {
        (ParticulateOwner::Sampler, sensor @ Some(_), _) => {
            let sampler = Sampler::new(sensor, sensor_timeout, GroupUpdate::Particulate)
                .gated(PowerDomain::ParticulateSensor);
            let interval = Duration::from_secs(settings.intervals.particulate_s as u64);
            spawned("particulate", spawner.spawn(particulate_task(monitor, sampler, interval)));
        }
        (ParticulateOwner::DutyCycle, Some(sensor), Some(switch)) => {
            let station = StationCycle::new(
                settings.duty_cycle(),
                sensor,
                switch,
                sensor_timeout,
                Instant::now(),
            );
            spawned("station", spawner.spawn(station_task(monitor, station)));
        }
        _ => {}
    }

    if plan.battery {
        let sampler = Sampler::new(Some(battery), sensor_timeout, GroupUpdate::Battery);
        let interval = Duration::from_secs(settings.intervals.battery_s as u64);
        spawned("battery", spawner.spawn(battery_task(monitor, sampler, interval)));
    }

    spawned("display", spawner.spawn(display_task(monitor, display, settings)));

    // Encoder.
    static ENCODER: StaticCell<SharedEncoder> = StaticCell::new();
    let encoder: &'static SharedEncoder = ENCODER.init(SharedEncoder::new());
    let pull_up = InputConfig::default().with_pull(Pull::Up);
    let clk = Input::new(peripherals.GPIO8, pull_up);
    let dt = Input::new(peripherals.GPIO9, pull_up);
    let button = Input::new(peripherals.GPIO17, pull_up);
    spawned("encoder", spawner.spawn(encoder_task(clk, dt, button, encoder)));

    let dispatcher = ActionDispatcher::new(store, EspSystem);
    spawned(
        "input",
        spawner.spawn(input_task(
            monitor,
            encoder,
            dispatcher,
            settings.input_poll_interval(),
            settings.debounce(),
        )),
    );

    // Network. A radio failure leaves the device running offline.
    if plan.network {
        static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
        match esp_radio::init() {
            Ok(radio) => {
                let radio = RADIO.init(radio);
                match esp_radio::wifi::new(radio, peripherals.WIFI, Default::default()) {
                    Ok((controller, interfaces)) => {
                        let rng = Rng::new();
                        let seed = (rng.random() as u64) << 32 | rng.random() as u64;
                        static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
                        let (stack, runner) = embassy_net::new(
                            interfaces.sta,
                            embassy_net::Config::dhcpv4(Default::default()),
                            RESOURCES.init(StackResources::new()),
                            seed,
                        );
                        spawned("net", spawner.spawn(net_task(runner)));

                        let supervisor = NetworkSupervisor::new(
                            &monitor.network,
                            WifiLink::new(controller, stack),
                            SntpClock::new(stack),
                            config.wifi.clone(),
                            SyncPolicy::default(),
                        );
                        spawned("network", spawner.spawn(network_task(monitor, supervisor)));
                        spawned("status", spawner.spawn(status_task(stack, monitor)));

                        if plan.publisher {
                            match env!("COLLECTOR_ADDR").parse::<SocketAddrV4>() {
                                Ok(collector) => spawned(
                                    "publisher",
                                    spawner.spawn(publisher_task(
                                        monitor,
                                        UdpPublisher::new(stack, collector),
                                        settings.publish_interval(),
                                    )),
                                ),
                                Err(e) => warn!("Publishing disabled, bad collector address: {:?}", e),
                            }
                        }
                    }
                    Err(e) => error!("WiFi controller init failed: {:?}", e),
                }
            }
            Err(e) => error!("Radio init failed: {:?}", e),
        }
    }

    monitor.set_run_state(AppRunState::Running);
    tasks::run_watchdog(&mut watchdog, WATCHDOG_FEED_INTERVAL).await
}
