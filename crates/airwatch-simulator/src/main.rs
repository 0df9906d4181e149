//! Desktop simulator for the airwatch air quality monitor.
//!
//! Runs the core's menu, power manager, samplers and screens against mock
//! sensors and renders into an SDL2 window via `embedded-graphics-simulator`.
//! Configuration lives in an in-memory store that survives simulated resets,
//! so mode and timeout changes take effect on the next "boot" just as they do
//! on the device.
//!
//! # Key bindings
//!
//! | Key          | Action                                 |
//! |--------------|----------------------------------------|
//! | Right / Down | Encoder clockwise                      |
//! | Left / Up    | Encoder counter-clockwise              |
//! | Enter, Space | Encoder button                         |
//! | F            | Toggle particulate sensor read failure |
//! | N            | Remote request for the status page     |
//! | D            | Remote request for `/api/data`         |
//! | H            | Remote `/api/heartbeat`                |
//! | W            | Remote `/api/wake`                     |
//! | Q            | Quit                                   |

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration as StdDuration;

use embassy_futures::block_on;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{
    OutputSettingsBuilder, SimulatorDisplay, SimulatorEvent, Window, sdl2::Keycode,
};
use log::{error, info, warn};

use airwatch_core::app_state::{AppRunState, Monitor};
use airwatch_core::cache::GroupUpdate;
use airwatch_core::config::{ConfigStore, MemoryStore, Settings};
use airwatch_core::display::screens;
use airwatch_core::display::{BufferedDisplay, DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, DisplayDevice};
use airwatch_core::input::{InputTracker, SharedEncoder};
use airwatch_core::power::{POWER_TICK, PowerController, PowerDomain, PowerError, PowerSwitch};
use airwatch_core::sensors::battery::battery_percent;
use airwatch_core::sensors::{
    BatteryReadings, ClimateReadings, ParticulateReadings, Sensor, SensorError,
};
use airwatch_core::tasks::{
    ActionDispatcher, DisplayLoop, ParticulateOwner, Peripherals, Sampler, StationCycle, SystemControl,
    TaskPlan, handle_input, power_step, serve_request,
};

type RawMutex = CriticalSectionRawMutex;

/// Pixel scale factor for the simulator window.
const WINDOW_SCALE: u32 = 2;

// ---------------------------------------------------------------------------
// Mock hardware
// ---------------------------------------------------------------------------

/// Seconds since the simulated boot, as `f32` for the waveforms.
fn t() -> f32 {
    Instant::now().as_millis() as f32 / 1000.0
}

struct MockClimate;

impl Sensor for MockClimate {
    type Readings = ClimateReadings;
    const NAME: &'static str = "SHT40";

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        let t = t();
        Ok(ClimateReadings {
            temperature_c: Some(23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos()),
            humidity_pct: Some(50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos()),
        })
    }
}

/// Particulate sensor whose reads fail while `failing` is set.
struct MockParticulate {
    failing: Rc<Cell<bool>>,
}

impl Sensor for MockParticulate {
    type Readings = ParticulateReadings;
    const NAME: &'static str = "APC1";

    async fn read(&mut self) -> Result<ParticulateReadings, SensorError> {
        if self.failing.get() {
            return Err(SensorError::ReadFailed {
                sensor: Self::NAME,
                operation: "read",
                details: "simulated failure",
            });
        }
        let t = t();
        let pm25 = 18.0 + 14.0 * (t / 90.0).sin();
        Ok(ParticulateReadings {
            pm1: Some(pm25 * 0.7),
            pm25: Some(pm25),
            pm10: Some(pm25 * 1.4),
            tvoc_ppb: Some(120.0 + 40.0 * (t / 60.0).cos()),
            eco2_ppm: Some(600.0 + 200.0 * (t / 300.0).sin()),
            aqi_tvoc: Some(2),
            temperature_comp_c: None,
            humidity_comp_pct: None,
        })
    }
}

struct MockBattery;

impl Sensor for MockBattery {
    type Readings = BatteryReadings;
    const NAME: &'static str = "Battery";

    async fn read(&mut self) -> Result<BatteryReadings, SensorError> {
        let voltage = 3.9 - 0.2 * (t() / 600.0).sin();
        Ok(BatteryReadings {
            voltage: Some(voltage),
            percent: Some(battery_percent(voltage)),
        })
    }
}

/// Enable line that only logs.
struct LoggedSwitch {
    name: &'static str,
    on: bool,
}

impl LoggedSwitch {
    fn new(name: &'static str) -> Self {
        Self { name, on: true }
    }
}

impl PowerSwitch for LoggedSwitch {
    async fn enable(&mut self) -> Result<(), PowerError> {
        info!("[hw] {} power on", self.name);
        self.on = true;
        Ok(())
    }

    async fn disable(&mut self) -> Result<(), PowerError> {
        info!("[hw] {} power off", self.name);
        self.on = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.on
    }
}

#[derive(Default)]
struct SimSystem {
    reset_requested: bool,
    halted: bool,
}

impl SystemControl for SimSystem {
    fn reset(&mut self) {
        info!("[hw] system reset requested");
        self.reset_requested = true;
    }

    fn halt(&mut self) {
        info!("[hw] halted");
        self.halted = true;
    }
}

// ---------------------------------------------------------------------------
// Boot
// ---------------------------------------------------------------------------

/// Why a simulated boot ended.
enum Exit {
    Reset,
    Quit,
}

/// Periodic work item driven from the frame loop.
struct Every {
    interval: Duration,
    next: Instant,
}

impl Every {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}

fn encoder_step(keycode: Keycode) -> Option<i32> {
    match keycode {
        Keycode::Right | Keycode::Down => Some(1),
        Keycode::Left | Keycode::Up => Some(-1),
        _ => None,
    }
}

/// Requests a remote client would send to the status server.
fn http_request(keycode: Keycode) -> Option<&'static [u8]> {
    match keycode {
        Keycode::N => Some(b"GET / HTTP/1.1\r\n\r\n"),
        Keycode::D => Some(b"GET /api/data HTTP/1.1\r\n\r\n"),
        Keycode::H => Some(b"GET /api/heartbeat HTTP/1.1\r\n\r\n"),
        Keycode::W => Some(b"GET /api/wake HTTP/1.1\r\n\r\n"),
        _ => None,
    }
}

fn is_button(keycode: Keycode) -> bool {
    keycode == Keycode::Return || keycode == Keycode::Space
}

fn boot(store: &mut Option<ConfigStore<MemoryStore>>, window: &mut Window) -> Exit {
    let Some(mut config_store) = store.take() else {
        error!("config store missing");
        return Exit::Quit;
    };
    let config = config_store.load_all();
    let settings: Settings = config.settings;
    let mode = config.runtime.mode;
    info!("Booting in {:?} mode", mode);

    let monitor = Monitor::<RawMutex>::new(&config.runtime, Instant::now());
    let plan = TaskPlan::decide(
        &settings,
        mode,
        Peripherals {
            climate: true,
            particulate: true,
            battery: true,
        },
        config.wifi.is_configured(),
    );

    let failing = Rc::new(Cell::new(false));
    let particulate = MockParticulate {
        failing: failing.clone(),
    };

    let mut power: PowerController<'_, RawMutex, LoggedSwitch, LoggedSwitch> = PowerController::new(
        &monitor.power,
        LoggedSwitch::new("display"),
        config.runtime.display_policy(),
        plan.idle_manages_particulate()
            .then(|| (LoggedSwitch::new("particulate"), settings.particulate_policy())),
    );

    let timeout = settings.sensor_timeout();
    let mut climate = Sampler::new(Some(MockClimate), timeout, GroupUpdate::Climate);
    let mut battery = Sampler::new(Some(MockBattery), timeout, GroupUpdate::Battery);
    let (mut sampler, mut station) = match plan.particulate {
        ParticulateOwner::Sampler => (
            Some(
                Sampler::new(Some(particulate), timeout, GroupUpdate::Particulate)
                    .gated(PowerDomain::ParticulateSensor),
            ),
            None,
        ),
        ParticulateOwner::DutyCycle => (
            None,
            Some(StationCycle::new(
                settings.duty_cycle(),
                particulate,
                LoggedSwitch::new("particulate"),
                timeout,
                Instant::now(),
            )),
        ),
        ParticulateOwner::Absent => (None, None),
    };
    if let Some(station) = station.as_mut() {
        block_on(station.start(&monitor));
    }

    let mut dispatcher = ActionDispatcher::new(config_store, SimSystem::default());
    let encoder = SharedEncoder::new();
    let mut tracker = InputTracker::new(&encoder, settings.debounce());

    let mut display = BufferedDisplay::new(SimulatorDisplay::<Rgb565>::new(Size::new(
        DISPLAY_WIDTH_PX,
        DISPLAY_HEIGHT_PX,
    )));
    let mut blank = SimulatorDisplay::<Rgb565>::new(Size::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX));
    let _ = blank.clear(Rgb565::BLACK);
    let mut ui = DisplayLoop::new(settings);

    let mut climate_due = Every::new(Duration::from_secs(settings.intervals.climate_s as u64));
    let mut particulate_due = Every::new(Duration::from_secs(settings.intervals.particulate_s as u64));
    let mut battery_due = Every::new(Duration::from_secs(settings.intervals.battery_s as u64));
    let mut power_due = Every::new(POWER_TICK);
    let mut last_prune = Instant::now();
    let frame = StdDuration::from_millis(settings.frame_interval().as_millis());

    monitor.set_run_state(AppRunState::Running);

    let exit = 'running: loop {
        let now = Instant::now();

        // --- SDL events ---------------------------------------------------
        for event in window.events() {
            match event {
                SimulatorEvent::Quit => break 'running Exit::Quit,
                SimulatorEvent::KeyDown { keycode, .. } => {
                    if keycode == Keycode::Q || keycode == Keycode::Escape {
                        break 'running Exit::Quit;
                    }
                    if let Some(step) = encoder_step(keycode) {
                        encoder.add(step);
                    } else if is_button(keycode) {
                        encoder.set_pressed(true);
                    } else if keycode == Keycode::F {
                        failing.set(!failing.get());
                        warn!("Particulate read failure: {}", failing.get());
                    } else if let Some(request) = http_request(keycode) {
                        let response = serve_request(&monitor, request, 0xc0a8_0102, now);
                        info!(
                            "HTTP {}:\n{}",
                            response.status,
                            String::from_utf8_lossy(&response.body)
                        );
                    }
                }
                SimulatorEvent::KeyUp { keycode, .. } if is_button(keycode) => {
                    encoder.set_pressed(false);
                }
                _ => {}
            }
        }

        // --- Input --------------------------------------------------------
        if monitor.is_running() {
            let event = tracker.poll(&encoder, now);
            handle_input(&monitor, event, &mut dispatcher, now);
        }
        if dispatcher.system().reset_requested {
            break 'running Exit::Reset;
        }

        // --- Power --------------------------------------------------------
        if monitor.activity.try_take().is_some() {
            block_on(power.on_activity());
        }
        if power_due.due(now) {
            block_on(power_step(&monitor, &mut power, now, &mut last_prune));
        }

        // --- Sensors ------------------------------------------------------
        if monitor.is_running() {
            if climate_due.due(now) {
                block_on(climate.sample(&monitor));
            }
            if battery_due.due(now) {
                block_on(battery.sample(&monitor));
            }
            if let Some(sampler) = sampler.as_mut()
                && particulate_due.due(now)
            {
                block_on(sampler.sample(&monitor));
            }
            if let Some(station) = station.as_mut() {
                block_on(station.advance(&monitor, now));
            }
        }

        // --- Render -------------------------------------------------------
        if monitor.is_running() {
            if let Err(e) = ui.frame(&monitor, &mut display, now) {
                error!("Display: {}", e);
            }
        } else if dispatcher.system().halted {
            if let Err(e) = screens::exited(&mut display) {
                error!("Display: exit screen failed: {:?}", e);
            }
            if let Err(e) = display.present() {
                error!("Display: {}", e);
            }
        }

        if monitor.power.is_awake(PowerDomain::Display) || !monitor.is_running() {
            window.update(display.panel());
        } else {
            window.update(&blank);
        }

        std::thread::sleep(frame);
    };

    let (config_store, _) = dispatcher.into_parts();
    *store = Some(config_store);
    exit
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();
    info!("Starting airwatch simulator");
    info!(
        "Display: {}×{} (scale {}×)",
        DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX, WINDOW_SCALE
    );
    info!("Keys: arrows=encoder  Enter/Space=button  F=fail APC1  N=remote client  Q=Quit");

    let output_settings = OutputSettingsBuilder::new().scale(WINDOW_SCALE).build();
    let mut window = Window::new("airwatch simulator", &output_settings);

    // The SDL window is lazily initialized on the first `update()` call.
    // We must call `update()` once before `events()` or it will panic.
    let splash = SimulatorDisplay::<Rgb565>::new(Size::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX));
    window.update(&splash);

    let mut store = Some(ConfigStore::new(MemoryStore::new()));
    while let Exit::Reset = boot(&mut store, &mut window) {
        info!("Rebooting");
    }
    info!("Simulator exiting");
}
