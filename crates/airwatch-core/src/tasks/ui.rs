//! Display and input tasks

use core::fmt::Debug;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Duration, Instant, Timer};
use log::{debug, error, info, warn};

use super::dispatch::{ActionDispatcher, SystemControl};
use crate::activity::ActivitySource;
use crate::app_state::Monitor;
use crate::config::{KeyValueStore, Settings};
use crate::display::DisplayDevice;
use crate::display::screens::{self, ScreenContext};
use crate::error::{AppError, message};
use crate::input::{InputEvent, InputSource, InputTracker};
use crate::menu::{MenuAction, MenuNode};
use crate::power::PowerDomain;

fn draw_error<E: Debug>(e: E) -> AppError {
    AppError::Display(message(&alloc::format!("draw failed: {:?}", e)))
}

/// Decides when the display task actually draws.
///
/// A frame is drawn when the menu asked for one, when the current root
/// screen's refresh interval has passed, or right after the display wakes.
/// Nothing is drawn while the display is asleep.
#[derive(Debug)]
pub struct DisplayLoop {
    last_drawn: Option<Instant>,
    was_asleep: bool,
    settings: Settings,
}

impl DisplayLoop {
    pub fn new(settings: Settings) -> Self {
        Self {
            last_drawn: None,
            was_asleep: false,
            settings,
        }
    }

    fn refresh_due(&self, node: MenuNode, interval: Option<Duration>, now: Instant) -> bool {
        let Some(interval) = interval else {
            return false;
        };
        matches!(node, MenuNode::RootScreens(_))
            && self
                .last_drawn
                .is_none_or(|at| now.saturating_duration_since(at) >= interval)
    }

    /// Draw a frame if one is due. Returns whether anything was drawn.
    pub fn frame<M, D>(&mut self, monitor: &Monitor<M>, display: &mut D, now: Instant) -> Result<bool, AppError>
    where
        M: RawMutex,
        D: DisplayDevice,
        D::Error: Debug,
    {
        if !monitor.power.is_awake(PowerDomain::Display) {
            self.was_asleep = true;
            return Ok(false);
        }

        let requested = monitor.with_menu(|menu| menu.take_redraw());
        let view = monitor.menu_view();
        let due = requested
            || self.was_asleep
            || self.last_drawn.is_none()
            || self.refresh_due(view.node, view.root.refresh_interval(), now);
        if !due {
            return Ok(false);
        }

        let snapshot = monitor.cache.snapshot();
        let ctx = ScreenContext {
            view,
            snapshot: &snapshot,
            link: monitor.network.get(),
            now,
            stale: self.settings.stale_limits(view.mode),
            utc_offset_min: self.settings.utc_offset_min,
        };
        screens::render(display, &ctx).map_err(draw_error)?;
        display.present()?;

        self.last_drawn = Some(now);
        self.was_asleep = false;
        Ok(true)
    }
}

pub async fn run_display<M, D>(monitor: &Monitor<M>, display: &mut D, settings: Settings)
where
    M: RawMutex,
    D: DisplayDevice,
    D::Error: Debug,
{
    let frame_interval = settings.frame_interval();
    info!(" Display: started, frame every {}ms", frame_interval.as_millis());
    let mut ui = DisplayLoop::new(settings);

    while monitor.is_running() {
        if let Err(e) = ui.frame(monitor, display, Instant::now()) {
            error!(" Display: {}", e);
        }
        Timer::after(frame_interval).await;
    }

    let result = screens::exited(display)
        .map_err(draw_error)
        .and_then(|()| display.present());
    if let Err(e) = result {
        error!(" Display: {}", e);
    }
}

/// Apply one poll's worth of input.
///
/// All input counts as activity. Input that arrives while the display is
/// asleep only wakes it; the menu never sees it.
pub fn handle_input<M, S, C>(
    monitor: &Monitor<M>,
    event: InputEvent,
    dispatcher: &mut ActionDispatcher<S, C>,
    now: Instant,
) -> MenuAction
where
    M: RawMutex,
    S: KeyValueStore,
    C: SystemControl,
{
    if event.is_empty() {
        return MenuAction::None;
    }

    let was_asleep = !monitor.power.is_awake(PowerDomain::Display);
    monitor.activity.touch_at(now, ActivitySource::Input);
    if was_asleep {
        debug!(" Input: wake only");
        monitor.with_menu(|menu| menu.request_redraw());
        return MenuAction::None;
    }

    let action = monitor.with_menu(|menu| {
        menu.rotate(event.delta);
        if event.press {
            menu.press()
        } else {
            MenuAction::None
        }
    });
    if action != MenuAction::None
        && let Err(e) = dispatcher.dispatch(monitor, action)
    {
        warn!(" Input: {:?} failed: {}", action, e);
    }
    action
}

pub async fn run_input<M, I, S, C>(
    monitor: &Monitor<M>,
    source: &I,
    dispatcher: &mut ActionDispatcher<S, C>,
    poll_interval: Duration,
    debounce: Duration,
) where
    M: RawMutex,
    I: InputSource,
    S: KeyValueStore,
    C: SystemControl,
{
    info!(" Input: polling every {}ms", poll_interval.as_millis());
    let mut tracker = InputTracker::new(source, debounce);

    while monitor.is_running() {
        let now = Instant::now();
        let event = tracker.poll(source, now);
        handle_input(monitor, event, dispatcher, now);
        Timer::after(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigStore, MemoryStore, OperatingMode, RuntimeState};
    use crate::display::{BufferedDisplay, DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX, FrameBuffer};
    use crate::menu::{Notice, RootScreen};
    use crate::power::DomainState;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    struct NoSystem;

    impl SystemControl for NoSystem {
        fn reset(&mut self) {}
        fn halt(&mut self) {}
    }

    fn secs(s: u64) -> Instant {
        Instant::from_secs(s)
    }

    fn monitor() -> Monitor<NoopRawMutex> {
        Monitor::new(&RuntimeState::default(), secs(0))
    }

    fn dispatcher() -> ActionDispatcher<MemoryStore, NoSystem> {
        ActionDispatcher::new(ConfigStore::new(MemoryStore::new()), NoSystem)
    }

    fn display() -> BufferedDisplay<FrameBuffer> {
        BufferedDisplay::new(FrameBuffer::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX))
    }

    const TURN: InputEvent = InputEvent {
        delta: 1,
        press: false,
    };
    const PRESS: InputEvent = InputEvent {
        delta: 0,
        press: true,
    };

    #[test]
    fn test_first_frame_then_only_when_due() {
        let monitor = monitor();
        let mut display = display();
        let mut ui = DisplayLoop::new(Settings::default());

        assert!(ui.frame(&monitor, &mut display, secs(0)).unwrap());
        assert!(!ui.frame(&monitor, &mut display, secs(1)).unwrap());
        // Climate refreshes every 5s.
        assert!(ui.frame(&monitor, &mut display, secs(5)).unwrap());
    }

    #[test]
    fn test_menu_change_forces_redraw() {
        let monitor = monitor();
        let mut display = display();
        let mut ui = DisplayLoop::new(Settings::default());
        ui.frame(&monitor, &mut display, secs(0)).unwrap();

        monitor.with_menu(|menu| menu.next_screen());
        assert!(ui.frame(&monitor, &mut display, secs(1)).unwrap());
    }

    #[test]
    fn test_settings_screen_has_no_periodic_refresh() {
        let monitor = monitor();
        let mut display = display();
        let mut ui = DisplayLoop::new(Settings::default());
        monitor.with_menu(|menu| {
            while menu.root_screen() != RootScreen::Settings {
                menu.next_screen();
            }
        });
        ui.frame(&monitor, &mut display, secs(0)).unwrap();
        assert!(!ui.frame(&monitor, &mut display, secs(600)).unwrap());
    }

    #[test]
    fn test_sleeping_display_draws_nothing_then_redraws_on_wake() {
        let monitor = monitor();
        let mut display = display();
        let mut ui = DisplayLoop::new(Settings::default());
        ui.frame(&monitor, &mut display, secs(0)).unwrap();

        monitor.power.set_state(PowerDomain::Display, DomainState::Asleep);
        monitor.with_menu(|menu| menu.request_redraw());
        assert!(!ui.frame(&monitor, &mut display, secs(1)).unwrap());

        monitor.power.set_state(PowerDomain::Display, DomainState::Awake);
        assert!(ui.frame(&monitor, &mut display, secs(2)).unwrap());
    }

    #[test]
    fn test_input_navigates_and_touches_activity() {
        let monitor = monitor();
        let mut dispatcher = dispatcher();

        handle_input(&monitor, TURN, &mut dispatcher, secs(12));
        assert_eq!(monitor.menu_view().node, MenuNode::RootScreens(1));
        assert_eq!(monitor.activity.last_activity(), secs(12));
    }

    #[test]
    fn test_input_while_asleep_only_wakes() {
        let monitor = monitor();
        let mut dispatcher = dispatcher();
        monitor.power.set_state(PowerDomain::Display, DomainState::Asleep);

        handle_input(&monitor, TURN, &mut dispatcher, secs(50));
        assert_eq!(monitor.menu_view().node, MenuNode::RootScreens(0));
        assert_eq!(monitor.activity.last_activity(), secs(50));
    }

    #[test]
    fn test_press_dispatches_action() {
        let monitor = monitor();
        let mut dispatcher = dispatcher();
        monitor.with_menu(|menu| {
            while menu.root_screen() != RootScreen::Settings {
                menu.next_screen();
            }
        });

        // Settings -> Select Mode -> Station.
        handle_input(&monitor, PRESS, &mut dispatcher, secs(1));
        handle_input(&monitor, TURN, &mut dispatcher, secs(2));
        handle_input(&monitor, PRESS, &mut dispatcher, secs(3));
        let action = handle_input(
            &monitor,
            InputEvent {
                delta: -1,
                press: true,
            },
            &mut dispatcher,
            secs(4),
        );
        assert_eq!(action, MenuAction::SetMode(OperatingMode::Station));
        assert_eq!(monitor.menu_view().mode, OperatingMode::Station);
    }

    #[test]
    fn test_failed_action_is_reported_not_dropped() {
        let monitor = monitor();
        let mut store = MemoryStore::new();
        store.set_read_only(true);
        let mut dispatcher = ActionDispatcher::new(ConfigStore::new(store), NoSystem);
        monitor.with_menu(|menu| {
            while menu.root_screen() != RootScreen::Settings {
                menu.next_screen();
            }
        });

        handle_input(&monitor, PRESS, &mut dispatcher, secs(1));
        handle_input(&monitor, TURN, &mut dispatcher, secs(2));
        handle_input(&monitor, PRESS, &mut dispatcher, secs(3));
        let action = handle_input(
            &monitor,
            InputEvent {
                delta: -1,
                press: true,
            },
            &mut dispatcher,
            secs(4),
        );
        assert_eq!(action, MenuAction::SetMode(OperatingMode::Station));
        assert_eq!(monitor.menu_view().notice, Some(Notice::SaveFailed));
        assert_eq!(monitor.menu_view().mode, OperatingMode::Mobile);
    }
}
