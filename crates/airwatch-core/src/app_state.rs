//! Application-wide shared state for airwatch
//!
//! [`Monitor`] bundles every piece of state the tasks share. It is created
//! once by the startup code, placed in a `StaticCell` and borrowed by each
//! task; there are no other process-wide statics.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;
use log::info;

use crate::activity::{ActivitySignal, ActivitySource};
use crate::cache::SensorCache;
use crate::config::RuntimeState;
use crate::menu::{MenuStateMachine, MenuView};
use crate::network::NetworkStatus;
use crate::power::{PowerStatus, SESSION_TIMEOUT, SessionTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    Booting,
    Running,
    /// The debug menu asked the program to exit; task loops return.
    Halted,
}

pub struct Monitor<M: RawMutex> {
    pub cache: SensorCache<M>,
    pub activity: ActivitySignal<M>,
    pub power: PowerStatus<M>,
    pub network: NetworkStatus<M>,
    pub sessions: SessionTracker<M>,
    menu: Mutex<M, RefCell<MenuStateMachine>>,
    run_state: Mutex<M, Cell<AppRunState>>,
}

impl<M: RawMutex> Monitor<M> {
    /// Build the shared state from the persisted runtime record.
    ///
    /// Activity is touched at `now` so both power domains start awake with a
    /// full idle window ahead of them.
    pub fn new(runtime: &RuntimeState, now: Instant) -> Self {
        let monitor = Self {
            cache: SensorCache::new(),
            activity: ActivitySignal::new(now),
            power: PowerStatus::new(),
            network: NetworkStatus::new(),
            sessions: SessionTracker::new(SESSION_TIMEOUT),
            menu: Mutex::new(RefCell::new(MenuStateMachine::new(
                runtime.mode,
                runtime.screen_timeout_s,
            ))),
            run_state: Mutex::new(Cell::new(AppRunState::Booting)),
        };
        monitor.activity.touch_at(now, ActivitySource::Wake);
        monitor
    }

    /// Run `f` with exclusive access to the menu.
    ///
    /// `f` must not await; the menu is only ever touched between suspend
    /// points.
    pub fn with_menu<R>(&self, f: impl FnOnce(&mut MenuStateMachine) -> R) -> R {
        self.menu.lock(|menu| f(&mut menu.borrow_mut()))
    }

    pub fn menu_view(&self) -> MenuView {
        self.with_menu(|menu| menu.view())
    }

    pub fn run_state(&self) -> AppRunState {
        self.run_state.lock(Cell::get)
    }

    pub fn set_run_state(&self, state: AppRunState) {
        let previous = self.run_state.lock(|s| s.replace(state));
        if previous != state {
            info!(" App: {:?} -> {:?}", previous, state);
        }
    }

    /// `false` once the task set has been halted.
    pub fn is_running(&self) -> bool {
        self.run_state() != AppRunState::Halted
    }
}
