//! Execution of menu actions
//!
//! The menu only describes what the user chose; this is where the choice
//! touches persisted configuration, the power manager or the system itself.

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::{error, info};

use crate::app_state::{AppRunState, Monitor};
use crate::config::{ConfigStore, KeyValueStore, RuntimeState, WifiCredentials};
use crate::error::AppError;
use crate::menu::{MenuAction, Notice};

/// Whole-system control hooks.
pub trait SystemControl {
    /// Restart the device. On hardware this does not return.
    fn reset(&mut self);
    /// Stop the program after the task set has wound down.
    fn halt(&mut self);
}

pub struct ActionDispatcher<S, C> {
    store: ConfigStore<S>,
    system: C,
}

impl<S: KeyValueStore, C: SystemControl> ActionDispatcher<S, C> {
    pub fn new(store: ConfigStore<S>, system: C) -> Self {
        Self { store, system }
    }

    pub fn store(&self) -> &ConfigStore<S> {
        &self.store
    }

    pub fn system(&self) -> &C {
        &self.system
    }

    pub fn into_parts(self) -> (ConfigStore<S>, C) {
        (self.store, self.system)
    }

    /// Execute `action`. A failure is logged and left on screen as a notice
    /// until the next input, then returned.
    pub fn dispatch<M: RawMutex>(
        &mut self,
        monitor: &Monitor<M>,
        action: MenuAction,
    ) -> Result<(), AppError> {
        let result = self.execute(monitor, action);
        if let Err(e) = &result {
            error!(" Dispatch: {:?} failed: {}", action, e);
            monitor.with_menu(|menu| menu.show_notice(Notice::SaveFailed));
        }
        result
    }

    fn execute<M: RawMutex>(&mut self, monitor: &Monitor<M>, action: MenuAction) -> Result<(), AppError> {
        let (mode, screen_timeout_s) =
            monitor.with_menu(|menu| (menu.mode(), menu.screen_timeout_s()));

        match action {
            MenuAction::None => {}
            MenuAction::ResetWifi => {
                // An explicit empty record, so boot does not re-seed it.
                self.store.save(&WifiCredentials::default())?;
                info!(" Dispatch: WiFi credentials cleared, resetting");
                self.system.reset();
            }
            MenuAction::SetMode(new_mode) if new_mode == mode => {
                info!(" Dispatch: already in {:?} mode", mode);
            }
            MenuAction::SetMode(new_mode) => {
                self.store.save(&RuntimeState {
                    mode: new_mode,
                    screen_timeout_s,
                })?;
                monitor.with_menu(|menu| menu.set_mode(new_mode));
                info!(" Dispatch: switched to {:?} mode, resetting", new_mode);
                self.system.reset();
            }
            MenuAction::TimeoutSaved(seconds) => {
                self.store.save(&RuntimeState {
                    mode,
                    screen_timeout_s: seconds,
                })?;
                monitor.with_menu(|menu| menu.set_screen_timeout(seconds));
                monitor.power.request_display_threshold(seconds);
                info!(" Dispatch: display timeout now {}s", seconds);
            }
            MenuAction::ExitProgram => {
                info!(" Dispatch: exiting");
                monitor.set_run_state(AppRunState::Halted);
                self.system.halt();
            }
        }
        Ok(())
    }
}
