//! Hierarchical menu state machine
//!
//! Root screens form the implicit base of the navigation; submenus are
//! pushed onto a small stack so "Back" can return to their parent. The state
//! machine never performs I/O: a button press returns a [`MenuAction`] that
//! the caller executes.

pub mod timeout;

use embassy_time::Duration;
use log::{debug, warn};

use crate::config::OperatingMode;

const MAX_DEPTH: usize = 4;

/// Number of settings rows visible at once.
pub const SETTINGS_VISIBLE: usize = 4;

/// Top-level screens, cycled with the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootScreen {
    Climate,
    Particulate,
    AirQuality,
    System,
    Settings,
}

impl RootScreen {
    pub const ALL: [RootScreen; 5] = [
        RootScreen::Climate,
        RootScreen::Particulate,
        RootScreen::AirQuality,
        RootScreen::System,
        RootScreen::Settings,
    ];

    pub fn from_index(index: u8) -> Self {
        Self::ALL[index as usize % Self::ALL.len()]
    }

    pub fn title(&self) -> &'static str {
        match self {
            RootScreen::Climate => "Climate",
            RootScreen::Particulate => "Particulates",
            RootScreen::AirQuality => "Air Quality",
            RootScreen::System => "System",
            RootScreen::Settings => "Settings",
        }
    }

    /// How often the screen redraws on its own; `None` redraws only on input.
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self {
            RootScreen::Climate => Some(Duration::from_secs(5)),
            RootScreen::Particulate | RootScreen::AirQuality => Some(Duration::from_secs(10)),
            RootScreen::System => Some(Duration::from_secs(15)),
            RootScreen::Settings => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsItem {
    ResetWifi,
    SelectMode,
    DisplayTimeout,
    Debug,
    Back,
}

impl SettingsItem {
    pub const ALL: [SettingsItem; 5] = [
        SettingsItem::ResetWifi,
        SettingsItem::SelectMode,
        SettingsItem::DisplayTimeout,
        SettingsItem::Debug,
        SettingsItem::Back,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SettingsItem::ResetWifi => "Reset WiFi",
            SettingsItem::SelectMode => "Select Mode",
            SettingsItem::DisplayTimeout => "Display Timeout",
            SettingsItem::Debug => "Debug",
            SettingsItem::Back => "Back",
        }
    }
}

pub const MODE_ITEMS: [&str; 3] = ["Station", "Mobile", "Back"];
pub const CONFIRM_ITEMS: [&str; 3] = ["Yes", "No", "Back"];
pub const DEBUG_ITEMS: [&str; 2] = ["Exit Program", "Back"];
pub const SAVE_CANCEL_ITEMS: [&str; 2] = ["Save", "Cancel"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Adjusting,
    Confirming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuNode {
    RootScreens(u8),
    Settings {
        index: u8,
        scroll_offset: u8,
    },
    ModeSelect(u8),
    ResetConfirm(u8),
    DisplayTimeoutEdit {
        value: u16,
        phase: EditPhase,
        confirm_index: u8,
        /// Value captured on entry; restored by Cancel.
        initial: u16,
    },
    DebugMenu(u8),
}

/// Work the caller must carry out after a button press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    None,
    ResetWifi,
    SetMode(OperatingMode),
    TimeoutSaved(u16),
    ExitProgram,
}

/// Transient message shown over the current screen until the next input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    SaveFailed,
}

/// Copy of everything the renderer needs from the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuView {
    pub node: MenuNode,
    pub root: RootScreen,
    pub mode: OperatingMode,
    pub screen_timeout_s: u16,
    pub notice: Option<Notice>,
}

fn wrap(index: u8, delta: i32, count: usize) -> u8 {
    (index as i32 + delta).rem_euclid(count as i32) as u8
}

/// Smallest shift of `offset` that keeps `index` inside a window of
/// `visible` rows.
fn scroll_to(index: u8, offset: u8, visible: usize) -> u8 {
    let visible = visible as u8;
    if index < offset {
        index
    } else if index >= offset + visible {
        index + 1 - visible
    } else {
        offset
    }
}

fn mode_index(mode: OperatingMode) -> u8 {
    match mode {
        OperatingMode::Station => 0,
        OperatingMode::Mobile => 1,
    }
}

#[derive(Debug, Clone)]
pub struct MenuStateMachine {
    root_index: u8,
    stack: heapless::Vec<MenuNode, MAX_DEPTH>,
    needs_redraw: bool,
    mode: OperatingMode,
    screen_timeout_s: u16,
    notice: Option<Notice>,
}

impl MenuStateMachine {
    pub fn new(mode: OperatingMode, screen_timeout_s: u16) -> Self {
        Self {
            root_index: 0,
            stack: heapless::Vec::new(),
            needs_redraw: true,
            mode,
            screen_timeout_s,
            notice: None,
        }
    }

    /// The active node: the top of the stack, or the current root screen.
    pub fn current(&self) -> MenuNode {
        self.stack
            .last()
            .copied()
            .unwrap_or(MenuNode::RootScreens(self.root_index))
    }

    pub fn root_screen(&self) -> RootScreen {
        RootScreen::from_index(self.root_index)
    }

    /// Number of submenus entered below the root.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn view(&self) -> MenuView {
        MenuView {
            node: self.current(),
            root: self.root_screen(),
            mode: self.mode,
            screen_timeout_s: self.screen_timeout_s,
            notice: self.notice,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: OperatingMode) {
        self.mode = mode;
        self.needs_redraw = true;
    }

    pub fn screen_timeout_s(&self) -> u16 {
        self.screen_timeout_s
    }

    pub fn set_screen_timeout(&mut self, seconds: u16) {
        self.screen_timeout_s = seconds;
        self.needs_redraw = true;
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notice
    }

    pub fn show_notice(&mut self, notice: Notice) {
        self.notice = Some(notice);
        self.needs_redraw = true;
    }

    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    pub fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    /// Clear and return the redraw flag.
    pub fn take_redraw(&mut self) -> bool {
        core::mem::take(&mut self.needs_redraw)
    }

    pub fn next_screen(&mut self) {
        self.root_index = wrap(self.root_index, 1, RootScreen::ALL.len());
        self.needs_redraw = true;
    }

    pub fn prev_screen(&mut self) {
        self.root_index = wrap(self.root_index, -1, RootScreen::ALL.len());
        self.needs_redraw = true;
    }

    /// Any input first dismisses a pending notice.
    fn dismiss_notice(&mut self) -> bool {
        if self.notice.take().is_some() {
            self.needs_redraw = true;
            return true;
        }
        false
    }

    fn replace_top(&mut self, node: MenuNode) {
        if let Some(top) = self.stack.last_mut() {
            *top = node;
        }
        self.needs_redraw = true;
    }

    fn push(&mut self, node: MenuNode) {
        if self.stack.push(node).is_err() {
            warn!(" Menu: stack full, ignoring {:?}", node);
            return;
        }
        debug!(" Menu: enter {:?}", node);
        self.needs_redraw = true;
    }

    /// Apply an encoder movement of `delta` detents.
    pub fn rotate(&mut self, delta: i32) {
        if delta == 0 || self.dismiss_notice() {
            return;
        }

        let node = match self.current() {
            MenuNode::RootScreens(_) => {
                self.root_index = wrap(self.root_index, delta, RootScreen::ALL.len());
                self.needs_redraw = true;
                return;
            }
            MenuNode::Settings {
                index,
                scroll_offset,
            } => {
                let index = wrap(index, delta, SettingsItem::ALL.len());
                MenuNode::Settings {
                    index,
                    scroll_offset: scroll_to(index, scroll_offset, SETTINGS_VISIBLE),
                }
            }
            MenuNode::ModeSelect(index) => MenuNode::ModeSelect(wrap(index, delta, MODE_ITEMS.len())),
            MenuNode::ResetConfirm(index) => {
                MenuNode::ResetConfirm(wrap(index, delta, CONFIRM_ITEMS.len()))
            }
            MenuNode::DebugMenu(index) => MenuNode::DebugMenu(wrap(index, delta, DEBUG_ITEMS.len())),
            MenuNode::DisplayTimeoutEdit {
                value,
                phase,
                confirm_index,
                initial,
            } => match phase {
                EditPhase::Adjusting => MenuNode::DisplayTimeoutEdit {
                    value: timeout::adjust(value, delta),
                    phase,
                    confirm_index,
                    initial,
                },
                EditPhase::Confirming => MenuNode::DisplayTimeoutEdit {
                    value,
                    phase,
                    confirm_index: wrap(confirm_index, delta, SAVE_CANCEL_ITEMS.len()),
                    initial,
                },
            },
        };
        self.replace_top(node);
    }

    /// Handle a button press on the active node.
    pub fn press(&mut self) -> MenuAction {
        if self.dismiss_notice() {
            return MenuAction::None;
        }

        match self.current() {
            MenuNode::RootScreens(_) => {
                if self.root_screen() == RootScreen::Settings {
                    self.push(MenuNode::Settings {
                        index: 0,
                        scroll_offset: 0,
                    });
                } else {
                    self.needs_redraw = true;
                }
                MenuAction::None
            }
            MenuNode::Settings { index, .. } => {
                match SettingsItem::ALL[index as usize] {
                    SettingsItem::ResetWifi => self.push(MenuNode::ResetConfirm(1)),
                    SettingsItem::SelectMode => {
                        self.push(MenuNode::ModeSelect(mode_index(self.mode)))
                    }
                    SettingsItem::DisplayTimeout => self.push(MenuNode::DisplayTimeoutEdit {
                        value: self.screen_timeout_s,
                        phase: EditPhase::Adjusting,
                        confirm_index: 0,
                        initial: self.screen_timeout_s,
                    }),
                    SettingsItem::Debug => self.push(MenuNode::DebugMenu(0)),
                    SettingsItem::Back => self.back(),
                }
                MenuAction::None
            }
            MenuNode::ModeSelect(index) => match index {
                0 => {
                    self.back();
                    MenuAction::SetMode(OperatingMode::Station)
                }
                1 => {
                    self.back();
                    MenuAction::SetMode(OperatingMode::Mobile)
                }
                _ => {
                    self.back();
                    MenuAction::None
                }
            },
            MenuNode::ResetConfirm(index) => {
                self.back();
                if index == 0 {
                    MenuAction::ResetWifi
                } else {
                    MenuAction::None
                }
            }
            MenuNode::DebugMenu(index) => {
                if index == 0 {
                    MenuAction::ExitProgram
                } else {
                    self.back();
                    MenuAction::None
                }
            }
            MenuNode::DisplayTimeoutEdit {
                value,
                phase: EditPhase::Adjusting,
                initial,
                ..
            } => {
                self.replace_top(MenuNode::DisplayTimeoutEdit {
                    value,
                    phase: EditPhase::Confirming,
                    confirm_index: 0,
                    initial,
                });
                MenuAction::None
            }
            MenuNode::DisplayTimeoutEdit {
                value,
                phase: EditPhase::Confirming,
                confirm_index,
                initial,
            } => {
                if confirm_index == 0 {
                    self.back();
                    MenuAction::TimeoutSaved(value)
                } else {
                    self.replace_top(MenuNode::DisplayTimeoutEdit {
                        value: initial,
                        phase: EditPhase::Adjusting,
                        confirm_index: 0,
                        initial,
                    });
                    self.back();
                    MenuAction::None
                }
            }
        }
    }

    /// Return to the parent node; with nothing to pop, exit to the first
    /// root screen.
    pub fn back(&mut self) {
        if self.stack.pop().is_none() {
            self.exit_to_root();
            return;
        }
        self.needs_redraw = true;
    }

    pub fn exit_to_root(&mut self) {
        self.stack.clear();
        self.root_index = 0;
        self.needs_redraw = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn menu() -> MenuStateMachine {
        MenuStateMachine::new(OperatingMode::Mobile, 30)
    }

    /// Rotate to the Settings root screen and enter it.
    fn enter_settings(menu: &mut MenuStateMachine) {
        while menu.root_screen() != RootScreen::Settings {
            menu.next_screen();
        }
        assert_eq!(menu.press(), MenuAction::None);
    }

    fn select_setting(menu: &mut MenuStateMachine, item: SettingsItem) {
        let target = SettingsItem::ALL.iter().position(|&i| i == item).unwrap();
        menu.rotate(target as i32);
        menu.press();
    }

    #[test]
    fn test_root_navigation_wraps() {
        let mut menu = menu();
        for _ in 0..RootScreen::ALL.len() {
            menu.next_screen();
        }
        assert_eq!(menu.current(), MenuNode::RootScreens(0));

        menu.prev_screen();
        assert_eq!(menu.root_screen(), RootScreen::Settings);
    }

    #[test]
    fn test_settings_is_pushed_not_root() {
        let mut menu = menu();
        enter_settings(&mut menu);
        assert_eq!(
            menu.current(),
            MenuNode::Settings {
                index: 0,
                scroll_offset: 0
            }
        );
        assert_eq!(menu.depth(), 1);
        assert!(
            !menu
                .stack
                .iter()
                .any(|n| matches!(n, MenuNode::RootScreens(_)))
        );
    }

    #[test]
    fn test_settings_scroll_minimal_shift() {
        let mut menu = menu();
        enter_settings(&mut menu);

        menu.rotate(3);
        assert_eq!(
            menu.current(),
            MenuNode::Settings {
                index: 3,
                scroll_offset: 0
            }
        );
        menu.rotate(1);
        assert_eq!(
            menu.current(),
            MenuNode::Settings {
                index: 4,
                scroll_offset: 1
            }
        );
        // Wrapping back to the top scrolls the window back.
        menu.rotate(1);
        assert_eq!(
            menu.current(),
            MenuNode::Settings {
                index: 0,
                scroll_offset: 0
            }
        );
    }

    #[test]
    fn test_timeout_edit_save() {
        let mut menu = menu();
        enter_settings(&mut menu);
        select_setting(&mut menu, SettingsItem::DisplayTimeout);

        menu.rotate(3);
        let MenuNode::DisplayTimeoutEdit { value, .. } = menu.current() else {
            panic!("expected timeout editor");
        };
        assert_eq!(value, 60);

        assert_eq!(menu.press(), MenuAction::None, "first press asks to confirm");
        assert_eq!(menu.press(), MenuAction::TimeoutSaved(60));
        assert!(matches!(menu.current(), MenuNode::Settings { .. }));
    }

    #[test]
    fn test_timeout_edit_cancel_restores_entry_value() {
        let mut menu = menu();
        enter_settings(&mut menu);
        select_setting(&mut menu, SettingsItem::DisplayTimeout);

        menu.rotate(5);
        menu.press();
        menu.rotate(1);
        let MenuNode::DisplayTimeoutEdit {
            confirm_index,
            initial,
            ..
        } = menu.current()
        else {
            panic!("expected timeout editor");
        };
        assert_eq!(confirm_index, 1);
        assert_eq!(initial, 30);

        assert_eq!(menu.press(), MenuAction::None);
        assert_eq!(menu.screen_timeout_s(), 30);

        // Re-entering starts from the untouched value.
        menu.press();
        let MenuNode::DisplayTimeoutEdit { value, .. } = menu.current() else {
            panic!("expected timeout editor");
        };
        assert_eq!(value, 30);
    }

    #[test]
    fn test_mode_select_marks_current_and_emits() {
        let mut menu = MenuStateMachine::new(OperatingMode::Station, 30);
        enter_settings(&mut menu);
        select_setting(&mut menu, SettingsItem::SelectMode);
        assert_eq!(menu.current(), MenuNode::ModeSelect(0));

        menu.rotate(1);
        assert_eq!(menu.press(), MenuAction::SetMode(OperatingMode::Mobile));
        assert!(matches!(menu.current(), MenuNode::Settings { .. }));
    }

    #[test]
    fn test_reset_confirm_paths() {
        let mut menu = menu();
        enter_settings(&mut menu);
        select_setting(&mut menu, SettingsItem::ResetWifi);
        assert_eq!(menu.current(), MenuNode::ResetConfirm(1), "defaults to No");
        assert_eq!(menu.press(), MenuAction::None);

        menu.press();
        menu.rotate(-1);
        assert_eq!(menu.press(), MenuAction::ResetWifi);
    }

    #[test]
    fn test_debug_exit() {
        let mut menu = menu();
        enter_settings(&mut menu);
        select_setting(&mut menu, SettingsItem::Debug);
        assert_eq!(menu.press(), MenuAction::ExitProgram);
    }

    #[test]
    fn test_back_from_empty_stack_exits_to_root() {
        let mut menu = menu();
        menu.next_screen();
        menu.next_screen();
        menu.take_redraw();

        menu.back();
        assert_eq!(menu.current(), MenuNode::RootScreens(0));
        assert!(menu.take_redraw(), "exit to root forces a redraw");
    }

    #[test]
    fn test_back_item_pops_settings() {
        let mut menu = menu();
        enter_settings(&mut menu);
        select_setting(&mut menu, SettingsItem::Back);
        assert_eq!(menu.depth(), 0);
        assert_eq!(menu.root_screen(), RootScreen::Settings);
    }

    #[test]
    fn test_notice_swallows_next_input() {
        let mut menu = menu();
        menu.show_notice(Notice::SaveFailed);
        menu.rotate(1);
        assert_eq!(menu.notice(), None);
        assert_eq!(menu.root_screen(), RootScreen::Climate);

        menu.rotate(1);
        assert_eq!(menu.root_screen(), RootScreen::Particulate);
    }

    #[test]
    fn test_exit_to_root_resets() {
        let mut menu = menu();
        enter_settings(&mut menu);
        select_setting(&mut menu, SettingsItem::Debug);
        assert_eq!(menu.depth(), 2);

        menu.exit_to_root();
        assert_eq!(menu.depth(), 0);
        assert_eq!(menu.current(), MenuNode::RootScreens(0));
    }
}
