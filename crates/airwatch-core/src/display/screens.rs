//! Screen and menu rendering
//!
//! Rendering is a pure function of a [`ScreenContext`]: the menu view, a
//! cache snapshot and the link state. Nothing here touches shared state.

use core::fmt::Write;
use core::ops::Range;

use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_10X20};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use embassy_time::{Duration, Instant};

use super::quality::{
    AqiCategory, COLOR_BACKGROUND, COLOR_NOTICE, COLOR_SELECTED, COLOR_TEXT, COLOR_TEXT_DIM,
};
use super::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX};
use crate::cache::{CacheSnapshot, Sample, StaleLimits};
use crate::config::OperatingMode;
use crate::menu::timeout::NEVER;
use crate::menu::{
    CONFIRM_ITEMS, DEBUG_ITEMS, EditPhase, MODE_ITEMS, MenuNode, MenuView, Notice, RootScreen,
    SAVE_CANCEL_ITEMS, SETTINGS_VISIBLE, SettingsItem,
};
use crate::network::LinkState;

pub const NOT_DETECTED: &str = "not detected";

const MARGIN_PX: i32 = 12;
const HEADER_HEIGHT_PX: u32 = 36;
const ROW_HEIGHT_PX: i32 = 32;

type Line = heapless::String<40>;

/// Everything one frame depends on.
#[derive(Debug, Clone, Copy)]
pub struct ScreenContext<'a> {
    pub view: MenuView,
    pub snapshot: &'a CacheSnapshot,
    pub link: LinkState,
    pub now: Instant,
    pub stale: StaleLimits,
    pub utc_offset_min: i16,
}

/// Format `value` with `decimals` places and a unit, or the missing-value
/// marker.
pub fn value_text(value: Option<f32>, decimals: usize, unit: &str) -> Line {
    let mut out = Line::new();
    let _ = match value {
        Some(v) => write!(out, "{:.*} {}", decimals, v, unit),
        None => out.push_str(NOT_DETECTED).map_err(|_| core::fmt::Error),
    };
    out
}

pub fn timeout_text(seconds: u16) -> Line {
    let mut out = Line::new();
    let _ = if seconds == NEVER {
        write!(out, "Never")
    } else {
        write!(out, "{} s", seconds)
    };
    out
}

/// How old `sample` is, once it is older than `limit`.
pub fn stale_text<T: Copy>(sample: &Sample<T>, now: Instant, limit: Duration) -> Option<Line> {
    if !sample.is_stale(now, limit) {
        return None;
    }
    let age = sample.age(now)?;
    let mut out = Line::new();
    let _ = write!(out, "updated {}s ago", age.as_secs());
    Some(out)
}

/// Rows of a list that fit in a window of `visible` starting at `offset`.
pub fn visible_window(count: usize, offset: usize, visible: usize) -> Range<usize> {
    let start = offset.min(count);
    start..(start + visible).min(count)
}

fn style(font: &'static MonoFont<'static>, color: Rgb565) -> MonoTextStyle<'static, Rgb565> {
    MonoTextStyle::new(font, color)
}

fn text<D>(target: &mut D, s: &str, at: Point, font: &'static MonoFont<'static>, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    Text::with_baseline(s, at, style(font, color), Baseline::Top).draw(target)?;
    Ok(())
}

fn header<D>(target: &mut D, title: &str) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(COLOR_BACKGROUND)?;
    text(target, title, Point::new(MARGIN_PX, 8), &FONT_10X20, COLOR_TEXT)?;
    Rectangle::new(
        Point::new(0, HEADER_HEIGHT_PX as i32),
        Size::new(DISPLAY_WIDTH_PX, 1),
    )
    .into_styled(PrimitiveStyle::with_fill(COLOR_SELECTED))
    .draw(target)
}

fn row_origin(row: usize) -> Point {
    Point::new(MARGIN_PX, HEADER_HEIGHT_PX as i32 + 10 + row as i32 * ROW_HEIGHT_PX)
}

/// A `label: value` row.
fn field<D>(target: &mut D, row: usize, label: &str, value: &str) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let origin = row_origin(row);
    text(target, label, origin, &FONT_6X10, COLOR_TEXT_DIM)?;
    let color = if value == NOT_DETECTED {
        COLOR_TEXT_DIM
    } else {
        COLOR_TEXT
    };
    text(target, value, origin + Point::new(0, 11), &FONT_10X20, color)
}

fn list<D>(
    target: &mut D,
    title: &str,
    items: &[&str],
    selected: usize,
    offset: usize,
    visible: usize,
    marked: Option<usize>,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    header(target, title)?;
    for (row, index) in visible_window(items.len(), offset, visible).enumerate() {
        let origin = row_origin(row);
        if index == selected {
            Rectangle::new(
                origin - Point::new(MARGIN_PX / 2, 4),
                Size::new(DISPLAY_WIDTH_PX - MARGIN_PX as u32, ROW_HEIGHT_PX as u32 - 4),
            )
            .into_styled(PrimitiveStyle::with_fill(COLOR_SELECTED))
            .draw(target)?;
        }
        let mut label = Line::new();
        let marker = if marked == Some(index) { "* " } else { "  " };
        let _ = write!(label, "{}{}", marker, items[index]);
        text(target, &label, origin, &FONT_10X20, COLOR_TEXT)?;
    }
    Ok(())
}

/// Dim age line along the bottom edge for out-of-date values.
fn age_footer<D, T: Copy>(target: &mut D, sample: &Sample<T>, now: Instant, limit: Duration) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    match stale_text(sample, now, limit) {
        Some(line) => text(
            target,
            &line,
            Point::new(MARGIN_PX, DISPLAY_HEIGHT_PX as i32 - 16),
            &FONT_6X10,
            COLOR_TEXT_DIM,
        ),
        None => Ok(()),
    }
}

fn climate<D>(target: &mut D, ctx: &ScreenContext) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let sample = &ctx.snapshot.climate;
    let climate = sample.current().unwrap_or_default();
    header(target, RootScreen::Climate.title())?;
    field(target, 0, "Temperature", &value_text(climate.temperature_c, 1, "C"))?;
    field(target, 1, "Humidity", &value_text(climate.humidity_pct, 1, "%"))?;
    age_footer(target, sample, ctx.now, ctx.stale.climate)
}

fn particulate<D>(target: &mut D, ctx: &ScreenContext) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let sample = &ctx.snapshot.particulate;
    let air = sample.current().unwrap_or_default().readings;
    header(target, RootScreen::Particulate.title())?;
    field(target, 0, "PM1.0", &value_text(air.pm1, 0, "ug/m3"))?;
    field(target, 1, "PM2.5", &value_text(air.pm25, 0, "ug/m3"))?;
    field(target, 2, "PM10", &value_text(air.pm10, 0, "ug/m3"))?;
    field(target, 3, "TVOC", &value_text(air.tvoc_ppb, 0, "ppb"))?;
    field(target, 4, "eCO2", &value_text(air.eco2_ppm, 0, "ppm"))?;
    age_footer(target, sample, ctx.now, ctx.stale.particulate)
}

fn air_quality<D>(target: &mut D, ctx: &ScreenContext) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let sample = &ctx.snapshot.particulate;
    header(target, RootScreen::AirQuality.title())?;
    age_footer(target, sample, ctx.now, ctx.stale.particulate)?;
    let Some(aqi) = sample.current().and_then(|p| p.aqi) else {
        return field(target, 0, "AQI (PM2.5)", NOT_DETECTED);
    };

    let category = AqiCategory::from_aqi(aqi);
    let band = Rectangle::new(row_origin(0), Size::new(DISPLAY_WIDTH_PX - 2 * MARGIN_PX as u32, 96));
    band.into_styled(PrimitiveStyle::with_fill(category.color()))
        .draw(target)?;

    let mut number = Line::new();
    let _ = write!(number, "AQI {}", aqi);
    text(target, &number, band.top_left + Point::new(12, 20), &FONT_10X20, COLOR_TEXT)?;
    text(target, category.label(), band.top_left + Point::new(12, 56), &FONT_10X20, COLOR_TEXT)
}

fn system<D>(target: &mut D, ctx: &ScreenContext) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    header(target, RootScreen::System.title())?;

    let battery = ctx.snapshot.battery.current().unwrap_or_default();
    let mut line = Line::new();
    let _ = match (battery.is_charging(), battery.voltage, battery.percent) {
        (true, _, _) => write!(line, "Charging"),
        (false, Some(v), Some(p)) => write!(line, "{:.2} V ({}%)", v, p),
        (false, Some(v), None) => write!(line, "{:.2} V", v),
        (false, None, _) => write!(line, "{}", NOT_DETECTED),
    };
    field(target, 0, "Battery", &line)?;

    line.clear();
    let _ = match ctx.link.address {
        Some(address) => write!(line, "{}", address),
        None => write!(line, "Not connected"),
    };
    field(target, 1, "Network", &line)?;

    field(target, 2, "Mode", ctx.view.mode.label())?;

    line.clear();
    let _ = write!(line, "{} s", ctx.now.as_secs());
    field(target, 3, "Uptime", &line)?;

    line.clear();
    let _ = match ctx.link.local_time(ctx.now, ctx.utc_offset_min) {
        Some((hour, minute)) => write!(line, "{:02}:{:02}", hour, minute),
        None => write!(line, "Not synced"),
    };
    field(target, 4, "Time", &line)
}

fn settings_landing<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    header(target, RootScreen::Settings.title())?;
    text(target, "Press to open", row_origin(0), &FONT_10X20, COLOR_TEXT_DIM)
}

fn timeout_editor<D>(
    target: &mut D,
    value: u16,
    phase: EditPhase,
    confirm_index: u8,
) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    match phase {
        EditPhase::Adjusting => {
            header(target, "Display Timeout")?;
            field(target, 0, "Turn to adjust, press to confirm", &timeout_text(value))
        }
        EditPhase::Confirming => {
            let mut title = Line::new();
            let _ = write!(title, "Save {}?", timeout_text(value));
            list(
                target,
                &title,
                &SAVE_CANCEL_ITEMS,
                confirm_index as usize,
                0,
                SAVE_CANCEL_ITEMS.len(),
                None,
            )
        }
    }
}

fn notice<D>(target: &mut D, notice: Notice) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let message = match notice {
        Notice::SaveFailed => "Save failed",
    };
    let area = Rectangle::new(
        Point::new(2 * MARGIN_PX, DISPLAY_HEIGHT_PX as i32 / 2 - 40),
        Size::new(DISPLAY_WIDTH_PX - 4 * MARGIN_PX as u32, 80),
    );
    area.into_styled(PrimitiveStyle::with_fill(COLOR_NOTICE))
        .draw(target)?;
    text(target, message, area.top_left + Point::new(16, 16), &FONT_10X20, COLOR_TEXT)?;
    text(
        target,
        "Press to dismiss",
        area.top_left + Point::new(16, 50),
        &FONT_6X10,
        COLOR_TEXT_DIM,
    )
}

/// Final frame left on the panel after the task set halts.
pub fn exited<D>(target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    target.clear(COLOR_BACKGROUND)?;
    text(target, "Exited main", Point::new(MARGIN_PX, DISPLAY_HEIGHT_PX as i32 / 2 - 10), &FONT_10X20, COLOR_TEXT)
}

/// Draw one full frame for the current menu node.
pub fn render<D>(target: &mut D, ctx: &ScreenContext) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    match ctx.view.node {
        MenuNode::RootScreens(_) => match ctx.view.root {
            RootScreen::Climate => climate(target, ctx)?,
            RootScreen::Particulate => particulate(target, ctx)?,
            RootScreen::AirQuality => air_quality(target, ctx)?,
            RootScreen::System => system(target, ctx)?,
            RootScreen::Settings => settings_landing(target)?,
        },
        MenuNode::Settings {
            index,
            scroll_offset,
        } => {
            let labels = SettingsItem::ALL.map(|item| item.label());
            list(
                target,
                RootScreen::Settings.title(),
                &labels,
                index as usize,
                scroll_offset as usize,
                SETTINGS_VISIBLE,
                None,
            )?
        }
        MenuNode::ModeSelect(index) => {
            let current = match ctx.view.mode {
                OperatingMode::Station => 0,
                OperatingMode::Mobile => 1,
            };
            list(
                target,
                "Select Mode",
                &MODE_ITEMS,
                index as usize,
                0,
                MODE_ITEMS.len(),
                Some(current),
            )?
        }
        MenuNode::ResetConfirm(index) => list(
            target,
            "Reset WiFi?",
            &CONFIRM_ITEMS,
            index as usize,
            0,
            CONFIRM_ITEMS.len(),
            None,
        )?,
        MenuNode::DisplayTimeoutEdit {
            value,
            phase,
            confirm_index,
            ..
        } => timeout_editor(target, value, phase, confirm_index)?,
        MenuNode::DebugMenu(index) => list(
            target,
            "Debug",
            &DEBUG_ITEMS,
            index as usize,
            0,
            DEBUG_ITEMS.len(),
            None,
        )?,
    }

    if let Some(n) = ctx.view.notice {
        notice(target, n)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GroupUpdate, SensorCache};
    use crate::config::Settings;
    use crate::display::FrameBuffer;
    use crate::menu::MenuStateMachine;
    use crate::sensors::ParticulateReadings;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn frame() -> FrameBuffer {
        FrameBuffer::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX)
    }

    #[test]
    fn test_missing_values_render_not_detected() {
        assert_eq!(value_text(None, 1, "C").as_str(), NOT_DETECTED);
        assert_eq!(value_text(Some(21.456), 1, "C").as_str(), "21.5 C");
        assert_eq!(timeout_text(0).as_str(), "Never");
        assert_eq!(timeout_text(90).as_str(), "90 s");
    }

    #[test]
    fn test_visible_window() {
        assert_eq!(visible_window(5, 0, 4), 0..4);
        assert_eq!(visible_window(5, 1, 4), 1..5);
        assert_eq!(visible_window(3, 0, 4), 0..3);
    }

    #[test]
    fn test_every_root_screen_renders() {
        let snapshot = CacheSnapshot::default();
        let mut menu = MenuStateMachine::new(OperatingMode::Mobile, 30);
        for _ in RootScreen::ALL {
            let mut target = frame();
            let ctx = ScreenContext {
                view: menu.view(),
                snapshot: &snapshot,
                link: LinkState::default(),
                now: Instant::from_secs(5),
                stale: Settings::default().stale_limits(OperatingMode::Mobile),
            utc_offset_min: 0,
            };
            render(&mut target, &ctx).unwrap();
            assert!(target.dirty_area().is_some(), "{:?} drew nothing", menu.root_screen());
            menu.next_screen();
        }
    }

    #[test]
    fn test_redraw_of_same_frame_is_clean() {
        let snapshot = CacheSnapshot::default();
        let menu = MenuStateMachine::new(OperatingMode::Mobile, 30);
        let ctx = ScreenContext {
            view: menu.view(),
            snapshot: &snapshot,
            link: LinkState::default(),
            now: Instant::from_secs(5),
            stale: Settings::default().stale_limits(OperatingMode::Mobile),
            utc_offset_min: 0,
        };

        let mut target = frame();
        render(&mut target, &ctx).unwrap();
        let mut panel = FrameBuffer::new(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX);
        target.flush(&mut panel).unwrap();

        render(&mut target, &ctx).unwrap();
        assert_eq!(target.dirty_area(), None);
    }

    #[test]
    fn test_notice_overlay_draws_over_screen() {
        let snapshot = CacheSnapshot::default();
        let mut menu = MenuStateMachine::new(OperatingMode::Mobile, 30);
        let ctx = ScreenContext {
            view: menu.view(),
            snapshot: &snapshot,
            link: LinkState::default(),
            now: Instant::from_secs(5),
            stale: Settings::default().stale_limits(OperatingMode::Mobile),
            utc_offset_min: 0,
        };
        let mut plain = frame();
        render(&mut plain, &ctx).unwrap();

        menu.show_notice(Notice::SaveFailed);
        let ctx = ScreenContext {
            view: menu.view(),
            ..ctx
        };
        let mut overlaid = frame();
        render(&mut overlaid, &ctx).unwrap();

        let center = (DISPLAY_WIDTH_PX as usize / 2, DISPLAY_HEIGHT_PX as usize / 2 + 30);
        assert_eq!(overlaid.pixel(center.0, center.1), Some(COLOR_NOTICE));
        assert_ne!(plain.pixel(center.0, center.1), Some(COLOR_NOTICE));
    }

    #[test]
    fn test_old_particulate_values_are_marked() {
        let cache = SensorCache::<NoopRawMutex>::new();
        cache.update(
            GroupUpdate::Particulate(Some(ParticulateReadings {
                pm25: Some(30.0),
                ..Default::default()
            })),
            Instant::from_secs(0),
        );
        let snapshot = cache.snapshot();
        let limit = Duration::from_secs(20);

        assert_eq!(stale_text(&snapshot.particulate, Instant::from_secs(20), limit), None);
        assert_eq!(
            stale_text(&snapshot.particulate, Instant::from_secs(300), limit).as_deref(),
            Some("updated 300s ago")
        );
        assert_eq!(stale_text(&snapshot.climate, Instant::from_secs(300), limit), None);

        // The marker row is drawn only once the values are out of date.
        let mut menu = MenuStateMachine::new(OperatingMode::Mobile, 30);
        menu.next_screen();
        let marker = (MARGIN_PX as usize + 1, DISPLAY_HEIGHT_PX as usize - 12);
        let draw = |now: u64| {
            let ctx = ScreenContext {
                view: menu.view(),
                snapshot: &snapshot,
                link: LinkState::default(),
                now: Instant::from_secs(now),
                stale: Settings::default().stale_limits(OperatingMode::Mobile),
            utc_offset_min: 0,
            };
            let mut target = frame();
            render(&mut target, &ctx).unwrap();
            (MARGIN_PX as usize..DISPLAY_WIDTH_PX as usize / 2)
                .any(|x| target.pixel(x, marker.1) == Some(COLOR_TEXT_DIM))
        };
        assert!(!draw(10));
        assert!(draw(300));
    }
}
