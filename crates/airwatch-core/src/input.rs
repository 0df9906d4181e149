//! Rotary encoder and push-button input

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use embassy_time::{Duration, Instant};
use log::trace;

/// A monotonic rotary position plus a push button.
pub trait InputSource {
    fn value(&self) -> i32;
    fn pressed(&self) -> bool;
}

/// Gray-code quadrature decoder.
///
/// Counts quarter steps from the A/B line levels and reports whole detents.
#[derive(Debug, Clone)]
pub struct QuadratureDecoder {
    state: u8,
    quarter_steps: i32,
    steps_per_detent: i32,
}

/// Direction of a transition indexed by `(previous << 2) | current`.
const TRANSITIONS: [i8; 16] = [0, 1, -1, 0, -1, 0, 0, 1, 1, 0, 0, -1, 0, -1, 1, 0];

impl QuadratureDecoder {
    pub fn new(a: bool, b: bool, steps_per_detent: i32) -> Self {
        Self {
            state: Self::encode(a, b),
            quarter_steps: 0,
            steps_per_detent: steps_per_detent.max(1),
        }
    }

    fn encode(a: bool, b: bool) -> u8 {
        ((a as u8) << 1) | b as u8
    }

    /// Feed the current line levels; invalid double transitions are ignored.
    pub fn update(&mut self, a: bool, b: bool) {
        let next = Self::encode(a, b);
        let step = TRANSITIONS[((self.state << 2) | next) as usize];
        self.state = next;
        self.quarter_steps += step as i32;
    }

    /// Position in whole detents.
    pub fn position(&self) -> i32 {
        self.quarter_steps.div_euclid(self.steps_per_detent)
    }
}

/// Lock-free encoder state shared between the edge-decoding task and the
/// input poller.
pub struct SharedEncoder {
    position: AtomicI32,
    button: AtomicBool,
}

impl Default for SharedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedEncoder {
    pub const fn new() -> Self {
        Self {
            position: AtomicI32::new(0),
            button: AtomicBool::new(false),
        }
    }

    pub fn set_position(&self, position: i32) {
        self.position.store(position, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i32) {
        self.position.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn set_pressed(&self, pressed: bool) {
        self.button.store(pressed, Ordering::Relaxed);
    }
}

impl InputSource for SharedEncoder {
    fn value(&self) -> i32 {
        self.position.load(Ordering::Relaxed)
    }

    fn pressed(&self) -> bool {
        self.button.load(Ordering::Relaxed)
    }
}

/// Input observed in one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputEvent {
    pub delta: i32,
    pub press: bool,
}

impl InputEvent {
    pub fn is_empty(&self) -> bool {
        self.delta == 0 && !self.press
    }
}

/// Turns absolute encoder readings into deltas and debounced presses.
#[derive(Debug, Clone)]
pub struct InputTracker {
    last_value: i32,
    was_pressed: bool,
    last_press: Option<Instant>,
    debounce: Duration,
}

impl InputTracker {
    pub fn new(source: &impl InputSource, debounce: Duration) -> Self {
        Self {
            last_value: source.value(),
            was_pressed: source.pressed(),
            last_press: None,
            debounce,
        }
    }

    pub fn poll(&mut self, source: &impl InputSource, now: Instant) -> InputEvent {
        let value = source.value();
        let delta = value.wrapping_sub(self.last_value);
        self.last_value = value;

        let pressed = source.pressed();
        let rising = pressed && !self.was_pressed;
        self.was_pressed = pressed;

        let press = rising
            && self
                .last_press
                .is_none_or(|at| now.saturating_duration_since(at) >= self.debounce);
        if press {
            self.last_press = Some(now);
        }

        let event = InputEvent { delta, press };
        if !event.is_empty() {
            trace!(" Input: {:?}", event);
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(decoder: &mut QuadratureDecoder, sequence: &[(bool, bool)]) {
        for &(a, b) in sequence {
            decoder.update(a, b);
        }
    }

    const CW: [(bool, bool); 4] = [(false, true), (true, true), (true, false), (false, false)];
    const CCW: [(bool, bool); 4] = [(true, false), (true, true), (false, true), (false, false)];

    #[test]
    fn test_decoder_counts_detents() {
        let mut decoder = QuadratureDecoder::new(false, false, 4);
        turn(&mut decoder, &CW);
        turn(&mut decoder, &CW);
        assert_eq!(decoder.position(), 2);
        turn(&mut decoder, &CCW);
        assert_eq!(decoder.position(), 1);
    }

    #[test]
    fn test_decoder_ignores_bounce() {
        let mut decoder = QuadratureDecoder::new(false, false, 4);
        turn(&mut decoder, &[(false, true), (false, false), (false, true)]);
        assert_eq!(decoder.quarter_steps, 1);
    }

    #[test]
    fn test_tracker_reports_delta_once() {
        let encoder = SharedEncoder::new();
        let mut tracker = InputTracker::new(&encoder, Duration::from_millis(200));

        encoder.add(3);
        assert_eq!(tracker.poll(&encoder, Instant::from_millis(0)).delta, 3);
        assert_eq!(tracker.poll(&encoder, Instant::from_millis(20)).delta, 0);
        encoder.add(-1);
        assert_eq!(tracker.poll(&encoder, Instant::from_millis(40)).delta, -1);
    }

    #[test]
    fn test_button_is_edge_triggered_and_debounced() {
        let encoder = SharedEncoder::new();
        let mut tracker = InputTracker::new(&encoder, Duration::from_millis(200));

        encoder.set_pressed(true);
        assert!(tracker.poll(&encoder, Instant::from_millis(1000)).press);
        assert!(!tracker.poll(&encoder, Instant::from_millis(1020)).press, "held");

        // Contact bounce inside the debounce window.
        encoder.set_pressed(false);
        tracker.poll(&encoder, Instant::from_millis(1040));
        encoder.set_pressed(true);
        assert!(!tracker.poll(&encoder, Instant::from_millis(1060)).press);

        encoder.set_pressed(false);
        tracker.poll(&encoder, Instant::from_millis(1300));
        encoder.set_pressed(true);
        assert!(tracker.poll(&encoder, Instant::from_millis(1320)).press);
    }
}
