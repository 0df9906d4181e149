//! Display-timeout value ladder
//!
//! Values run 10..=600 seconds: 10 s steps below 60, 20 s steps from 60 to
//! 180, 30 s steps from 180 to 600. `0` means "Never" and sits past both
//! ends of the ladder: stepping off either end lands on Never, and stepping
//! away from Never lands on 600.

pub const NEVER: u16 = 0;
pub const MAX_TIMEOUT_S: u16 = 600;

const LADDER_LEN: usize = 26;
const LADDER: [u16; LADDER_LEN] = build_ladder();

const fn step_from(value: u16) -> u16 {
    if value < 60 {
        10
    } else if value < 180 {
        20
    } else {
        30
    }
}

const fn build_ladder() -> [u16; LADDER_LEN] {
    let mut out = [0u16; LADDER_LEN];
    let mut i = 0;
    let mut value = 10;
    while value <= MAX_TIMEOUT_S {
        out[i] = value;
        i += 1;
        value += step_from(value);
    }
    out
}

/// One step up the ladder.
pub fn step_up(value: u16) -> u16 {
    if value == NEVER {
        return MAX_TIMEOUT_S;
    }
    LADDER
        .iter()
        .copied()
        .find(|&v| v > value)
        .unwrap_or(NEVER)
}

/// One step down the ladder.
pub fn step_down(value: u16) -> u16 {
    if value == NEVER {
        return MAX_TIMEOUT_S;
    }
    LADDER
        .iter()
        .rev()
        .copied()
        .find(|&v| v < value)
        .unwrap_or(NEVER)
}

/// Apply an encoder delta, one ladder step per detent.
pub fn adjust(value: u16, delta: i32) -> u16 {
    let mut value = value;
    for _ in 0..delta.unsigned_abs() {
        value = if delta > 0 {
            step_up(value)
        } else {
            step_down(value)
        };
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_shape() {
        assert_eq!(LADDER[0], 10);
        assert_eq!(LADDER[LADDER_LEN - 1], 600);
        assert!(LADDER.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_step_sizes() {
        let mut value = 30;
        for _ in 0..3 {
            value = step_up(value);
        }
        assert_eq!(value, 60);
        value = step_up(value);
        assert_eq!(value, 80);
        value = step_up(value);
        assert_eq!(value, 100);

        assert_eq!(step_up(180), 210);
        assert_eq!(step_down(180), 160);
        assert_eq!(step_down(60), 50);
    }

    #[test]
    fn test_wraparound_through_never() {
        assert_eq!(step_up(NEVER), 600);
        assert_eq!(step_up(600), NEVER);
        assert_eq!(step_down(10), NEVER);
        assert_eq!(step_down(NEVER), 600);
    }

    #[test]
    fn test_off_ladder_values_snap() {
        assert_eq!(step_up(45), 50);
        assert_eq!(step_down(45), 40);
        assert_eq!(step_up(195), 210);
    }

    #[test]
    fn test_adjust_applies_each_detent() {
        assert_eq!(adjust(30, 3), 60);
        assert_eq!(adjust(60, -2), 40);
        assert_eq!(adjust(120, 0), 120);
    }
}
