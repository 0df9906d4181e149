//! AQI categories and the display palette

use embedded_graphics::pixelcolor::Rgb565;

/// Screen background - very dark gray-blue
pub const COLOR_BACKGROUND: Rgb565 = Rgb565::new(18 >> 3, 23 >> 2, 24 >> 3);
/// Highlight behind the selected menu row
pub const COLOR_SELECTED: Rgb565 = Rgb565::new(43 >> 3, 55 >> 2, 57 >> 3);
pub const COLOR_TEXT: Rgb565 = Rgb565::new(31, 63, 31);
pub const COLOR_TEXT_DIM: Rgb565 = Rgb565::new(16, 32, 16);
/// Notice overlay fill - dark red
pub const COLOR_NOTICE: Rgb565 = Rgb565::new(43 >> 3, 29 >> 2, 29 >> 3);

/// US EPA AQI category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitive,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub fn from_aqi(aqi: u16) -> Self {
        match aqi {
            0..=50 => Self::Good,
            51..=100 => Self::Moderate,
            101..=150 => Self::UnhealthyForSensitive,
            151..=200 => Self::Unhealthy,
            201..=300 => Self::VeryUnhealthy,
            _ => Self::Hazardous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitive => "Unhealthy (sensitive)",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    /// Band colour, muted for a dark background.
    pub fn color(&self) -> Rgb565 {
        match self {
            Self::Good => Rgb565::new(95 >> 3, 185 >> 2, 141 >> 3),
            Self::Moderate => Rgb565::new(220 >> 3, 200 >> 2, 90 >> 3),
            Self::UnhealthyForSensitive => Rgb565::new(200 >> 3, 145 >> 2, 85 >> 3),
            Self::Unhealthy => Rgb565::new(190 >> 3, 95 >> 2, 95 >> 3),
            Self::VeryUnhealthy => Rgb565::new(150 >> 3, 90 >> 2, 160 >> 3),
            Self::Hazardous => Rgb565::new(130 >> 3, 40 >> 2, 50 >> 3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_boundaries() {
        assert_eq!(AqiCategory::from_aqi(50), AqiCategory::Good);
        assert_eq!(AqiCategory::from_aqi(51), AqiCategory::Moderate);
        assert_eq!(AqiCategory::from_aqi(150), AqiCategory::UnhealthyForSensitive);
        assert_eq!(AqiCategory::from_aqi(300), AqiCategory::VeryUnhealthy);
        assert_eq!(AqiCategory::from_aqi(500), AqiCategory::Hazardous);
    }
}
