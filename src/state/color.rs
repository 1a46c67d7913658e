//! 24-bit light colors and the rainbow palette badges cycle through.

use serde::{Deserialize, Serialize};

/// A packed `0xRRGGBB` color as sent to the badge lights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const RED: Color = Color(0xff0000);
    pub const ORANGE: Color = Color(0xff7f00);
    pub const YELLOW: Color = Color(0xffff00);
    pub const GREEN: Color = Color(0x00ff00);
    pub const CYAN: Color = Color(0x00ffff);
    pub const BLUE: Color = Color(0x0000ff);
    pub const PURPLE: Color = Color(0x7f00ff);
    pub const PINK: Color = Color(0xff00ff);
    pub const WHITE: Color = Color(0xffffff);
    pub const OFF: Color = Color(0x000000);

    /// Palette cycled by [`next_color`] and [`prev_color`].
    pub const RAINBOW: [Color; 7] = [
        Color::RED,
        Color::ORANGE,
        Color::YELLOW,
        Color::GREEN,
        Color::CYAN,
        Color::BLUE,
        Color::PURPLE,
    ];

    fn channel(self, shift: u32) -> u32 {
        (self.0 >> shift) & 0xff
    }
}

/// Scale every channel of `color` by `amount`, truncating toward zero.
///
/// `amount` must already lie in `[0, 1]`; callers clamp before getting here.
pub fn lighten(amount: f64, color: Color) -> Color {
    debug_assert!((0.0..=1.0).contains(&amount), "amount {amount} out of range");
    let scale = |shift: u32| ((amount * f64::from(color.channel(shift))) as u32) & 0xff;
    Color(scale(16) << 16 | scale(8) << 8 | scale(0))
}

/// Next palette entry, wrapping purple back to red.
///
/// Colors outside the palette map to the first entry.
pub fn next_color(color: Color) -> Color {
    step(color, 1)
}

/// Previous palette entry, wrapping red back to purple.
///
/// Colors outside the palette map to the first entry.
pub fn prev_color(color: Color) -> Color {
    step(color, Color::RAINBOW.len() - 1)
}

fn step(color: Color, offset: usize) -> Color {
    match Color::RAINBOW.iter().position(|candidate| *candidate == color) {
        Some(index) => Color::RAINBOW[(index + offset) % Color::RAINBOW.len()],
        None => Color::RAINBOW[0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [Color; 6] = [
        Color::WHITE,
        Color::ORANGE,
        Color::PURPLE,
        Color(0x123456),
        Color(0x010203),
        Color::OFF,
    ];

    #[test]
    fn full_brightness_is_identity() {
        for color in SAMPLES {
            assert_eq!(lighten(1.0, color), color);
        }
    }

    #[test]
    fn zero_brightness_is_black() {
        for color in SAMPLES {
            assert_eq!(lighten(0.0, color), Color::OFF);
        }
    }

    #[test]
    fn lighten_truncates_each_channel() {
        assert_eq!(lighten(0.1, Color::WHITE), Color(0x191919));
        assert_eq!(lighten(0.5, Color::ORANGE), Color(0x7f3f00));
    }

    #[test]
    fn lighten_is_monotonic_per_channel() {
        let amounts = [0.0, 0.1, 0.25, 0.5, 0.9, 1.0];
        for color in SAMPLES {
            for pair in amounts.windows(2) {
                let low = lighten(pair[0], color);
                let high = lighten(pair[1], color);
                for shift in [0, 8, 16] {
                    assert!(low.channel(shift) <= high.channel(shift));
                }
            }
        }
    }

    #[test]
    fn next_undoes_prev_across_palette() {
        for color in Color::RAINBOW {
            assert_eq!(next_color(prev_color(color)), color);
            assert_eq!(prev_color(next_color(color)), color);
        }
    }

    #[test]
    fn seven_steps_return_to_start() {
        let mut color = Color::RED;
        for _ in 0..Color::RAINBOW.len() {
            color = next_color(color);
        }
        assert_eq!(color, Color::RED);
        assert_eq!(next_color(Color::PURPLE), Color::RED);
        assert_eq!(prev_color(Color::RED), Color::PURPLE);
    }

    #[test]
    fn unknown_colors_snap_to_red() {
        assert_eq!(next_color(Color::WHITE), Color::RED);
        assert_eq!(prev_color(Color::PINK), Color::RED);
    }
}
