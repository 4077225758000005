// ── Color mapping ──
//
// Stateless conversions shared by every sync engine. Components are kept
// as 8-bit values; the frame codec widens them on the wire.

use std::time::Duration;

/// Lowest brightness a stream may run at.
pub const MIN_BRIGHTNESS: f64 = 0.1;

const LOW_SNAP: u8 = 5;
const HIGH_SNAP: u8 = 249;

const MUSIC_SATURATION: f64 = 0.8;
const MUSIC_LIGHTNESS: f64 = 0.5;
const FREQUENCY_SPAN: f64 = 80.0;

const SLOWEST_INTERVAL_MS: f64 = 600.0;
const FASTEST_INTERVAL_MS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale by brightness (floored at [`MIN_BRIGHTNESS`]) then snap near
    /// the extremes.
    #[must_use]
    pub fn finish(self, brightness: f64) -> Self {
        let scale = brightness_floor(brightness).min(1.0);
        Self {
            r: clamp_near_extremes(to_component(f64::from(self.r) * scale)),
            g: clamp_near_extremes(to_component(f64::from(self.g) * scale)),
            b: clamp_near_extremes(to_component(f64::from(self.b) * scale)),
        }
    }
}

/// Snap values within 5 of either end to the end itself.
pub fn clamp_near_extremes(c: u8) -> u8 {
    if c <= LOW_SNAP {
        0
    } else if c >= HIGH_SNAP {
        255
    } else {
        c
    }
}

pub fn brightness_floor(b: f64) -> f64 {
    b.max(MIN_BRIGHTNESS)
}

/// Standard HSL to RGB, every input in `[0, 1]`.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> Rgb {
    if s <= 0.0 {
        let v = to_component(l * 255.0);
        return Rgb::new(v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    Rgb::new(
        to_component(hue_to_channel(p, q, h + 1.0 / 3.0) * 255.0),
        to_component(hue_to_channel(p, q, h) * 255.0),
        to_component(hue_to_channel(p, q, h - 1.0 / 3.0) * 255.0),
    )
}

fn hue_to_channel(p: f64, q: f64, t: f64) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Map one spectrum band's energy to a color.
///
/// Quiet bands sit at the red end of the hue wheel, loud bands move
/// towards it from the other side: `hue = 1 - f / 80`.
pub fn frequency_to_color(f: f64) -> Rgb {
    let hue = (1.0 - f / FREQUENCY_SPAN).clamp(0.0, 1.0);
    hsl_to_rgb(hue, MUSIC_SATURATION, MUSIC_LIGHTNESS)
}

/// Per-frame delay for an intensity in `[0, 1]`: 600 ms at 0, 100 ms at 1.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub fn intensity_to_interval_ms(intensity: f64) -> u64 {
    let i = intensity.clamp(0.0, 1.0);
    ((1.0 - i) * (SLOWEST_INTERVAL_MS - FASTEST_INTERVAL_MS) + FASTEST_INTERVAL_MS).round() as u64
}

pub fn intensity_to_interval(intensity: f64) -> Duration {
    Duration::from_millis(intensity_to_interval_ms(intensity))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
pub(crate) fn to_component(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn clamp_snaps_low_values() {
        for c in 0..=5 {
            assert_eq!(clamp_near_extremes(c), 0);
        }
    }

    #[test]
    fn clamp_snaps_high_values() {
        for c in 249..=255 {
            assert_eq!(clamp_near_extremes(c), 255);
        }
    }

    #[test]
    fn clamp_keeps_mid_range() {
        for c in 6..=248 {
            assert_eq!(clamp_near_extremes(c), c);
        }
    }

    #[test]
    fn interval_endpoints() {
        assert_eq!(intensity_to_interval_ms(0.0), 600);
        assert_eq!(intensity_to_interval_ms(1.0), 100);
        assert_eq!(intensity_to_interval_ms(0.5), 350);
        assert_eq!(intensity_to_interval_ms(-3.0), 600);
        assert_eq!(intensity_to_interval(1.0), Duration::from_millis(100));
    }

    #[test]
    fn interval_decreases_with_intensity() {
        let mut previous = u64::MAX;
        for step in 0..=100 {
            let ms = intensity_to_interval_ms(f64::from(step) / 100.0);
            assert!(ms <= previous, "interval rose at step {step}");
            assert!((100..=600).contains(&ms));
            previous = ms;
        }
    }

    #[test]
    fn brightness_never_drops_below_floor() {
        assert!((brightness_floor(0.0) - MIN_BRIGHTNESS).abs() < f64::EPSILON);
        assert!((brightness_floor(0.7) - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), Rgb::new(255, 0, 0));
        assert_eq!(hsl_to_rgb(1.0 / 3.0, 1.0, 0.5), Rgb::new(0, 255, 0));
        assert_eq!(hsl_to_rgb(2.0 / 3.0, 1.0, 0.5), Rgb::new(0, 0, 255));
        assert_eq!(hsl_to_rgb(0.4, 0.0, 1.0), Rgb::WHITE);
    }

    #[test]
    fn frequency_colors_use_fixed_saturation() {
        fn near(a: u8, b: u8) -> bool {
            a.abs_diff(b) <= 1
        }

        // hue 1.0 wraps to red: l=0.5, s=0.8 gives roughly 230/25/25
        let red = frequency_to_color(0.0);
        assert!(near(red.r, 230) && near(red.g, 25) && near(red.b, 25), "{red:?}");
        // 40/80 = hue 0.5, cyan
        let cyan = frequency_to_color(40.0);
        assert!(near(cyan.r, 25) && near(cyan.g, 230) && near(cyan.b, 230), "{cyan:?}");
        // beyond the span clamps to hue 0
        assert_eq!(frequency_to_color(500.0), frequency_to_color(80.0));
    }

    #[test]
    fn finish_scales_then_snaps() {
        assert_eq!(Rgb::WHITE.finish(1.0), Rgb::WHITE);
        assert_eq!(Rgb::WHITE.finish(0.5), Rgb::new(128, 128, 128));
        // Below the floor behaves like the floor: 255 * 0.1 = 25.5 -> 26
        assert_eq!(Rgb::WHITE.finish(0.0), Rgb::new(26, 26, 26));
        assert_eq!(Rgb::new(40, 3, 250).finish(1.0), Rgb::new(40, 0, 255));
    }
}
