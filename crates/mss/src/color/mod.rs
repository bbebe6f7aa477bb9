//! HSLA color values with an optional perceptual (Luv-based) representation.
//!
//! Colors are stored as hue/saturation/lightness/alpha. When `perceptual`
//! is set, saturation and lightness live in the HUSL space instead of
//! plain sRGB-derived HSL, so transforms like "lighten by 10%" track
//! perceived brightness.

mod functions;
mod husl;

pub use functions::{
    alpha, darken, darken_p, desaturate, desaturate_p, fade_in, fade_out, greyscale, greyscale_p,
    hue, hue_p, lighten, lighten_p, lightness, lightness_p, mix, multiply, saturate, saturate_p,
    saturation, saturation_p, set_hue, spin, spin_p,
};

use std::fmt;

/// An HSLA color. `h` is in degrees, `s`, `l` and `a` in 0..=1.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub h: f64,
    pub s: f64,
    pub l: f64,
    pub a: f64,
    pub perceptual: bool,
}

impl Color {
    /// Build from sRGB channels in 0..=1.
    pub fn from_rgba(r: f64, g: f64, b: f64, a: f64, perceptual: bool) -> Color {
        let (h, s, l) = if perceptual {
            let (h, s, l) = husl::rgb_to_husl(r, g, b);
            (h, s / 100.0, l / 100.0)
        } else {
            rgb_to_hsl(r, g, b)
        };
        Color { h, s, l, a, perceptual }
    }

    pub fn from_hsla(h: f64, s: f64, l: f64, a: f64) -> Color {
        Color { h, s, l, a, perceptual: false }
    }

    pub fn from_husla(h: f64, s: f64, l: f64, a: f64) -> Color {
        Color { h, s, l, a, perceptual: true }
    }

    /// Parse a color literal: hex forms and CSS named colors.
    pub fn parse(s: &str) -> Option<Color> {
        let parsed: csscolorparser::Color = s.parse().ok()?;
        let [r, g, b, a] = parsed.to_rgba8();
        Some(Color::from_rgba(
            f64::from(r) / 255.0,
            f64::from(g) / 255.0,
            f64::from(b) / 255.0,
            f64::from(a) / 255.0,
            false,
        ))
    }

    /// sRGB channels in 0..=1.
    pub fn to_rgb(&self) -> (f64, f64, f64) {
        if self.perceptual {
            husl::husl_to_rgb(self.h, self.s * 100.0, self.l * 100.0)
        } else {
            hsl_to_rgb(self.h, self.s, self.l)
        }
    }

    /// The same color re-expressed in the perceptual space.
    pub fn to_perceptual(&self) -> Color {
        if self.perceptual {
            return *self;
        }
        let (r, g, b) = self.to_rgb();
        Color::from_rgba(r, g, b, self.a, true)
    }

    /// 8-bit sRGB channels.
    pub fn rgba8(&self) -> (u8, u8, u8, u8) {
        let (r, g, b) = self.to_rgb();
        (
            (r * 255.0).round() as u8,
            (g * 255.0).round() as u8,
            (b * 255.0).round() as u8,
            (self.a * 255.0).round() as u8,
        )
    }
}

/// Formats as `rgba(r,g,b,a)` with 8-bit channels and a minimal alpha.
impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (r, g, b, _) = self.rgba8();
        write!(f, "rgba({r},{g},{b},{})", self.a)
    }
}

fn hue_to_rgb(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
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

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hn = (h / 360.0).rem_euclid(1.0);
    (
        hue_to_rgb(p, q, hn + 1.0 / 3.0),
        hue_to_rgb(p, q, hn),
        hue_to_rgb(p, q, hn - 1.0 / 3.0),
    )
}

fn rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h * 60.0, s, l)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex() {
        let c = Color::parse("#f00").unwrap();
        assert_eq!(c.rgba8(), (255, 0, 0, 255));
        assert_eq!(c.to_string(), "rgba(255,0,0,1)");

        let c = Color::parse("#20a040").unwrap();
        assert_eq!(c.rgba8(), (32, 160, 64, 255));
    }

    #[test]
    fn parses_named() {
        let c = Color::parse("steelblue").unwrap();
        assert_eq!(c.rgba8(), (70, 130, 180, 255));
        assert!(Color::parse("no-such-color").is_none());
    }

    #[test]
    fn hsl_round_trip() {
        let c = Color::from_rgba(0.2, 0.4, 0.8, 1.0, false);
        let (r, g, b) = c.to_rgb();
        assert!((r - 0.2).abs() < 1e-9);
        assert!((g - 0.4).abs() < 1e-9);
        assert!((b - 0.8).abs() < 1e-9);
    }

    #[test]
    fn perceptual_round_trip() {
        let c = Color::from_rgba(0.2, 0.4, 0.8, 1.0, false);
        let p = c.to_perceptual();
        assert!(p.perceptual);
        let (r, g, b) = p.to_rgb();
        assert!((r - 0.2).abs() < 1e-6);
        assert!((g - 0.4).abs() < 1e-6);
        assert!((b - 0.8).abs() < 1e-6);
    }

    #[test]
    fn alpha_formatting_is_minimal() {
        let mut c = Color::parse("#000").unwrap();
        c.a = 0.5;
        assert_eq!(c.to_string(), "rgba(0,0,0,0.5)");
    }
}
