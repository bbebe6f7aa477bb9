//! Color transforms exposed as stylesheet functions.
//!
//! Each transform has a plain variant operating on the color as-is and a
//! `_p` variant that converts to the perceptual space first.

use super::Color;

fn clamp(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn perceptual(c: Color) -> Color {
    if c.perceptual {
        c
    } else {
        c.to_perceptual()
    }
}

pub fn lighten(mut c: Color, v: f64) -> Color {
    c.l = clamp(c.l + v);
    c
}

pub fn lighten_p(c: Color, v: f64) -> Color {
    lighten(perceptual(c), v)
}

pub fn darken(mut c: Color, v: f64) -> Color {
    c.l = clamp(c.l - v);
    c
}

pub fn darken_p(c: Color, v: f64) -> Color {
    darken(perceptual(c), v)
}

pub fn saturate(mut c: Color, v: f64) -> Color {
    c.s = clamp(c.s + v);
    c
}

pub fn saturate_p(c: Color, v: f64) -> Color {
    saturate(perceptual(c), v)
}

pub fn desaturate(mut c: Color, v: f64) -> Color {
    c.s = clamp(c.s - v);
    c
}

pub fn desaturate_p(c: Color, v: f64) -> Color {
    desaturate(perceptual(c), v)
}

pub fn fade_in(mut c: Color, v: f64) -> Color {
    c.a = clamp(c.a + v);
    c
}

pub fn fade_out(mut c: Color, v: f64) -> Color {
    c.a = clamp(c.a - v);
    c
}

pub fn spin(mut c: Color, v: f64) -> Color {
    c.h += v;
    if c.h < 0.0 {
        c.h += 360.0;
    } else if c.h > 360.0 {
        c.h -= 360.0;
    }
    c
}

pub fn spin_p(c: Color, v: f64) -> Color {
    spin(perceptual(c), v)
}

pub fn greyscale(c: Color) -> Color {
    desaturate(c, 1.0)
}

pub fn greyscale_p(c: Color) -> Color {
    desaturate_p(c, 1.0)
}

pub fn hue(c: Color) -> f64 {
    c.h
}

pub fn hue_p(c: Color) -> f64 {
    perceptual(c).h
}

pub fn saturation(c: Color) -> f64 {
    c.s
}

pub fn saturation_p(c: Color) -> f64 {
    perceptual(c).s
}

pub fn lightness(c: Color) -> f64 {
    c.l
}

pub fn lightness_p(c: Color) -> f64 {
    perceptual(c).l
}

pub fn alpha(c: Color) -> f64 {
    c.a
}

pub fn multiply(c: Color, v: f64) -> Color {
    let (r, g, b) = c.to_rgb();
    Color::from_rgba(clamp(r * v), clamp(g * v), clamp(b * v), c.a, c.perceptual)
}

/// Weighted average of two colors, compensating for alpha differences.
pub fn mix(mut c1: Color, mut c2: Color, weight: f64) -> Color {
    let w = weight * 2.0 - 1.0;
    let a = c1.a - c2.a;
    let perceptual = c1.perceptual || c2.perceptual;

    if c1.perceptual && !c2.perceptual {
        c2 = c2.to_perceptual();
    } else if !c1.perceptual && c2.perceptual {
        c1 = c1.to_perceptual();
    }

    let (r1, g1, b1) = c1.to_rgb();
    let (r2, g2, b2) = c2.to_rgb();

    let w1 = if w * a == -1.0 {
        (w + 1.0) / 2.0
    } else {
        ((w + a) / (1.0 + w * a) + 1.0) / 2.0
    };
    let w2 = 1.0 - w1;

    Color::from_rgba(
        r1 * w1 + r2 * w2,
        g1 * w1 + g2 * w2,
        b1 * w1 + b2 * w2,
        c1.a * weight + c2.a * (1.0 - weight),
        perceptual,
    )
}

/// Keep the color but take the hue of `hue_src`, in the perceptual space.
pub fn set_hue(c: Color, hue_src: Color) -> Color {
    let mut base = c.to_perceptual();
    base.h = hue_src.to_perceptual().h;
    base
}
