//! Luv-based perceptual HSL transform (the HUSL color space).
//!
//! Hue is in degrees, saturation and lightness in 0..=100. Conversions go
//! through CIE XYZ and LCh; the saturation axis is normalized against the
//! maximum chroma representable in sRGB for the given lightness and hue.

const M: [[f64; 3]; 3] = [
    [3.240969941904521, -1.537383177570093, -0.498610760293],
    [-0.96924363628087, 1.87596750150772, 0.041555057407175],
    [0.055630079696993, -0.20397695888897, 1.056971514242878],
];

const M_INV: [[f64; 3]; 3] = [
    [0.41239079926595, 0.35758433938387, 0.18048078840183],
    [0.21263900587151, 0.71516867876775, 0.072192315360733],
    [0.019330818715591, 0.11919477979462, 0.95053215224966],
];

const REF_U: f64 = 0.19783000664283;
const REF_V: f64 = 0.46831999493879;
const KAPPA: f64 = 903.2962962;
const EPSILON: f64 = 0.0088564516;

fn to_linear(c: f64) -> f64 {
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn from_linear(c: f64) -> f64 {
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn dot(row: &[f64; 3], v: (f64, f64, f64)) -> f64 {
    row[0] * v.0 + row[1] * v.1 + row[2] * v.2
}

/// Boundary lines of the sRGB gamut in the chroma plane for lightness `l`.
fn bounds(l: f64) -> [(f64, f64); 6] {
    let mut out = [(0.0, 0.0); 6];
    let sub1 = (l + 16.0).powi(3) / 1560896.0;
    let sub2 = if sub1 > EPSILON { sub1 } else { l / KAPPA };
    for (ch, m) in M.iter().enumerate() {
        let (m1, m2, m3) = (m[0], m[1], m[2]);
        for t in 0..2 {
            let tf = t as f64;
            let top1 = (284517.0 * m1 - 94839.0 * m3) * sub2;
            let top2 =
                (838422.0 * m3 + 769860.0 * m2 + 731718.0 * m1) * l * sub2 - 769860.0 * tf * l;
            let bottom = (632260.0 * m3 - 126452.0 * m2) * sub2 + 126452.0 * tf;
            out[ch * 2 + t] = (top1 / bottom, top2 / bottom);
        }
    }
    out
}

fn ray_length_until_intersect(theta: f64, slope: f64, intercept: f64) -> f64 {
    intercept / (theta.sin() - slope * theta.cos())
}

fn max_chroma_for(l: f64, h: f64) -> f64 {
    let theta = h.to_radians();
    let mut min_len = f64::MAX;
    for &(slope, intercept) in bounds(l).iter() {
        let len = ray_length_until_intersect(theta, slope, intercept);
        if len >= 0.0 && len < min_len {
            min_len = len;
        }
    }
    min_len
}

fn y_to_l(y: f64) -> f64 {
    if y <= EPSILON {
        y * KAPPA
    } else {
        116.0 * y.cbrt() - 16.0
    }
}

fn l_to_y(l: f64) -> f64 {
    if l <= 8.0 {
        l / KAPPA
    } else {
        ((l + 16.0) / 116.0).powi(3)
    }
}

/// sRGB (0..=1 per channel) to HUSL (h in degrees, s and l in 0..=100).
pub(crate) fn rgb_to_husl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let lin = (to_linear(r), to_linear(g), to_linear(b));
    let x = dot(&M_INV[0], lin);
    let y = dot(&M_INV[1], lin);
    let z = dot(&M_INV[2], lin);

    let l = y_to_l(y);
    if l < 1e-8 {
        return (0.0, 0.0, 0.0);
    }
    let div = x + 15.0 * y + 3.0 * z;
    let (var_u, var_v) = if div.abs() < 1e-15 {
        (0.0, 0.0)
    } else {
        (4.0 * x / div, 9.0 * y / div)
    };
    let u = 13.0 * l * (var_u - REF_U);
    let v = 13.0 * l * (var_v - REF_V);

    let c = (u * u + v * v).sqrt();
    let mut h = v.atan2(u).to_degrees();
    if h < 0.0 {
        h += 360.0;
    }
    let s = if l > 99.9999999 || c < 1e-8 {
        0.0
    } else {
        c / max_chroma_for(l, h) * 100.0
    };
    (h, s, l)
}

/// HUSL (h in degrees, s and l in 0..=100) to sRGB (0..=1 per channel).
pub(crate) fn husl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    if l > 99.9999999 {
        return (1.0, 1.0, 1.0);
    }
    if l < 1e-8 {
        return (0.0, 0.0, 0.0);
    }
    let c = max_chroma_for(l, h) / 100.0 * s;
    let hrad = h.to_radians();
    let u = c * hrad.cos();
    let v = c * hrad.sin();

    let var_u = u / (13.0 * l) + REF_U;
    let var_v = v / (13.0 * l) + REF_V;
    let y = l_to_y(l);
    let x = -(9.0 * y * var_u) / ((var_u - 4.0) * var_v - var_u * var_v);
    let z = (9.0 * y - 15.0 * var_v * y - var_v * x) / (3.0 * var_v);

    let xyz = (x, y, z);
    let r = from_linear(dot(&M[0], xyz));
    let g = from_linear(dot(&M[1], xyz));
    let b = from_linear(dot(&M[2], xyz));
    (r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn round_trips_through_husl() {
        for &(r, g, b) in &[
            (1.0, 0.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.25, 0.5, 0.75),
            (0.9, 0.9, 0.1),
        ] {
            let (h, s, l) = rgb_to_husl(r, g, b);
            let (r2, g2, b2) = husl_to_rgb(h, s, l);
            assert!(close(r, r2) && close(g, g2) && close(b, b2), "({r},{g},{b})");
        }
    }

    #[test]
    fn extremes() {
        assert_eq!(rgb_to_husl(0.0, 0.0, 0.0), (0.0, 0.0, 0.0));
        let (_, s, l) = rgb_to_husl(1.0, 1.0, 1.0);
        assert!(s.abs() < 1e-6);
        assert!((l - 100.0).abs() < 1e-6);
        assert_eq!(husl_to_rgb(120.0, 50.0, 100.0), (1.0, 1.0, 1.0));
    }
}
