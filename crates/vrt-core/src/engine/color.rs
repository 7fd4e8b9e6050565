//! Color math shared by the diff algorithms.
//!
//! All pixels are composited over white before any distance is taken, so a
//! fully transparent pixel and an opaque white one compare as equal.

use image::RgbaImage;

/// Composite channel `c` with `alpha` (0.0 - 1.0) over white.
pub fn blend(c: f64, alpha: f64) -> f64 {
    255.0 + (c - 255.0) * alpha
}

/// RGB of `px` composited over white.
pub fn over_white(px: [u8; 4]) -> [f64; 3] {
    let [r, g, b, a] = px.map(f64::from);
    if px[3] == 255 {
        return [r, g, b];
    }
    let alpha = a / 255.0;
    [blend(r, alpha), blend(g, alpha), blend(b, alpha)]
}

pub fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.298_895_31 + g * 0.586_622_47 + b * 0.114_482_23
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.595_977_99 - g * 0.274_176_10 - b * 0.321_801_89
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.211_470_17 - g * 0.522_617_11 + b * 0.311_146_94
}

/// Luma of `px` composited over white.
pub fn luma(px: [u8; 4]) -> f64 {
    let [r, g, b] = over_white(px);
    rgb2y(r, g, b)
}

/// Weighted squared YIQ distance between two pixels.
///
/// Negative when `a` is brighter than `b`. With `y_only`, returns the plain
/// signed luma difference instead.
pub fn yiq_delta(a: [u8; 4], b: [u8; 4], y_only: bool) -> f64 {
    if a == b {
        return 0.0;
    }
    let [r1, g1, b1] = over_white(a);
    let [r2, g2, b2] = over_white(b);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }

    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;
    if y1 > y2 {
        -delta
    } else {
        delta
    }
}

/// Upper bound of the [`yiq_delta`] magnitude over all color pairs.
pub const MAX_YIQ_DELTA: f64 = 35_215.0;

fn srgb_to_linear(c: f64) -> f64 {
    let c = c / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn lab_f(t: f64) -> f64 {
    if t > 0.008_856 {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

/// CIE L*a*b* (D65) of `px` composited over white.
pub fn to_lab(px: [u8; 4]) -> [f64; 3] {
    let [r, g, b] = over_white(px).map(srgb_to_linear);

    let x = (r * 0.412_456_4 + g * 0.357_576_1 + b * 0.180_437_5) / 0.950_47;
    let y = r * 0.212_672_9 + g * 0.715_152_2 + b * 0.072_175_0;
    let z = (r * 0.019_333_9 + g * 0.119_192_0 + b * 0.950_304_1) / 1.088_83;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

fn hue_degrees(b: f64, a: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 0.0;
    }
    let h = b.atan2(a).to_degrees();
    if h < 0.0 {
        h + 360.0
    } else {
        h
    }
}

/// CIEDE2000 color difference with unit weighting factors.
pub fn ciede2000(lab1: [f64; 3], lab2: [f64; 3]) -> f64 {
    const POW25_7: f64 = 6_103_515_625.0;

    let [l1, a1, b1] = lab1;
    let [l2, a2, b2] = lab2;

    let c_bar = ((a1 * a1 + b1 * b1).sqrt() + (a2 * a2 + b2 * b2).sqrt()) / 2.0;
    let c_bar7 = c_bar.powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + POW25_7)).sqrt());

    let a1p = (1.0 + g) * a1;
    let a2p = (1.0 + g) * a2;
    let c1p = (a1p * a1p + b1 * b1).sqrt();
    let c2p = (a2p * a2p + b2 * b2).sqrt();
    let h1p = hue_degrees(b1, a1p);
    let h2p = hue_degrees(b2, a2p);

    let dl = l2 - l1;
    let dc = c2p - c1p;
    let chroma_product = c1p * c2p;
    let dh = if chroma_product == 0.0 {
        0.0
    } else {
        let d = h2p - h1p;
        if d.abs() <= 180.0 {
            d
        } else if d > 180.0 {
            d - 360.0
        } else {
            d + 360.0
        }
    };
    let dh_big = 2.0 * chroma_product.sqrt() * (dh / 2.0).to_radians().sin();

    let l_bar = (l1 + l2) / 2.0;
    let c_bar_p = (c1p + c2p) / 2.0;
    let h_bar = if chroma_product == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 1.0 - 0.17 * (h_bar - 30.0).to_radians().cos()
        + 0.24 * (2.0 * h_bar).to_radians().cos()
        + 0.32 * (3.0 * h_bar + 6.0).to_radians().cos()
        - 0.20 * (4.0 * h_bar - 63.0).to_radians().cos();
    let d_theta = 30.0 * (-((h_bar - 275.0) / 25.0).powi(2)).exp();
    let c_bar_p7 = c_bar_p.powi(7);
    let rc = 2.0 * (c_bar_p7 / (c_bar_p7 + POW25_7)).sqrt();
    let l_term = (l_bar - 50.0).powi(2);
    let sl = 1.0 + 0.015 * l_term / (20.0 + l_term).sqrt();
    let sc = 1.0 + 0.045 * c_bar_p;
    let sh = 1.0 + 0.015 * c_bar_p * t;
    let rt = -(2.0 * d_theta).to_radians().sin() * rc;

    let (l, c, h) = (dl / sl, dc / sc, dh_big / sh);
    (l * l + c * c + h * h + rt * c * h).sqrt()
}

/// Inclusive 3x3 neighbourhood bounds of `(x, y)` within `width` x `height`.
fn neighbourhood(x: u32, y: u32, width: u32, height: u32) -> (u32, u32, u32, u32) {
    (
        x.saturating_sub(1),
        y.saturating_sub(1),
        (x + 1).min(width - 1),
        (y + 1).min(height - 1),
    )
}

/// Whether the pixel at `(x, y)` has more than two identical neighbours.
/// Pixels on the region edge start with one free match.
fn has_many_siblings(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> bool {
    let (x0, y0, x2, y2) = neighbourhood(x, y, width, height);
    let center = img.get_pixel(x, y);
    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if (nx, ny) == (x, y) {
                continue;
            }
            if img.get_pixel(nx, ny) == center {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }
    false
}

/// Antialiasing heuristic over the `width` x `height` region at the origin.
///
/// A pixel is antialiased when its neighbourhood holds both a darker and a
/// brighter extreme, it has at most two identical neighbours, and one of the
/// extremes sits in a flat area in both images.
pub fn antialiased(
    img: &RgbaImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    other: &RgbaImage,
) -> bool {
    let (x0, y0, x2, y2) = neighbourhood(x, y, width, height);
    let center = img.get_pixel(x, y).0;
    let mut zeroes = u32::from(x == x0 || x == x2 || y == y0 || y == y2);

    let (mut min, mut max) = (0.0_f64, 0.0_f64);
    let (mut min_at, mut max_at) = ((x, y), (x, y));

    for nx in x0..=x2 {
        for ny in y0..=y2 {
            if (nx, ny) == (x, y) {
                continue;
            }
            let delta = yiq_delta(center, img.get_pixel(nx, ny).0, true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (nx, ny);
            } else if delta > max {
                max = delta;
                max_at = (nx, ny);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }

    let flat_in_both = |(px, py): (u32, u32)| {
        has_many_siblings(img, px, py, width, height)
            && has_many_siblings(other, px, py, width, height)
    };
    flat_in_both(min_at) || flat_in_both(max_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn test_yiq_delta_extremes() {
        let black = [0, 0, 0, 255];
        let white = [255, 255, 255, 255];
        assert_eq!(yiq_delta(black, black, false), 0.0);
        let luma_only = 0.5053 * 255.0 * 255.0;
        assert!(close(yiq_delta(black, white, false), luma_only, 1.0));
        assert!(close(yiq_delta(white, black, false), -luma_only, 1.0));
        assert!(luma_only < MAX_YIQ_DELTA);
    }

    #[test]
    fn test_transparent_equals_white() {
        let clear = [0, 0, 0, 0];
        let white = [255, 255, 255, 255];
        assert!(close(yiq_delta(clear, white, false), 0.0, 1e-9));
        assert!(close(ciede2000(to_lab(clear), to_lab(white)), 0.0, 1e-9));
    }

    #[test]
    fn test_lab_reference_points() {
        let white = to_lab([255, 255, 255, 255]);
        assert!(close(white[0], 100.0, 0.01));
        assert!(close(white[1], 0.0, 0.01));
        assert!(close(white[2], 0.0, 0.01));

        let red = to_lab([255, 0, 0, 255]);
        assert!(close(red[0], 53.24, 0.05));
        assert!(close(red[1], 80.09, 0.1));
        assert!(close(red[2], 67.20, 0.1));
    }

    // Reference pairs from Sharma, Wu & Dalal (2005).
    #[test]
    fn test_ciede2000_reference_pairs() {
        let cases = [
            ([50.0, 2.6772, -79.7751], [50.0, 0.0, -82.7485], 2.0425),
            ([50.0, 0.0, 0.0], [50.0, -1.0, 2.0], 2.3669),
            ([50.0, 2.5, 0.0], [73.0, 25.0, -18.0], 27.1492),
            ([60.2574, -34.0099, 36.2677], [60.4626, -34.1751, 39.4387], 1.2644),
            ([90.8027, -2.0831, 1.441], [91.1528, -1.6435, 0.0447], 1.4441),
        ];
        for (lab1, lab2, expected) in cases {
            let got = ciede2000(lab1, lab2);
            assert!(close(got, expected, 1e-4), "{lab1:?} vs {lab2:?}: {got}");
            assert!(close(ciede2000(lab2, lab1), expected, 1e-4));
        }
    }

    #[test]
    fn test_antialiased_edge_pixel() {
        // Black square on white with a gray pixel on its border.
        let mut img = RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 255]));
        for y in 0..6 {
            for x in 0..3 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mut smoothed = img.clone();
        smoothed.put_pixel(3, 2, Rgba([128, 128, 128, 255]));

        assert!(antialiased(&smoothed, 3, 2, 6, 6, &img));
    }

    #[test]
    fn test_isolated_dot_is_not_antialiased() {
        let base = RgbaImage::from_pixel(5, 5, Rgba([255, 255, 255, 255]));
        let mut dotted = base.clone();
        dotted.put_pixel(2, 2, Rgba([0, 0, 0, 255]));

        assert!(!antialiased(&dotted, 2, 2, 5, 5, &base));
        assert!(!antialiased(&base, 2, 2, 5, 5, &dotted));
    }
}
