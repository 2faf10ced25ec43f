//! EPX/Scale2x edge-preserving upscaling and the viewport extractor.
//!
//! The classic pixel-art family of algorithms: selective pixel replication
//! driven by exact neighbor comparisons, no blending. Screenshots share the
//! properties it was designed for (hard edges, limited colors, axis-aligned
//! features), which is what keeps text readable at high zoom.
//!
//! Pixels are packed 32-bit values in row-major order. The packing is
//! opaque to the exact-match rules; the threshold variant assumes the
//! little-endian RGBA layout used by [`tiny_skia::Pixmap`].

use tiny_skia::Pixmap;

/// Largest chained power-of-two factor the viewport path will request.
pub const MAX_SCALE_FACTOR: u32 = 8;

#[inline]
fn pack(data: &[u8]) -> Vec<u32> {
    data.chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[inline]
fn unpack(pixels: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels.len() * 4);
    for p in pixels {
        out.extend_from_slice(&p.to_le_bytes());
    }
    out
}

/// Weighted-luma closeness for anti-aliased content.
///
/// `threshold` is in the 0..255 range of a single channel; the comparison
/// mirrors the usual 299/587/114 luma weights.
#[inline]
fn pixels_close(a: u32, b: u32, threshold: i32) -> bool {
    let [ra, ga, ba, _] = a.to_le_bytes();
    let [rb, gb, bb, _] = b.to_le_bytes();
    let dr = (ra as i32 - rb as i32).abs();
    let dg = (ga as i32 - gb as i32).abs();
    let db = (ba as i32 - bb as i32).abs();
    dr * 299 + dg * 587 + db * 114 < threshold * 1000
}

/// One 2x EPX pass with a pluggable equality predicate.
///
/// For each source pixel P with 4-neighbors (A above, B right, C left,
/// D below, clamped at edges by reusing P):
///
/// ```text
///     A          1 2
///   C P B   ->   3 4
///     D
///
///   1 = (C == A && C != D && A != B) ? A : P
///   2 = (A == B && A != C && B != D) ? B : P
///   3 = (D == C && D != B && C != A) ? C : P
///   4 = (B == D && B != A && D != C) ? D : P
/// ```
fn scale2x_pass<F: Fn(u32, u32) -> bool>(src: &[u32], w: usize, h: usize, eq: F) -> Vec<u32> {
    let dw = w * 2;
    let mut dst = vec![0u32; dw * h * 2];

    for y in 0..h {
        for x in 0..w {
            let p = src[y * w + x];
            let a = if y > 0 { src[(y - 1) * w + x] } else { p };
            let b = if x < w - 1 { src[y * w + x + 1] } else { p };
            let c = if x > 0 { src[y * w + x - 1] } else { p };
            let d = if y < h - 1 { src[(y + 1) * w + x] } else { p };

            let (dx, dy) = (x * 2, y * 2);

            let ca = eq(c, a);
            let ab = eq(a, b);
            let bd = eq(b, d);
            let dc = eq(d, c);

            dst[dy * dw + dx] = if ca && !eq(c, d) && !ab { a } else { p };
            dst[dy * dw + dx + 1] = if ab && !eq(a, c) && !bd { b } else { p };
            dst[(dy + 1) * dw + dx] = if dc && !eq(d, b) && !eq(c, a) { c } else { p };
            dst[(dy + 1) * dw + dx + 1] = if bd && !eq(b, a) && !dc { d } else { p };
        }
    }

    dst
}

/// Basic Scale2x: exact-match 2x upscale of a `w`x`h` buffer.
pub fn scale2x(src: &[u32], w: usize, h: usize) -> Vec<u32> {
    scale2x_pass(src, w, h, |a, b| a == b)
}

/// Scale2x with a luma-distance tolerance, for anti-aliased content.
pub fn scale2x_threshold(src: &[u32], w: usize, h: usize, threshold: i32) -> Vec<u32> {
    scale2x_pass(src, w, h, |a, b| pixels_close(a, b, threshold))
}

/// Scale3x: one-shot 3x upscale sampling the full 3x3 neighborhood.
///
/// Not chainable like the 2x pass; the rule set is the standard Scale3x
/// extension of the same selective-replication idea.
pub fn scale3x(src: &[u32], w: usize, h: usize) -> Vec<u32> {
    let dw = w * 3;
    let mut dst = vec![0u32; dw * h * 3];

    for y in 0..h {
        for x in 0..w {
            let e = src[y * w + x];
            let at = |dx: isize, dy: isize| -> u32 {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    e
                } else {
                    src[ny as usize * w + nx as usize]
                }
            };
            let a = at(-1, -1);
            let b = at(0, -1);
            let c = at(1, -1);
            let d = at(-1, 0);
            let f = at(1, 0);
            let g = at(-1, 1);
            let h2 = at(0, 1);
            let i = at(1, 1);

            let (dx, dy) = (x * 3, y * 3);

            let db = d == b;
            let bf = b == f;
            let dh = d == h2;
            let hf = h2 == f;

            dst[dy * dw + dx] = if db && !dh && !bf { d } else { e };
            dst[dy * dw + dx + 1] = if (db && !dh && !bf && e != c) || (bf && !db && !hf && e != a)
            {
                b
            } else {
                e
            };
            dst[dy * dw + dx + 2] = if bf && !db && !hf { f } else { e };

            dst[(dy + 1) * dw + dx] =
                if (db && !dh && !bf && e != g) || (dh && !db && !hf && e != a) {
                    d
                } else {
                    e
                };
            dst[(dy + 1) * dw + dx + 1] = e;
            dst[(dy + 1) * dw + dx + 2] =
                if (bf && !db && !hf && e != i) || (hf && !dh && !bf && e != c) {
                    f
                } else {
                    e
                };

            dst[(dy + 2) * dw + dx] = if dh && !db && !hf { d } else { e };
            dst[(dy + 2) * dw + dx + 1] =
                if (dh && !db && !hf && e != i) || (hf && !dh && !bf && e != g) {
                    h2
                } else {
                    e
                };
            dst[(dy + 2) * dw + dx + 2] = if hf && !dh && !bf { f } else { e };
        }
    }

    dst
}

/// Multi-pass upscale to a power-of-two factor (2, 4, 8, ...).
///
/// Applies the 2x pass repeatedly, discarding intermediates. A factor below
/// 2 is a plain copy. Returns the buffer and its dimensions.
pub fn scale_nx(src: &[u32], w: usize, h: usize, factor: u32) -> (Vec<u32>, usize, usize) {
    if factor < 2 {
        return (src.to_vec(), w, h);
    }

    let mut current = scale2x(src, w, h);
    let mut cur_w = w * 2;
    let mut cur_h = h * 2;
    let mut remaining = factor / 2;

    while remaining >= 2 {
        current = scale2x(&current, cur_w, cur_h);
        cur_w *= 2;
        cur_h *= 2;
        remaining /= 2;
    }

    (current, cur_w, cur_h)
}

/// Extract a region of `src` and upscale it by a power-of-two factor.
///
/// The region is clamped to the surface bounds before sampling, so a request
/// straddling an edge never reads outside the source. Returns `None` when
/// the clamped region has non-positive size. Cost is proportional to the
/// visible region, not the full image: deeper zoom means a smaller region
/// and a cheaper call.
pub fn extract_viewport(src: &Pixmap, x: i32, y: i32, w: i32, h: i32, factor: u32) -> Option<Pixmap> {
    let src_w = src.width() as i32;
    let src_h = src.height() as i32;

    let (mut x, mut y, mut w, mut h) = (x, y, w, h);
    if x < 0 {
        w += x;
        x = 0;
    }
    if y < 0 {
        h += y;
        y = 0;
    }
    if x + w > src_w {
        w = src_w - x;
    }
    if y + h > src_h {
        h = src_h - y;
    }

    if w <= 0 || h <= 0 {
        return None;
    }

    // Copy the clamped region into a tight buffer
    let data = src.data();
    let stride = src_w as usize * 4;
    let mut region_bytes = Vec::with_capacity(w as usize * h as usize * 4);
    for row in y..y + h {
        let start = row as usize * stride + x as usize * 4;
        region_bytes.extend_from_slice(&data[start..start + w as usize * 4]);
    }

    let region = pack(&region_bytes);
    let (scaled, out_w, out_h) = scale_nx(&region, w as usize, h as usize, factor);

    Pixmap::from_vec(
        unpack(&scaled),
        tiny_skia::IntSize::from_wh(out_w as u32, out_h as u32)?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: u32 = 0xff00_00ff;
    const BLUE: u32 = 0xffff_0000;

    fn solid(color: u32, w: usize, h: usize) -> Vec<u32> {
        vec![color; w * h]
    }

    #[test]
    fn test_output_dimensions() {
        let src = solid(RED, 5, 3);
        assert_eq!(scale2x(&src, 5, 3).len(), 10 * 6);
        assert_eq!(scale3x(&src, 5, 3).len(), 15 * 9);

        let (out, w, h) = scale_nx(&src, 5, 3, 8);
        assert_eq!((w, h), (40, 24));
        assert_eq!(out.len(), 40 * 24);
    }

    #[test]
    fn test_factor_below_two_is_copy() {
        let src = solid(BLUE, 4, 4);
        let (out, w, h) = scale_nx(&src, 4, 4, 1);
        assert_eq!((w, h), (4, 4));
        assert_eq!(out, src);
    }

    #[test]
    fn test_two_2x_passes_equal_one_4x() {
        // A small patterned buffer: diagonal of red on blue
        let w = 6;
        let h = 6;
        let mut src = solid(BLUE, w, h);
        for i in 0..w.min(h) {
            src[i * w + i] = RED;
        }

        let once = scale2x(&src, w, h);
        let twice = scale2x(&once, w * 2, h * 2);
        let (four, fw, fh) = scale_nx(&src, w, h, 4);
        assert_eq!((fw, fh), (w * 4, h * 4));
        assert_eq!(twice, four);
    }

    #[test]
    fn test_solid_color_stays_solid() {
        let src = solid(RED, 7, 5);
        for factor in [2u32, 4, 8] {
            let (out, _, _) = scale_nx(&src, 7, 5, factor);
            assert!(out.iter().all(|&p| p == RED), "factor {factor}");
        }
        assert!(scale3x(&src, 7, 5).iter().all(|&p| p == RED));
    }

    #[test]
    fn test_vertical_edge_stays_sharp() {
        // Left half red, right half blue; the doubled boundary column must
        // stay an exact two-color split with no third value.
        let w = 8;
        let h = 8;
        let mut src = Vec::with_capacity(w * h);
        for _y in 0..h {
            for x in 0..w {
                src.push(if x < w / 2 { RED } else { BLUE });
            }
        }

        let out = scale2x(&src, w, h);
        let dw = w * 2;
        for y in 0..h * 2 {
            for x in 0..dw {
                let expected = if x < dw / 2 { RED } else { BLUE };
                assert_eq!(out[y * dw + x], expected, "at ({x},{y})");
            }
        }
    }

    #[test]
    fn test_threshold_treats_near_colors_as_flat() {
        // Two shades of the same red, well within tolerance: the buffer has
        // no "edge", so each 2x2 block replicates its source pixel.
        let near_red = 0xff00_00fe;
        let w = 4;
        let h = 4;
        let mut src = solid(RED, w, h);
        src[5] = near_red;

        let out = scale2x_threshold(&src, w, h, 32);
        let dw = w * 2;
        for (i, &p) in out.iter().enumerate() {
            let (x, y) = (i % dw, i / dw);
            let expected = src[(y / 2) * w + (x / 2)];
            assert_eq!(p, expected);
        }
    }

    fn checker_pixmap(w: u32, h: u32) -> Pixmap {
        let mut pm = Pixmap::new(w, h).unwrap();
        let data = pm.data_mut();
        for y in 0..h {
            for x in 0..w {
                let i = ((y * w + x) * 4) as usize;
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                data[i] = v;
                data[i + 3] = 255;
            }
        }
        pm
    }

    #[test]
    fn test_extract_viewport_dimensions() {
        let pm = checker_pixmap(16, 16);
        let out = extract_viewport(&pm, 2, 2, 4, 4, 4).unwrap();
        assert_eq!((out.width(), out.height()), (16, 16));
    }

    #[test]
    fn test_extract_viewport_outside_bounds_is_none() {
        let pm = checker_pixmap(8, 8);
        assert!(extract_viewport(&pm, 20, 20, 4, 4, 2).is_none());
        assert!(extract_viewport(&pm, -10, 0, 10, 4, 2).is_none());
    }

    #[test]
    fn test_extract_viewport_straddling_clamps() {
        let pm = checker_pixmap(8, 8);
        // Requested 6x6 at (-2,-2): clamped to 4x4 at (0,0)
        let out = extract_viewport(&pm, -2, -2, 6, 6, 2).unwrap();
        assert_eq!((out.width(), out.height()), (8, 8));
    }
}
