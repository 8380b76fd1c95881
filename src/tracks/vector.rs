//! Small vector helpers shared by the track code.

use ndarray::{Array2, ArrayViewMut1};

/// Added to the denominator when normalizing so a zero vector stays finite.
pub const EPSILON: f64 = 1e-20;

/// Vectors shorter than this are treated as having no direction.
pub const ZERO_LENGTH: f64 = 1e-12;

#[inline]
pub fn norm(v: &[f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Scale `v` to unit length. A zero vector comes back as zero.
#[inline]
pub fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n = norm(&v) + EPSILON;
    [v[0] / n, v[1] / n, v[2] / n]
}

/// Like [`normalize`], but returns `fallback` when `v` has no direction.
#[inline]
pub fn normalize_or(v: [f64; 3], fallback: [f64; 3]) -> [f64; 3] {
    if norm(&v) < ZERO_LENGTH {
        fallback
    } else {
        normalize(v)
    }
}

#[inline]
pub fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn lerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

/// Normalize one `[x, y, z]` row in place.
pub(crate) fn normalize_row(mut view: ArrayViewMut1<'_, f64>, fallback: [f64; 3]) {
    let v = normalize_or([view[0], view[1], view[2]], fallback);
    view[0] = v[0];
    view[1] = v[1];
    view[2] = v[2];
}

/// Normalize every row of an `[N, 3]` array in place.
pub fn normalize_rows(vectors: &mut Array2<f64>, fallback: [f64; 3]) {
    for r in vectors.rows_mut() {
        normalize_row(r, fallback);
    }
}

const NUM_COLORS: usize = 20;

// matplotlib "tab20"
const TAB20: [[u8; 3]; NUM_COLORS] = [
    [0x1f, 0x77, 0xb4],
    [0xae, 0xc7, 0xe8],
    [0xff, 0x7f, 0x0e],
    [0xff, 0xbb, 0x78],
    [0x2c, 0xa0, 0x2c],
    [0x98, 0xdf, 0x8a],
    [0xd6, 0x27, 0x28],
    [0xff, 0x98, 0x96],
    [0x94, 0x67, 0xbd],
    [0xc5, 0xb0, 0xd5],
    [0x8c, 0x56, 0x4b],
    [0xc4, 0x9c, 0x94],
    [0xe3, 0x77, 0xc2],
    [0xf7, 0xb6, 0xd2],
    [0x7f, 0x7f, 0x7f],
    [0xc7, 0xc7, 0xc7],
    [0xbc, 0xbd, 0x22],
    [0xdb, 0xdb, 0x8d],
    [0x17, 0xbe, 0xcf],
    [0x9e, 0xda, 0xe5],
];

/// RGBA color (components in `0..=1`) for a track index. Cycles every 20 tracks.
pub fn color_from_index(index: usize) -> [f32; 4] {
    let [r, g, b] = TAB20[index % NUM_COLORS];
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_normalize_zero_vector_stays_finite() {
        let v = normalize([0.0, 0.0, 0.0]);
        assert!(v.iter().all(|c| c.is_finite()));
        assert_eq!(v, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_or_falls_back() {
        assert_eq!(normalize_or([0.0; 3], [0.0, 1.0, 0.0]), [0.0, 1.0, 0.0]);
        let v = normalize_or([3.0, 4.0, 0.0], [0.0, 1.0, 0.0]);
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_rows() {
        let mut vecs = array![[2.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 1.0, 0.0]];
        normalize_rows(&mut vecs, [1.0, 0.0, 0.0]);
        for r in vecs.rows() {
            assert_abs_diff_eq!(norm(&[r[0], r[1], r[2]]), 1.0, epsilon = 1e-12);
        }
        assert_eq!(vecs.row(1).to_vec(), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_color_cycles() {
        assert_eq!(color_from_index(3), color_from_index(23));
        assert_ne!(color_from_index(0), color_from_index(1));
        assert_eq!(color_from_index(7)[3], 1.0);
    }
}
