//! Column storage for one track.

use ndarray::{Array1, Array2, Axis, aview1, s};

/// One frame of a track, copied out of a [`TrackTable`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrackPoint {
    pub position: [f64; 3],
    /// Unit heading vector.
    pub heading: [f64; 3],
    /// Whether this frame is a real observation.
    pub detected: bool,
    /// Whether this frame is a user-placed anchor rather than interpolated fill.
    pub control: bool,
}

/// Per-frame columns of a track. All four columns always have the same length.
///
/// The fields are private so the length invariant can only be broken through
/// the constructor, which checks it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackTable {
    position: Array2<f64>,
    heading: Array2<f64>,
    detected: Array1<bool>,
    control: Array1<bool>,
}

impl TrackTable {
    /// Build a table from already validated columns.
    pub(crate) fn from_columns(
        position: Array2<f64>,
        heading: Array2<f64>,
        detected: Array1<bool>,
    ) -> Self {
        debug_assert_eq!(position.dim(), heading.dim());
        debug_assert_eq!(position.nrows(), detected.len());
        let control = Array1::from_elem(detected.len(), false);
        Self {
            position,
            heading,
            detected,
            control,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detected.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detected.is_empty()
    }

    pub fn position(&self) -> &Array2<f64> {
        &self.position
    }

    pub fn heading(&self) -> &Array2<f64> {
        &self.heading
    }

    pub fn detected(&self) -> &Array1<bool> {
        &self.detected
    }

    pub fn control(&self) -> &Array1<bool> {
        &self.control
    }

    pub(crate) fn position_mut(&mut self) -> &mut Array2<f64> {
        &mut self.position
    }

    pub(crate) fn heading_mut(&mut self) -> &mut Array2<f64> {
        &mut self.heading
    }

    /// Copy out one frame. Panics if `index` is out of range.
    pub fn point(&self, index: usize) -> TrackPoint {
        TrackPoint {
            position: self.position_at(index),
            heading: self.heading_at(index),
            detected: self.detected[index],
            control: self.control[index],
        }
    }

    #[inline]
    pub fn position_at(&self, index: usize) -> [f64; 3] {
        let r = self.position.row(index);
        [r[0], r[1], r[2]]
    }

    #[inline]
    pub fn heading_at(&self, index: usize) -> [f64; 3] {
        let r = self.heading.row(index);
        [r[0], r[1], r[2]]
    }

    #[inline]
    pub(crate) fn set_position(&mut self, index: usize, value: [f64; 3]) {
        self.position.row_mut(index).assign(&aview1(&value));
    }

    #[inline]
    pub(crate) fn set_heading(&mut self, index: usize, value: [f64; 3]) {
        self.heading.row_mut(index).assign(&aview1(&value));
    }

    #[inline]
    pub(crate) fn set_detected(&mut self, index: usize, value: bool) {
        self.detected[index] = value;
    }

    #[inline]
    pub(crate) fn set_control(&mut self, index: usize, value: bool) {
        self.control[index] = value;
    }

    /// Overwrite every column of frame `index`.
    pub(crate) fn set_point(&mut self, index: usize, point: &TrackPoint) {
        self.set_position(index, point.position);
        self.set_heading(index, point.heading);
        self.detected[index] = point.detected;
        self.control[index] = point.control;
    }

    /// Mark frames `start..end` as neither detected nor control points.
    pub(crate) fn clear_range(&mut self, start: usize, end: usize) {
        self.detected.slice_mut(s![start..end]).fill(false);
        self.control.slice_mut(s![start..end]).fill(false);
    }

    /// First detected frame after `index`.
    pub fn next_detected(&self, index: usize) -> Option<usize> {
        (index + 1..self.len()).find(|&i| self.detected[i])
    }

    /// Last detected frame before `index`.
    pub fn prev_detected(&self, index: usize) -> Option<usize> {
        (0..index.min(self.len())).rev().find(|&i| self.detected[i])
    }

    pub fn detected_indices(&self) -> Vec<usize> {
        self.detected
            .indexed_iter()
            .filter_map(|(i, &d)| d.then_some(i))
            .collect()
    }

    /// Rows of `column` at `indices`, stacked into a new `[indices.len(), 3]` array.
    pub(crate) fn gather(column: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
        column.select(Axis(0), indices)
    }

    /// Write the rows of `values` back into `column` at `indices`.
    pub(crate) fn scatter(column: &mut Array2<f64>, indices: &[usize], values: &Array2<f64>) {
        for (src, &dst) in indices.iter().enumerate() {
            column.row_mut(dst).assign(&values.row(src));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(detected: &[bool]) -> TrackTable {
        let n = detected.len();
        let mut position = Array2::zeros((n, 3));
        for i in 0..n {
            position[[i, 0]] = i as f64;
        }
        let heading = Array2::from_shape_fn((n, 3), |(_, c)| if c == 0 { 1.0 } else { 0.0 });
        TrackTable::from_columns(position, heading, Array1::from_vec(detected.to_vec()))
    }

    #[test]
    fn test_neighbor_scans() {
        let t = table(&[true, false, false, true, false]);
        assert_eq!(t.next_detected(0), Some(3));
        assert_eq!(t.next_detected(3), None);
        assert_eq!(t.prev_detected(3), Some(0));
        assert_eq!(t.prev_detected(0), None);
        assert_eq!(t.prev_detected(4), Some(3));
        assert_eq!(t.detected_indices(), vec![0, 3]);
    }

    #[test]
    fn test_clear_range_and_point() {
        let mut t = table(&[true, true, true, true]);
        t.set_control(1, true);
        t.clear_range(1, 3);
        assert_eq!(t.detected().to_vec(), vec![true, false, false, true]);
        assert!(!t.point(1).control);
        assert_eq!(t.point(3).position, [3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gather_scatter() {
        let mut t = table(&[true, false, true]);
        let idx = [0, 2];
        let mut rows = TrackTable::gather(t.position(), &idx);
        rows += 10.0;
        TrackTable::scatter(t.position_mut(), &idx, &rows);
        assert_eq!(t.position_at(0), [10.0, 10.0, 10.0]);
        assert_eq!(t.position_at(1), [1.0, 0.0, 0.0]);
        assert_eq!(t.position_at(2), [12.0, 10.0, 10.0]);
    }
}
