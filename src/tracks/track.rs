//! A single editable track: per-frame position, heading and flags with undo.

use nalgebra::{Rotation3, Vector3};
use ndarray::{Array1, Array2};
use tracing::{debug, trace};

use crate::config::{DragFalloff, TrackConfig};
use crate::error::{Result, TrackError};
use crate::tracks::butterworth::Butterworth;
use crate::tracks::history::UndoHistory;
use crate::tracks::table::{TrackPoint, TrackTable};
use crate::tracks::vector::{self, lerp, normalize_or, normalize_row, sub};

/// Which neighbors an edit interpolates toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interp {
    /// Toward the previous detected frame.
    pub left: bool,
    /// Toward the next detected frame.
    pub right: bool,
}

impl Interp {
    pub const NONE: Interp = Interp {
        left: false,
        right: false,
    };
    pub const LEFT: Interp = Interp {
        left: true,
        right: false,
    };
    pub const RIGHT: Interp = Interp {
        left: false,
        right: true,
    };
    pub const BOTH: Interp = Interp {
        left: true,
        right: true,
    };
}

/// One tracked object over every frame of a video.
///
/// The frame count is fixed at construction. Edits that change data in a way
/// the user may want to take back (`add_det`, `rem_det`, filtering, ...)
/// record a full copy of the table first; drag edits (`move_pos`,
/// `move_vec`, `jog_heading`) do not, and rely on the caller to call
/// [`Track::checkpoint`] when a gesture starts.
#[derive(Debug, Clone)]
pub struct Track {
    table: TrackTable,
    history: UndoHistory<TrackTable>,
    default_heading: [f64; 3],
    drag_falloff: DragFalloff,
    /// Display-only flag, not part of the track data.
    pub visible: bool,
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
    }
}

/// Builder for [`Track`] with optional columns and configuration.
#[derive(Debug, Clone)]
pub struct TrackBuilder {
    position: Array2<f64>,
    heading: Option<Array2<f64>>,
    detected: Option<Array1<bool>>,
    visible: bool,
    config: TrackConfig,
}

impl TrackBuilder {
    /// Set the per-frame heading column, shape `[N, 3]`.
    pub fn heading(mut self, heading: Array2<f64>) -> Self {
        self.heading = Some(heading);
        self
    }

    /// Set the per-frame detection flags, length `N`.
    pub fn detected(mut self, detected: Array1<bool>) -> Self {
        self.detected = Some(detected);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn config(mut self, config: &TrackConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Validate shapes and build the track.
    pub fn build(self) -> Result<Track> {
        let n = self.position.nrows();
        if self.position.ncols() != 3 {
            return Err(TrackError::ShapeMismatch {
                what: "position",
                expected: vec![n, 3],
                found: self.position.shape().to_vec(),
            });
        }

        let default_heading = self.config.unit_default_heading();
        let heading = match self.heading {
            Some(mut heading) => {
                if heading.dim() != self.position.dim() {
                    return Err(TrackError::ShapeMismatch {
                        what: "heading",
                        expected: self.position.shape().to_vec(),
                        found: heading.shape().to_vec(),
                    });
                }
                vector::normalize_rows(&mut heading, default_heading);
                heading
            }
            None => Array2::from_shape_fn((n, 3), |(_, c)| default_heading[c]),
        };

        let detected = match self.detected {
            Some(detected) => {
                if detected.len() != n {
                    return Err(TrackError::ShapeMismatch {
                        what: "detected",
                        expected: vec![n],
                        found: vec![detected.len()],
                    });
                }
                detected
            }
            None => Array1::from_elem(n, false),
        };

        Ok(Track {
            table: TrackTable::from_columns(self.position, heading, detected),
            history: UndoHistory::new(self.config.undo_depth),
            default_heading,
            drag_falloff: self.config.drag_falloff,
            visible: self.visible,
        })
    }
}

impl Track {
    /// Create a track from an `[N, 3]` position array and optional heading
    /// and detection columns, using the default configuration.
    pub fn new(
        position: Array2<f64>,
        heading: Option<Array2<f64>>,
        detected: Option<Array1<bool>>,
    ) -> Result<Self> {
        let mut builder = Self::builder(position);
        builder.heading = heading;
        builder.detected = detected;
        builder.build()
    }

    pub fn builder(position: Array2<f64>) -> TrackBuilder {
        TrackBuilder {
            position,
            heading: None,
            detected: None,
            visible: true,
            config: TrackConfig::default(),
        }
    }

    /// An all-zero, all-undetected track of `num_frames` frames.
    pub fn blank(num_frames: usize, config: &TrackConfig) -> Self {
        let default_heading = config.unit_default_heading();
        let heading = Array2::from_shape_fn((num_frames, 3), |(_, c)| default_heading[c]);
        Self {
            table: TrackTable::from_columns(
                Array2::zeros((num_frames, 3)),
                heading,
                Array1::from_elem(num_frames, false),
            ),
            history: UndoHistory::new(config.undo_depth),
            default_heading,
            drag_falloff: config.drag_falloff,
            visible: true,
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn table(&self) -> &TrackTable {
        &self.table
    }

    pub fn positions(&self) -> &Array2<f64> {
        self.table.position()
    }

    pub fn headings(&self) -> &Array2<f64> {
        self.table.heading()
    }

    pub fn detected(&self) -> &Array1<bool> {
        self.table.detected()
    }

    pub fn control(&self) -> &Array1<bool> {
        self.table.control()
    }

    pub fn point(&self, index: usize) -> Result<TrackPoint> {
        self.check_index(index)?;
        Ok(self.table.point(index))
    }

    pub fn position(&self, index: usize) -> Result<[f64; 3]> {
        self.check_index(index)?;
        Ok(self.table.position_at(index))
    }

    pub fn heading(&self, index: usize) -> Result<[f64; 3]> {
        self.check_index(index)?;
        Ok(self.table.heading_at(index))
    }

    pub fn is_detected(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.table.detected()[index])
    }

    pub fn is_control(&self, index: usize) -> Result<bool> {
        self.check_index(index)?;
        Ok(self.table.control()[index])
    }

    pub fn detected_indices(&self) -> Vec<usize> {
        self.table.detected_indices()
    }

    pub fn num_detected(&self) -> usize {
        self.table.detected().iter().filter(|&&d| d).count()
    }

    pub fn next_detected(&self, index: usize) -> Option<usize> {
        self.table.next_detected(index)
    }

    pub fn prev_detected(&self, index: usize) -> Option<usize> {
        self.table.prev_detected(index)
    }

    pub fn default_heading(&self) -> [f64; 3] {
        self.default_heading
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_len(&self) -> usize {
        self.history.undo_len()
    }

    pub fn redo_len(&self) -> usize {
        self.history.redo_len()
    }

    // ------------------------------------------------------------------
    // Undoable edits
    // ------------------------------------------------------------------

    /// Place a detection at `index`.
    ///
    /// Without an explicit `heading` the direction is inferred from the
    /// neighboring detections selected by `interp`, falling back to the
    /// default heading. With `interp` enabled on a side, every frame between
    /// `index` and the neighbor on that side is filled by linear
    /// interpolation and marked detected. `index` becomes a control point.
    pub fn add_det(
        &mut self,
        index: usize,
        position: [f64; 3],
        heading: Option<[f64; 3]>,
        interp: Interp,
    ) -> Result<()> {
        self.check_index(index)?;
        self.undoable(|t| t.apply_det(index, position, heading, interp));
        Ok(())
    }

    /// Mark `index` as undetected. Position and heading are left as they were.
    pub fn rem_det(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.undoable(|t| t.table.clear_range(index, index + 1));
        Ok(())
    }

    /// Mark every frame in `start..end` as undetected.
    pub fn rem_dets(&mut self, start: usize, end: usize) -> Result<()> {
        self.check_range(start, end)?;
        self.undoable(|t| t.table.clear_range(start, end));
        Ok(())
    }

    /// Zero-phase low-pass filter of the detected positions.
    pub fn filter_position(&mut self, frame_rate: f64, cutoff_hz: f64, order: usize) -> Result<()> {
        let indices = self.table.detected_indices();
        let filtered = self.filtered(self.table.position(), &indices, frame_rate, cutoff_hz, order)?;
        self.undoable(|t| TrackTable::scatter(t.table.position_mut(), &indices, &filtered));
        Ok(())
    }

    /// Zero-phase low-pass filter of the detected headings, renormalized after.
    pub fn filter_heading(&mut self, frame_rate: f64, cutoff_hz: f64, order: usize) -> Result<()> {
        let indices = self.table.detected_indices();
        let filtered = self.filtered(self.table.heading(), &indices, frame_rate, cutoff_hz, order)?;
        self.undoable(|t| {
            TrackTable::scatter(t.table.heading_mut(), &indices, &filtered);
            let fallback = t.default_heading;
            for &i in &indices {
                normalize_row(t.table.heading_mut().row_mut(i), fallback);
            }
        });
        Ok(())
    }

    /// Check that [`Track::filter_position`] / [`Track::filter_heading`]
    /// would accept these parameters, without touching the track.
    pub fn check_filter(&self, frame_rate: f64, cutoff_hz: f64, order: usize) -> Result<()> {
        let filter = Butterworth::low_pass(order, cutoff_hz, frame_rate)?;
        let samples = self.num_detected();
        if samples <= filter.min_len() {
            return Err(TrackError::SignalTooShort {
                samples,
                required: filter.min_len(),
            });
        }
        Ok(())
    }

    /// Recompute the heading of every detected frame from its direction of
    /// travel: the mean of the displacement from the previous detection and
    /// to the next one. End frames use their single displacement. A frame
    /// that did not move keeps its heading.
    pub fn estimate_heading(&mut self) {
        let indices = self.table.detected_indices();
        let estimates: Vec<[f64; 3]> = indices
            .iter()
            .enumerate()
            .map(|(k, &i)| {
                let p = self.table.position_at(i);
                let incoming = k
                    .checked_sub(1)
                    .map(|prev| sub(p, self.table.position_at(indices[prev])));
                let outgoing = indices
                    .get(k + 1)
                    .map(|&next| sub(self.table.position_at(next), p));
                let v = match (incoming, outgoing) {
                    (Some(a), Some(b)) => lerp(a, b, 0.5),
                    (Some(a), None) => a,
                    (None, Some(b)) => b,
                    (None, None) => [0.0; 3],
                };
                normalize_or(v, self.table.heading_at(i))
            })
            .collect();

        self.undoable(|t| {
            for (&i, &h) in indices.iter().zip(&estimates) {
                t.table.set_heading(i, h);
            }
        });
    }

    // ------------------------------------------------------------------
    // Interactive edits (not recorded)
    // ------------------------------------------------------------------

    /// Record the current table so the next interactive gesture can be undone.
    pub fn checkpoint(&mut self) {
        self.history.record(self.table.clone());
    }

    /// Drag the position at `index` to `position`, carrying neighboring
    /// frames along with a decaying share of the displacement.
    pub fn move_pos(&mut self, index: usize, position: [f64; 3], interp: Interp) -> Result<()> {
        self.check_index(index)?;
        let delta = sub(position, self.table.position_at(index));
        self.table.set_position(index, position);
        for (j, w) in self.drag_weights(index, interp) {
            let p = self.table.position_at(j);
            self.table.set_position(
                j,
                [p[0] + w * delta[0], p[1] + w * delta[1], p[2] + w * delta[2]],
            );
        }
        Ok(())
    }

    /// Drag the heading at `index` toward `heading`, like [`Track::move_pos`].
    pub fn move_vec(&mut self, index: usize, heading: [f64; 3], interp: Interp) -> Result<()> {
        self.check_index(index)?;
        let old = self.table.heading_at(index);
        let heading = normalize_or(heading, old);
        let delta = sub(heading, old);
        self.table.set_heading(index, heading);
        for (j, w) in self.drag_weights(index, interp) {
            let h = self.table.heading_at(j);
            let moved = [h[0] + w * delta[0], h[1] + w * delta[1], h[2] + w * delta[2]];
            self.table.set_heading(j, normalize_or(moved, h));
        }
        Ok(())
    }

    /// Rotate the headings of `start..end` by `angle` radians about +Z.
    pub fn jog_heading(&mut self, angle: f64, start: usize, end: usize) -> Result<()> {
        self.check_range(start, end)?;
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), angle);
        for i in start..end {
            let h = rotation * Vector3::from(self.table.heading_at(i));
            self.table.set_heading(i, [h.x, h.y, h.z]);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Restore the table from before the most recent recorded edit.
    pub fn undo(&mut self) -> bool {
        let applied = self.history.undo(&mut self.table);
        if applied {
            debug!(remaining = self.history.undo_len(), "track undo");
        } else {
            trace!("track undo with empty history");
        }
        applied
    }

    /// Re-apply the most recently undone edit.
    pub fn redo(&mut self) -> bool {
        let applied = self.history.redo(&mut self.table);
        if applied {
            debug!(remaining = self.history.redo_len(), "track redo");
        } else {
            trace!("track redo with empty history");
        }
        applied
    }

    pub fn clear_undo_queue(&mut self) {
        self.history.clear();
    }

    pub(crate) fn clear_redo(&mut self) {
        self.history.clear_redo();
    }

    // ------------------------------------------------------------------
    // Structural helpers used by the collection
    // ------------------------------------------------------------------

    /// Merge `other` into this track: frames only `other` detected are copied
    /// over, frames both detected become undetected.
    pub(crate) fn link_from(&mut self, other: &TrackTable) {
        self.undoable(|t| {
            for i in 0..t.len() {
                match (t.table.detected()[i], other.detected()[i]) {
                    (false, true) => t.table.set_point(i, &other.point(i)),
                    (true, true) => t.table.clear_range(i, i + 1),
                    _ => {}
                }
            }
        });
    }

    /// Split at `frame`: this track keeps `frame..`, the returned track
    /// (with an empty history) keeps `..frame`.
    pub(crate) fn split_at(&mut self, frame: usize) -> Track {
        let mut head = Track {
            table: self.table.clone(),
            history: UndoHistory::new(self.history.depth()),
            default_heading: self.default_heading,
            drag_falloff: self.drag_falloff,
            visible: self.visible,
        };
        let len = self.len();
        head.table.clear_range(frame, len);
        self.undoable(|t| t.table.clear_range(0, frame));
        head
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Snapshot the table, then run `edit`.
    fn undoable<R>(&mut self, edit: impl FnOnce(&mut Self) -> R) -> R {
        self.history.record(self.table.clone());
        edit(self)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(TrackError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn check_range(&self, start: usize, end: usize) -> Result<()> {
        if start > end || end > self.len() {
            return Err(TrackError::InvalidRange {
                start,
                end,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn apply_det(
        &mut self,
        index: usize,
        position: [f64; 3],
        heading: Option<[f64; 3]>,
        interp: Interp,
    ) {
        let prev = self.table.prev_detected(index);
        let next = self.table.next_detected(index);

        self.table.set_position(index, position);
        self.table.set_detected(index, true);
        let heading = match heading {
            Some(h) => normalize_or(h, self.default_heading),
            None => self.infer_heading(position, prev, next, interp),
        };
        self.table.set_heading(index, heading);

        if let Some(next) = next.filter(|_| interp.right) {
            self.fill_between(index, next);
        }
        if let Some(prev) = prev.filter(|_| interp.left) {
            self.fill_between(prev, index);
        }

        vector::normalize_rows(self.table.heading_mut(), self.default_heading);
        self.table.set_control(index, true);
    }

    fn infer_heading(
        &self,
        position: [f64; 3],
        prev: Option<usize>,
        next: Option<usize>,
        interp: Interp,
    ) -> [f64; 3] {
        let v = match (prev, next) {
            (Some(p), Some(n)) if interp.left && interp.right => {
                let to_next = sub(self.table.position_at(n), position);
                let from_prev = sub(position, self.table.position_at(p));
                lerp(to_next, from_prev, 0.5)
            }
            (Some(p), _) if interp.left => sub(position, self.table.position_at(p)),
            (_, Some(n)) if interp.right => sub(self.table.position_at(n), position),
            _ => return self.default_heading,
        };
        normalize_or(v, self.default_heading)
    }

    /// Linearly interpolate position and heading strictly between `a` and `b`.
    fn fill_between(&mut self, a: usize, b: usize) {
        let (pa, pb) = (self.table.position_at(a), self.table.position_at(b));
        let (ha, hb) = (self.table.heading_at(a), self.table.heading_at(b));
        let span = (b - a) as f64;
        for j in a + 1..b {
            let t = (j - a) as f64 / span;
            self.table.set_position(j, lerp(pa, pb, t));
            self.table.set_heading(j, normalize_or(lerp(ha, hb, t), ha));
            self.table.set_detected(j, true);
        }
    }

    /// Frames a drag at `index` spreads to, with the share of the
    /// displacement each receives.
    fn drag_weights(&self, index: usize, interp: Interp) -> Vec<(usize, f64)> {
        let len = self.len();
        let detected = self.table.detected();
        let control = self.table.control();
        let mut weights = Vec::new();

        match self.drag_falloff {
            DragFalloff::ToControlPoints => {
                if interp.right {
                    let stop = (index + 1..len)
                        .find(|&j| control[j] || !detected[j])
                        .unwrap_or(len);
                    let span = (stop - index) as f64;
                    weights.extend((index + 1..stop).map(|j| (j, 1.0 - (j - index) as f64 / span)));
                }
                if interp.left {
                    // Distance to the stopping frame; a drag that runs off the
                    // start stops one frame before frame 0.
                    let span = (0..index)
                        .rev()
                        .find(|&j| control[j] || !detected[j])
                        .map_or(index + 1, |j| index - j);
                    weights.extend(
                        (index + 1 - span..index)
                            .rev()
                            .map(|j| (j, 1.0 - (index - j) as f64 / span as f64)),
                    );
                }
            }
            DragFalloff::Window { radius } => {
                let falloff = |d: usize| (1.0 - d as f64 / (radius + 1) as f64).powi(3);
                for d in 1..=radius {
                    if interp.right && index + d < len && detected[index + d] {
                        weights.push((index + d, falloff(d)));
                    }
                    if interp.left && d <= index && detected[index - d] {
                        weights.push((index - d, falloff(d)));
                    }
                }
            }
        }
        weights
    }

    /// Low-pass `column` at `indices` without touching the track.
    fn filtered(
        &self,
        column: &Array2<f64>,
        indices: &[usize],
        frame_rate: f64,
        cutoff_hz: f64,
        order: usize,
    ) -> Result<Array2<f64>> {
        let filter = Butterworth::low_pass(order, cutoff_hz, frame_rate)?;
        let samples = TrackTable::gather(column, indices);
        filter.filtfilt_columns(&samples)
    }
}
