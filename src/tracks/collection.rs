//! Ordered set of equal-length tracks with coordinated undo.

use std::ops::Index;

use tracing::debug;

use crate::config::TrackConfig;
use crate::error::{Result, TrackError};
use crate::tracks::history::UndoHistory;
use crate::tracks::track::{Interp, Track};

/// One step of the collection undo log.
#[derive(Debug, Clone, Default)]
struct UndoUnit {
    /// Tracks holding one history step for this unit.
    tracks: Vec<usize>,
    /// The step appended a track at the end of the collection.
    appends: bool,
    /// The appended track while the step is undone.
    parked: Option<Track>,
}

impl UndoUnit {
    fn edit(tracks: Vec<usize>) -> Self {
        Self {
            tracks,
            ..Self::default()
        }
    }

    fn append(tracks: Vec<usize>) -> Self {
        Self {
            tracks,
            appends: true,
            parked: None,
        }
    }

    fn touches(&self, track_index: usize) -> bool {
        self.tracks.contains(&track_index)
    }

    fn is_empty(&self) -> bool {
        self.tracks.is_empty() && !self.appends
    }
}

/// Every track of a video, all with the same frame count.
///
/// Edits made through the collection are logged as undo units, one entry
/// listing every track the edit touched, so a bulk edit over several tracks
/// is taken back in one [`TrackCollection::undo`]. Appending a track
/// (`add_track`, `break_track`) is logged too, and undoing it takes the
/// track off the end again. Per-track [`TrackCollection::undo_track`] keeps
/// the log in step. Edits made directly on a track from
/// [`TrackCollection::track_mut`] are not logged here.
#[derive(Debug, Clone)]
pub struct TrackCollection {
    tracks: Vec<Track>,
    num_frames: usize,
    config: TrackConfig,
    log: UndoHistory<UndoUnit>,
}

impl TrackCollection {
    /// Build a collection from tracks, using the default configuration for
    /// tracks added later.
    pub fn new(tracks: Vec<Track>) -> Result<Self> {
        Self::with_config(tracks, TrackConfig::default())
    }

    pub fn with_config(tracks: Vec<Track>, config: TrackConfig) -> Result<Self> {
        config.validate()?;
        let num_frames = tracks.first().ok_or(TrackError::EmptyCollection)?.len();
        if let Some((index, t)) = tracks
            .iter()
            .enumerate()
            .find(|(_, t)| t.len() != num_frames)
        {
            return Err(TrackError::LengthMismatch {
                index,
                expected: num_frames,
                found: t.len(),
            });
        }
        let log = UndoHistory::new(config.undo_depth);
        Ok(Self {
            tracks,
            num_frames,
            config,
            log,
        })
    }

    /// A collection holding a single blank track.
    pub fn blank(num_frames: usize, config: TrackConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::single_blank(num_frames, config))
    }

    /// [`TrackCollection::blank`] for a configuration already known to be valid.
    pub(crate) fn single_blank(num_frames: usize, config: TrackConfig) -> Self {
        let log = UndoHistory::new(config.undo_depth);
        Self {
            tracks: vec![Track::blank(num_frames, &config)],
            num_frames,
            config,
            log,
        }
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Track> {
        self.tracks.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Raw mutable access; edits through it bypass the collection undo log.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    pub fn track(&self, index: usize) -> Result<&Track> {
        self.check_track(index)?;
        Ok(&self.tracks[index])
    }

    /// Direct access to one track. Edits made through it bypass the
    /// collection's undo log.
    pub fn track_mut(&mut self, index: usize) -> Result<&mut Track> {
        self.check_track(index)?;
        Ok(&mut self.tracks[index])
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Append `track`, or a blank track when `None`. Returns its index.
    ///
    /// Undoing the append removes the track again.
    pub fn add_track(&mut self, track: Option<Track>) -> Result<usize> {
        let track = match track {
            Some(track) => {
                if track.len() != self.num_frames {
                    return Err(TrackError::LengthMismatch {
                        index: self.tracks.len(),
                        expected: self.num_frames,
                        found: track.len(),
                    });
                }
                track
            }
            None => Track::blank(self.num_frames, &self.config),
        };
        self.tracks.push(track);
        self.record(UndoUnit::append(Vec::new()));
        debug!(index = self.tracks.len() - 1, "added track");
        Ok(self.tracks.len() - 1)
    }

    /// Remove and return the track at `index`.
    ///
    /// Indices of later tracks shift down, so every undo history in the
    /// collection is cleared. The last remaining track cannot be removed.
    pub fn remove_track(&mut self, index: usize) -> Result<Track> {
        self.check_track(index)?;
        if self.tracks.len() == 1 {
            return Err(TrackError::EmptyCollection);
        }
        let removed = self.tracks.remove(index);
        self.clear_undo();
        debug!(index, remaining = self.tracks.len(), "removed track");
        Ok(removed)
    }

    /// Merge track `b` into track `a`.
    ///
    /// Frames only `b` detected are copied into `a`; frames both detected are
    /// cleared in `a`, leaving the overlap for manual review. Track `b` is
    /// left in place. Returns `b`.
    pub fn link_tracks(&mut self, a: usize, b: usize) -> Result<usize> {
        self.check_track(a)?;
        self.check_track(b)?;
        if a == b {
            return Err(TrackError::SameTrack(a));
        }
        let source = self.tracks[b].table().clone();
        self.tracks[a].link_from(&source);
        self.record(UndoUnit::edit(vec![a]));
        debug!(a, b, "linked tracks");
        Ok(b)
    }

    /// Split `track_index` at `frame_index`.
    ///
    /// The original keeps `frame_index..` and a new track holding
    /// `..frame_index` is appended. Returns the new track's index. One undo
    /// restores the original and removes the new track.
    pub fn break_track(&mut self, track_index: usize, frame_index: usize) -> Result<usize> {
        self.check_frame(track_index, frame_index)?;
        let head = self.tracks[track_index].split_at(frame_index);
        self.tracks.push(head);
        self.record(UndoUnit::append(vec![track_index]));
        let new_index = self.tracks.len() - 1;
        debug!(track_index, frame_index, new_index, "broke track");
        Ok(new_index)
    }

    // ------------------------------------------------------------------
    // Single-track edits
    // ------------------------------------------------------------------

    pub fn add_det(
        &mut self,
        track_index: usize,
        frame_index: usize,
        position: [f64; 3],
        heading: Option<[f64; 3]>,
        interp: Interp,
    ) -> Result<()> {
        self.check_frame(track_index, frame_index)?;
        self.tracks[track_index].add_det(frame_index, position, heading, interp)?;
        self.record(UndoUnit::edit(vec![track_index]));
        Ok(())
    }

    pub fn rem_det(&mut self, track_index: usize, frame_index: usize) -> Result<()> {
        self.check_frame(track_index, frame_index)?;
        self.tracks[track_index].rem_det(frame_index)?;
        self.record(UndoUnit::edit(vec![track_index]));
        Ok(())
    }

    pub fn rem_dets(&mut self, track_index: usize, start: usize, end: usize) -> Result<()> {
        self.check_track(track_index)?;
        self.tracks[track_index].rem_dets(start, end)?;
        self.record(UndoUnit::edit(vec![track_index]));
        Ok(())
    }

    /// Start an interactive drag on `track_index`: the state from before the
    /// gesture becomes one undo step.
    pub fn begin_drag(&mut self, track_index: usize) -> Result<()> {
        self.check_track(track_index)?;
        self.tracks[track_index].checkpoint();
        self.record(UndoUnit::edit(vec![track_index]));
        Ok(())
    }

    pub fn move_pos(
        &mut self,
        track_index: usize,
        frame_index: usize,
        position: [f64; 3],
        interp: Interp,
    ) -> Result<()> {
        self.check_frame(track_index, frame_index)?;
        self.tracks[track_index].move_pos(frame_index, position, interp)
    }

    pub fn move_vec(
        &mut self,
        track_index: usize,
        frame_index: usize,
        heading: [f64; 3],
        interp: Interp,
    ) -> Result<()> {
        self.check_frame(track_index, frame_index)?;
        self.tracks[track_index].move_vec(frame_index, heading, interp)
    }

    pub fn jog_heading(
        &mut self,
        track_index: usize,
        angle: f64,
        start: usize,
        end: usize,
    ) -> Result<()> {
        self.check_track(track_index)?;
        self.tracks[track_index].jog_heading(angle, start, end)
    }

    // ------------------------------------------------------------------
    // Bulk edits
    // ------------------------------------------------------------------

    /// Re-estimate headings on `track_indices` (all tracks when `None`).
    pub fn estimate_heading(&mut self, track_indices: Option<&[usize]>) -> Result<()> {
        let indices = self.resolve(track_indices)?;
        for &i in &indices {
            self.tracks[i].estimate_heading();
        }
        self.record(UndoUnit::edit(indices));
        Ok(())
    }

    pub fn filter_heading(
        &mut self,
        frame_rate: f64,
        cutoff_hz: f64,
        order: usize,
        track_indices: Option<&[usize]>,
    ) -> Result<()> {
        let indices = self.resolve_filterable(frame_rate, cutoff_hz, order, track_indices)?;
        for &i in &indices {
            self.tracks[i].filter_heading(frame_rate, cutoff_hz, order)?;
        }
        self.record(UndoUnit::edit(indices));
        Ok(())
    }

    pub fn filter_position(
        &mut self,
        frame_rate: f64,
        cutoff_hz: f64,
        order: usize,
        track_indices: Option<&[usize]>,
    ) -> Result<()> {
        let indices = self.resolve_filterable(frame_rate, cutoff_hz, order, track_indices)?;
        for &i in &indices {
            self.tracks[i].filter_position(frame_rate, cutoff_hz, order)?;
        }
        self.record(UndoUnit::edit(indices));
        Ok(())
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Take back the most recent logged edit on every track it touched.
    /// Returns whether anything changed.
    pub fn undo(&mut self) -> bool {
        let Some(mut unit) = self.log.pop_undo() else {
            return false;
        };
        let applied = self.revert(&mut unit);
        debug!(tracks = ?unit.tracks, appends = unit.appends, "collection undo");
        self.log.push_redo(unit);
        applied
    }

    pub fn redo(&mut self) -> bool {
        let Some(mut unit) = self.log.pop_redo() else {
            return false;
        };
        let applied = self.replay(&mut unit);
        debug!(tracks = ?unit.tracks, appends = unit.appends, "collection redo");
        self.log.push_undo(unit);
        applied
    }

    /// Undo the most recent edit on one track.
    ///
    /// The track's step is taken out of the logged unit it belongs to. If
    /// that unit appended a track, the whole unit is undone, which is only
    /// possible while it is the most recent unit; otherwise nothing changes
    /// and `false` is returned.
    pub fn undo_track(&mut self, track_index: usize) -> Result<bool> {
        self.check_track(track_index)?;
        if let Some((depth, unit)) = self.log.find_undo_mut(|u| u.touches(track_index)) {
            if unit.appends {
                if depth != 0 {
                    debug!(track_index, "newer edits block undoing a track append");
                    return Ok(false);
                }
                return Ok(self.undo());
            }
            unit.tracks.retain(|&t| t != track_index);
            self.log.retain(|u| !u.is_empty());
        }
        let applied = self.tracks[track_index].undo();
        if applied {
            self.log.push_redo(UndoUnit::edit(vec![track_index]));
        }
        Ok(applied)
    }

    /// Mirror of [`TrackCollection::undo_track`].
    pub fn redo_track(&mut self, track_index: usize) -> Result<bool> {
        self.check_track(track_index)?;
        if let Some((depth, unit)) = self.log.find_redo_mut(|u| u.touches(track_index)) {
            if unit.appends {
                if depth != 0 {
                    debug!(track_index, "older undone edits block redoing a track append");
                    return Ok(false);
                }
                return Ok(self.redo());
            }
            unit.tracks.retain(|&t| t != track_index);
            self.log.retain(|u| !u.is_empty());
        }
        let applied = self.tracks[track_index].redo();
        if applied {
            self.log.push_undo(UndoUnit::edit(vec![track_index]));
        }
        Ok(applied)
    }

    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Drop the collection log and every track's history.
    pub fn clear_undo(&mut self) {
        self.log.clear();
        for t in &mut self.tracks {
            t.clear_undo_queue();
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Log `unit`. Like a single track edit, it discards every redo step.
    fn record(&mut self, unit: UndoUnit) {
        if unit.is_empty() {
            return;
        }
        self.log.record(unit);
        for t in &mut self.tracks {
            t.clear_redo();
        }
    }

    fn revert(&mut self, unit: &mut UndoUnit) -> bool {
        let mut applied = false;
        if unit.appends && self.tracks.len() > 1 {
            unit.parked = self.tracks.pop();
            applied = true;
        }
        for &i in &unit.tracks {
            if let Some(t) = self.tracks.get_mut(i) {
                applied |= t.undo();
            }
        }
        applied
    }

    fn replay(&mut self, unit: &mut UndoUnit) -> bool {
        let mut applied = false;
        for &i in &unit.tracks {
            if let Some(t) = self.tracks.get_mut(i) {
                applied |= t.redo();
            }
        }
        if let Some(track) = unit.parked.take() {
            self.tracks.push(track);
            applied = true;
        }
        applied
    }

    fn check_track(&self, index: usize) -> Result<()> {
        if index >= self.tracks.len() {
            return Err(TrackError::TrackIndexOutOfRange {
                index,
                len: self.tracks.len(),
            });
        }
        Ok(())
    }

    fn check_frame(&self, track_index: usize, frame_index: usize) -> Result<()> {
        self.check_track(track_index)?;
        if frame_index >= self.num_frames {
            return Err(TrackError::IndexOutOfRange {
                index: frame_index,
                len: self.num_frames,
            });
        }
        Ok(())
    }

    /// Validated, de-duplicated track indices in the order given.
    fn resolve(&self, track_indices: Option<&[usize]>) -> Result<Vec<usize>> {
        let Some(requested) = track_indices else {
            return Ok((0..self.tracks.len()).collect());
        };
        let mut indices = Vec::with_capacity(requested.len());
        for &i in requested {
            self.check_track(i)?;
            if !indices.contains(&i) {
                indices.push(i);
            }
        }
        Ok(indices)
    }

    fn resolve_filterable(
        &self,
        frame_rate: f64,
        cutoff_hz: f64,
        order: usize,
        track_indices: Option<&[usize]>,
    ) -> Result<Vec<usize>> {
        let indices = self.resolve(track_indices)?;
        for &i in &indices {
            self.tracks[i].check_filter(frame_rate, cutoff_hz, order)?;
        }
        Ok(indices)
    }
}

impl Index<usize> for TrackCollection {
    type Output = Track;

    fn index(&self, index: usize) -> &Track {
        &self.tracks[index]
    }
}

impl<'a> IntoIterator for &'a TrackCollection {
    type Item = &'a Track;
    type IntoIter = std::slice::Iter<'a, Track>;

    fn into_iter(self) -> Self::IntoIter {
        self.tracks.iter()
    }
}
