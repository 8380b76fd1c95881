//! EditSession for editing a collection of tracks over a video.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::TrackConfig;
use crate::error::{PersistError, Result, TrackError};
use crate::track_io::TrackIo;
use crate::tracks::TrackCollection;

use super::VideoSource;

/// Which columns of the selected track to low-pass, and at what cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterRequest {
    /// Cutoff for position filtering, `None` to leave positions alone.
    pub position_cutoff_hz: Option<f64>,
    /// Cutoff for heading filtering, `None` to leave headings alone.
    pub heading_cutoff_hz: Option<f64>,
    pub order: usize,
}

impl FilterRequest {
    /// Filter both columns with the configured defaults.
    pub fn from_config(config: &TrackConfig) -> Self {
        Self {
            position_cutoff_hz: Some(config.filter.cutoff_hz),
            heading_cutoff_hz: Some(config.filter.cutoff_hz),
            order: config.filter.order,
        }
    }
}

/// A video together with the tracks being edited over it.
///
/// Keeps the editor state a front end needs between events: the frame on
/// screen, the selected track, whether there are unsaved edits, and where
/// to save them.
pub struct EditSession<V: VideoSource> {
    video: V,
    tracks: TrackCollection,
    current_frame: usize,
    selected_track: usize,
    mutated: bool,
    save_path: Option<PathBuf>,
}

impl<V: VideoSource> EditSession<V> {
    /// Pair `video` with `tracks`. Both must have the same frame count.
    pub fn new(video: V, tracks: TrackCollection) -> Result<Self> {
        if tracks.num_frames() != video.num_frames() {
            return Err(TrackError::LengthMismatch {
                index: 0,
                expected: video.num_frames(),
                found: tracks.num_frames(),
            });
        }
        Ok(Self {
            video,
            tracks,
            current_frame: 0,
            selected_track: 0,
            mutated: false,
            save_path: None,
        })
    }

    /// Start from a single blank track.
    pub fn blank(video: V) -> Self {
        let tracks = TrackIo::blank(video.num_frames());
        Self {
            video,
            tracks,
            current_frame: 0,
            selected_track: 0,
            mutated: false,
            save_path: None,
        }
    }

    /// Load tracks from `path`, which also becomes the save path.
    pub fn open(video: V, path: impl AsRef<Path>) -> std::result::Result<Self, PersistError> {
        let path = path.as_ref();
        let tracks = TrackIo::load(path)?;
        let mut session = Self::new(video, tracks)?;
        session.save_path = Some(path.to_path_buf());
        Ok(session)
    }

    pub fn video(&self) -> &V {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut V {
        &mut self.video
    }

    pub fn tracks(&self) -> &TrackCollection {
        &self.tracks
    }

    /// Run an edit against the collection. A successful edit marks the
    /// session as mutated.
    pub fn edit<R>(
        &mut self,
        f: impl FnOnce(&mut TrackCollection) -> Result<R>,
    ) -> Result<R> {
        let out = f(&mut self.tracks)?;
        self.mutated = true;
        self.clamp_selection();
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Move to `frame`, clamped to the video. Returns the new frame.
    pub fn seek(&mut self, frame: usize) -> usize {
        self.current_frame = frame.min(self.last_frame());
        debug!(frame = self.current_frame, "seek");
        self.current_frame
    }

    /// Move by `delta` frames, clamped to the video. Returns the new frame.
    pub fn jog(&mut self, delta: isize) -> usize {
        let target = self.current_frame.saturating_add_signed(delta);
        self.seek(target)
    }

    /// Decode the frame currently on screen.
    pub fn frame(&mut self) -> Option<V::Frame> {
        self.video.get_frame(self.current_frame)
    }

    pub fn selected_track(&self) -> usize {
        self.selected_track
    }

    pub fn select_track(&mut self, index: usize) -> Result<()> {
        self.tracks.track(index)?;
        self.selected_track = index;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Edits on the selected track
    // ------------------------------------------------------------------

    /// Low-pass the selected track at the video's frame rate.
    ///
    /// Both requested filters are checked before either runs.
    pub fn filter_selected(&mut self, request: FilterRequest) -> Result<()> {
        let fps = self.video.fps();
        let index = self.selected_track;
        let track = self.tracks.track(index)?;
        for cutoff in [request.position_cutoff_hz, request.heading_cutoff_hz]
            .into_iter()
            .flatten()
        {
            track.check_filter(fps, cutoff, request.order)?;
        }

        if let Some(cutoff) = request.position_cutoff_hz {
            self.tracks
                .filter_position(fps, cutoff, request.order, Some(&[index]))?;
            self.mutated = true;
        }
        if let Some(cutoff) = request.heading_cutoff_hz {
            self.tracks
                .filter_heading(fps, cutoff, request.order, Some(&[index]))?;
            self.mutated = true;
        }
        Ok(())
    }

    /// Undo the last edit on the selected track.
    pub fn undo(&mut self) -> bool {
        let applied = self
            .tracks
            .undo_track(self.selected_track)
            .unwrap_or(false);
        self.mutated |= applied;
        self.clamp_selection();
        applied
    }

    pub fn redo(&mut self) -> bool {
        let applied = self
            .tracks
            .redo_track(self.selected_track)
            .unwrap_or(false);
        self.mutated |= applied;
        self.clamp_selection();
        applied
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Whether there are edits since the last load or save.
    pub fn is_mutated(&self) -> bool {
        self.mutated
    }

    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    /// Save to the current save path.
    pub fn save(&mut self) -> std::result::Result<(), PersistError> {
        let path = self.save_path.clone().ok_or(PersistError::NoSavePath)?;
        TrackIo::save(&path, &self.tracks)?;
        self.mutated = false;
        Ok(())
    }

    /// Save to `path` (with `.npz` appended if missing) and keep it as the
    /// save path.
    pub fn save_as(&mut self, path: impl AsRef<Path>) -> std::result::Result<PathBuf, PersistError> {
        let mut path = path.as_ref().to_path_buf();
        let has_ext = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("npz"));
        if !has_ext {
            let mut name = path.clone().into_os_string();
            name.push(".npz");
            path = PathBuf::from(name);
        }
        self.save_path = Some(path.clone());
        self.save()?;
        info!(path = %path.display(), "saved session");
        Ok(path)
    }

    /// Keep the selection valid after the track list shrinks.
    fn clamp_selection(&mut self) {
        self.selected_track = self
            .selected_track
            .min(self.tracks.num_tracks().saturating_sub(1));
    }

    fn last_frame(&self) -> usize {
        self.video.num_frames().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::Interp;

    struct MockVideo {
        frames: usize,
        fps: f64,
    }

    impl VideoSource for MockVideo {
        type Frame = usize;

        fn num_frames(&self) -> usize {
            self.frames
        }

        fn fps(&self) -> f64 {
            self.fps
        }

        fn get_frame(&mut self, index: usize) -> Option<usize> {
            (index < self.frames).then_some(index)
        }
    }

    fn video(frames: usize) -> MockVideo {
        MockVideo { frames, fps: 30.0 }
    }

    fn detected_session(frames: usize) -> EditSession<MockVideo> {
        let mut session = EditSession::blank(video(frames));
        session
            .edit(|tc| {
                for f in 0..frames {
                    let y = if f % 2 == 0 { 0.1 } else { -0.1 };
                    tc.add_det(0, f, [f as f64, y, 0.0], None, Interp::NONE)?;
                }
                tc.clear_undo();
                Ok(())
            })
            .unwrap();
        session
    }

    #[test]
    fn test_frame_count_must_match() {
        let tracks = TrackIo::blank(10);
        assert!(matches!(
            EditSession::new(video(12), tracks),
            Err(TrackError::LengthMismatch {
                expected: 12,
                found: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_seek_and_jog_clamp() {
        let mut session = EditSession::blank(video(5));
        assert_eq!(session.seek(3), 3);
        assert_eq!(session.frame(), Some(3));
        assert_eq!(session.jog(10), 4);
        assert_eq!(session.jog(-10), 0);
        assert_eq!(session.seek(99), 4);
    }

    #[test]
    fn test_select_track_validates() {
        let mut session = EditSession::blank(video(5));
        assert!(session.select_track(1).is_err());
        session.edit(|tc| tc.add_track(None)).unwrap();
        session.select_track(1).unwrap();
        assert_eq!(session.selected_track(), 1);

        session.edit(|tc| tc.remove_track(1)).unwrap();
        assert_eq!(session.selected_track(), 0);
    }

    #[test]
    fn test_filter_selected_then_undo() {
        let mut session = detected_session(60);
        let before = session.tracks()[0].clone();

        session
            .filter_selected(FilterRequest {
                position_cutoff_hz: Some(2.0),
                heading_cutoff_hz: None,
                order: 2,
            })
            .unwrap();
        assert!(session.is_mutated());
        assert_ne!(session.tracks()[0], before);

        assert!(session.undo());
        assert_eq!(session.tracks()[0], before);
        assert!(session.redo());
        assert_ne!(session.tracks()[0], before);
    }

    #[test]
    fn test_undo_break_on_selected_track() {
        let mut session = detected_session(10);
        let new_index = session.edit(|tc| tc.break_track(0, 4)).unwrap();
        session.select_track(new_index).unwrap();
        session.select_track(0).unwrap();

        assert!(session.undo());
        assert_eq!(session.tracks().num_tracks(), 1);
        assert_eq!(session.tracks()[0].num_detected(), 10);
        assert_eq!(session.selected_track(), 0);

        assert!(session.redo());
        assert_eq!(session.tracks().num_tracks(), 2);
        assert_eq!(session.tracks()[1].detected_indices(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_filter_selected_checks_both_first() {
        let mut session = detected_session(60);
        let before = session.tracks()[0].clone();
        let err = session.filter_selected(FilterRequest {
            position_cutoff_hz: Some(2.0),
            heading_cutoff_hz: Some(20.0),
            order: 2,
        });
        assert!(matches!(err, Err(TrackError::InvalidFilter(_))));
        assert_eq!(session.tracks()[0], before);
        assert!(!session.tracks()[0].can_undo());
    }

    #[test]
    fn test_save_as_appends_extension_and_clears_mutated() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = detected_session(8);
        assert!(matches!(session.save(), Err(PersistError::NoSavePath)));

        let path = session.save_as(dir.path().join("clip")).unwrap();
        assert_eq!(path, dir.path().join("clip.npz"));
        assert!(!session.is_mutated());

        let reopened = EditSession::open(video(8), &path).unwrap();
        assert_eq!(reopened.tracks()[0].num_detected(), 8);
        assert_eq!(reopened.save_path(), Some(path.as_path()));
    }
}
