//! Reading and writing track collections as `.npz` archives.
//!
//! The archive holds five `[num_tracks, num_frames]` members: `X`, `Y`, `HX`,
//! `HY` (`float32`) and `det` (`uint8`). Z components are not stored; tracks
//! come back planar with re-normalized headings.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayView2};
use ndarray_npy::{NpzReader, NpzWriter};
use tracing::{debug, info};

use crate::config::TrackConfig;
use crate::error::PersistError;
use crate::tracks::{Track, TrackCollection, vector};

const FIELDS: [&str; 5] = ["X", "Y", "HX", "HY", "det"];

/// Persistence adapter for [`TrackCollection`].
pub struct TrackIo;

impl TrackIo {
    /// Write `tracks` to `path`, replacing any existing file.
    ///
    /// The archive is written to a sibling temporary file and renamed into
    /// place, so a failed save never leaves a truncated file at `path`.
    pub fn save(path: impl AsRef<Path>, tracks: &TrackCollection) -> Result<(), PersistError> {
        let path = expand_path(path)?;
        let tmp = temp_sibling(&path);

        let result = Self::write_archive(&tmp, tracks).and_then(|()| {
            fs::rename(&tmp, &path)?;
            Ok(())
        });
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result?;

        info!(
            path = %path.display(),
            num_tracks = tracks.num_tracks(),
            num_frames = tracks.num_frames(),
            "saved track file"
        );
        Ok(())
    }

    /// Load a collection using the default configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<TrackCollection, PersistError> {
        Self::load_with(path, TrackConfig::default())
    }

    /// Load a collection whose tracks use `config`.
    pub fn load_with(
        path: impl AsRef<Path>,
        config: TrackConfig,
    ) -> Result<TrackCollection, PersistError> {
        config.validate()?;
        let path = expand_path(path)?;
        if !path.is_file() {
            return Err(PersistError::malformed(&path, "file does not exist"));
        }

        let file = File::open(&path)?;
        let mut npz = NpzReader::new(file)
            .map_err(|e| PersistError::malformed(&path, format!("not an npz archive: {e}")))?;
        let names = npz
            .names()
            .map_err(|e| PersistError::malformed(&path, e.to_string()))?;

        let mut read_f32 = |field: &str| -> Result<Array2<f32>, PersistError> {
            let member = member_name(&names, field)
                .ok_or_else(|| PersistError::malformed(&path, format!("missing field {field}")))?;
            npz.by_name(member)
                .map_err(|e| PersistError::malformed(&path, format!("field {field}: {e}")))
        };
        let x = read_f32("X")?;
        let y = read_f32("Y")?;
        let hx = read_f32("HX")?;
        let hy = read_f32("HY")?;

        let det_member = member_name(&names, "det")
            .ok_or_else(|| PersistError::malformed(&path, "missing field det"))?;
        let det: Array2<u8> = npz
            .by_name(det_member)
            .map_err(|e| PersistError::malformed(&path, format!("field det: {e}")))?;

        if x.dim() != y.dim() {
            return Err(PersistError::malformed(
                &path,
                format!("X shape {:?} does not match Y shape {:?}", x.dim(), y.dim()),
            ));
        }
        if hx.dim() != hy.dim() {
            return Err(PersistError::malformed(
                &path,
                format!("HX shape {:?} does not match HY shape {:?}", hx.dim(), hy.dim()),
            ));
        }
        if x.dim() != hx.dim() {
            return Err(PersistError::malformed(
                &path,
                format!(
                    "position shape {:?} does not match heading shape {:?}",
                    x.dim(),
                    hx.dim()
                ),
            ));
        }
        if det.dim() != x.dim() {
            return Err(PersistError::malformed(
                &path,
                format!(
                    "det shape {:?} does not match position shape {:?}",
                    det.dim(),
                    x.dim()
                ),
            ));
        }

        let (num_tracks, num_frames) = x.dim();
        if num_tracks == 0 {
            return Err(PersistError::malformed(&path, "file contains no tracks"));
        }

        let fallback = config.unit_default_heading();
        let mut tracks = Vec::with_capacity(num_tracks);
        for t in 0..num_tracks {
            let position = planar(x.view(), y.view(), t);
            let mut heading = planar(hx.view(), hy.view(), t);
            vector::normalize_rows(&mut heading, fallback);
            let detected: Array1<bool> = det.row(t).mapv(|d| d != 0);
            let track = Track::builder(position)
                .heading(heading)
                .detected(detected)
                .config(&config)
                .build()?;
            tracks.push(track);
        }
        let collection = TrackCollection::with_config(tracks, config)?;

        info!(
            path = %path.display(),
            num_frames,
            num_tracks,
            "loaded track file"
        );
        Ok(collection)
    }

    /// A single all-undetected track of `num_frames` frames, for a video that
    /// has no track file yet.
    pub fn blank(num_frames: usize) -> TrackCollection {
        TrackCollection::single_blank(num_frames, TrackConfig::default())
    }

    fn write_archive(path: &Path, tracks: &TrackCollection) -> Result<(), PersistError> {
        let shape = (tracks.num_tracks(), tracks.num_frames());
        let mut x = Array2::<f32>::zeros(shape);
        let mut y = Array2::<f32>::zeros(shape);
        let mut hx = Array2::<f32>::zeros(shape);
        let mut hy = Array2::<f32>::zeros(shape);
        let mut det = Array2::<u8>::zeros(shape);

        for (t, track) in tracks.iter().enumerate() {
            let position = track.positions();
            let heading = track.headings();
            for f in 0..tracks.num_frames() {
                x[[t, f]] = position[[f, 0]] as f32;
                y[[t, f]] = position[[f, 1]] as f32;
                hx[[t, f]] = heading[[f, 0]] as f32;
                hy[[t, f]] = heading[[f, 1]] as f32;
                det[[t, f]] = u8::from(track.detected()[f]);
            }
        }

        let mut npz = NpzWriter::new(BufWriter::new(File::create(path)?));
        npz.add_array(FIELDS[0], &x)?;
        npz.add_array(FIELDS[1], &y)?;
        npz.add_array(FIELDS[2], &hx)?;
        npz.add_array(FIELDS[3], &hy)?;
        npz.add_array(FIELDS[4], &det)?;
        let file = npz
            .finish()?
            .into_inner()
            .map_err(|e| PersistError::Io(e.into_error()))?;
        file.sync_all()?;
        debug!(path = %path.display(), "wrote track archive");
        Ok(())
    }
}

/// Expand a leading `~` to the home directory and make the path absolute.
pub fn expand_path(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?
            .join(rest),
        Err(_) => path.to_path_buf(),
    };
    std::path::absolute(expanded)
}

/// Archive member for `field`, stored with or without the `.npy` suffix.
fn member_name<'a>(names: &'a [String], field: &str) -> Option<&'a str> {
    names
        .iter()
        .find(|n| n.strip_suffix(".npy").unwrap_or(n) == field)
        .map(String::as_str)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// `[num_frames, 3]` rows of track `t` with Z = 0.
fn planar(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>, t: usize) -> Array2<f64> {
    Array2::from_shape_fn((a.ncols(), 3), |(f, c)| match c {
        0 => f64::from(a[[t, f]]),
        1 => f64::from(b[[t, f]]),
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::tracks::Interp;
    use approx::assert_abs_diff_eq;

    fn sample_collection() -> TrackCollection {
        let mut tc = TrackCollection::blank(6, TrackConfig::default()).unwrap();
        tc.add_track(None).unwrap();
        tc.add_det(0, 1, [1.5, 2.25, 0.0], Some([0.0, 2.0, 0.0]), Interp::NONE)
            .unwrap();
        tc.add_det(0, 4, [3.0, -1.0, 0.0], None, Interp::NONE).unwrap();
        tc.add_det(1, 0, [10.0, 10.0, 0.0], Some([-1.0, 0.0, 0.0]), Interp::NONE)
            .unwrap();
        tc
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.npz");
        let tc = sample_collection();

        TrackIo::save(&path, &tc).unwrap();
        let loaded = TrackIo::load(&path).unwrap();

        assert_eq!(loaded.num_tracks(), 2);
        assert_eq!(loaded.num_frames(), 6);
        assert_eq!(loaded[0].detected_indices(), vec![1, 4]);
        assert_eq!(loaded[1].detected_indices(), vec![0]);

        let p = loaded[0].point(1).unwrap();
        assert_abs_diff_eq!(p.position[0], 1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(p.position[1], 2.25, epsilon = 1e-6);
        assert_abs_diff_eq!(p.heading[1], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(loaded[1].point(0).unwrap().heading[0], -1.0, epsilon = 1e-6);
        assert!(!loaded[0].can_undo());
        assert!(!dir.path().join("tracks.npz.tmp").exists());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.npz");
        TrackIo::save(&path, &sample_collection()).unwrap();
        TrackIo::save(&path, &TrackIo::blank(3)).unwrap();
        let loaded = TrackIo::load(&path).unwrap();
        assert_eq!(loaded.num_tracks(), 1);
        assert_eq!(loaded.num_frames(), 3);
    }

    #[test]
    fn test_missing_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrackIo::load(dir.path().join("absent.npz")).unwrap_err();
        assert!(matches!(err, PersistError::MalformedFile { .. }));
    }

    #[test]
    fn test_shape_disagreement_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("X", &Array2::<f32>::zeros((1, 4))).unwrap();
        npz.add_array("Y", &Array2::<f32>::zeros((1, 5))).unwrap();
        npz.add_array("HX", &Array2::<f32>::zeros((1, 4))).unwrap();
        npz.add_array("HY", &Array2::<f32>::zeros((1, 4))).unwrap();
        npz.add_array("det", &Array2::<u8>::zeros((1, 4))).unwrap();
        npz.finish().unwrap();

        match TrackIo::load(&path).unwrap_err() {
            PersistError::MalformedFile { reason, .. } => assert!(reason.contains("Y shape")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("X", &Array2::<f32>::zeros((1, 4))).unwrap();
        npz.finish().unwrap();

        match TrackIo::load(&path).unwrap_err() {
            PersistError::MalformedFile { reason, .. } => assert!(reason.contains("missing field")),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_zero_heading_becomes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("X", &Array2::<f32>::zeros((1, 2))).unwrap();
        npz.add_array("Y", &Array2::<f32>::zeros((1, 2))).unwrap();
        npz.add_array("HX", &Array2::<f32>::zeros((1, 2))).unwrap();
        npz.add_array("HY", &Array2::<f32>::zeros((1, 2))).unwrap();
        npz.add_array("det", &Array2::<u8>::ones((1, 2))).unwrap();
        npz.finish().unwrap();

        let loaded = TrackIo::load(&path).unwrap();
        assert_eq!(loaded[0].point(0).unwrap().heading, [1.0, 0.0, 0.0]);
        assert_eq!(loaded[0].num_detected(), 2);
    }

    #[test]
    fn test_load_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.npz");
        TrackIo::save(&path, &sample_collection()).unwrap();

        let config = TrackConfig {
            undo_depth: 0,
            ..TrackConfig::default()
        };
        assert!(matches!(
            TrackIo::load_with(&path, config),
            Err(PersistError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_expand_path() {
        let abs = expand_path("relative/file.npz").unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("relative/file.npz"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/t.npz").unwrap(), home.join("t.npz"));
        }
    }
}
