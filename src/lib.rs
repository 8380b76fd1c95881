//! Track data model and edit engine for correcting multi-object motion
//! tracks over video.
//!
//! A [`TrackCollection`] holds one [`Track`] per tracked object, each with a
//! position, a unit heading and detection flags for every frame. Edits are
//! undoable, gaps can be interpolated, and detected frames can be smoothed
//! with a zero-phase Butterworth low-pass. [`TrackIo`] reads and writes
//! collections, and [`EditSession`] ties a collection to a [`VideoSource`].

pub mod config;
pub mod error;
pub mod integration;
pub mod track_io;
pub mod tracks;

pub use config::{DragFalloff, FilterSettings, TrackConfig};
pub use error::{ConfigError, PersistError, Result, TrackError};
pub use integration::{EditSession, FilterRequest, VideoSource};
pub use track_io::{TrackIo, expand_path};
pub use tracks::{
    Butterworth, Interp, Track, TrackBuilder, TrackCollection, TrackPoint, TrackTable,
    UndoHistory,
};
pub use tracks::vector::color_from_index;
