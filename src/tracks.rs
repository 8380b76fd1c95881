mod butterworth;
mod collection;
mod history;
mod table;
mod track;
pub mod vector;

pub use butterworth::Butterworth;
pub use collection::TrackCollection;
pub use history::UndoHistory;
pub use table::{TrackPoint, TrackTable};
pub use track::{Interp, Track, TrackBuilder};
