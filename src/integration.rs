//! Binding the track engine to a video and an editing front end.
//!
//! The engine never decodes video itself; a front end supplies frames through
//! [`VideoSource`] and drives edits through [`EditSession`].

mod session;
mod video;

pub use session::{EditSession, FilterRequest};
pub use video::VideoSource;
