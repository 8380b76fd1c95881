//! Trait for the video a collection of tracks is drawn over.

/// A decoded video, consumed by [`crate::EditSession`].
///
/// # Example
///
/// ```ignore
/// use fixtrack::VideoSource;
///
/// struct Clip {
///     frames: Vec<Vec<u8>>,
/// }
///
/// impl VideoSource for Clip {
///     type Frame = Vec<u8>;
///
///     fn num_frames(&self) -> usize {
///         self.frames.len()
///     }
///
///     fn fps(&self) -> f64 {
///         30.0
///     }
///
///     fn get_frame(&mut self, index: usize) -> Option<Vec<u8>> {
///         self.frames.get(index).cloned()
///     }
/// }
/// ```
pub trait VideoSource {
    /// Decoded image type.
    type Frame;

    /// Total number of frames. Every track in the session has this length.
    fn num_frames(&self) -> usize;

    /// Frame rate in Hz, used as the sample rate when filtering.
    fn fps(&self) -> f64;

    /// Decode frame `index`, or `None` when it cannot be read.
    fn get_frame(&mut self, index: usize) -> Option<Self::Frame>;
}
