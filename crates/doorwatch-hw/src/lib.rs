//! doorwatch-hw: Camera stream abstraction.
//!
//! Opens live video streams through an `ffmpeg` child process and splits
//! its MJPEG output into individual frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, FfmpegCamera, LiveStream, StreamControl, StreamOptions};
pub use frame::{is_jpeg, Frame};
