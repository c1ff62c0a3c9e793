//! Live camera streams via an `ffmpeg` child process.
//!
//! A stream is opened with [`Camera::stream_video`], which returns the frame
//! receiver together with a [`StreamControl`] that tears the stream down.
//! Frames are pushed by a reader task; when the consumer falls behind, the
//! newest frames are dropped rather than buffered without bound.

use crate::frame::{Frame, JpegSplitter};
use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

const READ_CHUNK: usize = 64 * 1024;
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },
    #[error("stream has no stdout pipe")]
    NoStdout,
    #[error("stream open failed: {0}")]
    OpenFailed(String),
}

/// Parameters for opening a live stream.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Approximate output frame rate.
    pub fps: u32,
    /// Transcode arguments placed after the input.
    pub output_args: Vec<String>,
    /// Frames buffered between the reader and the consumer.
    pub channel_capacity: usize,
}

impl StreamOptions {
    /// MJPEG frames on stdout at `fps`, no audio.
    pub fn mjpeg(fps: u32) -> Self {
        let fps_filter = format!("fps={fps}");
        let output_args = [
            "-vf",
            fps_filter.as_str(),
            "-an",
            "-f",
            "image2pipe",
            "-vcodec",
            "mjpeg",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        Self {
            fps,
            output_args,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Stops a live stream. Consumed by `stop`, so a stream is stopped at most once.
pub trait StreamControl: Send {
    fn stop(self: Box<Self>);
}

/// An open stream: frames in arrival order plus the means to stop it.
pub struct LiveStream {
    pub frames: mpsc::Receiver<Frame>,
    pub control: Box<dyn StreamControl>,
}

/// A camera that can open live video streams.
#[async_trait]
pub trait Camera: Send + Sync {
    fn name(&self) -> &str;

    async fn stream_video(&self, options: StreamOptions) -> Result<LiveStream, CameraError>;
}

/// Camera reached through any input `ffmpeg` understands (RTSP, HTTP, files).
pub struct FfmpegCamera {
    name: String,
    ffmpeg_path: String,
    input_url: String,
}

impl FfmpegCamera {
    pub fn new(
        name: impl Into<String>,
        ffmpeg_path: impl Into<String>,
        input_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            ffmpeg_path: ffmpeg_path.into(),
            input_url: input_url.into(),
        }
    }

    /// Full ffmpeg argument list for the given options.
    pub fn build_args(&self, options: &StreamOptions) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        if self.input_url.starts_with("rtsp://") || self.input_url.starts_with("rtsps://") {
            args.push("-rtsp_transport".into());
            args.push("tcp".into());
        }
        args.push("-i".into());
        args.push(self.input_url.clone());
        args.extend(options.output_args.iter().cloned());
        args
    }
}

#[async_trait]
impl Camera for FfmpegCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_video(&self, options: StreamOptions) -> Result<LiveStream, CameraError> {
        let args = self.build_args(&options);
        tracing::debug!(program = %self.ffmpeg_path, ?args, "spawning stream");

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CameraError::SpawnFailed {
                program: self.ffmpeg_path.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take().ok_or(CameraError::NoStdout)?;

        if let Some(stderr) = child.stderr.take() {
            let camera = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(camera = %camera, "ffmpeg: {line}");
                }
            });
        }

        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let camera = self.name.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            let mut splitter = JpegSplitter::new();
            let mut sequence = 0u32;

            'read: loop {
                tokio::select! {
                    // Fires on stop() and when the control is dropped.
                    _ = &mut stop_rx => break 'read,
                    read = stdout.read(&mut buf) => match read {
                        Ok(0) => {
                            tracing::info!(camera = %camera, frames = sequence, "stream ended");
                            break 'read;
                        }
                        Ok(n) => {
                            for image in splitter.push(&buf[..n]) {
                                match tx.try_send(Frame::new(image, sequence)) {
                                    Ok(()) => {}
                                    Err(TrySendError::Full(frame)) => {
                                        tracing::debug!(
                                            sequence = frame.sequence,
                                            "consumer busy; frame dropped"
                                        );
                                    }
                                    Err(TrySendError::Closed(_)) => break 'read,
                                }
                                sequence = sequence.wrapping_add(1);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(camera = %camera, error = %e, "stream read failed");
                            break 'read;
                        }
                    },
                }
            }

            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
            tracing::debug!(camera = %camera, "stream reader exiting");
        });

        Ok(LiveStream {
            frames: rx,
            control: Box::new(FfmpegStreamControl { stop_tx }),
        })
    }
}

struct FfmpegStreamControl {
    stop_tx: oneshot::Sender<()>,
}

impl StreamControl for FfmpegStreamControl {
    fn stop(self: Box<Self>) {
        // The reader may already be gone if ffmpeg exited on its own.
        let _ = self.stop_tx.send(());
    }
}
