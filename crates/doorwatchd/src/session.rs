//! Capture session state machine.
//!
//! A session owns one live stream from start to termination:
//!
//! ```text
//! Idle -> Streaming <-> Evaluating -> Terminated
//! ```
//!
//! Frames are handled one at a time in arrival order. While a batch is being
//! evaluated, later frames wait in the stream's bounded queue and are only
//! looked at after the accumulator has been reset. A single deadline, armed
//! when the stream opens, races the whole capture loop; whichever finishes
//! first decides the outcome and the stream is stopped exactly once.

use crate::accumulator::{FaceAccumulator, FrameFilter};
use crate::attempt::RecognitionOutcome;
use crate::engine::CaptureEngine;
use crate::snapshot::SessionSnapshots;
use doorwatch_core::{DetectionCrop, FaceMatch, WebhookPayload};
use doorwatch_hw::{CameraError, Frame, LiveStream, StreamOptions};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Tunables for every capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Face crops gathered before a recognition attempt.
    pub face_count: usize,
    /// Recognition attempts allowed per session.
    pub max_retries: u32,
    /// Requested stream frame rate.
    pub fps: u32,
    /// Wall-clock limit measured from stream start.
    pub timeout: Duration,
    /// Frames discarded at stream start before filtering.
    pub warmup_frames: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            face_count: 3,
            max_retries: 2,
            fps: 3,
            timeout: Duration::from_millis(15_000),
            warmup_frames: 0,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("stream could not be started: {0}")]
    Camera(#[from] CameraError),
}

/// How a session terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Recognized(FaceMatch),
    RetriesExhausted { attempts: u32 },
    TimedOut,
    StreamEnded,
}

pub struct CaptureSession {
    id: Uuid,
    engine: CaptureEngine,
    filter: FrameFilter,
    accumulator: FaceAccumulator,
    retry_count: u32,
    frames_seen: usize,
    snapshots: Option<SessionSnapshots>,
}

impl CaptureSession {
    /// Open the stream and spawn the session.
    ///
    /// Fails without spawning anything if the stream cannot be started.
    pub async fn start(
        engine: CaptureEngine,
    ) -> Result<JoinHandle<SessionOutcome>, SessionError> {
        let id = Uuid::new_v4();
        let span =
            tracing::info_span!("capture", session_id = %id, camera = engine.camera().name());

        let config = engine.config().clone();
        let stream = engine
            .camera()
            .stream_video(StreamOptions::mjpeg(config.fps))
            .instrument(span.clone())
            .await?;
        let deadline = Instant::now() + config.timeout;
        tracing::info!(
            parent: &span,
            fps = config.fps,
            timeout_ms = config.timeout.as_millis() as u64,
            "stream started"
        );

        let snapshots = match engine.snapshots() {
            Some(dir) => dir.session(id).instrument(span.clone()).await,
            None => None,
        };
        if let Some(snapshots) = &snapshots {
            tracing::debug!(parent: &span, dir = %snapshots.dir().display(), "writing snapshots");
        }

        let session = Self {
            id,
            filter: FrameFilter,
            accumulator: FaceAccumulator::new(config.face_count),
            retry_count: 0,
            frames_seen: 0,
            snapshots,
            engine,
        };
        Ok(tokio::spawn(session.run(stream, deadline).instrument(span)))
    }

    async fn run(mut self, stream: LiveStream, deadline: Instant) -> SessionOutcome {
        let LiveStream { mut frames, control } = stream;

        let outcome = tokio::select! {
            biased;
            () = tokio::time::sleep_until(deadline) => SessionOutcome::TimedOut,
            outcome = self.capture(&mut frames) => outcome,
        };

        // Terminated: the deadline and any in-flight call are gone with the select.
        control.stop();
        drop(frames);

        match &outcome {
            SessionOutcome::Recognized(result) => {
                tracing::info!(face_id = %result.face_id, "face recognized");
                self.notify(result.clone()).await;
            }
            SessionOutcome::RetriesExhausted { attempts } => {
                tracing::warn!(attempts, "recognition retries exhausted");
            }
            SessionOutcome::TimedOut => {
                tracing::warn!(attempts = self.retry_count, "capture timed out");
                if !self.accumulator.is_empty() {
                    tracing::debug!(faces = self.accumulator.len(), "partial batch discarded");
                }
            }
            SessionOutcome::StreamEnded => {
                tracing::warn!(frames = self.frames_seen, "stream ended before recognition");
            }
        }
        tracing::info!(session_id = %self.id, "capture session finished");
        outcome
    }

    /// Streaming/Evaluating loop. Returns once the session has an outcome
    /// other than a timeout.
    async fn capture(&mut self, frames: &mut mpsc::Receiver<Frame>) -> SessionOutcome {
        let config = self.engine.config().clone();

        while let Some(frame) = frames.recv().await {
            self.frames_seen += 1;
            if self.frames_seen <= config.warmup_frames {
                tracing::trace!(sequence = frame.sequence, "warmup frame discarded");
                continue;
            }

            if !self.filter.accept(&frame, &self.accumulator) {
                tracing::debug!(
                    sequence = frame.sequence,
                    bytes = frame.data.len(),
                    "frame rejected by filter"
                );
                continue;
            }

            let Some(crop) = self.detect(&frame).await else {
                continue;
            };
            self.accumulator.append(crop);
            tracing::info!(
                faces = self.accumulator.len(),
                target = self.accumulator.target(),
                "face collected"
            );
            if !self.accumulator.is_full() {
                continue;
            }

            // Evaluating
            let crops = self.accumulator.drain_all();
            match self.engine.attempt().run(crops, self.snapshots.as_ref()).await {
                RecognitionOutcome::Success(result) => return SessionOutcome::Recognized(result),
                RecognitionOutcome::NoMatch => {
                    tracing::info!("no matching face in collection");
                }
                RecognitionOutcome::Failure(e) => {
                    tracing::warn!(error = %e, "recognition attempt failed");
                }
            }

            self.retry_count += 1;
            if self.retry_count >= config.max_retries {
                return SessionOutcome::RetriesExhausted {
                    attempts: self.retry_count,
                };
            }
            self.accumulator.reset();
            tracing::info!(
                attempt = self.retry_count,
                max_retries = config.max_retries,
                "collecting a fresh batch"
            );
        }

        SessionOutcome::StreamEnded
    }

    async fn detect(&self, frame: &Frame) -> Option<DetectionCrop> {
        tracing::debug!(sequence = frame.sequence, bytes = frame.data.len(), "detecting face");
        let result = self.engine.detector().detect(&frame.data).await;

        if let Some(snapshots) = &self.snapshots {
            let suffix = if matches!(result, Ok(Some(_))) { "ok" } else { "ng" };
            snapshots.write(frame.data.clone(), suffix);
        }

        match result {
            Ok(Some(crop)) => Some(crop),
            Ok(None) => {
                tracing::debug!(sequence = frame.sequence, "no face detected");
                None
            }
            Err(e) => {
                tracing::warn!(
                    sequence = frame.sequence,
                    error = %e,
                    "face detection failed; frame skipped"
                );
                None
            }
        }
    }

    async fn notify(&self, result: FaceMatch) {
        let payload = WebhookPayload::Recognition { result };
        match self.engine.webhook().send(&payload).await {
            Ok(()) => tracing::info!("recognition webhook delivered"),
            Err(e) => tracing::error!(error = %e, "recognition webhook failed"),
        }
    }
}
