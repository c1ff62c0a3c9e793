use crate::attempt::RecognitionAttempt;
use crate::session::{CaptureSession, SessionConfig, SessionError, SessionOutcome};
use crate::snapshot::SnapshotDir;
use doorwatch_core::{FaceDetector, WebhookSender};
use doorwatch_hw::Camera;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Clone-safe handle to everything a capture session needs.
///
/// Each motion trigger starts an independent session; sessions share the
/// collaborators but no mutable state.
#[derive(Clone)]
pub struct CaptureEngine {
    camera: Arc<dyn Camera>,
    detector: Arc<dyn FaceDetector>,
    attempt: RecognitionAttempt,
    webhook: Arc<dyn WebhookSender>,
    snapshots: Option<SnapshotDir>,
    config: SessionConfig,
}

impl CaptureEngine {
    pub fn new(
        camera: Arc<dyn Camera>,
        detector: Arc<dyn FaceDetector>,
        attempt: RecognitionAttempt,
        webhook: Arc<dyn WebhookSender>,
        config: SessionConfig,
    ) -> Self {
        Self {
            camera,
            detector,
            attempt,
            webhook,
            snapshots: None,
            config,
        }
    }

    /// Write per-session debug snapshots under `dir`.
    pub fn with_snapshots(mut self, dir: Option<SnapshotDir>) -> Self {
        self.snapshots = dir;
        self
    }

    /// Open the camera stream and run a session in the background.
    ///
    /// The returned handle resolves with the session outcome once the
    /// stream has been stopped.
    pub async fn start_session(&self) -> Result<JoinHandle<SessionOutcome>, SessionError> {
        CaptureSession::start(self.clone()).await
    }

    pub fn camera(&self) -> &Arc<dyn Camera> {
        &self.camera
    }

    pub fn detector(&self) -> &Arc<dyn FaceDetector> {
        &self.detector
    }

    pub fn attempt(&self) -> &RecognitionAttempt {
        &self.attempt
    }

    pub fn webhook(&self) -> &Arc<dyn WebhookSender> {
        &self.webhook
    }

    pub fn snapshots(&self) -> Option<&SnapshotDir> {
        self.snapshots.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
