//! In-memory collaborators for session, router and HTTP tests.

use crate::attempt::RecognitionAttempt;
use crate::engine::CaptureEngine;
use crate::session::SessionConfig;
use async_trait::async_trait;
use doorwatch_core::{
    ComposeError, DetectionCrop, DetectorError, FaceDetector, FaceMatch, FaceSearch,
    ImageCompositor, SearchError, WebhookError, WebhookPayload, WebhookSender,
};
use doorwatch_hw::{Camera, CameraError, Frame, LiveStream, StreamControl, StreamOptions};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub fn jpeg_frame() -> Vec<u8> {
    vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46]
}

pub fn face_match(face_id: &str) -> FaceMatch {
    FaceMatch {
        face_id: face_id.to_string(),
        image_id: Some(format!("{face_id}-image")),
        external_image_id: None,
    }
}

#[derive(Clone)]
enum Feed {
    Repeating(Vec<u8>),
    Silent,
    Finite(Vec<Vec<u8>>),
    Broken,
}

pub struct FakeCamera {
    feed: Feed,
    opens: AtomicUsize,
    stops: Arc<AtomicUsize>,
}

impl FakeCamera {
    /// Emits `frame` at the requested fps until stopped.
    pub fn repeating(frame: Vec<u8>) -> Self {
        Self::with_feed(Feed::Repeating(frame))
    }

    /// Keeps the stream open without emitting anything.
    pub fn silent() -> Self {
        Self::with_feed(Feed::Silent)
    }

    /// Emits `frames` then ends the stream.
    pub fn finite(frames: Vec<Vec<u8>>) -> Self {
        Self::with_feed(Feed::Finite(frames))
    }

    pub fn broken() -> Self {
        Self::with_feed(Feed::Broken)
    }

    fn with_feed(feed: Feed) -> Self {
        Self {
            feed,
            opens: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

struct FakeControl {
    stop_tx: oneshot::Sender<()>,
    stops: Arc<AtomicUsize>,
}

impl StreamControl for FakeControl {
    fn stop(self: Box<Self>) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        let _ = self.stop_tx.send(());
    }
}

#[async_trait]
impl Camera for FakeCamera {
    fn name(&self) -> &str {
        "fake"
    }

    async fn stream_video(&self, options: StreamOptions) -> Result<LiveStream, CameraError> {
        if matches!(self.feed, Feed::Broken) {
            return Err(CameraError::OpenFailed("camera offline".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(options.channel_capacity);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let interval = Duration::from_millis(1000 / u64::from(options.fps.max(1)));
        let feed = self.feed.clone();

        tokio::spawn(async move {
            match feed {
                Feed::Repeating(data) => {
                    let mut sequence = 0u32;
                    loop {
                        tokio::select! {
                            _ = &mut stop_rx => break,
                            () = tokio::time::sleep(interval) => {}
                        }
                        if let Err(mpsc::error::TrySendError::Closed(_)) =
                            tx.try_send(Frame::new(data.clone(), sequence))
                        {
                            break;
                        }
                        sequence += 1;
                    }
                }
                Feed::Silent => {
                    let _ = stop_rx.await;
                    drop(tx);
                }
                Feed::Finite(frames) => {
                    for (sequence, data) in (0u32..).zip(frames) {
                        if tx.send(Frame::new(data, sequence)).await.is_err() {
                            break;
                        }
                    }
                }
                Feed::Broken => {}
            }
        });

        Ok(LiveStream {
            frames: rx,
            control: Box::new(FakeControl {
                stop_tx,
                stops: self.stops.clone(),
            }),
        })
    }
}

#[derive(Clone, Copy)]
enum Detection {
    Always,
    Never,
    Failing,
    Flaky,
    Stalled(Duration),
}

pub struct FakeDetector {
    mode: Detection,
    inputs: Mutex<Vec<Vec<u8>>>,
}

impl FakeDetector {
    pub fn always_face() -> Self {
        Self::with_mode(Detection::Always)
    }

    pub fn never_face() -> Self {
        Self::with_mode(Detection::Never)
    }

    /// Every call is a transport-level error.
    pub fn failing() -> Self {
        Self::with_mode(Detection::Failing)
    }

    /// Errors on the 1st, 3rd, 5th... call and finds a face otherwise.
    pub fn flaky() -> Self {
        Self::with_mode(Detection::Flaky)
    }

    /// Finds a face, but only after `delay`.
    pub fn stalled(delay: Duration) -> Self {
        Self::with_mode(Detection::Stalled(delay))
    }

    fn with_mode(mode: Detection) -> Self {
        Self {
            mode,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl FaceDetector for FakeDetector {
    async fn detect(&self, frame: &[u8]) -> Result<Option<DetectionCrop>, DetectorError> {
        let call = {
            let mut inputs = self.inputs.lock().unwrap();
            inputs.push(frame.to_vec());
            inputs.len()
        };
        let unavailable = || DetectorError::Config("detector unavailable".into());
        match self.mode {
            Detection::Always => Ok(Some(DetectionCrop(frame.to_vec()))),
            Detection::Never => Ok(None),
            Detection::Failing => Err(unavailable()),
            Detection::Flaky if call % 2 == 1 => Err(unavailable()),
            Detection::Flaky => Ok(Some(DetectionCrop(frame.to_vec()))),
            Detection::Stalled(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Some(DetectionCrop(frame.to_vec())))
            }
        }
    }
}

/// Replies with scripted results in order; errors once the script runs out.
pub struct FakeSearch {
    script: Mutex<VecDeque<Result<Option<FaceMatch>, SearchError>>>,
    inputs: Mutex<Vec<Vec<u8>>>,
    delay: Option<Duration>,
}

impl FakeSearch {
    pub fn new(script: Vec<Result<Option<FaceMatch>, SearchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            inputs: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Answer each search only after `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl FaceSearch for FakeSearch {
    async fn search(&self, image: &[u8]) -> Result<Option<FaceMatch>, SearchError> {
        self.inputs.lock().unwrap().push(image.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SearchError::Api("no scripted response".into())))
    }
}

pub struct FakeCompositor {
    output: Option<Vec<u8>>,
    inputs: Mutex<Vec<Vec<DetectionCrop>>>,
}

impl FakeCompositor {
    pub fn new(output: Vec<u8>) -> Self {
        Self {
            output: Some(output),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<Vec<DetectionCrop>> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageCompositor for FakeCompositor {
    async fn compose(&self, images: Vec<DetectionCrop>) -> Result<Vec<u8>, ComposeError> {
        self.inputs.lock().unwrap().push(images);
        self.output
            .clone()
            .ok_or_else(|| ComposeError::Join("compositor unavailable".into()))
    }
}

pub struct FakeWebhook {
    fail: bool,
    attempts: AtomicUsize,
    payloads: Mutex<Vec<WebhookPayload>>,
}

impl FakeWebhook {
    pub fn new() -> Self {
        Self {
            fail: false,
            attempts: AtomicUsize::new(0),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Payloads that were delivered successfully.
    pub fn payloads(&self) -> Vec<WebhookPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for FakeWebhook {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), WebhookError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WebhookError::Rejected {
                status: 500,
                body: "Error Message".into(),
            });
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// A full set of fakes wired into a [`CaptureEngine`].
pub struct Rig {
    pub camera: Arc<FakeCamera>,
    pub detector: Arc<FakeDetector>,
    pub search: Arc<FakeSearch>,
    pub compositor: Arc<FakeCompositor>,
    pub webhook: Arc<FakeWebhook>,
    pub config: SessionConfig,
}

impl Rig {
    pub fn new(
        camera: FakeCamera,
        detector: FakeDetector,
        search: FakeSearch,
        config: SessionConfig,
    ) -> Self {
        Self {
            camera: Arc::new(camera),
            detector: Arc::new(detector),
            search: Arc::new(search),
            compositor: Arc::new(FakeCompositor::new(b"composite".to_vec())),
            webhook: Arc::new(FakeWebhook::new()),
            config,
        }
    }

    pub fn engine(&self) -> CaptureEngine {
        CaptureEngine::new(
            self.camera.clone(),
            self.detector.clone(),
            RecognitionAttempt::new(self.compositor.clone(), self.search.clone()),
            self.webhook.clone(),
            self.config.clone(),
        )
    }
}
