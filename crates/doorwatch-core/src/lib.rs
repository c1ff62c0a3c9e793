//! doorwatch-core: Face recognition pipeline clients.
//!
//! Thin async clients for the face-detector API, the face-search service,
//! image compositing and webhook delivery, each behind a trait so the
//! capture state machine can be driven with fakes.

pub mod compositor;
pub mod detector;
pub mod recognizer;
pub mod types;
pub mod webhook;

pub use compositor::{ComposeError, ImageCompositor, VerticalCompositor};
pub use detector::{DetectParams, DetectorError, FaceDetector, HttpFaceDetector};
pub use recognizer::{FaceSearch, RekognitionSearch, SearchError};
pub use types::{
    DetectionCrop, FaceMatch, Notification, NotificationCategory, NotificationEvent, WebhookPayload,
};
pub use webhook::{HttpWebhook, WebhookError, WebhookSender};
