use serde::{Deserialize, Serialize};

/// Face crop returned by the detector for a frame that contains a face.
#[derive(Clone, PartialEq, Eq)]
pub struct DetectionCrop(pub Vec<u8>);

impl DetectionCrop {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for DetectionCrop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DetectionCrop({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for DetectionCrop {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A positive face-search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMatch {
    pub face_id: String,
    pub image_id: Option<String>,
    /// Caller-supplied id attached to the indexed face; serialized as `null` when absent.
    pub external_image_id: Option<String>,
}

/// Push notification category as reported by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Motion,
    Ding,
    Unknown,
}

impl NotificationCategory {
    /// Classify a raw category string.
    ///
    /// Accepts the short names and the vendor push actions
    /// (`com.ring.push.HANDLE_NEW_motion`, `com.ring.push.HANDLE_NEW_DING`).
    pub fn parse(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        let name = lower.strip_prefix("com.ring.push.handle_new_").unwrap_or(&lower);
        match name {
            "motion" => Self::Motion,
            "ding" => Self::Ding,
            _ => Self::Unknown,
        }
    }
}

/// Camera notification as delivered by the notification source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub category: String,
}

impl Notification {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }

    pub fn kind(&self) -> NotificationCategory {
        NotificationCategory::parse(&self.category)
    }
}

/// Notification event name carried in a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationEvent {
    Motion,
    Ding,
}

/// JSON body POSTed to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookPayload {
    Notification { event: NotificationEvent },
    Recognition { result: FaceMatch },
}
