//! One composite-and-recognize cycle.

use crate::snapshot::SessionSnapshots;
use doorwatch_core::{
    ComposeError, DetectionCrop, FaceMatch, FaceSearch, ImageCompositor, SearchError,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("compose: {0}")]
    Compose(#[from] ComposeError),
    #[error("search: {0}")]
    Search(#[from] SearchError),
}

/// Result of a recognition attempt. `NoMatch` and `Failure` are both retried
/// by the session; they differ only in how they are logged.
#[derive(Debug)]
pub enum RecognitionOutcome {
    Success(FaceMatch),
    NoMatch,
    Failure(AttemptError),
}

/// Composes a batch of crops and searches the composite.
#[derive(Clone)]
pub struct RecognitionAttempt {
    compositor: Arc<dyn ImageCompositor>,
    search: Arc<dyn FaceSearch>,
}

impl RecognitionAttempt {
    pub fn new(compositor: Arc<dyn ImageCompositor>, search: Arc<dyn FaceSearch>) -> Self {
        Self { compositor, search }
    }

    /// Run one attempt. The composite is also written to `snapshots` when
    /// debug snapshots are enabled.
    pub async fn run(
        &self,
        crops: Vec<DetectionCrop>,
        snapshots: Option<&SessionSnapshots>,
    ) -> RecognitionOutcome {
        tracing::info!(faces = crops.len(), "composing faces");
        let composite = match self.compositor.compose(crops).await {
            Ok(image) => image,
            Err(e) => return RecognitionOutcome::Failure(e.into()),
        };
        tracing::debug!(bytes = composite.len(), "composite ready");

        if let Some(snapshots) = snapshots {
            snapshots.write(composite.clone(), "comp");
        }

        match self.search.search(&composite).await {
            Ok(Some(result)) => RecognitionOutcome::Success(result),
            Ok(None) => RecognitionOutcome::NoMatch,
            Err(e) => RecognitionOutcome::Failure(e.into()),
        }
    }
}
