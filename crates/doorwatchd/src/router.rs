//! Notification routing.
//!
//! Motion starts a capture session and forwards a motion webhook; a doorbell
//! press forwards a ding webhook; anything else is ignored. The two motion
//! actions run concurrently and neither waits for the other.

use crate::engine::CaptureEngine;
use doorwatch_core::{
    Notification, NotificationCategory, NotificationEvent, WebhookPayload, WebhookSender,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Something that delivers camera notifications.
pub trait NotificationSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<Notification>;
}

/// In-process fan-out for notifications pushed over HTTP.
#[derive(Clone)]
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a notification. Returns how many subscribers received it.
    pub fn publish(&self, notification: Notification) -> usize {
        self.tx.send(notification).unwrap_or(0)
    }
}

impl NotificationSource for NotificationHub {
    fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

/// Background work started by one notification.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Capture session, from stream start to termination.
    pub capture: Option<JoinHandle<()>>,
    /// Notification webhook delivery.
    pub webhook: Option<JoinHandle<()>>,
}

impl Dispatch {
    pub fn is_empty(&self) -> bool {
        self.capture.is_none() && self.webhook.is_none()
    }

    pub fn is_finished(&self) -> bool {
        [&self.capture, &self.webhook]
            .into_iter()
            .flatten()
            .all(|handle| handle.is_finished())
    }

    /// Wait for everything this notification started.
    pub async fn join(self) {
        for handle in [self.capture, self.webhook].into_iter().flatten() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "dispatch task panicked");
            }
        }
    }
}

pub struct NotificationRouter {
    engine: CaptureEngine,
    webhook: Arc<dyn WebhookSender>,
}

impl NotificationRouter {
    pub fn new(engine: CaptureEngine, webhook: Arc<dyn WebhookSender>) -> Self {
        Self { engine, webhook }
    }

    /// Subscribe once and route notifications until the source closes, then
    /// wait for the sessions and webhooks still in flight.
    pub async fn run(self, source: impl NotificationSource) {
        let mut rx = source.subscribe();
        drop(source);
        tracing::info!("notification router started");

        let mut in_flight: Vec<Dispatch> = Vec::new();
        loop {
            match rx.recv().await {
                Ok(notification) => {
                    in_flight.retain(|d| !d.is_finished());
                    let dispatch = self.route(&notification);
                    if !dispatch.is_empty() {
                        in_flight.push(dispatch);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification router lagged; notifications dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        in_flight.retain(|d| !d.is_finished());
        tracing::info!(pending = in_flight.len(), "notification router draining");
        for dispatch in in_flight {
            dispatch.join().await;
        }
        tracing::info!("notification router stopped");
    }

    pub fn route(&self, notification: &Notification) -> Dispatch {
        match notification.kind() {
            NotificationCategory::Motion => {
                tracing::info!(category = %notification.category, "motion detected");
                Dispatch {
                    capture: Some(self.spawn_capture()),
                    webhook: Some(self.spawn_webhook(NotificationEvent::Motion)),
                }
            }
            NotificationCategory::Ding => {
                tracing::info!(category = %notification.category, "doorbell pressed");
                Dispatch {
                    capture: None,
                    webhook: Some(self.spawn_webhook(NotificationEvent::Ding)),
                }
            }
            NotificationCategory::Unknown => {
                tracing::debug!(category = %notification.category, "ignoring notification");
                Dispatch::default()
            }
        }
    }

    fn spawn_capture(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            match engine.start_session().await {
                Ok(session) => {
                    if let Err(e) = session.await {
                        tracing::error!(error = %e, "capture session panicked");
                    }
                }
                Err(e) => tracing::error!(error = %e, "capture session failed to start"),
            }
        })
    }

    fn spawn_webhook(&self, event: NotificationEvent) -> JoinHandle<()> {
        let webhook = self.webhook.clone();
        tokio::spawn(async move {
            let payload = WebhookPayload::Notification { event };
            match webhook.send(&payload).await {
                Ok(()) => tracing::debug!(?event, "notification webhook delivered"),
                Err(e) => tracing::error!(?event, error = %e, "notification webhook failed"),
            }
        })
    }
}
