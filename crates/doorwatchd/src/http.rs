//! HTTP surface: health check, external motion trigger, notification intake.

use crate::engine::CaptureEngine;
use crate::router::NotificationHub;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use doorwatch_core::Notification;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Instant;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    engine: CaptureEngine,
    hub: NotificationHub,
    external_motion_trigger: bool,
    started: Instant,
}

impl AppState {
    pub fn new(engine: CaptureEngine, hub: NotificationHub, external_motion_trigger: bool) -> Self {
        Self {
            engine,
            hub,
            external_motion_trigger,
            started: Instant::now(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Seconds since the daemon started.
    pub uptime: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/motion", post(motion))
        .route("/notifications", post(notifications))
        .with_state(state)
}

/// Serve until `shutdown` resolves, then finish in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: state.started.elapsed().as_secs_f64(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

async fn motion(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if !state.external_motion_trigger {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "status": "failed",
                "message": "external motion trigger is disabled",
            })),
        );
    }

    tracing::info!("external motion trigger received");
    let engine = state.engine.clone();
    tokio::spawn(async move {
        match engine.start_session().await {
            Ok(session) => {
                if let Err(e) = session.await {
                    tracing::error!(error = %e, "capture session panicked");
                }
            }
            Err(e) => tracing::error!(error = %e, "capture session failed to start"),
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

async fn notifications(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> (StatusCode, Json<Value>) {
    let receivers = state.hub.publish(notification.clone());
    tracing::debug!(category = %notification.category, receivers, "notification received");
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::NotificationSource;
    use crate::session::SessionConfig;
    use crate::testing::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn rig() -> Rig {
        Rig::new(
            FakeCamera::finite(vec![jpeg_frame()]),
            FakeDetector::never_face(),
            FakeSearch::new(vec![]),
            SessionConfig::default(),
        )
    }

    fn app(rig: &Rig, hub: NotificationHub, external: bool) -> Router {
        create_router(AppState::new(rig.engine(), hub, external))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let rig = rig();
        let response = app(&rig, NotificationHub::new(4), false)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert!(body["uptime"].as_f64().unwrap() >= 0.0);
        assert!(body["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_motion_disabled_is_forbidden() {
        let rig = rig();
        let response = app(&rig, NotificationHub::new(4), false)
            .oneshot(Request::post("/motion").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["status"], "failed");
        assert_eq!(rig.camera.opens(), 0);
    }

    #[tokio::test]
    async fn test_motion_enabled_starts_session() {
        let rig = rig();
        let response = app(&rig, NotificationHub::new(4), true)
            .oneshot(Request::post("/motion").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["status"], "accepted");

        for _ in 0..100 {
            if rig.camera.stops() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(rig.camera.opens(), 1);
        assert_eq!(rig.camera.stops(), 1);
        // Direct triggers skip the motion notification webhook.
        assert_eq!(rig.webhook.attempts(), 0);
    }

    #[tokio::test]
    async fn test_notifications_are_published() {
        let rig = rig();
        let hub = NotificationHub::new(4);
        let mut rx = hub.subscribe();

        let response = app(&rig, hub, false)
            .oneshot(
                Request::post("/notifications")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"category":"com.ring.push.HANDLE_NEW_DING"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::new("com.ring.push.HANDLE_NEW_DING")
        );
    }

    #[tokio::test]
    async fn test_notifications_reject_bad_body() {
        let rig = rig();
        let response = app(&rig, NotificationHub::new(4), false)
            .oneshot(
                Request::post("/notifications")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
