use anyhow::{Context, Result};
use doorwatch_core::{
    HttpFaceDetector, HttpWebhook, RekognitionSearch, VerticalCompositor, WebhookSender,
};
use doorwatch_hw::FfmpegCamera;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod accumulator;
mod attempt;
mod config;
mod engine;
mod http;
mod router;
mod session;
mod snapshot;
#[cfg(test)]
mod testing;

use attempt::RecognitionAttempt;
use config::Config;
use engine::CaptureEngine;
use router::{NotificationHub, NotificationRouter};
use snapshot::SnapshotDir;

const NOTIFICATION_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "doorwatchd starting");

    let config = Config::load().context("invalid configuration")?;

    let camera = Arc::new(FfmpegCamera::new(
        config.camera_name.clone(),
        config.ffmpeg_path.clone(),
        config.camera_stream_url.clone(),
    ));
    let detector = Arc::new(
        HttpFaceDetector::new(
            &config.face_detector_api,
            config.detect_params(),
            config.http_timeout(),
        )
        .context("face detector client")?,
    );
    tracing::info!(endpoint = detector.endpoint(), "face detector configured");

    let search = Arc::new(
        RekognitionSearch::from_env(config.collection_id.clone(), config.face_match_threshold)
            .await,
    );
    tracing::info!(collection = %config.collection_id, "face search configured");

    let webhook: Arc<dyn WebhookSender> = Arc::new(
        HttpWebhook::new(config.webhook_url.clone(), config.http_timeout())
            .context("webhook client")?,
    );

    let snapshots = config.snapshot_dir.clone().map(SnapshotDir::new);
    if let Some(dir) = &snapshots {
        tracing::info!(dir = %dir.root().display(), "debug snapshots enabled");
    }

    let engine = CaptureEngine::new(
        camera,
        detector,
        RecognitionAttempt::new(Arc::new(VerticalCompositor), search),
        webhook.clone(),
        config.session_config(),
    )
    .with_snapshots(snapshots);

    let hub = NotificationHub::new(NOTIFICATION_BUFFER);
    let router = NotificationRouter::new(engine.clone(), webhook);
    let router_task = tokio::spawn(router.run(hub.clone()));

    if config.use_external_motion_trigger {
        tracing::info!("external motion trigger enabled");
    }
    let state = http::AppState::new(engine, hub, config.use_external_motion_trigger);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "doorwatchd ready");

    http::serve(listener, state, shutdown_signal()).await?;

    // The server has dropped the hub, so the router is draining its sessions.
    let grace = config.session_config().timeout + config.http_timeout();
    if tokio::time::timeout(grace, router_task).await.is_err() {
        tracing::warn!(grace_ms = grace.as_millis() as u64, "capture sessions still running");
    }
    tracing::info!("doorwatchd shutting down");
    Ok(())
}

/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::new(level)
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true))
            .with(filter)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
