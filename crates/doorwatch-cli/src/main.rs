use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use doorwatch_core::{
    DetectParams, DetectionCrop, FaceDetector, HttpFaceDetector, ImageCompositor,
    VerticalCompositor,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "doorwatch", about = "Doorwatch face-capture daemon CLI")]
struct Cli {
    /// Base URL of the running daemon
    #[arg(long, global = true, default_value = "http://127.0.0.1:3000", env = "DOORWATCH_URL")]
    url: String,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon health
    Status,
    /// Start a capture session (requires USE_EXTERNAL_MOTION_TRIGGER on the daemon)
    Motion,
    /// Push a camera notification (e.g. "com.ring.push.HANDLE_NEW_motion", "ding")
    Notify {
        category: String,
    },
    /// Stack images vertically into one JPEG, as a recognition attempt would
    Compose {
        /// Input images, top to bottom
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Send one image to the face-detector API
    Detect {
        image: PathBuf,
        /// Where to write the face crop
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Face-detector API base URL
        #[arg(long, env = "FACE_DETECTOR_API")]
        detector: String,
        /// Smallest face edge in pixels
        #[arg(long, default_value_t = 80)]
        min_size: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);
    let base = cli.url.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Status => {
            let client = http_client(timeout)?;
            let response = client
                .get(format!("{base}/health"))
                .send()
                .await
                .with_context(|| format!("doorwatchd not reachable at {base}"))?;
            let body = read_json(response).await?;
            println!("doorwatchd: {}", body["status"].as_str().unwrap_or("unknown"));
            if let Some(uptime) = body["uptime"].as_f64() {
                println!("uptime:     {uptime:.1}s");
            }
        }
        Commands::Motion => {
            let client = http_client(timeout)?;
            let response = client.post(format!("{base}/motion")).send().await?;
            let body = read_json(response).await?;
            println!("capture session {}", body["status"].as_str().unwrap_or("accepted"));
        }
        Commands::Notify { category } => {
            let client = http_client(timeout)?;
            let response = client
                .post(format!("{base}/notifications"))
                .json(&json!({ "category": category }))
                .send()
                .await?;
            read_json(response).await?;
            println!("notification {category} delivered");
        }
        Commands::Compose { inputs, output } => {
            let mut images = Vec::with_capacity(inputs.len());
            for path in &inputs {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                images.push(DetectionCrop(bytes));
            }
            let composite = VerticalCompositor.compose(images).await?;
            tokio::fs::write(&output, &composite)
                .await
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "{} images composed into {} ({} bytes)",
                inputs.len(),
                output.display(),
                composite.len()
            );
        }
        Commands::Detect {
            image,
            output,
            detector,
            min_size,
        } => {
            let frame = tokio::fs::read(&image)
                .await
                .with_context(|| format!("failed to read {}", image.display()))?;
            let params = DetectParams {
                min_size,
                ..DetectParams::default()
            };
            let client = HttpFaceDetector::new(&detector, params, timeout)?;
            match client.detect(&frame).await? {
                Some(crop) => {
                    println!("face detected ({} bytes)", crop.len());
                    if let Some(path) = output {
                        tokio::fs::write(&path, crop.as_bytes())
                            .await
                            .with_context(|| format!("failed to write {}", path.display()))?;
                        println!("crop written to {}", path.display());
                    }
                }
                None => println!("no face detected"),
            }
        }
    }

    Ok(())
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Parse a daemon response, turning non-2xx answers into errors.
async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("request failed");
        bail!("daemon answered {status}: {message}");
    }
    Ok(body)
}
