use crate::session::SessionConfig;
use doorwatch_core::DetectParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Daemon configuration.
///
/// Loaded from an optional TOML file (`DOORWATCH_CONFIG`), then overridden by
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Camera name used in logs.
    pub camera_name: String,
    /// Input handed to `ffmpeg -i` (RTSP URL, HTTP stream, file).
    pub camera_stream_url: String,
    pub ffmpeg_path: String,
    /// Base URL of the face-detector API.
    pub face_detector_api: String,
    /// Smallest face edge in pixels forwarded to the detector.
    pub detect_min_size: u32,
    pub detect_start_x: Option<u32>,
    pub detect_start_y: Option<u32>,
    pub detect_end_x: Option<u32>,
    pub detect_end_y: Option<u32>,
    pub detect_confidence: Option<f32>,
    /// Rekognition collection searched for matches.
    pub collection_id: String,
    pub face_match_threshold: Option<f32>,
    /// Webhook receiving notification and recognition events.
    pub webhook_url: String,
    /// Port of the health / trigger HTTP server.
    pub port: u16,
    /// Capture session lifetime in milliseconds.
    pub detect_timeout_ms: u64,
    /// Number of face crops composited per recognition attempt.
    pub face_count: usize,
    /// Recognition attempts per session before giving up.
    pub max_retries: u32,
    pub video_stream_fps: u32,
    /// Frames discarded at the start of every stream.
    pub warmup_frames: usize,
    /// Whether `POST /motion` may start capture sessions.
    pub use_external_motion_trigger: bool,
    /// Directory receiving debug snapshots, if any.
    pub snapshot_dir: Option<PathBuf>,
    /// Timeout for outbound HTTP requests, in seconds.
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_name: "camera".to_string(),
            camera_stream_url: String::new(),
            ffmpeg_path: "ffmpeg".to_string(),
            face_detector_api: String::new(),
            detect_min_size: 80,
            detect_start_x: None,
            detect_start_y: None,
            detect_end_x: None,
            detect_end_y: None,
            detect_confidence: None,
            collection_id: String::new(),
            face_match_threshold: None,
            webhook_url: String::new(),
            port: 3000,
            detect_timeout_ms: 15_000,
            face_count: 3,
            max_retries: 2,
            video_stream_fps: 3,
            warmup_frames: 0,
            use_external_motion_trigger: false,
            snapshot_dir: None,
            http_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load the TOML file named by `DOORWATCH_CONFIG` (if set), apply
    /// environment overrides and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("DOORWATCH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Override fields from variables returned by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvVars(&lookup);

        vars.string("CAMERA_NAME", &mut self.camera_name);
        vars.string("CAMERA_STREAM_URL", &mut self.camera_stream_url);
        vars.string("FFMPEG_PATH", &mut self.ffmpeg_path);
        vars.string("FACE_DETECTOR_API", &mut self.face_detector_api);
        vars.parse("DETECT_MIN_SIZE", &mut self.detect_min_size)?;
        vars.parse_opt("DETECT_START_X", &mut self.detect_start_x)?;
        vars.parse_opt("DETECT_START_Y", &mut self.detect_start_y)?;
        vars.parse_opt("DETECT_END_X", &mut self.detect_end_x)?;
        vars.parse_opt("DETECT_END_Y", &mut self.detect_end_y)?;
        vars.parse_opt("DETECT_CONFIDENCE", &mut self.detect_confidence)?;
        vars.string("AWS_REKOGNITION_COLLECTION_ID", &mut self.collection_id);
        vars.parse_opt("FACE_MATCH_THRESHOLD", &mut self.face_match_threshold)?;
        vars.string("WEBHOOK", &mut self.webhook_url);
        vars.parse("PORT", &mut self.port)?;
        vars.parse("DETECT_TIMEOUT", &mut self.detect_timeout_ms)?;
        vars.parse("RECOGNITION_FACE_COUNT", &mut self.face_count)?;
        vars.parse("RECOGNITION_MAX_RETRIES", &mut self.max_retries)?;
        vars.parse("VIDEO_STREAM_FPS", &mut self.video_stream_fps)?;
        vars.parse("WARMUP_FRAMES", &mut self.warmup_frames)?;
        vars.flag("USE_EXTERNAL_MOTION_TRIGGER", &mut self.use_external_motion_trigger)?;
        if let Some(dir) = vars.get("SNAPSHOT_DIR") {
            self.snapshot_dir = Some(PathBuf::from(dir));
        }
        vars.parse("HTTP_TIMEOUT_SECS", &mut self.http_timeout_secs)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("CAMERA_STREAM_URL", &self.camera_stream_url),
            ("FACE_DETECTOR_API", &self.face_detector_api),
            ("AWS_REKOGNITION_COLLECTION_ID", &self.collection_id),
            ("WEBHOOK", &self.webhook_url),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }

        let positive = [
            ("RECOGNITION_FACE_COUNT", self.face_count as u64),
            ("RECOGNITION_MAX_RETRIES", u64::from(self.max_retries)),
            ("VIDEO_STREAM_FPS", u64::from(self.video_stream_fps)),
            ("DETECT_TIMEOUT", self.detect_timeout_ms),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Numeric parameters of a capture session.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            face_count: self.face_count,
            max_retries: self.max_retries,
            fps: self.video_stream_fps,
            timeout: Duration::from_millis(self.detect_timeout_ms),
            warmup_frames: self.warmup_frames,
        }
    }

    /// Form fields sent with every detection request.
    pub fn detect_params(&self) -> DetectParams {
        DetectParams {
            min_size: self.detect_min_size,
            start_x: self.detect_start_x,
            start_y: self.detect_start_y,
            end_x: self.detect_end_x,
            end_y: self.detect_end_y,
            confidence: self.detect_confidence,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Typed access to a variable source. Empty values count as unset.
struct EnvVars<'a, F>(&'a F);

impl<F> EnvVars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, target: &mut String) {
        if let Some(v) = self.get(key) {
            *target = v;
        }
    }

    fn parse<T: FromStr>(&self, key: &'static str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(v) = self.get(key) {
            *target = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: v.clone() })?;
        }
        Ok(())
    }

    fn parse_opt<T: FromStr>(
        &self,
        key: &'static str,
        target: &mut Option<T>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = self.get(key) {
            let parsed = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value: v.clone() })?;
            *target = Some(parsed);
        }
        Ok(())
    }

    fn flag(&self, key: &'static str, target: &mut bool) -> Result<(), ConfigError> {
        if let Some(v) = self.get(key) {
            *target = match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::Invalid { key, value: v }),
            };
        }
        Ok(())
    }
}
