use std::time::Duration;

use crate::env_config::{parse_positive_u64, parse_truthy};
use crate::error::{CaptureError, CaptureResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1500);
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TARGET_WIDTH: u32 = 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

const TIMEOUT_VAR: &str = "SCREEN_SNAPSHOT_TIMEOUT_MS";
const TARGET_WIDTH_VAR: &str = "SCREEN_SNAPSHOT_TARGET_WIDTH";
const JPEG_QUALITY_VAR: &str = "SCREEN_SNAPSHOT_JPEG_QUALITY";
const KEEP_BORDER_VAR: &str = "SCREEN_SNAPSHOT_KEEP_BORDER";
const SKIP_ACCESS_REQUEST_VAR: &str = "SCREEN_SNAPSHOT_SKIP_ACCESS_REQUEST";
const ALLOW_CONCURRENT_VAR: &str = "SCREEN_SNAPSHOT_ALLOW_CONCURRENT";

/// Tuning knobs for a capture engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// How long a session waits for its first frame.
    pub timeout: Duration,
    /// Width of every encoded image; height follows the aspect ratio.
    pub target_width: u32,
    pub jpeg_quality: u8,
    /// Ask the OS not to draw the yellow capture border (best effort).
    pub suppress_border: bool,
    /// Run the programmatic-capture access request before starting a session.
    pub request_access: bool,
    /// Serialize whole capture attempts behind a single admission gate.
    pub serialize_attempts: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            target_width: DEFAULT_TARGET_WIDTH,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            suppress_border: true,
            request_access: true,
            serialize_attempts: true,
        }
    }
}

impl CaptureConfig {
    /// Defaults overlaid with any `SCREEN_SNAPSHOT_*` environment overrides.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let positive = |name| lookup(name).as_deref().and_then(parse_positive_u64);
        let truthy = |name| lookup(name).as_deref().is_some_and(parse_truthy);

        let mut config = Self::default();
        if let Some(ms) = positive(TIMEOUT_VAR) {
            config.timeout = clamp_timeout(Duration::from_millis(ms));
        }
        if let Some(width) = positive(TARGET_WIDTH_VAR) {
            config.target_width = u32::try_from(width).unwrap_or(u32::MAX);
        }
        if let Some(quality) = positive(JPEG_QUALITY_VAR) {
            config.jpeg_quality = quality.min(100) as u8;
        }
        config.suppress_border = !truthy(KEEP_BORDER_VAR);
        config.request_access = !truthy(SKIP_ACCESS_REQUEST_VAR);
        config.serialize_attempts = !truthy(ALLOW_CONCURRENT_VAR);
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = clamp_timeout(timeout);
        self
    }

    pub fn validate(&self) -> CaptureResult<()> {
        if self.target_width == 0 {
            return Err(CaptureError::InvalidConfig(
                "target width must be positive".into(),
            ));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(CaptureError::InvalidConfig(format!(
                "jpeg quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Clamp a caller-supplied timeout into the accepted range.
pub fn clamp_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_TIMEOUT, MAX_TIMEOUT)
}
