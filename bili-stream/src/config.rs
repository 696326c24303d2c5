//! Configuration types for the bili-stream crate
//!
//! [`MonitorConfig`] controls polling, [`CaptureConfig`] the PCM format that
//! ffmpeg produces and [`ClientConfig`] bundles both with the retry policy
//! used by [`crate::StreamClient`].

use std::time::Duration;

use crate::error::StreamError;
use crate::retry::RetryPolicy;

/// Configuration for the [`crate::Monitor`]
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between status probes of one room
    /// Default: 30 seconds
    pub interval: Duration,

    /// SESSDATA cookie for authenticated API requests
    /// Default: None
    pub cookie: Option<String>,

    /// Capacity of each subscriber channel
    /// Default: 64
    pub event_buffer_size: usize,

    /// Time allowed for in-flight events to be delivered before subscriber
    /// channels are closed at the end of a watch
    /// Default: 100 milliseconds
    pub shutdown_grace: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            cookie: None,
            event_buffer_size: 64,
            shutdown_grace: Duration::from_millis(100),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.interval.is_zero() {
            return Err(StreamError::Configuration(
                "Polling interval must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(StreamError::Configuration(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// An empty cookie is treated as no cookie.
    pub fn with_cookie(mut self, sessdata: impl Into<String>) -> Self {
        let sessdata = sessdata.into();
        self.cookie = (!sessdata.is_empty()).then_some(sessdata);
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = size;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// PCM sample formats ffmpeg can emit.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian
    #[default]
    S16Le,
    /// Signed 16-bit big-endian
    S16Be,
    /// Signed 32-bit little-endian
    S32Le,
    /// 32-bit float little-endian
    F32Le,
}

impl SampleFormat {
    /// Name of the ffmpeg raw muxer for this format.
    pub fn muxer(&self) -> &'static str {
        match self {
            SampleFormat::S16Le => "s16le",
            SampleFormat::S16Be => "s16be",
            SampleFormat::S32Le => "s32le",
            SampleFormat::F32Le => "f32le",
        }
    }

    /// Name of the ffmpeg PCM codec for this format.
    pub fn codec(&self) -> String {
        format!("pcm_{}", self.muxer())
    }

    pub fn bytes_per_sample(&self) -> u32 {
        match self {
            SampleFormat::S16Le | SampleFormat::S16Be => 2,
            SampleFormat::S32Le | SampleFormat::F32Le => 4,
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.muxer())
    }
}

/// Audio parameters for capture
///
/// The default is what speech recognition engines usually expect:
/// 16kHz mono signed 16-bit little-endian PCM.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CaptureConfig {
    /// Output sample rate in Hz
    /// Default: 16000
    pub sample_rate: u32,

    /// Output channel count
    /// Default: 1 (mono)
    pub channels: u16,

    /// Output sample format
    /// Default: S16Le
    pub format: SampleFormat,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            format: SampleFormat::S16Le,
        }
    }
}

impl CaptureConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), StreamError> {
        if self.sample_rate == 0 {
            return Err(StreamError::Configuration(
                "Sample rate must be greater than 0".to_string(),
            ));
        }

        if self.channels == 0 {
            return Err(StreamError::Configuration(
                "Channel count must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Size of one second of output audio.
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.channels) * u64::from(self.format.bytes_per_sample())
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_format(mut self, format: SampleFormat) -> Self {
        self.format = format;
        self
    }
}

/// Configuration for the [`crate::StreamClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Settings of the underlying monitor
    pub monitor: MonitorConfig,

    /// Audio parameters used for every capture
    pub capture: CaptureConfig,

    /// Retry policy of capture tasks
    pub retry: RetryPolicy,

    /// Start audio capture automatically when a room goes live
    /// Default: true
    pub auto_capture: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            capture: CaptureConfig::default(),
            retry: RetryPolicy::default(),
            auto_capture: true,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), StreamError> {
        self.monitor.validate()?;
        self.capture.validate()?;
        self.retry.validate()
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.monitor.interval = interval;
        self
    }

    pub fn with_cookie(mut self, sessdata: impl Into<String>) -> Self {
        self.monitor = self.monitor.with_cookie(sessdata);
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.monitor.event_buffer_size = size;
        self
    }

    pub fn with_capture_config(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_auto_capture(mut self, enabled: bool) -> Self {
        self.auto_capture = enabled;
        self
    }
}
