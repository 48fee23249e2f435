//! Processing types and their strongly-typed option sets.
//!
//! Every task carries a [`ProcessingOptions`] value. The variant doubles as the
//! routing tag: the queue resolves the processor registered for
//! [`ProcessingOptions::processor_type`] at submission time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Tag identifying which processor handles a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorType {
    Image,
    Audio,
    Video,
    Document,
}

impl ProcessorType {
    pub const ALL: [ProcessorType; 4] = [
        ProcessorType::Image,
        ProcessorType::Audio,
        ProcessorType::Video,
        ProcessorType::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorType::Image => "image",
            ProcessorType::Audio => "audio",
            ProcessorType::Video => "video",
            ProcessorType::Document => "document",
        }
    }
}

impl fmt::Display for ProcessorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessorType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(ProcessorType::Image),
            "audio" => Ok(ProcessorType::Audio),
            "video" => Ok(ProcessorType::Video),
            "document" => Ok(ProcessorType::Document),
            other => Err(CoreError::InvalidOptions(format!(
                "unknown processor type '{other}'"
            ))),
        }
    }
}

// ── Image ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatermarkOptions {
    pub text: Option<String>,
    /// Path of an overlay image.
    pub image: Option<String>,
    pub position: Option<WatermarkPosition>,
    /// 0.0 (transparent) to 1.0 (opaque).
    pub opacity: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageOptions {
    /// Compression quality, 0-100.
    pub quality: Option<u8>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<ImageFormat>,
    #[serde(default)]
    pub watermark: bool,
    pub watermark_options: Option<WatermarkOptions>,
}

// ── Audio ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
    Aac,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioOptions {
    /// Target bitrate in kbps.
    pub bitrate: Option<u32>,
    pub format: Option<AudioFormat>,
    /// Sample rate in Hz.
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

// ── Video ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Avi,
    Mov,
    Webm,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoOptions {
    /// Quality, 0-100.
    pub quality: Option<u8>,
    pub format: Option<VideoFormat>,
    #[serde(default)]
    pub generate_thumbnail: bool,
    /// Thumbnail capture point in seconds.
    pub thumbnail_time: Option<f64>,
}

// ── Document ────────────────────────────────────────────────────────

/// Documents carry opaque parameters understood only by their processor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentOptions {
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

// ── ProcessingOptions ───────────────────────────────────────────────

/// Per-task processing parameters, tagged by processor type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProcessingOptions {
    Image(ImageOptions),
    Audio(AudioOptions),
    Video(VideoOptions),
    Document(DocumentOptions),
}

impl ProcessingOptions {
    pub fn processor_type(&self) -> ProcessorType {
        match self {
            ProcessingOptions::Image(_) => ProcessorType::Image,
            ProcessingOptions::Audio(_) => ProcessorType::Audio,
            ProcessingOptions::Video(_) => ProcessorType::Video,
            ProcessingOptions::Document(_) => ProcessorType::Document,
        }
    }

    /// Default options for a processor type.
    pub fn default_for(processor_type: ProcessorType) -> Self {
        match processor_type {
            ProcessorType::Image => ProcessingOptions::Image(ImageOptions::default()),
            ProcessorType::Audio => ProcessingOptions::Audio(AudioOptions::default()),
            ProcessorType::Video => ProcessingOptions::Video(VideoOptions::default()),
            ProcessorType::Document => ProcessingOptions::Document(DocumentOptions::default()),
        }
    }

    /// Check parameter ranges. Called by the queue before a task is created.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            ProcessingOptions::Image(opts) => validate_image(opts),
            ProcessingOptions::Audio(opts) => validate_audio(opts),
            ProcessingOptions::Video(opts) => validate_video(opts),
            ProcessingOptions::Document(_) => Ok(()),
        }
    }
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidOptions(msg.into())
}

fn validate_image(opts: &ImageOptions) -> Result<(), CoreError> {
    if let Some(q) = opts.quality {
        if q > 100 {
            return Err(invalid(format!("image quality {q} out of range 0-100")));
        }
    }
    if opts.width == Some(0) || opts.height == Some(0) {
        return Err(invalid("image dimensions must be positive"));
    }
    if opts.watermark {
        let Some(wm) = &opts.watermark_options else {
            return Err(invalid("watermark enabled without watermark_options"));
        };
        if wm.text.is_none() && wm.image.is_none() {
            return Err(invalid("watermark needs either text or image"));
        }
        if let Some(opacity) = wm.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(invalid(format!(
                    "watermark opacity {opacity} out of range 0.0-1.0"
                )));
            }
        }
    }
    Ok(())
}

fn validate_audio(opts: &AudioOptions) -> Result<(), CoreError> {
    if opts.bitrate == Some(0) {
        return Err(invalid("audio bitrate must be positive"));
    }
    if opts.sample_rate == Some(0) {
        return Err(invalid("audio sample rate must be positive"));
    }
    if let Some(ch) = opts.channels {
        if !(1..=8).contains(&ch) {
            return Err(invalid(format!("audio channel count {ch} out of range 1-8")));
        }
    }
    Ok(())
}

fn validate_video(opts: &VideoOptions) -> Result<(), CoreError> {
    if let Some(q) = opts.quality {
        if q > 100 {
            return Err(invalid(format!("video quality {q} out of range 0-100")));
        }
    }
    if let Some(t) = opts.thumbnail_time {
        if !t.is_finite() || t < 0.0 {
            return Err(invalid(format!("thumbnail time {t} must be a non-negative number")));
        }
    }
    Ok(())
}
