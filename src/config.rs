// Settings the core consumes (§6 "Interfaces the core consumes").
//
// The core never persists these itself; a fully-populated struct is handed
// in by the out-of-scope settings layer. Serde-serializable so the settings
// layer can deserialize its JSON document straight into these types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RateControl {
    Cbr,
    Vbr,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EncoderMode {
    Auto,
    HardwareForced,
    SoftwareForced,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AudioSource {
    None,
    SystemAudio,
    Microphone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    pub fps: u32,
    pub bitrate: u32,
    pub codec: VideoCodec,
    pub rate_control: RateControl,
    pub encoder_mode: EncoderMode,
    /// Used only with `RateControl::Vbr`; quality in (0, 1].
    pub quality: Option<f32>,
    /// Used only with `EncoderMode::SoftwareForced` constant-QP paths.
    pub qp: Option<u32>,
    pub audio_source: AudioSource,
    pub audio_bitrate: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate: 20_000_000,
            codec: VideoCodec::H264,
            rate_control: RateControl::Cbr,
            encoder_mode: EncoderMode::Auto,
            quality: None,
            qp: None,
            audio_source: AudioSource::None,
            audio_bitrate: 128_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionPhotoConfig {
    pub fps: u32,
    pub bitrate: u32,
    pub codec: VideoCodec,
    pub audio_source: AudioSource,
    pub audio_bitrate: u32,
    pub duration_seconds: f64,
    /// Short-edge resolution the clip is rescaled to.
    pub short_edge_resolution: u32,
}

impl Default for MotionPhotoConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate: 6_000_000,
            codec: VideoCodec::H264,
            audio_source: AudioSource::None,
            audio_bitrate: 96_000,
            duration_seconds: 3.0,
            short_edge_resolution: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayBufferConfig {
    pub duration_seconds: f64,
    pub file_size_limit_bytes: i64,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 30.0,
            file_size_limit_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOption {
    pub total_pixels: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSettings {
    pub target_title: String,
    pub lower_taskbar_on_resize: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub window: WindowSettings,
    pub ratios: Vec<Ratio>,
    pub resolutions: Vec<ResolutionOption>,
    pub recording: RecordingConfig,
    pub motion_photo: MotionPhotoConfig,
    pub replay_buffer: ReplayBufferConfig,
    pub screenshot_directory: Option<std::path::PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            window: WindowSettings {
                target_title: String::new(),
                lower_taskbar_on_resize: false,
            },
            ratios: Vec::new(),
            resolutions: Vec::new(),
            recording: RecordingConfig::default(),
            motion_photo: MotionPhotoConfig::default(),
            replay_buffer: ReplayBufferConfig::default(),
            screenshot_directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let cfg = CoreConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: CoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.recording.fps, cfg.recording.fps);
    }
}
