// ReplayBuffer (§4.8): continuously ingests encoded frames from the shared
// capture session into a disk ring, and on demand exports the trailing
// window either as a standalone MP4 (`save_replay`) or packaged into a
// Google Motion Photo (`create_motion_photo`).
//
// Grounded in the original's `replay_buffer/replay_buffer.cpp` for the
// ingest loop (no gap-fill/CFR pacing here, unlike `VideoRecorder` — frames
// are timestamped and stored exactly as the capture delivers them) and its
// `initialize`/`start`/`stop` lifecycle, sharing `RawVideoEncoder` and
// `EncoderFanout` with the recorder (§4.5).

pub mod export;
pub mod motion_photo;
pub mod ring_buffer;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{Context, Result};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{GetClientRect, IsIconic, IsWindow};

use crate::capture::{init_capture, CaptureSession};
use crate::config::{self, MotionPhotoConfig, RecordingConfig, ReplayBufferConfig};
use crate::encoder::mf::{self, EncoderMode, RateControl, RawVideoEncoder, VideoCodec};
use crate::encoder::EncoderFanout;
use crate::error::CoreError;
use ring_buffer::RingBuffer;

fn snap_even(v: i32) -> i32 {
    (v / 2) * 2
}

fn to_mf_codec(codec: config::VideoCodec) -> VideoCodec {
    match codec {
        config::VideoCodec::H264 => VideoCodec::H264,
        config::VideoCodec::H265 => VideoCodec::H265,
    }
}

/// The fps/bitrate/codec triple the ring buffer encodes with, independent of
/// the client-area dimensions computed at start time.
struct EncodeQuality {
    fps: u32,
    bitrate: u32,
    codec: config::VideoCodec,
}

/// Only one background encode configuration can feed the ring buffer at a
/// time, so when Instant Replay is active we encode at the full *recording*
/// quality (since instant replay is meant to be a recording-grade clip);
/// when only Motion Photo is active we use its lighter, purpose-built
/// config instead. Mirrors the original's `usecase.cpp::build_config`.
fn resolve_encode_config(recording: &RecordingConfig, motion_photo: &MotionPhotoConfig, fanout: &EncoderFanout) -> EncodeQuality {
    if fanout.instant_replay_desired() {
        EncodeQuality { fps: recording.fps, bitrate: recording.bitrate, codec: recording.codec }
    } else {
        EncodeQuality { fps: motion_photo.fps, bitrate: motion_photo.bitrate, codec: motion_photo.codec }
    }
}

/// Parameters needed to rebuild the video `IMFMediaType` the ring's frames
/// were encoded with, so `save_replay`/`create_motion_photo` can hand the
/// muxer a matching stream-copy target without re-deriving it from config.
#[derive(Clone, Copy)]
struct EncodeParams {
    codec: VideoCodec,
    width: u32,
    height: u32,
    fps: u32,
    bitrate: u32,
}

fn video_type_for_mux(params: EncodeParams) -> Result<windows::Win32::Media::MediaFoundation::IMFMediaType> {
    use windows::Win32::Media::MediaFoundation::*;
    let subtype = match params.codec {
        VideoCodec::H264 => MFVideoFormat_H264,
        VideoCodec::H265 => MFVideoFormat_HEVC,
    };
    unsafe {
        let mt = MFCreateMediaType()?;
        mt.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Video)?;
        mt.SetGUID(&MF_MT_SUBTYPE, &subtype)?;
        mt.SetUINT32(&MF_MT_AVG_BITRATE, params.bitrate)?;
        MFSetAttributeSize(&mt, &MF_MT_FRAME_SIZE, params.width, params.height)?;
        MFSetAttributeRatio(&mt, &MF_MT_FRAME_RATE, params.fps, 1)?;
        MFSetAttributeRatio(&mt, &MF_MT_PIXEL_ASPECT_RATIO, 1, 1)?;
        Ok(mt)
    }
}

/// Continuously-running or idle. Unlike `VideoRecorder` there is no
/// "Stopping" state visible to callers — `stop` blocks until the worker
/// exits, since there's no file to finalize on the live-ingest side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayBufferState {
    Idle,
    Running,
}

/// Ingests the shared capture's frames directly into the disk ring,
/// timestamped by wall-clock elapsed time. Lives entirely on the ingest
/// worker thread.
struct IngestSession {
    encoder: RawVideoEncoder,
    ring: Arc<RingBuffer>,
}

impl IngestSession {
    fn on_frame_arrived(&mut self, texture: &windows::Win32::Graphics::Direct3D11::ID3D11Texture2D, elapsed_100ns: i64) {
        let samples = match self.encoder.submit_frame(texture, elapsed_100ns) {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("replay buffer: encode_frame failed: {:#}", e);
                return;
            }
        };
        for sample in samples {
            if let Err(e) = self
                .ring
                .append_frame(&sample.data, sample.pts_100ns, sample.duration_100ns, sample.is_keyframe, sample.is_audio)
            {
                log::warn!("replay buffer: append_frame failed: {:#}", e);
            }
        }
    }

    fn finish(mut self) {
        match self.encoder.drain_end_of_stream() {
            Ok(tail) => {
                for sample in tail {
                    if let Err(e) = self
                        .ring
                        .append_frame(&sample.data, sample.pts_100ns, sample.duration_100ns, sample.is_keyframe, sample.is_audio)
                    {
                        log::warn!("replay buffer: append_frame (drain) failed: {:#}", e);
                    }
                }
            }
            Err(e) => log::warn!("replay buffer: drain_end_of_stream failed: {:#}", e),
        }
    }
}

/// Disk-backed rolling buffer of the last `duration_seconds` of encoded
/// video (§4.8), fed continuously by a shared capture session and exported
/// on demand as a plain clip or a Motion Photo.
pub struct ReplayBuffer {
    ring: Arc<RingBuffer>,
    state: Arc<Mutex<ReplayBufferState>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    encode_params: Mutex<Option<EncodeParams>>,
    exporting: AtomicBool,
}

impl ReplayBuffer {
    pub fn new() -> Self {
        Self {
            ring: Arc::new(RingBuffer::new()),
            state: Arc::new(Mutex::new(ReplayBufferState::Idle)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
            encode_params: Mutex::new(None),
            exporting: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ReplayBufferState {
        *self.state.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ReplayBufferState::Running
    }

    /// Claim the shared capture session and start ingesting frames. A
    /// silent no-op if the fanout currently favors recording (§4.5:
    /// "toggling replay while recording does nothing").
    pub fn start(
        &mut self,
        target: HWND,
        recording_config: &RecordingConfig,
        motion_photo_config: &MotionPhotoConfig,
        replay_config: &ReplayBufferConfig,
        fanout: &mut EncoderFanout,
        cache_dir: &Path,
    ) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if !fanout.try_start_replay_buffer() {
            return Ok(());
        }

        let quality = resolve_encode_config(recording_config, motion_photo_config, fanout);
        if let Err(e) = self.start_inner(target, &quality, replay_config, fanout, cache_dir) {
            fanout.stop_replay_buffer();
            return Err(e);
        }
        Ok(())
    }

    fn start_inner(&mut self, target: HWND, quality: &EncodeQuality, replay_config: &ReplayBufferConfig, fanout: &mut EncoderFanout, cache_dir: &Path) -> Result<()> {
        if unsafe { !IsWindow(Some(target)).as_bool() } {
            bail_precondition("target window is invalid")?;
        }
        if unsafe { IsIconic(target).as_bool() } {
            bail_precondition("target window is minimized")?;
        }

        let mut client_rect = windows::Win32::Foundation::RECT::default();
        unsafe { GetClientRect(target, &mut client_rect)? };
        let width = snap_even(client_rect.right - client_rect.left);
        let height = snap_even(client_rect.bottom - client_rect.top);
        if width <= 0 || height <= 0 {
            bail_precondition("target client area is empty")?;
        }

        self.ring.initialize(cache_dir, replay_config.file_size_limit_bytes)?;

        mf::mf_startup()?;
        let ctx = fanout.acquire_device().inspect_err(|_| mf::mf_shutdown())?;
        ctx.enable_multithread_protection().inspect_err(|_| mf::mf_shutdown())?;

        let params = EncodeParams {
            codec: to_mf_codec(quality.codec),
            width: width as u32,
            height: height as u32,
            fps: quality.fps,
            bitrate: quality.bitrate,
        };

        let build = (|| -> Result<(RawVideoEncoder, CaptureSession)> {
            let encoder = RawVideoEncoder::new(
                &ctx.device,
                &ctx.context,
                params.codec,
                params.width,
                params.height,
                params.fps,
                params.bitrate,
                RateControl::Cbr,
                EncoderMode::Auto,
            )?;
            let capture = init_capture(&ctx, target, 2)?;
            capture.start()?;
            Ok((encoder, capture))
        })();

        let (encoder, capture) = match build {
            Ok(v) => v,
            Err(e) => {
                mf::mf_shutdown();
                return Err(e);
            }
        };

        *self.encode_params.lock().unwrap() = Some(params);
        self.shutdown.store(false, Ordering::Relaxed);
        *self.state.lock().unwrap() = ReplayBufferState::Running;

        let mut session = IngestSession { encoder, ring: Arc::clone(&self.ring) };
        let shutdown = Arc::clone(&self.shutdown);
        let state = Arc::clone(&self.state);

        self.worker = Some(std::thread::spawn(move || {
            let start_time = Instant::now();

            while !shutdown.load(Ordering::Relaxed) {
                if capture.wait_for_frame(200).is_err() {
                    continue;
                }
                let Ok(frame) = capture.try_get_next_frame() else { continue };
                let Ok(texture) = CaptureSession::frame_to_texture(&frame) else { continue };

                let elapsed_100ns = start_time.elapsed().as_nanos() as i64 / 100;
                session.on_frame_arrived(&texture, elapsed_100ns);
            }

            session.finish();
            drop(capture);
            mf::mf_shutdown();
            *state.lock().unwrap() = ReplayBufferState::Idle;
        }));

        Ok(())
    }

    /// Stop ingesting and release the shared capture session.
    pub fn stop(&mut self, fanout: &mut EncoderFanout) {
        if !self.is_running() {
            return;
        }
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        fanout.stop_replay_buffer();
    }

    /// Stream-copy the trailing `duration_seconds` straight out of the ring
    /// into a standalone MP4 (§4.8 `save_replay`). Only one export may run
    /// at a time; a concurrent call fails with `CoreError::FeatureConflict`.
    pub fn save_replay(&self, duration_seconds: f64, output_path: &Path) -> Result<()> {
        let _guard = self.claim_export()?;
        self.save_replay_locked(duration_seconds, output_path)
    }

    fn save_replay_locked(&self, duration_seconds: f64, output_path: &Path) -> Result<()> {
        let params = self.encode_params.lock().unwrap().context("replay buffer has not been started")?;
        let video_type = video_type_for_mux(params)?;
        export::save_replay(&self.ring, &video_type, None, duration_seconds, output_path)
    }

    /// Export the trailing `config.duration_seconds`, downscale it to
    /// `config.short_edge_resolution`, and package it with `jpeg_path` into
    /// a Motion Photo at `output_path` (§4.8 `create_motion_photo`).
    /// `scratch_dir` holds the intermediate full-res and scaled clips.
    pub fn create_motion_photo(&self, jpeg_path: &Path, config: &MotionPhotoConfig, scratch_dir: &Path, output_path: &Path) -> Result<()> {
        let _guard = self.claim_export()?;
        std::fs::create_dir_all(scratch_dir).context("creating motion photo scratch dir")?;
        let raw_clip = scratch_dir.join("motion_photo_raw.mp4");
        let scaled_clip = scratch_dir.join("motion_photo_scaled.mp4");

        self.save_replay_locked(config.duration_seconds, &raw_clip)?;
        export::scale_video(&raw_clip, &scaled_clip, config.short_edge_resolution, config.fps)?;

        let presentation_timestamp_us = (config.duration_seconds * 1_000_000.0) as i64;
        motion_photo::create_motion_photo(jpeg_path, &scaled_clip, output_path, presentation_timestamp_us)?;

        let _ = std::fs::remove_file(&raw_clip);
        let _ = std::fs::remove_file(&scaled_clip);
        Ok(())
    }

    /// Claim the single export slot (§11 Open Question: only one export in
    /// flight at a time), releasing it automatically when the guard drops.
    fn claim_export(&self) -> Result<ExportGuard<'_>> {
        if self.exporting.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed).is_err() {
            return Err(CoreError::FeatureConflict("a replay export is already in progress".into()).into());
        }
        Ok(ExportGuard { flag: &self.exporting })
    }
}

struct ExportGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ReplayBuffer {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown.store(true, Ordering::Relaxed);
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        }
    }
}

fn bail_precondition(msg: &str) -> Result<()> {
    Err(CoreError::PreconditionUnmet(msg.into()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_snap_truncates_odd_dimensions() {
        assert_eq!(snap_even(481), 480);
        assert_eq!(snap_even(480), 480);
    }

    #[test]
    fn starts_idle() {
        let buf = ReplayBuffer::new();
        assert_eq!(buf.state(), ReplayBufferState::Idle);
        assert!(!buf.is_running());
    }

    #[test]
    fn motion_photo_timestamp_matches_clip_duration() {
        let config = MotionPhotoConfig { duration_seconds: 3.0, ..MotionPhotoConfig::default() };
        let us = (config.duration_seconds * 1_000_000.0) as i64;
        assert_eq!(us, 3_000_000);
    }

    #[test]
    fn concurrent_exports_are_rejected() {
        let buf = ReplayBuffer::new();
        let _first = buf.claim_export().unwrap();
        assert!(buf.claim_export().is_err());
    }

    #[test]
    fn export_slot_is_released_on_drop() {
        let buf = ReplayBuffer::new();
        {
            let _guard = buf.claim_export().unwrap();
        }
        assert!(buf.claim_export().is_ok());
    }

    #[test]
    fn resolve_encode_config_prefers_recording_quality_for_instant_replay() {
        let mut fanout = EncoderFanout::new();
        fanout.set_replay_desired(false, true);
        let recording = RecordingConfig { fps: 60, ..RecordingConfig::default() };
        let motion_photo = MotionPhotoConfig::default();
        let quality = resolve_encode_config(&recording, &motion_photo, &fanout);
        assert_eq!(quality.fps, 60);
    }

    #[test]
    fn resolve_encode_config_uses_motion_photo_quality_otherwise() {
        let mut fanout = EncoderFanout::new();
        fanout.set_replay_desired(true, false);
        let recording = RecordingConfig::default();
        let motion_photo = MotionPhotoConfig { fps: 24, ..MotionPhotoConfig::default() };
        let quality = resolve_encode_config(&recording, &motion_photo, &fanout);
        assert_eq!(quality.fps, 24);
    }
}
