// VideoRecorder (§4.7): records the target's client area to an H.264/H.265
// MP4 at a fixed frame rate regardless of how irregularly WGC delivers
// frames.
//
// Grounded precisely in the original's `recording/recording.cpp`:
// `on_frame_arrived`'s gap-fill algorithm (wall-clock elapsed time maps to a
// target frame index; frames the live capture skipped are filled by
// re-encoding the last delivered texture so output duration always matches
// wall-clock duration) and its `initialize`/`start`/`stop`/`cleanup`
// lifecycle (MFStartup/MFShutdown bracketing, even-dimension snapping).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D11::*;
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_B8G8R8A8_UNORM;
use windows::Win32::UI::WindowsAndMessaging::{GetClientRect, IsIconic, IsWindow};

use crate::capture::{init_capture, CaptureSession};
use crate::config::{self, RecordingConfig};
use crate::d3d11::D3D11Context;
use crate::encoder::mf::{self, EncodedSample, EncoderMode, RawVideoEncoder, StreamCopyMuxer};
use crate::encoder::EncoderFanout;
use crate::error::CoreError;

const HUNDRED_NS_PER_SEC: i64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopping,
}

fn snap_even(v: i32) -> i32 {
    (v / 2) * 2
}

fn to_mf_codec(codec: config::VideoCodec) -> mf::VideoCodec {
    match codec {
        config::VideoCodec::H264 => mf::VideoCodec::H264,
        config::VideoCodec::H265 => mf::VideoCodec::H265,
    }
}

fn to_mf_rate_control(rc: config::RateControl) -> mf::RateControl {
    match rc {
        config::RateControl::Cbr => mf::RateControl::Cbr,
        config::RateControl::Vbr => mf::RateControl::Vbr,
    }
}

fn to_mf_encoder_mode(mode: config::EncoderMode) -> EncoderMode {
    match mode {
        config::EncoderMode::Auto => EncoderMode::Auto,
        config::EncoderMode::HardwareForced => EncoderMode::HardwareForced,
        config::EncoderMode::SoftwareForced => EncoderMode::SoftwareForced,
    }
}

fn same_texture(a: &ID3D11Texture2D, b: &ID3D11Texture2D) -> bool {
    a.as_raw() == b.as_raw()
}

/// Deep-copies `source` into a device-owned, non-bindable texture so the
/// retained "last frame" outlives the capture frame pool's own buffer reuse.
fn retain_texture(ctx: &D3D11Context, source: &ID3D11Texture2D, width: u32, height: u32) -> Result<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: width,
        Height: height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: 0,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };
    unsafe {
        let mut retained = None;
        ctx.device
            .CreateTexture2D(&desc, None, Some(&mut retained))
            .context("CreateTexture2D (retained frame) failed")?;
        let retained = retained.unwrap();
        ctx.context.CopyResource(&retained, source);
        Ok(retained)
    }
}

/// Owns the encoder, muxer and gap-fill bookkeeping; lives entirely on the
/// recording worker thread.
struct GapFillSession {
    ctx: D3D11Context,
    encoder: RawVideoEncoder,
    muxer: StreamCopyMuxer,
    width: u32,
    height: u32,
    frame_duration_100ns: i64,
    current_frame_index: i64,
    last_texture: Option<ID3D11Texture2D>,
}

impl GapFillSession {
    /// Encode every frame index up to and including `elapsed_100ns /
    /// frame_duration_100ns`. Only the final iteration (the one that
    /// actually reaches live wall-clock time) uses `incoming`; every earlier
    /// iteration re-encodes the retained last frame, which is how gaps in
    /// delivery get filled with repeated frames instead of left blank.
    fn on_frame_arrived(&mut self, incoming: Option<&ID3D11Texture2D>, elapsed_100ns: i64) {
        let target_frame_index = elapsed_100ns / self.frame_duration_100ns;

        while self.current_frame_index <= target_frame_index {
            let is_final = self.current_frame_index == target_frame_index;
            let texture = if is_final { incoming.or(self.last_texture.as_ref()) } else { self.last_texture.as_ref() };
            let Some(texture) = texture else { break };

            let pts = self.current_frame_index * self.frame_duration_100ns;
            match self.encoder.submit_frame(texture, pts) {
                Ok(samples) => {
                    for sample in samples {
                        if let Err(e) = self.muxer.write_sample(&sample) {
                            log::warn!("recorder: mux write_sample failed: {:#}", e);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("recorder: encode_frame failed, skipping rest of gap-fill: {:#}", e);
                    break;
                }
            }
            self.current_frame_index += 1;
        }

        if let Some(incoming) = incoming {
            let needs_copy = match &self.last_texture {
                Some(last) => !same_texture(last, incoming),
                None => true,
            };
            if needs_copy {
                match retain_texture(&self.ctx, incoming, self.width, self.height) {
                    Ok(copy) => self.last_texture = Some(copy),
                    Err(e) => log::warn!("recorder: failed to retain frame copy: {:#}", e),
                }
            }
        }
    }

    fn finish(mut self, stop_elapsed_100ns: i64) -> Result<()> {
        self.on_frame_arrived(None, stop_elapsed_100ns);
        let tail: Vec<EncodedSample> = self.encoder.drain_end_of_stream()?;
        for sample in tail {
            self.muxer.write_sample(&sample)?;
        }
        self.muxer.finalize()
    }
}

/// Records a window's client area to disk as a single MP4 file.
///
/// `Idle -> Recording -> Stopping -> Idle`; only one recording runs at a
/// time per instance (§4.7).
pub struct VideoRecorder {
    state: Arc<Mutex<RecorderState>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl VideoRecorder {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState::Idle)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock().unwrap()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Start recording `target`'s client area to `output_path`. Fails if
    /// already recording, if the replay buffer currently holds the shared
    /// device (§4.5 mutual exclusion, enforced by the caller-supplied
    /// `fanout`), or if the target has no usable client area.
    pub fn start(&mut self, target: HWND, config: &RecordingConfig, fanout: &mut EncoderFanout, output_path: std::path::PathBuf) -> Result<()> {
        if self.is_recording() {
            bail!(CoreError::PreconditionUnmet("already recording".into()));
        }
        if unsafe { !IsWindow(Some(target)).as_bool() } {
            bail!(CoreError::PreconditionUnmet("target window is invalid".into()));
        }
        if unsafe { IsIconic(target).as_bool() } {
            bail!(CoreError::PreconditionUnmet("target window is minimized".into()));
        }

        fanout.try_start_recording()?;

        let mut client_rect = windows::Win32::Foundation::RECT::default();
        unsafe { GetClientRect(target, &mut client_rect)? };
        let width = snap_even(client_rect.right - client_rect.left);
        let height = snap_even(client_rect.bottom - client_rect.top);
        if width <= 0 || height <= 0 {
            fanout.stop_recording();
            bail!(CoreError::PreconditionUnmet("target client area is empty".into()));
        }

        mf::mf_startup()?;

        let ctx = match fanout.acquire_device() {
            Ok(ctx) => ctx,
            Err(e) => {
                fanout.stop_recording();
                mf::mf_shutdown();
                return Err(e);
            }
        };
        if let Err(e) = ctx.enable_multithread_protection() {
            fanout.stop_recording();
            mf::mf_shutdown();
            return Err(e);
        }

        let build = (|| -> Result<(RawVideoEncoder, StreamCopyMuxer, CaptureSession)> {
            let encoder = RawVideoEncoder::new(
                &ctx.device,
                &ctx.context,
                to_mf_codec(config.codec),
                width as u32,
                height as u32,
                config.fps,
                config.bitrate,
                to_mf_rate_control(config.rate_control),
                to_mf_encoder_mode(config.encoder_mode),
            )?;

            let video_type = mf_video_type_for_mux(to_mf_codec(config.codec), width as u32, height as u32, config.fps, config.bitrate)?;
            let muxer = StreamCopyMuxer::new(&video_type, None, &output_path)?;

            let capture = init_capture(&ctx, target, 2)?;
            capture.start()?;

            Ok((encoder, muxer, capture))
        })();

        let (encoder, muxer, capture) = match build {
            Ok(v) => v,
            Err(e) => {
                fanout.stop_recording();
                mf::mf_shutdown();
                return Err(e);
            }
        };

        let mut session = GapFillSession {
            ctx: ctx.clone(),
            encoder,
            muxer,
            width: width as u32,
            height: height as u32,
            frame_duration_100ns: HUNDRED_NS_PER_SEC / config.fps.max(1) as i64,
            current_frame_index: 0,
            last_texture: None,
        };

        self.shutdown.store(false, Ordering::Relaxed);
        *self.state.lock().unwrap() = RecorderState::Recording;

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
                session.on_frame_arrived(Some(&texture), elapsed_100ns);
            }

            *state.lock().unwrap() = RecorderState::Stopping;
            let stop_elapsed_100ns = start_time.elapsed().as_nanos() as i64 / 100;
            if let Err(e) = session.finish(stop_elapsed_100ns) {
                log::error!("recorder: failed to finalize recording: {:#}", e);
            }
            drop(capture);
            mf::mf_shutdown();
            *state.lock().unwrap() = RecorderState::Idle;
        }));

        Ok(())
    }

    /// Stop recording and block until the MP4 has been finalized.
    pub fn stop(&mut self, fanout: &mut EncoderFanout) {
        if !self.is_recording() {
            return;
        }
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        fanout.stop_recording();
    }
}

impl Default for VideoRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VideoRecorder {
    fn drop(&mut self) {
        if self.is_recording() {
            self.shutdown.store(true, Ordering::Relaxed);
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        }
    }
}

fn mf_video_type_for_mux(
    codec: mf::VideoCodec,
    width: u32,
    height: u32,
    fps: u32,
    bitrate: u32,
) -> Result<windows::Win32::Media::MediaFoundation::IMFMediaType> {
    use windows::Win32::Media::MediaFoundation::*;
    let subtype = match codec {
        mf::VideoCodec::H264 => MFVideoFormat_H264,
        mf::VideoCodec::H265 => MFVideoFormat_HEVC,
    };
    unsafe {
        let mt = MFCreateMediaType()?;
        mt.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Video)?;
        mt.SetGUID(&MF_MT_SUBTYPE, &subtype)?;
        mt.SetUINT32(&MF_MT_AVG_BITRATE, bitrate)?;
        MFSetAttributeSize(&mt, &MF_MT_FRAME_SIZE, width, height)?;
        MFSetAttributeRatio(&mt, &MF_MT_FRAME_RATE, fps, 1)?;
        MFSetAttributeRatio(&mt, &MF_MT_PIXEL_ASPECT_RATIO, 1, 1)?;
        Ok(mt)
    }
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
    fn frame_duration_matches_fps() {
        assert_eq!(HUNDRED_NS_PER_SEC / 30, 333_333);
        assert_eq!(HUNDRED_NS_PER_SEC / 60, 166_666);
    }
}
