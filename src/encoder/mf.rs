// Media Foundation plumbing shared by VideoRecorder and ReplayBuffer: a raw
// elementary-stream H.264/H.265 encoder (§4.7 "compressed video encoder")
// and a stream-copy MP4 muxer (§4.8 `save_replay` mux step).
//
// Grounded in the original's `recording/recording.cpp` (MFStartup/MFShutdown
// lifecycle) and `replay_buffer/muxer.cpp` (exact stream-copy SinkWriter
// setup: disabled converters, per-stream timestamp rebasing, clean-point
// marking). The encoder creation internals (`Features::Recording::Encoder`,
// `Utils::Media::RawEncoder`) did not survive distillation into the source
// pack, so the MFT wiring below follows the standard synchronous
// ProcessInput/ProcessOutput encoder pattern rather than a ported original.

use std::path::Path;

use anyhow::{Context, Result};
use windows::core::{Interface, GUID};
use windows::Win32::Graphics::Direct3D11::ID3D11Texture2D;
use windows::Win32::Media::MediaFoundation::*;

use crate::d3d11::texture::TextureReader;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControl {
    Cbr,
    Vbr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderMode {
    Auto,
    HardwareForced,
    SoftwareForced,
}

/// One elementary-stream sample produced by a `RawVideoEncoder`, ready for
/// either direct ring-buffer storage or stream-copy muxing.
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub data: Vec<u8>,
    pub pts_100ns: i64,
    pub duration_100ns: i64,
    pub is_keyframe: bool,
    pub is_audio: bool,
}

/// Start Media Foundation. Call once per feature lifecycle (balanced with
/// `mf_shutdown`); MF reference-counts internally so nested start/stop pairs
/// across components are safe.
pub fn mf_startup() -> Result<()> {
    unsafe { MFStartup(MF_SDK_VERSION << 16 | MF_API_VERSION, MFSTARTUP_FULL) }
        .context("MFStartup failed")
}

pub fn mf_shutdown() {
    unsafe {
        let _ = MFShutdown();
    }
}

fn create_video_type(subtype: GUID, width: u32, height: u32, fps: u32, bitrate: u32) -> Result<IMFMediaType> {
    unsafe {
        let mt = MFCreateMediaType()?;
        mt.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Video)?;
        mt.SetGUID(&MF_MT_SUBTYPE, &subtype)?;
        mt.SetUINT32(&MF_MT_AVG_BITRATE, bitrate)?;
        mt.SetUINT32(&MF_MT_INTERLACE_MODE, MFVideoInterlace_Progressive.0 as u32)?;
        MFSetAttributeSize(&mt, &MF_MT_FRAME_SIZE, width, height)?;
        MFSetAttributeRatio(&mt, &MF_MT_FRAME_RATE, fps, 1)?;
        MFSetAttributeRatio(&mt, &MF_MT_PIXEL_ASPECT_RATIO, 1, 1)?;
        Ok(mt)
    }
}

/// A raw H.264/H.265 encoder transform producing elementary-stream samples
/// from BGRA frames (§4.7 "accepts BGRA or NV12 input and emits elementary
/// stream samples").
pub struct RawVideoEncoder {
    transform: IMFTransform,
    reader: TextureReader,
    width: u32,
    height: u32,
    input_stream_id: u32,
    output_stream_id: u32,
}

impl RawVideoEncoder {
    pub fn new(
        device: &windows::Win32::Graphics::Direct3D11::ID3D11Device,
        context: &windows::Win32::Graphics::Direct3D11::ID3D11DeviceContext,
        codec: VideoCodec,
        width: u32,
        height: u32,
        fps: u32,
        bitrate: u32,
        _rate_control: RateControl,
        encoder_mode: EncoderMode,
    ) -> Result<Self> {
        let output_subtype = match codec {
            VideoCodec::H264 => MFVideoFormat_H264,
            VideoCodec::H265 => MFVideoFormat_HEVC,
        };

        let transform = find_encoder_mft(output_subtype, encoder_mode)?;

        let mut input_count = 0u32;
        let mut output_count = 0u32;
        unsafe { transform.GetStreamCount(&mut input_count, &mut output_count)? };

        let (input_stream_id, output_stream_id) = unsafe {
            let mut input_ids = vec![0u32; input_count as usize];
            let mut output_ids = vec![0u32; output_count as usize];
            if transform.GetStreamIDs(&mut input_ids, &mut output_ids).is_err() {
                // Fixed stream IDs (0, 0) when the MFT doesn't support arbitrary IDs.
                (0, 0)
            } else {
                (input_ids[0], output_ids[0])
            }
        };

        let output_type = create_video_type(output_subtype, width, height, fps, bitrate)?;
        unsafe { transform.SetOutputType(output_stream_id, &output_type, 0)? };

        let input_type = create_video_type(MFVideoFormat_ARGB32, width, height, fps, bitrate)?;
        unsafe { transform.SetInputType(input_stream_id, &input_type, 0)? };

        unsafe {
            transform.ProcessMessage(MFT_MESSAGE_NOTIFY_BEGIN_STREAMING, 0)?;
            transform.ProcessMessage(MFT_MESSAGE_NOTIFY_START_OF_STREAM, 0)?;
        }

        Ok(Self {
            transform,
            reader: TextureReader::new(device.clone(), context.clone()),
            width,
            height,
            input_stream_id,
            output_stream_id,
        })
    }

    /// Submit one BGRA frame at `pts_100ns`, draining any samples the
    /// encoder is ready to emit before returning.
    pub fn submit_frame(&mut self, texture: &ID3D11Texture2D, pts_100ns: i64) -> Result<Vec<EncodedSample>> {
        let sample = self.sample_from_texture(texture, pts_100ns)?;
        match unsafe { self.transform.ProcessInput(self.input_stream_id, &sample, 0) } {
            Ok(()) => {}
            Err(e) if e.code() == MF_E_NOTACCEPTING => {
                // Drain first, then retry once.
                let mut drained = self.drain_available()?;
                unsafe { self.transform.ProcessInput(self.input_stream_id, &sample, 0)? };
                drained.extend(self.drain_available()?);
                return Ok(drained);
            }
            Err(e) => return Err(e).context("IMFTransform::ProcessInput failed"),
        }
        self.drain_available()
    }

    fn sample_from_texture(&mut self, texture: &ID3D11Texture2D, pts_100ns: i64) -> Result<IMFSample> {
        // Software fallback: stage the texture to a CPU-readable BGRA buffer.
        // Hardware MFTs that accept DXGI surfaces directly are an
        // optimization left for a future pass; see DESIGN.md.
        let bgra = self.reader.read_texture(texture)?;
        unsafe {
            let sample = MFCreateSample()?;
            let buffer = MFCreateMemoryBuffer(bgra.len() as u32)?;
            let mut data = std::ptr::null_mut();
            buffer.Lock(&mut data, None, None)?;
            std::ptr::copy_nonoverlapping(bgra.as_ptr(), data, bgra.len());
            buffer.Unlock()?;
            buffer.SetCurrentLength(bgra.len() as u32)?;
            sample.AddBuffer(&buffer)?;
            sample.SetSampleTime(pts_100ns)?;
            Ok(sample)
        }
    }

    fn drain_available(&mut self) -> Result<Vec<EncodedSample>> {
        let mut out = Vec::new();
        loop {
            let mut stream_info = MFT_OUTPUT_STREAM_INFO::default();
            unsafe { self.transform.GetOutputStreamInfo(self.output_stream_id, &mut stream_info)? };

            let buffer = unsafe { MFCreateMemoryBuffer(stream_info.cbSize.max(1))? };
            let sample = unsafe { MFCreateSample()? };
            unsafe { sample.AddBuffer(&buffer)? };

            let mut output_buffer = MFT_OUTPUT_DATA_BUFFER {
                dwStreamID: self.output_stream_id,
                pSample: std::mem::ManuallyDrop::new(Some(sample.clone())),
                dwStatus: 0,
                pEvents: std::mem::ManuallyDrop::new(None),
            };
            let mut status = 0u32;
            let hr = unsafe {
                self.transform
                    .ProcessOutput(0, std::slice::from_mut(&mut output_buffer), &mut status)
            };
            unsafe { std::mem::ManuallyDrop::drop(&mut output_buffer.pSample) };
            unsafe { std::mem::ManuallyDrop::drop(&mut output_buffer.pEvents) };

            match hr {
                Ok(()) => out.push(encoded_sample_from(&sample)?),
                Err(e) if e.code() == MF_E_TRANSFORM_NEED_MORE_INPUT => break,
                Err(e) => return Err(e).context("IMFTransform::ProcessOutput failed"),
            }
        }
        Ok(out)
    }

    /// Flush and drain any remaining buffered samples (called once at the
    /// end of a recording/export to finish the compressed stream).
    pub fn drain_end_of_stream(&mut self) -> Result<Vec<EncodedSample>> {
        unsafe {
            self.transform.ProcessMessage(MFT_MESSAGE_NOTIFY_END_OF_STREAM, 0)?;
            self.transform.ProcessMessage(MFT_MESSAGE_COMMAND_DRAIN, 0)?;
        }
        self.drain_available()
    }
}

fn encoded_sample_from(sample: &IMFSample) -> Result<EncodedSample> {
    unsafe {
        let buffer = sample.GetBufferByIndex(0)?;
        let mut data_ptr = std::ptr::null_mut();
        let mut len = 0u32;
        buffer.Lock(&mut data_ptr, None, Some(&mut len))?;
        let data = std::slice::from_raw_parts(data_ptr, len as usize).to_vec();
        buffer.Unlock()?;

        let pts_100ns = sample.GetSampleTime().unwrap_or(0);
        let duration_100ns = sample.GetSampleDuration().unwrap_or(0);
        let is_keyframe = sample.GetUINT32(&MFSampleExtension_CleanPoint).unwrap_or(0) != 0;

        Ok(EncodedSample {
            data,
            pts_100ns,
            duration_100ns,
            is_keyframe,
            is_audio: false,
        })
    }
}

fn enum_encoder_mft(output_subtype: GUID, flags: u32) -> Result<Option<IMFTransform>> {
    let output_type = MFT_REGISTER_TYPE_INFO {
        guidMajorType: MFMediaType_Video,
        guidSubtype: output_subtype,
    };

    let mut activates: *mut Option<IMFActivate> = std::ptr::null_mut();
    let mut count = 0u32;
    unsafe {
        MFTEnumEx(MFT_CATEGORY_VIDEO_ENCODER, flags, None, Some(&output_type), &mut activates, &mut count)?;
    }

    if count == 0 || activates.is_null() {
        return Ok(None);
    }

    let activate_slice = unsafe { std::slice::from_raw_parts(activates, count as usize) };
    let transform: IMFTransform = activate_slice[0]
        .as_ref()
        .context("null IMFActivate from MFTEnumEx")?
        .ActivateObject()
        .context("IMFActivate::ActivateObject failed")?;

    unsafe {
        windows::Win32::System::Com::CoTaskMemFree(Some(activates as *const _));
    }

    Ok(Some(transform))
}

/// Pick an encoder MFT per `encoder_mode`: `Auto` prefers hardware and falls
/// back to software, the forced modes fail outright rather than silently
/// substituting the other kind.
fn find_encoder_mft(output_subtype: GUID, encoder_mode: EncoderMode) -> Result<IMFTransform> {
    let hardware_flags = MFT_ENUM_FLAG_HARDWARE.0 as u32 | MFT_ENUM_FLAG_SYNCMFT.0 as u32;
    let software_flags = MFT_ENUM_FLAG_SYNCMFT.0 as u32 | MFT_ENUM_FLAG_ASYNCMFT.0 as u32;

    let found = match encoder_mode {
        EncoderMode::HardwareForced => enum_encoder_mft(output_subtype, hardware_flags)?,
        EncoderMode::SoftwareForced => enum_encoder_mft(output_subtype, software_flags)?,
        EncoderMode::Auto => match enum_encoder_mft(output_subtype, hardware_flags)? {
            Some(t) => Some(t),
            None => enum_encoder_mft(output_subtype, software_flags)?,
        },
    };

    found.ok_or_else(|| {
        CoreError::ResourceCreationFailed(format!(
            "no {:?} H.264/H.265 encoder MFT available",
            encoder_mode
        ))
        .into()
    })
}

/// Stream-copy MP4 muxer (§4.8 `save_replay`): writes already-compressed
/// samples straight through without re-encoding.
///
/// Grounded directly on `replay_buffer/muxer.cpp`: converters disabled,
/// per-stream timestamps rebased so each stream's first sample starts at 0,
/// keyframes marked via `MFSampleExtension_CleanPoint`.
pub struct StreamCopyMuxer {
    writer: IMFSinkWriter,
    video_stream: u32,
    audio_stream: Option<u32>,
    first_video_pts: Option<i64>,
    first_audio_pts: Option<i64>,
}

impl StreamCopyMuxer {
    pub fn new(video_type: &IMFMediaType, audio_type: Option<&IMFMediaType>, output_path: &Path) -> Result<Self> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let attributes = unsafe {
            let attrs = MFCreateAttributes(2)?;
            attrs.SetUINT32(&MF_READWRITE_DISABLE_CONVERTERS, 1)?;
            attrs
        };

        let output_url = windows::core::HSTRING::from(output_path.to_string_lossy().as_ref());
        let writer = unsafe { MFCreateSinkWriterFromURL(&output_url, None, &attributes)? };

        let video_stream = unsafe { writer.AddStream(video_type)? };
        unsafe { writer.SetInputMediaType(video_stream, video_type, None)? };

        let audio_stream = match audio_type {
            Some(at) => match unsafe { writer.AddStream(at) } {
                Ok(idx) => match unsafe { writer.SetInputMediaType(idx, at, None) } {
                    Ok(()) => Some(idx),
                    Err(e) => {
                        log::warn!("failed to set audio input type, continuing without audio: {}", e);
                        None
                    }
                },
                Err(e) => {
                    log::warn!("failed to add audio stream, continuing without audio: {}", e);
                    None
                }
            },
            None => None,
        };

        unsafe { writer.BeginWriting()? };

        Ok(Self {
            writer,
            video_stream,
            audio_stream,
            first_video_pts: None,
            first_audio_pts: None,
        })
    }

    /// Write one already-compressed sample, rebasing its PTS so the first
    /// sample on its stream lands at time zero.
    pub fn write_sample(&mut self, frame: &EncodedSample) -> Result<()> {
        let stream = if frame.is_audio {
            let Some(stream) = self.audio_stream else { return Ok(()) };
            stream
        } else {
            self.video_stream
        };

        let base = if frame.is_audio {
            *self.first_audio_pts.get_or_insert(frame.pts_100ns)
        } else {
            *self.first_video_pts.get_or_insert(frame.pts_100ns)
        };
        let adjusted_pts = (frame.pts_100ns - base).max(0);

        unsafe {
            let sample = MFCreateSample()?;
            let buffer = MFCreateMemoryBuffer(frame.data.len() as u32)?;
            let mut dest = std::ptr::null_mut();
            buffer.Lock(&mut dest, None, None)?;
            std::ptr::copy_nonoverlapping(frame.data.as_ptr(), dest, frame.data.len());
            buffer.Unlock()?;
            buffer.SetCurrentLength(frame.data.len() as u32)?;
            sample.AddBuffer(&buffer)?;
            sample.SetSampleTime(adjusted_pts)?;
            if frame.duration_100ns > 0 {
                sample.SetSampleDuration(frame.duration_100ns)?;
            }
            if frame.is_keyframe {
                sample.SetUINT32(&MFSampleExtension_CleanPoint, 1)?;
            }
            self.writer.WriteSample(stream, &sample)?;
        }
        Ok(())
    }

    pub fn finalize(self) -> Result<()> {
        unsafe { self.writer.Finalize() }.context("IMFSinkWriter::Finalize failed")
    }
}
