// ReplayBuffer export (§4.8): `save_replay` stream-copy muxes the last N
// seconds straight out of the ring buffer, and `scale_video` re-encodes a
// clip down to a small resolution for motion-photo packaging.
//
// Grounded in the original's `replay_buffer/muxer.cpp` (stream-copy export,
// exactly what `save_replay` below drives through `StreamCopyMuxer`) and
// `replay_buffer/trimmer.cpp` (`calculate_scaled_dimensions`, `scale_video`:
// decode-to-NV12-at-target-size + sink-writer auto-reencode to H.264, PCM
// decode + AAC re-encode for audio, independently rebased timestamps).

use std::path::Path;

use anyhow::{bail, Context, Result};
use windows::core::HSTRING;
use windows::Win32::Media::MediaFoundation::*;

use super::ring_buffer::RingBuffer;
use crate::encoder::mf::{EncodedSample, StreamCopyMuxer};

/// Mux the trailing `duration_seconds` of buffered frames into a standalone
/// MP4 via stream-copy (no re-encoding).
pub fn save_replay(
    buffer: &RingBuffer,
    video_type: &IMFMediaType,
    audio_type: Option<&IMFMediaType>,
    duration_seconds: f64,
    output_path: &Path,
) -> Result<()> {
    let frames = buffer.get_recent_frames(duration_seconds)?;
    if frames.is_empty() {
        bail!("replay buffer has no frames to export");
    }

    let payloads = buffer.read_frames_bulk(&frames)?;
    let mut muxer = StreamCopyMuxer::new(video_type, audio_type, output_path)?;

    for (meta, data) in frames.iter().zip(payloads.into_iter()) {
        let sample = EncodedSample {
            data,
            pts_100ns: meta.pts_100ns,
            duration_100ns: meta.duration_100ns,
            is_keyframe: meta.is_keyframe,
            is_audio: meta.is_audio,
        };
        muxer.write_sample(&sample)?;
    }

    muxer.finalize()
}

/// Short-edge-preserving scale to `target_short_edge`, snapped to even
/// dimensions (matches the live encoder's even-dimension requirement).
pub fn calculate_scaled_dimensions(source_width: u32, source_height: u32, target_short_edge: u32) -> (u32, u32) {
    let (short, long) = if source_width <= source_height {
        (source_width, source_height)
    } else {
        (source_height, source_width)
    };
    if short == 0 {
        return (target_short_edge, target_short_edge);
    }

    let scale = target_short_edge as f64 / short as f64;
    let scaled_long = ((long as f64 * scale).round() as u32 / 2) * 2;
    let scaled_short = (target_short_edge / 2) * 2;

    if source_width <= source_height {
        (scaled_short.max(2), scaled_long.max(2))
    } else {
        (scaled_long.max(2), scaled_short.max(2))
    }
}

fn native_video_size(reader: &IMFSourceReader) -> Result<(u32, u32)> {
    unsafe {
        let media_type = reader.GetNativeMediaType(MF_SOURCE_READER_FIRST_VIDEO_STREAM.0 as u32, 0)?;
        let mut width = 0u32;
        let mut height = 0u32;
        MFGetAttributeSize(&media_type, &MF_MT_FRAME_SIZE, &mut width, &mut height)
            .context("MFGetAttributeSize failed")?;
        Ok((width, height))
    }
}

fn h264_output_type(width: u32, height: u32, fps: u32, bitrate: u32) -> Result<IMFMediaType> {
    unsafe {
        let mt = MFCreateMediaType()?;
        mt.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Video)?;
        mt.SetGUID(&MF_MT_SUBTYPE, &MFVideoFormat_H264)?;
        mt.SetUINT32(&MF_MT_AVG_BITRATE, bitrate)?;
        mt.SetUINT32(&MF_MT_INTERLACE_MODE, MFVideoInterlace_Progressive.0 as u32)?;
        MFSetAttributeSize(&mt, &MF_MT_FRAME_SIZE, width, height)?;
        MFSetAttributeRatio(&mt, &MF_MT_FRAME_RATE, fps, 1)?;
        MFSetAttributeRatio(&mt, &MF_MT_PIXEL_ASPECT_RATIO, 1, 1)?;
        Ok(mt)
    }
}

fn aac_output_type() -> Result<IMFMediaType> {
    unsafe {
        let mt = MFCreateMediaType()?;
        mt.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Audio)?;
        mt.SetGUID(&MF_MT_SUBTYPE, &MFAudioFormat_AAC)?;
        mt.SetUINT32(&MF_MT_AUDIO_SAMPLES_PER_SECOND, 48_000)?;
        mt.SetUINT32(&MF_MT_AUDIO_NUM_CHANNELS, 2)?;
        mt.SetUINT32(&MF_MT_AUDIO_BITS_PER_SAMPLE, 16)?;
        mt.SetUINT32(&MF_MT_AUDIO_AVG_BYTES_PER_SECOND, 128_000 / 8)?;
        Ok(mt)
    }
}

/// Add an AAC output stream to `writer` with a PCM input type, returning its
/// stream index on success and `None` on any negotiation failure (audio is
/// best-effort per §4.8).
fn add_audio_output_stream(writer: &IMFSinkWriter) -> Option<u32> {
    let aac = aac_output_type().ok()?;
    let stream = unsafe { writer.AddStream(&aac) }.ok()?;

    let pcm = unsafe { MFCreateMediaType() }.ok()?;
    unsafe {
        pcm.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Audio).ok()?;
        pcm.SetGUID(&MF_MT_SUBTYPE, &MFAudioFormat_PCM).ok()?;
        writer.SetInputMediaType(stream, &pcm, None).ok()?;
    }
    Some(stream)
}

/// Re-encode `source_path` to a small H.264 clip scaled to
/// `target_short_edge`, for motion-photo packaging (§4.8 `scale_video`).
/// Audio is carried through best-effort: failing to negotiate an audio path
/// is logged and the output is produced video-only.
pub fn scale_video(source_path: &Path, output_path: &Path, target_short_edge: u32, fps: u32) -> Result<()> {
    let source_url = HSTRING::from(source_path.to_string_lossy().as_ref());
    let reader: IMFSourceReader = unsafe { MFCreateSourceReaderFromURL(&source_url, None)? };

    let (native_w, native_h) = native_video_size(&reader)?;
    let (width, height) = calculate_scaled_dimensions(native_w, native_h, target_short_edge);

    let decode_type = unsafe {
        let mt = MFCreateMediaType()?;
        mt.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Video)?;
        mt.SetGUID(&MF_MT_SUBTYPE, &MFVideoFormat_NV12)?;
        MFSetAttributeSize(&mt, &MF_MT_FRAME_SIZE, width, height)?;
        mt
    };
    unsafe {
        reader.SetCurrentMediaType(MF_SOURCE_READER_FIRST_VIDEO_STREAM.0 as u32, None, &decode_type)?;
    }

    let audio_enabled = unsafe {
        let pcm = MFCreateMediaType().ok();
        match pcm {
            Some(mt) => {
                let ok = mt.SetGUID(&MF_MT_MAJOR_TYPE, &MFMediaType_Audio).is_ok()
                    && mt.SetGUID(&MF_MT_SUBTYPE, &MFAudioFormat_PCM).is_ok()
                    && reader
                        .SetCurrentMediaType(MF_SOURCE_READER_FIRST_AUDIO_STREAM.0 as u32, None, &mt)
                        .is_ok();
                ok
            }
            None => false,
        }
    };
    if !audio_enabled {
        log::info!("scale_video: no audio track negotiated, producing video-only output");
    }

    let attributes = unsafe { MFCreateAttributes(1)? };
    let output_url = HSTRING::from(output_path.to_string_lossy().as_ref());
    let writer = unsafe { MFCreateSinkWriterFromURL(&output_url, None, &attributes)? };

    let video_out = h264_output_type(width, height, fps, 4_000_000)?;
    let video_stream = unsafe { writer.AddStream(&video_out)? };
    unsafe { writer.SetInputMediaType(video_stream, &decode_type, None)? };

    let audio_stream = if audio_enabled {
        add_audio_output_stream(&writer)
    } else {
        None
    };

    unsafe { writer.BeginWriting()? };

    let mut first_video_pts: Option<i64> = None;
    let mut first_audio_pts: Option<i64> = None;

    loop {
        let mut actual_stream = 0u32;
        let mut flags = 0u32;
        let mut timestamp = 0i64;
        let mut sample: Option<IMFSample> = None;

        unsafe {
            reader.ReadSample(
                MF_SOURCE_READER_ANY_STREAM.0 as u32,
                0,
                Some(&mut actual_stream),
                Some(&mut flags),
                Some(&mut timestamp),
                Some(&mut sample),
            )?;
        }

        if flags & MF_SOURCE_READERF_ENDOFSTREAM.0 as u32 != 0 {
            break;
        }
        let Some(sample) = sample else { continue };

        let is_video = actual_stream == MF_SOURCE_READER_FIRST_VIDEO_STREAM.0 as u32;
        let out_stream = if is_video {
            video_stream
        } else if let Some(a) = audio_stream {
            a
        } else {
            continue;
        };

        let base = if is_video {
            *first_video_pts.get_or_insert(timestamp)
        } else {
            *first_audio_pts.get_or_insert(timestamp)
        };
        unsafe {
            sample.SetSampleTime((timestamp - base).max(0))?;
            writer.WriteSample(out_stream, &sample)?;
        }
    }

    unsafe { writer.Finalize() }.context("IMFSinkWriter::Finalize failed (scale_video)")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_preserves_aspect_for_landscape() {
        let (w, h) = calculate_scaled_dimensions(1920, 1080, 480);
        assert_eq!(h, 480);
        assert_eq!(w % 2, 0);
        assert!((w as f64 / h as f64 - 1920.0 / 1080.0).abs() < 0.05);
    }

    #[test]
    fn scale_preserves_aspect_for_portrait() {
        let (w, h) = calculate_scaled_dimensions(1080, 1920, 480);
        assert_eq!(w, 480);
        assert_eq!(h % 2, 0);
    }
}
