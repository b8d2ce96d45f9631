// ReplayBuffer's disk-backed ring (§4.8): one flat `buffer.dat` file plus an
// in-memory index of frame metadata. The write cursor grows linearly and
// resets to 0 once the next frame no longer fits before `file_size_limit`
// (true wrap); after a wrap, old frames still occupying the bytes the
// wrapped cursor is about to overwrite are evicted from the head.
//
// Grounded directly on `replay_buffer/disk_ring_buffer.cpp`:
// `trim_old_frames`, `initialize`, `append_frame`, `get_recent_frames`,
// `read_frame`, `read_frames_unlocked`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy)]
pub struct FrameMetadata {
    pub file_offset: i64,
    pub size: u32,
    pub pts_100ns: i64,
    pub duration_100ns: i64,
    pub is_keyframe: bool,
    pub is_audio: bool,
}

struct RingState {
    file: File,
    index: std::collections::VecDeque<FrameMetadata>,
    write_position: i64,
    file_size_limit: i64,
}

/// Disk ring buffer for compressed audio/video frames, protected by a single
/// mutex (§5: "the index and write cursor are protected by a mutex").
pub struct RingBuffer {
    state: Mutex<Option<RingState>>,
    path: Mutex<Option<PathBuf>>,
}

impl RingBuffer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            path: Mutex::new(None),
        }
    }

    pub fn initialize(&self, cache_dir: &Path, max_file_size: i64) -> Result<()> {
        std::fs::create_dir_all(cache_dir).context("creating replay buffer cache dir")?;
        let path = cache_dir.join("buffer.dat");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;

        *self.state.lock().unwrap() = Some(RingState {
            file,
            index: std::collections::VecDeque::new(),
            write_position: 0,
            file_size_limit: max_file_size,
        });
        *self.path.lock().unwrap() = Some(path);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        match self.state.lock().unwrap().as_ref() {
            Some(s) => s.index.is_empty(),
            None => true,
        }
    }

    /// Append one compressed frame, trimming the oldest frames first if
    /// needed to make room. Never evicts the last remaining video keyframe
    /// (§4.8 invariant) — if trimming down to it still leaves no room, the
    /// frame is rejected as too large rather than dropping the buffer's
    /// only decodable anchor.
    pub fn append_frame(&self, data: &[u8], pts_100ns: i64, duration_100ns: i64, is_keyframe: bool, is_audio: bool) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let state = guard.as_mut().context("replay buffer not initialized")?;

        let size = data.len() as u32;
        trim_old_frames(state, size as i64)?;

        if state.write_position + size as i64 > state.file_size_limit {
            bail!(CoreError::InvalidArgument(format!(
                "frame of {} bytes exceeds the replay buffer's {} byte limit",
                size, state.file_size_limit
            )));
        }

        // The wrap in `trim_old_frames` only resets the cursor; it stops
        // evicting once the oldest surviving frame is the buffer's last
        // protected keyframe. If that frame's bytes still sit in the span
        // we're about to overwrite, refuse rather than corrupt it.
        if let Some(oldest) = state.index.front() {
            if oldest.file_offset >= state.write_position && oldest.file_offset < state.write_position + size as i64 {
                bail!(CoreError::InvalidArgument(format!(
                    "frame of {} bytes would overwrite the replay buffer's last protected keyframe",
                    size
                )));
            }
        }

        state
            .file
            .seek(SeekFrom::Start(state.write_position as u64))
            .context("seeking replay buffer for append")?;
        state.file.write_all(data).context("writing replay buffer frame")?;

        state.index.push_back(FrameMetadata {
            file_offset: state.write_position,
            size,
            pts_100ns,
            duration_100ns,
            is_keyframe,
            is_audio,
        });
        state.write_position += size as i64;
        Ok(())
    }

    /// Frames covering the trailing `duration_seconds`, widened backward to
    /// the nearest preceding video keyframe so the returned slice is
    /// independently decodable (§4.8 `get_recent_frames`).
    pub fn get_recent_frames(&self, duration_seconds: f64) -> Result<Vec<FrameMetadata>> {
        let guard = self.state.lock().unwrap();
        let state = guard.as_ref().context("replay buffer not initialized")?;
        if state.index.is_empty() {
            return Ok(Vec::new());
        }

        let target_100ns = (duration_seconds * 10_000_000.0) as i64;
        let mut accumulated = 0i64;
        let mut start_index = state.index.len() - 1;
        for (i, frame) in state.index.iter().enumerate().rev() {
            accumulated += frame.duration_100ns.max(1);
            start_index = i;
            if accumulated >= target_100ns {
                break;
            }
        }

        let mut keyframe_index = start_index;
        for i in (0..=start_index).rev() {
            if state.index[i].is_keyframe && !state.index[i].is_audio {
                keyframe_index = i;
                break;
            }
            keyframe_index = i;
        }

        Ok(state.index.iter().skip(keyframe_index).copied().collect())
    }

    /// Read one frame's bytes from disk via an independent read-only handle
    /// so concurrent exports don't contend the writer's file cursor.
    pub fn read_frame(&self, frame: &FrameMetadata) -> Result<Vec<u8>> {
        let path_guard = self.path.lock().unwrap();
        let path = path_guard.as_ref().context("replay buffer not initialized")?;
        let mut file = File::open(path).with_context(|| format!("opening {} for read", path.display()))?;
        file.seek(SeekFrom::Start(frame.file_offset as u64))?;
        let mut buf = vec![0u8; frame.size as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_frames_bulk(&self, frames: &[FrameMetadata]) -> Result<Vec<Vec<u8>>> {
        let path_guard = self.path.lock().unwrap();
        let path = path_guard.as_ref().context("replay buffer not initialized")?;
        let mut file = File::open(path).with_context(|| format!("opening {} for read", path.display()))?;
        let mut out = Vec::with_capacity(frames.len());
        for frame in frames {
            file.seek(SeekFrom::Start(frame.file_offset as u64))?;
            let mut buf = vec![0u8; frame.size as usize];
            file.read_exact(&mut buf)?;
            out.push(buf);
        }
        Ok(out)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Make room for an `incoming_size`-byte append, wrapping the write cursor
/// back to the start of the file once the tail has no space left, then
/// evicting old frames from the head that the wrapped cursor would
/// overwrite. Never evicts the last remaining video keyframe — an empty
/// buffer has no "last keyframe" to protect, so the loop naturally stops
/// once the index holds just that one frame.
fn trim_old_frames(state: &mut RingState, incoming_size: i64) -> Result<()> {
    if state.write_position + incoming_size > state.file_size_limit && state.write_position > 0 {
        state.write_position = 0;
    }

    while state.index.len() > 1 {
        let oldest = *state.index.front().expect("index.len() > 1");
        let overlaps_write_span =
            oldest.file_offset >= state.write_position && oldest.file_offset < state.write_position + incoming_size;
        if !overlaps_write_span {
            break;
        }

        let remaining_keyframes = state.index.iter().filter(|f| f.is_keyframe && !f.is_audio).count();
        let oldest_is_last_keyframe = oldest.is_keyframe && !oldest.is_audio && remaining_keyframes <= 1;
        if oldest_is_last_keyframe {
            break;
        }

        state.index.pop_front();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn frame(pts: i64, dur: i64, keyframe: bool) -> (Vec<u8>, i64, i64, bool, bool) {
        (vec![0u8; 16], pts, dur, keyframe, false)
    }

    #[test]
    fn append_and_recent_frames_round_trip() {
        let dir = tempdir().unwrap();
        let buf = RingBuffer::new();
        buf.initialize(dir.path(), 1024 * 1024).unwrap();

        let (d, pts, dur, kf, audio) = frame(0, 333_333, true);
        buf.append_frame(&d, pts, dur, kf, audio).unwrap();
        let (d, pts, dur, kf, audio) = frame(333_333, 333_333, false);
        buf.append_frame(&d, pts, dur, kf, audio).unwrap();

        let recent = buf.get_recent_frames(10.0).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].is_keyframe);
    }

    #[test]
    fn rejects_frame_larger_than_limit() {
        let dir = tempdir().unwrap();
        let buf = RingBuffer::new();
        buf.initialize(dir.path(), 8).unwrap();
        let data = vec![0u8; 64];
        assert!(buf.append_frame(&data, 0, 0, true, false).is_err());
    }

    #[test]
    fn never_evicts_the_last_keyframe() {
        let dir = tempdir().unwrap();
        let buf = RingBuffer::new();
        buf.initialize(dir.path(), 64).unwrap();

        buf.append_frame(&vec![0u8; 32], 0, 0, true, false).unwrap();
        // This would need to evict the only keyframe to fit; it must fail
        // rather than silently destroying the buffer's decodable anchor.
        let result = buf.append_frame(&vec![0u8; 48], 1, 0, false, false);
        assert!(result.is_err());
        assert!(!buf.is_empty());
    }

    #[test]
    fn wraps_and_keeps_accepting_frames_past_one_lap() {
        // 10-byte frames in a 64-byte ring: after ~6 frames the cursor hits
        // the limit and must wrap rather than freezing on the last keyframe.
        let dir = tempdir().unwrap();
        let buf = RingBuffer::new();
        buf.initialize(dir.path(), 64).unwrap();

        for i in 0..40i64 {
            let keyframe = i % 4 == 0;
            buf.append_frame(&vec![0u8; 10], i, 1, keyframe, false)
                .unwrap_or_else(|e| panic!("append {} failed: {:#}", i, e));
        }

        assert!(!buf.is_empty());
        let recent = buf.get_recent_frames(1000.0).unwrap();
        assert!(recent.len() < 40, "ring should have evicted old frames, not retained all of them");
    }
}
