// EncoderFanout (§4.5): arbitrates the background capture consumers that
// share one CaptureSession — the video recorder and the replay buffer.
//
// Grounded in the original's `recording/recording.cpp` and
// `replay_buffer/disk_ring_buffer.cpp` lifecycles, which never run
// concurrently against the same window (the original UI disables one
// toggle while the other is active) and in `preview/capture_integration.cpp`
// for the "first consumer owns the device" sharing pattern already adapted
// once for `PreviewView`.

pub mod mf;

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};

use crate::d3d11::D3D11Context;
use crate::error::CoreError;

/// Which background consumer currently owns the shared capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveConsumer {
    None,
    Recording,
    ReplayBuffer,
}

/// Shares one headless D3D device between the recorder and the replay
/// buffer, and enforces that recording and replay-buffering never run at
/// the same time (§4.5 "mutually exclusive").
pub struct EncoderFanout {
    device: Option<D3D11Context>,
    active: ActiveConsumer,
    motion_photo_enabled: AtomicBool,
    instant_replay_enabled: AtomicBool,
}

impl EncoderFanout {
    pub fn new() -> Self {
        Self {
            device: None,
            active: ActiveConsumer::None,
            motion_photo_enabled: AtomicBool::new(false),
            instant_replay_enabled: AtomicBool::new(false),
        }
    }

    /// Shared headless D3D device, created on first use and reused by every
    /// later consumer. Subsequent callers still must call
    /// `enable_multithread_protection` themselves before touching the
    /// context from a new thread — acquiring a clone does not do this for
    /// them, since only the caller knows whether it already has.
    pub fn acquire_device(&mut self) -> Result<D3D11Context> {
        if self.device.is_none() {
            let ctx = crate::d3d11::create_headless_d3d11_device()?;
            ctx.enable_multithread_protection()?;
            self.device = Some(ctx);
        }
        Ok(self.device.as_ref().unwrap().clone())
    }

    pub fn is_recording(&self) -> bool {
        self.active == ActiveConsumer::Recording
    }

    pub fn is_replay_buffering(&self) -> bool {
        self.active == ActiveConsumer::ReplayBuffer
    }

    /// Claim the shared session for recording. Fails if the replay buffer is
    /// currently active (§4.5: "starting recording while replay-buffering is
    /// active is rejected").
    pub fn try_start_recording(&mut self) -> Result<()> {
        if self.active == ActiveConsumer::ReplayBuffer {
            bail!(CoreError::FeatureConflict(
                "cannot start recording while the replay buffer is active".into()
            ));
        }
        self.active = ActiveConsumer::Recording;
        Ok(())
    }

    pub fn stop_recording(&mut self) {
        if self.active == ActiveConsumer::Recording {
            self.active = ActiveConsumer::None;
        }
    }

    /// Claim the shared session for replay buffering. A no-op (not an error)
    /// while recording is active (§4.5: "toggling replay while recording
    /// does nothing").
    pub(crate) fn try_start_replay_buffer(&mut self) -> bool {
        if self.active == ActiveConsumer::Recording {
            return false;
        }
        self.active = ActiveConsumer::ReplayBuffer;
        true
    }

    pub(crate) fn stop_replay_buffer(&mut self) {
        if self.active == ActiveConsumer::ReplayBuffer {
            self.active = ActiveConsumer::None;
        }
    }

    /// Update the two independent feature toggles that gate the replay
    /// buffer (§4.5: "motion-photo and instant-replay both gate
    /// replay-buffer-active; on iff either is enabled, off when both are
    /// disabled"). Returns whether the replay buffer should be
    /// running after this call.
    pub fn set_replay_desired(&mut self, motion_photo: bool, instant_replay: bool) -> bool {
        self.motion_photo_enabled.store(motion_photo, Ordering::Relaxed);
        self.instant_replay_enabled.store(instant_replay, Ordering::Relaxed);

        let wants_replay = motion_photo || instant_replay;
        if wants_replay {
            self.try_start_replay_buffer()
        } else {
            self.stop_replay_buffer();
            false
        }
    }

    pub fn replay_desired(&self) -> bool {
        self.motion_photo_enabled.load(Ordering::Relaxed) || self.instant_replay_enabled.load(Ordering::Relaxed)
    }

    pub fn motion_photo_desired(&self) -> bool {
        self.motion_photo_enabled.load(Ordering::Relaxed)
    }

    pub fn instant_replay_desired(&self) -> bool {
        self.instant_replay_enabled.load(Ordering::Relaxed)
    }
}

impl Default for EncoderFanout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_and_replay_buffer_are_mutually_exclusive() {
        let mut fanout = EncoderFanout::new();
        fanout.try_start_recording().unwrap();
        assert!(!fanout.try_start_replay_buffer());
        assert!(fanout.is_recording());
    }

    #[test]
    fn starting_recording_while_replay_active_fails() {
        let mut fanout = EncoderFanout::new();
        assert!(fanout.try_start_replay_buffer());
        assert!(fanout.try_start_recording().is_err());
        assert!(fanout.is_replay_buffering());
    }

    #[test]
    fn replay_buffer_follows_either_toggle() {
        let mut fanout = EncoderFanout::new();
        assert!(fanout.set_replay_desired(true, false));
        assert!(fanout.is_replay_buffering());
        assert!(fanout.set_replay_desired(true, true));
        assert!(!fanout.set_replay_desired(false, false));
        assert!(!fanout.is_replay_buffering());
    }

    #[test]
    fn recording_can_start_after_replay_buffer_stops() {
        let mut fanout = EncoderFanout::new();
        assert!(fanout.set_replay_desired(false, true));
        fanout.stop_replay_buffer();
        assert!(fanout.try_start_recording().is_ok());
    }
}
