// Still-image encoding module, used by ScreenshotEncoder (§4.6) and the
// motion-photo export path in ReplayBuffer.

pub mod basic;
