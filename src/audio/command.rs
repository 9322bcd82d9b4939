//! Messages from the core to the output callback.

/// Messages pushed to the cpal output thread through the ring buffer.
#[derive(Debug)]
pub enum AudioCommand {
    /// An interleaved block rendered by the engine.
    Block(Vec<f32>),
    /// Device-level output gain (0.0 to 1.0), applied after the master bus.
    SetVolume(f32),
    /// Drop everything queued but not yet played.
    Flush,
}
