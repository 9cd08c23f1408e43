// src/config.rs

// Default engine configuration
pub const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
pub const DEFAULT_RING_SECONDS: usize = 8;
pub const DEFAULT_MAX_QUEUED_OPS: usize = 64;
pub const DEFAULT_MAX_ACTIVE_OPS: usize = 64;

/// What happens to the ring buffer once the loop has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordMode {
    /// Keep recording: the loop content rolls with the input
    #[default]
    Rolling,

    /// Stop recording after the first full pass
    FreezeWhenFull,
}

/// Fixed sizes and behaviour, chosen at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,

    /// Ring buffer capacity; the loop length can never exceed it
    pub ring_capacity_frames: usize,

    /// Capacity of each queued-operation heap
    pub max_queued_ops: usize,

    /// Capacity of each active-operation heap
    pub max_active_ops: usize,

    pub record_mode: RecordMode,

    /// Duration given to an operation started by a note on, before any
    /// note off shortens it. `None` means one loop length.
    pub max_hold_frames: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            ring_capacity_frames: DEFAULT_SAMPLE_RATE as usize * DEFAULT_RING_SECONDS,
            max_queued_ops: DEFAULT_MAX_QUEUED_OPS,
            max_active_ops: DEFAULT_MAX_ACTIVE_OPS,
            record_mode: RecordMode::default(),
            max_hold_frames: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_ring_capacity(mut self, frames: usize) -> Self {
        self.ring_capacity_frames = frames;
        self
    }

    pub fn with_max_ops(mut self, queued: usize, active: usize) -> Self {
        self.max_queued_ops = queued;
        self.max_active_ops = active;
        self
    }

    pub fn with_record_mode(mut self, mode: RecordMode) -> Self {
        self.record_mode = mode;
        self
    }

    pub fn with_max_hold(mut self, frames: u32) -> Self {
        self.max_hold_frames = Some(frames);
        self
    }

    /// Frames in `seconds` of audio.
    #[inline]
    pub fn frames_for_seconds(&self, seconds: f64) -> u32 {
        (seconds * self.sample_rate).floor().max(0.0) as u32
    }

    /// Frames in `beats` at `bpm`.
    #[inline]
    pub fn frames_for_beats(&self, beats: f64, bpm: f64) -> u32 {
        self.frames_for_seconds(beats * 60.0 / bpm)
    }
}
