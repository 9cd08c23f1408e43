//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { boucle_init, BoucleConfig, BoucleEngine } from './boucle.js';
//!
//! await init();
//! boucle_init();
//!
//! const engine = new BoucleEngine(new BoucleConfig());
//! engine.set_loop_length(96000);
//!
//! // In the AudioWorklet, once per quantum:
//! engine.note_on(0);
//! engine.process(input, output);
//! ```

use wasm_bindgen::prelude::*;

use crate::config::{DEFAULT_MAX_ACTIVE_OPS, DEFAULT_MAX_QUEUED_OPS, EngineConfig, RecordMode};
use crate::engine::{Engine, PlaybackState, Readback};
use crate::event::{MAX_BLOCK_EVENTS, TriggerEvent, trigger_buffer};
use crate::ops::Operation;

// Default web configuration
const DEFAULT_SAMPLE_RATE: f64 = 48_000.0;
const DEFAULT_RING_SECONDS: f64 = 8.0;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn boucle_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════

/// Configuration for creating an engine.
#[wasm_bindgen]
#[derive(Clone, Copy)]
pub struct BoucleConfig {
    /// Sample rate in Hz (e.g., 44100.0, 48000.0).
    pub sample_rate: f64,
    /// Longest loop, in seconds.
    pub ring_seconds: f64,
    /// Capacity of the queued and active operation heaps.
    pub max_ops: u32,
    /// Keep recording after the loop is full.
    pub rolling: bool,
}

#[wasm_bindgen]
impl BoucleConfig {
    /// Create a new configuration with default values.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with custom values.
    pub fn with_values(sample_rate: f64, ring_seconds: f64, max_ops: u32, rolling: bool) -> Self {
        Self {
            sample_rate,
            ring_seconds,
            max_ops,
            rolling,
        }
    }
}

impl Default for BoucleConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            ring_seconds: DEFAULT_RING_SECONDS,
            max_ops: DEFAULT_MAX_QUEUED_OPS.max(DEFAULT_MAX_ACTIVE_OPS) as u32,
            rolling: true,
        }
    }
}

impl From<BoucleConfig> for EngineConfig {
    fn from(c: BoucleConfig) -> Self {
        let config = EngineConfig::new().with_sample_rate(c.sample_rate);
        let ring_frames = config.frames_for_seconds(c.ring_seconds) as usize;
        let mode = if c.rolling {
            RecordMode::Rolling
        } else {
            RecordMode::FreezeWhenFull
        };

        config
            .with_ring_capacity(ring_frames)
            .with_max_ops(c.max_ops as usize, c.max_ops as usize)
            .with_record_mode(mode)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback Data
// ═══════════════════════════════════════════════════════════════════════════

/// Readback data from the engine (for UI displays).
#[wasm_bindgen]
#[derive(Clone, Copy, Default)]
pub struct BoucleReadback {
    /// Whether the loop has been recorded.
    pub looping: bool,
    pub loop_length: u32,
    pub play_head: u32,
    pub record_head: u32,
    pub queued_ops: u32,
    pub active_ops: u32,
    pub active_transforms: u32,
    /// Loop position of the next queued operation, -1 when none.
    pub next_start: i32,
    /// Operations dropped since the last activation.
    pub dropped_ops: f64,
}

impl From<Readback> for BoucleReadback {
    fn from(r: Readback) -> Self {
        Self {
            looping: r.state == PlaybackState::Looping,
            loop_length: r.loop_length as u32,
            play_head: r.play_head as u32,
            record_head: r.record_head as u32,
            queued_ops: r.queued_ops as u32,
            active_ops: r.active_ops as u32,
            active_transforms: r.active_transforms as u32,
            next_start: r.next_start.map_or(-1, |start| start as i32),
            dropped_ops: r.dropped_ops as f64,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════

/// Loop engine for use inside an AudioWorklet.
#[wasm_bindgen]
pub struct BoucleEngine {
    inner: Engine,
    events: Vec<TriggerEvent>,
}

#[wasm_bindgen]
impl BoucleEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config: &BoucleConfig) -> Result<BoucleEngine, JsError> {
        let inner = Engine::new((*config).into())?;
        let events = trigger_buffer(MAX_BLOCK_EVENTS)?;
        Ok(Self { inner, events })
    }

    /// Silence the loop and start recording again.
    pub fn activate(&mut self) {
        self.events.clear();
        self.inner.activate();
    }

    pub fn set_loop_length(&mut self, frames: u32) {
        self.inner.set_loop_length(frames);
    }

    /// Start a reverse at `frame_offset` in the next processed block.
    pub fn note_on(&mut self, frame_offset: u32) -> bool {
        self.push(TriggerEvent::note_on(frame_offset))
    }

    /// Release the reverse at `frame_offset` in the next processed block.
    pub fn note_off(&mut self, frame_offset: u32) -> bool {
        self.push(TriggerEvent::note_off(frame_offset))
    }

    /// Schedule an operation from its text form, e.g. `"repeat 0 9600 2400"`.
    /// Returns the operation id.
    pub fn schedule(&mut self, text: &str) -> Result<u32, JsError> {
        let op: Operation = text.parse()?;
        Ok(self.inner.schedule(op)?)
    }

    /// Process one block of mono audio, consuming pending triggers.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let frames = input.len().min(output.len());
        self.inner
            .process(&input[..frames], &mut output[..frames], &self.events);
        output[frames..].fill(0.0);
        self.events.clear();
    }

    pub fn readback(&self) -> BoucleReadback {
        self.inner.readback().into()
    }
}

impl BoucleEngine {
    fn push(&mut self, event: TriggerEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            log::warn!("trigger buffer full, dropping trigger at frame {}", event.frame_offset);
            return false;
        }
        let at = self
            .events
            .partition_point(|e| e.frame_offset <= event.frame_offset);
        self.events.insert(at, event);
        true
    }
}
