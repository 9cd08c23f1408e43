// C-compatible FFI bindings for host integration (Swift/iOS, plugin shells).
//
// Safety requirements:
// - All pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - Audio functions must be called from a single audio thread
// - Caller must call the corresponding _destroy function for each _create

use std::ffi::{CStr, c_char};

use crate::engine::{Engine, PlaybackState, Readback};
use crate::event::{MAX_BLOCK_EVENTS, TriggerEvent, trigger_buffer};
use crate::ops::Operation;

use log::{error, info, warn};

#[cfg(feature = "ios")]
use log::LevelFilter;
#[cfg(feature = "ios")]
use oslog::OsLogger;

// Logger subsystem identifier
#[cfg(feature = "ios")]
const LOG_SUBSYSTEM: &str = "com.boucle.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// Call once at application startup, before creating an engine. Log
/// output appears in Console.app and Xcode's debug console.
#[cfg(feature = "ios")]
#[unsafe(no_mangle)]
pub extern "C" fn boucle_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to an engine and its pending triggers.
pub struct BoucleEngine {
    inner: Engine,

    /// Triggers for the next block, kept sorted by frame offset
    events: Vec<TriggerEvent>,
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Trigger kinds accepted by `boucle_engine_push_trigger`.
pub const BOUCLE_NOTE_ON: u32 = 0;
pub const BOUCLE_NOTE_OFF: u32 = 1;

/// Readback data from the engine (for UI displays).
#[repr(C)]
pub struct BoucleReadback {
    pub looping: bool,
    pub loop_length: u32,
    pub play_head: u32,
    pub record_head: u32,
    pub queued_ops: u32,
    pub active_ops: u32,
    pub active_transforms: u32,

    /// Loop position of the next queued operation, -1 when none
    pub next_start: i64,

    pub dropped_ops: u64,
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
            next_start: r.next_start.map_or(-1, |start| start as i64),
            dropped_ops: r.dropped_ops,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Create an engine.
///
/// All storage is allocated here. Returns null if the sizes are invalid
/// or allocation fails; the reason is logged.
#[unsafe(no_mangle)]
pub extern "C" fn boucle_engine_create(
    sample_rate: f64,
    ring_capacity_frames: u32,
    max_queued_ops: u32,
    max_active_ops: u32,
) -> *mut BoucleEngine {
    let engine = match Engine::create(
        sample_rate,
        ring_capacity_frames as usize,
        max_queued_ops as usize,
        max_active_ops as usize,
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("boucle_engine_create failed: {}", e);
            return std::ptr::null_mut();
        }
    };

    let events = match trigger_buffer(MAX_BLOCK_EVENTS) {
        Ok(events) => events,
        Err(e) => {
            error!("boucle_engine_create failed: {}", e);
            return std::ptr::null_mut();
        }
    };

    info!("boucle engine handle created");
    Box::into_raw(Box::new(BoucleEngine {
        inner: engine,
        events,
    }))
}

/// Destroy an engine.
///
/// # Safety
/// `engine` must be a pointer returned by `boucle_engine_create`, or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn boucle_engine_destroy(engine: *mut BoucleEngine) {
    if !engine.is_null() {
        unsafe { drop(Box::from_raw(engine)) };
    }
}

/// Silence the loop and start recording again. Pending triggers are dropped.
///
/// # Safety
/// `engine` must be a valid engine handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn boucle_engine_activate(engine: *mut BoucleEngine) {
    if engine.is_null() {
        return;
    }
    let engine = unsafe { &mut *engine };
    engine.events.clear();
    engine.inner.activate();
}

/// Set the loop length in frames. Safe to call every block.
///
/// # Safety
/// `engine` must be a valid engine handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn boucle_engine_set_loop_length(engine: *mut BoucleEngine, frames: u32) {
    if engine.is_null() {
        return;
    }
    let engine = unsafe { &mut *engine };
    engine.inner.set_loop_length(frames);
}

// ═══════════════════════════════════════════════════════════════════════════
// Control
// ═══════════════════════════════════════════════════════════════════════════

/// Queue a reverse trigger for the next `boucle_engine_process` call.
///
/// `kind` is `BOUCLE_NOTE_ON` or `BOUCLE_NOTE_OFF`. Triggers may be pushed
/// in any order; they are applied in frame order, ties in push order.
/// Returns `false` if the kind is unknown or the trigger buffer is full.
///
/// # Safety
/// `engine` must be a valid engine handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn boucle_engine_push_trigger(
    engine: *mut BoucleEngine,
    kind: u32,
    frame_offset: u32,
) -> bool {
    if engine.is_null() {
        return false;
    }
    let engine = unsafe { &mut *engine };

    let event = match kind {
        BOUCLE_NOTE_ON => TriggerEvent::note_on(frame_offset),
        BOUCLE_NOTE_OFF => TriggerEvent::note_off(frame_offset),
        _ => {
            warn!("unknown trigger kind {}", kind);
            return false;
        }
    };

    // Capacity is fixed so the audio thread never reallocates.
    if engine.events.len() == engine.events.capacity() {
        warn!("trigger buffer full, dropping trigger at frame {}", frame_offset);
        return false;
    }

    let at = engine
        .events
        .partition_point(|e| e.frame_offset <= frame_offset);
    engine.events.insert(at, event);
    true
}

/// Schedule an operation from its text form, e.g. `"jump 0 4800 -2400"`.
///
/// Returns the operation id, or 0 if the text is invalid or the queue is
/// full.
///
/// # Safety
/// - `engine` must be a valid engine handle
/// - `text` must be a valid null-terminated string
#[unsafe(no_mangle)]
pub unsafe extern "C" fn boucle_engine_schedule(
    engine: *mut BoucleEngine,
    text: *const c_char,
) -> u32 {
    if engine.is_null() || text.is_null() {
        return 0;
    }

    let text = match unsafe { CStr::from_ptr(text) }.to_str() {
        Ok(s) => s,
        Err(_) => return 0,
    };

    let op = match text.parse::<Operation>() {
        Ok(op) => op,
        Err(e) => {
            warn!("cannot parse operation '{}': {}", text, e);
            return 0;
        }
    };

    let engine = unsafe { &mut *engine };
    match engine.inner.schedule(op) {
        Ok(id) => id,
        Err(e) => {
            warn!("cannot schedule '{}': {}", text, e);
            0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Audio
// ═══════════════════════════════════════════════════════════════════════════

/// Process one block of mono audio, applying the pushed triggers.
///
/// Triggers are consumed by this call. If any pointer is null the output
/// (when present) is filled with silence.
///
/// # Safety
/// - Must be called from the audio thread
/// - `input` and `output` must be valid for `frames` samples and must not overlap
#[unsafe(no_mangle)]
pub unsafe extern "C" fn boucle_engine_process(
    engine: *mut BoucleEngine,
    input: *const f32,
    output: *mut f32,
    frames: u32,
) {
    let total_frames = frames as usize;

    if engine.is_null() || input.is_null() || output.is_null() {
        if !output.is_null() {
            unsafe { std::ptr::write_bytes(output, 0, total_frames) };
        }
        return;
    }

    let engine = unsafe { &mut *engine };
    let input = unsafe { std::slice::from_raw_parts(input, total_frames) };
    let output = unsafe { std::slice::from_raw_parts_mut(output, total_frames) };

    engine.inner.process(input, output, &engine.events);
    engine.events.clear();
}

/// Get the current engine state.
///
/// # Safety
/// `engine` must be a valid engine handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn boucle_engine_readback(engine: *const BoucleEngine) -> BoucleReadback {
    if engine.is_null() {
        return BoucleReadback {
            looping: false,
            loop_length: 0,
            play_head: 0,
            record_head: 0,
            queued_ops: 0,
            active_ops: 0,
            active_transforms: 0,
            next_start: -1,
            dropped_ops: 0,
        };
    }
    let engine = unsafe { &*engine };
    engine.inner.readback().into()
}
