// src/event.rs

use crate::error::{EngineError, EngineResult};
use crate::ops::{OpKind, Transform};

/// Trigger events a host binding can queue between two process calls.
pub const MAX_BLOCK_EVENTS: usize = 256;

/// Whether a trigger starts or releases an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    NoteOn,
    NoteOff,
}

/// ===============================
/// Engine-side trigger events
/// ===============================

/// A decoded control input, positioned within the current block.
///
/// These events:
/// - are RT-safe and `Copy`
/// - carry NO host encoding (MIDI bytes etc. are decoded by the caller)
/// - must be passed to `process` in non-decreasing `frame_offset` order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,

    /// Frame within the block at which the trigger takes effect
    pub frame_offset: u32,

    /// Operation to start (note on) or whose kind to release (note off)
    pub transform: Transform,
}

impl TriggerEvent {
    /// Start a reverse at `frame_offset`.
    pub fn note_on(frame_offset: u32) -> Self {
        Self::start(Transform::Reverse, frame_offset)
    }

    /// Release the running reverse at `frame_offset`.
    pub fn note_off(frame_offset: u32) -> Self {
        Self::release(Transform::Reverse, frame_offset)
    }

    pub fn start(transform: Transform, frame_offset: u32) -> Self {
        Self {
            kind: TriggerKind::NoteOn,
            frame_offset,
            transform,
        }
    }

    pub fn release(transform: Transform, frame_offset: u32) -> Self {
        Self {
            kind: TriggerKind::NoteOff,
            frame_offset,
            transform,
        }
    }

    #[inline]
    pub fn op_kind(&self) -> OpKind {
        self.transform.kind()
    }
}

/// Preallocated storage for one block of triggers.
///
/// Hosts insert into it in frame order without exceeding `capacity`, so
/// it never reallocates on the audio thread.
pub fn trigger_buffer(capacity: usize) -> EngineResult<Vec<TriggerEvent>> {
    let mut events = Vec::new();
    events
        .try_reserve_exact(capacity)
        .map_err(|_| EngineError::AllocationFailure {
            what: "trigger buffer",
            requested: capacity,
        })?;
    Ok(events)
}
