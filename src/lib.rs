// src/lib.rs
//
// Library entry point for Rust and FFI consumers.

mod config;
mod engine;
mod epoch_pair;
mod error;
mod event;
mod op_heap;
mod ops;
mod ring_buffer;
mod transform;

pub mod ffi;

#[cfg(feature = "web")]
pub mod wasm;

// Re-export key types for Rust consumers
pub use config::{EngineConfig, RecordMode};
pub use engine::{Engine, PlaybackState, Readback};
pub use error::{EngineError, EngineResult, ParseOpError, ScheduleError};
pub use event::{TriggerEvent, TriggerKind};
pub use ops::{OpId, OpKind, Operation, Transform};
pub use ring_buffer::MIN_LOOP_LENGTH;
